//! Drains pushed operations and runs each on its own task so a slow or
//! stuck operation can't hold up the others behind it in the channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use ovim_types::{Operation, OperationExecStatus, OperationResult};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::handlers::{self, HandlerContext};
use crate::hub_client::HubClient;

/// Counters surfaced in the periodic `StatusReport.metrics`.
#[derive(Default)]
pub struct OperationCounters {
    pub processed: AtomicU64,
    pub failed: AtomicU64,
}

pub async fn run(
    mut inbound: mpsc::Receiver<Operation>,
    ctx: Arc<HandlerContext>,
    hub: Arc<HubClient>,
    counters: Arc<OperationCounters>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            op = inbound.recv() => {
                let Some(op) = op else { return };
                let ctx = ctx.clone();
                let hub = hub.clone();
                let counters = counters.clone();
                tokio::spawn(async move {
                    run_one(ctx, hub, counters, op).await;
                });
            }
        }
    }
}

async fn run_one(ctx: Arc<HandlerContext>, hub: Arc<HubClient>, counters: Arc<OperationCounters>, op: Operation) {
    let started = Instant::now();
    let timeout = Duration::from_secs(op.timeout_secs);
    let op_id = op.id.clone();
    let op_type = op.op_type;

    info!(id = %op_id, op_type = %op_type, "dispatching operation");
    let outcome = tokio::time::timeout(timeout, handlers::dispatch(&ctx, &op)).await;

    let result = match outcome {
        Ok(Ok(value)) => OperationResult {
            id: op_id.clone(),
            status: OperationExecStatus::Completed,
            result: Some(value),
            error: None,
            duration_ms: started.elapsed().as_millis() as u64,
        },
        Ok(Err(e)) => OperationResult {
            id: op_id.clone(),
            status: OperationExecStatus::Failed,
            result: None,
            error: Some(e.to_string()),
            duration_ms: started.elapsed().as_millis() as u64,
        },
        Err(_) => OperationResult {
            id: op_id.clone(),
            status: OperationExecStatus::Failed,
            result: None,
            error: Some(format!("operation timed out after {}s", op.timeout_secs)),
            duration_ms: started.elapsed().as_millis() as u64,
        },
    };

    counters.processed.fetch_add(1, Ordering::Relaxed);
    if result.status == OperationExecStatus::Failed {
        counters.failed.fetch_add(1, Ordering::Relaxed);
    }

    if let Err(e) = hub.send_operation_result(&result).await {
        error!(id = %op_id, error = %e, "failed to report operation result to hub");
    }
}
