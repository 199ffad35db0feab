use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use kube::Client;
use ovim_common::args::{AgentArgs, FeatureArgs, HealthArgs, HubClientArgs, KubernetesArgs, LocalApiArgs, MetricsArgs};
use ovim_types::StatusReport;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod api;
mod hub_client;
mod operations;
mod util;
mod vdc;

use api::server::AppState;
use hub_client::HubClient;

#[derive(Parser, Debug)]
#[command(name = "ovim-spoke-agent", version)]
struct Cli {
    #[command(flatten)]
    agent: AgentArgs,
    #[command(flatten)]
    hub: HubClientArgs,
    #[command(flatten)]
    local_api: LocalApiArgs,
    #[command(flatten)]
    kubernetes: KubernetesArgs,
    #[command(flatten)]
    metrics: MetricsArgs,
    #[command(flatten)]
    health: HealthArgs,
    #[command(flatten)]
    features: FeatureArgs,
}

const OPERATION_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ovim_common::init();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    cli.agent.validate()?;
    cli.hub.validate()?;
    cli.local_api.validate()?;

    let client = Client::try_default().await?;
    let hub = Arc::new(HubClient::new(&cli.hub, &cli.agent.agent_id, &cli.agent.cluster_id, &cli.agent.zone_id, &cli.agent.version)?);

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        ovim_common::shutdown::shutdown_signal().await;
        shutdown_signal.cancel();
    });

    let (tx, rx) = mpsc::channel(OPERATION_CHANNEL_CAPACITY);
    let handler_ctx = Arc::new(operations::handlers::HandlerContext {
        client: client.clone(),
        cluster_id: cli.agent.cluster_id.clone(),
    });
    let op_counters = Arc::new(operations::processor::OperationCounters::default());

    tokio::spawn(operations::processor::run(rx, handler_ctx, hub.clone(), op_counters.clone(), shutdown.clone()));

    if cli.features.vdc_management {
        tokio::spawn(vdc::reconcile::run(client.clone(), hub.clone(), cli.agent.cluster_id.clone(), shutdown.clone()));
    }

    let state = Arc::new(AppState {
        inbound: tx,
        status: RwLock::new(StatusReport {
            agent_id: cli.agent.agent_id.clone(),
            cluster_id: cli.agent.cluster_id.clone(),
            zone_id: cli.agent.zone_id.clone(),
            status: "starting".to_string(),
            version: cli.agent.version.clone(),
            callback_url: Some(cli.local_api.callback_url()),
            ..Default::default()
        }),
        hub_reachable: AtomicBool::new(false),
    });

    if cli.features.local_api && cli.local_api.enabled {
        let api_state = state.clone();
        let address = cli.local_api.address.clone();
        let port = cli.local_api.port;
        let api_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = api::server::run(&address, port, api_state, api_shutdown).await {
                error!(error = %e, "local api server exited");
            }
        });
    }

    tokio::spawn(status_report_loop(hub, state.clone(), op_counters, cli.health.report_interval_secs, shutdown.clone()));

    info!("spoke agent started, cluster_id={}", cli.agent.cluster_id);
    shutdown.cancelled().await;
    Ok(())
}

async fn status_report_loop(
    hub: Arc<HubClient>,
    state: Arc<AppState>,
    op_counters: Arc<operations::processor::OperationCounters>,
    interval_secs: u64,
    shutdown: CancellationToken,
) {
    let mut tick = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tick.tick() => {}
        }
        let report = {
            let mut report = state.status.write().await;
            report.status = "running".to_string();
            report.metrics = ovim_types::AgentMetrics {
                operations_processed: op_counters.processed.load(Ordering::Relaxed),
                operations_failed: op_counters.failed.load(Ordering::Relaxed),
                vdcs_managed: report.vdcs.len() as u64,
                vms_managed: report.vms.len() as u64,
            };
            report.clone()
        };
        match hub.send_status_report(&report).await {
            Ok(()) => state.hub_reachable.store(true, Ordering::Relaxed),
            Err(e) => {
                state.hub_reachable.store(false, Ordering::Relaxed);
                warn!(error = %e, "failed to send status report to hub");
            }
        }
    }
}
