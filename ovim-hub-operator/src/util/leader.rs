use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams, LeaseLockResult};
use owo_colors::OwoColorize;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use ovim_common::colors::{FG1, FG2};

/// Runs `spawn_controller` only while this replica holds the named lease,
/// aborting it immediately on leadership loss. Mirrors the lease-acquire loop
/// every reconciler in this operator uses so that a multi-replica deployment
/// has exactly one active controller per CRD.
pub async fn run_leader_elected<F>(
    client: Client,
    lease_name: &str,
    shutdown: CancellationToken,
    mut spawn_controller: F,
) where
    F: FnMut() -> tokio::task::JoinHandle<()>,
{
    let lease_namespace = std::env::var("NAMESPACE").unwrap_or_else(|_| "default".to_string());
    let holder_id = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("{lease_name}-{}", uuid::Uuid::new_v4()));
    let lease_ttl = Duration::from_secs(15);
    let renew_every = Duration::from_secs(5);
    let leadership = LeaseLock::new(
        client,
        &lease_namespace,
        LeaseLockParams {
            holder_id,
            lease_name: lease_name.to_string(),
            lease_ttl,
        },
    );

    let mut controller_task: Option<tokio::task::JoinHandle<()>> = None;
    let mut tick = tokio::time::interval(renew_every);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Some(task) = controller_task.take() {
                    task.abort();
                    task.await.ok();
                }
                break;
            }
            _ = tick.tick() => {}
        }
        let lease = match leadership.try_acquire_or_renew().await {
            Ok(l) => l,
            Err(e) => {
                eprintln!("{}", format!("leader election renew/acquire failed for {lease_name}: {e}").red());
                if let Some(task) = controller_task.take() {
                    task.abort();
                }
                continue;
            }
        };
        if matches!(lease, LeaseLockResult::Acquired(_)) {
            if controller_task.is_none() {
                println!("{}", format!("acquired leadership for {lease_name}").color(FG2));
                controller_task = Some(spawn_controller());
            }
        } else if let Some(task) = controller_task.take() {
            eprintln!("{}", format!("lost leadership for {lease_name}").color(FG1));
            task.abort();
        }
    }
}
