use anyhow::Result;
use clap::Parser;
use kube::Client;
use ovim_common::{args::MetricsArgs, store::NullStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "metrics")]
mod metrics_server;
mod organizations;
mod rbac_sync;
mod usage_metrics;
mod util;
mod vdcs;
mod vms;

#[derive(Parser, Debug)]
#[command(name = "ovim-hub-operator", version)]
struct Cli {
    #[command(flatten)]
    metrics: MetricsArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    ovim_common::init();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = Client::try_default().await?;
    let store: Arc<dyn ovim_common::store::ObjectStore> = Arc::new(NullStore);

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        ovim_common::shutdown::shutdown_signal().await;
        shutdown_signal.cancel();
    });

    #[cfg(feature = "metrics")]
    if cli.metrics.enabled {
        let port = cli.metrics.port;
        let metrics_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics_server::run(port, metrics_shutdown).await {
                eprintln!("metrics server exited: {e}");
            }
        });
    }

    ovim_common::signal_ready();

    tokio::join!(
        organizations::reconcile::run(client.clone(), store.clone(), shutdown.clone()),
        vdcs::reconcile::run(client.clone(), store.clone(), shutdown.clone()),
        rbac_sync::reconcile::run(client.clone(), shutdown.clone()),
        usage_metrics::reconcile::run(client.clone(), shutdown.clone()),
        vms::reconcile::run(client, store, shutdown),
    );

    Ok(())
}
