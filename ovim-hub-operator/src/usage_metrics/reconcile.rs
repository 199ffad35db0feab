use futures::stream::StreamExt;
use kube::{
    Api, Client, ResourceExt,
    runtime::{Controller, controller::Action},
};
use owo_colors::OwoColorize;
use ovim_common::{annotations, colors::FG2};
use ovim_types::*;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::actions;
use crate::util::{Error, METRICS_INTERVAL, patch::patch_status};

#[cfg(feature = "metrics")]
use crate::util::metrics::ControllerMetrics;

pub struct ContextData {
    pub client: Client,
    #[cfg(feature = "metrics")]
    pub metrics: ControllerMetrics,
}

impl ContextData {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            #[cfg(feature = "metrics")]
            metrics: ControllerMetrics::new("usage_metrics"),
        }
    }
}

pub async fn run(client: Client, shutdown: CancellationToken) {
    let context: Arc<ContextData> = Arc::new(ContextData::new(client.clone()));
    crate::util::leader::run_leader_elected(client.clone(), "ovim-usage-metrics-controller-lock", shutdown, || {
        let client = client.clone();
        let context = context.clone();
        tokio::spawn(async move {
            let api: Api<VirtualDataCenter> = Api::all(client);
            println!("{}", "usage metrics controller started".color(FG2));
            Controller::new(api, Default::default())
                .run(reconcile, on_error, context)
                .for_each(|_res| async move {})
                .await;
        })
    })
    .await;
}

async fn reconcile(vdc: Arc<VirtualDataCenter>, ctx: Arc<ContextData>) -> Result<Action, Error> {
    let name = vdc.name_any();

    #[cfg(feature = "metrics")]
    ctx.metrics.reconcile_counter.with_label_values(&[&name, ""]).inc();

    if vdc.labels().get(annotations::MANAGED_BY).map(String::as_str) == Some(annotations::MANAGED_BY_SPOKE) {
        return Ok(Action::requeue(METRICS_INTERVAL));
    }
    let Some(namespace) = vdc.status.as_ref().and_then(|s| s.namespace.clone()) else {
        return Ok(Action::requeue(METRICS_INTERVAL));
    };

    let measured = actions::measure(ctx.client.clone(), &namespace).await?;

    let changed = match &vdc.status {
        None => true,
        Some(status) => {
            status.resource_usage != measured.resource_usage
                || status.total_pods != measured.total_pods
                || status.total_vms != measured.total_vms
        }
    };

    if changed {
        patch_status::<VirtualDataCenterStatus, VirtualDataCenter>(ctx.client.clone(), &vdc, |status| {
            status.resource_usage = measured.resource_usage.clone();
            status.total_pods = measured.total_pods;
            status.total_vms = measured.total_vms;
            status.last_metrics_update = Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time::from(
                k8s_openapi::jiff::Timestamp::now(),
            ));
        })
        .await?;
        println!("{}", format!("{name} usage updated: {} pods, {} vms", measured.total_pods, measured.total_vms).color(FG2));
    }

    Ok(Action::requeue(METRICS_INTERVAL))
}

fn on_error(vdc: Arc<VirtualDataCenter>, error: &Error, _ctx: Arc<ContextData>) -> Action {
    eprintln!("{}", format!("usage metrics error for {}: {error}", vdc.name_any()).red());
    Action::requeue(METRICS_INTERVAL)
}
