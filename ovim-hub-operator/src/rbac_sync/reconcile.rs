use futures::stream::StreamExt;
use kube::{
    Api, Client, ResourceExt,
    runtime::{Controller, controller::Action},
};
use owo_colors::OwoColorize;
use ovim_common::colors::{FG1, FG2};
use ovim_types::*;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::actions;
use crate::util::{Error, RBAC_SYNC_INTERVAL, patch::patch_status_cluster};

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
            metrics: ControllerMetrics::new("rbac_sync"),
        }
    }
}

pub async fn run(client: Client, shutdown: CancellationToken) {
    let context: Arc<ContextData> = Arc::new(ContextData::new(client.clone()));
    crate::util::leader::run_leader_elected(client.clone(), "ovim-rbac-sync-controller-lock", shutdown, || {
        let client = client.clone();
        let context = context.clone();
        tokio::spawn(async move {
            let api: Api<Organization> = Api::all(client);
            println!("{}", "rbac sync controller started".color(FG2));
            Controller::new(api, Default::default())
                .run(reconcile, on_error, context)
                .for_each(|_res| async move {})
                .await;
        })
    })
    .await;
}

async fn reconcile(org: Arc<Organization>, ctx: Arc<ContextData>) -> Result<Action, Error> {
    let name = org.name_any();

    #[cfg(feature = "metrics")]
    ctx.metrics.reconcile_counter.with_label_values(&[&name, ""]).inc();

    let Some(status) = &org.status else {
        return Ok(Action::requeue(RBAC_SYNC_INTERVAL));
    };
    if status.phase != OrganizationPhase::Active {
        return Ok(Action::requeue(RBAC_SYNC_INTERVAL));
    }
    let Some(namespace) = &status.namespace else {
        return Ok(Action::requeue(RBAC_SYNC_INTERVAL));
    };

    let vdcs = actions::list_vdcs(ctx.client.clone(), namespace).await?;
    let mut synced = 0usize;
    for vdc in &vdcs {
        let Some(vdc_namespace) = vdc.status.as_ref().and_then(|s| s.namespace.clone()) else {
            continue;
        };
        actions::sync_vdc_admins(ctx.client.clone(), &vdc_namespace, &org.spec.admins).await?;
        synced += 1;
    }

    patch_status_cluster::<OrganizationStatus, Organization>(ctx.client.clone(), &org, |status| {
        status.vdc_count = synced as u32;
        status.last_rbac_sync = Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time::from(
            k8s_openapi::jiff::Timestamp::now(),
        ));
    })
    .await?;

    println!(
        "{}{}{}",
        name.color(FG2),
        " rbac synced across ".color(FG1),
        format!("{synced} vdc(s)").color(FG2)
    );
    Ok(Action::requeue(RBAC_SYNC_INTERVAL))
}

fn on_error(org: Arc<Organization>, error: &Error, _ctx: Arc<ContextData>) -> Action {
    eprintln!("{}", format!("rbac sync error for {}: {error}", org.name_any()).red());
    Action::requeue(RBAC_SYNC_INTERVAL)
}
