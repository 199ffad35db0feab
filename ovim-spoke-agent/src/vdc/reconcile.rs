use std::sync::Arc;

use futures::stream::StreamExt;
use kube::{
    Api, Client, ResourceExt,
    api::{Patch, PatchParams},
    runtime::{Controller, controller::Action, finalizer},
};
use owo_colors::OwoColorize;
use ovim_common::{annotations, colors::FG2};
use ovim_types::{HubSyncStatus, VdcPhase, VirtualDataCenter};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::actions;
use crate::hub_client::HubClient;
use crate::util::{ERROR_REQUEUE, Error, HUB_ACK_RETRY, patch::patch_status};

pub struct ContextData {
    pub client: Client,
    pub hub: Arc<HubClient>,
    pub cluster_id: String,
}

pub async fn run(client: Client, hub: Arc<HubClient>, cluster_id: String, shutdown: CancellationToken) {
    let context = Arc::new(ContextData { client: client.clone(), hub, cluster_id });
    crate::util::leader::run_leader_elected(client.clone(), "ovim-spoke-vdc-controller-lock", shutdown, || {
        let client = client.clone();
        let context = context.clone();
        tokio::spawn(async move {
            let api: Api<VirtualDataCenter> = Api::all(client);
            info!("spoke vdc controller started");
            Controller::new(api, Default::default())
                .run(reconcile, on_error, context)
                .for_each(|_res| async move {})
                .await;
        })
    })
    .await;
}

fn hub_delete_requested(vdc: &VirtualDataCenter) -> bool {
    vdc.annotations().get(annotations::HUB_DELETE_REQUESTED).map(|v| v == "true").unwrap_or(false)
}

async fn reconcile(vdc: Arc<VirtualDataCenter>, ctx: Arc<ContextData>) -> Result<Action, Error> {
    let client = ctx.client.clone();
    let namespace = vdc.namespace().unwrap_or_default();
    let api: Api<VirtualDataCenter> = Api::namespaced(client.clone(), &namespace);

    if hub_delete_requested(&vdc) {
        strip_hub_delete_annotation(client.clone(), &vdc).await?;
        api.delete(&vdc.name_any(), &Default::default()).await.ok();
        return Ok(Action::await_change());
    }

    finalizer::finalizer(&api, annotations::SPOKE_VDC_FINALIZER, vdc, |event| async {
        match event {
            finalizer::Event::Apply(vdc) => apply(client.clone(), &ctx, &vdc).await,
            finalizer::Event::Cleanup(vdc) => cleanup(client.clone(), &ctx, &vdc).await,
        }
    })
    .await
    .map_err(|e| Error::UserInput(format!("finalizer error: {e}")))
}

async fn strip_hub_delete_annotation(client: Client, vdc: &VirtualDataCenter) -> Result<(), Error> {
    let namespace = vdc.namespace().unwrap_or_default();
    let api: Api<VirtualDataCenter> = Api::namespaced(client, &namespace);
    let patch = json!({ "metadata": { "annotations": { (annotations::HUB_DELETE_REQUESTED): null } } });
    api.patch(&vdc.name_any(), &PatchParams::apply(ovim_common::MANAGER_NAME), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

async fn apply(client: Client, ctx: &ContextData, vdc: &VirtualDataCenter) -> Result<Action, Error> {
    let (org_ns, workload_ns) = actions::ensure_namespaces(client.clone(), vdc, &ctx.cluster_id).await?;
    actions::apply_workload_policies(client.clone(), &workload_ns, &ctx.cluster_id, vdc).await?;

    let needs_update = vdc
        .status
        .as_ref()
        .map(|s| actions::status_needs_update(s, VdcPhase::Active, &workload_ns))
        .unwrap_or(true);
    if needs_update {
        patch_status(client.clone(), vdc, |status| {
            status.namespace = Some(workload_ns.clone());
            status.phase = VdcPhase::Active;
        })
        .await?;
    }

    if vdc.spec.reconcile_until_success {
        return acknowledge_with_hub(client, ctx, vdc, &org_ns, &workload_ns).await;
    }

    println!("{} {}", vdc.name_any().color(FG2), "converged".color(FG2));
    Ok(Action::requeue(crate::util::PROBE_INTERVAL))
}

async fn acknowledge_with_hub(
    client: Client,
    ctx: &ContextData,
    vdc: &VirtualDataCenter,
    org_ns: &str,
    workload_ns: &str,
) -> Result<Action, Error> {
    let retry_count = vdc.status.as_ref().map(|s| s.retry_count).unwrap_or(0) + 1;
    let payload = json!({
        "name": vdc.name_any(),
        "namespace": workload_ns,
        "phase": VdcPhase::Active.to_string(),
        "orgNamespace": org_ns,
        "targetNamespace": workload_ns,
        "operationId": vdc.spec.hub_operation_id,
        "clusterId": ctx.cluster_id,
        "retryCount": retry_count,
    });

    let ack = ctx.hub.send_vdc_status(&payload).await;
    patch_status(client, vdc, |status| {
        status.retry_count = retry_count;
    })
    .await?;

    match ack {
        Ok(response) if response.get("status").and_then(serde_json::Value::as_str) == Some("success") => {
            let client2 = ctx.client.clone();
            patch_status(client2, vdc, |status| {
                status.hub_sync_status = HubSyncStatus::Success;
                status.phase = VdcPhase::Active;
            })
            .await?;
            Ok(Action::requeue(crate::util::PROBE_INTERVAL))
        }
        Ok(_) => {
            warn!(vdc = %vdc.name_any(), "hub did not acknowledge success, retrying");
            Ok(Action::requeue(HUB_ACK_RETRY))
        }
        Err(e) => {
            warn!(vdc = %vdc.name_any(), error = %e, "hub acknowledgement failed, retrying");
            Ok(Action::requeue(HUB_ACK_RETRY))
        }
    }
}

async fn cleanup(client: Client, ctx: &ContextData, vdc: &VirtualDataCenter) -> Result<Action, Error> {
    let workload_ns = vdc
        .status
        .as_ref()
        .and_then(|s| s.namespace.clone())
        .unwrap_or_else(|| actions::workload_namespace_name(vdc));
    let org_ns = actions::org_namespace_name(vdc);

    let deleted = actions::cleanup_workload_resources(client.clone(), &workload_ns, &vdc.name_any()).await?;
    actions::delete_namespace(client.clone(), &workload_ns).await?;
    actions::delete_org_namespace_if_unused(client.clone(), &org_ns, &vdc.name_any()).await.ok();

    let receipt = json!({
        "name": vdc.name_any(),
        "clusterId": ctx.cluster_id,
        "operationId": vdc.spec.hub_operation_id,
        "deletedResources": deleted,
        "deletedAt": chrono::Utc::now().to_rfc3339(),
    });
    if let Err(e) = ctx.hub.send_vdc_deletion_receipt(&receipt).await {
        warn!(vdc = %vdc.name_any(), error = %e, "failed to notify hub of vdc deletion, proceeding anyway");
    }

    Ok(Action::await_change())
}

fn on_error(_vdc: Arc<VirtualDataCenter>, error: &Error, _ctx: Arc<ContextData>) -> Action {
    warn!(error = %error, "spoke vdc reconcile failed");
    Action::requeue(ERROR_REQUEUE)
}
