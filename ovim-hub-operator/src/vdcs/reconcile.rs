use futures::stream::StreamExt;
use kube::{
    Api, Client, ResourceExt,
    api::{Patch, PatchParams},
    runtime::{Controller, controller::Action, finalizer},
};
use owo_colors::OwoColorize;
use ovim_common::{
    annotations,
    colors::{FG1, FG2},
    store::ObjectStore,
};
use ovim_types::*;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::actions;
use crate::util::{ERROR_REQUEUE, Error, PROBE_INTERVAL, patch::patch_status};

#[cfg(feature = "metrics")]
use crate::util::metrics::ControllerMetrics;

pub struct ContextData {
    pub client: Client,
    pub store: Arc<dyn ObjectStore>,
    #[cfg(feature = "metrics")]
    pub metrics: ControllerMetrics,
}

impl ContextData {
    pub fn new(client: Client, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            client,
            store,
            #[cfg(feature = "metrics")]
            metrics: ControllerMetrics::new("vdcs"),
        }
    }
}

pub async fn run(client: Client, store: Arc<dyn ObjectStore>, shutdown: CancellationToken) {
    let context: Arc<ContextData> = Arc::new(ContextData::new(client.clone(), store));
    crate::util::leader::run_leader_elected(client.clone(), "ovim-vdc-controller-lock", shutdown, || {
        let client = client.clone();
        let context = context.clone();
        tokio::spawn(async move {
            let api: Api<VirtualDataCenter> = Api::all(client);
            println!("{}", "vdc controller started".color(FG2));
            Controller::new(api, Default::default())
                .run(reconcile, on_error, context)
                .for_each(|_res| async move {})
                .await;
        })
    })
    .await;
}

/// A status-only update (the usage-metrics reconciler bumping resourceUsage,
/// or this reconciler's own condition bookkeeping) never changes
/// `metadata.generation`. Skipping those prevents the feedback loop where
/// writing status would itself trigger another reconcile.
fn is_status_only_update(vdc: &VirtualDataCenter) -> bool {
    let generation = vdc.metadata.generation;
    let observed = vdc.status.as_ref().and_then(|s| s.observed_generation);
    generation.is_some() && generation == observed && !deletion_requested(vdc)
}

fn deletion_requested(vdc: &VirtualDataCenter) -> bool {
    vdc.metadata.deletion_timestamp.is_some()
        || vdc
            .annotations()
            .get(annotations::DELETION_STATUS)
            .map(|v| v == annotations::DELETION_STATUS_PENDING)
            .unwrap_or(false)
}

async fn reconcile(vdc: Arc<VirtualDataCenter>, ctx: Arc<ContextData>) -> Result<Action, Error> {
    let client = ctx.client.clone();
    let name = vdc.name_any();
    let namespace = vdc.namespace().unwrap_or_default();
    let api: Api<VirtualDataCenter> = Api::namespaced(client.clone(), &namespace);

    #[cfg(feature = "metrics")]
    ctx.metrics
        .reconcile_counter
        .with_label_values(&[&name, &namespace])
        .inc();

    if is_status_only_update(&vdc) {
        return Ok(Action::await_change());
    }

    // Spoke-owned VDCs are reconciled by the spoke agent; the hub only
    // claims ownership of freshly-created, unlabeled VDCs.
    match vdc.labels().get(annotations::MANAGED_BY).map(String::as_str) {
        Some(annotations::MANAGED_BY_SPOKE) => return Ok(Action::await_change()),
        Some(annotations::MANAGED_BY_HUB) => {}
        _ => {
            claim_ownership(client.clone(), &vdc).await?;
            return Ok(Action::requeue(std::time::Duration::from_secs(1)));
        }
    }

    finalizer::finalizer(&api, annotations::VDC_FINALIZER, vdc, |event| async {
        match event {
            finalizer::Event::Apply(vdc) => apply(client.clone(), &ctx, &vdc).await,
            finalizer::Event::Cleanup(vdc) => cleanup(client.clone(), &ctx, &vdc).await,
        }
    })
    .await
    .map_err(|e| Error::UserInput(format!("finalizer error: {e}")))
}

async fn claim_ownership(client: Client, vdc: &VirtualDataCenter) -> Result<(), Error> {
    let namespace = vdc.namespace().unwrap_or_default();
    let api: Api<VirtualDataCenter> = Api::namespaced(client, &namespace);
    let patch = serde_json::json!({
        "metadata": {
            "labels": { annotations::MANAGED_BY: annotations::MANAGED_BY_HUB }
        }
    });
    api.patch(&vdc.name_any(), &PatchParams::apply(ovim_common::MANAGER_NAME), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

async fn apply(client: Client, ctx: &ContextData, vdc: &VirtualDataCenter) -> Result<Action, Error> {
    if deletion_requested(vdc) {
        let namespace = vdc.namespace().unwrap_or_default();
        let api: Api<VirtualDataCenter> = Api::namespaced(client, &namespace);
        api.delete(&vdc.name_any(), &Default::default()).await?;
        return Ok(Action::await_change());
    }

    let org_api: Api<Organization> = Api::all(client.clone());
    let org = match org_api.get_opt(&vdc.spec.organization_ref).await? {
        Some(org) => org,
        None => {
            actions::set_organization_not_found(client, vdc).await?;
            return Ok(Action::requeue(ERROR_REQUEUE));
        }
    };

    let namespace = actions::ensure_namespace(client.clone(), &org.name_any(), vdc).await?;
    actions::sync_quota(client.clone(), &namespace, &org.name_any(), &vdc.name_any(), &vdc.spec.quota).await?;
    if let Some(limits) = &vdc.spec.limit_range {
        actions::sync_limit_range(client.clone(), &namespace, &org.name_any(), &vdc.name_any(), limits).await?;
    }
    actions::sync_admin_rbac(client.clone(), &namespace, &org.name_any(), &vdc.name_any(), &org.spec.admins).await?;
    actions::sync_network_policy(client.clone(), &namespace, vdc).await?;
    actions::set_active(client.clone(), vdc, &namespace).await?;
    bump_observed_generation(client.clone(), vdc).await?;

    let record = actions::external_sync_record(&org.name_any(), vdc)?;
    if let Err(e) = ctx.store.upsert(&vdc.name_any(), record).await {
        ovim_common::response::print_warning(format!("external sync failed for vdc {}: {e}", vdc.name_any()));
    }

    println!(
        "{}{}{}",
        vdc.name_any().color(FG2),
        " converged, namespace=".color(FG1),
        namespace.color(FG2)
    );
    Ok(Action::requeue(PROBE_INTERVAL))
}

async fn bump_observed_generation(client: Client, vdc: &VirtualDataCenter) -> Result<(), Error> {
    let generation = vdc.metadata.generation;
    patch_status::<VirtualDataCenterStatus, VirtualDataCenter>(client, vdc, |status| {
        status.observed_generation = generation;
    })
    .await?;
    Ok(())
}

async fn cleanup(client: Client, _ctx: &ContextData, vdc: &VirtualDataCenter) -> Result<Action, Error> {
    let Some(namespace) = vdc.status.as_ref().and_then(|s| s.namespace.clone()) else {
        return Ok(Action::await_change());
    };

    actions::cleanup_workload_resources(client.clone(), &namespace, &vdc.name_any()).await?;
    actions::delete_namespace(client.clone(), &namespace).await?;

    let store = _ctx.store.clone();
    store.delete(&vdc.name_any()).await.ok();

    remove_spoke_finalizer(client, vdc).await?;
    Ok(Action::await_change())
}

/// Removes both finalizers together so hub and spoke can coexist on the
/// same cluster without deadlocking each other's deletion.
async fn remove_spoke_finalizer(client: Client, vdc: &VirtualDataCenter) -> Result<(), Error> {
    let namespace = vdc.namespace().unwrap_or_default();
    let api: Api<VirtualDataCenter> = Api::namespaced(client, &namespace);
    if let Some(current) = api.get_opt(&vdc.name_any()).await? {
        if current.finalizers().iter().any(|f| f == annotations::SPOKE_VDC_FINALIZER) {
            let finalizers: Vec<&str> = current
                .finalizers()
                .iter()
                .filter(|f| f.as_str() != annotations::SPOKE_VDC_FINALIZER)
                .map(String::as_str)
                .collect();
            let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
            api.patch(&vdc.name_any(), &PatchParams::apply(ovim_common::MANAGER_NAME), &Patch::Merge(&patch))
                .await?;
        }
    }
    Ok(())
}

fn on_error(vdc: Arc<VirtualDataCenter>, error: &Error, _ctx: Arc<ContextData>) -> Action {
    eprintln!(
        "{}",
        format!("vdc reconcile error for {}: {error}", vdc.name_any()).red()
    );
    Action::requeue(ERROR_REQUEUE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::{apimachinery::pkg::apis::meta::v1::Time, jiff::Timestamp};

    fn vdc_with(generation: Option<i64>, observed: Option<i64>) -> VirtualDataCenter {
        let mut vdc = VirtualDataCenter::new("test", VirtualDataCenterSpec {
            organization_ref: "acme".to_string(),
            zone_id: "zone-a".to_string(),
            display_name: "Test".to_string(),
            description: None,
            quota: VdcQuota { cpu: "2".to_string(), memory: "4Gi".to_string(), storage: "100Gi".to_string(), pods: None, virtual_machines: None },
            limit_range: None,
            network_policy: NetworkPolicyMode::Unset,
            custom_network_config: Default::default(),
            vdc_type: VdcKind::HubManaged,
            hub_operation_id: None,
            org_namespace: None,
            target_namespace: None,
            reconcile_until_success: false,
        });
        vdc.meta_mut().generation = generation;
        vdc.status = Some(VirtualDataCenterStatus {
            observed_generation: observed,
            ..Default::default()
        });
        vdc
    }

    #[test]
    fn status_only_update_is_detected_when_generation_matches_observed() {
        let vdc = vdc_with(Some(3), Some(3));
        assert!(is_status_only_update(&vdc));
    }

    #[test]
    fn spec_change_is_not_a_status_only_update() {
        let vdc = vdc_with(Some(4), Some(3));
        assert!(!is_status_only_update(&vdc));
    }

    #[test]
    fn deletion_in_progress_is_never_treated_as_status_only() {
        let mut vdc = vdc_with(Some(3), Some(3));
        vdc.meta_mut().deletion_timestamp = Some(Time::from(Timestamp::now()));
        assert!(!is_status_only_update(&vdc));
    }
}
