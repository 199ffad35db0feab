use futures::stream::StreamExt;
use kube::{
    Api, Client, ResourceExt,
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
use crate::util::{ERROR_REQUEUE, Error, PROBE_INTERVAL};

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
            metrics: ControllerMetrics::new("organizations"),
        }
    }
}

pub async fn run(client: Client, store: Arc<dyn ObjectStore>, shutdown: CancellationToken) {
    let context: Arc<ContextData> = Arc::new(ContextData::new(client.clone(), store));
    crate::util::leader::run_leader_elected(client.clone(), "ovim-org-controller-lock", shutdown, || {
        let client = client.clone();
        let context = context.clone();
        tokio::spawn(async move {
            let api: Api<Organization> = Api::all(client);
            println!("{}", "organization controller started".color(FG2));
            Controller::new(api, Default::default())
                .run(reconcile, on_error, context)
                .for_each(|_res| async move {})
                .await;
        })
    })
    .await;
}

async fn reconcile(org: Arc<Organization>, ctx: Arc<ContextData>) -> Result<Action, Error> {
    let client = ctx.client.clone();
    let name = org.name_any();
    let api: Api<Organization> = Api::all(client.clone());

    #[cfg(feature = "metrics")]
    ctx.metrics
        .reconcile_counter
        .with_label_values(&[&name, ""])
        .inc();

    if org.meta().deletion_timestamp.is_some() {
        if let Some(blocked) = deletion_blocked_by_vdcs(client.clone(), &org).await? {
            actions::set_deletion_blocked(client.clone(), &org, blocked).await?;
            println!("{}", format!("deletion of {name} blocked: {blocked} VDC(s) remain").color(FG1));
            return Ok(Action::requeue(ERROR_REQUEUE));
        }
    }

    finalizer::finalizer(&api, annotations::ORG_FINALIZER, org, |event| async {
        match event {
            finalizer::Event::Apply(org) => apply(client.clone(), &ctx, &org).await,
            finalizer::Event::Cleanup(org) => cleanup(client.clone(), &ctx, &org).await,
        }
    })
    .await
    .map_err(|e| Error::UserInput(format!("finalizer error: {e}")))
}

/// Counts remaining child VDCs in the org namespace, if the org has one.
/// Returns `Ok(None)` when there's no namespace yet (nothing can be blocking).
async fn deletion_blocked_by_vdcs(client: Client, org: &Organization) -> Result<Option<usize>, Error> {
    let Some(namespace) = org.status.as_ref().and_then(|s| s.namespace.clone()) else {
        return Ok(None);
    };
    let vdc_api: Api<VirtualDataCenter> = Api::namespaced(client, &namespace);
    let vdcs = vdc_api.list(&Default::default()).await?;
    Ok(if vdcs.items.is_empty() { None } else { Some(vdcs.items.len()) })
}

async fn apply(client: Client, ctx: &ContextData, org: &Organization) -> Result<Action, Error> {
    let namespace = actions::ensure_namespace(client.clone(), org).await?;
    actions::sync_admin_rbac(client.clone(), org, &namespace).await?;
    actions::set_active(client.clone(), org, &namespace).await?;

    let record = serde_json::json!({
        "id": org.name_any(),
        "displayName": org.spec.display_name,
        "admins": org.spec.admins,
        "isEnabled": org.spec.is_enabled,
    });
    if let Err(e) = ctx.store.upsert(&org.name_any(), record).await {
        ovim_common::response::print_warning(format!("external sync failed for org {}: {e}", org.name_any()));
    }

    println!(
        "{}{}{}",
        org.name_any().color(FG2),
        " converged, namespace=".color(FG1),
        namespace.color(FG2)
    );
    Ok(Action::requeue(PROBE_INTERVAL))
}

async fn cleanup(client: Client, ctx: &ContextData, org: &Organization) -> Result<Action, Error> {
    let Some(namespace) = org.status.as_ref().and_then(|s| s.namespace.clone()) else {
        return Ok(Action::await_change());
    };
    let vdc_api: Api<VirtualDataCenter> = Api::namespaced(client.clone(), &namespace);
    let vdcs = vdc_api.list(&Default::default()).await?;
    if !vdcs.items.is_empty() {
        // `finalizer::finalizer` strips the finalizer on any `Ok(_)` from this
        // closure, regardless of the `Action` returned, so a still-blocked
        // cleanup must error out rather than requeue to keep the finalizer in
        // place. The authoritative check runs before `finalizer::finalizer` is
        // even invoked; this only guards the race where VDCs reappear between
        // that check and this closure running.
        actions::set_deletion_blocked(client, org, vdcs.items.len()).await?;
        return Err(Error::UserInput(format!(
            "deletion of {} blocked: {} VDC(s) remain",
            org.name_any(),
            vdcs.items.len()
        )));
    }

    let ns_api: Api<k8s_openapi::api::core::v1::Namespace> = Api::all(client.clone());
    match ns_api.delete(&namespace, &Default::default()).await {
        Ok(_) => {}
        Err(kube::Error::Api(ae)) if ae.code == 404 => {}
        Err(e) => return Err(Error::from(e)),
    }
    ctx.store.delete(&org.name_any()).await.ok();
    Ok(Action::await_change())
}

fn on_error(org: Arc<Organization>, error: &Error, _ctx: Arc<ContextData>) -> Action {
    eprintln!(
        "{}",
        format!("organization reconcile error for {}: {error}", org.name_any()).red()
    );
    Action::requeue(ERROR_REQUEUE)
}
