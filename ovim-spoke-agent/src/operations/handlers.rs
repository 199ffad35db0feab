//! Typed dispatch for every operation type the hub can push. Each handler
//! takes the raw JSON payload, does its own parsing, and returns the JSON
//! result embedded in the `OperationResult` sent back to the hub.

use kube::{
    Api, Client, ResourceExt,
    api::{Patch, PatchParams, PostParams},
};
use ovim_common::{labels::sanitize_label_value, quota, MANAGER_NAME};
use ovim_types::{NetworkPolicyMode, Operation, VdcKind, VdcLimitRange, VdcQuota, VirtualDataCenter, VirtualDataCenterSpec};
use serde_json::{Value, json};
use tracing::warn;

use super::vdc_manager;
use super::vm_adapter;
use crate::util::Error;

pub struct HandlerContext {
    pub client: Client,
    pub cluster_id: String,
}

pub async fn dispatch(ctx: &HandlerContext, op: &Operation) -> Result<Value, Error> {
    use ovim_types::OperationType::*;
    match op.op_type {
        CreateVdc => create_vdc(ctx, &op.id, &op.payload).await,
        DeleteVdc => delete_vdc(ctx, &op.id, &op.payload).await,
        CreateVm => create_vm(ctx, &op.payload).await,
        DeleteVm => delete_vm(ctx, &op.payload).await,
        StartVm => set_vm_running(ctx, &op.payload, true).await,
        StopVm => set_vm_running(ctx, &op.payload, false).await,
        GetVmStatus => get_vm_status(ctx, &op.payload).await,
        ListVms => list_vms(ctx, &op.payload).await,
        GetHealth => get_health(ctx).await,
        GetMetrics => get_metrics().await,
        SyncTemplates => sync_templates(&op.payload).await,
    }
}

fn field<'a>(payload: &'a Value, name: &str) -> Result<&'a str, Error> {
    payload
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::UserInput(format!("missing field `{name}`")))
}

fn org_namespace_name(organization: &str) -> String {
    format!("org-{}", sanitize_label_value(organization).to_lowercase())
}

async fn create_vdc(ctx: &HandlerContext, op_id: &str, payload: &Value) -> Result<Value, Error> {
    let vdc_name = field(payload, "vdc_name")?.to_string();
    let organization = field(payload, "organization")?.to_string();
    let display_name = payload.get("display_name").and_then(Value::as_str).unwrap_or(&vdc_name).to_string();
    let description = payload.get("description").and_then(Value::as_str).map(str::to_string);
    let zone_id = payload.get("zone_id").and_then(Value::as_str).unwrap_or("default").to_string();
    let target_namespace = payload.get("target_namespace").and_then(Value::as_str).map(str::to_string);

    let quota_in = payload.get("quota").cloned().unwrap_or(json!({}));
    let cpu = quota_in.get("cpu").and_then(Value::as_str).unwrap_or("2").to_string();
    let memory = quota_in.get("memory").and_then(Value::as_str).unwrap_or("4Gi").to_string();
    let storage_raw = quota_in.get("storage").and_then(Value::as_str).unwrap_or("1Ti").to_string();
    let storage = normalize_storage_field(&storage_raw)?;
    let vdc_quota = VdcQuota {
        cpu,
        memory,
        storage,
        pods: quota_in.get("pods").and_then(Value::as_u64).map(|v| v as u32),
        virtual_machines: quota_in.get("virtual_machines").and_then(Value::as_u64).map(|v| v as u32),
    };
    let limit_range: Option<VdcLimitRange> = payload
        .get("limit_range")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| Error::UserInput(format!("invalid limit_range: {e}")))?;
    let admins: Vec<String> = payload
        .get("admins")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    let org_ns = org_namespace_name(&organization);
    vdc_manager::ensure_namespace(ctx.client.clone(), &org_ns, &ctx.cluster_id, &vdc_name).await?;

    match create_vdc_via_cr(ctx, op_id, &vdc_name, &org_ns, &organization, &zone_id, &display_name, description.clone(), vdc_quota.clone(), limit_range.clone(), target_namespace.clone()).await {
        Ok(result) => Ok(result),
        Err(e) => {
            warn!(error = %e, vdc = %vdc_name, "create_vdc CR path failed, falling back to direct provisioning");
            create_vdc_direct(ctx, &vdc_name, &organization, &vdc_quota, limit_range, &admins, target_namespace).await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn create_vdc_via_cr(
    ctx: &HandlerContext,
    op_id: &str,
    vdc_name: &str,
    org_ns: &str,
    organization: &str,
    zone_id: &str,
    display_name: &str,
    description: Option<String>,
    quota: VdcQuota,
    limit_range: Option<VdcLimitRange>,
    target_namespace: Option<String>,
) -> Result<Value, Error> {
    let api: Api<VirtualDataCenter> = Api::namespaced(ctx.client.clone(), org_ns);
    let spec = VirtualDataCenterSpec {
        organization_ref: organization.to_string(),
        zone_id: zone_id.to_string(),
        display_name: display_name.to_string(),
        description,
        quota,
        limit_range,
        network_policy: NetworkPolicyMode::Default,
        custom_network_config: Default::default(),
        vdc_type: VdcKind::SpokeLocal,
        hub_operation_id: Some(op_id.to_string()),
        org_namespace: Some(org_ns.to_string()),
        target_namespace,
        reconcile_until_success: true,
    };
    let vdc = VirtualDataCenter::new(vdc_name, spec);
    match api.create(&PostParams::default(), &vdc).await {
        Ok(created) => Ok(json!({ "path": "cr", "name": created.name_any(), "namespace": org_ns })),
        Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(json!({ "path": "cr", "name": vdc_name, "namespace": org_ns, "note": "already exists" })),
        Err(e) => Err(Error::from(e)),
    }
}

async fn create_vdc_direct(
    ctx: &HandlerContext,
    vdc_name: &str,
    organization: &str,
    quota: &VdcQuota,
    limit_range: Option<VdcLimitRange>,
    admins: &[String],
    target_namespace: Option<String>,
) -> Result<Value, Error> {
    let namespace = target_namespace.unwrap_or_else(|| format!("vdc-{}-{}", sanitize_label_value(organization).to_lowercase(), sanitize_label_value(vdc_name).to_lowercase()));
    let provision = async {
        vdc_manager::ensure_namespace(ctx.client.clone(), &namespace, &ctx.cluster_id, vdc_name).await?;
        vdc_manager::sync_quota(ctx.client.clone(), &namespace, &ctx.cluster_id, vdc_name, quota).await?;
        if let Some(limit_range) = &limit_range {
            vdc_manager::sync_limit_range(ctx.client.clone(), &namespace, &ctx.cluster_id, vdc_name, limit_range).await?;
        }
        vdc_manager::sync_admin_rbac(ctx.client.clone(), &namespace, &ctx.cluster_id, vdc_name, admins).await?;
        vdc_manager::sync_isolation_policy(ctx.client.clone(), &namespace, &ctx.cluster_id, vdc_name).await?;
        Ok::<(), Error>(())
    };
    if let Err(e) = provision.await {
        vdc_manager::delete_namespace(ctx.client.clone(), &namespace).await.ok();
        return Err(e);
    }
    Ok(json!({ "path": "direct", "name": vdc_name, "namespace": namespace }))
}

fn normalize_storage_field(raw: &str) -> Result<String, Error> {
    if let Ok(numeric) = raw.parse::<u64>() {
        return Ok(if numeric < 1024 { "1Ti".to_string() } else { quota::normalize_spoke_storage(&format!("{numeric}Gi"))? });
    }
    Ok(quota::normalize_spoke_storage(raw)?)
}

async fn delete_vdc(ctx: &HandlerContext, op_id: &str, payload: &Value) -> Result<Value, Error> {
    let vdc_name = field(payload, "vdc_name")?.to_string();
    let organization = field(payload, "organization")?.to_string();
    if let Some(vm_count) = payload.get("vm_count").and_then(Value::as_u64) {
        if vm_count > 0 {
            warn!(vdc = %vdc_name, vm_count, "delete_vdc requested with VMs still present, proceeding anyway");
        }
    }

    let org_ns = org_namespace_name(&organization);
    let api: Api<VirtualDataCenter> = Api::namespaced(ctx.client.clone(), &org_ns);
    match api.get_opt(&vdc_name).await? {
        None => Ok(json!({ "path": "cr", "name": vdc_name, "note": "already absent" })),
        Some(_) => {
            let patch = json!({ "spec": { "hub_operation_id": op_id } });
            if let Err(e) = api.patch(&vdc_name, &PatchParams::apply(MANAGER_NAME), &Patch::Merge(&patch)).await {
                warn!(error = %e, vdc = %vdc_name, "delete_vdc CR patch failed, falling back to direct delete");
                return delete_vdc_direct(ctx, &vdc_name, &organization).await;
            }
            match api.delete(&vdc_name, &Default::default()).await {
                Ok(_) => Ok(json!({ "path": "cr", "name": vdc_name })),
                Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(json!({ "path": "cr", "name": vdc_name, "note": "already absent" })),
                Err(e) => {
                    warn!(error = %e, vdc = %vdc_name, "delete_vdc CR delete failed, falling back to direct delete");
                    delete_vdc_direct(ctx, &vdc_name, &organization).await
                }
            }
        }
    }
}

async fn delete_vdc_direct(ctx: &HandlerContext, vdc_name: &str, organization: &str) -> Result<Value, Error> {
    let namespace = format!("vdc-{}-{}", sanitize_label_value(organization).to_lowercase(), sanitize_label_value(vdc_name).to_lowercase());
    match vdc_manager::delete_namespace(ctx.client.clone(), &namespace).await {
        Ok(()) => Ok(json!({ "path": "direct", "name": vdc_name, "note": "resources were not present" })),
        Err(e) => Err(e),
    }
}

fn vm_namespace_and_name(payload: &Value) -> Result<(String, String), Error> {
    Ok((field(payload, "namespace")?.to_string(), field(payload, "name")?.to_string()))
}

async fn create_vm(ctx: &HandlerContext, payload: &Value) -> Result<Value, Error> {
    let (namespace, name) = vm_namespace_and_name(payload)?;
    vm_adapter::create(ctx.client.clone(), &namespace, &name).await?;
    Ok(json!({ "namespace": namespace, "name": name, "status": "created" }))
}

async fn delete_vm(ctx: &HandlerContext, payload: &Value) -> Result<Value, Error> {
    let (namespace, name) = vm_namespace_and_name(payload)?;
    vm_adapter::delete(ctx.client.clone(), &namespace, &name).await?;
    Ok(json!({ "namespace": namespace, "name": name, "status": "deleted" }))
}

async fn set_vm_running(ctx: &HandlerContext, payload: &Value, running: bool) -> Result<Value, Error> {
    let (namespace, name) = vm_namespace_and_name(payload)?;
    vm_adapter::set_running(ctx.client.clone(), &namespace, &name, running).await?;
    Ok(json!({ "namespace": namespace, "name": name, "status": if running { "running" } else { "stopped" } }))
}

async fn get_vm_status(ctx: &HandlerContext, payload: &Value) -> Result<Value, Error> {
    let (namespace, name) = vm_namespace_and_name(payload)?;
    match vm_adapter::status(ctx.client.clone(), &namespace, &name).await? {
        Some(status) => Ok(json!({ "namespace": namespace, "name": name, "status": status })),
        None => Ok(json!({ "namespace": namespace, "name": name, "status": null, "note": "not found" })),
    }
}

async fn list_vms(ctx: &HandlerContext, payload: &Value) -> Result<Value, Error> {
    let namespace = field(payload, "namespace")?.to_string();
    let names = vm_adapter::list(ctx.client.clone(), &namespace).await?;
    Ok(json!({ "namespace": namespace, "vms": names }))
}

async fn get_health(ctx: &HandlerContext) -> Result<Value, Error> {
    let reachable = ctx.client.apiserver_version().await.is_ok();
    Ok(json!({ "kubernetes_reachable": reachable, "cluster_id": ctx.cluster_id }))
}

async fn get_metrics() -> Result<Value, Error> {
    Ok(json!({ "note": "scrape the local /metrics endpoint for full detail" }))
}

async fn sync_templates(payload: &Value) -> Result<Value, Error> {
    let templates = payload.get("templates").and_then(Value::as_array).map(Vec::len).unwrap_or(0);
    Ok(json!({ "accepted": templates }))
}
