use k8s_openapi::api::core::v1::{LimitRange, Namespace, ResourceQuota, ServiceAccount};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::RoleBinding;
use kube::{Api, Client, ResourceExt, api::ListParams};
use ovim_types::{VirtualDataCenter, VirtualDataCenterStatus};

use crate::operations::vdc_manager;
use crate::util::Error;

pub fn org_namespace_name(vdc: &VirtualDataCenter) -> String {
    vdc.spec
        .org_namespace
        .clone()
        .unwrap_or_else(|| format!("org-{}", vdc.spec.organization_ref.to_lowercase()))
}

pub fn workload_namespace_name(vdc: &VirtualDataCenter) -> String {
    vdc.spec.target_namespace.clone().unwrap_or_else(|| {
        format!("vdc-{}-{}", vdc.spec.organization_ref.to_lowercase(), vdc.name_any().to_lowercase())
    })
}

pub async fn ensure_namespaces(client: Client, vdc: &VirtualDataCenter, cluster_id: &str) -> Result<(String, String), Error> {
    let org_ns = org_namespace_name(vdc);
    let workload_ns = workload_namespace_name(vdc);
    vdc_manager::ensure_namespace(client.clone(), &org_ns, cluster_id, &vdc.name_any()).await?;
    vdc_manager::ensure_namespace(client, &workload_ns, cluster_id, &vdc.name_any()).await?;
    Ok((org_ns, workload_ns))
}

pub async fn apply_workload_policies(client: Client, workload_ns: &str, cluster_id: &str, vdc: &VirtualDataCenter) -> Result<(), Error> {
    let name = vdc.name_any();
    vdc_manager::sync_quota(client.clone(), workload_ns, cluster_id, &name, &vdc.spec.quota).await?;
    if let Some(limits) = &vdc.spec.limit_range {
        vdc_manager::sync_limit_range(client.clone(), workload_ns, cluster_id, &name, limits).await?;
    }
    vdc_manager::sync_isolation_policy(client, workload_ns, cluster_id, &name).await?;
    Ok(())
}

/// Deletes VDC-scoped resources in the fixed order the cleanup sequence
/// requires, before the namespace itself goes away.
pub async fn cleanup_workload_resources(client: Client, namespace: &str, vdc_name: &str) -> Result<Vec<String>, Error> {
    let selector = format!("ovim.io/vdc={vdc_name}");
    let mut deleted = Vec::new();

    let rq: Api<ResourceQuota> = Api::namespaced(client.clone(), namespace);
    for item in rq.list(&ListParams::default().labels(&selector)).await?.items {
        let name = item.name_any();
        rq.delete(&name, &Default::default()).await.ok();
        deleted.push(format!("ResourceQuota/{name}"));
    }

    let lr: Api<LimitRange> = Api::namespaced(client.clone(), namespace);
    for item in lr.list(&ListParams::default().labels(&selector)).await?.items {
        let name = item.name_any();
        lr.delete(&name, &Default::default()).await.ok();
        deleted.push(format!("LimitRange/{name}"));
    }

    let rb: Api<RoleBinding> = Api::namespaced(client.clone(), namespace);
    for item in rb.list(&ListParams::default().labels(&selector)).await?.items {
        let name = item.name_any();
        rb.delete(&name, &Default::default()).await.ok();
        deleted.push(format!("RoleBinding/{name}"));
    }

    let np: Api<NetworkPolicy> = Api::namespaced(client.clone(), namespace);
    for item in np.list(&ListParams::default().labels(&selector)).await?.items {
        let name = item.name_any();
        np.delete(&name, &Default::default()).await.ok();
        deleted.push(format!("NetworkPolicy/{name}"));
    }

    let sa: Api<ServiceAccount> = Api::namespaced(client.clone(), namespace);
    for item in sa.list(&ListParams::default().labels(&selector)).await?.items {
        let name = item.name_any();
        sa.delete(&name, &Default::default()).await.ok();
        deleted.push(format!("ServiceAccount/{name}"));
    }

    Ok(deleted)
}

pub async fn delete_namespace(client: Client, namespace: &str) -> Result<(), Error> {
    vdc_manager::delete_namespace(client, namespace).await
}

/// Deletes the org namespace only if no sibling VDC remains in it.
pub async fn delete_org_namespace_if_unused(client: Client, org_ns: &str, excluding: &str) -> Result<bool, Error> {
    let api: Api<VirtualDataCenter> = Api::namespaced(client.clone(), org_ns);
    let siblings = api.list(&ListParams::default()).await?;
    let remaining = siblings.items.iter().filter(|v| v.name_any() != excluding).count();
    if remaining > 0 {
        return Ok(false);
    }
    let ns: Api<Namespace> = Api::all(client);
    match ns.delete(org_ns, &Default::default()).await {
        Ok(_) => Ok(true),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(true),
        Err(e) => Err(Error::from(e)),
    }
}

/// Compares the fields this controller owns without pulling in the rest of
/// the status struct, so an unrelated field change elsewhere never blocks
/// the idempotence check.
pub fn status_needs_update(current: &VirtualDataCenterStatus, phase: ovim_types::VdcPhase, namespace: &str) -> bool {
    current.phase != phase || current.namespace.as_deref() != Some(namespace)
}
