use k8s_openapi::api::core::v1::{LimitRange, LimitRangeItem, LimitRangeSpec, Namespace, ResourceQuota, ResourceQuotaSpec, ServiceAccount};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::RoleBinding;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::{
    Api, Client, ResourceExt,
    api::{ObjectMeta, PostParams},
};
use ovim_common::{annotations, quota};
use ovim_types::*;
use std::collections::{BTreeMap, HashSet};

use crate::organizations::actions::role_binding;
use crate::util::{Error, patch::patch_status};
use super::networkpolicy;

pub fn vdc_namespace_name(org_name: &str, vdc_name: &str) -> String {
    format!("vdc-{}-{}", org_name.to_lowercase(), vdc_name.to_lowercase())
}

pub fn vdc_admin_binding_name(group: &str) -> String {
    format!("vdc-admin-{group}")
}

fn managed_labels(org: &str, vdc: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(annotations::APP_NAME.to_string(), annotations::APP_NAME_VALUE.to_string());
    labels.insert(annotations::LABEL_TYPE.to_string(), "vdc".to_string());
    labels.insert(annotations::LABEL_ORG.to_string(), org.to_string());
    labels.insert(annotations::LABEL_VDC.to_string(), vdc.to_string());
    labels
}

pub async fn ensure_namespace(client: Client, org_name: &str, vdc: &VirtualDataCenter) -> Result<String, Error> {
    let ns_name = vdc_namespace_name(org_name, &vdc.name_any());
    let api: Api<Namespace> = Api::all(client);
    if api.get_opt(&ns_name).await?.is_some() {
        return Ok(ns_name);
    }
    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(ns_name.clone()),
            labels: Some(managed_labels(org_name, &vdc.name_any())),
            ..Default::default()
        },
        ..Default::default()
    };
    match api.create(&PostParams::default(), &ns).await {
        Ok(_) => {}
        Err(kube::Error::Api(ae)) if ae.code == 409 => {}
        Err(e) => return Err(Error::from(e)),
    }
    Ok(ns_name)
}

pub async fn sync_quota(client: Client, namespace: &str, org: &str, vdc: &str, quota_spec: &VdcQuota) -> Result<(), Error> {
    let api: Api<ResourceQuota> = Api::namespaced(client, namespace);
    let mut hard = BTreeMap::new();
    hard.insert("requests.cpu".to_string(), Quantity(quota_spec.cpu.clone()));
    hard.insert("requests.memory".to_string(), Quantity(quota_spec.memory.clone()));
    hard.insert("requests.storage".to_string(), Quantity(quota_spec.storage.clone()));
    if let Some(pods) = quota_spec.pods {
        hard.insert("pods".to_string(), Quantity(pods.to_string()));
    }
    if let Some(vms) = quota_spec.virtual_machines {
        hard.insert("count/virtualmachines.kubevirt.io".to_string(), Quantity(vms.to_string()));
    }

    let desired = ResourceQuota {
        metadata: ObjectMeta {
            name: Some("vdc-quota".to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(managed_labels(org, vdc)),
            ..Default::default()
        },
        spec: Some(ResourceQuotaSpec {
            hard: Some(hard),
            ..Default::default()
        }),
        ..Default::default()
    };

    match api.get_opt("vdc-quota").await? {
        Some(existing) if existing.spec.as_ref().map(|s| &s.hard) == desired.spec.as_ref().map(|s| &s.hard) => {}
        Some(_) => {
            api.replace("vdc-quota", &PostParams::default(), &desired).await?;
        }
        None => {
            api.create(&PostParams::default(), &desired).await?;
        }
    }
    Ok(())
}

pub async fn sync_limit_range(client: Client, namespace: &str, org: &str, vdc: &str, limits: &VdcLimitRange) -> Result<(), Error> {
    let api: Api<LimitRange> = Api::namespaced(client, namespace);

    let mut max = BTreeMap::new();
    if let Some(cpu) = &limits.max_cpu {
        max.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(mem) = &limits.max_memory {
        max.insert("memory".to_string(), Quantity(mem.clone()));
    }
    let mut min = BTreeMap::new();
    if let Some(cpu) = &limits.min_cpu {
        min.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(mem) = &limits.min_memory {
        min.insert("memory".to_string(), Quantity(mem.clone()));
    }
    let default_request = default_request(limits)?;

    let item = LimitRangeItem {
        type_: "Container".to_string(),
        max: (!max.is_empty()).then_some(max),
        min: (!min.is_empty()).then_some(min),
        default_request: (!default_request.is_empty()).then_some(default_request),
        ..Default::default()
    };

    let desired = LimitRange {
        metadata: ObjectMeta {
            name: Some("vdc-limits".to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(managed_labels(org, vdc)),
            ..Default::default()
        },
        spec: Some(LimitRangeSpec {
            limits: vec![item],
        }),
    };

    match api.get_opt("vdc-limits").await? {
        Some(existing) if existing.spec.as_ref() == desired.spec.as_ref() => {}
        Some(_) => {
            api.replace("vdc-limits", &PostParams::default(), &desired).await?;
        }
        None => {
            api.create(&PostParams::default(), &desired).await?;
        }
    }
    Ok(())
}

/// `DefaultRequest` equals `min` when given, else 10% of `max` floored at
/// `100m` CPU / `256Mi` memory.
fn default_request(limits: &VdcLimitRange) -> Result<BTreeMap<String, Quantity>, Error> {
    const MIN_CPU_MILLICORES: f64 = 100.0;
    const MIN_MEMORY_BYTES: u64 = 256 * 1024 * 1024;

    let mut out = BTreeMap::new();
    if let Some(cpu) = &limits.min_cpu {
        out.insert("cpu".to_string(), Quantity(cpu.clone()));
    } else if let Some(max_cpu) = &limits.max_cpu {
        let cores = quota::parse_cpu_cores(max_cpu)?;
        let millicores = (cores * 1000.0 * 0.1).max(MIN_CPU_MILLICORES).round() as u64;
        out.insert("cpu".to_string(), Quantity(format!("{millicores}m")));
    }
    if let Some(mem) = &limits.min_memory {
        out.insert("memory".to_string(), Quantity(mem.clone()));
    } else if let Some(max_mem) = &limits.max_memory {
        let bytes = quota::parse_quantity_to_bytes(max_mem)?;
        let tenth = ((bytes as f64 * 0.1) as u64).max(MIN_MEMORY_BYTES);
        out.insert("memory".to_string(), Quantity(tenth.to_string()));
    }
    Ok(out)
}

pub async fn sync_admin_rbac(client: Client, namespace: &str, org: &str, vdc: &str, admins: &[String]) -> Result<(), Error> {
    let api: Api<RoleBinding> = Api::namespaced(client, namespace);
    let existing = api
        .list(&kube::api::ListParams::default().labels(&format!(
            "managed-by=ovim,{}={}",
            annotations::LABEL_TYPE,
            annotations::TYPE_VDC_ADMIN
        )))
        .await?;

    let desired_names: HashSet<String> = admins.iter().map(|g| vdc_admin_binding_name(g)).collect();
    for rb in existing.items.iter() {
        let name = rb.name_any();
        if !desired_names.contains(&name) {
            api.delete(&name, &Default::default()).await.ok();
        }
    }

    for group in admins {
        let name = vdc_admin_binding_name(group);
        let mut desired = role_binding(&name, group, namespace, "ovim:vdc-admin");
        desired.metadata.labels.get_or_insert_with(BTreeMap::new)
            .insert(annotations::LABEL_TYPE.to_string(), annotations::TYPE_VDC_ADMIN.to_string());

        match api.get_opt(&name).await? {
            Some(existing) if existing.subjects == desired.subjects && existing.role_ref == desired.role_ref => {}
            Some(_) => {
                api.replace(&name, &PostParams::default(), &desired).await?;
            }
            None => match api.create(&PostParams::default(), &desired).await {
                Ok(_) => {}
                Err(kube::Error::Api(ae)) if ae.code == 409 => {}
                Err(e) => return Err(Error::from(e)),
            },
        }
    }
    let _ = (org, vdc);
    Ok(())
}

pub async fn sync_network_policy(client: Client, namespace: &str, vdc: &VirtualDataCenter) -> Result<(), Error> {
    let api: Api<NetworkPolicy> = Api::namespaced(client, namespace);
    let desired = networkpolicy::desired_policy(namespace, vdc.spec.network_policy, &vdc.spec.custom_network_config);

    match (api.get_opt(networkpolicy::MANAGED_POLICY_NAME).await?, desired) {
        (None, None) => {}
        (Some(_), None) => {
            api.delete(networkpolicy::MANAGED_POLICY_NAME, &Default::default()).await.ok();
        }
        (Some(existing), Some(desired)) if existing.spec == desired.spec => {}
        (Some(_), Some(desired)) => {
            api.replace(networkpolicy::MANAGED_POLICY_NAME, &PostParams::default(), &desired).await?;
        }
        (None, Some(desired)) => match api.create(&PostParams::default(), &desired).await {
            Ok(_) => {}
            Err(kube::Error::Api(ae)) if ae.code == 409 => {}
            Err(e) => return Err(Error::from(e)),
        },
    }
    Ok(())
}

pub async fn set_active(client: Client, vdc: &VirtualDataCenter, namespace: &str) -> Result<(), Error> {
    patch_status::<VirtualDataCenterStatus, VirtualDataCenter>(client, vdc, |status| {
        status.namespace = Some(namespace.to_string());
        status.phase = VdcPhase::Active;
        crate::organizations::actions::upsert_condition(&mut status.conditions, "Ready", "True", "VDCReady", "namespace, quota, RBAC and network policy converged");
    })
    .await?;
    Ok(())
}

pub async fn set_organization_not_found(client: Client, vdc: &VirtualDataCenter) -> Result<(), Error> {
    patch_status::<VirtualDataCenterStatus, VirtualDataCenter>(client, vdc, |status| {
        status.phase = VdcPhase::Failed;
        crate::organizations::actions::upsert_condition(&mut status.conditions, "Ready", "False", "OrganizationNotFound", "parent organization could not be found");
    })
    .await?;
    Ok(())
}

pub async fn set_deletion_pending(client: Client, vdc: &VirtualDataCenter) -> Result<(), Error> {
    patch_status::<VirtualDataCenterStatus, VirtualDataCenter>(client, vdc, |status| {
        status.phase = VdcPhase::DeletionPending;
    })
    .await?;
    Ok(())
}

pub async fn set_deletion_failed(client: Client, vdc: &VirtualDataCenter, message: &str) -> Result<(), Error> {
    patch_status::<VirtualDataCenterStatus, VirtualDataCenter>(client, vdc, |status| {
        status.phase = VdcPhase::DeletionFailed;
        crate::organizations::actions::upsert_condition(&mut status.conditions, "Ready", "False", "DeletionFailed", message);
    })
    .await?;
    Ok(())
}

/// Cleans up workload-side resources in the fixed order the deletion flow
/// requires: ResourceQuota, LimitRange, admin RoleBindings, NetworkPolicies,
/// then any ServiceAccount carrying `ovim.io/vdc=<name>`.
pub async fn cleanup_workload_resources(client: Client, namespace: &str, vdc_name: &str) -> Result<(), Error> {
    let rq_api: Api<ResourceQuota> = Api::namespaced(client.clone(), namespace);
    rq_api.delete("vdc-quota", &Default::default()).await.ok();

    let lr_api: Api<LimitRange> = Api::namespaced(client.clone(), namespace);
    lr_api.delete("vdc-limits", &Default::default()).await.ok();

    let rb_api: Api<RoleBinding> = Api::namespaced(client.clone(), namespace);
    if let Ok(bindings) = rb_api
        .list(&kube::api::ListParams::default().labels(&format!(
            "managed-by=ovim,{}={}",
            annotations::LABEL_TYPE,
            annotations::TYPE_VDC_ADMIN
        )))
        .await
    {
        for rb in bindings.items {
            rb_api.delete(&rb.name_any(), &Default::default()).await.ok();
        }
    }

    let np_api: Api<NetworkPolicy> = Api::namespaced(client.clone(), namespace);
    np_api.delete(networkpolicy::MANAGED_POLICY_NAME, &Default::default()).await.ok();

    let sa_api: Api<ServiceAccount> = Api::namespaced(client, namespace);
    if let Ok(accounts) = sa_api
        .list(&kube::api::ListParams::default().labels(&format!("{}={}", annotations::LABEL_VDC, vdc_name)))
        .await
    {
        for sa in accounts.items {
            sa_api.delete(&sa.name_any(), &Default::default()).await.ok();
        }
    }
    Ok(())
}

pub async fn delete_namespace(client: Client, namespace: &str) -> Result<(), Error> {
    let api: Api<Namespace> = Api::all(client);
    match api.delete(namespace, &Default::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(Error::from(e)),
    }
}

/// Projects quota strings to the scalar units the external object store
/// expects: binary/decimal byte quantities to decimal GB, bare CPU strings
/// to cores.
pub fn external_sync_record(org: &str, vdc: &VirtualDataCenter) -> Result<serde_json::Value, Error> {
    let cpu_cores = quota::parse_cpu_cores(&vdc.spec.quota.cpu)?;
    let memory_gb = quota::quantity_to_decimal_gb(&vdc.spec.quota.memory)?;
    let storage_gb = quota::quantity_to_decimal_gb(&vdc.spec.quota.storage)?;
    Ok(serde_json::json!({
        "id": vdc.name_any(),
        "organizationRef": org,
        "zoneId": vdc.spec.zone_id,
        "displayName": vdc.spec.display_name,
        "quota": {
            "cpuCores": cpu_cores,
            "memoryGb": memory_gb,
            "storageGb": storage_gb,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_request_uses_min_when_given() {
        let limits = VdcLimitRange {
            min_cpu: Some("250m".to_string()),
            max_cpu: Some("2".to_string()),
            min_memory: None,
            max_memory: Some("4Gi".to_string()),
        };
        let req = default_request(&limits).unwrap();
        assert_eq!(req.get("cpu").unwrap().0, "250m");
    }

    #[test]
    fn default_request_falls_back_to_ten_percent_of_max_floored() {
        let limits = VdcLimitRange {
            min_cpu: None,
            max_cpu: Some("1".to_string()),
            min_memory: None,
            max_memory: Some("512Mi".to_string()),
        };
        let req = default_request(&limits).unwrap();
        // 10% of 1 core = 100m, at the floor exactly.
        assert_eq!(req.get("cpu").unwrap().0, "100m");
        // 10% of 512Mi < 256Mi floor, so floor wins.
        assert_eq!(req.get("memory").unwrap().0, (256 * 1024 * 1024).to_string());
    }

    #[test]
    fn vdc_namespace_name_is_lowercased_and_scoped_by_org() {
        assert_eq!(vdc_namespace_name("Acme", "Dev"), "vdc-acme-dev");
    }
}
