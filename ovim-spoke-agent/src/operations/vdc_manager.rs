//! Direct imperative VDC provisioning, used as the fallback path when the
//! `VirtualDataCenter` CR cannot be created or reconciled. Builds the same
//! namespace/quota/limit-range/RBAC/network-policy objects the CR-driven
//! reconciler converges toward, just without a controller loop behind them.

use k8s_openapi::api::core::v1::{LimitRange, LimitRangeItem, LimitRangeSpec, Namespace, ResourceQuota, ResourceQuotaSpec};
use k8s_openapi::api::networking::v1::{NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPeer, NetworkPolicySpec};
use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::{
    Api, Client,
    api::{ObjectMeta, PostParams},
};
use ovim_common::quota;
use ovim_types::{VdcLimitRange, VdcQuota};
use std::collections::BTreeMap;

use crate::util::Error;

const QUOTA_NAME: &str = "vdc-quota";
const LIMIT_RANGE_NAME: &str = "vdc-limits";

fn managed_labels(cluster_id: &str, vdc: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("ovim.io/managed-by".to_string(), "spoke-agent".to_string());
    labels.insert("ovim.io/cluster-id".to_string(), cluster_id.to_string());
    labels.insert("ovim.io/vdc".to_string(), vdc.to_string());
    labels
}

pub async fn ensure_namespace(client: Client, name: &str, cluster_id: &str, vdc: &str) -> Result<(), Error> {
    let api: Api<Namespace> = Api::all(client);
    if api.get_opt(name).await?.is_some() {
        return Ok(());
    }
    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(managed_labels(cluster_id, vdc)),
            ..Default::default()
        },
        ..Default::default()
    };
    match api.create(&PostParams::default(), &ns).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
        Err(e) => Err(Error::from(e)),
    }
}

pub async fn delete_namespace(client: Client, name: &str) -> Result<(), Error> {
    let api: Api<Namespace> = Api::all(client);
    match api.delete(name, &Default::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(Error::from(e)),
    }
}

/// Normalizes storage via [`quota::normalize_spoke_storage`] before writing
/// the `ResourceQuota`: spoke-side ingress floors anything under 1Ti.
pub async fn sync_quota(client: Client, namespace: &str, cluster_id: &str, vdc: &str, spec: &VdcQuota) -> Result<(), Error> {
    let storage = quota::normalize_spoke_storage(&spec.storage)?;
    let mut hard = BTreeMap::new();
    hard.insert("requests.cpu".to_string(), Quantity(spec.cpu.clone()));
    hard.insert("requests.memory".to_string(), Quantity(spec.memory.clone()));
    hard.insert("requests.storage".to_string(), Quantity(storage));
    if let Some(pods) = spec.pods {
        hard.insert("pods".to_string(), Quantity(pods.to_string()));
    }
    if let Some(vms) = spec.virtual_machines {
        hard.insert("count/virtualmachines.kubevirt.io".to_string(), Quantity(vms.to_string()));
    }
    let desired = ResourceQuota {
        metadata: ObjectMeta {
            name: Some(QUOTA_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(managed_labels(cluster_id, vdc)),
            ..Default::default()
        },
        spec: Some(ResourceQuotaSpec { hard: Some(hard), ..Default::default() }),
        ..Default::default()
    };
    let api: Api<ResourceQuota> = Api::namespaced(client, namespace);
    match api.get_opt(QUOTA_NAME).await? {
        Some(existing) if existing.spec == desired.spec => Ok(()),
        Some(_) => {
            api.replace(QUOTA_NAME, &PostParams::default(), &desired).await?;
            Ok(())
        }
        None => {
            api.create(&PostParams::default(), &desired).await?;
            Ok(())
        }
    }
}

pub async fn sync_limit_range(client: Client, namespace: &str, cluster_id: &str, vdc: &str, limits: &VdcLimitRange) -> Result<(), Error> {
    let mut max = BTreeMap::new();
    let mut min = BTreeMap::new();
    if let Some(v) = &limits.max_cpu {
        max.insert("cpu".to_string(), Quantity(v.clone()));
    }
    if let Some(v) = &limits.max_memory {
        max.insert("memory".to_string(), Quantity(v.clone()));
    }
    if let Some(v) = &limits.min_cpu {
        min.insert("cpu".to_string(), Quantity(v.clone()));
    }
    if let Some(v) = &limits.min_memory {
        min.insert("memory".to_string(), Quantity(v.clone()));
    }
    if max.is_empty() && min.is_empty() {
        return Ok(());
    }
    let item = LimitRangeItem {
        type_: "Container".to_string(),
        max: Some(max).filter(|m| !m.is_empty()),
        min: Some(min).filter(|m| !m.is_empty()),
        ..Default::default()
    };
    let desired = LimitRange {
        metadata: ObjectMeta {
            name: Some(LIMIT_RANGE_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(managed_labels(cluster_id, vdc)),
            ..Default::default()
        },
        spec: Some(LimitRangeSpec { limits: vec![item] }),
    };
    let api: Api<LimitRange> = Api::namespaced(client, namespace);
    match api.get_opt(LIMIT_RANGE_NAME).await? {
        Some(_) => {
            api.replace(LIMIT_RANGE_NAME, &PostParams::default(), &desired).await?;
        }
        None => {
            api.create(&PostParams::default(), &desired).await?;
        }
    }
    Ok(())
}

pub async fn sync_admin_rbac(client: Client, namespace: &str, cluster_id: &str, vdc: &str, admins: &[String]) -> Result<(), Error> {
    let api: Api<RoleBinding> = Api::namespaced(client, namespace);
    for group in admins {
        let name = format!("vdc-admin-{group}");
        if api.get_opt(&name).await?.is_some() {
            continue;
        }
        let rb = RoleBinding {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(namespace.to_string()),
                labels: Some(managed_labels(cluster_id, vdc)),
                ..Default::default()
            },
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "ClusterRole".to_string(),
                name: "ovim:vdc-admin".to_string(),
            },
            subjects: Some(vec![Subject {
                kind: "Group".to_string(),
                name: group.clone(),
                api_group: Some("rbac.authorization.k8s.io".to_string()),
                ..Default::default()
            }]),
        };
        match api.create(&PostParams::default(), &rb).await {
            Ok(_) => {}
            Err(kube::Error::Api(ae)) if ae.code == 409 => {}
            Err(e) => return Err(Error::from(e)),
        }
    }
    Ok(())
}

/// Minimal same-namespace isolation policy for the direct-manager fallback
/// path. The CR-driven reconciler's four-mode policy lives on the hub; the
/// fallback only needs to keep workloads from talking across VDC namespaces.
pub async fn sync_isolation_policy(client: Client, namespace: &str, cluster_id: &str, vdc: &str) -> Result<(), Error> {
    let mut selector_labels = BTreeMap::new();
    selector_labels.insert("ovim.io/vdc".to_string(), vdc.to_string());
    let desired = NetworkPolicy {
        metadata: ObjectMeta {
            name: Some("vdc-isolation".to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(managed_labels(cluster_id, vdc)),
            ..Default::default()
        },
        spec: Some(NetworkPolicySpec {
            pod_selector: LabelSelector::default(),
            policy_types: Some(vec!["Ingress".to_string()]),
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(vec![NetworkPolicyPeer {
                    namespace_selector: Some(LabelSelector {
                        match_labels: Some(selector_labels),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    };
    let api: Api<NetworkPolicy> = Api::namespaced(client, namespace);
    match api.get_opt("vdc-isolation").await? {
        Some(_) => {
            api.replace("vdc-isolation", &PostParams::default(), &desired).await?;
        }
        None => {
            api.create(&PostParams::default(), &desired).await?;
        }
    }
    Ok(())
}
