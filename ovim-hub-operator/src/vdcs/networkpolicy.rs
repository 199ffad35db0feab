use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule, NetworkPolicyPeer,
    NetworkPolicyPort, NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use ovim_types::NetworkPolicyMode;
use std::collections::BTreeMap;

pub const MANAGED_POLICY_NAME: &str = "vdc-network-policy";

/// System namespaces every isolated VDC is still allowed to talk to (DNS,
/// ingress controller, monitoring scrape).
const SYSTEM_NAMESPACES: &[&str] = &["kube-system", "ovim-system", "monitoring"];

/// `None` means "no managed policy should exist" (the `""`/`default` modes).
pub fn desired_policy(
    namespace: &str,
    mode: NetworkPolicyMode,
    custom: &BTreeMap<String, String>,
) -> Option<NetworkPolicy> {
    match mode {
        NetworkPolicyMode::Unset | NetworkPolicyMode::Default => None,
        NetworkPolicyMode::Isolated => Some(isolated_policy(namespace)),
        NetworkPolicyMode::Custom => Some(custom_policy(namespace, custom)),
    }
}

fn isolated_policy(namespace: &str) -> NetworkPolicy {
    let same_namespace_peer = NetworkPolicyPeer {
        pod_selector: Some(LabelSelector::default()),
        ..Default::default()
    };
    let system_ns_peers: Vec<NetworkPolicyPeer> = SYSTEM_NAMESPACES
        .iter()
        .map(|ns| NetworkPolicyPeer {
            namespace_selector: Some(LabelSelector {
                match_labels: Some(BTreeMap::from([(
                    "kubernetes.io/metadata.name".to_string(),
                    ns.to_string(),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect();

    let mut ingress_from = vec![same_namespace_peer.clone()];
    ingress_from.extend(system_ns_peers.clone());

    let mut egress_to = vec![same_namespace_peer];
    egress_to.extend(system_ns_peers);

    let dns_egress = NetworkPolicyEgressRule {
        to: None,
        ports: Some(vec![
            NetworkPolicyPort {
                protocol: Some("UDP".to_string()),
                port: Some(IntOrString::Int(53)),
                ..Default::default()
            },
            NetworkPolicyPort {
                protocol: Some("TCP".to_string()),
                port: Some(IntOrString::Int(53)),
                ..Default::default()
            },
        ]),
    };
    let https_egress = NetworkPolicyEgressRule {
        to: None,
        ports: Some(vec![NetworkPolicyPort {
            protocol: Some("TCP".to_string()),
            port: Some(IntOrString::Int(443)),
            ..Default::default()
        }]),
    };
    let internal_egress = NetworkPolicyEgressRule {
        to: Some(egress_to),
        ports: None,
    };

    NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(MANAGED_POLICY_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(managed_labels()),
            ..Default::default()
        },
        spec: Some(NetworkPolicySpec {
            pod_selector: LabelSelector::default(),
            policy_types: Some(vec!["Ingress".to_string(), "Egress".to_string()]),
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(ingress_from),
                ports: None,
            }]),
            egress: Some(vec![internal_egress, dns_egress, https_egress]),
        }),
    }
}

fn custom_policy(namespace: &str, custom: &BTreeMap<String, String>) -> NetworkPolicy {
    let policy_type = custom.get("policy_type").map(String::as_str).unwrap_or("allow-all");
    let deny_all_ingress = custom.get("deny_all_ingress").is_some_and(|v| v == "true");
    let deny_all_egress = custom.get("deny_all_egress").is_some_and(|v| v == "true");

    let (ingress, egress) = if policy_type == "isolate" {
        let same_ns = NetworkPolicyPeer {
            pod_selector: Some(LabelSelector::default()),
            ..Default::default()
        };
        (
            if deny_all_ingress {
                Some(vec![])
            } else {
                Some(vec![NetworkPolicyIngressRule {
                    from: Some(vec![same_ns.clone()]),
                    ports: None,
                }])
            },
            if deny_all_egress {
                Some(vec![])
            } else {
                Some(vec![NetworkPolicyEgressRule {
                    to: Some(vec![same_ns]),
                    ports: None,
                }])
            },
        )
    } else {
        (None, None)
    };

    let mut policy_types = Vec::new();
    if ingress.is_some() {
        policy_types.push("Ingress".to_string());
    }
    if egress.is_some() {
        policy_types.push("Egress".to_string());
    }

    NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(MANAGED_POLICY_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(managed_labels()),
            ..Default::default()
        },
        spec: Some(NetworkPolicySpec {
            pod_selector: LabelSelector::default(),
            policy_types: Some(policy_types),
            ingress,
            egress,
        }),
    }
}

fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("managed-by".to_string(), "ovim".to_string()),
        (ovim_common::annotations::LABEL_TYPE.to_string(), ovim_common::annotations::TYPE_VDC_NETWORK_POLICY.to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_and_default_modes_have_no_managed_policy() {
        assert!(desired_policy("ns", NetworkPolicyMode::Unset, &BTreeMap::new()).is_none());
        assert!(desired_policy("ns", NetworkPolicyMode::Default, &BTreeMap::new()).is_none());
    }

    #[test]
    fn isolated_mode_allows_dns_and_https_egress() {
        let policy = desired_policy("ns", NetworkPolicyMode::Isolated, &BTreeMap::new()).unwrap();
        let spec = policy.spec.unwrap();
        let egress = spec.egress.unwrap();
        assert_eq!(egress.len(), 3);
    }

    #[test]
    fn custom_allow_all_has_no_restriction_rules() {
        let mut custom = BTreeMap::new();
        custom.insert("policy_type".to_string(), "allow-all".to_string());
        let policy = desired_policy("ns", NetworkPolicyMode::Custom, &custom).unwrap();
        let spec = policy.spec.unwrap();
        assert!(spec.ingress.is_none());
        assert!(spec.egress.is_none());
    }

    #[test]
    fn custom_isolate_with_deny_all_ingress_produces_empty_ingress_rules() {
        let mut custom = BTreeMap::new();
        custom.insert("policy_type".to_string(), "isolate".to_string());
        custom.insert("deny_all_ingress".to_string(), "true".to_string());
        let policy = desired_policy("ns", NetworkPolicyMode::Custom, &custom).unwrap();
        let spec = policy.spec.unwrap();
        assert_eq!(spec.ingress.unwrap().len(), 0);
        assert_eq!(spec.egress.unwrap().len(), 1);
    }
}
