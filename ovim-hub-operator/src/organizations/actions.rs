use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
use kube::{
    Api, Client, ResourceExt,
    api::{ObjectMeta, PostParams},
};
use ovim_common::annotations;
use ovim_types::*;
use std::collections::BTreeMap;

use crate::util::{Error, patch::patch_status_cluster};

pub fn org_namespace_name(org_name: &str) -> String {
    format!("org-{}", org_name.to_lowercase())
}

pub fn org_admin_binding_name(group: &str) -> String {
    format!("org-admin-{group}")
}

pub async fn ensure_namespace(client: Client, org: &Organization) -> Result<String, Error> {
    let ns_name = org_namespace_name(&org.name_any());
    let api: Api<Namespace> = Api::all(client);
    if api.get_opt(&ns_name).await?.is_some() {
        return Ok(ns_name);
    }
    let mut labels = BTreeMap::new();
    labels.insert(annotations::APP_NAME.to_string(), annotations::APP_NAME_VALUE.to_string());
    labels.insert(annotations::LABEL_TYPE.to_string(), "org".to_string());
    labels.insert(annotations::LABEL_ORG.to_string(), org.name_any());
    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(ns_name.clone()),
            labels: Some(labels),
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

/// Ensures one RoleBinding per admin group in `org.spec.admins`, and removes
/// bindings for groups no longer listed.
pub async fn sync_admin_rbac(client: Client, org: &Organization, namespace: &str) -> Result<(), Error> {
    let api: Api<RoleBinding> = Api::namespaced(client, namespace);
    let existing = api
        .list(&kube::api::ListParams::default().labels(&format!(
            "managed-by=ovim,{}={}",
            annotations::LABEL_TYPE,
            annotations::TYPE_ORG_ADMIN
        )))
        .await?;

    let desired: std::collections::HashSet<String> =
        org.spec.admins.iter().map(|g| org_admin_binding_name(g)).collect();

    for rb in existing.items.iter() {
        let name = rb.name_any();
        if !desired.contains(&name) {
            api.delete(&name, &Default::default()).await.ok();
        }
    }

    for group in &org.spec.admins {
        let name = org_admin_binding_name(group);
        if api.get_opt(&name).await?.is_some() {
            continue;
        }
        let rb = role_binding(&name, group, namespace, "ovim:org-admin");
        match api.create(&PostParams::default(), &rb).await {
            Ok(_) => {}
            Err(kube::Error::Api(ae)) if ae.code == 409 => {}
            Err(e) => return Err(Error::from(e)),
        }
    }
    Ok(())
}

pub fn role_binding(name: &str, group: &str, namespace: &str, cluster_role: &str) -> RoleBinding {
    let mut labels = BTreeMap::new();
    labels.insert("managed-by".to_string(), "ovim".to_string());
    labels.insert(annotations::LABEL_TYPE.to_string(), annotations::TYPE_ORG_ADMIN.to_string());
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: cluster_role.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "Group".to_string(),
            name: group.to_string(),
            api_group: Some("rbac.authorization.k8s.io".to_string()),
            ..Default::default()
        }]),
    }
}

pub async fn set_active(client: Client, org: &Organization, namespace: &str) -> Result<(), Error> {
    patch_status_cluster::<OrganizationStatus, Organization>(client, org, |status| {
        status.namespace = Some(namespace.to_string());
        status.phase = OrganizationPhase::Active;
        upsert_condition(&mut status.conditions, "Ready", "True", "OrganizationReady", "namespace and RBAC converged");
    })
    .await?;
    Ok(())
}

pub async fn set_deletion_blocked(client: Client, org: &Organization, vdc_count: usize) -> Result<(), Error> {
    patch_status_cluster::<OrganizationStatus, Organization>(client, org, |status| {
        status.phase = OrganizationPhase::Failed;
        upsert_condition(
            &mut status.conditions,
            "ReadyForDeletion",
            "False",
            "VDCsExist",
            &format!("{vdc_count} VDC(s) still present"),
        );
    })
    .await?;
    Ok(())
}

pub async fn set_failed(client: Client, org: &Organization, reason: &str, message: &str) -> Result<(), Error> {
    patch_status_cluster::<OrganizationStatus, Organization>(client, org, |status| {
        status.phase = OrganizationPhase::Failed;
        upsert_condition(&mut status.conditions, "Ready", "False", reason, message);
    })
    .await?;
    Ok(())
}

pub fn upsert_condition(
    conditions: &mut Vec<k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition>,
    cond_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
    let now = Time::from(k8s_openapi::jiff::Timestamp::now());
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == cond_type) {
        if existing.status != status || existing.reason != reason {
            existing.status = status.to_string();
            existing.reason = reason.to_string();
            existing.message = message.to_string();
            existing.last_transition_time = now;
        }
        return;
    }
    conditions.push(Condition {
        type_: cond_type.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
        last_transition_time: now,
        observed_generation: None,
    });
}
