use k8s_openapi::api::rbac::v1::RoleBinding;
use kube::{Api, Client, ResourceExt, api::PostParams};
use ovim_common::annotations;
use ovim_types::*;
use std::collections::HashSet;

use crate::organizations::actions::role_binding;
use crate::util::Error;
use crate::vdcs::actions::vdc_admin_binding_name;

/// Ensures `vdc-admin-<group>` bindings in `namespace` exactly match `admins`.
/// Returns whether anything changed.
pub async fn sync_vdc_admins(client: Client, namespace: &str, admins: &[String]) -> Result<bool, Error> {
    let api: Api<RoleBinding> = Api::namespaced(client, namespace);
    let existing = api
        .list(&kube::api::ListParams::default().labels(&format!(
            "managed-by=ovim,{}={}",
            annotations::LABEL_TYPE,
            annotations::TYPE_VDC_ADMIN
        )))
        .await?;

    let desired_names: HashSet<String> = admins.iter().map(|g| vdc_admin_binding_name(g)).collect();
    let mut changed = false;

    for rb in existing.items.iter() {
        let name = rb.name_any();
        if !desired_names.contains(&name) {
            api.delete(&name, &Default::default()).await.ok();
            changed = true;
        }
    }

    for group in admins {
        let name = vdc_admin_binding_name(group);
        let desired = role_binding(&name, group, namespace, "ovim:vdc-admin");
        match api.get_opt(&name).await? {
            Some(existing) if existing.subjects == desired.subjects && existing.role_ref == desired.role_ref => {}
            Some(_) => {
                api.replace(&name, &PostParams::default(), &desired).await?;
                changed = true;
            }
            None => {
                match api.create(&PostParams::default(), &desired).await {
                    Ok(_) => changed = true,
                    Err(kube::Error::Api(ae)) if ae.code == 409 => {}
                    Err(e) => return Err(Error::from(e)),
                }
            }
        }
    }
    Ok(changed)
}

pub async fn list_vdcs(client: Client, namespace: &str) -> Result<Vec<VirtualDataCenter>, Error> {
    let api: Api<VirtualDataCenter> = Api::namespaced(client, namespace);
    Ok(api.list(&Default::default()).await?.items)
}
