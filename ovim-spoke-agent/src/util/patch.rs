use k8s_openapi::{apimachinery::pkg::apis::meta::v1::Time, jiff::Timestamp};
use kube::{
    Api, Client,
    api::{Patch, PatchParams},
};
use ovim_common::MANAGER_NAME;
use ovim_types::{VirtualDataCenter, VirtualDataCenterStatus};

/// Patches a `VirtualDataCenter`'s status with the provided function.
/// Computes a JSON-merge diff against the unmodified instance so unchanged
/// status fields never trigger a write.
pub async fn patch_status(
    client: Client,
    instance: &VirtualDataCenter,
    f: impl FnOnce(&mut VirtualDataCenterStatus),
) -> Result<VirtualDataCenter, kube::Error> {
    let mut modified = instance.clone();
    let status = modified.status.get_or_insert_with(Default::default);
    f(status);
    status.last_reconcile = Some(Time::from(Timestamp::now()));

    let patch = Patch::Json::<VirtualDataCenter>(json_patch::diff(
        &serde_json::to_value(instance).unwrap(),
        &serde_json::to_value(&modified).unwrap(),
    ));
    let namespace = instance.metadata.namespace.as_deref().unwrap();
    let name = instance.metadata.name.as_deref().unwrap();
    let api: Api<VirtualDataCenter> = Api::namespaced(client, namespace);
    api.patch_status(name, &PatchParams::apply(MANAGER_NAME), &patch).await
}
