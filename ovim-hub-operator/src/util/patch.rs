use k8s_openapi::{apimachinery::pkg::apis::meta::v1::Time, jiff::Timestamp};
use kube::{
    Api, Client,
    api::{Patch, PatchParams, Resource},
    core::{ClusterResourceScope, NamespaceResourceScope},
};
use ovim_common::MANAGER_NAME;
use ovim_types::*;
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;

pub trait Object<S: Status> {
    fn mut_status(&mut self) -> &mut S;
}

pub trait Status {
    fn set_last_updated(&mut self, last_updated: Time);
}

impl Object<OrganizationStatus> for Organization {
    fn mut_status(&mut self) -> &mut OrganizationStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

impl Status for OrganizationStatus {
    fn set_last_updated(&mut self, _last_updated: Time) {
        // Organization status has no freestanding "last updated" field; the
        // condition list carries its own lastTransitionTime per entry.
    }
}

impl Object<VirtualDataCenterStatus> for VirtualDataCenter {
    fn mut_status(&mut self) -> &mut VirtualDataCenterStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

impl Status for VirtualDataCenterStatus {
    fn set_last_updated(&mut self, last_updated: Time) {
        self.last_reconcile = Some(last_updated);
    }
}

/// Patches a cluster-scoped resource's status with the provided function.
/// Computes a JSON-merge diff against the unmodified instance so unchanged
/// status fields never trigger a write (idempotence).
pub async fn patch_status_cluster<S: Status, T>(
    client: Client,
    instance: &T,
    f: impl FnOnce(&mut S),
) -> Result<T, kube::Error>
where
    <T as Resource>::DynamicType: Default,
    T: Clone
        + Resource<Scope = ClusterResourceScope>
        + Object<S>
        + Serialize
        + DeserializeOwned
        + Debug,
{
    let patch = Patch::Json::<T>(build_status_patch(instance, f));
    let name = instance.meta().name.as_deref().unwrap();
    let api: Api<T> = Api::all(client);
    api.patch_status(name, &PatchParams::apply(MANAGER_NAME), &patch)
        .await
}

/// Namespaced equivalent of [`patch_status_cluster`].
pub async fn patch_status<S: Status, T>(
    client: Client,
    instance: &T,
    f: impl FnOnce(&mut S),
) -> Result<T, kube::Error>
where
    <T as Resource>::DynamicType: Default,
    T: Clone
        + Resource<Scope = NamespaceResourceScope>
        + Object<S>
        + Serialize
        + DeserializeOwned
        + Debug,
{
    let patch = Patch::Json::<T>(build_status_patch(instance, f));
    let name = instance.meta().name.as_deref().unwrap();
    let namespace = instance.meta().namespace.as_deref().unwrap();
    let api: Api<T> = Api::namespaced(client, namespace);
    api.patch_status(name, &PatchParams::apply(MANAGER_NAME), &patch)
        .await
}

fn build_status_patch<S: Status, T>(instance: &T, f: impl FnOnce(&mut S)) -> json_patch::Patch
where
    T: Clone + Object<S> + Serialize,
{
    let mut modified = instance.clone();
    let status = modified.mut_status();
    f(status);
    status.set_last_updated(Time::from(Timestamp::now()));
    json_patch::diff(
        &serde_json::to_value(instance).unwrap(),
        &serde_json::to_value(&modified).unwrap(),
    )
}

pub fn hash_spec<T: serde::Serialize>(spec: &T) -> String {
    use sha2::{Digest, Sha256};
    let bytes = serde_json::to_vec(spec).unwrap();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}
