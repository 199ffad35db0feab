//! Direct KubeVirt `VirtualMachine` access for the operation handlers. Uses
//! dynamic typing so this crate doesn't need a compile-time dependency on the
//! KubeVirt API types, same approach the hub's usage-metrics sweep takes for
//! counting VMs.

use kube::{
    Client,
    api::{Api, ApiResource, DynamicObject, GroupVersionKind, ObjectMeta, Patch, PatchParams, PostParams, TypeMeta},
};
use serde_json::{Value, json};

use crate::util::Error;

fn resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk("kubevirt.io", "v1", "VirtualMachine"))
}

fn api(client: Client, namespace: &str) -> Api<DynamicObject> {
    Api::namespaced_with(client, namespace, &resource())
}

fn not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(ae) if ae.code == 404) || error.to_string().contains("VirtualMachine not found")
}

pub async fn create(client: Client, namespace: &str, name: &str) -> Result<(), Error> {
    let object = DynamicObject {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        types: Some(TypeMeta {
            api_version: "kubevirt.io/v1".to_string(),
            kind: "VirtualMachine".to_string(),
        }),
        data: json!({ "spec": { "running": true } }),
    };
    match api(client, namespace).create(&PostParams::default(), &object).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
        Err(e) => Err(Error::from(e)),
    }
}

pub async fn delete(client: Client, namespace: &str, name: &str) -> Result<(), Error> {
    match api(client, namespace).delete(name, &Default::default()).await {
        Ok(_) => Ok(()),
        Err(e) if not_found(&e) => Ok(()),
        Err(e) => Err(Error::from(e)),
    }
}

pub async fn set_running(client: Client, namespace: &str, name: &str, running: bool) -> Result<(), Error> {
    let patch = json!({ "spec": { "running": running } });
    match api(client, namespace)
        .patch(name, &PatchParams::apply(ovim_common::MANAGER_NAME), &Patch::Merge(&patch))
        .await
    {
        Ok(_) => Ok(()),
        Err(e) if not_found(&e) => Ok(()),
        Err(e) => Err(Error::from(e)),
    }
}

pub async fn status(client: Client, namespace: &str, name: &str) -> Result<Option<Value>, Error> {
    match api(client, namespace).get(name).await {
        Ok(obj) => Ok(Some(obj.data.get("status").cloned().unwrap_or(Value::Null))),
        Err(e) if not_found(&e) => Ok(None),
        Err(e) => Err(Error::from(e)),
    }
}

pub async fn list(client: Client, namespace: &str) -> Result<Vec<String>, Error> {
    let list = api(client, namespace).list(&Default::default()).await?;
    Ok(list.items.into_iter().filter_map(|o| o.metadata.name).collect())
}
