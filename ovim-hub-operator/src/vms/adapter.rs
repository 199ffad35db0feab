//! Thin facade over the KubeVirt `VirtualMachine` CRD, addressed through
//! dynamic typing so this crate does not need a compile-time dependency on
//! the KubeVirt API types.

use async_trait::async_trait;
use kube::{
    Client,
    api::{Api, ApiResource, DynamicObject, GroupVersionKind, ObjectMeta, Patch, PatchParams, PostParams},
};
use serde_json::json;

use crate::util::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmPowerPhase {
    Running,
    Stopped,
    Other,
}

pub struct ObservedVm {
    pub phase: VmPowerPhase,
    pub ip: Option<String>,
}

#[async_trait]
pub trait VmAdapter: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ObservedVm>, Error>;
    async fn create(&self, namespace: &str, name: &str) -> Result<(), Error>;
    async fn start(&self, namespace: &str, name: &str) -> Result<(), Error>;
    async fn stop(&self, namespace: &str, name: &str) -> Result<(), Error>;
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

pub struct KubevirtAdapter {
    client: Client,
}

impl KubevirtAdapter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn resource() -> ApiResource {
        ApiResource::from_gvk(&GroupVersionKind::gvk("kubevirt.io", "v1", "VirtualMachine"))
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &Self::resource())
    }
}

fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(ae) if ae.code == 404)
        || error.to_string().contains("VirtualMachine not found")
}

#[async_trait]
impl VmAdapter for KubevirtAdapter {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ObservedVm>, Error> {
        match self.api(namespace).get(name).await {
            Ok(obj) => {
                let running = obj
                    .data
                    .get("status")
                    .and_then(|s| s.get("printableStatus"))
                    .and_then(|v| v.as_str())
                    .map(|s| s == "Running")
                    .unwrap_or(false);
                let ip = obj
                    .data
                    .get("status")
                    .and_then(|s| s.get("interfaces"))
                    .and_then(|ifaces| ifaces.as_array())
                    .and_then(|arr| arr.first())
                    .and_then(|iface| iface.get("ipAddress"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                Ok(Some(ObservedVm {
                    phase: if running { VmPowerPhase::Running } else { VmPowerPhase::Other },
                    ip,
                }))
            }
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(Error::from(e)),
        }
    }

    async fn create(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let object = DynamicObject {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            types: Some(kube::api::TypeMeta {
                api_version: "kubevirt.io/v1".to_string(),
                kind: "VirtualMachine".to_string(),
            }),
            data: json!({ "spec": { "running": true } }),
        };
        match self.api(namespace).create(&PostParams::default(), &object).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
            Err(e) => Err(Error::from(e)),
        }
    }

    async fn start(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.set_running(namespace, name, true).await
    }

    async fn stop(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.set_running(namespace, name, false).await
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        match self.api(namespace).delete(name, &Default::default()).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(Error::from(e)),
        }
    }
}

impl KubevirtAdapter {
    async fn set_running(&self, namespace: &str, name: &str, running: bool) -> Result<(), Error> {
        let patch = json!({ "spec": { "running": running } });
        match self
            .api(namespace)
            .patch(name, &PatchParams::apply(ovim_common::MANAGER_NAME), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(Error::from(e)),
        }
    }
}
