use futures::stream::StreamExt;
use kube::{
    Api, Client, ResourceExt,
    runtime::{Controller, controller::Action},
};
use owo_colors::OwoColorize;
use ovim_common::{annotations, colors::FG2, store::ObjectStore};
use ovim_types::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::adapter::{KubevirtAdapter, VmAdapter, VmPowerPhase};
use crate::util::{Error, PROBE_INTERVAL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmRecordStatus {
    Pending,
    Creating,
    Running,
    Stopped,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmRecord {
    pub id: String,
    pub vdc_id: String,
    pub name: String,
    pub status: VmRecordStatus,
    #[serde(default)]
    pub ip: Option<String>,
}

pub struct ContextData {
    pub client: Client,
    pub store: Arc<dyn ObjectStore>,
    pub adapter: Arc<dyn VmAdapter>,
    #[cfg(feature = "metrics")]
    pub metrics: crate::util::metrics::ControllerMetrics,
}

impl ContextData {
    pub fn new(client: Client, store: Arc<dyn ObjectStore>) -> Self {
        let adapter: Arc<dyn VmAdapter> = Arc::new(KubevirtAdapter::new(client.clone()));
        Self {
            client,
            store,
            adapter,
            #[cfg(feature = "metrics")]
            metrics: crate::util::metrics::ControllerMetrics::new("vms"),
        }
    }
}

pub async fn run(client: Client, store: Arc<dyn ObjectStore>, shutdown: CancellationToken) {
    let context: Arc<ContextData> = Arc::new(ContextData::new(client.clone(), store));
    crate::util::leader::run_leader_elected(client.clone(), "ovim-vm-controller-lock", shutdown, || {
        let client = client.clone();
        let context = context.clone();
        tokio::spawn(async move {
            let api: Api<VirtualDataCenter> = Api::all(client);
            println!("{}", "vm controller started".color(FG2));
            Controller::new(api, Default::default())
                .run(reconcile, on_error, context)
                .for_each(|_res| async move {})
                .await;
        })
    })
    .await;
}

async fn reconcile(vdc: Arc<VirtualDataCenter>, ctx: Arc<ContextData>) -> Result<Action, Error> {
    let vdc_id = vdc.name_any();

    #[cfg(feature = "metrics")]
    ctx.metrics.reconcile_counter.with_label_values(&[&vdc_id, ""]).inc();

    let Some(namespace) = vdc.status.as_ref().and_then(|s| s.namespace.clone()) else {
        return Ok(Action::requeue(PROBE_INTERVAL));
    };

    let records = ctx
        .store
        .list_prefix(&format!("vm:{vdc_id}:"))
        .await
        .map_err(Error::Store)?;

    for (key, value) in records {
        let Ok(mut record) = serde_json::from_value::<VmRecord>(value) else {
            continue;
        };
        converge_one(&ctx, &namespace, &mut record).await?;
        if record.status == VmRecordStatus::Deleted {
            ctx.store.delete(&key).await.map_err(Error::Store)?;
        } else {
            ctx.store
                .upsert(&key, serde_json::to_value(&record).unwrap())
                .await
                .map_err(Error::Store)?;
        }
    }

    Ok(Action::requeue(PROBE_INTERVAL))
}

async fn converge_one(ctx: &ContextData, namespace: &str, record: &mut VmRecord) -> Result<(), Error> {
    let observed = ctx.adapter.get(namespace, &record.name).await?;

    match record.status {
        VmRecordStatus::Pending => {
            if observed.is_none() {
                ctx.adapter.create(namespace, &record.name).await?;
            }
            record.status = VmRecordStatus::Creating;
        }
        VmRecordStatus::Creating => match &observed {
            None => ctx.adapter.create(namespace, &record.name).await?,
            Some(vm) if vm.phase == VmPowerPhase::Running => record.status = VmRecordStatus::Running,
            Some(_) => {}
        },
        VmRecordStatus::Running => match &observed {
            None => ctx.adapter.create(namespace, &record.name).await?,
            Some(vm) if vm.phase != VmPowerPhase::Running => ctx.adapter.start(namespace, &record.name).await?,
            Some(_) => {}
        },
        VmRecordStatus::Stopped => {
            if let Some(vm) = &observed {
                if vm.phase == VmPowerPhase::Running {
                    ctx.adapter.stop(namespace, &record.name).await?;
                }
            }
        }
        VmRecordStatus::Deleted => {
            if observed.is_some() {
                ctx.adapter.delete(namespace, &record.name).await?;
            }
            return Ok(());
        }
    }

    if let Some(vm) = observed {
        if record.ip != vm.ip {
            record.ip = vm.ip;
        }
    }
    Ok(())
}

fn on_error(vdc: Arc<VirtualDataCenter>, error: &Error, _ctx: Arc<ContextData>) -> Action {
    eprintln!("{}", format!("vm reconcile error for {}: {error}", vdc.name_any()).red());
    Action::requeue(crate::util::ERROR_REQUEUE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeAdapter {
        present: Mutex<std::collections::HashMap<String, VmPowerPhase>>,
    }

    #[async_trait]
    impl VmAdapter for FakeAdapter {
        async fn get(&self, _namespace: &str, name: &str) -> Result<Option<super::super::adapter::ObservedVm>, Error> {
            Ok(self.present.lock().unwrap().get(name).map(|phase| super::super::adapter::ObservedVm {
                phase: *phase,
                ip: None,
            }))
        }
        async fn create(&self, _namespace: &str, name: &str) -> Result<(), Error> {
            self.present.lock().unwrap().insert(name.to_string(), VmPowerPhase::Running);
            Ok(())
        }
        async fn start(&self, _namespace: &str, name: &str) -> Result<(), Error> {
            self.present.lock().unwrap().insert(name.to_string(), VmPowerPhase::Running);
            Ok(())
        }
        async fn stop(&self, _namespace: &str, name: &str) -> Result<(), Error> {
            self.present.lock().unwrap().insert(name.to_string(), VmPowerPhase::Stopped);
            Ok(())
        }
        async fn delete(&self, _namespace: &str, name: &str) -> Result<(), Error> {
            self.present.lock().unwrap().remove(name);
            Ok(())
        }
    }

    fn ctx_with(adapter: FakeAdapter) -> ContextData {
        ContextData {
            client: unreachable_client(),
            store: Arc::new(ovim_common::store::InMemoryStore::new()),
            adapter: Arc::new(adapter),
            #[cfg(feature = "metrics")]
            metrics: crate::util::metrics::ControllerMetrics::new("vms-test"),
        }
    }

    fn unreachable_client() -> Client {
        // Reconcile tests exercise `converge_one` only, never touching the
        // real Kubernetes API, so an unconfigured client is fine here.
        Client::try_from(kube::Config::new("https://unused.invalid".parse().unwrap())).unwrap()
    }

    #[tokio::test]
    async fn pending_record_with_absent_vm_gets_created() {
        let adapter = FakeAdapter { present: Mutex::new(Default::default()) };
        let ctx = ctx_with(adapter);
        let mut record = VmRecord { id: "vm-1".into(), vdc_id: "vdc-a".into(), name: "vm-1".into(), status: VmRecordStatus::Pending, ip: None };
        converge_one(&ctx, "ns", &mut record).await.unwrap();
        assert!(ctx.adapter.get("ns", "vm-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stopped_record_with_running_vm_gets_stopped() {
        let adapter = FakeAdapter { present: Mutex::new(std::collections::HashMap::from([("vm-1".to_string(), VmPowerPhase::Running)])) };
        let ctx = ctx_with(adapter);
        let mut record = VmRecord { id: "vm-1".into(), vdc_id: "vdc-a".into(), name: "vm-1".into(), status: VmRecordStatus::Stopped, ip: None };
        converge_one(&ctx, "ns", &mut record).await.unwrap();
        let observed = ctx.adapter.get("ns", "vm-1").await.unwrap().unwrap();
        assert_eq!(observed.phase, VmPowerPhase::Stopped);
    }

    #[tokio::test]
    async fn deleted_record_removes_the_vm() {
        let adapter = FakeAdapter { present: Mutex::new(std::collections::HashMap::from([("vm-1".to_string(), VmPowerPhase::Running)])) };
        let ctx = ctx_with(adapter);
        let mut record = VmRecord { id: "vm-1".into(), vdc_id: "vdc-a".into(), name: "vm-1".into(), status: VmRecordStatus::Deleted, ip: None };
        converge_one(&ctx, "ns", &mut record).await.unwrap();
        assert!(ctx.adapter.get("ns", "vm-1").await.unwrap().is_none());
    }
}
