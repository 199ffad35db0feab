use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::{
    Api, Client,
    api::{ApiResource, DynamicObject, GroupVersionKind},
};
use ovim_common::quota;
use ovim_types::VdcResourceUsage;

pub struct MeasuredUsage {
    pub resource_usage: VdcResourceUsage,
    pub total_pods: u32,
    pub total_vms: u32,
}

pub async fn measure(client: Client, namespace: &str) -> Result<MeasuredUsage, crate::util::Error> {
    let pod_api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let pods = pod_api.list(&Default::default()).await?;

    let mut cpu_cores = 0f64;
    let mut memory_bytes = 0u64;
    let total_pods = pods.items.len() as u32;

    for pod in &pods.items {
        let running = pod
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .map(|p| p == "Running")
            .unwrap_or(false);
        if !running {
            continue;
        }
        let Some(spec) = &pod.spec else { continue };
        for container in &spec.containers {
            let Some(resources) = &container.resources else { continue };
            let Some(requests) = &resources.requests else { continue };
            if let Some(cpu) = requests.get("cpu") {
                cpu_cores += quota::parse_cpu_cores(&cpu.0).unwrap_or(0.0);
            }
            if let Some(memory) = requests.get("memory") {
                memory_bytes += quota::parse_quantity_to_bytes(&memory.0).unwrap_or(0);
            }
        }
    }

    let pvc_api: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), namespace);
    let pvcs = pvc_api.list(&Default::default()).await?;
    let mut storage_bytes = 0u64;
    for pvc in &pvcs.items {
        let bound = pvc
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .map(|p| p == "Bound")
            .unwrap_or(false);
        if !bound {
            continue;
        }
        if let Some(storage) = pvc
            .spec
            .as_ref()
            .and_then(|s| s.resources.as_ref())
            .and_then(|r| r.requests.as_ref())
            .and_then(|r| r.get("storage"))
        {
            storage_bytes += quota::parse_quantity_to_bytes(&storage.0).unwrap_or(0);
        }
    }

    let total_vms = count_virtual_machines(client, namespace).await;

    Ok(MeasuredUsage {
        resource_usage: VdcResourceUsage {
            cpu_used: format!("{cpu_cores}"),
            memory_used: memory_bytes.to_string(),
            storage_used: storage_bytes.to_string(),
        },
        total_pods,
        total_vms,
    })
}

/// KubeVirt's `VirtualMachine` CRD may not be installed on every spoke
/// cluster. Its absence is not an error; it just means a count of zero.
async fn count_virtual_machines(client: Client, namespace: &str) -> u32 {
    let gvk = GroupVersionKind::gvk("kubevirt.io", "v1", "VirtualMachine");
    let resource = ApiResource::from_gvk(&gvk);
    let api: Api<DynamicObject> = Api::namespaced_with(client, namespace, &resource);
    match api.list(&Default::default()).await {
        Ok(list) => list.items.len() as u32,
        Err(_) => {
            ovim_common::response::print_warning(format!(
                "kubevirt VirtualMachine API not available in namespace {namespace}, counting 0 VMs"
            ));
            0
        }
    }
}
