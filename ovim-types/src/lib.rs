use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

fn default_true() -> bool {
    true
}

fn default_zero_quantity() -> String {
    "0".to_string()
}

// ---------------------------------------------------------------------
// Organization
// ---------------------------------------------------------------------

#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "ovim.io",
    version = "v1",
    kind = "Organization",
    plural = "organizations",
    derive = "PartialEq",
    status = "OrganizationStatus"
)]
#[kube(derive = "Default")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.phase\", \"name\": \"PHASE\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.namespace\", \"name\": \"NAMESPACE\", \"type\": \"string\" }"
)]
pub struct OrganizationSpec {
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
    #[serde(default)]
    pub catalogs: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct OrganizationStatus {
    #[serde(default)]
    pub namespace: Option<String>,
    pub phase: OrganizationPhase,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub vdc_count: u32,
    #[serde(default)]
    pub last_rbac_sync: Option<Time>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum OrganizationPhase {
    #[default]
    Pending,
    Active,
    Failed,
}

impl FromStr for OrganizationPhase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Active" => Ok(Self::Active),
            "Failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

impl fmt::Display for OrganizationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Active => write!(f, "Active"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

// ---------------------------------------------------------------------
// VirtualDataCenter
// ---------------------------------------------------------------------

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct VdcQuota {
    pub cpu: String,
    pub memory: String,
    pub storage: String,
    #[serde(default)]
    pub pods: Option<u32>,
    #[serde(default)]
    pub virtual_machines: Option<u32>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct VdcLimitRange {
    #[serde(default)]
    pub min_cpu: Option<String>,
    #[serde(default)]
    pub max_cpu: Option<String>,
    #[serde(default)]
    pub min_memory: Option<String>,
    #[serde(default)]
    pub max_memory: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkPolicyMode {
    #[default]
    #[serde(rename = "")]
    Unset,
    Default,
    Isolated,
    Custom,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "kebab-case")]
pub enum VdcKind {
    #[default]
    HubManaged,
    SpokeLocal,
}

#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "ovim.io",
    version = "v1",
    kind = "VirtualDataCenter",
    plural = "virtualdatacenters",
    derive = "PartialEq",
    status = "VirtualDataCenterStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.phase\", \"name\": \"PHASE\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.namespace\", \"name\": \"NAMESPACE\", \"type\": \"string\" }"
)]
pub struct VirtualDataCenterSpec {
    pub organization_ref: String,
    pub zone_id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub quota: VdcQuota,
    #[serde(default)]
    pub limit_range: Option<VdcLimitRange>,
    #[serde(default)]
    pub network_policy: NetworkPolicyMode,
    #[serde(default)]
    pub custom_network_config: BTreeMap<String, String>,
    #[serde(default)]
    pub vdc_type: VdcKind,
    #[serde(default)]
    pub hub_operation_id: Option<String>,
    #[serde(default)]
    pub org_namespace: Option<String>,
    #[serde(default)]
    pub target_namespace: Option<String>,
    #[serde(default)]
    pub reconcile_until_success: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct VdcResourceUsage {
    #[serde(default = "default_zero_quantity")]
    pub cpu_used: String,
    #[serde(default = "default_zero_quantity")]
    pub memory_used: String,
    #[serde(default = "default_zero_quantity")]
    pub storage_used: String,
}

impl Default for VdcResourceUsage {
    fn default() -> Self {
        Self {
            cpu_used: default_zero_quantity(),
            memory_used: default_zero_quantity(),
            storage_used: default_zero_quantity(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum VdcPhase {
    #[default]
    Pending,
    Active,
    Failed,
    Suspended,
    DeletionPending,
    DeletionFailed,
}

impl FromStr for VdcPhase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Active" => Ok(Self::Active),
            "Failed" => Ok(Self::Failed),
            "Suspended" => Ok(Self::Suspended),
            "DeletionPending" => Ok(Self::DeletionPending),
            "DeletionFailed" => Ok(Self::DeletionFailed),
            _ => Err(()),
        }
    }
}

impl fmt::Display for VdcPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Active => write!(f, "Active"),
            Self::Failed => write!(f, "Failed"),
            Self::Suspended => write!(f, "Suspended"),
            Self::DeletionPending => write!(f, "DeletionPending"),
            Self::DeletionFailed => write!(f, "DeletionFailed"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum HubSyncStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct VirtualDataCenterStatus {
    #[serde(default)]
    pub namespace: Option<String>,
    pub phase: VdcPhase,
    #[serde(default)]
    pub resource_usage: VdcResourceUsage,
    #[serde(default)]
    pub total_pods: u32,
    #[serde(default)]
    pub total_vms: u32,
    #[serde(default)]
    pub last_metrics_update: Option<Time>,
    #[serde(default)]
    pub last_reconcile: Option<Time>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub hub_sync_status: HubSyncStatus,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub last_hub_sync: Option<Time>,
    /// Spec generation the status last converged against. Used to tell a
    /// status-only update (metrics, condition bookkeeping) apart from a
    /// real spec change so the reconciler can skip the former.
    #[serde(default)]
    pub observed_generation: Option<i64>,
}

// ---------------------------------------------------------------------
// Wire types shared by hub and spoke (not CRDs)
// ---------------------------------------------------------------------

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    CreateVdc,
    DeleteVdc,
    CreateVm,
    DeleteVm,
    StartVm,
    StopVm,
    GetVmStatus,
    ListVms,
    GetHealth,
    GetMetrics,
    SyncTemplates,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_value(self).unwrap_or_default();
        write!(f, "{}", s.as_str().unwrap_or("unknown"))
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Operation {
    pub id: String,
    #[serde(rename = "type")]
    pub op_type: OperationType,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_operation_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_operation_timeout_secs() -> u64 {
    30
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationExecStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct OperationResult {
    pub id: String,
    pub status: OperationExecStatus,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct AgentMetrics {
    #[serde(default)]
    pub operations_processed: u64,
    #[serde(default)]
    pub operations_failed: u64,
    #[serde(default)]
    pub vdcs_managed: u64,
    #[serde(default)]
    pub vms_managed: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct StatusReport {
    pub agent_id: String,
    pub cluster_id: String,
    pub zone_id: String,
    pub status: String,
    pub version: String,
    #[serde(default)]
    pub metrics: AgentMetrics,
    #[serde(default)]
    pub vdcs: Vec<String>,
    #[serde(default)]
    pub vms: Vec<String>,
    #[serde(default)]
    pub last_hub_contact: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_type_serializes_snake_case() {
        let json = serde_json::to_string(&OperationType::CreateVdc).unwrap();
        assert_eq!(json, "\"create_vdc\"");
        assert_eq!(OperationType::CreateVdc.to_string(), "create_vdc");
    }

    #[test]
    fn vdc_phase_round_trips_through_display_and_from_str() {
        for phase in [
            VdcPhase::Pending,
            VdcPhase::Active,
            VdcPhase::Failed,
            VdcPhase::Suspended,
            VdcPhase::DeletionPending,
            VdcPhase::DeletionFailed,
        ] {
            let parsed: VdcPhase = phase.to_string().parse().unwrap();
            assert_eq!(parsed, phase);
        }
    }

    #[test]
    fn network_policy_mode_empty_string_is_unset() {
        let mode: NetworkPolicyMode = serde_json::from_str("\"\"").unwrap();
        assert_eq!(mode, NetworkPolicyMode::Unset);
    }
}
