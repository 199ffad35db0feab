//! `clap`-derived configuration groups shared by the hub operator and the
//! spoke agent. Each group validates itself once at startup rather than
//! scattering checks through the runtime path.

use clap::Parser;

#[derive(Parser, Debug, Clone)]
pub struct AgentArgs {
    #[arg(long, env = "AGENT_ID")]
    pub agent_id: String,

    #[arg(long, env = "CLUSTER_ID")]
    pub cluster_id: String,

    #[arg(long, env = "ZONE_ID")]
    pub zone_id: String,

    #[arg(long, env = "VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    pub version: String,
}

impl AgentArgs {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.agent_id.is_empty(), "AGENT_ID must not be empty");
        anyhow::ensure!(!self.cluster_id.is_empty(), "CLUSTER_ID must not be empty");
        anyhow::ensure!(!self.zone_id.is_empty(), "ZONE_ID must not be empty");
        Ok(())
    }
}

#[derive(Parser, Debug, Clone)]
pub struct HubClientArgs {
    #[arg(long, env = "HUB_ENDPOINT")]
    pub endpoint: String,

    #[arg(long, env = "HUB_PROTOCOL", default_value = "https")]
    pub protocol: String,

    #[arg(long, env = "HUB_TLS_ENABLED", default_value_t = true)]
    pub tls_enabled: bool,

    #[arg(long, env = "HUB_TLS_SKIP_VERIFY", default_value_t = false)]
    pub tls_skip_verify: bool,

    #[arg(long, env = "HUB_CERT_PATH")]
    pub cert_path: Option<String>,

    #[arg(long, env = "HUB_KEY_PATH")]
    pub key_path: Option<String>,

    #[arg(long, env = "HUB_CA_PATH")]
    pub ca_path: Option<String>,

    #[arg(long, env = "HUB_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    #[arg(long, env = "HUB_RETRY_INTERVAL_SECS", default_value_t = 1)]
    pub retry_interval_secs: u64,

    #[arg(long, env = "HUB_MAX_RETRIES", default_value_t = 6)]
    pub max_retries: u32,

    #[arg(long, env = "HUB_KEEP_ALIVE_SECS", default_value_t = 60)]
    pub keep_alive_secs: u64,
}

impl HubClientArgs {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.endpoint.is_empty(), "HUB_ENDPOINT must not be empty");
        anyhow::ensure!(
            self.protocol == "https",
            "HUB_PROTOCOL must be https, got {:?}",
            self.protocol
        );
        Ok(())
    }
}

#[derive(Parser, Debug, Clone)]
pub struct LocalApiArgs {
    #[arg(long, env = "LOCAL_API_ENABLED", default_value_t = true)]
    pub enabled: bool,

    #[arg(long, env = "LOCAL_API_ADDRESS", default_value = "0.0.0.0")]
    pub address: String,

    #[arg(long, env = "LOCAL_API_PORT", default_value_t = 8090)]
    pub port: u16,

    #[arg(long, env = "LOCAL_API_TLS", default_value_t = false)]
    pub tls: bool,

    #[arg(long, env = "LOCAL_API_CERT_PATH")]
    pub cert_path: Option<String>,

    #[arg(long, env = "LOCAL_API_KEY_PATH")]
    pub key_path: Option<String>,

    /// Externally reachable URL the hub should push operations to. When
    /// unset, composed from `address:port` -- fine for port-forwarded dev use.
    #[arg(long, env = "LOCAL_API_CALLBACK_URL")]
    pub callback_url: Option<String>,
}

impl LocalApiArgs {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.port > 0, "LOCAL_API_PORT must be in (0, 65535]");
        Ok(())
    }

    pub fn callback_url(&self) -> String {
        self.callback_url.clone().unwrap_or_else(|| {
            let scheme = if self.tls { "https" } else { "http" };
            format!("{scheme}://{}:{}", self.address, self.port)
        })
    }
}

#[derive(Parser, Debug, Clone)]
pub struct KubernetesArgs {
    #[arg(long, env = "KUBECONFIG_PATH")]
    pub config_path: Option<String>,

    #[arg(long, env = "IN_CLUSTER", default_value_t = true)]
    pub in_cluster: bool,

    #[arg(long, env = "KUBE_QPS", default_value_t = 50.0)]
    pub qps: f32,

    #[arg(long, env = "KUBE_BURST", default_value_t = 100)]
    pub burst: u32,

    #[arg(long, env = "KUBE_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    #[arg(long, env = "KUBE_RESYNC_INTERVAL_SECS", default_value_t = 300)]
    pub resync_interval_secs: u64,
}

#[derive(Parser, Debug, Clone)]
pub struct MetricsArgs {
    #[arg(long, env = "METRICS_ENABLED", default_value_t = true)]
    pub enabled: bool,

    #[arg(long, env = "METRICS_PORT", default_value_t = 9090)]
    pub port: u16,

    #[arg(long, env = "METRICS_COLLECTION_INTERVAL_SECS", default_value_t = 120)]
    pub collection_interval_secs: u64,

    #[arg(long, env = "METRICS_REPORTING_INTERVAL_SECS", default_value_t = 60)]
    pub reporting_interval_secs: u64,

    #[arg(long, env = "METRICS_RETENTION_PERIOD_SECS", default_value_t = 86400)]
    pub retention_period_secs: u64,

    #[arg(long, env = "METRICS_INCLUDE_NODE_METRICS", default_value_t = false)]
    pub include_node_metrics: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct HealthArgs {
    #[arg(long, env = "HEALTH_ENABLED", default_value_t = true)]
    pub enabled: bool,

    #[arg(long, env = "HEALTH_CHECK_INTERVAL_SECS", default_value_t = 30)]
    pub check_interval_secs: u64,

    #[arg(long, env = "HEALTH_REPORT_INTERVAL_SECS", default_value_t = 60)]
    pub report_interval_secs: u64,

    #[arg(long, env = "HEALTH_TIMEOUT_SECS", default_value_t = 10)]
    pub timeout_secs: u64,

    #[arg(long, env = "HEALTH_FAILURE_THRESHOLD", default_value_t = 3)]
    pub failure_threshold: u32,
}

#[derive(Parser, Debug, Clone)]
pub struct FeatureArgs {
    #[arg(long, env = "FEATURE_VDC_MANAGEMENT", default_value_t = true)]
    pub vdc_management: bool,

    #[arg(long, env = "FEATURE_TEMPLATE_SYNC", default_value_t = false)]
    pub template_sync: bool,

    #[arg(long, env = "FEATURE_NETWORK_POLICIES", default_value_t = true)]
    pub network_policies: bool,

    #[arg(long, env = "FEATURE_LOCAL_API", default_value_t = true)]
    pub local_api: bool,

    #[arg(long, env = "FEATURE_EVENT_RECORDING", default_value_t = true)]
    pub event_recording: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn hub_client_args_reject_non_https_protocol() {
        let args = HubClientArgs {
            endpoint: "hub.example.com".to_string(),
            protocol: "http".to_string(),
            tls_enabled: true,
            tls_skip_verify: false,
            cert_path: None,
            key_path: None,
            ca_path: None,
            timeout_secs: 30,
            retry_interval_secs: 1,
            max_retries: 6,
            keep_alive_secs: 60,
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn local_api_args_reject_zero_port() {
        let args = LocalApiArgs {
            enabled: true,
            address: "0.0.0.0".to_string(),
            port: 0,
            tls: false,
            cert_path: None,
            key_path: None,
            callback_url: None,
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn derived_clap_commands_are_well_formed() {
        AgentArgs::command().debug_assert();
        HubClientArgs::command().debug_assert();
        LocalApiArgs::command().debug_assert();
    }
}
