//! Outbound HTTPS client for everything the spoke reports to the hub:
//! periodic status reports, VDC sync/deletion receipts and operation
//! results. Retries follow the bounded-jitter exponential policy.

use ovim_common::args::HubClientArgs;
use ovim_common::backoff::backoff_bounded_jitter;
use ovim_types::{OperationResult, StatusReport};
use reqwest::{Client, StatusCode};
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 6;
const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(60);

pub struct HubClient {
    http: Client,
    base_url: String,
    agent_id: String,
    cluster_id: String,
    zone_id: String,
    version: String,
}

impl HubClient {
    pub fn new(args: &HubClientArgs, agent_id: &str, cluster_id: &str, zone_id: &str, version: &str) -> anyhow::Result<Self> {
        let mut builder = Client::builder().timeout(Duration::from_secs(args.timeout_secs));
        if args.tls_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let (Some(cert_path), Some(key_path)) = (&args.cert_path, &args.key_path) {
            let mut cert_bytes = std::fs::read(cert_path)?;
            let key_bytes = std::fs::read(key_path)?;
            cert_bytes.extend_from_slice(&key_bytes);
            let identity = reqwest::Identity::from_pem(&cert_bytes)?;
            builder = builder.identity(identity);
        }
        if let Some(ca_path) = &args.ca_path {
            let ca_bytes = std::fs::read(ca_path)?;
            let ca = reqwest::Certificate::from_pem(&ca_bytes)?;
            builder = builder.add_root_certificate(ca);
        }
        let http = builder.build()?;
        Ok(Self {
            http,
            base_url: format!("{}://{}", args.protocol, args.endpoint),
            agent_id: agent_id.to_string(),
            cluster_id: cluster_id.to_string(),
            zone_id: zone_id.to_string(),
            version: version.to_string(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .header("X-Agent-ID", &self.agent_id)
            .header("X-Cluster-ID", &self.cluster_id)
            .header("X-Zone-ID", &self.zone_id)
            .header("X-Agent-Version", &self.version)
    }

    pub async fn send_status_report(&self, report: &StatusReport) -> anyhow::Result<()> {
        self.send_with_retry(reqwest::Method::POST, "/api/v1/spoke/status", report).await
    }

    pub async fn send_operation_result(&self, result: &OperationResult) -> anyhow::Result<()> {
        let path = format!("/api/v1/spoke/operations/{}/result", result.id);
        self.send_with_retry(reqwest::Method::POST, &path, result).await
    }

    pub async fn send_vdc_status(&self, payload: &serde_json::Value) -> anyhow::Result<serde_json::Value> {
        self.send_with_retry_response(reqwest::Method::POST, "/api/v1/spoke/vdc-status", payload).await
    }

    pub async fn send_vdc_deletion_receipt(&self, payload: &serde_json::Value) -> anyhow::Result<()> {
        self.send_with_retry(reqwest::Method::POST, "/api/v1/spoke/vdc-deletion", payload).await
    }

    async fn send_with_retry<B: serde::Serialize>(&self, method: reqwest::Method, path: &str, body: &B) -> anyhow::Result<()> {
        self.send_with_retry_response(method, path, body).await.map(|_| ())
    }

    async fn send_with_retry_response<B: serde::Serialize>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> anyhow::Result<serde_json::Value> {
        let mut last_error = None;
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(backoff_bounded_jitter(BASE_DELAY, MAX_DELAY, attempt as usize)).await;
            }
            match self.request(method.clone(), path).json(body).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp.json::<serde_json::Value>().await.or(Ok(serde_json::Value::Null));
                    }
                    if !is_retryable_status(status) {
                        anyhow::bail!("hub returned non-retryable status {status}");
                    }
                    last_error = Some(anyhow::anyhow!("hub returned retryable status {status}"));
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    last_error = Some(anyhow::anyhow!("transport error: {e}"));
                }
                Err(e) => return Err(anyhow::anyhow!("non-retryable transport error: {e}")),
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("exhausted retries")))
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_429_are_retryable() {
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::GATEWAY_TIMEOUT));
    }

    #[test]
    fn client_errors_other_than_429_are_not_retryable() {
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
    }
}
