pub mod annotations;
pub mod args;
pub mod backoff;
pub mod colors;
pub mod labels;
pub mod metrics;
pub mod quota;
pub mod request_context;
pub mod response;
pub mod shutdown;
pub mod store;

/// Name advertised as the field manager on every status patch this system issues.
pub const MANAGER_NAME: &str = "ovim-controller";

/// Process-wide setup every binary in this workspace runs before touching
/// Kubernetes or the network: color override from the environment, and the
/// default crypto provider TLS clients need before their first handshake.
pub fn init() {
    let disable_colors = ["1", "true"].contains(
        &std::env::var("DISABLE_COLORS")
            .unwrap_or_else(|_| String::new())
            .to_lowercase()
            .as_str(),
    );
    owo_colors::set_override(!disable_colors);
    install_rustls_provider();
}

pub fn install_rustls_provider() {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("install aws-lc-rs provider");
}

pub fn signal_ready() {
    let _ = std::fs::write("/tmp/ready", "ready");
}
