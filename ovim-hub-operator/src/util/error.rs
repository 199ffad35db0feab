#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Kubernetes reported error: {source}")]
    Kube {
        #[from]
        source: kube::Error,
    },

    #[error("invalid user input: {0}")]
    UserInput(String),

    #[error("failed to parse quantity: {0}")]
    Quota(#[from] ovim_common::quota::QuotaError),

    #[error("json error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("external store error: {0}")]
    Store(#[source] anyhow::Error),
}
