//! Errors raised by the scaler's external collaborators

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScalerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned error status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Service '{service}' revision {revision} is stale")]
    StaleRevision { service: String, revision: u64 },

    #[error("Service '{service}' is not in replicated mode")]
    ServiceNotReplicated { service: String },

    #[error("Unexpected response payload: {message}")]
    Decode { message: String },

    #[error("Metric query failed: {message}")]
    QueryFailed { message: String },

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },
}

pub type Result<T> = std::result::Result<T, ScalerError>;

/// Bound a collaborator call so a hung request cannot stall the tick.
pub(crate) async fn with_timeout<T, F>(
    operation: &str,
    limit: std::time::Duration,
    fut: F,
) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ScalerError::Timeout {
            operation: operation.to_string(),
            secs: limit.as_secs(),
        }),
    }
}
