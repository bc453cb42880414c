//! Swarm service directory and scaling actuator
//!
//! The scaler reads replicated services through [`ServiceDirectory`] and changes their
//! replica count through [`ScalingActuator`]. [`DockerSwarmClient`] implements both
//! against the Docker Engine HTTP API; [`LogOnlyActuator`] is the dry-run stand-in.

use crate::error::{Result, ScalerError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Swarm scheduling mode of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceMode {
    Replicated,
    Global,
}

/// Read-only view of a swarm service as seen at the start of a tick
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSnapshot {
    pub name: String,
    pub labels: HashMap<String, String>,
    pub mode: ServiceMode,
    pub replicas: u64,
    /// Optimistic-concurrency token required to update the service
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

/// Lists services that carry a scaling label
#[async_trait]
pub trait ServiceDirectory: Send + Sync {
    /// Replicated services that have `label_key` set
    async fn list_scalable_services(&self, label_key: &str) -> Result<Vec<ServiceSnapshot>>;
}

/// Applies a new replica count to a service
#[async_trait]
pub trait ScalingActuator: Send + Sync {
    /// Fails with [`ScalerError::StaleRevision`] if `revision` is no longer current
    async fn scale_service(&self, name: &str, revision: u64, replicas: u64) -> Result<()>;
}

/// Dry-run actuator: logs the request and reports success
pub struct LogOnlyActuator;

#[async_trait]
impl ScalingActuator for LogOnlyActuator {
    async fn scale_service(&self, name: &str, revision: u64, replicas: u64) -> Result<()> {
        info!(
            service = %name,
            revision,
            replicas,
            "Scale request (log-only mode)"
        );
        Ok(())
    }
}

/// Docker Engine API client for swarm services
pub struct DockerSwarmClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceResponse {
    version: VersionResponse,
    updated_at: DateTime<Utc>,
    spec: SpecResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VersionResponse {
    index: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SpecResponse {
    name: String,
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
    #[serde(default)]
    mode: ModeResponse,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ModeResponse {
    #[serde(default)]
    replicated: Option<ReplicatedResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReplicatedResponse {
    #[serde(default)]
    replicas: Option<u64>,
}

impl From<ServiceResponse> for ServiceSnapshot {
    fn from(service: ServiceResponse) -> Self {
        let (mode, replicas) = match service.spec.mode.replicated {
            Some(replicated) => (ServiceMode::Replicated, replicated.replicas.unwrap_or(0)),
            None => (ServiceMode::Global, 0),
        };

        ServiceSnapshot {
            name: service.spec.name,
            labels: service.spec.labels.unwrap_or_default(),
            mode,
            replicas,
            revision: service.version.index,
            updated_at: service.updated_at,
        }
    }
}

impl DockerSwarmClient {
    /// Create a new client for the engine listening at `base_url` (e.g. `http://localhost:2375`)
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn inspect_spec(&self, name: &str) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(format!("{}/services/{}", self.base_url, name))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read body>".to_string());
            return Err(ScalerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut service: serde_json::Value = response.json().await?;
        service
            .get_mut("Spec")
            .map(serde_json::Value::take)
            .ok_or_else(|| ScalerError::Decode {
                message: format!("service '{}' has no Spec", name),
            })
    }
}

/// Build the `filters` query parameter selecting replicated services carrying `label_key`
pub fn service_filters(label_key: &str) -> String {
    serde_json::json!({
        "mode": ["replicated"],
        "label": [label_key],
    })
    .to_string()
}

#[async_trait]
impl ServiceDirectory for DockerSwarmClient {
    async fn list_scalable_services(&self, label_key: &str) -> Result<Vec<ServiceSnapshot>> {
        let response = self
            .client
            .get(format!("{}/services", self.base_url))
            .query(&[("filters", service_filters(label_key))])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read body>".to_string());
            return Err(ScalerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let services: Vec<ServiceResponse> = response.json().await?;
        debug!(count = services.len(), label = %label_key, "Listed scalable services");
        Ok(services.into_iter().map(ServiceSnapshot::from).collect())
    }
}

#[async_trait]
impl ScalingActuator for DockerSwarmClient {
    async fn scale_service(&self, name: &str, revision: u64, replicas: u64) -> Result<()> {
        let mut spec = self.inspect_spec(name).await?;

        let slot = spec
            .pointer_mut("/Mode/Replicated")
            .and_then(serde_json::Value::as_object_mut)
            .ok_or_else(|| ScalerError::ServiceNotReplicated {
                service: name.to_string(),
            })?;
        slot.insert("Replicas".to_string(), serde_json::Value::from(replicas));

        let response = self
            .client
            .post(format!("{}/services/{}/update", self.base_url, name))
            .query(&[("version", revision)])
            .json(&spec)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unable to read body>".to_string());
        if body.contains("out of sequence") {
            return Err(ScalerError::StaleRevision {
                service: name.to_string(),
                revision,
            });
        }
        Err(ScalerError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
