//! Metric source trait and Prometheus implementation
//!
//! The scaler only needs instant queries: evaluate an expression at a point in time
//! and get back a vector of samples.

use crate::error::{Result, ScalerError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// One element of an instant-query vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub value: f64,
}

/// Metric source trait - implement this to plug in a different metrics backend
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Evaluate `query` at `at`
    async fn query(&self, query: &str, at: DateTime<Utc>) -> Result<Vec<Sample>>;
}

/// Prometheus HTTP API client (`/api/v1/query`)
pub struct PrometheusClient {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorEntry {
    // [unix_seconds, "value"]
    value: (f64, String),
}

impl PrometheusClient {
    /// Create a new Prometheus client rooted at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint: format!("{}/api/v1/query", base_url.trim_end_matches('/')),
            client,
        })
    }
}

#[async_trait]
impl MetricSource for PrometheusClient {
    async fn query(&self, query: &str, at: DateTime<Utc>) -> Result<Vec<Sample>> {
        let time = format!("{}.{:03}", at.timestamp(), at.timestamp_subsec_millis());
        debug!(query = %query, time = %time, "Querying Prometheus");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("query", query), ("time", time.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        // Prometheus reports bad queries with a 4xx and an error body
        let parsed: QueryResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) if status.is_success() => {
                return Err(ScalerError::Decode {
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(ScalerError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        };

        if parsed.status != "success" {
            return Err(ScalerError::QueryFailed {
                message: format!(
                    "{}: {}",
                    parsed.error_type.unwrap_or_else(|| "unknown".to_string()),
                    parsed.error.unwrap_or_default()
                ),
            });
        }

        let data = parsed.data.ok_or_else(|| ScalerError::Decode {
            message: "missing data field".to_string(),
        })?;
        decode_vector(data)
    }
}

fn decode_vector(data: QueryData) -> Result<Vec<Sample>> {
    match data.result_type.as_str() {
        "vector" => {
            let entries: Vec<VectorEntry> =
                serde_json::from_value(data.result).map_err(|e| ScalerError::Decode {
                    message: e.to_string(),
                })?;
            entries
                .into_iter()
                .map(|entry| {
                    entry
                        .value
                        .1
                        .parse()
                        .map(|value| Sample { value })
                        .map_err(|_| ScalerError::Decode {
                            message: format!("invalid sample value '{}'", entry.value.1),
                        })
                })
                .collect()
        }
        // scalar results are a bare [ts, "value"] pair
        "scalar" => {
            let (_, raw): (f64, String) =
                serde_json::from_value(data.result).map_err(|e| ScalerError::Decode {
                    message: e.to_string(),
                })?;
            let value = raw.parse().map_err(|_| ScalerError::Decode {
                message: format!("invalid sample value '{}'", raw),
            })?;
            Ok(vec![Sample { value }])
        }
        other => Err(ScalerError::Decode {
            message: format!("unsupported result type '{}'", other),
        }),
    }
}
