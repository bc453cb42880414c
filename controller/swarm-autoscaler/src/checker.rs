//! Metric checkers and the registry that names them
//!
//! A checker turns `(service, low, high)` into a verdict by querying the metric
//! source. Checkers never fail: a query error or an empty result is logged and
//! reported as [`Direction::None`] so one bad metric cannot abort the pass.

use crate::error::with_timeout;
use crate::metric_source::MetricSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Which way a service should move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    None,
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::None => write!(f, "none"),
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Verdict of a single metric check
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CheckOutcome {
    pub direction: Direction,
    pub sample: f64,
}

impl CheckOutcome {
    pub fn none() -> Self {
        Self::default()
    }

    /// Classify a sample against `low:high`. `low` is tested first.
    pub fn classify(sample: f64, low: f64, high: f64) -> Self {
        let direction = if sample <= low {
            Direction::Down
        } else if sample >= high {
            Direction::Up
        } else {
            Direction::None
        };
        Self { direction, sample }
    }
}

/// A named metric evaluator
#[async_trait]
pub trait MetricChecker: Send + Sync {
    async fn check(&self, service: &str, low: f64, high: f64, at: DateTime<Utc>) -> CheckOutcome;
}

/// Metric name to checker table
#[derive(Clone, Default)]
pub struct CheckerRegistry {
    checkers: HashMap<String, Arc<dyn MetricChecker>>,
}

impl CheckerRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `cpu` checker backed by `source`
    pub fn with_defaults(source: Arc<dyn MetricSource>, call_timeout: Duration) -> Self {
        let mut registry = Self::new();
        registry.register("cpu", Arc::new(CpuChecker::new(source, call_timeout)));
        registry
    }

    /// Add or replace the checker for `name`
    pub fn register(&mut self, name: impl Into<String>, checker: Arc<dyn MetricChecker>) {
        self.checkers.insert(name.into(), checker);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn MetricChecker>> {
        self.checkers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.checkers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for CheckerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckerRegistry")
            .field("checkers", &self.names())
            .finish()
    }
}

/// Aggregate CPU usage (percent) of a swarm service's containers
pub struct CpuChecker {
    source: Arc<dyn MetricSource>,
    call_timeout: Duration,
}

impl CpuChecker {
    pub fn new(source: Arc<dyn MetricSource>, call_timeout: Duration) -> Self {
        Self {
            source,
            call_timeout,
        }
    }

    pub fn query_for(service: &str) -> String {
        let selector = format!(
            r#"container_label_com_docker_swarm_service_name="{}""#,
            service
        );
        format!(
            "avg(rate(container_cpu_user_seconds_total{{{}}}[1m]) * 100)",
            selector
        )
    }
}

#[async_trait]
impl MetricChecker for CpuChecker {
    async fn check(&self, service: &str, low: f64, high: f64, at: DateTime<Utc>) -> CheckOutcome {
        let query = Self::query_for(service);
        let samples = match with_timeout(
            "metric query",
            self.call_timeout,
            self.source.query(&query, at),
        )
        .await
        {
            Ok(samples) => samples,
            Err(e) => {
                warn!(service = %service, error = %e, "Failed to query cpu metrics");
                return CheckOutcome::none();
            }
        };

        match samples.first() {
            Some(sample) => {
                let outcome = CheckOutcome::classify(sample.value, low, high);
                debug!(
                    service = %service,
                    sample = sample.value,
                    low,
                    high,
                    direction = %outcome.direction,
                    "Evaluated cpu check"
                );
                outcome
            }
            None => {
                warn!(service = %service, query = %query, "No cpu samples returned");
                CheckOutcome::none()
            }
        }
    }
}
