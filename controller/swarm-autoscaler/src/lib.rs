//! Swarm Autoscaler - scales replicated swarm services from metric policies
//!
//! Every tick the autoscaler lists replicated services carrying the scaling label,
//! parses each label into a policy, evaluates the policy's metric checks against
//! Prometheus and asks the Docker engine for a bounded replica change.

pub mod actuator;
pub mod checker;
pub mod config;
pub mod decision;
pub mod error;
pub mod metric_source;
pub mod metrics;
pub mod policy;
pub mod scheduler;
pub mod swarm;

pub use actuator::{Actuator, ScaleOutcome};
pub use checker::{CheckOutcome, CheckerRegistry, CpuChecker, Direction, MetricChecker};
pub use config::Config;
pub use decision::{Decision, DecisionEngine};
pub use error::ScalerError;
pub use metric_source::{MetricSource, PrometheusClient, Sample};
pub use metrics::{Metrics, TickReport};
pub use policy::{Combinator, MetricCheckSpec, ScalingPolicy};
pub use scheduler::{Autoscaler, AutoscalerHandle, AutoscalerSettings};
pub use swarm::{
    DockerSwarmClient, LogOnlyActuator, ScalingActuator, ServiceDirectory, ServiceMode,
    ServiceSnapshot,
};
