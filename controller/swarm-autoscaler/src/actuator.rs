//! Turns a decision into a bounded replica change

use crate::checker::Direction;
use crate::decision::Decision;
use crate::error::with_timeout;
use crate::policy::ScalingPolicy;
use crate::swarm::{ScalingActuator, ServiceMode, ServiceSnapshot};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// What happened to one service during a tick
#[derive(Debug, Clone, PartialEq)]
pub enum ScaleOutcome {
    /// Global services are never scaled
    SkippedGlobal,
    /// Service changed less than `window` ago
    SkippedCooldown,
    /// Decision had no direction
    NoAction,
    /// Already at `max` (up) or `min` (down)
    AtBound { direction: Direction, replicas: u64 },
    Scaled {
        direction: Direction,
        from: u64,
        to: u64,
    },
    Failed { direction: Direction, error: String },
}

/// Structural preconditions checked before any metric is queried
pub fn precheck(
    service: &ServiceSnapshot,
    window: Duration,
    now: DateTime<Utc>,
) -> Option<ScaleOutcome> {
    if service.mode != ServiceMode::Replicated {
        return Some(ScaleOutcome::SkippedGlobal);
    }
    if in_cooldown(service.updated_at, window, now) {
        return Some(ScaleOutcome::SkippedCooldown);
    }
    None
}

/// True while `now - updated_at < window`. An update stamped in the future counts
/// as inside the window.
pub fn in_cooldown(updated_at: DateTime<Utc>, window: Duration, now: DateTime<Utc>) -> bool {
    match now.signed_duration_since(updated_at).to_std() {
        Ok(elapsed) => elapsed < window,
        Err(_) => true,
    }
}

/// Replica count requested for `direction`, or `None` when the bound blocks it.
///
/// The bound only gates the move; the result itself is not clamped to `min`/`max`.
pub fn target_replicas(policy: &ScalingPolicy, current: u64, direction: Direction) -> Option<u64> {
    match direction {
        Direction::Up if current < policy.max => Some(current.saturating_add(policy.step)),
        Direction::Down if current > policy.min => Some(current.saturating_sub(policy.step)),
        _ => None,
    }
}

pub struct Actuator {
    scaler: Arc<dyn ScalingActuator>,
    call_timeout: Duration,
}

impl Actuator {
    pub fn new(scaler: Arc<dyn ScalingActuator>, call_timeout: Duration) -> Self {
        Self {
            scaler,
            call_timeout,
        }
    }

    /// Apply `decision` to `service` under `policy`. Failures are logged, not retried.
    pub async fn apply(
        &self,
        service: &ServiceSnapshot,
        policy: &ScalingPolicy,
        decision: &Decision,
        now: DateTime<Utc>,
    ) -> ScaleOutcome {
        if let Some(skip) = precheck(service, policy.window, now) {
            return skip;
        }
        if decision.is_none() {
            return ScaleOutcome::NoAction;
        }

        let direction = decision.direction;
        let Some(target) = target_replicas(policy, service.replicas, direction) else {
            debug!(
                service = %service.name,
                direction = %direction,
                replicas = service.replicas,
                min = policy.min,
                max = policy.max,
                "Service already at scaling bound"
            );
            return ScaleOutcome::AtBound {
                direction,
                replicas: service.replicas,
            };
        };

        let call = self
            .scaler
            .scale_service(&service.name, service.revision, target);
        match with_timeout("scale service", self.call_timeout, call).await {
            Ok(()) => {
                info!(
                    service = %service.name,
                    direction = %direction,
                    from = service.replicas,
                    to = target,
                    reasons = ?decision.reasons,
                    "Service scaled"
                );
                ScaleOutcome::Scaled {
                    direction,
                    from: service.replicas,
                    to: target,
                }
            }
            Err(e) => {
                error!(
                    service = %service.name,
                    direction = %direction,
                    revision = service.revision,
                    error = %e,
                    "Failed to scale service"
                );
                ScaleOutcome::Failed {
                    direction,
                    error: e.to_string(),
                }
            }
        }
    }
}
