//! Folds the outcomes of a service's metric checks into one scale decision

use crate::checker::{CheckOutcome, CheckerRegistry, Direction};
use crate::policy::{Combinator, MetricCheckSpec};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::warn;

/// Result of evaluating a policy for one service
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Decision {
    pub direction: Direction,
    /// Metric name to the sample that drove the decision
    pub reasons: BTreeMap<String, f64>,
}

impl Decision {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_none(&self) -> bool {
        self.direction == Direction::None
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reasons: Vec<String> = self
            .reasons
            .iter()
            .map(|(metric, value)| format!("{}={:.2}", metric, value))
            .collect();
        write!(f, "{} [{}]", self.direction, reasons.join(", "))
    }
}

pub struct DecisionEngine {
    registry: CheckerRegistry,
}

impl DecisionEngine {
    pub fn new(registry: CheckerRegistry) -> Self {
        Self { registry }
    }

    /// Evaluate `checks` for `service` under `combinator`.
    ///
    /// `Any` stops at the first check with a verdict. `All` evaluates every check and
    /// only adopts a direction when the set of observed directions is a single
    /// non-`None` value; `None` counts as a direction of its own.
    pub async fn decide(
        &self,
        service: &str,
        combinator: Combinator,
        checks: &[MetricCheckSpec],
        at: DateTime<Utc>,
    ) -> Decision {
        match combinator {
            Combinator::Any => {
                for spec in checks {
                    let outcome = self.evaluate(service, spec, at).await;
                    if outcome.direction != Direction::None {
                        let mut decision = Decision {
                            direction: outcome.direction,
                            reasons: BTreeMap::new(),
                        };
                        decision.reasons.insert(spec.metric.clone(), outcome.sample);
                        return decision;
                    }
                }
                Decision::none()
            }
            Combinator::All => {
                let mut observed = HashSet::new();
                let mut reasons = BTreeMap::new();
                for spec in checks {
                    let outcome = self.evaluate(service, spec, at).await;
                    observed.insert(outcome.direction);
                    reasons.insert(spec.metric.clone(), outcome.sample);
                }

                if observed.len() != 1 || observed.contains(&Direction::None) {
                    return Decision::none();
                }
                // exactly one non-None direction
                let direction = observed.into_iter().next().unwrap_or_default();
                Decision { direction, reasons }
            }
        }
    }

    /// Run one check. Malformed bounds and unknown metrics downgrade to `None`.
    async fn evaluate(
        &self,
        service: &str,
        spec: &MetricCheckSpec,
        at: DateTime<Utc>,
    ) -> CheckOutcome {
        let Some((low, high)) = spec.bounds() else {
            warn!(
                service = %service,
                metric = %spec.metric,
                value = %spec.value,
                "Invalid scale argument, expected low:high"
            );
            return CheckOutcome::none();
        };

        let Some(checker) = self.registry.get(&spec.metric) else {
            warn!(service = %service, metric = %spec.metric, "Metric checker not found");
            return CheckOutcome::none();
        };

        checker.check(service, low, high, at).await
    }
}
