//! Scaling policy parsed from a service label
//!
//! Operators attach a label such as `min=2,max=10,step=1,window=5m,policy=all,cpu=20:80`
//! to a replicated service. Recognised options fill the typed policy fields; every
//! other option is kept verbatim as a metric check. Malformed values never fail the
//! parse: the default is kept and a warning is logged.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_MIN_REPLICAS: u64 = 2;
pub const DEFAULT_MAX_REPLICAS: u64 = 8;
pub const DEFAULT_STEP: u64 = 2;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(3 * 60);

const PAIR_SEPARATOR: char = ',';
const VALUE_SEPARATOR: char = '=';
const BOUNDS_SEPARATOR: char = ':';

/// One `name=value` pair from the label string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelOption {
    pub name: String,
    pub value: String,
}

/// How multiple check outcomes are folded into one decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Combinator {
    /// First check with a verdict wins
    #[default]
    Any,
    /// Every check must agree on the same verdict
    All,
}

/// Case-insensitive `any`/`all`. [`ScalingPolicy::parse`] keeps the default `Any` on an
/// unknown value, so a typo still scales on the first matching check rather than never.
impl FromStr for Combinator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(Combinator::Any),
            "all" => Ok(Combinator::All),
            other => Err(format!("unknown policy '{}'", other)),
        }
    }
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Combinator::Any => write!(f, "any"),
            Combinator::All => write!(f, "all"),
        }
    }
}

/// A metric check candidate, e.g. `cpu=20:80`
///
/// The value is kept raw; thresholds are decoded lazily by [`MetricCheckSpec::bounds`]
/// so a malformed entry only disables its own check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricCheckSpec {
    pub metric: String,
    pub value: String,
}

impl MetricCheckSpec {
    pub fn new(metric: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            value: value.into(),
        }
    }

    /// Decode `low:high`.
    ///
    /// Returns `None` unless the value has exactly two parts. Each part that is not a
    /// valid float becomes `0.0`.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        let parts: Vec<&str> = self.value.split(BOUNDS_SEPARATOR).collect();
        if parts.len() != 2 {
            return None;
        }
        let low = parts[0].trim().parse().unwrap_or(0.0);
        let high = parts[1].trim().parse().unwrap_or(0.0);
        Some((low, high))
    }
}

/// Per-service scaling policy, rebuilt from the label on every tick
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingPolicy {
    pub min: u64,
    pub max: u64,
    pub step: u64,
    pub window: Duration,
    pub combinator: Combinator,
    pub checks: Vec<MetricCheckSpec>,
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_REPLICAS,
            max: DEFAULT_MAX_REPLICAS,
            step: DEFAULT_STEP,
            window: DEFAULT_WINDOW,
            combinator: Combinator::Any,
            checks: Vec::new(),
        }
    }
}

impl ScalingPolicy {
    /// Parse a label value into a policy. Never fails.
    pub fn parse(label: &str) -> Self {
        let mut policy = ScalingPolicy::default();

        for opt in parse_options(label) {
            match opt.name.as_str() {
                "min" => policy.min = parse_or(&opt, policy.min),
                "max" => policy.max = parse_or(&opt, policy.max),
                "step" => policy.step = parse_or(&opt, policy.step),
                "window" => {
                    policy.window = match humantime::parse_duration(opt.value.trim()) {
                        Ok(window) => window,
                        Err(e) => {
                            warn!(
                                option = %opt.name,
                                value = %opt.value,
                                error = %e,
                                "Invalid scale window, keeping default"
                            );
                            policy.window
                        }
                    }
                }
                "policy" => policy.combinator = parse_or(&opt, policy.combinator),
                _ => policy.checks.push(MetricCheckSpec::new(opt.name, opt.value)),
            }
        }

        if policy.min > policy.max {
            warn!(
                min = policy.min,
                max = policy.max,
                "Scale option min exceeds max, lowering min to max"
            );
            policy.min = policy.max;
        }

        policy
    }
}

/// Split `a=1,b=2` into ordered options.
///
/// Empty segments are dropped. A segment without `=` yields an option with an empty
/// value; only the first `=` separates name from value.
pub fn parse_options(label: &str) -> Vec<LabelOption> {
    label
        .split(PAIR_SEPARATOR)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once(VALUE_SEPARATOR) {
            Some((name, value)) => LabelOption {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
            },
            None => LabelOption {
                name: segment.to_string(),
                value: String::new(),
            },
        })
        .collect()
}

fn parse_or<T>(opt: &LabelOption, current: T) -> T
where
    T: FromStr + fmt::Display,
{
    match opt.value.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(
                option = %opt.name,
                value = %opt.value,
                default = %current,
                "Invalid scale option, keeping default"
            );
            current
        }
    }
}
