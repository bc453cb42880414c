//! Configuration for the swarm autoscaler service

use crate::scheduler::{AutoscalerSettings, DEFAULT_LABEL_KEY};
use clap::Parser;
use std::time::Duration;

/// Configuration for swarm autoscaler
#[derive(Debug, Clone, Parser)]
#[command(name = "swarm-autoscaler")]
#[command(about = "Scales replicated swarm services from label-encoded metric policies")]
pub struct Config {
    /// Docker Engine API URL (TCP endpoint)
    #[arg(long, env, default_value = "http://localhost:2375")]
    pub docker_url: String,

    /// Prometheus server URL
    #[arg(long, env, default_value = "http://localhost:9090")]
    pub prometheus_url: String,

    /// Service label holding the scaling policy
    #[arg(long, env = "SCALE_LABEL", default_value = DEFAULT_LABEL_KEY)]
    pub label_key: String,

    /// Seconds between evaluation passes
    #[arg(long, env = "SCALE_INTERVAL_SECS", default_value_t = 60)]
    pub interval_secs: u64,

    /// Timeout in seconds for each Docker or Prometheus call
    #[arg(long, env, default_value_t = 10)]
    pub call_timeout_secs: u64,

    /// Dry-run mode (log scale requests, never update services)
    #[arg(long, env)]
    pub dry_run: bool,

    /// Output logs in JSON format
    #[arg(long, env)]
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docker_url: "http://localhost:2375".to_string(),
            prometheus_url: "http://localhost:9090".to_string(),
            label_key: DEFAULT_LABEL_KEY.to_string(),
            interval_secs: 60,
            call_timeout_secs: 10,
            dry_run: false,
            log_json: false,
        }
    }
}

impl Config {
    /// Parse configuration from command-line args and environment variables
    pub fn parse_config() -> Self {
        Config::parse()
    }

    pub fn tick_interval(&self) -> Duration {
        // a zero interval would spin
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.max(1))
    }

    pub fn settings(&self) -> AutoscalerSettings {
        AutoscalerSettings {
            label_key: self.label_key.clone(),
            interval: self.tick_interval(),
            call_timeout: self.call_timeout(),
        }
    }
}
