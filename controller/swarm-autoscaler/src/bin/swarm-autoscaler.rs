//! Swarm Autoscaler binary - periodically scales labelled swarm services

use std::sync::Arc;
use swarm_autoscaler::{
    Actuator, Autoscaler, CheckerRegistry, Config, DecisionEngine, DockerSwarmClient,
    LogOnlyActuator, PrometheusClient, ScalingActuator,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration
    let config = Config::parse_config();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting Swarm Autoscaler");
    info!("Configuration:");
    info!("  Docker URL: {}", config.docker_url);
    info!("  Prometheus URL: {}", config.prometheus_url);
    info!("  Label: {}", config.label_key);
    info!("  Interval: {}s", config.tick_interval().as_secs());
    info!("  Dry-run: {}", config.dry_run);

    let docker = Arc::new(DockerSwarmClient::new(
        &config.docker_url,
        config.call_timeout(),
    )?);
    let prometheus = Arc::new(PrometheusClient::new(
        &config.prometheus_url,
        config.call_timeout(),
    )?);

    // Create scaling actuator based on configuration
    let scaler: Arc<dyn ScalingActuator> = if config.dry_run {
        info!("Using log-only actuator (dry-run mode)");
        Arc::new(LogOnlyActuator)
    } else {
        docker.clone()
    };

    let registry = CheckerRegistry::with_defaults(prometheus, config.call_timeout());
    info!(checkers = ?registry.names(), "Registered metric checkers");

    let autoscaler = Autoscaler::new(
        docker,
        DecisionEngine::new(registry),
        Actuator::new(scaler, config.call_timeout()),
        config.settings(),
    );
    let handle = autoscaler.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    handle.stop().await;

    info!("Swarm autoscaler exited normally");
    Ok(())
}
