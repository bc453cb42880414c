//! Fixed-interval driver evaluating every scalable service once per tick
//!
//! Each service is evaluated in its own task. A failing or panicking evaluation is
//! logged and counted; it never prevents the rest of the tick from completing.

use crate::actuator::{precheck, Actuator, ScaleOutcome};
use crate::decision::DecisionEngine;
use crate::error::with_timeout;
use crate::metrics::{Metrics, TickReport};
use crate::policy::ScalingPolicy;
use crate::swarm::{ServiceDirectory, ServiceMode, ServiceSnapshot};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, info_span, Instrument};

pub const DEFAULT_LABEL_KEY: &str = "swirl.scale";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct AutoscalerSettings {
    /// Service label holding the policy string
    pub label_key: String,
    pub interval: Duration,
    /// Upper bound for every directory, metric and actuation call
    pub call_timeout: Duration,
}

impl Default for AutoscalerSettings {
    fn default() -> Self {
        Self {
            label_key: DEFAULT_LABEL_KEY.to_string(),
            interval: DEFAULT_INTERVAL,
            call_timeout: Duration::from_secs(10),
        }
    }
}

pub struct Autoscaler {
    directory: Arc<dyn ServiceDirectory>,
    engine: Arc<DecisionEngine>,
    actuator: Arc<Actuator>,
    settings: AutoscalerSettings,
    metrics: Metrics,
}

impl Autoscaler {
    pub fn new(
        directory: Arc<dyn ServiceDirectory>,
        engine: DecisionEngine,
        actuator: Actuator,
        settings: AutoscalerSettings,
    ) -> Self {
        Self {
            directory,
            engine: Arc::new(engine),
            actuator: Arc::new(actuator),
            settings,
            metrics: Metrics,
        }
    }

    /// Evaluate every scalable service once.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        let listing = with_timeout(
            "list services",
            self.settings.call_timeout,
            self.directory.list_scalable_services(&self.settings.label_key),
        )
        .await;
        let services = match listing {
            Ok(services) => services,
            Err(e) => {
                error!(label = %self.settings.label_key, error = %e, "Failed to list services");
                self.metrics.record_directory_error(&e.to_string());
                return report;
            }
        };

        let tasks: Vec<(String, JoinHandle<ScaleOutcome>)> = services
            .into_iter()
            .map(|service| {
                let name = service.name.clone();
                let engine = self.engine.clone();
                let actuator = self.actuator.clone();
                let label_key = self.settings.label_key.clone();
                let span = info_span!("scale", service = %name);
                let handle = tokio::spawn(
                    async move {
                        evaluate_service(&engine, &actuator, &label_key, &service, now).await
                    }
                    .instrument(span),
                );
                (name, handle)
            })
            .collect();

        let (names, handles): (Vec<String>, Vec<JoinHandle<ScaleOutcome>>) =
            tasks.into_iter().unzip();
        for (name, joined) in names.iter().zip(join_all(handles).await) {
            match joined {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    error!(service = %name, error = %e, "Service evaluation aborted");
                    report.record_panic();
                }
            }
        }

        self.metrics.record_tick(&report);
        report
    }

    /// Spawn the timer task. The first tick fires one interval after start.
    pub fn start(self) -> AutoscalerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let interval = self.settings.interval;

        let task = tokio::spawn(async move {
            info!(
                interval_secs = interval.as_secs(),
                label = %self.settings.label_key,
                "Autoscaler started"
            );

            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_tick(Utc::now()).await;
                    }
                    _ = shutdown_rx.changed() => {
                        info!("Autoscaler shutting down");
                        break;
                    }
                }
            }
        });

        AutoscalerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Running autoscaler. Dropping the handle also stops the timer.
pub struct AutoscalerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl AutoscalerHandle {
    /// Signal shutdown and wait for any in-flight tick to finish
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Autoscaler task ended abnormally");
        }
    }
}

/// Policy, eligibility, decision and actuation for one service
async fn evaluate_service(
    engine: &DecisionEngine,
    actuator: &Actuator,
    label_key: &str,
    service: &ServiceSnapshot,
    now: DateTime<Utc>,
) -> ScaleOutcome {
    if service.mode != ServiceMode::Replicated {
        return ScaleOutcome::SkippedGlobal;
    }

    let label = service
        .labels
        .get(label_key)
        .map(String::as_str)
        .unwrap_or_default();
    let policy = ScalingPolicy::parse(label);

    if let Some(skip) = precheck(service, policy.window, now) {
        debug!(window_secs = policy.window.as_secs(), "Service skipped: {:?}", skip);
        return skip;
    }

    let decision = engine
        .decide(&service.name, policy.combinator, &policy.checks, now)
        .await;
    debug!(decision = %decision, "Evaluated scaling policy");

    actuator.apply(service, &policy, &decision, now).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::tests::{service, RecordingActuator};
    use crate::checker::tests::{CapturedLogs, StaticSource};
    use crate::checker::{CheckOutcome, CheckerRegistry, MetricChecker};
    use crate::error::{Result, ScalerError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeDirectory {
        services: Result<Vec<ServiceSnapshot>>,
        calls: Mutex<usize>,
    }

    impl FakeDirectory {
        fn new(services: Vec<ServiceSnapshot>) -> Arc<Self> {
            Arc::new(Self {
                services: Ok(services),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl ServiceDirectory for FakeDirectory {
        async fn list_scalable_services(&self, _label_key: &str) -> Result<Vec<ServiceSnapshot>> {
            *self.calls.lock().unwrap() += 1;
            match &self.services {
                Ok(services) => Ok(services.clone()),
                Err(_) => Err(ScalerError::Status {
                    status: 500,
                    body: "daemon unavailable".to_string(),
                }),
            }
        }
    }

    struct PanicChecker;

    #[async_trait]
    impl MetricChecker for PanicChecker {
        async fn check(
            &self,
            service: &str,
            low: f64,
            high: f64,
            _: DateTime<Utc>,
        ) -> CheckOutcome {
            if service == "boom" {
                panic!("checker exploded");
            }
            CheckOutcome::classify(90.0, low, high)
        }
    }

    fn labelled(name: &str, replicas: u64, label: &str, now: DateTime<Utc>) -> ServiceSnapshot {
        let mut svc = service(replicas, 10, now);
        svc.name = name.to_string();
        svc.labels = HashMap::from([(DEFAULT_LABEL_KEY.to_string(), label.to_string())]);
        svc
    }

    fn autoscaler(
        directory: Arc<dyn ServiceDirectory>,
        registry: CheckerRegistry,
    ) -> (Autoscaler, Arc<RecordingActuator>) {
        let recorder = Arc::new(RecordingActuator::default());
        let scaler = Autoscaler::new(
            directory,
            DecisionEngine::new(registry),
            Actuator::new(recorder.clone(), Duration::from_secs(1)),
            AutoscalerSettings::default(),
        );
        (scaler, recorder)
    }

    fn cpu_registry(samples: &[f64]) -> CheckerRegistry {
        let source = Arc::new(StaticSource::samples(samples));
        CheckerRegistry::with_defaults(source, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_high_cpu_scales_default_policy_up() {
        let now = Utc::now();
        let directory = FakeDirectory::new(vec![labelled("web", 4, "cpu=20:80", now)]);
        let (scaler, recorder) = autoscaler(directory, cpu_registry(&[85.0]));

        let report = scaler.run_tick(now).await;

        assert_eq!(report.scaled_up, 1);
        assert_eq!(recorder.calls(), vec![("web".to_string(), 42, 6)]);
    }

    #[tokio::test]
    async fn test_global_service_never_evaluated() {
        let now = Utc::now();
        let mut svc = labelled("agent", 4, "cpu=20:80", now);
        svc.mode = ServiceMode::Global;
        let source = Arc::new(StaticSource::samples(&[85.0]));
        let registry = CheckerRegistry::with_defaults(source.clone(), Duration::from_secs(1));
        let (scaler, recorder) = autoscaler(FakeDirectory::new(vec![svc]), registry);

        let report = scaler.run_tick(now).await;

        assert_eq!(report.skipped, 1);
        assert!(source.queries.lock().unwrap().is_empty());
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cooldown_service_is_not_queried() {
        let now = Utc::now();
        let mut svc = labelled("web", 4, "cpu=20:80,window=5m", now);
        svc.updated_at = now - chrono::Duration::minutes(4);
        let source = Arc::new(StaticSource::samples(&[85.0]));
        let registry = CheckerRegistry::with_defaults(source.clone(), Duration::from_secs(1));
        let (scaler, recorder) = autoscaler(FakeDirectory::new(vec![svc]), registry);

        scaler.run_tick(now).await;

        assert!(source.queries.lock().unwrap().is_empty());
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_metric_error_means_no_action() {
        let now = Utc::now();
        let directory = FakeDirectory::new(vec![labelled("web", 4, "cpu=20:80", now)]);
        let source = Arc::new(StaticSource::failing("boom"));
        let registry = CheckerRegistry::with_defaults(source, Duration::from_secs(1));
        let (scaler, recorder) = autoscaler(directory, registry);

        let report = scaler.run_tick(now).await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_metric_error_logs_exactly_one_warning() {
        let (logs, _guard) = CapturedLogs::install();

        let now = Utc::now();
        let directory = FakeDirectory::new(vec![labelled("web", 4, "cpu=20:80", now)]);
        let source = Arc::new(StaticSource::failing("connection refused"));
        let registry = CheckerRegistry::with_defaults(source.clone(), Duration::from_secs(1));
        let (scaler, recorder) = autoscaler(directory, registry);

        let report = scaler.run_tick(now).await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.scaled_up + report.scaled_down, 0);
        assert!(recorder.calls().is_empty());
        assert_eq!(source.queries.lock().unwrap().len(), 1);

        let warnings = logs.lines_at("WARN");
        assert_eq!(warnings.len(), 1, "warnings: {:?}", warnings);
        assert!(warnings[0].contains("Failed to query cpu metrics"));
        assert!(warnings[0].contains("web"));
        assert!(logs.lines_at("ERROR").is_empty());
    }

    #[tokio::test]
    async fn test_panicking_service_does_not_block_others() {
        let now = Utc::now();
        let directory = FakeDirectory::new(vec![
            labelled("boom", 4, "cpu=20:80", now),
            labelled("web", 4, "cpu=20:80", now),
        ]);
        let mut registry = CheckerRegistry::new();
        registry.register("cpu", Arc::new(PanicChecker));
        let (scaler, recorder) = autoscaler(directory, registry);

        let report = scaler.run_tick(now).await;

        assert_eq!(report.services, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.scaled_up, 1);
        assert_eq!(recorder.calls(), vec![("web".to_string(), 42, 6)]);
    }

    #[tokio::test]
    async fn test_directory_failure_yields_empty_tick() {
        let directory = Arc::new(FakeDirectory {
            services: Err(ScalerError::QueryFailed {
                message: "unused".to_string(),
            }),
            calls: Mutex::new(0),
        });
        let (scaler, recorder) = autoscaler(directory.clone(), cpu_registry(&[85.0]));

        let report = scaler.run_tick(Utc::now()).await;
        assert_eq!(report, TickReport::default());
        assert!(recorder.calls().is_empty());

        // the scheduler survives and can run again
        scaler.run_tick(Utc::now()).await;
        assert_eq!(*directory.calls.lock().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_ticks_on_interval_and_stops() {
        let directory = FakeDirectory::new(Vec::new());
        let (mut scaler, _) = autoscaler(directory.clone(), cpu_registry(&[]));
        scaler.settings.interval = Duration::from_secs(60);

        let handle = scaler.start();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(*directory.calls.lock().unwrap(), 0);

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(*directory.calls.lock().unwrap(), 2);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_independent_instances() {
        let now = Utc::now();
        let hot = FakeDirectory::new(vec![labelled("web", 4, "cpu=20:80", now)]);
        let cold = FakeDirectory::new(vec![labelled("web", 4, "cpu=20:80", now)]);
        let (a, a_calls) = autoscaler(hot, cpu_registry(&[85.0]));
        let (b, b_calls) = autoscaler(cold, cpu_registry(&[5.0]));

        a.run_tick(now).await;
        b.run_tick(now).await;

        assert_eq!(a_calls.calls(), vec![("web".to_string(), 42, 6)]);
        assert_eq!(b_calls.calls(), vec![("web".to_string(), 42, 2)]);
    }
}
