//! Per-tick counters for the autoscaler
//!
//! Counters are reported through structured logging at the end of every tick; there
//! is no exporter.

use crate::actuator::ScaleOutcome;
use crate::checker::Direction;
use tracing::info;

/// Summary of one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub services: usize,
    pub scaled_up: usize,
    pub scaled_down: usize,
    /// Global, cooldown, no decision or at bound
    pub skipped: usize,
    /// Actuation errors and panicked evaluations
    pub failed: usize,
}

impl TickReport {
    pub fn record(&mut self, outcome: &ScaleOutcome) {
        self.services += 1;
        match outcome {
            ScaleOutcome::Scaled {
                direction: Direction::Up,
                ..
            } => self.scaled_up += 1,
            ScaleOutcome::Scaled {
                direction: Direction::Down,
                ..
            } => self.scaled_down += 1,
            ScaleOutcome::Failed { .. } => self.failed += 1,
            _ => self.skipped += 1,
        }
    }

    pub fn record_panic(&mut self) {
        self.services += 1;
        self.failed += 1;
    }
}

/// Metrics collector for the autoscaler
#[derive(Clone, Default)]
pub struct Metrics;

impl Metrics {
    /// Record a completed tick
    pub fn record_tick(&self, report: &TickReport) {
        info!(
            services = report.services,
            scaled_up = report.scaled_up,
            scaled_down = report.scaled_down,
            skipped = report.skipped,
            failed = report.failed,
            "Autoscaler tick complete"
        );
    }

    /// Record a tick that could not list services
    pub fn record_directory_error(&self, error: &str) {
        info!(error = %error, "Recorded directory error");
    }
}
