//! Tick bookkeeping for the daemon loops
//!
//! The daemon runs two periodic loops:
//! - Scheduler ticks assign waiting requests to piles
//! - Monitor ticks handle pile status changes, finished charges and status push

use std::time::Duration;

use crate::config::DaemonConfig;

/// Intervals for the daemon loops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickConfig {
    /// Interval between scheduling ticks
    pub scheduler_interval: Duration,
    /// Interval between monitor ticks
    pub monitor_interval: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self::from(&DaemonConfig::default())
    }
}

impl From<&DaemonConfig> for TickConfig {
    fn from(config: &DaemonConfig) -> Self {
        Self {
            scheduler_interval: config.scheduler_interval(),
            monitor_interval: config.monitor_interval(),
        }
    }
}

impl TickConfig {
    /// Create a new tick config
    pub fn new(scheduler_interval: Duration, monitor_interval: Duration) -> Self {
        Self {
            scheduler_interval,
            monitor_interval,
        }
    }
}

/// Tick result indicates what happened during a tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickResult {
    /// Tick completed with nothing to do
    Idle,
    /// Scheduler placed requests on piles
    Assigned(usize),
    /// Monitor handled pile changes or finished charges
    Handled { recoveries: usize, completed: usize },
    /// Error occurred during tick
    Error(String),
}

/// Counters across the daemon's lifetime
#[derive(Debug, Default)]
pub struct TickState {
    /// Scheduler ticks run
    pub scheduler_ticks: u64,
    /// Monitor ticks run
    pub monitor_ticks: u64,
    /// Requests placed on piles
    pub total_assigned: u64,
    /// Pile status changes handled
    pub total_recoveries: u64,
    /// Charges completed by the monitor
    pub total_completed: u64,
    /// Ticks that failed
    pub total_errors: u64,
    /// Whether shutdown has been requested
    pub shutdown_requested: bool,
}

impl TickState {
    /// Create a new tick state
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a scheduler tick
    pub fn record_schedule(&mut self, result: &TickResult) {
        self.scheduler_ticks += 1;
        self.record(result);
    }

    /// Record the outcome of a monitor tick
    pub fn record_monitor(&mut self, result: &TickResult) {
        self.monitor_ticks += 1;
        self.record(result);
    }

    fn record(&mut self, result: &TickResult) {
        match result {
            TickResult::Idle => {}
            TickResult::Assigned(count) => self.total_assigned += *count as u64,
            TickResult::Handled { recoveries, completed } => {
                self.total_recoveries += *recoveries as u64;
                self.total_completed += *completed as u64;
            }
            TickResult::Error(_) => self.total_errors += 1,
        }
    }

    /// Request shutdown
    pub fn request_shutdown(&mut self) {
        self.shutdown_requested = true;
    }

    /// One-line summary for the shutdown log
    pub fn summary(&self) -> String {
        format!(
            "{} scheduler ticks, {} monitor ticks, {} assigned, {} recoveries, {} completed, {} errors",
            self.scheduler_ticks,
            self.monitor_ticks,
            self.total_assigned,
            self.total_recoveries,
            self.total_completed,
            self.total_errors
        )
    }
}
