//! The station: every operation users and the daemon call.
//!
//! Every operation locks the shared store and runs in one transaction.
//! Notifications go out after the transaction commits.

mod admin;
mod lifecycle;
mod queries;

use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::Serialize;

pub(crate) use lifecycle::complete_charge;
pub use lifecycle::ChargingResponse;
pub use queries::{ChargingStatus, PileOverview, PileQueueEntry, QueueLocation, QueueStatus};

use crate::billing::{Billing, Pricing, TimeOfUseBilling, TimeOfUsePricing};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, StationConfig};
use crate::error::{Result, StationError};
use crate::monitor::{PileMonitor, RecoveryAction};
use crate::notify::Notifier;
use crate::scheduler::{ScheduleReport, Scheduler};
use crate::store::{self, SharedStore, StationStore};

/// What one monitor pass did
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorReport {
    pub actions: Vec<RecoveryAction>,
    pub completed: Vec<String>,
    pub published: usize,
}

pub struct Station {
    store: SharedStore,
    config: StationConfig,
    clock: Arc<dyn Clock>,
    pricing: Arc<dyn Pricing>,
    billing: Arc<dyn Billing>,
    notifier: Arc<dyn Notifier>,
    scheduler: Scheduler,
    monitor: Mutex<PileMonitor>,
}

impl Station {
    /// Build a station over an open store with time-of-use billing
    pub fn new(store: SharedStore, config: &Config, clock: Arc<dyn Clock>, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let pricing: Arc<dyn Pricing> = Arc::new(TimeOfUsePricing::new(config.tariff.clone()));
        let billing: Arc<dyn Billing> = Arc::new(TimeOfUseBilling::new(pricing.clone()));
        Self::with_billing(store, config.station.clone(), clock, pricing, billing, notifier)
    }

    pub fn with_billing(
        store: SharedStore,
        config: StationConfig,
        clock: Arc<dyn Clock>,
        pricing: Arc<dyn Pricing>,
        billing: Arc<dyn Billing>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let scheduler = Scheduler::new(store.clone(), config.clone(), clock.clone());
        let mut monitor = PileMonitor::new(
            store.clone(),
            clock.clone(),
            billing.clone(),
            notifier.clone(),
            config.min_salvage_energy,
        );
        monitor.initialize_status_cache()?;

        Ok(Self {
            store,
            config,
            clock,
            pricing,
            billing,
            notifier,
            scheduler,
            monitor: Mutex::new(monitor),
        })
    }

    /// Open the store in `store_dir` and build a station on the system clock
    pub fn open(store_dir: &Path, config: &Config, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let store = store::shared(StationStore::open_at(store_dir)?);
        Self::new(store, config, Arc::new(SystemClock), notifier)
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run one scheduling tick
    pub fn schedule(&self) -> Result<ScheduleReport> {
        self.scheduler.schedule()
    }

    /// Handle pile status changes since the last pass
    pub fn detect_pile_changes(&self) -> Result<Vec<RecoveryAction>> {
        let mut monitor = self
            .monitor
            .lock()
            .map_err(|e| StationError::Storage(format!("monitor lock poisoned: {}", e)))?;
        monitor.detect_and_handle_changes()
    }

    /// Full monitor pass: pile changes, finished charges, then status push
    pub fn monitor_tick(&self) -> Result<MonitorReport> {
        let actions = self.detect_pile_changes()?;
        let completed = self.auto_stop_completed()?;
        let published = self.publish_statuses()?;
        Ok(MonitorReport {
            actions,
            completed,
            published,
        })
    }
}
