//! Daemon - periodic scheduling and pile monitoring
//!
//! The daemon is the long-running process that:
//! - Runs a scheduling tick on a fixed interval
//! - Runs a monitor tick that recovers from pile failures and completes charges
//! - Drains outgoing notifications
//! - Shuts down cleanly on Ctrl-C

pub mod tick;

pub use tick::*;

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};

use crate::error::{Result, StationError};
use crate::notify::Delivery;
use crate::station::Station;

/// Run one scheduling tick
pub fn scheduler_tick(station: &Station) -> TickResult {
    match station.schedule() {
        Ok(report) if report.assignments.is_empty() => TickResult::Idle,
        Ok(report) => TickResult::Assigned(report.assignments.len()),
        Err(e) => {
            log::error!("Scheduling tick failed: {}", e);
            TickResult::Error(e.to_string())
        }
    }
}

/// Run one monitor tick
pub fn monitor_tick(station: &Station) -> TickResult {
    match station.monitor_tick() {
        Ok(report) => {
            let recoveries = report.actions.iter().filter(|a| !a.requeued().is_empty()).count();
            if recoveries == 0 && report.completed.is_empty() {
                TickResult::Idle
            } else {
                TickResult::Handled {
                    recoveries,
                    completed: report.completed.len(),
                }
            }
        }
        Err(e) => {
            log::error!("Monitor tick failed: {}", e);
            TickResult::Error(e.to_string())
        }
    }
}

async fn blocking<F>(station: &Arc<Station>, f: F) -> TickResult
where
    F: FnOnce(&Station) -> TickResult + Send + 'static,
{
    let station = station.clone();
    match tokio::task::spawn_blocking(move || f(&station)).await {
        Ok(result) => result,
        Err(e) => TickResult::Error(format!("tick task failed: {}", e)),
    }
}

fn log_delivery(delivery: &Delivery) {
    match serde_json::to_string(&delivery.message) {
        Ok(json) => log::info!("notify {}: {}", delivery.user_id, json),
        Err(e) => log::warn!("Failed to encode notification for {}: {}", delivery.user_id, e),
    }
}

/// Run the daemon loops until `shutdown` resolves
pub async fn run_until(
    station: Arc<Station>,
    config: TickConfig,
    mut deliveries: Option<mpsc::UnboundedReceiver<Delivery>>,
    shutdown: impl Future<Output = ()>,
) -> TickState {
    let mut state = TickState::new();
    let mut scheduler = interval(config.scheduler_interval);
    let mut monitor = interval(config.monitor_interval);
    scheduler.set_missed_tick_behavior(MissedTickBehavior::Delay);
    monitor.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    log::info!(
        "Daemon started: scheduler every {:?}, monitor every {:?}",
        config.scheduler_interval,
        config.monitor_interval
    );

    while !state.shutdown_requested {
        tokio::select! {
            _ = &mut shutdown => state.request_shutdown(),
            _ = monitor.tick() => {
                let result = blocking(&station, monitor_tick).await;
                state.record_monitor(&result);
            }
            _ = scheduler.tick() => {
                let result = blocking(&station, scheduler_tick).await;
                state.record_schedule(&result);
            }
            Some(delivery) = async {
                match deliveries.as_mut() {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending().await,
                }
            } => log_delivery(&delivery),
        }
    }

    if let Some(rx) = deliveries.as_mut() {
        while let Ok(delivery) = rx.try_recv() {
            log_delivery(&delivery);
        }
    }
    log::info!("Daemon stopped: {}", state.summary());
    state
}

/// Run the daemon loops until Ctrl-C
pub async fn run(
    station: Arc<Station>,
    config: TickConfig,
    deliveries: Option<mpsc::UnboundedReceiver<Delivery>>,
) -> Result<TickState> {
    let (signal_tx, mut signal_rx) = mpsc::channel::<std::io::Result<()>>(1);
    tokio::spawn(async move {
        let _ = signal_tx.send(tokio::signal::ctrl_c().await).await;
    });

    let mut signal_error = None;
    let state = run_until(station, config, deliveries, async {
        if let Some(Err(e)) = signal_rx.recv().await {
            signal_error = Some(e);
        }
    })
    .await;

    match signal_error {
        Some(e) => Err(StationError::Io(e)),
        None => Ok(state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Config;
    use crate::domain::{ChargeMode, PileType};
    use crate::notify::ChannelNotifier;
    use crate::store::{self, StationStore};
    use chrono::NaiveDate;
    use std::time::Duration;

    fn station() -> (Arc<Station>, mpsc::UnboundedReceiver<Delivery>) {
        let store = store::shared(StationStore::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap().and_hms_opt(8, 0, 0).unwrap(),
        ));
        let (notifier, rx) = ChannelNotifier::new();
        let station = Station::new(store, &Config::default(), clock, Arc::new(notifier)).unwrap();
        (Arc::new(station), rx)
    }

    #[test]
    fn test_scheduler_tick_idle_then_assigned() {
        let (station, _rx) = station();
        assert_eq!(scheduler_tick(&station), TickResult::Idle);

        station.add_pile(PileType::Fast, None).unwrap();
        station.register_user("u1", "Ann", 60.0).unwrap();
        station.submit("u1", ChargeMode::Fast, 20.0).unwrap();
        assert_eq!(scheduler_tick(&station), TickResult::Assigned(1));
    }

    #[test]
    fn test_monitor_tick_idle() {
        let (station, _rx) = station();
        station.add_pile(PileType::Slow, None).unwrap();
        // first pass records the new pile
        assert_eq!(monitor_tick(&station), TickResult::Idle);
        assert_eq!(monitor_tick(&station), TickResult::Idle);
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let (station, rx) = station();
        station.add_pile(PileType::Fast, None).unwrap();
        station.register_user("u1", "Ann", 60.0).unwrap();
        station.submit("u1", ChargeMode::Fast, 20.0).unwrap();

        let config = TickConfig::new(Duration::from_millis(10), Duration::from_millis(10));
        let state = run_until(station.clone(), config, Some(rx), tokio::time::sleep(Duration::from_millis(100))).await;

        assert!(state.shutdown_requested);
        assert!(state.scheduler_ticks >= 1);
        assert!(state.monitor_ticks >= 1);
        assert_eq!(state.total_assigned, 1);
        assert_eq!(state.total_errors, 0);
    }
}
