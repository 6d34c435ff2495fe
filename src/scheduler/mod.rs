//! Scheduler: assigns holding-area requests to pile queues.
//!
//! Each tick runs in one store transaction:
//! 1. Requests displaced by a failure or rebalance (PRIORITY_WAITING) are
//!    placed greedily, oldest first.
//! 2. If any of them are still unplaced, the tick ends there.
//! 3. Otherwise the configured [`Strategy`] handles ordinary WAITING requests.
//!
//! # Example
//!
//! ```ignore
//! use chargeq::scheduler::Scheduler;
//!
//! let scheduler = Scheduler::new(store.clone(), config.station.clone(), clock.clone());
//! let report = scheduler.schedule()?;
//! println!("{} assigned", report.assignments.len());
//! ```

mod batch;
mod greedy;
mod optimizer;
mod priority;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub use greedy::pick_pile;
pub use optimizer::{BatchPlan, BatchProblem, MAX_BATCH_SIZE, solve};

use crate::capacity::PileQueue;
use crate::clock::Clock;
use crate::config::StationConfig;
use crate::domain::{ChargeRequest, RequestStatus};
use crate::error::{Result, StationError};
use crate::store::{self, SharedStore, StoreTx};

/// Scheduling strategy, selected by configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    /// Place each request on the pile where it finishes soonest
    #[default]
    #[serde(alias = "ORIGINAL")]
    Greedy,
    /// Place per-mode batches once enough capacity frees up
    SingleBatchOptimal,
    /// Place a station-wide batch when every pile is idle
    FullBatchOptimal,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Greedy => "GREEDY",
            Strategy::SingleBatchOptimal => "SINGLE_BATCH_OPTIMAL",
            Strategy::FullBatchOptimal => "FULL_BATCH_OPTIMAL",
        }
    }

    fn run(self, tx: &mut StoreTx<'_>, pass: &mut Pass<'_>) -> Result<()> {
        match self {
            Strategy::Greedy => {
                greedy::schedule_holding_area(tx, pass.queues, pass.config.pile_queue_length, pass.now, pass.report)
            }
            Strategy::SingleBatchOptimal => {
                batch::schedule_single_batches(tx, pass.queues, pass.config, pass.now, pass.report)
            }
            Strategy::FullBatchOptimal => batch::schedule_full_batch(tx, pass.queues, pass.config, pass.now, pass.report),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = StationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GREEDY" | "ORIGINAL" => Ok(Strategy::Greedy),
            "SINGLE_BATCH_OPTIMAL" => Ok(Strategy::SingleBatchOptimal),
            "FULL_BATCH_OPTIMAL" => Ok(Strategy::FullBatchOptimal),
            other => Err(StationError::Validation(format!("unknown strategy: {}", other))),
        }
    }
}

/// A request placed on a pile queue during a tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub request_id: String,
    pub pile_id: String,
    pub position: u32,
    /// Re-admitted from the priority queue
    pub priority: bool,
}

/// What one scheduling tick did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleReport {
    pub strategy: Strategy,
    pub assignments: Vec<Assignment>,
    /// Priority requests still waiting; non-zero means ordinary scheduling was skipped
    pub priority_unplaced: usize,
}

impl ScheduleReport {
    fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            assignments: Vec::new(),
            priority_unplaced: 0,
        }
    }
}

/// Working state of one tick
struct Pass<'a> {
    queues: &'a mut [PileQueue],
    config: &'a StationConfig,
    now: NaiveDateTime,
    report: &'a mut ScheduleReport,
}

/// Assign `request` to the back of `queue` and persist it
pub(crate) fn place(
    tx: &mut StoreTx<'_>,
    queue: &mut PileQueue,
    mut request: ChargeRequest,
    report: &mut ScheduleReport,
) -> Result<()> {
    let priority = request.status == RequestStatus::PriorityWaiting;
    let position = queue.next_position();
    request.assign(&queue.pile.id, position)?;
    tx.save_request(&request)?;

    tracing::info!(
        request = %request.id,
        pile = %queue.pile.id,
        position,
        priority,
        "Assigned request"
    );
    report.assignments.push(Assignment {
        request_id: request.id.clone(),
        pile_id: queue.pile.id.clone(),
        position,
        priority,
    });
    queue.push(request);
    Ok(())
}

/// Runs scheduling ticks against the shared store
pub struct Scheduler {
    store: SharedStore,
    config: StationConfig,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(store: SharedStore, config: StationConfig, clock: Arc<dyn Clock>) -> Self {
        Self { store, config, clock }
    }

    pub fn strategy(&self) -> Strategy {
        self.config.schedule_strategy
    }

    /// Run one scheduling tick
    pub fn schedule(&self) -> Result<ScheduleReport> {
        let now = self.clock.now();
        let strategy = self.config.schedule_strategy;
        let store = store::lock(&self.store)?;

        let report = store.transaction(|tx| {
            for orphan in tx.orphaned_requests()? {
                tracing::warn!(
                    request = %orphan.id,
                    pile = orphan.pile_id.as_deref().unwrap_or("-"),
                    "Request references a missing pile; skipping"
                );
            }

            let mut queues = tx.pile_queues()?;
            let mut report = ScheduleReport::new(strategy);

            report.priority_unplaced =
                priority::drain(tx, &mut queues, self.config.pile_queue_length, now, &mut report)?;
            if report.priority_unplaced > 0 {
                tracing::info!(
                    remaining = report.priority_unplaced,
                    "Priority requests still waiting; ordinary scheduling skipped"
                );
                return Ok(report);
            }

            let mut pass = Pass {
                queues: &mut queues,
                config: &self.config,
                now,
                report: &mut report,
            };
            strategy.run(tx, &mut pass)?;
            Ok(report)
        })?;

        if !report.assignments.is_empty() {
            tracing::info!(
                strategy = %strategy,
                assigned = report.assignments.len(),
                "Scheduling tick complete"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::{ChargeMode, Pile, PileType};
    use crate::store::{RequestQuery, StationStore};
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(9, 0, 0).unwrap()
    }

    struct Fixture {
        store: SharedStore,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new(fast: usize, slow: usize) -> Self {
            let store = store::shared(StationStore::open_in_memory().unwrap());
            store::lock(&store)
                .unwrap()
                .transaction(|tx| {
                    for _ in 0..fast {
                        let id = tx.next_pile_id(PileType::Fast)?;
                        tx.save_pile(&Pile::new(id, PileType::Fast, 30.0))?;
                    }
                    for _ in 0..slow {
                        let id = tx.next_pile_id(PileType::Slow)?;
                        tx.save_pile(&Pile::new(id, PileType::Slow, 7.0))?;
                    }
                    Ok(())
                })
                .unwrap();
            Self {
                store,
                clock: Arc::new(ManualClock::new(start())),
            }
        }

        fn submit(&self, mode: ChargeMode, amount: f64) -> String {
            let now = self.clock.now();
            self.clock.advance_minutes(1);
            store::lock(&self.store)
                .unwrap()
                .transaction(|tx| {
                    let id = tx.next_request_id(mode)?;
                    tx.save_request(&ChargeRequest::new(id.clone(), &format!("u-{}", id), mode, amount, now))?;
                    Ok(id)
                })
                .unwrap()
        }

        fn priority(&self, mode: ChargeMode, amount: f64) -> String {
            let now = self.clock.now();
            store::lock(&self.store)
                .unwrap()
                .transaction(|tx| {
                    let id = tx.next_request_id(mode)?;
                    let mut request = ChargeRequest::new(id.clone(), "displaced", mode, amount, now);
                    request.status = RequestStatus::PriorityWaiting;
                    tx.save_request(&request)?;
                    Ok(id)
                })
                .unwrap()
        }

        fn request(&self, id: &str) -> ChargeRequest {
            store::lock(&self.store)
                .unwrap()
                .transaction(|tx| tx.require_request(id))
                .unwrap()
        }

        fn scheduler(&self, strategy: Strategy, queue_length: usize) -> Scheduler {
            let config = StationConfig {
                schedule_strategy: strategy,
                pile_queue_length: queue_length,
                ..StationConfig::default()
            };
            Scheduler::new(self.store.clone(), config, self.clock.clone())
        }

        fn holding_count(&self) -> usize {
            store::lock(&self.store)
                .unwrap()
                .transaction(|tx| {
                    tx.count_requests(
                        &RequestQuery::statuses(&[RequestStatus::Waiting, RequestStatus::PriorityWaiting]).unassigned(),
                    )
                })
                .unwrap()
        }
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("GREEDY".parse::<Strategy>().unwrap(), Strategy::Greedy);
        assert_eq!("original".parse::<Strategy>().unwrap(), Strategy::Greedy);
        assert_eq!(
            "full_batch_optimal".parse::<Strategy>().unwrap(),
            Strategy::FullBatchOptimal
        );
        assert!("FASTEST".parse::<Strategy>().is_err());
        assert_eq!(Strategy::SingleBatchOptimal.to_string(), "SINGLE_BATCH_OPTIMAL");
    }

    #[test]
    fn test_greedy_fills_piles_in_order() {
        let fx = Fixture::new(2, 0);
        let a = fx.submit(ChargeMode::Fast, 30.0);
        let b = fx.submit(ChargeMode::Fast, 30.0);
        let c = fx.submit(ChargeMode::Fast, 30.0);

        let report = fx.scheduler(Strategy::Greedy, 2).schedule().unwrap();
        assert_eq!(report.assignments.len(), 3);

        let a = fx.request(&a);
        let b = fx.request(&b);
        let c = fx.request(&c);
        assert_eq!(a.pile_id.as_deref(), Some("F001"));
        assert_eq!(a.queue_position, Some(1));
        assert_eq!(b.pile_id.as_deref(), Some("F002"));
        assert_eq!(b.queue_position, Some(1));
        assert_eq!(c.pile_id.as_deref(), Some("F001"));
        assert_eq!(c.queue_position, Some(2));
    }

    #[test]
    fn test_greedy_respects_queue_length() {
        let fx = Fixture::new(1, 1);
        for _ in 0..3 {
            fx.submit(ChargeMode::Slow, 7.0);
        }
        let report = fx.scheduler(Strategy::Greedy, 2).schedule().unwrap();
        assert_eq!(report.assignments.len(), 2);
        assert!(report.assignments.iter().all(|a| a.pile_id == "T001"));
        assert_eq!(fx.holding_count(), 1);
    }

    #[test]
    fn test_priority_drained_first() {
        let fx = Fixture::new(1, 0);
        let ordinary = fx.submit(ChargeMode::Fast, 10.0);
        let urgent = fx.priority(ChargeMode::Fast, 5.0);

        let report = fx.scheduler(Strategy::Greedy, 1).schedule().unwrap();
        assert_eq!(report.assignments.len(), 1);
        assert!(report.assignments[0].priority);
        assert_eq!(report.assignments[0].request_id, urgent);

        let urgent = fx.request(&urgent);
        assert_eq!(urgent.status, RequestStatus::Waiting);
        assert_eq!(urgent.pile_id.as_deref(), Some("F001"));
        assert!(fx.request(&ordinary).pile_id.is_none());
    }

    #[test]
    fn test_unplaced_priority_blocks_ordinary_scheduling() {
        let fx = Fixture::new(1, 1);
        fx.submit(ChargeMode::Slow, 7.0);
        fx.priority(ChargeMode::Fast, 5.0);
        fx.priority(ChargeMode::Fast, 5.0);

        let report = fx.scheduler(Strategy::Greedy, 1).schedule().unwrap();
        assert_eq!(report.priority_unplaced, 1);
        assert_eq!(report.assignments.len(), 1);
        // the slow pile is free but ordinary scheduling waits for the priority queue
        assert_eq!(fx.holding_count(), 2);
    }

    #[test]
    fn test_single_batch_waits_for_threshold() {
        let fx = Fixture::new(2, 0);
        fx.submit(ChargeMode::Fast, 10.0);

        let scheduler = fx.scheduler(Strategy::SingleBatchOptimal, 2);
        assert!(scheduler.schedule().unwrap().assignments.is_empty());

        fx.submit(ChargeMode::Fast, 20.0);
        let report = scheduler.schedule().unwrap();
        assert_eq!(report.assignments.len(), 2);
        let piles: Vec<&str> = report.assignments.iter().map(|a| a.pile_id.as_str()).collect();
        assert!(piles.contains(&"F001") && piles.contains(&"F002"));
    }

    #[test]
    fn test_single_batch_orders_shortest_first() {
        let fx = Fixture::new(1, 0);
        let long = fx.submit(ChargeMode::Fast, 30.0);
        let short = fx.submit(ChargeMode::Fast, 5.0);

        let report = fx.scheduler(Strategy::SingleBatchOptimal, 2).schedule().unwrap();
        assert_eq!(report.assignments.len(), 2);
        assert_eq!(fx.request(&short).queue_position, Some(1));
        assert_eq!(fx.request(&long).queue_position, Some(2));
    }

    #[test]
    fn test_full_batch_needs_idle_station_and_enough_requests() {
        let fx = Fixture::new(1, 1);
        let scheduler = fx.scheduler(Strategy::FullBatchOptimal, 1);

        fx.submit(ChargeMode::Fast, 10.0);
        assert!(scheduler.schedule().unwrap().assignments.is_empty());

        fx.submit(ChargeMode::Slow, 7.0);
        fx.submit(ChargeMode::Fast, 10.0);
        let report = scheduler.schedule().unwrap();
        assert_eq!(report.assignments.len(), 2);
        assert_eq!(fx.holding_count(), 1);

        // piles now occupied: nothing more happens
        fx.submit(ChargeMode::Slow, 7.0);
        assert!(scheduler.schedule().unwrap().assignments.is_empty());
    }

    #[test]
    fn test_full_batch_skips_oversized_station() {
        let fx = Fixture::new(9, 0);
        for _ in 0..18 {
            fx.submit(ChargeMode::Fast, 10.0);
        }
        let report = fx.scheduler(Strategy::FullBatchOptimal, 2).schedule().unwrap();
        assert!(report.assignments.is_empty());
    }

    #[test]
    fn test_positions_contiguous_after_tick() {
        let fx = Fixture::new(2, 2);
        for i in 0..8 {
            let mode = if i % 2 == 0 { ChargeMode::Fast } else { ChargeMode::Slow };
            fx.submit(mode, 5.0 + i as f64);
        }
        fx.scheduler(Strategy::Greedy, 2).schedule().unwrap();

        let queues = store::lock(&fx.store)
            .unwrap()
            .transaction(|tx| tx.pile_queues())
            .unwrap();
        for queue in queues {
            let positions: Vec<u32> = queue.waiting.iter().filter_map(|r| r.queue_position).collect();
            let expected: Vec<u32> = (1..=positions.len() as u32).collect();
            assert_eq!(positions, expected, "pile {}", queue.pile.id);
        }
    }
}
