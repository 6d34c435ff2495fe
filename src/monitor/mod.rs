//! Pile monitor: detects pile status changes and recovers the affected requests.
//!
//! The monitor keeps the last status it saw for every pile. Each pass compares
//! that cache with the store; for every pile whose status moved, the matching
//! handler runs in its own transaction and the cache is updated only once the
//! transaction has committed. Notifications go out after the store lock is
//! released.

mod recovery;
mod status_cache;

use std::sync::Arc;

pub use recovery::RecoveryAction;
pub use status_cache::StatusCache;

use crate::billing::Billing;
use crate::clock::Clock;
use crate::domain::PileStatus;
use crate::error::Result;
use crate::notify::{self, Delivery, Notifier};
use crate::store::{self, SharedStore};

pub struct PileMonitor {
    store: SharedStore,
    clock: Arc<dyn Clock>,
    billing: Arc<dyn Billing>,
    notifier: Arc<dyn Notifier>,
    min_salvage_energy: f64,
    cache: StatusCache,
}

impl PileMonitor {
    pub fn new(
        store: SharedStore,
        clock: Arc<dyn Clock>,
        billing: Arc<dyn Billing>,
        notifier: Arc<dyn Notifier>,
        min_salvage_energy: f64,
    ) -> Self {
        Self {
            store,
            clock,
            billing,
            notifier,
            min_salvage_energy,
            cache: StatusCache::new(),
        }
    }

    pub fn cache(&self) -> &StatusCache {
        &self.cache
    }

    /// Snapshot the current status of every pile
    pub fn initialize_status_cache(&mut self) -> Result<()> {
        let piles = store::lock(&self.store)?.transaction(|tx| tx.list_piles())?;
        self.cache.reset(&piles);
        tracing::debug!(piles = self.cache.len(), "Status cache initialized");
        Ok(())
    }

    /// Compare live pile status with the cache and handle every change.
    ///
    /// A pile whose handler fails is logged and left uncached so the next pass
    /// retries it; the remaining piles are still processed.
    pub fn detect_and_handle_changes(&mut self) -> Result<Vec<RecoveryAction>> {
        let now = self.clock.now();
        let mut actions = Vec::new();
        let mut deliveries: Vec<Delivery> = Vec::new();

        {
            let store = store::lock(&self.store)?;
            let piles = store.transaction(|tx| tx.list_piles())?;

            for pile_id in self.cache.forget_missing(&piles) {
                tracing::info!(pile = %pile_id, "Pile removed; dropped from status cache");
                actions.push(RecoveryAction::Forgotten { pile_id });
            }

            for pile in piles {
                let Some(cached) = self.cache.get(&pile.id) else {
                    self.cache.record(&pile.id, pile.status);
                    actions.push(RecoveryAction::Recorded {
                        pile_id: pile.id.clone(),
                        status: pile.status,
                    });
                    continue;
                };
                if cached == pile.status {
                    continue;
                }

                let mut pending = Vec::new();
                let result = store.transaction(|tx| {
                    // reread inside the transaction
                    let live = tx.require_pile(&pile.id)?;
                    match (cached, live.status) {
                        (_, PileStatus::Unavailable) => recovery::handle_failure(
                            tx,
                            &live,
                            now,
                            self.min_salvage_energy,
                            self.billing.as_ref(),
                            &mut pending,
                        ),
                        (PileStatus::Unavailable, PileStatus::Available) => {
                            recovery::handle_recovery(tx, &live, &mut pending)
                        }
                        (from, to) => Ok(RecoveryAction::Observed {
                            pile_id: live.id.clone(),
                            from,
                            to,
                        }),
                    }
                });

                match result {
                    Ok(action) => {
                        tracing::info!(pile = %pile.id, from = %cached, to = %pile.status, "Pile status changed");
                        self.cache.record(&pile.id, pile.status);
                        deliveries.append(&mut pending);
                        actions.push(action);
                    }
                    Err(e) => {
                        tracing::error!(pile = %pile.id, error = %e, "Failed to handle pile status change");
                    }
                }
            }
        }

        notify::dispatch(self.notifier.as_ref(), &deliveries);
        Ok(actions)
    }
}
