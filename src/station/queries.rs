//! Read-only views of requests, queues and piles, plus status push.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::Station;
use crate::billing::{Fees, Pricing, compute_fees};
use crate::capacity::PileQueue;
use crate::domain::{Bill, ChargeMode, ChargeRequest, Pile, RequestStatus, User};
use crate::error::Result;
use crate::estimator::{
    charging_minutes, charging_time_minutes, delivered_energy, elapsed_minutes, remaining_minutes, waiting_minutes,
};
use crate::notify::{self, Delivery, Outbound};
use crate::store::{self, RequestQuery, StoreTx};

/// Snapshot of a user's current request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargingStatus {
    pub user_id: String,
    pub request_id: String,
    pub status: RequestStatus,
    pub mode: ChargeMode,
    pub requested: f64,
    pub delivered: f64,
    pub battery_capacity: f64,
    pub current_charge: f64,
    pub pile_id: Option<String>,
    pub queue_position: Option<u32>,
    pub start_time: Option<NaiveDateTime>,
    /// Minutes until the requested energy is delivered, once charging
    pub remaining_minutes: u64,
    /// Fees for the energy delivered so far
    pub current_fee: Fees,
    /// Fees if the full amount is delivered
    pub estimated_fee: Fees,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueLocation {
    WaitingArea,
    ChargingPile,
    None,
}

/// Where a user stands in line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatus {
    pub user_id: String,
    /// Request id, doubling as the queue number
    pub queue_number: Option<String>,
    pub status: Option<RequestStatus>,
    pub location: QueueLocation,
    pub pile_id: Option<String>,
    /// Vehicles served before this one
    pub ahead: usize,
    pub estimated_wait_minutes: u64,
}

impl QueueStatus {
    fn none(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            queue_number: None,
            status: None,
            location: QueueLocation::None,
            pile_id: None,
            ahead: 0,
            estimated_wait_minutes: 0,
        }
    }
}

/// One vehicle in a pile's queue
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PileQueueEntry {
    pub position: u32,
    pub request_id: String,
    pub user_id: String,
    pub status: RequestStatus,
    pub amount: f64,
    /// Minutes since the request was submitted
    pub waited_minutes: i64,
}

/// A pile with its load
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PileOverview {
    pub pile: Pile,
    pub queue_length: usize,
    pub charging_request: Option<String>,
    pub waiting_minutes: u64,
    /// Completed charges billed on this pile
    pub charges: usize,
    pub energy: f64,
    pub revenue: f64,
}

fn charging_status(tx: &StoreTx<'_>, request: &ChargeRequest, pricing: &dyn Pricing, now: NaiveDateTime) -> Result<ChargingStatus> {
    let user = tx.get_user(&request.user_id)?.unwrap_or_else(|| User::new(&request.user_id, "", 0.0));
    let pile = match &request.pile_id {
        Some(id) => tx.get_pile(id)?,
        None => None,
    };

    let (delivered, remaining, current_fee, estimated_fee) = match (&pile, request.start_time) {
        (Some(pile), Some(start)) => {
            let delivered = delivered_energy(request, pile.power, now);
            let remaining = remaining_minutes(request, pile.power, now).ceil() as u64;
            let current = compute_fees(pricing, start, now.max(start), delivered);
            let finish = start + Duration::seconds((charging_minutes(request.amount, pile.power) * 60.0).round() as i64);
            let estimated = compute_fees(pricing, start, finish, request.amount);
            (delivered, remaining, current, estimated)
        }
        (Some(pile), None) => {
            let finish = now + Duration::minutes(charging_time_minutes(request.amount, pile.power) as i64);
            (0.0, 0, Fees::default(), compute_fees(pricing, now, finish, request.amount))
        }
        (None, _) => (0.0, 0, Fees::default(), Fees::default()),
    };

    Ok(ChargingStatus {
        user_id: request.user_id.clone(),
        request_id: request.id.clone(),
        status: request.status,
        mode: request.mode,
        requested: request.amount,
        delivered,
        battery_capacity: user.battery_capacity,
        current_charge: user.current_charge,
        pile_id: request.pile_id.clone(),
        queue_position: request.queue_position,
        start_time: request.start_time,
        remaining_minutes: remaining,
        current_fee,
        estimated_fee,
    })
}

fn queue_status(tx: &StoreTx<'_>, request: &ChargeRequest, now: NaiveDateTime) -> Result<QueueStatus> {
    let mut status = QueueStatus {
        user_id: request.user_id.clone(),
        queue_number: Some(request.id.clone()),
        status: Some(request.status),
        location: QueueLocation::WaitingArea,
        pile_id: request.pile_id.clone(),
        ahead: 0,
        estimated_wait_minutes: 0,
    };

    if let Some(pile_id) = &request.pile_id {
        status.location = QueueLocation::ChargingPile;
        let Some(pile) = tx.get_pile(pile_id)? else {
            return Ok(status);
        };
        let queue = tx.pile_queue(&pile)?;
        let position = request.queue_position.unwrap_or(1);
        status.ahead = position.saturating_sub(1) as usize;

        let mut ahead = PileQueue::new(pile.clone());
        ahead.charging = queue.charging.filter(|r| r.id != request.id);
        ahead.waiting = queue
            .waiting
            .into_iter()
            .filter(|r| r.queue_position.is_some_and(|p| p < position))
            .collect();
        status.estimated_wait_minutes = wait_estimate(waiting_minutes(&ahead, now), status.ahead);
        return Ok(status);
    }

    // Holding area: priority requests go first, then by age
    let holding = tx.query_requests(
        &RequestQuery::statuses(&[RequestStatus::Waiting, RequestStatus::PriorityWaiting])
            .unassigned()
            .mode(request.mode),
    )?;
    let rank = |r: &ChargeRequest| (r.status != RequestStatus::PriorityWaiting, r.created_at);
    let ahead: Vec<&ChargeRequest> = holding
        .iter()
        .filter(|r| r.id != request.id && rank(r) < rank(request))
        .collect();
    status.ahead = ahead.len();

    let queues: Vec<PileQueue> = tx
        .pile_queues()?
        .into_iter()
        .filter(|q| q.pile.serves(request.mode) && !q.pile.is_unavailable())
        .collect();
    if !queues.is_empty() {
        let soonest = queues
            .iter()
            .map(|q| waiting_minutes(q, now))
            .fold(f64::INFINITY, f64::min);
        let power = queues.iter().map(|q| q.pile.power).sum::<f64>() / queues.len() as f64;
        let backlog: f64 = ahead.iter().map(|r| charging_minutes(r.amount, power)).sum();
        status.estimated_wait_minutes = wait_estimate(soonest + backlog / queues.len() as f64, status.ahead);
    }
    Ok(status)
}

/// Rounded-up wait, at least one minute when anyone is ahead
fn wait_estimate(minutes: f64, ahead: usize) -> u64 {
    let minutes = minutes.max(0.0).ceil() as u64;
    if ahead > 0 { minutes.max(1) } else { minutes }
}

impl Station {
    /// Snapshot of the user's active request
    pub fn charging_status(&self, user_id: &str) -> Result<Option<ChargingStatus>> {
        let now = self.clock.now();
        store::lock(&self.store)?.transaction(|tx| {
            tx.require_user(user_id)?;
            match tx.active_request_for_user(user_id)? {
                Some(request) => Ok(Some(charging_status(tx, &request, self.pricing.as_ref(), now)?)),
                None => Ok(None),
            }
        })
    }

    /// Where the user's active request stands in line
    pub fn queue_status(&self, user_id: &str) -> Result<QueueStatus> {
        let now = self.clock.now();
        store::lock(&self.store)?.transaction(|tx| {
            tx.require_user(user_id)?;
            match tx.active_request_for_user(user_id)? {
                Some(request) => queue_status(tx, &request, now),
                None => Ok(QueueStatus::none(user_id)),
            }
        })
    }

    /// Vehicles at a pile in service order
    pub fn pile_queue(&self, pile_id: &str) -> Result<Vec<PileQueueEntry>> {
        let now = self.clock.now();
        store::lock(&self.store)?.transaction(|tx| {
            let pile = tx.require_pile(pile_id)?;
            let queue = tx.pile_queue(&pile)?;
            Ok(queue
                .charging
                .iter()
                .chain(queue.waiting.iter())
                .map(|r| PileQueueEntry {
                    position: r.queue_position.unwrap_or(0),
                    request_id: r.id.clone(),
                    user_id: r.user_id.clone(),
                    status: r.status,
                    amount: r.amount,
                    waited_minutes: elapsed_minutes(r.created_at, now),
                })
                .collect())
        })
    }

    /// Every pile with its queue length, waiting time and billed totals
    pub fn pile_overview(&self) -> Result<Vec<PileOverview>> {
        let now = self.clock.now();
        store::lock(&self.store)?.transaction(|tx| {
            let mut overview = Vec::new();
            for queue in tx.pile_queues()? {
                let bills = tx.bills_for_pile(&queue.pile.id)?;
                overview.push(PileOverview {
                    queue_length: queue.occupancy(),
                    charging_request: queue.charging.as_ref().map(|r| r.id.clone()),
                    waiting_minutes: waiting_minutes(&queue, now).ceil() as u64,
                    charges: bills.len(),
                    energy: bills.iter().map(|b| b.charged_amount).sum(),
                    revenue: bills.iter().map(|b| b.total_fee).sum(),
                    pile: queue.pile,
                });
            }
            Ok(overview)
        })
    }

    /// Bills issued to a user, oldest first
    pub fn bills(&self, user_id: &str) -> Result<Vec<Bill>> {
        store::lock(&self.store)?.transaction(|tx| {
            tx.require_user(user_id)?;
            tx.bills_for_user(user_id)
        })
    }

    /// Push a status snapshot to every user with an active request.
    /// Returns the number of messages sent.
    pub fn publish_statuses(&self) -> Result<usize> {
        let now = self.clock.now();
        let deliveries = store::lock(&self.store)?.transaction(|tx| {
            let mut deliveries = Vec::new();
            for request in tx.query_requests(&RequestQuery::active())? {
                let message = if request.status == RequestStatus::Charging {
                    Outbound::Status(charging_status(tx, &request, self.pricing.as_ref(), now)?)
                } else {
                    Outbound::Queue(queue_status(tx, &request, now)?)
                };
                deliveries.push(Delivery {
                    user_id: request.user_id.clone(),
                    message,
                });
            }
            Ok(deliveries)
        })?;
        notify::dispatch(self.notifier.as_ref(), &deliveries);
        Ok(deliveries.len())
    }

    pub fn user(&self, user_id: &str) -> Result<User> {
        store::lock(&self.store)?.transaction(|tx| tx.require_user(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_estimate_minimum() {
        assert_eq!(wait_estimate(0.0, 0), 0);
        assert_eq!(wait_estimate(0.0, 2), 1);
        assert_eq!(wait_estimate(12.2, 1), 13);
        assert_eq!(wait_estimate(-3.0, 0), 0);
    }
}
