//! Handlers for pile status transitions.
//!
//! Each handler runs inside the monitor's transaction for one pile and works
//! from live request data, so running it twice for the same change is harmless.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::billing::Billing;
use crate::domain::{ChargeRequest, Pile, PileStatus, RequestStatus};
use crate::error::Result;
use crate::notify::{Delivery, NoticeKind};
use crate::station::complete_charge;
use crate::store::{RequestQuery, StoreTx};

const EPSILON: f64 = 1e-9;

/// What the monitor did about one pile
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecoveryAction {
    /// First sighting; status recorded without action
    Recorded { pile_id: String, status: PileStatus },
    /// Pile no longer exists
    Forgotten { pile_id: String },
    /// Status changed without anything to recover
    Observed {
        pile_id: String,
        from: PileStatus,
        to: PileStatus,
    },
    /// Pile went down; its queue moved to the priority queue
    Failed { pile_id: String, requeued: Vec<String> },
    /// Pile went down mid-charge
    Interrupted {
        pile_id: String,
        request_id: String,
        delivered: f64,
        remaining: f64,
        salvage_id: Option<String>,
        requeued: Vec<String>,
    },
    /// Pile came back; same-type queues were released for rescheduling
    Rebalanced { pile_id: String, requeued: Vec<String> },
}

impl RecoveryAction {
    pub fn pile_id(&self) -> &str {
        match self {
            RecoveryAction::Recorded { pile_id, .. }
            | RecoveryAction::Forgotten { pile_id }
            | RecoveryAction::Observed { pile_id, .. }
            | RecoveryAction::Failed { pile_id, .. }
            | RecoveryAction::Interrupted { pile_id, .. }
            | RecoveryAction::Rebalanced { pile_id, .. } => pile_id,
        }
    }

    /// Requests moved to the priority queue
    pub fn requeued(&self) -> &[String] {
        match self {
            RecoveryAction::Failed { requeued, .. }
            | RecoveryAction::Interrupted { requeued, .. }
            | RecoveryAction::Rebalanced { requeued, .. } => requeued,
            _ => &[],
        }
    }
}

/// Move every request waiting at `pile_id` to the priority queue
fn requeue_waiting(
    tx: &mut StoreTx<'_>,
    pile_id: &str,
    kind: NoticeKind,
    message: &str,
    deliveries: &mut Vec<Delivery>,
) -> Result<Vec<String>> {
    let waiting: Vec<ChargeRequest> = tx.query_requests(&RequestQuery::status(RequestStatus::Waiting).at_pile(pile_id))?;
    let mut requeued = Vec::new();
    for mut request in waiting {
        request.requeue_with_priority()?;
        tx.save_request(&request)?;
        tracing::info!(request = %request.id, pile = %pile_id, "Moved request to priority queue");
        deliveries.push(Delivery::notice(
            &request.user_id,
            kind,
            &request.id,
            Some(pile_id),
            message.to_string(),
        ));
        requeued.push(request.id);
    }
    tx.renumber_queue(pile_id)?;
    Ok(requeued)
}

/// A pile became UNAVAILABLE.
///
/// A charge in progress is stopped and billed. If enough energy is still owed,
/// a follow-up request joins the priority queue. Waiting requests follow it.
pub(crate) fn handle_failure(
    tx: &mut StoreTx<'_>,
    pile: &Pile,
    now: NaiveDateTime,
    min_salvage_energy: f64,
    billing: &dyn Billing,
    deliveries: &mut Vec<Delivery>,
) -> Result<RecoveryAction> {
    let charging = tx
        .query_requests(&RequestQuery::status(RequestStatus::Charging).at_pile(&pile.id))?
        .into_iter()
        .next();

    let interrupted = match charging {
        Some(request) => {
            let completion = complete_charge(tx, request, pile, now, billing)?;
            let request = completion.request;
            let remaining = (request.amount - completion.delivered).max(0.0);

            let salvage_id = if remaining + EPSILON >= min_salvage_energy {
                let id = tx.next_request_id(request.mode)?;
                let salvage = ChargeRequest::salvage(id.clone(), &request, remaining, now);
                tx.create_request(&salvage)?;
                Some(id)
            } else {
                None
            };
            tracing::warn!(
                pile = %pile.id,
                request = %request.id,
                delivered = completion.delivered,
                remaining,
                salvage = salvage_id.as_deref().unwrap_or("-"),
                "Charge interrupted by pile failure"
            );

            let message = match &salvage_id {
                Some(id) => format!(
                    "Pile {} failed: {:.2} kWh delivered, {:.2} kWh re-queued as {}",
                    pile.id, completion.delivered, remaining, id
                ),
                None => format!(
                    "Pile {} failed: {:.2} kWh delivered, charge completed",
                    pile.id, completion.delivered
                ),
            };
            deliveries.push(Delivery::notice(
                &request.user_id,
                NoticeKind::ChargingInterrupted,
                &request.id,
                Some(&pile.id),
                message,
            ));
            Some((request.id, completion.delivered, remaining, salvage_id))
        }
        None => None,
    };

    let requeued = requeue_waiting(
        tx,
        &pile.id,
        NoticeKind::PileFailure,
        &format!("Pile {} failed; your request will be rescheduled with priority", pile.id),
        deliveries,
    )?;

    Ok(match interrupted {
        Some((request_id, delivered, remaining, salvage_id)) => RecoveryAction::Interrupted {
            pile_id: pile.id.clone(),
            request_id,
            delivered,
            remaining,
            salvage_id,
            requeued,
        },
        None => RecoveryAction::Failed {
            pile_id: pile.id.clone(),
            requeued,
        },
    })
}

/// A pile came back.
///
/// Requests waiting at every other pile of the same type are released to the
/// priority queue so the scheduler can spread them over the restored capacity.
/// Charging requests stay where they are.
pub(crate) fn handle_recovery(
    tx: &mut StoreTx<'_>,
    pile: &Pile,
    deliveries: &mut Vec<Delivery>,
) -> Result<RecoveryAction> {
    let message = format!("Pile {} is back; your request will be rescheduled", pile.id);
    let mut requeued = Vec::new();
    for other in tx.list_piles()? {
        if other.id == pile.id || other.pile_type != pile.pile_type {
            continue;
        }
        requeued.extend(requeue_waiting(
            tx,
            &other.id,
            NoticeKind::PileRecoveryRebalance,
            &message,
            deliveries,
        )?);
    }
    tracing::info!(pile = %pile.id, requeued = requeued.len(), "Pile recovered; rebalancing");
    Ok(RecoveryAction::Rebalanced {
        pile_id: pile.id.clone(),
        requeued,
    })
}
