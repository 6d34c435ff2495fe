//! User-facing request lifecycle: submit, modify, cancel, start and stop.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::Station;
use crate::billing::Billing;
use crate::domain::{Bill, ChargeMode, ChargeRequest, Pile, PileStatus, RequestStatus, User};
use crate::error::{Result, StationError};
use crate::estimator::delivered_energy;
use crate::notify::{self, Delivery, NoticeKind};
use crate::store::{self, RequestQuery, StoreTx};

const EPSILON: f64 = 1e-9;

/// Outcome of a lifecycle operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargingResponse {
    pub request_id: String,
    pub message: String,
    pub status: RequestStatus,
}

impl ChargingResponse {
    fn new(request: &ChargeRequest, message: impl Into<String>) -> Self {
        Self {
            request_id: request.id.clone(),
            message: message.into(),
            status: request.status,
        }
    }
}

/// A finished charge and what it produced
#[derive(Debug, Clone)]
pub(crate) struct Completion {
    pub request: ChargeRequest,
    pub delivered: f64,
    pub bill: Option<Bill>,
}

/// Finish the charge of `request` at `pile`.
///
/// Records delivery and end time, credits the user's battery, frees the pile
/// if it was charging, issues the bill and closes the gap in the queue. A
/// billing failure is logged and the completion still stands.
pub(crate) fn complete_charge(
    tx: &mut StoreTx<'_>,
    mut request: ChargeRequest,
    pile: &Pile,
    now: NaiveDateTime,
    billing: &dyn Billing,
) -> Result<Completion> {
    let delivered = delivered_energy(&request, pile.power, now);
    request.transition(RequestStatus::Completed)?;
    request.end_time = Some(now);
    request.delivered_energy = Some(delivered);
    tx.save_request(&request)?;

    match tx.get_user(&request.user_id)? {
        Some(mut user) => {
            user.add_charge(delivered);
            tx.save_user(&user)?;
        }
        None => log::warn!("Request {} belongs to unknown user {}", request.id, request.user_id),
    }

    if pile.status == PileStatus::Charging {
        let mut freed = pile.clone();
        freed.status = PileStatus::Available;
        tx.save_pile(&freed)?;
    }

    let bill = match billing.generate_bill(&request, pile) {
        Ok(mut bill) => {
            bill.number = tx.next_bill_number(now.date())?;
            tx.save_bill(&bill)?;
            Some(bill)
        }
        Err(e) => {
            log::error!("Failed to bill request {}: {}", request.id, e);
            None
        }
    };

    tx.renumber_queue(&pile.id)?;
    log::info!(
        "Completed {} on {}: {:.2} of {:.2} kWh",
        request.id,
        pile.id,
        delivered,
        request.amount
    );
    Ok(Completion {
        request,
        delivered,
        bill,
    })
}

fn validate_amount(amount: f64, user: &User) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(StationError::Validation(format!("amount must be positive, got {}", amount)));
    }
    if amount > user.headroom() + EPSILON {
        return Err(StationError::Validation(format!(
            "amount {:.2} kWh exceeds remaining battery capacity {:.2} kWh",
            amount,
            user.headroom()
        )));
    }
    Ok(())
}

fn require_active(tx: &StoreTx<'_>, user_id: &str) -> Result<ChargeRequest> {
    tx.active_request_for_user(user_id)?
        .ok_or_else(|| StationError::NotFound(format!("active request for user {}", user_id)))
}

impl Station {
    /// Submit a new charging request to the holding area
    pub fn submit(&self, user_id: &str, mode: ChargeMode, amount: f64) -> Result<ChargingResponse> {
        let now = self.clock.now();
        let capacity = self.config.waiting_area_capacity;
        store::lock(&self.store)?.transaction(|tx| {
            let user = tx
                .get_user(user_id)?
                .ok_or_else(|| StationError::Validation(format!("unknown user {}", user_id)))?;
            if user.battery_capacity <= 0.0 {
                return Err(StationError::Validation(format!("user {} has no battery capacity", user_id)));
            }
            if let Some(active) = tx.active_request_for_user(user_id)? {
                return Err(StationError::Validation(format!(
                    "user {} already has request {} ({})",
                    user_id, active.id, active.status
                )));
            }
            validate_amount(amount, &user)?;

            let waiting = tx.count_requests(&RequestQuery::status(RequestStatus::Waiting).unassigned())?;
            if waiting >= capacity {
                return Err(StationError::WaitingAreaFull(waiting));
            }

            let id = tx.next_request_id(mode)?;
            let request = ChargeRequest::new(id, user_id, mode, amount, now);
            tx.create_request(&request)?;
            log::info!("Submitted {} for {}: {} {:.2} kWh", request.id, user_id, mode, amount);
            Ok(ChargingResponse::new(&request, "Request submitted"))
        })
    }

    /// Change the mode or amount of a request still in the holding area.
    ///
    /// A mode change cancels the request and submits a new one at the back of
    /// the line; an amount change keeps the request's place.
    pub fn modify(&self, user_id: &str, mode: ChargeMode, amount: f64) -> Result<ChargingResponse> {
        let now = self.clock.now();
        store::lock(&self.store)?.transaction(|tx| {
            let mut request = require_active(tx, user_id)?;
            if request.status != RequestStatus::Waiting {
                return Err(StationError::Precondition(format!(
                    "request {} is {}; only waiting requests can be modified",
                    request.id, request.status
                )));
            }

            let unchanged = request.mode == mode && (request.amount - amount).abs() < EPSILON;
            if unchanged {
                return Ok(ChargingResponse::new(&request, "Request unchanged"));
            }
            if let Some(pile_id) = &request.pile_id {
                return Err(StationError::Precondition(format!(
                    "request {} is already queued at pile {}",
                    request.id, pile_id
                )));
            }

            let user = tx.require_user(user_id)?;
            validate_amount(amount, &user)?;

            if request.mode == mode {
                request.amount = amount;
                tx.save_request(&request)?;
                log::info!("Modified {}: amount {:.2} kWh", request.id, amount);
                return Ok(ChargingResponse::new(&request, "Amount updated"));
            }

            request.transition(RequestStatus::Canceled)?;
            tx.save_request(&request)?;
            let id = tx.next_request_id(mode)?;
            let replacement = ChargeRequest::new(id, user_id, mode, amount, now);
            tx.create_request(&replacement)?;
            log::info!("Modified {}: replaced by {} ({})", request.id, replacement.id, mode);
            Ok(ChargingResponse::new(
                &replacement,
                format!("Mode changed; request {} replaced", request.id),
            ))
        })
    }

    /// Cancel the user's waiting request
    pub fn cancel(&self, user_id: &str) -> Result<ChargingResponse> {
        store::lock(&self.store)?.transaction(|tx| {
            let mut request = require_active(tx, user_id)?;
            if request.status == RequestStatus::Charging {
                return Err(StationError::Precondition(format!(
                    "request {} is charging; stop it instead",
                    request.id
                )));
            }

            let pile_id = request.pile_id.clone();
            request.transition(RequestStatus::Canceled)?;
            request.clear_assignment();
            tx.save_request(&request)?;
            if let Some(pile_id) = &pile_id {
                tx.renumber_queue(pile_id)?;
            }
            log::info!("Canceled {}", request.id);
            Ok(ChargingResponse::new(&request, "Request canceled"))
        })
    }

    /// Begin charging; the request must be first in its pile's queue
    pub fn start(&self, user_id: &str) -> Result<ChargingResponse> {
        let now = self.clock.now();
        store::lock(&self.store)?.transaction(|tx| {
            let mut request = require_active(tx, user_id)?;
            let (Some(pile_id), Some(position)) = (request.pile_id.clone(), request.queue_position) else {
                return Err(StationError::Precondition(format!(
                    "request {} has not been assigned a pile",
                    request.id
                )));
            };
            if request.status != RequestStatus::Waiting {
                return Err(StationError::Precondition(format!("request {} is {}", request.id, request.status)));
            }
            if position != 1 {
                return Err(StationError::Precondition(format!(
                    "request {} is number {} in the queue at {}",
                    request.id, position, pile_id
                )));
            }

            let mut pile = tx.require_pile(&pile_id)?;
            if pile.is_unavailable() {
                return Err(StationError::Precondition(format!("pile {} is unavailable", pile_id)));
            }

            request.transition(RequestStatus::Charging)?;
            request.start_time = Some(now);
            tx.save_request(&request)?;
            pile.status = PileStatus::Charging;
            tx.save_pile(&pile)?;
            log::info!("Started {} on {}", request.id, pile_id);
            Ok(ChargingResponse::new(&request, format!("Charging started on {}", pile_id)))
        })
    }

    /// Stop charging and issue the bill
    pub fn stop(&self, user_id: &str) -> Result<ChargingResponse> {
        let now = self.clock.now();
        store::lock(&self.store)?.transaction(|tx| {
            let request = require_active(tx, user_id)?;
            if request.status != RequestStatus::Charging {
                return Err(StationError::Precondition(format!(
                    "request {} is {}, not charging",
                    request.id, request.status
                )));
            }
            let pile_id = request
                .pile_id
                .clone()
                .ok_or_else(|| StationError::Storage(format!("charging request {} has no pile", request.id)))?;
            let pile = tx.require_pile(&pile_id)?;

            let completion = complete_charge(tx, request, &pile, now, self.billing.as_ref())?;
            let message = match &completion.bill {
                Some(bill) => format!(
                    "Charging stopped: {:.2} kWh, bill {} total {:.2}",
                    completion.delivered, bill.number, bill.total_fee
                ),
                None => format!("Charging stopped: {:.2} kWh", completion.delivered),
            };
            Ok(ChargingResponse::new(&completion.request, message))
        })
    }

    /// Complete every charge whose requested energy has been delivered.
    /// Returns the completed request ids.
    pub fn auto_stop_completed(&self) -> Result<Vec<String>> {
        let now = self.clock.now();
        let completions = store::lock(&self.store)?.transaction(|tx| {
            let mut completions = Vec::new();
            for request in tx.query_requests(&RequestQuery::status(RequestStatus::Charging))? {
                let Some(pile) = request.pile_id.as_deref().map(|id| tx.get_pile(id)).transpose()?.flatten() else {
                    log::warn!("Charging request {} references a missing pile; skipping", request.id);
                    continue;
                };
                if delivered_energy(&request, pile.power, now) + EPSILON < request.amount {
                    continue;
                }
                completions.push(complete_charge(tx, request, &pile, now, self.billing.as_ref())?);
            }
            Ok(completions)
        })?;

        let deliveries: Vec<Delivery> = completions
            .iter()
            .map(|c| {
                let message = match &c.bill {
                    Some(bill) => format!(
                        "Charging complete: {:.2} kWh, bill {} total {:.2}",
                        c.delivered, bill.number, bill.total_fee
                    ),
                    None => format!("Charging complete: {:.2} kWh", c.delivered),
                };
                Delivery::notice(
                    &c.request.user_id,
                    NoticeKind::ChargeCompleted,
                    &c.request.id,
                    c.request.pile_id.as_deref(),
                    message,
                )
            })
            .collect();
        notify::dispatch(self.notifier.as_ref(), &deliveries);

        Ok(completions.into_iter().map(|c| c.request.id).collect())
    }
}
