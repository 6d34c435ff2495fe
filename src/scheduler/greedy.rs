//! Greedy-immediate assignment: each request goes to the compatible pile where
//! it would finish soonest.

use chrono::NaiveDateTime;

use super::{ScheduleReport, place};
use crate::capacity::PileQueue;
use crate::domain::{ChargeRequest, RequestStatus};
use crate::error::Result;
use crate::estimator::{charging_minutes, waiting_minutes};
use crate::store::{RequestQuery, StoreTx};

const EPSILON: f64 = 1e-9;

/// Index of the pile where `request` would complete earliest.
///
/// Only compatible piles with a free slot are considered. Ties go to the
/// first pile in `queues` order.
pub fn pick_pile(request: &ChargeRequest, queues: &[PileQueue], max_queue_length: usize, now: NaiveDateTime) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, queue) in queues.iter().enumerate() {
        if !queue.pile.serves(request.mode) || queue.remaining_capacity(max_queue_length) == 0 {
            continue;
        }
        let completion = waiting_minutes(queue, now) + charging_minutes(request.amount, queue.pile.power);
        if best.is_none_or(|(_, current)| completion < current - EPSILON) {
            best = Some((index, completion));
        }
    }
    best.map(|(index, _)| index)
}

/// Place requests one by one, oldest first. Returns how many could not be placed.
pub(crate) fn assign_each(
    tx: &mut StoreTx<'_>,
    requests: Vec<ChargeRequest>,
    queues: &mut [PileQueue],
    max_queue_length: usize,
    now: NaiveDateTime,
    report: &mut ScheduleReport,
) -> Result<usize> {
    let mut unplaced = 0;
    for request in requests {
        match pick_pile(&request, queues, max_queue_length, now) {
            Some(index) => place(tx, &mut queues[index], request, report)?,
            None => {
                tracing::debug!(request = %request.id, mode = %request.mode, "No pile with free capacity");
                unplaced += 1;
            }
        }
    }
    Ok(unplaced)
}

/// Greedy pass over the ordinary holding area
pub(crate) fn schedule_holding_area(
    tx: &mut StoreTx<'_>,
    queues: &mut [PileQueue],
    max_queue_length: usize,
    now: NaiveDateTime,
    report: &mut ScheduleReport,
) -> Result<()> {
    let holding = tx.query_requests(&RequestQuery::status(RequestStatus::Waiting).unassigned())?;
    if holding.is_empty() {
        return Ok(());
    }
    let unplaced = assign_each(tx, holding, queues, max_queue_length, now, report)?;
    if unplaced > 0 {
        tracing::debug!(unplaced, "Requests left in holding area");
    }
    Ok(())
}
