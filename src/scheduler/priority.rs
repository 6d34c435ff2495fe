//! Priority re-admission of requests displaced by a pile failure or rebalance.
//!
//! Priority requests are placed greedily, oldest first, before any ordinary
//! request is considered.

use chrono::NaiveDateTime;

use super::{ScheduleReport, greedy};
use crate::capacity::PileQueue;
use crate::domain::RequestStatus;
use crate::error::Result;
use crate::store::{RequestQuery, StoreTx};

/// Drain the priority queue. Returns how many priority requests are still waiting.
pub(crate) fn drain(
    tx: &mut StoreTx<'_>,
    queues: &mut [PileQueue],
    max_queue_length: usize,
    now: NaiveDateTime,
    report: &mut ScheduleReport,
) -> Result<usize> {
    let pending = tx.query_requests(&RequestQuery::status(RequestStatus::PriorityWaiting).unassigned())?;
    if pending.is_empty() {
        return Ok(0);
    }

    let total = pending.len();
    let unplaced = greedy::assign_each(tx, pending, queues, max_queue_length, now, report)?;
    tracing::info!(readmitted = total - unplaced, remaining = unplaced, "Drained priority queue");
    Ok(unplaced)
}
