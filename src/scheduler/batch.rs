//! Batch strategies built on the subset optimizer.

use chrono::NaiveDateTime;

use super::optimizer::{BatchProblem, MAX_BATCH_SIZE, solve};
use super::{ScheduleReport, place};
use crate::capacity::PileQueue;
use crate::config::StationConfig;
use crate::domain::{ChargeMode, ChargeRequest, RequestStatus};
use crate::error::Result;
use crate::estimator::{charging_minutes, waiting_minutes};
use crate::store::{RequestQuery, StoreTx};

/// Build the optimizer input for `requests` over the piles at `candidates`
fn build_problem(
    requests: &[ChargeRequest],
    queues: &[PileQueue],
    candidates: &[usize],
    max_queue_length: usize,
    now: NaiveDateTime,
) -> BatchProblem {
    BatchProblem {
        pile_waits: candidates.iter().map(|&i| waiting_minutes(&queues[i], now)).collect(),
        capacities: candidates
            .iter()
            .map(|&i| queues[i].remaining_capacity(max_queue_length))
            .collect(),
        charging_minutes: requests
            .iter()
            .map(|request| {
                candidates
                    .iter()
                    .map(|&i| {
                        let pile = &queues[i].pile;
                        pile.serves(request.mode)
                            .then(|| charging_minutes(request.amount, pile.power))
                    })
                    .collect()
            })
            .collect(),
    }
}

/// Solve and write the plan back, each pile's share in service order.
/// Returns the number of requests placed.
fn solve_and_commit(
    tx: &mut StoreTx<'_>,
    requests: Vec<ChargeRequest>,
    queues: &mut [PileQueue],
    candidates: &[usize],
    max_queue_length: usize,
    now: NaiveDateTime,
    report: &mut ScheduleReport,
) -> Result<usize> {
    let problem = build_problem(&requests, queues, candidates, max_queue_length, now);
    let Some(plan) = solve(&problem) else {
        return Ok(0);
    };
    tracing::debug!(
        requests = requests.len(),
        placed = plan.placed(),
        total_minutes = plan.total_minutes,
        makespan = plan.makespan,
        "Solved batch"
    );

    let mut slots: Vec<Option<ChargeRequest>> = requests.into_iter().map(Some).collect();
    for (pile, &queue_index) in candidates.iter().enumerate() {
        for request_index in plan.pile_sequence(&problem, pile) {
            if let Some(request) = slots[request_index].take() {
                place(tx, &mut queues[queue_index], request, report)?;
            }
        }
    }
    Ok(plan.placed())
}

/// Single-batch pass: for each mode whose piles have at least `N` free slots,
/// place the `N` oldest holding-area requests of that mode together.
pub(crate) fn schedule_single_batches(
    tx: &mut StoreTx<'_>,
    queues: &mut [PileQueue],
    config: &StationConfig,
    now: NaiveDateTime,
    report: &mut ScheduleReport,
) -> Result<()> {
    for mode in ChargeMode::ALL {
        let threshold = config.batch_threshold(mode);
        let candidates: Vec<usize> = queues
            .iter()
            .enumerate()
            .filter(|(_, q)| q.pile.serves(mode) && !q.pile.is_unavailable())
            .map(|(i, _)| i)
            .collect();
        let free: usize = candidates
            .iter()
            .map(|&i| queues[i].remaining_capacity(config.pile_queue_length))
            .sum();
        if free < threshold {
            tracing::debug!(mode = %mode, free, threshold, "Not enough free capacity for a batch");
            continue;
        }

        let batch = tx.query_requests(
            &RequestQuery::status(RequestStatus::Waiting)
                .unassigned()
                .mode(mode)
                .limit(threshold),
        )?;
        if batch.len() < threshold {
            tracing::debug!(mode = %mode, waiting = batch.len(), threshold, "Batch not full yet");
            continue;
        }

        let placed = solve_and_commit(tx, batch, queues, &candidates, config.pile_queue_length, now, report)?;
        tracing::info!(mode = %mode, placed, "Single batch scheduled");
    }
    Ok(())
}

/// Full-batch pass: with every pile idle and enough requests waiting to fill
/// the station, place them all at once across both pile types.
pub(crate) fn schedule_full_batch(
    tx: &mut StoreTx<'_>,
    queues: &mut [PileQueue],
    config: &StationConfig,
    now: NaiveDateTime,
    report: &mut ScheduleReport,
) -> Result<()> {
    let busy = tx.count_requests(&RequestQuery::status(RequestStatus::Charging))?
        + tx.count_requests(&RequestQuery::status(RequestStatus::Waiting).assigned())?;
    if busy > 0 {
        tracing::debug!(busy, "Station not idle; full batch waits");
        return Ok(());
    }

    let candidates: Vec<usize> = queues
        .iter()
        .enumerate()
        .filter(|(_, q)| !q.pile.is_unavailable())
        .map(|(i, _)| i)
        .collect();
    let slots = candidates.len() * config.pile_queue_length;
    if slots == 0 {
        return Ok(());
    }
    if slots > MAX_BATCH_SIZE {
        tracing::warn!(slots, max = MAX_BATCH_SIZE, "Station capacity exceeds the largest solvable batch");
        return Ok(());
    }

    let holding = tx.count_requests(&RequestQuery::status(RequestStatus::Waiting).unassigned())?;
    if holding < slots {
        tracing::debug!(holding, slots, "Not enough waiting requests for a full batch");
        return Ok(());
    }

    let batch = tx.query_requests(&RequestQuery::status(RequestStatus::Waiting).unassigned().limit(slots))?;
    let placed = solve_and_commit(tx, batch, queues, &candidates, config.pile_queue_length, now, report)?;
    tracing::info!(placed, slots, "Full batch scheduled");
    Ok(())
}
