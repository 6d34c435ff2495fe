//! Time estimator: charging duration, delivered energy and pile waiting time.
//!
//! Sums are kept in exact minutes; `ceil` is applied only to reported values.

use chrono::NaiveDateTime;

use crate::capacity::PileQueue;
use crate::domain::ChargeRequest;

/// Exact minutes needed to deliver `energy` kWh at `power` kW
pub fn charging_minutes(energy: f64, power: f64) -> f64 {
    if energy <= 0.0 || power <= 0.0 {
        return 0.0;
    }
    energy * 60.0 / power
}

/// Reported charging time in whole minutes (rounded up)
pub fn charging_time_minutes(energy: f64, power: f64) -> u64 {
    charging_minutes(energy, power).ceil() as u64
}

/// Whole minutes between two instants, never negative
pub fn elapsed_minutes(since: NaiveDateTime, now: NaiveDateTime) -> i64 {
    (now - since).num_minutes().max(0)
}

/// Energy a pile delivers in `minutes`, uncapped
pub fn energy_for_minutes(power: f64, minutes: i64) -> f64 {
    power * minutes as f64 / 60.0
}

/// Energy delivered so far by an in-progress or finished charge, capped at the request
pub fn delivered_energy(request: &ChargeRequest, power: f64, now: NaiveDateTime) -> f64 {
    match request.start_time {
        Some(start) => {
            let end = request.end_time.unwrap_or(now);
            energy_for_minutes(power, elapsed_minutes(start, end)).min(request.amount)
        }
        None => 0.0,
    }
}

/// Exact minutes left on a request; the full charging time if it has not started
pub fn remaining_minutes(request: &ChargeRequest, power: f64, now: NaiveDateTime) -> f64 {
    let remaining_energy = match request.start_time {
        Some(start) => request.amount - energy_for_minutes(power, elapsed_minutes(start, now)),
        None => request.amount,
    };
    if remaining_energy <= 0.0 {
        return 0.0;
    }
    charging_minutes(remaining_energy, power)
}

/// Exact minutes until a newly appended request could start at this pile
pub fn waiting_minutes(queue: &PileQueue, now: NaiveDateTime) -> f64 {
    let power = queue.pile.power;
    let in_progress = queue
        .charging
        .as_ref()
        .map(|r| remaining_minutes(r, power, now))
        .unwrap_or(0.0);
    in_progress + queue.waiting.iter().map(|r| charging_minutes(r.amount, power)).sum::<f64>()
}

/// Reported waiting time in whole minutes
pub fn waiting_time_minutes(queue: &PileQueue, now: NaiveDateTime) -> u64 {
    waiting_minutes(queue, now).ceil() as u64
}
