//! ID generation utilities for chargeq
//!
//! Identifiers are sequence based so they sort and read naturally at the station:
//! requests are `F1`, `F2`, `T1`..., piles are `F001`, `T001`..., bills are
//! `BILL202401150001`. The sequence counters themselves live in the store.

use chrono::{NaiveDate, NaiveDateTime};

use crate::domain::{ChargeMode, PileType};

/// Format a request ID from its mode and per-mode sequence number
///
/// Example: `request_id(ChargeMode::Fast, 3)` -> `F3`
pub fn request_id(mode: ChargeMode, seq: u64) -> String {
    format!("{}{}", mode.id_prefix(), seq)
}

/// Format a pile ID from its type and per-type sequence number
///
/// Example: `pile_id(PileType::Slow, 2)` -> `T002`
pub fn pile_id(pile_type: PileType, seq: u64) -> String {
    format!("{}{:03}", pile_type.id_prefix(), seq)
}

/// Format a bill number from the issue date and the daily sequence
pub fn bill_number(date: NaiveDate, seq: u64) -> String {
    format!("BILL{}{:04}", date.format("%Y%m%d"), seq)
}

/// Extract the numeric sequence from a prefixed ID (`F12` -> 12, `T003` -> 3)
pub fn sequence_of(id: &str) -> Option<u64> {
    let digits = id.trim_start_matches(|c: char| !c.is_ascii_digit());
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Milliseconds since the Unix epoch for a station-local timestamp.
///
/// Used for the indexed ordering columns in the store.
pub fn timestamp_ms(at: NaiveDateTime) -> i64 {
    at.and_utc().timestamp_millis()
}
