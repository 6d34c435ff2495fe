//! Capacity model: how many more vehicles a pile's queue can take.
//!
//! A pile's queue holds at most `max_queue_length` vehicles, counting the one
//! currently charging in position 1.

use crate::domain::{ChargeRequest, Pile};

/// Remaining queue slots for a pile
pub fn remaining_capacity(max_queue_length: usize, queued: usize, charging: bool) -> usize {
    max_queue_length.saturating_sub(queued + usize::from(charging))
}

/// Consistent snapshot of one pile and the requests occupying it.
///
/// Loaded inside a store transaction so the charging slot and the queued
/// requests are read together.
#[derive(Debug, Clone)]
pub struct PileQueue {
    pub pile: Pile,
    /// Request currently charging at position 1, if any
    pub charging: Option<ChargeRequest>,
    /// Requests waiting at this pile, ordered by queue position
    pub waiting: Vec<ChargeRequest>,
}

impl PileQueue {
    pub fn new(pile: Pile) -> Self {
        Self {
            pile,
            charging: None,
            waiting: Vec::new(),
        }
    }

    pub fn is_charging(&self) -> bool {
        self.charging.is_some()
    }

    /// Vehicles occupying the queue, including the one charging
    pub fn occupancy(&self) -> usize {
        self.waiting.len() + usize::from(self.is_charging())
    }

    /// Remaining slots; an unavailable pile has none
    pub fn remaining_capacity(&self, max_queue_length: usize) -> usize {
        if self.pile.is_unavailable() {
            return 0;
        }
        remaining_capacity(max_queue_length, self.waiting.len(), self.is_charging())
    }

    /// Position the next appended request will take
    pub fn next_position(&self) -> u32 {
        (self.occupancy() + 1) as u32
    }

    /// Append a request that has already been assigned to this pile
    pub fn push(&mut self, request: ChargeRequest) {
        self.waiting.push(request);
    }
}
