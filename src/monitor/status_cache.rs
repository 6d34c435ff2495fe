//! Last observed status of every pile.

use std::collections::HashMap;

use crate::domain::{Pile, PileStatus};

#[derive(Debug, Clone, Default)]
pub struct StatusCache {
    statuses: HashMap<String, PileStatus>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the given piles, replacing whatever was cached
    pub fn reset(&mut self, piles: &[Pile]) {
        self.statuses = piles.iter().map(|p| (p.id.clone(), p.status)).collect();
    }

    pub fn get(&self, pile_id: &str) -> Option<PileStatus> {
        self.statuses.get(pile_id).copied()
    }

    pub fn record(&mut self, pile_id: &str, status: PileStatus) {
        self.statuses.insert(pile_id.to_string(), status);
    }

    /// Drop piles not in `live`; returns the ids removed
    pub fn forget_missing(&mut self, live: &[Pile]) -> Vec<String> {
        let mut gone: Vec<String> = self
            .statuses
            .keys()
            .filter(|id| !live.iter().any(|p| &p.id == *id))
            .cloned()
            .collect();
        gone.sort();
        for id in &gone {
            self.statuses.remove(id);
        }
        gone
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}
