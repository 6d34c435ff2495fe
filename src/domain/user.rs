//! Vehicle owner record

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    /// Battery capacity in kWh
    pub battery_capacity: f64,
    /// Charge currently in the battery, in kWh
    pub current_charge: f64,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>, battery_capacity: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            battery_capacity,
            current_charge: 0.0,
        }
    }

    /// Energy the battery can still take
    pub fn headroom(&self) -> f64 {
        (self.battery_capacity - self.current_charge).max(0.0)
    }

    /// Record energy delivered into the battery
    pub fn add_charge(&mut self, energy: f64) {
        self.current_charge += energy.max(0.0);
    }
}
