//! Users and piles.

use super::Station;
use crate::domain::{Pile, PileStatus, PileType, RequestStatus, User};
use crate::error::{Result, StationError};
use crate::monitor::RecoveryAction;
use crate::store::{self, RequestQuery};

impl Station {
    /// Register a vehicle owner
    pub fn register_user(&self, user_id: &str, name: &str, battery_capacity: f64) -> Result<User> {
        if user_id.trim().is_empty() {
            return Err(StationError::Validation("user id must not be empty".to_string()));
        }
        if !battery_capacity.is_finite() || battery_capacity <= 0.0 {
            return Err(StationError::Validation(format!(
                "battery capacity must be positive, got {}",
                battery_capacity
            )));
        }
        store::lock(&self.store)?.transaction(|tx| {
            if tx.get_user(user_id)?.is_some() {
                return Err(StationError::Validation(format!("user {} already registered", user_id)));
            }
            let user = User::new(user_id, name, battery_capacity);
            tx.save_user(&user)?;
            log::info!("Registered user {} ({:.1} kWh)", user_id, battery_capacity);
            Ok(user)
        })
    }

    /// Add a pile; power defaults to the configured power for its type
    pub fn add_pile(&self, pile_type: PileType, power: Option<f64>) -> Result<Pile> {
        let power = power.unwrap_or_else(|| self.config.power_for(pile_type));
        if !power.is_finite() || power <= 0.0 {
            return Err(StationError::Validation(format!("pile power must be positive, got {}", power)));
        }
        let pile = store::lock(&self.store)?.transaction(|tx| {
            let id = tx.next_pile_id(pile_type)?;
            let pile = Pile::new(id, pile_type, power);
            tx.save_pile(&pile)?;
            Ok(pile)
        })?;
        log::info!("Added pile {} ({} {} kW)", pile.id, pile_type, power);
        Ok(pile)
    }

    /// Switch a pile on or off and handle the consequences
    pub fn toggle_pile(&self, pile_id: &str) -> Result<(Pile, Vec<RecoveryAction>)> {
        let current = store::lock(&self.store)?.transaction(|tx| tx.require_pile(pile_id))?;
        self.set_pile_status(pile_id, current.status.toggled())
    }

    /// Force a pile to AVAILABLE or UNAVAILABLE.
    ///
    /// The change is handed straight to the monitor, so failure recovery or
    /// rebalancing happens before this returns.
    pub fn set_pile_status(&self, pile_id: &str, status: PileStatus) -> Result<(Pile, Vec<RecoveryAction>)> {
        if status == PileStatus::Charging {
            return Err(StationError::Validation(
                "CHARGING is set by starting a charge, not by hand".to_string(),
            ));
        }
        let pile = store::lock(&self.store)?.transaction(|tx| {
            let mut pile = tx.require_pile(pile_id)?;
            let charging = tx.count_requests(&RequestQuery::status(RequestStatus::Charging).at_pile(pile_id))? > 0;
            pile.status = match status {
                PileStatus::Available if charging => PileStatus::Charging,
                other => other,
            };
            tx.save_pile(&pile)?;
            Ok(pile)
        })?;
        log::info!("Pile {} set to {}", pile.id, pile.status);

        let actions = self.detect_pile_changes()?;
        Ok((pile, actions))
    }

    /// Remove an idle pile
    pub fn remove_pile(&self, pile_id: &str) -> Result<()> {
        store::lock(&self.store)?.transaction(|tx| {
            tx.require_pile(pile_id)?;
            let occupants = tx.count_requests(
                &RequestQuery::statuses(&[RequestStatus::Waiting, RequestStatus::Charging]).at_pile(pile_id),
            )?;
            if occupants > 0 {
                return Err(StationError::Precondition(format!(
                    "pile {} still has {} vehicle(s) queued",
                    pile_id, occupants
                )));
            }
            tx.delete_pile(pile_id)?;
            log::info!("Removed pile {}", pile_id);
            Ok(())
        })
    }
}
