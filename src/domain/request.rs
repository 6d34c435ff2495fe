//! Charge request record and its lifecycle state machine.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::pile::PileType;
use crate::error::{Result, StationError};

/// Charging mode requested by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeMode {
    Fast,
    Slow,
}

impl ChargeMode {
    pub const ALL: [ChargeMode; 2] = [ChargeMode::Fast, ChargeMode::Slow];

    /// The pile type able to serve this mode
    pub fn pile_type(self) -> PileType {
        match self {
            ChargeMode::Fast => PileType::Fast,
            ChargeMode::Slow => PileType::Slow,
        }
    }

    /// Request ID prefix: `F` for fast, `T` for slow (trickle)
    pub fn id_prefix(self) -> char {
        match self {
            ChargeMode::Fast => 'F',
            ChargeMode::Slow => 'T',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChargeMode::Fast => "fast",
            ChargeMode::Slow => "slow",
        }
    }
}

impl fmt::Display for ChargeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChargeMode {
    type Err = StationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fast" | "f" => Ok(ChargeMode::Fast),
            "slow" | "t" => Ok(ChargeMode::Slow),
            other => Err(StationError::Validation(format!("unknown charging mode: {}", other))),
        }
    }
}

/// Request lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// In the holding area or queued at a pile
    Waiting,
    /// Re-queued after a pile failure; scheduled before any ordinary request
    PriorityWaiting,
    Charging,
    Completed,
    Canceled,
}

impl RequestStatus {
    /// Statuses that count against the one-active-request-per-user rule
    pub const ACTIVE: [RequestStatus; 3] = [
        RequestStatus::Waiting,
        RequestStatus::PriorityWaiting,
        RequestStatus::Charging,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Waiting => "WAITING",
            RequestStatus::PriorityWaiting => "PRIORITY_WAITING",
            RequestStatus::Charging => "CHARGING",
            RequestStatus::Completed => "COMPLETED",
            RequestStatus::Canceled => "CANCELED",
        }
    }

    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Canceled)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// `Waiting -> Waiting` is the scheduler moving a request from the holding
    /// area onto a pile queue.
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (Waiting, Waiting)
                | (Waiting, Charging)
                | (Waiting, PriorityWaiting)
                | (Waiting, Canceled)
                | (PriorityWaiting, Waiting)
                | (PriorityWaiting, Canceled)
                | (Charging, Completed)
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = StationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "WAITING" => Ok(RequestStatus::Waiting),
            "PRIORITY_WAITING" => Ok(RequestStatus::PriorityWaiting),
            "CHARGING" => Ok(RequestStatus::Charging),
            "COMPLETED" => Ok(RequestStatus::Completed),
            "CANCELED" => Ok(RequestStatus::Canceled),
            other => Err(StationError::Storage(format!("unknown request status: {}", other))),
        }
    }
}

/// A user's request for a given amount of energy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeRequest {
    /// Mode-prefixed sequence ID: "F3", "T12"
    pub id: String,

    pub user_id: String,

    pub mode: ChargeMode,

    /// Requested energy in kWh
    pub amount: f64,

    pub status: RequestStatus,

    pub created_at: NaiveDateTime,

    /// Pile this request is queued at or was served by
    pub pile_id: Option<String>,

    /// 1-based position in the pile queue; 1 is the vehicle being served
    pub queue_position: Option<u32>,

    pub start_time: Option<NaiveDateTime>,

    pub end_time: Option<NaiveDateTime>,

    /// Energy actually delivered, set on completion
    #[serde(default)]
    pub delivered_energy: Option<f64>,

    /// Request this one continues after a pile failure interrupted it
    #[serde(default)]
    pub salvaged_from: Option<String>,
}

impl ChargeRequest {
    /// Create a new request in the holding area
    pub fn new(id: String, user_id: &str, mode: ChargeMode, amount: f64, created_at: NaiveDateTime) -> Self {
        Self {
            id,
            user_id: user_id.to_string(),
            mode,
            amount,
            status: RequestStatus::Waiting,
            created_at,
            pile_id: None,
            queue_position: None,
            start_time: None,
            end_time: None,
            delivered_energy: None,
            salvaged_from: None,
        }
    }

    /// Create the follow-up request for the undelivered part of an interrupted charge
    pub fn salvage(id: String, interrupted: &ChargeRequest, remaining: f64, created_at: NaiveDateTime) -> Self {
        let mut request = Self::new(id, &interrupted.user_id, interrupted.mode, remaining, created_at);
        request.status = RequestStatus::PriorityWaiting;
        request.salvaged_from = Some(interrupted.id.clone());
        request
    }

    /// Move to `next`, enforcing the lifecycle.
    ///
    /// Besides the status pair, the pile assignment must fit: only a request
    /// in the holding area can be queued, only a queued request can be sent
    /// back for priority re-admission, and only the head of a pile queue can
    /// start charging.
    pub fn transition(&mut self, next: RequestStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(StationError::Precondition(format!(
                "request {} cannot go from {} to {}",
                self.id, self.status, next
            )));
        }
        let queued = self.pile_id.is_some();
        let blocked = match (self.status, next) {
            (RequestStatus::Waiting, RequestStatus::Waiting) => queued.then_some("is already queued"),
            (RequestStatus::Waiting, RequestStatus::PriorityWaiting) => (!queued).then_some("is not queued at a pile"),
            (RequestStatus::Waiting, RequestStatus::Charging) => {
                (!queued || self.queue_position != Some(1)).then_some("is not first in a pile queue")
            }
            _ => None,
        };
        if let Some(reason) = blocked {
            return Err(StationError::Precondition(format!(
                "request {} {}; cannot go from {} to {}",
                self.id, reason, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Place this request on a pile queue; it must be in the holding area
    pub fn assign(&mut self, pile_id: &str, position: u32) -> Result<()> {
        self.transition(RequestStatus::Waiting)?;
        self.pile_id = Some(pile_id.to_string());
        self.queue_position = Some(position);
        Ok(())
    }

    /// Take this request off its pile queue and mark it for priority re-admission
    pub fn requeue_with_priority(&mut self) -> Result<()> {
        self.transition(RequestStatus::PriorityWaiting)?;
        self.clear_assignment();
        Ok(())
    }

    pub fn clear_assignment(&mut self) {
        self.pile_id = None;
        self.queue_position = None;
    }

    /// Unassigned and still waiting for the scheduler
    pub fn is_in_holding_area(&self) -> bool {
        matches!(self.status, RequestStatus::Waiting | RequestStatus::PriorityWaiting) && self.pile_id.is_none()
    }

    /// Waiting in a pile's queue
    pub fn is_pile_queued(&self) -> bool {
        self.status == RequestStatus::Waiting && self.pile_id.is_some()
    }
}
