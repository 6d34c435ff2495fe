//! Charging pile record

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::request::ChargeMode;
use crate::error::{Result, StationError};

/// Pile type; determines which charging mode it serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PileType {
    Fast,
    Slow,
}

impl PileType {
    pub fn serves(self, mode: ChargeMode) -> bool {
        mode.pile_type() == self
    }

    pub fn id_prefix(self) -> char {
        match self {
            PileType::Fast => 'F',
            PileType::Slow => 'T',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PileType::Fast => "FAST",
            PileType::Slow => "SLOW",
        }
    }
}

impl fmt::Display for PileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PileType {
    type Err = StationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "FAST" | "F" => Ok(PileType::Fast),
            "SLOW" | "T" => Ok(PileType::Slow),
            other => Err(StationError::Validation(format!("unknown pile type: {}", other))),
        }
    }
}

/// Operational status of a pile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PileStatus {
    Available,
    Charging,
    Unavailable,
}

impl PileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PileStatus::Available => "AVAILABLE",
            PileStatus::Charging => "CHARGING",
            PileStatus::Unavailable => "UNAVAILABLE",
        }
    }

    /// Status after an administrative on/off toggle
    pub fn toggled(self) -> PileStatus {
        match self {
            PileStatus::Available | PileStatus::Charging => PileStatus::Unavailable,
            PileStatus::Unavailable => PileStatus::Available,
        }
    }
}

impl fmt::Display for PileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PileStatus {
    type Err = StationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "AVAILABLE" => Ok(PileStatus::Available),
            "CHARGING" => Ok(PileStatus::Charging),
            "UNAVAILABLE" => Ok(PileStatus::Unavailable),
            other => Err(StationError::Validation(format!("unknown pile status: {}", other))),
        }
    }
}

/// A charging pile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pile {
    /// "F001", "T002"
    pub id: String,
    pub pile_type: PileType,
    /// Rated power in kW
    pub power: f64,
    pub status: PileStatus,
}

impl Pile {
    pub fn new(id: impl Into<String>, pile_type: PileType, power: f64) -> Self {
        Self {
            id: id.into(),
            pile_type,
            power,
            status: PileStatus::Available,
        }
    }

    pub fn serves(&self, mode: ChargeMode) -> bool {
        self.pile_type.serves(mode)
    }

    pub fn is_unavailable(&self) -> bool {
        self.status == PileStatus::Unavailable
    }
}
