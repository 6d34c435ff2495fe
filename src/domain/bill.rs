//! Charging bill record

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::request::ChargeMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    /// "BILL" + yyyyMMdd + daily sequence; assigned by the store
    pub number: String,
    pub issued_at: NaiveDateTime,
    pub request_id: String,
    pub user_id: String,
    pub pile_id: String,
    pub mode: ChargeMode,
    /// kWh
    pub charged_amount: f64,
    pub duration_minutes: i64,
    pub start_time: NaiveDateTime,
    pub stop_time: NaiveDateTime,
    pub charging_fee: f64,
    pub service_fee: f64,
    pub total_fee: f64,
}
