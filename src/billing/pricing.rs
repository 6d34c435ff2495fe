//! Time-of-use electricity pricing.

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::config::TariffConfig;

/// Hours of the day at which the unit price can change
pub const PRICE_CHANGE_HOURS: [u32; 6] = [7, 10, 15, 18, 21, 23];

/// Pricing collaborator used by billing and fee estimates
pub trait Pricing: Send + Sync {
    /// Price per kWh in effect at `at`
    fn unit_price(&self, at: NaiveDateTime) -> f64;

    /// Service fee per kWh delivered
    fn service_fee_rate(&self) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PriceType {
    Peak,
    Normal,
    Valley,
}

impl PriceType {
    /// Tariff band for an hour of the day
    pub fn for_hour(hour: u32) -> PriceType {
        match hour {
            10..=14 | 18..=20 => PriceType::Peak,
            7..=9 | 15..=17 | 21..=22 => PriceType::Normal,
            _ => PriceType::Valley,
        }
    }
}

/// Peak/normal/valley pricing from the tariff config
#[derive(Debug, Clone)]
pub struct TimeOfUsePricing {
    tariff: TariffConfig,
}

impl TimeOfUsePricing {
    pub fn new(tariff: TariffConfig) -> Self {
        Self { tariff }
    }

    pub fn price_of(&self, price_type: PriceType) -> f64 {
        match price_type {
            PriceType::Peak => self.tariff.peak_price,
            PriceType::Normal => self.tariff.normal_price,
            PriceType::Valley => self.tariff.valley_price,
        }
    }
}

impl Pricing for TimeOfUsePricing {
    fn unit_price(&self, at: NaiveDateTime) -> f64 {
        self.price_of(PriceType::for_hour(at.hour()))
    }

    fn service_fee_rate(&self) -> f64 {
        self.tariff.service_fee_rate
    }
}

/// First price change strictly after `at`
pub fn next_price_change(at: NaiveDateTime) -> NaiveDateTime {
    let date = at.date();
    for hour in PRICE_CHANGE_HOURS {
        let boundary = date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or_default());
        if boundary > at {
            return boundary;
        }
    }
    let tomorrow = date + Duration::days(1);
    tomorrow.and_time(NaiveTime::from_hms_opt(PRICE_CHANGE_HOURS[0], 0, 0).unwrap_or_default())
}

/// Split `[start, stop)` at price changes
pub fn price_segments(start: NaiveDateTime, stop: NaiveDateTime) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let mut segments = Vec::new();
    let mut cursor = start;
    while cursor < stop {
        let end = next_price_change(cursor).min(stop);
        segments.push((cursor, end));
        cursor = end;
    }
    segments
}
