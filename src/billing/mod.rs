//! Billing for completed charges.
//!
//! The charging fee is split at tariff changes: each segment pays its unit
//! price on its share of the delivered energy. The service fee is a flat rate
//! per kWh. Every amount is rounded to cents.

mod pricing;

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

pub use pricing::{PRICE_CHANGE_HOURS, PriceType, Pricing, TimeOfUsePricing, next_price_change, price_segments};

use crate::domain::{Bill, ChargeRequest, Pile};
use crate::error::{Result, StationError};
use crate::estimator::{elapsed_minutes, energy_for_minutes};

/// Billing collaborator invoked when a charge completes
pub trait Billing: Send + Sync {
    /// Build the bill for a completed request.
    ///
    /// The returned bill has an empty `number`; the store assigns it when the
    /// bill is saved.
    fn generate_bill(&self, request: &ChargeRequest, pile: &Pile) -> Result<Bill>;
}

/// Charging fee, service fee and their sum
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Fees {
    pub charging: f64,
    pub service: f64,
    pub total: f64,
}

pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Fees for `energy` kWh delivered evenly over `[start, stop)`
pub fn compute_fees(pricing: &dyn Pricing, start: NaiveDateTime, stop: NaiveDateTime, energy: f64) -> Fees {
    let total_seconds = (stop - start).num_seconds();
    let charging = if total_seconds <= 0 {
        round_cents(pricing.unit_price(start) * energy)
    } else {
        price_segments(start, stop)
            .into_iter()
            .map(|(from, to)| {
                let share = (to - from).num_seconds() as f64 / total_seconds as f64;
                round_cents(pricing.unit_price(from) * energy * share)
            })
            .sum()
    };
    let charging = round_cents(charging);
    let service = round_cents(pricing.service_fee_rate() * energy);
    Fees {
        charging,
        service,
        total: round_cents(charging + service),
    }
}

/// Default billing: time-of-use charging fee plus service fee
pub struct TimeOfUseBilling {
    pricing: Arc<dyn Pricing>,
}

impl TimeOfUseBilling {
    pub fn new(pricing: Arc<dyn Pricing>) -> Self {
        Self { pricing }
    }
}

impl Billing for TimeOfUseBilling {
    fn generate_bill(&self, request: &ChargeRequest, pile: &Pile) -> Result<Bill> {
        let (Some(start), Some(end)) = (request.start_time, request.end_time) else {
            return Err(StationError::Billing(format!("request {} has no charging interval", request.id)));
        };

        let duration = elapsed_minutes(start, end).max(1);
        let charged = request
            .delivered_energy
            .unwrap_or_else(|| energy_for_minutes(pile.power, duration).min(request.amount));
        let stop = start + Duration::minutes(duration);
        let fees = compute_fees(self.pricing.as_ref(), start, stop, charged);

        Ok(Bill {
            number: String::new(),
            issued_at: end,
            request_id: request.id.clone(),
            user_id: request.user_id.clone(),
            pile_id: pile.id.clone(),
            mode: request.mode,
            charged_amount: charged,
            duration_minutes: duration,
            start_time: start,
            stop_time: end,
            charging_fee: fees.charging,
            service_fee: fees.service,
            total_fee: fees.total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TariffConfig;
    use crate::domain::{ChargeMode, PileType, RequestStatus};
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn billing() -> TimeOfUseBilling {
        TimeOfUseBilling::new(Arc::new(TimeOfUsePricing::new(TariffConfig::default())))
    }

    fn completed(amount: f64, start: NaiveDateTime, end: NaiveDateTime) -> ChargeRequest {
        let mut request = ChargeRequest::new("F1".to_string(), "u1", ChargeMode::Fast, amount, start);
        request.status = RequestStatus::Completed;
        request.pile_id = Some("F001".to_string());
        request.start_time = Some(start);
        request.end_time = Some(end);
        request
    }

    #[test]
    fn test_round_cents() {
        assert_eq!(round_cents(1.234), 1.23);
        assert_eq!(round_cents(1.235_1), 1.24);
        assert_eq!(round_cents(0.0), 0.0);
    }

    #[test]
    fn test_bill_within_one_band() {
        let pile = Pile::new("F001", PileType::Fast, 30.0);
        let bill = billing().generate_bill(&completed(20.0, at(11, 0), at(11, 20)), &pile).unwrap();
        assert_eq!(bill.duration_minutes, 20);
        assert_eq!(bill.charged_amount, 10.0);
        assert_eq!(bill.charging_fee, 10.0);
        assert_eq!(bill.service_fee, 8.0);
        assert_eq!(bill.total_fee, 18.0);
        assert!(bill.number.is_empty());
    }

    #[test]
    fn test_bill_split_across_bands() {
        // 9:30-10:30 at 7 kW: 3.5 kWh, half normal and half peak
        let pile = Pile::new("T001", PileType::Slow, 7.0);
        let bill = billing().generate_bill(&completed(50.0, at(9, 30), at(10, 30)), &pile).unwrap();
        assert_eq!(bill.charged_amount, 7.0);
        assert_eq!(bill.charging_fee, round_cents(3.5 * 0.7 + 3.5 * 1.0));
        assert_eq!(bill.service_fee, 5.6);
    }

    #[test]
    fn test_bill_uses_recorded_delivery() {
        let pile = Pile::new("T001", PileType::Slow, 7.0);
        let mut request = completed(3.5, at(1, 0), at(1, 40));
        request.delivered_energy = Some(3.5);
        let bill = billing().generate_bill(&request, &pile).unwrap();
        assert_eq!(bill.charged_amount, 3.5);
        assert_eq!(bill.charging_fee, 1.4);
    }

    #[test]
    fn test_bill_minimum_one_minute() {
        let pile = Pile::new("F001", PileType::Fast, 30.0);
        let bill = billing().generate_bill(&completed(10.0, at(12, 0), at(12, 0)), &pile).unwrap();
        assert_eq!(bill.duration_minutes, 1);
        assert_eq!(bill.charged_amount, 0.5);
    }

    #[test]
    fn test_bill_requires_interval() {
        let pile = Pile::new("F001", PileType::Fast, 30.0);
        let mut request = completed(10.0, at(12, 0), at(12, 5));
        request.end_time = None;
        let err = billing().generate_bill(&request, &pile).unwrap_err();
        assert!(matches!(err, StationError::Billing(_)));
    }
}
