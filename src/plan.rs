//! Charging plan: when to charge, given the remaining hourly prices

use crate::error::{LadningError, Result};
use crate::prices::HourlyPrice;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingPlan {
    pub start_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
    pub battery_start: u8,
    pub battery_end: u8,
}

impl ChargingPlan {
    /// `now` falls inside `[start_time, end_time)`
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now && now < self.end_time
    }
}

/// Hours needed to charge from `battery_level` to `target`
pub fn hours_to_charge(battery_level: u8, target: u8, capacity_kwh: f64, power_kw: f64) -> f64 {
    let missing = f64::from(target.saturating_sub(battery_level));
    missing / 100.0 * capacity_kwh / power_kw
}

/// Plan a charge starting at the cheapest remaining hour.
///
/// Returns `None` when the battery is already at or above `target`.
pub fn create_charging_plan(
    battery_level: u8,
    prices: &[HourlyPrice],
    target: u8,
    capacity_kwh: f64,
    power_kw: f64,
) -> Result<Option<ChargingPlan>> {
    if battery_level >= target {
        return Ok(None);
    }
    let positive = |v: f64| v.is_finite() && v > 0.0;
    if !positive(power_kw) || !positive(capacity_kwh) {
        return Err(LadningError::validation(
            "policy.charging_power_kw".to_string(),
            "capacity and charging power must be positive".to_string(),
        ));
    }

    // First of equally cheap hours wins
    let cheapest = prices
        .iter()
        .reduce(|best, p| if p.price_kwh < best.price_kwh { p } else { best })
        .ok_or_else(|| {
            LadningError::generic("Empty list of hourly prices, cannot create charging plan")
        })?;

    let hours = hours_to_charge(battery_level, target, capacity_kwh, power_kw);
    let duration = Duration::milliseconds((hours * 3_600_000.0).round() as i64);
    Ok(Some(ChargingPlan {
        start_time: cheapest.start,
        end_time: cheapest.start + duration,
        battery_start: battery_level,
        battery_end: target,
    }))
}
