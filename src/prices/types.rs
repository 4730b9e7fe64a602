use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Price of one hour of electricity, taxes and tariffs included
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPrice {
    /// Start of the hour in the price region's local time
    pub start: DateTime<FixedOffset>,
    pub price_kwh: f64,
    /// Average CO2 intensity (g/kWh) when the source publishes it
    pub co2_emission: Option<f64>,
}

impl HourlyPrice {
    pub fn end(&self) -> DateTime<FixedOffset> {
        self.start + Duration::hours(1)
    }

    /// The hour has not fully passed at `now`
    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.end() > now
    }
}
