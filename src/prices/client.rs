use super::PriceSource;
use super::types::HourlyPrice;
use crate::config::PricesConfig;
use crate::error::{LadningError, Result};
use crate::http::read_json;
use chrono::{DateTime, Days, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PowerResponse {
    data: Vec<PowerRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PriceValue {
    Text(String),
    Number(f64),
}

#[derive(Debug, Deserialize)]
struct Co2 {
    average: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PowerRecord {
    date: String,
    hour: u32,
    price: PriceValue,
    #[serde(default)]
    co2: Option<Co2>,
}

/// Hourly prices from the Bolius live data API
pub struct BoliusPriceClient {
    http: reqwest::Client,
    base_url: String,
    region: String,
    tz: Tz,
}

impl BoliusPriceClient {
    pub fn new(http: reqwest::Client, config: &PricesConfig) -> Result<Self> {
        let tz: Tz = config.timezone.parse().map_err(|_| {
            LadningError::config(format!("Unknown timezone {}", config.timezone))
        })?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            region: config.region.clone(),
            tz,
        })
    }

    /// Local start of the current hour and the next local midnight
    pub fn window(&self, now: DateTime<Utc>) -> (String, String) {
        let local = now.with_timezone(&self.tz).naive_local();
        let start = local
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(local);
        let next_day = local
            .date()
            .checked_add_days(Days::new(1))
            .unwrap_or(local.date());
        let end = next_day.and_time(NaiveTime::MIN);
        (
            start.format("%Y-%m-%dT%H:00").to_string(),
            end.format("%Y-%m-%dT%H:00").to_string(),
        )
    }

    fn convert(&self, record: PowerRecord) -> Result<Option<HourlyPrice>> {
        let date = NaiveDate::parse_from_str(&record.date, "%Y-%m-%d")?;
        let naive = date.and_time(NaiveTime::MIN) + Duration::hours(i64::from(record.hour));
        // Hours skipped by a DST change do not exist locally
        let Some(start) = self.tz.from_local_datetime(&naive).earliest() else {
            return Ok(None);
        };
        let price_kwh = match record.price {
            PriceValue::Number(n) => n,
            PriceValue::Text(s) => s.trim().parse::<f64>().map_err(|e| {
                LadningError::permanent(format!("Invalid price {:?}: {}", s, e))
            })?,
        };
        Ok(Some(HourlyPrice {
            start: start.fixed_offset(),
            price_kwh,
            co2_emission: record.co2.and_then(|c| c.average),
        }))
    }
}

#[async_trait::async_trait]
impl PriceSource for BoliusPriceClient {
    async fn fetch(&self, now: DateTime<Utc>) -> Result<Vec<HourlyPrice>> {
        let (start, end) = self.window(now);
        let resp = self
            .http
            .get(&self.base_url)
            .query(&[
                ("region", self.region.as_str()),
                ("co2", "1"),
                ("start", start.as_str()),
                ("end", end.as_str()),
            ])
            .send()
            .await?;
        let body: PowerResponse = read_json(resp, "Electricity prices").await?;

        let mut prices = Vec::with_capacity(body.data.len());
        for record in body.data {
            if let Some(price) = self.convert(record)? {
                prices.push(price);
            }
        }
        prices.sort_by_key(|p| p.start);
        Ok(prices)
    }
}
