//! Hourly electricity prices
//!
//! Prices feed the charging plan. They are optional: a failed fetch keeps
//! whatever was fetched before and never fails a control cycle.

pub mod client;
pub mod types;

pub use client::BoliusPriceClient;
pub use types::HourlyPrice;

use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Anything that can produce the remaining hourly prices of the day
#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    /// Prices from the current hour onwards, sorted by start
    async fn fetch(&self, now: DateTime<Utc>) -> Result<Vec<HourlyPrice>>;
}

/// Prices fetched at most once per refresh interval
pub struct PriceCache {
    source: Arc<dyn PriceSource>,
    refresh_interval: Duration,
    prices: Option<Vec<HourlyPrice>>,
    next_refresh: Option<Instant>,
    logger: StructuredLogger,
}

impl PriceCache {
    pub fn new(source: Arc<dyn PriceSource>, refresh_interval: Duration) -> Self {
        Self {
            source,
            refresh_interval,
            prices: None,
            next_refresh: None,
            logger: get_logger("prices"),
        }
    }

    /// Fetch new prices when due; returns the hours that have not passed yet
    pub async fn refresh_if_due(&mut self, now: DateTime<Utc>) -> Option<Vec<HourlyPrice>> {
        let due = self.next_refresh.is_none_or(|at| Instant::now() >= at);
        if due {
            match self.source.fetch(now).await {
                Ok(prices) => {
                    self.logger
                        .info(&format!("Fetched {} hourly prices", prices.len()));
                    self.prices = Some(prices);
                    self.next_refresh = Some(Instant::now() + self.refresh_interval);
                }
                Err(e) => {
                    // Retry on the next cycle rather than after a full interval
                    self.logger
                        .warn(&format!("Failed to fetch electricity prices: {}", e));
                }
            }
        }
        self.upcoming(now)
    }

    /// Cached hours that have not passed at `now`
    pub fn upcoming(&self, now: DateTime<Utc>) -> Option<Vec<HourlyPrice>> {
        self.prices.as_ref().map(|prices| {
            prices
                .iter()
                .filter(|p| p.is_upcoming(now))
                .cloned()
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LadningError;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flaky {
        calls: AtomicUsize,
        fail_from: usize,
    }

    #[async_trait::async_trait]
    impl PriceSource for Flaky {
        async fn fetch(&self, now: DateTime<Utc>) -> Result<Vec<HourlyPrice>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n >= self.fail_from {
                return Err(LadningError::transient("503"));
            }
            Ok(vec![HourlyPrice {
                start: now.fixed_offset(),
                price_kwh: 1.5,
                co2_emission: None,
            }])
        }
    }

    #[tokio::test]
    async fn fetches_once_per_interval() {
        let source = Arc::new(Flaky {
            calls: AtomicUsize::new(0),
            fail_from: usize::MAX,
        });
        let mut cache = PriceCache::new(source.clone(), Duration::from_secs(3600));
        let now = Utc::now();
        assert_eq!(cache.refresh_if_due(now).await.unwrap().len(), 1);
        assert_eq!(cache.refresh_if_due(now).await.unwrap().len(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_keeps_previous_prices() {
        let source = Arc::new(Flaky {
            calls: AtomicUsize::new(0),
            fail_from: 1,
        });
        let mut cache = PriceCache::new(source.clone(), Duration::ZERO);
        let now = Utc::now();
        assert!(cache.refresh_if_due(now).await.is_some());
        assert_eq!(cache.refresh_if_due(now).await.unwrap().len(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn passed_hours_are_dropped() {
        let source = Arc::new(Flaky {
            calls: AtomicUsize::new(0),
            fail_from: usize::MAX,
        });
        let mut cache = PriceCache::new(source, Duration::from_secs(3600));
        let fetched_at = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        cache.refresh_if_due(fetched_at).await;
        let later = Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap();
        assert!(cache.upcoming(later).unwrap().is_empty());
    }
}
