//! Core driver logic for Ladning
//!
//! The [`ControlLoop`] polls the vehicle and the charger on a fixed interval,
//! applies the decision policy and issues charger commands. Its only state
//! carried between cycles is the consecutive-failure counter, which triggers
//! a cool-down once it reaches the configured threshold.

mod cycle;
pub mod retry;
pub mod types;

pub use retry::{Retrier, RetryPolicy};
pub use types::{CycleOutcome, CycleReport, DriverSnapshot, DriverState};

use crate::auth::AuthSession;
use crate::charger::{ChargerClient, ChargerState};
use crate::config::Config;
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::plan::ChargingPlan;
use crate::prices::{HourlyPrice, PriceCache};
use crate::vehicle::{VehicleClient, VehicleState};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

/// Main control loop
pub struct ControlLoop {
    config: Config,
    retry: RetryPolicy,
    tesla: Arc<AuthSession>,
    easee: Arc<AuthSession>,
    vehicle: Arc<dyn VehicleClient>,
    charger: Arc<dyn ChargerClient>,
    prices: Option<PriceCache>,
    cancel: CancellationToken,
    logger: StructuredLogger,

    consecutive_failures: u32,
    total_cycles: u64,
    state: DriverState,
    last_report: Option<CycleReport>,
    last_vehicle: Option<VehicleState>,
    last_charger: Option<ChargerState>,
    last_plan: Option<ChargingPlan>,
    last_prices: Option<Vec<HourlyPrice>>,

    snapshot_tx: watch::Sender<Arc<DriverSnapshot>>,
}

impl ControlLoop {
    pub fn new(
        config: Config,
        tesla: Arc<AuthSession>,
        easee: Arc<AuthSession>,
        vehicle: Arc<dyn VehicleClient>,
        charger: Arc<dyn ChargerClient>,
        cancel: CancellationToken,
    ) -> Self {
        let retry = RetryPolicy::from(&config.control.retry);
        let (snapshot_tx, _) = watch::channel(Arc::new(DriverSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            driver_state: DriverState::Initializing,
            total_cycles: 0,
            consecutive_failures: 0,
            poll_interval_ms: config.control.poll_interval_ms,
            tesla_auth: tesla.state(),
            easee_auth: easee.state(),
            last_cycle: None,
            vehicle: None,
            charger: None,
            plan: None,
            prices: None,
        }));

        Self {
            config,
            retry,
            tesla,
            easee,
            vehicle,
            charger,
            prices: None,
            cancel,
            logger: get_logger("driver"),
            consecutive_failures: 0,
            total_cycles: 0,
            state: DriverState::Initializing,
            last_report: None,
            last_vehicle: None,
            last_charger: None,
            last_plan: None,
            last_prices: None,
            snapshot_tx,
        }
    }

    /// Use `prices` for smart charging
    pub fn with_prices(mut self, prices: PriceCache) -> Self {
        self.prices = Some(prices);
        self
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Arc<DriverSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Make sure both providers can produce a credential before looping.
    ///
    /// `ReauthRequired` is returned to the caller; a transient failure is
    /// only logged since the loop retries it every cycle.
    pub async fn preflight(&self) -> Result<()> {
        for session in [&self.tesla, &self.easee] {
            match session.get_valid_credential().await {
                Ok(_) => self
                    .logger
                    .info(&format!("{} credential ready", session.provider())),
                Err(e) if e.is_reauth_required() => return Err(e),
                Err(e) => self.logger.warn(&format!(
                    "{} credential not available yet: {}",
                    session.provider(),
                    e
                )),
            }
        }
        self.publish_snapshot();
        Ok(())
    }

    /// Run cycles until the cancellation token fires
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info(&format!(
            "Starting control loop, polling every {}ms",
            self.config.control.poll_interval_ms
        ));
        self.set_state(DriverState::Running);

        let mut ticker = interval(Duration::from_millis(
            self.config.control.poll_interval_ms.max(1),
        ));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.logger.info("Shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {}
            }

            // Shutdown must not wait on a cycle stuck in a consent prompt
            let cancel = self.cancel.clone();
            let report = tokio::select! {
                biased;
                report = self.run_cycle() => Some(report),
                _ = cancel.cancelled() => None,
            };
            let Some(report) = report else {
                self.logger.info("Shutdown signal received during cycle");
                break;
            };
            let cancelled = report.outcome == CycleOutcome::Cancelled;
            self.record(report);
            if cancelled {
                break;
            }

            if self.consecutive_failures >= self.config.control.failure_threshold {
                if !self.cool_down().await {
                    break;
                }
                ticker.reset();
            }
        }

        self.set_state(DriverState::ShuttingDown);
        Ok(())
    }

    /// Wait out the cool-down; false when shutdown interrupted it
    async fn cool_down(&mut self) -> bool {
        let cooldown = Duration::from_secs(self.config.control.cooldown_secs);
        self.logger.warn(&format!(
            "{} consecutive failed cycles, cooling down for {}s",
            self.consecutive_failures,
            cooldown.as_secs()
        ));
        self.set_state(DriverState::CoolingDown);
        let completed = tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(cooldown) => true,
        };
        if completed {
            self.set_state(DriverState::Running);
        }
        completed
    }

    fn set_state(&mut self, state: DriverState) {
        self.state = state;
        self.publish_snapshot();
    }

    /// Update counters from a finished cycle, log it and publish a snapshot
    pub(crate) fn record(&mut self, report: CycleReport) {
        self.total_cycles = self.total_cycles.saturating_add(1);
        match &report.outcome {
            CycleOutcome::Success => {
                self.consecutive_failures = 0;
                self.logger.info(&format!(
                    "Cycle succeeded in {}ms (decision: {:?}, backoff delays: {:?}ms)",
                    report.duration_ms, report.decision, report.backoff_delays_ms
                ));
            }
            CycleOutcome::Skipped { reason } => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.logger.warn(&format!(
                    "Cycle skipped after {}ms: {} (backoff delays: {:?}ms)",
                    report.duration_ms, reason, report.backoff_delays_ms
                ));
            }
            CycleOutcome::Failed { error } => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.logger.error(&format!(
                    "Cycle failed after {}ms: {} (backoff delays: {:?}ms)",
                    report.duration_ms, error, report.backoff_delays_ms
                ));
            }
            CycleOutcome::Cancelled => {
                self.logger.info("Cycle cancelled by shutdown");
            }
        }
        self.last_report = Some(report);
        self.publish_snapshot();
    }

    fn publish_snapshot(&self) {
        let snapshot = DriverSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            driver_state: self.state,
            total_cycles: self.total_cycles,
            consecutive_failures: self.consecutive_failures,
            poll_interval_ms: self.config.control.poll_interval_ms,
            tesla_auth: self.tesla.state(),
            easee_auth: self.easee.state(),
            last_cycle: self.last_report.clone(),
            vehicle: self.last_vehicle.clone(),
            charger: self.last_charger.clone(),
            plan: self.last_plan.clone(),
            prices: self.last_prices.clone(),
        };
        self.snapshot_tx.send_replace(Arc::new(snapshot));
    }
}
