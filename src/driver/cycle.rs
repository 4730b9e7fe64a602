use super::retry::Retrier;
use super::types::{CycleOutcome, CycleReport};
use crate::charger::CommandAck;
use crate::controls::{ChargeWindow, Decision, decide};
use crate::error::{LadningError, Result};
use crate::plan::create_charging_plan;
use crate::prices::HourlyPrice;
use crate::vehicle::VehicleState;
use chrono::Utc;
use tokio::time::{Duration, Instant};

/// What a cycle got done before it ended
#[derive(Debug, Default)]
struct CycleProgress {
    woke_vehicle: bool,
    decision: Option<Decision>,
    command: Option<CommandAck>,
    skip_reason: Option<String>,
}

fn classify(error: LadningError) -> CycleOutcome {
    match error {
        LadningError::Cancelled { .. } => CycleOutcome::Cancelled,
        e if e.is_reauth_required() => CycleOutcome::Skipped {
            reason: e.to_string(),
        },
        e if e.is_transient() => CycleOutcome::Skipped {
            reason: format!("retries exhausted: {}", e),
        },
        e => CycleOutcome::Failed {
            error: e.to_string(),
        },
    }
}

impl super::ControlLoop {
    /// Run one poll-decide-act cycle and report how it went
    pub(crate) async fn run_cycle(&mut self) -> CycleReport {
        let started_at = Utc::now();
        let started = Instant::now();
        self.logger.debug("Starting cycle");

        let policy = self.retry.clone();
        let cancel = self.cancel.clone();
        let logger = self.logger.clone();
        let mut retrier = Retrier::new(&policy, &cancel, &logger);
        let mut progress = CycleProgress::default();

        let outcome = match self.cycle_steps(&mut retrier, &mut progress).await {
            Ok(()) => match progress.skip_reason.take() {
                Some(reason) => CycleOutcome::Skipped { reason },
                None => CycleOutcome::Success,
            },
            Err(e) => classify(e),
        };

        CycleReport {
            started_at: started_at.to_rfc3339(),
            duration_ms: started.elapsed().as_millis() as u64,
            outcome,
            woke_vehicle: progress.woke_vehicle,
            decision: progress.decision,
            command: progress.command,
            backoff_delays_ms: retrier
                .into_delays()
                .iter()
                .map(|d| d.as_millis() as u64)
                .collect(),
        }
    }

    async fn cycle_steps(
        &mut self,
        retrier: &mut Retrier<'_>,
        progress: &mut CycleProgress,
    ) -> Result<()> {
        retrier
            .call(&self.tesla, "Tesla credential", |c| async move { Ok(c) })
            .await?;
        retrier
            .call(&self.easee, "Easee credential", |c| async move { Ok(c) })
            .await?;

        let charger_client = self.charger.as_ref();
        let vehicle_client = self.vehicle.as_ref();

        let charger = retrier
            .call(&self.easee, "fetch charger state", |c| async move {
                charger_client.fetch_state(&c).await
            })
            .await?;
        self.last_charger = Some(charger.clone());

        let mut vehicle = retrier
            .call(&self.tesla, "fetch vehicle state", |c| async move {
                vehicle_client.fetch_state(&c).await
            })
            .await?;

        if !vehicle.is_awake && charger.vehicle_connected() {
            progress.woke_vehicle = true;
            match self.wake_vehicle(retrier).await? {
                Some(awake) => vehicle = awake,
                None => {
                    self.last_vehicle = Some(vehicle);
                    progress.skip_reason = Some(format!(
                        "vehicle did not wake within {}s",
                        self.config.control.wake_timeout_secs
                    ));
                    return Ok(());
                }
            }
        }
        self.last_vehicle = Some(vehicle.clone());

        let now = Utc::now();
        let prices = match self.prices.as_mut() {
            Some(cache) => cache.refresh_if_due(now).await,
            None => None,
        };
        let window = self.charge_window(&vehicle, prices.as_deref());
        self.last_prices = prices;
        self.last_plan = window.plan().cloned();

        let decision = decide(&vehicle, &charger, &self.config.policy, &window, now);
        progress.decision = Some(decision.clone());

        let Some(command) = decision.command() else {
            self.logger.debug(&format!("No charger command: {:?}", decision));
            return Ok(());
        };
        self.logger
            .info(&format!("Decision {:?}, sending {}", decision, command));
        let ack = retrier
            .call(&self.easee, "charger command", |c| async move {
                charger_client.send_command(&c, command).await
            })
            .await?;
        progress.command = Some(ack.clone());
        if !ack.accepted {
            return Err(LadningError::permanent(format!(
                "Charger did not acknowledge {}",
                command
            )));
        }
        Ok(())
    }

    /// Wake the vehicle and poll until it reports awake.
    ///
    /// `None` when it is still asleep after the wake timeout.
    async fn wake_vehicle(&self, retrier: &mut Retrier<'_>) -> Result<Option<VehicleState>> {
        let vehicle_client = self.vehicle.as_ref();
        retrier
            .call(&self.tesla, "wake vehicle", |c| async move {
                vehicle_client.wake_up(&c).await
            })
            .await?;

        let poll = Duration::from_millis(self.config.control.wake_poll_interval_ms.max(1));
        let deadline = Instant::now() + Duration::from_secs(self.config.control.wake_timeout_secs);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.logger.warn("Vehicle did not wake up in time");
                return Ok(None);
            }
            retrier.pause(poll.min(remaining)).await?;

            let state = retrier
                .call(&self.tesla, "poll vehicle wake state", |c| async move {
                    vehicle_client.fetch_state(&c).await
                })
                .await?;
            if state.is_awake {
                self.logger.info("Vehicle is awake");
                return Ok(Some(state));
            }
        }
    }

    /// Price-based window in which charging may run
    fn charge_window(
        &self,
        vehicle: &VehicleState,
        prices: Option<&[HourlyPrice]>,
    ) -> ChargeWindow {
        let policy = &self.config.policy;
        if !policy.smart_charging {
            return ChargeWindow::Anytime;
        }
        let now = Utc::now();
        // Keep a running plan until it ends so passing hours do not move it
        if let Some(plan) = &self.last_plan
            && plan.is_active(now)
        {
            return ChargeWindow::Planned(plan.clone());
        }
        let (Some(prices), Some(level)) = (prices.filter(|p| !p.is_empty()), vehicle.battery_level)
        else {
            return ChargeWindow::Anytime;
        };
        match create_charging_plan(
            level,
            prices,
            policy.target_battery_level,
            policy.battery_capacity_kwh,
            policy.charging_power_kw,
        ) {
            Ok(Some(plan)) => ChargeWindow::Planned(plan),
            Ok(None) => ChargeWindow::Anytime,
            Err(e) => {
                self.logger
                    .warn(&format!("Cannot plan charging, charging now: {}", e));
                ChargeWindow::Anytime
            }
        }
    }
}
