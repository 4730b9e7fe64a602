//! Charging decision policy for Ladning
//!
//! A decision is recomputed from scratch every cycle out of the current
//! vehicle and charger snapshots, the policy configuration and the charge
//! window derived from electricity prices.

use crate::charger::{ChargerCommand, ChargerState, ChargerStatus};
use crate::config::PolicyConfig;
use crate::plan::ChargingPlan;
use crate::vehicle::{ChargingState, VehicleState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// When charging is allowed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChargeWindow {
    /// No price-based restriction
    Anytime,
    /// Only inside the planned cheapest window
    Planned(ChargingPlan),
}

impl ChargeWindow {
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        match self {
            ChargeWindow::Anytime => true,
            ChargeWindow::Planned(plan) => plan.is_active(now),
        }
    }

    pub fn plan(&self) -> Option<&ChargingPlan> {
        match self {
            ChargeWindow::Anytime => None,
            ChargeWindow::Planned(plan) => Some(plan),
        }
    }
}

/// Outcome of the decision policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    NoAction { reason: String },
    Start,
    Stop { reason: String },
    AdjustCurrent { amps: f64 },
}

impl Decision {
    fn idle(reason: &str) -> Self {
        Decision::NoAction {
            reason: reason.to_string(),
        }
    }

    /// Charger command implied by the decision
    pub fn command(&self) -> Option<ChargerCommand> {
        match self {
            Decision::NoAction { .. } => None,
            Decision::Start => Some(ChargerCommand::StartCharging),
            Decision::Stop { .. } => Some(ChargerCommand::StopCharging),
            Decision::AdjustCurrent { amps } => Some(ChargerCommand::SetCurrent(*amps)),
        }
    }
}

/// Compute the decision for this cycle
pub fn decide(
    vehicle: &VehicleState,
    charger: &ChargerState,
    policy: &PolicyConfig,
    window: &ChargeWindow,
    now: DateTime<Utc>,
) -> Decision {
    if !charger.online {
        return Decision::idle("charger offline");
    }
    match charger.status {
        ChargerStatus::Disconnected => return Decision::idle("no vehicle connected"),
        ChargerStatus::Error => return Decision::idle("charger reports an error"),
        ChargerStatus::Idle | ChargerStatus::Charging => {}
    }
    if !vehicle.is_awake {
        return Decision::idle("vehicle asleep");
    }
    let Some(level) = vehicle.battery_level else {
        return Decision::idle("battery level unknown");
    };

    let below_target = level < policy.target_battery_level;
    let window_open = window.is_open(now);

    if charger.status == ChargerStatus::Charging {
        if !below_target {
            return Decision::Stop {
                reason: format!("battery at {}% reached target", level),
            };
        }
        if !window_open {
            return Decision::Stop {
                reason: "outside planned charging window".to_string(),
            };
        }
        if (charger.current_limit - policy.charging_current_a).abs() > policy.current_tolerance_a
        {
            return Decision::AdjustCurrent {
                amps: policy.charging_current_a,
            };
        }
        return Decision::idle("charging");
    }

    if !below_target {
        return Decision::idle("target battery level reached");
    }
    if vehicle.charging_state == ChargingState::Complete {
        return Decision::idle("vehicle reports charge complete");
    }
    if !window_open {
        return Decision::idle("waiting for planned charging window");
    }
    Decision::Start
}
