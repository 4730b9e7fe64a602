use crate::auth::AuthState;
use crate::charger::{ChargerState, CommandAck};
use crate::controls::Decision;
use crate::plan::ChargingPlan;
use crate::prices::HourlyPrice;
use crate::vehicle::VehicleState;
use serde::{Deserialize, Serialize};

/// Main driver state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverState {
    /// Driver is initializing
    Initializing,
    /// Driver is running normally
    Running,
    /// Too many failed cycles in a row; waiting before the next one
    CoolingDown,
    /// Driver is shutting down
    ShuttingDown,
}

/// How a cycle ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CycleOutcome {
    Success,
    /// Nothing was decided: credentials missing, retries exhausted or the
    /// vehicle did not wake
    Skipped { reason: String },
    /// A vendor rejected a request or a command was not acknowledged
    Failed { error: String },
    Cancelled,
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleOutcome::Success)
    }
}

/// Record of one poll-decide-act cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_at: String,
    pub duration_ms: u64,
    pub outcome: CycleOutcome,
    pub woke_vehicle: bool,
    pub decision: Option<Decision>,
    pub command: Option<CommandAck>,
    /// Every backoff sleep of the cycle, in order
    pub backoff_delays_ms: Vec<u64>,
}

/// Latest driver state, published after every cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSnapshot {
    pub timestamp: String,
    pub driver_state: DriverState,
    pub total_cycles: u64,
    pub consecutive_failures: u32,
    pub poll_interval_ms: u64,
    pub tesla_auth: AuthState,
    pub easee_auth: AuthState,
    pub last_cycle: Option<CycleReport>,
    pub vehicle: Option<VehicleState>,
    pub charger: Option<ChargerState>,
    pub plan: Option<ChargingPlan>,
    /// Served separately by the web layer
    #[serde(skip)]
    pub prices: Option<Vec<HourlyPrice>>,
}
