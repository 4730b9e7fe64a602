//! Vehicle API integration
//!
//! The control loop only needs a small slice of the vehicle's telemetry:
//! whether it is awake, its battery level and whether it is plugged in.

use crate::config::TeslaConfig;
use crate::credential::Credential;
use crate::error::{LadningError, Result};
use crate::http::{ensure_success, join_url, read_json};
use crate::logging::{StructuredLogger, get_logger};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

/// Charging state as reported by the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargingState {
    Charging,
    Stopped,
    Complete,
    Disconnected,
    Unknown,
}

impl ChargingState {
    pub fn from_label(s: &str) -> Self {
        match s {
            "Charging" | "Starting" => Self::Charging,
            "Stopped" | "NoPower" => Self::Stopped,
            "Complete" => Self::Complete,
            "Disconnected" => Self::Disconnected,
            _ => Self::Unknown,
        }
    }
}

/// Snapshot of the vehicle, re-fetched every cycle.
///
/// A vehicle that is not awake reports no charge data; `battery_level` is
/// `None` and `charging_state` is `Unknown` until it wakes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub vehicle_id: u64,
    pub is_awake: bool,
    pub battery_level: Option<u8>,
    pub charging_state: ChargingState,
    pub plugged_in: bool,
}

/// Vehicle client trait
#[async_trait::async_trait]
pub trait VehicleClient: Send + Sync {
    async fn fetch_state(&self, credential: &Credential) -> Result<VehicleState>;

    /// Ask a sleeping vehicle to wake; returns before it is actually awake
    async fn wake_up(&self, credential: &Credential) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: T,
}

#[derive(Debug, Deserialize)]
struct VehicleSummary {
    id: u64,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    state: String,
}

#[derive(Debug, Deserialize)]
struct VehicleData {
    charge_state: ChargeState,
}

#[derive(Debug, Deserialize)]
struct ChargeState {
    battery_level: u8,
    charging_state: String,
    #[serde(default)]
    conn_charge_cable: Option<String>,
}

/// Tesla owner API client
pub struct TeslaVehicleClient {
    http: reqwest::Client,
    base_url: String,
    configured_id: Option<u64>,
    resolved_id: OnceCell<u64>,
    logger: StructuredLogger,
}

impl TeslaVehicleClient {
    pub fn new(http: reqwest::Client, config: &TeslaConfig) -> Self {
        Self {
            http,
            base_url: config.api_base_url.clone(),
            configured_id: config.vehicle_id,
            resolved_id: OnceCell::new(),
            logger: get_logger("tesla"),
        }
    }

    async fn vehicle_id(&self, credential: &Credential) -> Result<u64> {
        if let Some(id) = self.configured_id {
            return Ok(id);
        }
        self.resolved_id
            .get_or_try_init(|| async {
                let resp = self
                    .http
                    .get(join_url(&self.base_url, "api/1/vehicles"))
                    .bearer_auth(&credential.access_token)
                    .send()
                    .await?;
                let list: Envelope<Vec<VehicleSummary>> =
                    read_json(resp, "Tesla vehicle list").await?;
                match list.response.as_slice() {
                    [only] => {
                        self.logger.info(&format!(
                            "Using vehicle {} ({})",
                            only.id,
                            only.display_name.as_deref().unwrap_or("unnamed")
                        ));
                        Ok(only.id)
                    }
                    others => Err(LadningError::permanent(format!(
                        "Expected exactly one vehicle on the account, found {}; set tesla.vehicle_id",
                        others.len()
                    ))),
                }
            })
            .await
            .copied()
    }
}

#[async_trait::async_trait]
impl VehicleClient for TeslaVehicleClient {
    async fn fetch_state(&self, credential: &Credential) -> Result<VehicleState> {
        let id = self.vehicle_id(credential).await?;

        // The summary endpoint does not wake the vehicle
        let resp = self
            .http
            .get(join_url(&self.base_url, &format!("api/1/vehicles/{}", id)))
            .bearer_auth(&credential.access_token)
            .send()
            .await?;
        let summary: Envelope<VehicleSummary> = read_json(resp, "Tesla vehicle summary").await?;
        if summary.response.state != "online" {
            self.logger
                .debug(&format!("Vehicle {} is {}", id, summary.response.state));
            return Ok(VehicleState {
                vehicle_id: id,
                is_awake: false,
                battery_level: None,
                charging_state: ChargingState::Unknown,
                plugged_in: false,
            });
        }

        let resp = self
            .http
            .get(join_url(
                &self.base_url,
                &format!("api/1/vehicles/{}/vehicle_data", id),
            ))
            .bearer_auth(&credential.access_token)
            .send()
            .await?;
        let data: Envelope<VehicleData> = read_json(resp, "Tesla vehicle data").await?;
        let charge = data.response.charge_state;
        let charging_state = ChargingState::from_label(&charge.charging_state);
        let cable_connected = charge
            .conn_charge_cable
            .as_deref()
            .is_some_and(|c| !c.is_empty() && c != "<invalid>");

        Ok(VehicleState {
            vehicle_id: id,
            is_awake: true,
            battery_level: Some(charge.battery_level.min(100)),
            charging_state,
            plugged_in: cable_connected || charging_state != ChargingState::Disconnected,
        })
    }

    async fn wake_up(&self, credential: &Credential) -> Result<()> {
        let id = self.vehicle_id(credential).await?;
        let resp = self
            .http
            .post(join_url(
                &self.base_url,
                &format!("api/1/vehicles/{}/wake_up", id),
            ))
            .bearer_auth(&credential.access_token)
            .send()
            .await?;
        ensure_success(resp, "Tesla wake_up").await?;
        self.logger.info(&format!("Sent wake command to vehicle {}", id));
        Ok(())
    }
}
