//! Charging station API integration

use crate::config::EaseeConfig;
use crate::credential::Credential;
use crate::error::{LadningError, Result};
use crate::http::{ensure_success, join_url, read_json};
use crate::logging::{StructuredLogger, get_logger};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use tokio::sync::OnceCell;

/// Coarse charger status the decision policy works with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargerStatus {
    Idle,
    Charging,
    Error,
    Disconnected,
}

/// Easee `chargerOpMode` values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargerOpMode {
    Offline,
    Disconnected,
    AwaitingStart,
    Charging,
    Completed,
    Error,
    ReadyToCharge,
    AwaitingAuthentication,
    Deauthenticating,
    Unknown(i64),
}

impl ChargerOpMode {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Offline,
            1 => Self::Disconnected,
            2 => Self::AwaitingStart,
            3 => Self::Charging,
            4 => Self::Completed,
            5 => Self::Error,
            6 => Self::ReadyToCharge,
            7 => Self::AwaitingAuthentication,
            8 => Self::Deauthenticating,
            other => Self::Unknown(other),
        }
    }

    pub fn status(&self) -> ChargerStatus {
        match self {
            Self::Offline | Self::Disconnected => ChargerStatus::Disconnected,
            Self::Charging => ChargerStatus::Charging,
            Self::Error | Self::Unknown(_) => ChargerStatus::Error,
            Self::AwaitingStart
            | Self::Completed
            | Self::ReadyToCharge
            | Self::AwaitingAuthentication
            | Self::Deauthenticating => ChargerStatus::Idle,
        }
    }
}

/// Snapshot of the charger, re-fetched every cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargerState {
    pub charger_id: String,
    pub status: ChargerStatus,
    /// Dynamic current limit in amperes
    pub current_limit: f64,
    pub online: bool,
}

impl ChargerState {
    /// A vehicle is plugged in and the charger can act on commands
    pub fn vehicle_connected(&self) -> bool {
        self.online && self.status != ChargerStatus::Disconnected
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "amps", rename_all = "snake_case")]
pub enum ChargerCommand {
    StartCharging,
    StopCharging,
    SetCurrent(f64),
}

impl fmt::Display for ChargerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChargerCommand::StartCharging => f.write_str("start_charging"),
            ChargerCommand::StopCharging => f.write_str("stop_charging"),
            ChargerCommand::SetCurrent(a) => write!(f, "set_current({:.1}A)", a),
        }
    }
}

/// What the charger said about a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandAck {
    pub command: ChargerCommand,
    pub accepted: bool,
    pub reference: Option<String>,
}

/// Charger client trait
#[async_trait::async_trait]
pub trait ChargerClient: Send + Sync {
    async fn fetch_state(&self, credential: &Credential) -> Result<ChargerState>;

    async fn send_command(
        &self,
        credential: &Credential,
        command: ChargerCommand,
    ) -> Result<CommandAck>;
}

#[derive(Debug, Deserialize)]
struct ChargerSummary {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EaseeState {
    charger_op_mode: i64,
    #[serde(default)]
    dynamic_charger_current: f64,
    #[serde(default)]
    is_online: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommandResponse {
    #[serde(default)]
    command_id: Option<serde_json::Value>,
}

const APPLIED_CURRENT_TOLERANCE_A: f64 = 0.5;

/// Easee cloud API client
pub struct EaseeChargerClient {
    http: reqwest::Client,
    base_url: String,
    configured_id: Option<String>,
    resolved_id: OnceCell<String>,
    logger: StructuredLogger,
}

impl EaseeChargerClient {
    pub fn new(http: reqwest::Client, config: &EaseeConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
            configured_id: config.charger_id.clone().filter(|id| !id.is_empty()),
            resolved_id: OnceCell::new(),
            logger: get_logger("easee"),
        }
    }

    async fn charger_id(&self, credential: &Credential) -> Result<String> {
        if let Some(id) = &self.configured_id {
            return Ok(id.clone());
        }
        self.resolved_id
            .get_or_try_init(|| async {
                let resp = self
                    .http
                    .get(join_url(&self.base_url, "api/chargers"))
                    .bearer_auth(&credential.access_token)
                    .send()
                    .await?;
                let list: Vec<ChargerSummary> = read_json(resp, "Easee charger list").await?;
                match list.as_slice() {
                    [only] => {
                        self.logger.info(&format!(
                            "Using charger {} ({})",
                            only.id,
                            only.name.as_deref().unwrap_or("unnamed")
                        ));
                        Ok(only.id.clone())
                    }
                    others => Err(LadningError::permanent(format!(
                        "Expected exactly one charger on the account, found {}; set easee.charger_id",
                        others.len()
                    ))),
                }
            })
            .await
            .cloned()
    }

    async fn post_command(
        &self,
        credential: &Credential,
        id: &str,
        command: ChargerCommand,
    ) -> Result<reqwest::Response> {
        let request = match command {
            ChargerCommand::StartCharging => self.http.post(join_url(
                &self.base_url,
                &format!("api/chargers/{}/commands/start_charging", id),
            )),
            ChargerCommand::StopCharging => self.http.post(join_url(
                &self.base_url,
                &format!("api/chargers/{}/commands/stop_charging", id),
            )),
            ChargerCommand::SetCurrent(amps) => self
                .http
                .post(join_url(&self.base_url, &format!("api/chargers/{}/settings", id)))
                .json(&json!({ "dynamicChargerCurrent": amps })),
        };
        let resp = request.bearer_auth(&credential.access_token).send().await?;
        ensure_success(resp, &format!("Easee {}", command)).await
    }

    /// Re-read the charger and check the dynamic current now matches `amps`
    async fn current_applied(&self, credential: &Credential, amps: f64) -> Result<bool> {
        let state = self.fetch_state(credential).await?;
        Ok((state.current_limit - amps).abs() < APPLIED_CURRENT_TOLERANCE_A)
    }
}

#[async_trait::async_trait]
impl ChargerClient for EaseeChargerClient {
    async fn fetch_state(&self, credential: &Credential) -> Result<ChargerState> {
        let id = self.charger_id(credential).await?;
        let resp = self
            .http
            .get(join_url(&self.base_url, &format!("api/chargers/{}/state", id)))
            .bearer_auth(&credential.access_token)
            .send()
            .await?;
        let state: EaseeState = read_json(resp, "Easee charger state").await?;
        let op_mode = ChargerOpMode::from_code(state.charger_op_mode);
        Ok(ChargerState {
            charger_id: id,
            status: op_mode.status(),
            current_limit: state.dynamic_charger_current,
            online: state.is_online && op_mode != ChargerOpMode::Offline,
        })
    }

    async fn send_command(
        &self,
        credential: &Credential,
        command: ChargerCommand,
    ) -> Result<CommandAck> {
        let id = self.charger_id(credential).await?;
        let resp = self.post_command(credential, &id, command).await?;
        let status = resp.status();
        let body = resp.bytes().await.unwrap_or_default();

        // Commands answer with a list of queued commands, settings often with nothing
        let reference = serde_json::from_slice::<Vec<CommandResponse>>(&body)
            .ok()
            .and_then(|list| list.into_iter().find_map(|c| c.command_id))
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            });

        let accepted = match command {
            ChargerCommand::StartCharging | ChargerCommand::StopCharging => reference.is_some(),
            ChargerCommand::SetCurrent(amps) => {
                reference.is_some() || self.current_applied(credential, amps).await?
            }
        };

        if accepted {
            self.logger
                .info(&format!("Charger {} accepted {} ({})", id, command, status));
        } else {
            self.logger.warn(&format!(
                "Charger {} answered {} to {} without acknowledging it",
                id, status, command
            ));
        }
        Ok(CommandAck {
            command,
            accepted,
            reference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_modes_map_to_status() {
        assert_eq!(ChargerOpMode::from_code(1).status(), ChargerStatus::Disconnected);
        assert_eq!(ChargerOpMode::from_code(2).status(), ChargerStatus::Idle);
        assert_eq!(ChargerOpMode::from_code(3).status(), ChargerStatus::Charging);
        assert_eq!(ChargerOpMode::from_code(5).status(), ChargerStatus::Error);
        assert_eq!(ChargerOpMode::from_code(42).status(), ChargerStatus::Error);
    }

    #[test]
    fn offline_charger_has_no_connected_vehicle() {
        let state = ChargerState {
            charger_id: "EH1".into(),
            status: ChargerStatus::Idle,
            current_limit: 16.0,
            online: false,
        };
        assert!(!state.vehicle_connected());
    }

    #[test]
    fn command_display() {
        assert_eq!(ChargerCommand::SetCurrent(10.0).to_string(), "set_current(10.0A)");
    }
}
