//! Configuration management for Ladning
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files with support for environment variable
//! overrides of account secrets.

use crate::error::{LadningError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

mod defaults;

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "LADNING_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tesla account and API endpoints
    pub tesla: TeslaConfig,

    /// Easee account and API endpoints
    pub easee: EaseeConfig,

    /// Credential lifecycle settings
    pub auth: AuthConfig,

    /// Control loop timing, retry and cool-down
    pub control: ControlConfig,

    /// Charging decision policy
    pub policy: PolicyConfig,

    /// Hourly electricity price source
    pub prices: PricesConfig,

    /// Status web server
    pub web: WebConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Tesla owner API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TeslaConfig {
    /// Account e-mail, used as account id and login hint
    pub email: String,

    /// Vehicle to control; discovered when the account has exactly one
    pub vehicle_id: Option<u64>,

    /// OAuth2 server base (authorize and token endpoints live below it)
    pub auth_base_url: String,

    /// Owner API base
    pub api_base_url: String,

    /// OAuth client id
    pub client_id: String,

    /// Redirect URI the consent page lands on after login
    pub redirect_uri: String,

    /// Requested OAuth scopes, space separated
    pub scope: String,
}

/// Easee cloud API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EaseeConfig {
    /// Account user name (e-mail or phone number)
    pub username: String,

    /// Account password; kept out of serialized output
    #[serde(skip_serializing)]
    pub password: String,

    /// Charger serial to control; discovered when the account has exactly one
    pub charger_id: Option<String>,

    /// Cloud API base
    pub base_url: String,
}

/// When the interactive consent flow may be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractiveMode {
    /// Interactive when stdin is a terminal
    Auto,
    /// Always prompt the operator
    Always,
    /// Headless; never prompt
    Never,
}

/// Credential lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Token cache file holding one credential per provider
    pub token_cache_file: String,

    /// Credentials expiring within this many seconds are refreshed first
    pub refresh_margin_secs: u64,

    /// Whether the operator can be asked to complete a browser login
    pub interactive: InteractiveMode,
}

/// Backoff parameters for transient vendor failures within one cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per vendor call, including the first
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds
    pub base_delay_ms: u64,

    /// Upper bound of a single delay in milliseconds
    pub max_delay_ms: u64,

    /// Random extra delay as a fraction of the exponential delay (0..=1)
    pub jitter_ratio: f64,
}

/// Control loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,

    /// Timeout of a single vendor HTTP request in milliseconds
    pub request_timeout_ms: u64,

    /// Retry/backoff for transient failures
    pub retry: RetryConfig,

    /// Consecutive failed or skipped cycles before cooling down
    pub failure_threshold: u32,

    /// Length of the cool-down pause in seconds
    pub cooldown_secs: u64,

    /// Maximum time to wait for a woken vehicle in seconds
    pub wake_timeout_secs: u64,

    /// Interval between awake checks in milliseconds
    pub wake_poll_interval_ms: u64,
}

/// Charging decision policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Desired state of charge in percent
    pub target_battery_level: u8,

    /// Current to charge with in amperes
    pub charging_current_a: f64,

    /// Difference from the charger's limit that triggers an adjustment
    pub current_tolerance_a: f64,

    /// Only charge within the cheapest window when prices are known
    pub smart_charging: bool,

    /// Usable battery capacity in kWh
    pub battery_capacity_kwh: f64,

    /// Realistic charging power in kW
    pub charging_power_kw: f64,
}

/// Electricity price source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricesConfig {
    /// Whether prices are fetched at all
    pub enabled: bool,

    /// Endpoint returning hourly prices
    pub base_url: String,

    /// Price area
    pub region: String,

    /// Timezone the endpoint reports hours in
    pub timezone: String,

    /// Minimum seconds between two fetches
    pub refresh_interval_secs: u64,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Whether the status server is started
    pub enabled: bool,

    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file; its directory receives the daily rotated files
    pub file: String,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,

    /// Number of rotated files to keep
    pub backup_count: u32,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from `LADNING_CONFIG` or the default locations
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !Path::new(&path).exists() {
                return Err(LadningError::config(format!(
                    "{} points to missing file {}",
                    CONFIG_PATH_ENV, path
                )));
            }
            return Self::from_file(path);
        }

        let default_paths = [
            "ladning_config.yaml",
            "/data/ladning_config.yaml",
            "/etc/ladning/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        let mut config = Config::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Replace account secrets with values from the environment when present
    pub fn apply_env_overrides(&mut self) {
        let read = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        if let Some(v) = read("LADNING_TESLA_EMAIL") {
            self.tesla.email = v;
        }
        if let Some(v) = read("LADNING_EASEE_USERNAME") {
            self.easee.username = v;
        }
        if let Some(v) = read("LADNING_EASEE_PASSWORD") {
            self.easee.password = v;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.auth.token_cache_file.trim().is_empty() {
            return Err(LadningError::validation(
                "auth.token_cache_file",
                "Path cannot be empty",
            ));
        }

        if self.control.poll_interval_ms == 0 {
            return Err(LadningError::validation(
                "control.poll_interval_ms",
                "Must be greater than 0",
            ));
        }

        let retry = &self.control.retry;
        if retry.max_attempts == 0 {
            return Err(LadningError::validation(
                "control.retry.max_attempts",
                "Must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&retry.jitter_ratio) {
            return Err(LadningError::validation(
                "control.retry.jitter_ratio",
                "Must be between 0 and 1",
            ));
        }
        if retry.base_delay_ms > retry.max_delay_ms {
            return Err(LadningError::validation(
                "control.retry.base_delay_ms",
                "Must not exceed max_delay_ms",
            ));
        }

        if !(1..=100).contains(&self.policy.target_battery_level) {
            return Err(LadningError::validation(
                "policy.target_battery_level",
                "Must be between 1 and 100",
            ));
        }
        if !is_positive(self.policy.charging_current_a) {
            return Err(LadningError::validation(
                "policy.charging_current_a",
                "Must be positive",
            ));
        }
        if !is_positive(self.policy.battery_capacity_kwh) {
            return Err(LadningError::validation(
                "policy.battery_capacity_kwh",
                "Must be positive",
            ));
        }
        if !is_positive(self.policy.charging_power_kw) {
            return Err(LadningError::validation(
                "policy.charging_power_kw",
                "Must be positive",
            ));
        }

        if self.prices.enabled && self.prices.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(LadningError::validation(
                "prices.timezone",
                "Unknown timezone",
            ));
        }

        Ok(())
    }
}

/// Finite and above zero; NaN fails
fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.control.poll_interval_ms, 60_000);
        assert_eq!(config.auth.refresh_margin_secs, 60);
        assert_eq!(config.control.retry.max_attempts, 5);
        assert_eq!(config.policy.target_battery_level, 100);
        assert_eq!(config.auth.token_cache_file, "ladning_tokens.json");
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.control.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.control.retry.jitter_ratio = 1.5;
        assert!(config.validate().is_err());

        config = Config::default();
        config.policy.target_battery_level = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_finite_policy_values_are_rejected() {
        for value in [f64::NAN, f64::INFINITY, -1.0, 0.0] {
            let mut config = Config::default();
            config.policy.charging_power_kw = value;
            assert!(config.validate().is_err(), "charging_power_kw={}", value);

            let mut config = Config::default();
            config.policy.battery_capacity_kwh = value;
            assert!(config.validate().is_err(), "battery_capacity_kwh={}", value);

            let mut config = Config::default();
            config.policy.charging_current_a = value;
            assert!(config.validate().is_err(), "charging_current_a={}", value);
        }
    }

    #[test]
    fn test_config_serialization_skips_password() {
        let mut config = Config::default();
        config.easee.password = "hunter2".to_string();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("hunter2"));
        let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.control.poll_interval_ms, deserialized.control.poll_interval_ms);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str("policy:\n  target_battery_level: 80\n").unwrap();
        assert_eq!(config.policy.target_battery_level, 80);
        assert_eq!(config.control.retry.max_attempts, 5);
        assert_eq!(config.auth.interactive, InteractiveMode::Auto);
    }
}
