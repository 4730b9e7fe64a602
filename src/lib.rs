//! # Ladning - smart EV charging for a Tesla vehicle and an Easee charger
//!
//! Ladning keeps session credentials for both vendor accounts valid across
//! restarts and runs a control loop that starts, stops and throttles the
//! charger based on the vehicle's battery level and hourly electricity prices.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `credential`: Provider credentials
//! - `token_cache`: Durable, atomically written credential store
//! - `auth`: Credential lifecycle, refresh and vendor logins
//! - `http`: Shared HTTP client and error classification
//! - `vehicle`: Vehicle API integration
//! - `charger`: Charger API integration
//! - `prices`: Hourly electricity prices
//! - `plan`: Charging plan from prices
//! - `controls`: Charging decision policy
//! - `driver`: Control loop with retry and backoff
//! - `web`: HTTP status service

pub mod auth;
pub mod charger;
pub mod config;
pub mod controls;
pub mod credential;
pub mod driver;
pub mod error;
pub mod http;
pub mod logging;
pub mod plan;
pub mod prices;
pub mod token_cache;
pub mod vehicle;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use driver::ControlLoop;
pub use error::{LadningError, Result};
