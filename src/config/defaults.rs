use super::*;

impl Default for TeslaConfig {
    fn default() -> Self {
        Self {
            email: String::new(),
            vehicle_id: None,
            auth_base_url: "https://auth.tesla.com/oauth2/v3".to_string(),
            api_base_url: "https://owner-api.teslamotors.com".to_string(),
            client_id: "ownerapi".to_string(),
            redirect_uri: "https://auth.tesla.com/void/callback".to_string(),
            scope: "openid email offline_access".to_string(),
        }
    }
}

impl Default for EaseeConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            charger_id: None,
            base_url: "https://api.easee.com".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_cache_file: "ladning_tokens.json".to_string(),
            refresh_margin_secs: 60,
            interactive: InteractiveMode::Auto,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_ratio: 0.2,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 60_000,
            request_timeout_ms: 10_000,
            retry: RetryConfig::default(),
            failure_threshold: 5,
            cooldown_secs: 300,
            wake_timeout_secs: 90,
            wake_poll_interval_ms: 5_000,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            target_battery_level: 100,
            charging_current_a: 16.0,
            current_tolerance_a: 0.5,
            smart_charging: true,
            // Tesla Model 3 Highland RWD on an Easee Lite
            battery_capacity_kwh: 57.5,
            charging_power_kw: 10.6,
        }
    }
}

impl Default for PricesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.bolius.dk/livedata/v2/type/power".to_string(),
            region: "DK2".to_string(),
            timezone: "Europe/Copenhagen".to_string(),
            refresh_interval_secs: 3600,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8089,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/ladning.log".to_string(),
            console_output: true,
            json_format: false,
            backup_count: 5,
        }
    }
}
