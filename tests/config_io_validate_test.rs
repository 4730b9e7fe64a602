use ladning::config::{Config, InteractiveMode};
use std::fs;

#[test]
fn serialized_yaml_loads_back() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("config.yaml");

    let mut cfg = Config::default();
    cfg.tesla.vehicle_id = Some(1492931337);
    cfg.easee.charger_id = Some("EHXXXXXX".to_string());
    cfg.auth.interactive = InteractiveMode::Never;
    cfg.logging.file = path.with_extension("log").to_string_lossy().to_string();

    fs::write(&path, serde_yaml::to_string(&cfg).unwrap()).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.tesla.vehicle_id, Some(1492931337));
    assert_eq!(loaded.easee.charger_id.as_deref(), Some("EHXXXXXX"));
    assert_eq!(loaded.auth.interactive, InteractiveMode::Never);
    assert_eq!(loaded.logging.file, cfg.logging.file);
}

#[test]
fn partial_yaml_falls_back_to_defaults() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(
        tmp.path(),
        b"control:\n  poll_interval_ms: 5000\npolicy:\n  target_battery_level: 80\n",
    )
    .unwrap();
    let cfg = Config::from_file(tmp.path()).unwrap();
    assert_eq!(cfg.control.poll_interval_ms, 5000);
    assert_eq!(cfg.policy.target_battery_level, 80);
    assert_eq!(cfg.control.retry.max_attempts, 5);
    assert!(cfg.validate().is_ok());
}

#[test]
fn config_validation_errors() {
    let mut cfg = Config::default();
    cfg.auth.token_cache_file = "  ".to_string();
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.control.retry.max_attempts = 0;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.control.retry.base_delay_ms = cfg.control.retry.max_delay_ms + 1;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.policy.charging_current_a = 0.0;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.policy.charging_power_kw = -1.0;
    assert!(cfg.validate().is_err());

    cfg = Config::default();
    cfg.prices.enabled = true;
    cfg.prices.timezone = "Mars/Olympus_Mons".to_string();
    assert!(cfg.validate().is_err());
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"bad: [unclosed").unwrap();
    let err = Config::from_file(tmp.path()).unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Serialization error"));
}
