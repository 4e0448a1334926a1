use super::*;
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

fn missing_file() -> String {
    "config/does-not-exist".to_string()
}

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.broker.url(), "ws://127.0.0.1:5672");
    assert_eq!(settings.queue.name, "pizzaQueue");
    assert_eq!(settings.http.url(), "http://127.0.0.1:8000/pizza");
    assert_eq!(settings.integrity.shared_secret, "shared_secret_key");
    assert!(settings.http.demo_replacement);
    assert!(settings.queue.demo_replacement);
    assert!(settings.uses_default_secret());
}

#[test]
fn test_partial_merge_keeps_defaults() {
    let partial = PartialSettings {
        http: Some(settings::PartialHttpSettings {
            port: Some(9100),
            ..Default::default()
        }),
        ..Default::default()
    };
    let merged = partial.merge_onto(Settings::default());
    assert_eq!(merged.http.port, 9100);
    assert_eq!(merged.http.path, "/pizza");
    assert_eq!(merged.broker.port, 5672);
}

#[test]
#[serial]
fn test_load_config_from_file_overrides_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let toml = r#"
        [broker]
        port = 5999

        [queue]
        name = "ordersQueue"
        demo_replacement = false

        [http]
        host = "0.0.0.0"
        port = 9000
        max_concurrent_requests = 4

        [integrity]
        shared_secret = "file_secret"
    "#;
    fs::write(tmp.path().join("default.toml"), toml).expect("write config file");

    let stem = tmp.path().join("default");
    let cfg = load_config_from(stem.to_str().unwrap()).expect("load_config failed");
    assert_eq!(cfg.broker.port, 5999);
    assert_eq!(cfg.broker.host, "127.0.0.1");
    assert_eq!(cfg.queue.name, "ordersQueue");
    assert!(!cfg.queue.demo_replacement);
    assert_eq!(cfg.http.host, "0.0.0.0");
    assert_eq!(cfg.http.port, 9000);
    assert_eq!(cfg.http.max_concurrent_requests, 4);
    assert_eq!(cfg.integrity.shared_secret, "file_secret");
}

#[test]
#[serial]
fn test_environment_overrides() {
    temp_env::with_vars(
        [
            ("PIZZALINK_HTTP__PORT", Some("8123")),
            ("PIZZALINK_INTEGRITY__SHARED_SECRET", Some("env_secret")),
            ("PIZZALINK_LOG__LEVEL", Some("debug")),
        ],
        || {
            let cfg = load_config_from(&missing_file()).expect("load_config failed");
            assert_eq!(cfg.http.port, 8123);
            assert_eq!(cfg.integrity.shared_secret, "env_secret");
            assert!(!cfg.uses_default_secret());
            assert_eq!(cfg.log.level, "debug");
        },
    );
}

#[test]
#[serial]
fn test_empty_shared_secret_rejected() {
    temp_env::with_var("PIZZALINK_INTEGRITY__SHARED_SECRET", Some(""), || {
        assert!(load_config_from(&missing_file()).is_err());
    });
}
