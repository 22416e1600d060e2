use std::collections::HashMap;
use std::time::Duration;

use app_config::AppConfig;

fn env(vars: &[(&str, &str)]) -> config::Environment {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    AppConfig::environment().source(Some(map))
}

#[test]
fn test_load_default_config() {
    let cfg = AppConfig::from_env(env(&[])).unwrap();
    assert_eq!(cfg.db_host, "localhost");
    assert_eq!(cfg.http_port, 3000);
    assert_eq!(cfg.shutdown_timeout, Duration::from_secs(5));
    assert_eq!(cfg.order_id_length, 8);
    assert_eq!(cfg.order_id_max_attempts, 10);
    assert_eq!(cfg.migrations_dir, "migrations");
}

#[test]
fn test_env_overrides_defaults() {
    let cfg = AppConfig::from_env(env(&[
        ("DB_HOST", "postgres"),
        ("HTTP_PORT", "8080"),
        ("SHUTDOWN_TIMEOUT", "1m"),
        ("ORDER_ID_LENGTH", "10"),
    ]))
    .unwrap();
    assert_eq!(cfg.db_host, "postgres");
    assert_eq!(cfg.http_port, 8080);
    assert_eq!(cfg.shutdown_timeout, Duration::from_secs(60));
    assert_eq!(cfg.order_id_length, 10);
}

#[test]
fn test_prefixed_variables_are_ignored() {
    let cfg = AppConfig::from_env(env(&[
        ("ORDERS_DB_HOST", "postgres"),
        ("ORDERS_HTTP_PORT", "8080"),
    ]))
    .unwrap();
    assert_eq!(cfg.db_host, "localhost");
    assert_eq!(cfg.http_port, 3000);
}

#[test]
fn test_zero_attempts_rejected() {
    let err = AppConfig::from_env(env(&[("ORDER_ID_MAX_ATTEMPTS", "0")])).unwrap_err();
    assert!(err.to_string().contains("order_id_max_attempts"));
}

#[test]
fn test_pg_dsn() {
    let cfg = AppConfig::from_env(env(&[])).unwrap();
    assert_eq!(
        cfg.pg_dsn(),
        "host=localhost port=5432 user=postgres password=postgres dbname=orders sslmode=disable"
    );
}
