use std::env;
use std::time::Duration;

use serde::Deserialize;

use transix_engine::ServiceConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    pub seat_hold_seconds: u64,
    pub reservation_lock_seconds: u64,
    pub payment_window_minutes: i64,
    pub snapshot_cache_seconds: u64,
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_success_rate")]
    pub payment_success_rate: f64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

fn default_success_rate() -> f64 {
    0.9
}

fn default_rate_limit() -> i64 {
    100
}

impl BusinessRules {
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            seat_hold_ttl: Duration::from_secs(self.seat_hold_seconds),
            reservation_lock_ttl: Duration::from_secs(self.reservation_lock_seconds),
            payment_window: chrono::Duration::minutes(self.payment_window_minutes),
            snapshot_cache_ttl: Duration::from_secs(self.snapshot_cache_seconds),
            ..ServiceConfig::default()
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Base configuration, always present
            .add_source(config::File::with_name("config/default"))
            // Environment-specific overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. TRANSIX__SERVER__PORT=9090
            .add_source(config::Environment::with_prefix("TRANSIX").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
