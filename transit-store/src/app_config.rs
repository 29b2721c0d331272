use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub reservations: ReservationConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Without a URL the service runs on the in-memory ledger
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            acquire_timeout_seconds: default_acquire_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReservationConfig {
    #[serde(default = "default_hold_window")]
    pub hold_window_seconds: u64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            hold_window_seconds: default_hold_window(),
            currency: default_currency(),
        }
    }
}

/// Settings for the reference payment processor
#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
    #[serde(default = "default_max_amount")]
    pub max_amount: u64,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            latency_ms: default_latency_ms(),
            max_amount: default_max_amount(),
        }
    }
}

fn default_max_connections() -> u32 { 5 }
fn default_acquire_timeout() -> u64 { 3 }
fn default_hold_window() -> u64 { 900 }
fn default_currency() -> String { "KES".to_string() }
fn default_latency_ms() -> u64 { 200 }
fn default_max_amount() -> u64 { 10_000 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `TRANSIT_DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("TRANSIT").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
