use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub marketplace: MarketplaceRules,
    pub settlement: SettlementConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Empty URL selects the in-memory store (local runs and tests)
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarketplaceRules {
    /// Platform commission as a fraction, e.g. 0.10 for 10%
    #[serde(default = "default_commission_rate")]
    pub commission_rate: f64,
    /// Days an earning is held before it becomes payable
    #[serde(default = "default_holding_period_days")]
    pub holding_period_days: i64,
    /// "lenient" or "strict" transition-graph enforcement
    #[serde(default = "default_transition_policy")]
    pub transition_policy: String,
}

fn default_commission_rate() -> f64 {
    0.10
}

fn default_holding_period_days() -> i64 {
    7
}

fn default_transition_policy() -> String {
    "lenient".to_string()
}

impl MarketplaceRules {
    /// Commission math runs in integer basis points; the configured
    /// fraction is converted once at startup.
    pub fn commission_rate_bps(&self) -> i64 {
        (self.commission_rate * 10_000.0).round() as i64
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SettlementConfig {
    /// UTC instant of the daily settlement pass
    #[serde(default = "default_settlement_hour")]
    pub hour_utc: u32,
    #[serde(default)]
    pub minute_utc: u32,
}

fn default_settlement_hour() -> u32 {
    2
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Add in the current environment file (optional)
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Environment variables with a VENDIA prefix, e.g.
            // VENDIA__SERVER__PORT=8080
            .add_source(config::Environment::with_prefix("VENDIA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
