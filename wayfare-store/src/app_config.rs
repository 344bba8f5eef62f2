use serde::Deserialize;
use std::env;
use wayfare_core::CoreResult;
use wayfare_order::models::RefundTier;
use wayfare_order::{BookingSettings, RefundSchedule};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub kafka: Option<KafkaConfig>,
    pub auth: AuthConfig,
    pub booking: BookingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
    /// Applied with `SET LOCAL` at the start of every booking transaction.
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_ms: u64,
}

fn default_max_connections() -> u32 { 5 }
fn default_acquire_timeout() -> u64 { 3 }
fn default_statement_timeout() -> u64 { 5000 }

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub notification_topic: String,
    pub event_topic: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingConfig {
    pub currency: String,
    /// Fallback tiers for bookings whose item and trip carry no refund policy.
    pub default_refund_tiers: Vec<RefundTier>,
}

impl BookingConfig {
    pub fn settings(&self) -> CoreResult<BookingSettings> {
        Ok(BookingSettings {
            currency: self.currency.clone(),
            default_refund_tiers: RefundSchedule::new(self.default_refund_tiers.clone())?,
        })
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `WAYFARE_DATABASE__URL=postgres://...` sets `database.url`
            .add_source(config::Environment::with_prefix("WAYFARE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    const DEFAULTS: &str = include_str!("../../config/default.toml");

    fn parse(extra: &str) -> Config {
        config::Config::builder()
            .add_source(File::from_str(DEFAULTS, FileFormat::Toml))
            .add_source(File::from_str(extra, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_shipped_defaults_parse() {
        let config = parse("");
        assert_eq!(config.booking.currency, "USD");
        assert_eq!(config.database.max_connections, 5);

        let settings = config.booking.settings().unwrap();
        assert_eq!(settings.default_refund_tiers, RefundSchedule::standard());
    }

    #[test]
    fn test_refund_tiers_override() {
        let config = parse(
            r#"
            [booking]
            currency = "EGP"
            default_refund_tiers = [{ min_days = 14, percent = 90 }, { min_days = 0, percent = 10 }]
            "#,
        );
        let settings = config.booking.settings().unwrap();
        assert_eq!(settings.currency, "EGP");
        assert_eq!(settings.default_refund_tiers.percent_for(20), 90);
        assert_eq!(settings.default_refund_tiers.percent_for(2), 10);
    }

    #[test]
    fn test_invalid_refund_percent_is_rejected() {
        let config = parse(
            r#"
            [booking]
            currency = "USD"
            default_refund_tiers = [{ min_days = 3, percent = 120 }]
            "#,
        );
        assert!(config.booking.settings().is_err());
    }
}
