use berth_catalog::{FareRate, PolicyError, PricingConfig, RefundPolicy, RefundTier};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub fares: Vec<FareRate>,
    /// Empty means the standard cancellation table.
    #[serde(default)]
    pub refund_tiers: Vec<RefundTier>,
    #[serde(default)]
    pub seed: Option<SeedConfig>,
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
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

fn default_cache_ttl() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_topic")]
    pub topic: String,
}

fn default_topic() -> String {
    "berth.bookings".to_string()
}

/// Booking rules that are not reference data.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BookingConfig {
    pub lock_timeout_ms: u64,
    pub max_passengers: usize,
    pub tatkal_max_passengers: usize,
    pub tax_percent: u32,
    pub chart_opens_minutes_before: i64,
    pub chart_closes_minutes_before: i64,
    pub chart_poll_seconds: u64,
    /// Railway local time offset; IST by default.
    pub utc_offset_minutes: i32,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 3_000,
            max_passengers: 6,
            tatkal_max_passengers: 4,
            tax_percent: 18,
            chart_opens_minutes_before: 255,
            chart_closes_minutes_before: 225,
            chart_poll_seconds: 60,
            utc_offset_minutes: 330,
        }
    }
}

/// Demo data for the in-memory mode.
#[derive(Debug, Deserialize, Clone)]
pub struct SeedConfig {
    /// JSON file holding trains and per-class inventory templates.
    pub file: String,
    /// Runs are provisioned from today for this many days.
    #[serde(default = "default_days_ahead")]
    pub days_ahead: u32,
}

fn default_days_ahead() -> u32 {
    30
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in.
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `BERTH__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("BERTH").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    pub fn pricing(&self) -> PricingConfig {
        PricingConfig {
            tax_percent: self.booking.tax_percent,
            ..PricingConfig::default()
        }
    }

    pub fn refund_policy(&self) -> Result<RefundPolicy, PolicyError> {
        if self.refund_tiers.is_empty() {
            return Ok(RefundPolicy::standard());
        }
        RefundPolicy::new(self.refund_tiers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::{CoachClass, Quota};

    const SAMPLE: &str = r#"
        [server]
        port = 8080

        [booking]
        lock_timeout_ms = 1500

        [[fares]]
        coach_class = "SL"
        quota = "GN"
        rate_paise_per_km = 50
        addon_paise = 2000

        [[refund_tiers]]
        from_hours = 0
        to_hours = 24
        charge_percent = 50

        [[refund_tiers]]
        from_hours = 24
        charge_percent = 20
    "#;

    #[test]
    fn test_layered_defaults_fill_gaps() {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(SAMPLE, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(config.database.is_none());
        assert_eq!(config.booking.lock_timeout_ms, 1500);
        assert_eq!(config.booking.max_passengers, 6);
        assert_eq!(config.fares[0].coach_class, CoachClass::Sleeper);
        assert_eq!(config.fares[0].quota, Quota::General);
        assert_eq!(config.pricing().tax_percent, 18);

        let refunds = config.refund_policy().unwrap();
        assert_eq!(refunds.assess(Quota::General, 30 * 60).unwrap().charge_percent, 20);
    }
}
