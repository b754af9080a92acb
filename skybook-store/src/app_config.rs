use serde::Deserialize;
use skybook_core::Flight;
use skybook_saga::SagaPolicy;
use std::env;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub saga: SagaSettings,
    #[serde(default)]
    pub inventory: InventoryConfig,
    pub redis: Option<RedisConfig>,
    pub database: Option<DatabaseConfig>,
    pub kafka: Option<KafkaConfig>,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

/// Saga timing, in plain units so it reads well in TOML and env vars.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SagaSettings {
    pub hold_ttl_seconds: u64,
    pub sweep_interval_ms: u64,
    pub gateway_timeout_ms: u64,
    pub submit_retries: u32,
    pub retry_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
    pub unresolved_alert_seconds: u64,
}

impl Default for SagaSettings {
    fn default() -> Self {
        Self {
            hold_ttl_seconds: 600,
            sweep_interval_ms: 5_000,
            gateway_timeout_ms: 10_000,
            submit_retries: 2,
            retry_backoff_ms: 200,
            max_backoff_ms: 2_000,
            poll_attempts: 3,
            poll_interval_ms: 500,
            unresolved_alert_seconds: 900,
        }
    }
}

impl SagaSettings {
    pub fn policy(&self) -> SagaPolicy {
        SagaPolicy {
            hold_ttl: chrono::Duration::seconds(self.hold_ttl_seconds as i64),
            gateway_timeout: Duration::from_millis(self.gateway_timeout_ms),
            submit_retries: self.submit_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            poll_attempts: self.poll_attempts,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            unresolved_alert_after: chrono::Duration::seconds(self.unresolved_alert_seconds as i64),
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InventoryBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InventoryConfig {
    pub backend: InventoryBackend,
    pub seats_per_row: u32,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            backend: InventoryBackend::Memory,
            seats_per_row: 6,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_topic")]
    pub topic: String,
}

fn default_topic() -> String {
    "skybook.booking-events".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CatalogConfig {
    #[serde(default)]
    pub flights: Vec<FlightSeed>,
}

/// A flight as listed under `[[catalog.flights]]`.
#[derive(Debug, Deserialize, Clone)]
pub struct FlightSeed {
    pub id: Uuid,
    pub flight_number: String,
    pub total_seats: u32,
    pub seats_per_row: Option<u32>,
    pub fare_cents: i64,
    pub currency: String,
}

impl FlightSeed {
    pub fn into_flight(self, default_seats_per_row: u32) -> Flight {
        Flight {
            id: self.id,
            flight_number: self.flight_number,
            total_seats: self.total_seats,
            seats_per_row: self.seats_per_row.unwrap_or(default_seats_per_row),
            fare_cents: self.fare_cents,
            currency: self.currency,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Developer overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `SKYBOOK__SAGA__HOLD_TTL_SECONDS=30`
            .add_source(config::Environment::with_prefix("SKYBOOK").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    pub fn flights(&self) -> Vec<Flight> {
        self.catalog
            .flights
            .iter()
            .cloned()
            .map(|seed| seed.into_flight(self.inventory.seats_per_row))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [server]
        port = 8080

        [auth]
        jwt_secret = "dev-secret"
        jwt_expiration_seconds = 3600

        [saga]
        hold_ttl_seconds = 5

        [inventory]
        seats_per_row = 1

        [[catalog.flights]]
        id = "6f1c1f3e-8d1a-4d55-9a64-4f7d3c2b1a00"
        flight_number = "SB100"
        total_seats = 20
        fare_cents = 15000
        currency = "USD"
    "#;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = Config::from_toml(SAMPLE).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.inventory.backend, InventoryBackend::Memory);
        assert!(config.redis.is_none());
        assert!(config.kafka.is_none());

        let policy = config.saga.policy();
        assert_eq!(policy.hold_ttl, chrono::Duration::seconds(5));
        assert_eq!(policy.poll_attempts, 3);
    }

    #[test]
    fn test_flights_use_default_layout() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let flights = config.flights();

        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].seats_per_row, 1);
        assert_eq!(flights[0].total_seats, 20);
    }
}
