pub mod app_config;
#[cfg(feature = "postgres")]
pub mod database;
pub mod events;
pub mod redis_repo;

pub use app_config::Config;
#[cfg(feature = "postgres")]
pub use database::{DbClient, PgBookingStore};
#[cfg(feature = "kafka")]
pub use events::KafkaEventSink;
pub use events::{BroadcastEventSink, FanoutEventSink, LogEventSink};
pub use redis_repo::RedisSeatInventory;

/// Failures while wiring up a backing service at startup.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "postgres")]
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[cfg(feature = "kafka")]
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Missing configuration: {0}")]
    Missing(&'static str),
}
