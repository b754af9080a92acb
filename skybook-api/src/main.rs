use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skybook_api::{app, metrics::Metrics, worker, AppState, AuthConfig, Resiliency};
use skybook_core::{Clock, EventSink, FlightCatalog, MockPaymentGateway, StaticCatalog, SystemClock};
use skybook_inventory::{MemorySeatInventory, SeatInventory};
use skybook_ledger::{BookingStore, MemoryBookingStore, ReservationLedger};
use skybook_saga::SagaCoordinator;
use skybook_store::app_config::{Config, InventoryBackend};
use skybook_store::{BroadcastEventSink, FanoutEventSink, LogEventSink, RedisSeatInventory, StoreError};

fn seat_inventory(config: &Config) -> Result<Arc<dyn SeatInventory>, StoreError> {
    match config.inventory.backend {
        InventoryBackend::Memory => Ok(Arc::new(MemorySeatInventory::new())),
        InventoryBackend::Redis => {
            let redis = config.redis.as_ref().ok_or(StoreError::Missing("redis.url"))?;
            info!("Seat inventory backed by Redis");
            Ok(Arc::new(RedisSeatInventory::new(&redis.url)?))
        }
    }
}

#[cfg(feature = "postgres")]
async fn booking_store(config: &Config) -> Result<Arc<dyn BookingStore>, StoreError> {
    match &config.database {
        Some(database) => {
            let db = skybook_store::DbClient::new(&database.url).await?;
            db.migrate().await?;
            info!("Bookings stored in Postgres");
            Ok(Arc::new(skybook_store::PgBookingStore::new(db.pool.clone())))
        }
        None => {
            warn!("No [database] configured, bookings are kept in memory");
            Ok(Arc::new(MemoryBookingStore::new()))
        }
    }
}

#[cfg(not(feature = "postgres"))]
async fn booking_store(config: &Config) -> Result<Arc<dyn BookingStore>, StoreError> {
    if config.database.is_some() {
        warn!("[database] is configured but the `postgres` feature is off, bookings are kept in memory");
    }
    Ok(Arc::new(MemoryBookingStore::new()))
}

#[cfg(feature = "kafka")]
fn kafka_sink(config: &Config) -> Result<Option<Arc<dyn EventSink>>, StoreError> {
    match &config.kafka {
        Some(kafka) => {
            info!(topic = %kafka.topic, "Publishing booking events to Kafka");
            Ok(Some(Arc::new(skybook_store::KafkaEventSink::new(&kafka.brokers, &kafka.topic)?)))
        }
        None => Ok(None),
    }
}

#[cfg(not(feature = "kafka"))]
fn kafka_sink(config: &Config) -> Result<Option<Arc<dyn EventSink>>, StoreError> {
    if config.kafka.is_some() {
        warn!("[kafka] is configured but the `kafka` feature is off");
    }
    Ok(None)
}

fn event_sink(config: &Config, seat_events: &BroadcastEventSink) -> Result<Arc<dyn EventSink>, StoreError> {
    let mut sinks: Vec<Arc<dyn EventSink>> = vec![
        Arc::new(LogEventSink) as Arc<dyn EventSink>,
        Arc::new(seat_events.clone()) as Arc<dyn EventSink>,
    ];
    sinks.extend(kafka_sink(config)?);
    Ok(Arc::new(FanoutEventSink::new(sinks)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skybook_api=debug,skybook_saga=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    info!("Starting SkyBook API on port {}", config.server.port);

    let catalog: Arc<dyn FlightCatalog> = Arc::new(StaticCatalog::new(config.flights()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ledger = Arc::new(ReservationLedger::new(
        seat_inventory(&config)?,
        booking_store(&config).await?,
        clock,
    ));

    let seat_events = BroadcastEventSink::new(256);
    let events = event_sink(&config, &seat_events)?;

    warn!("Using the simulated payment gateway");
    let gateway = Arc::new(MockPaymentGateway::new());

    let coordinator = Arc::new(SagaCoordinator::new(
        catalog,
        ledger,
        gateway,
        events,
        config.saga.policy(),
    ));
    let provisioned = coordinator.provision_catalog().await.context("Failed to provision seat inventory")?;
    info!(flights = provisioned, "Seat inventory ready");

    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);
    let (shutdown_tx, sweeper) = worker::start_expiry_worker(coordinator.clone(), metrics.clone());

    let app_state = AppState {
        coordinator,
        seat_events,
        metrics,
        resiliency: Arc::new(Resiliency::default()),
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(app_state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = sweeper.await;
    Ok(())
}
