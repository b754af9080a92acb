use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

fn default_seats_per_row() -> u32 {
    6
}

/// A published flight as the catalog knows it. Seat labels are derived from
/// `total_seats` and `seats_per_row`, never stored one by one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Flight {
    pub id: Uuid,
    pub flight_number: String,
    pub total_seats: u32,
    #[serde(default = "default_seats_per_row")]
    pub seats_per_row: u32,
    pub fare_cents: i64,
    pub currency: String,
}

impl Flight {
    pub fn new(flight_number: &str, total_seats: u32, fare_cents: i64, currency: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            flight_number: flight_number.to_string(),
            total_seats,
            seats_per_row: default_seats_per_row(),
            fare_cents,
            currency: currency.to_string(),
        }
    }

    pub fn with_seats_per_row(mut self, seats_per_row: u32) -> Self {
        self.seats_per_row = seats_per_row;
        self
    }
}

/// Read side of the flight catalog owned by the (external) admin service.
#[async_trait]
pub trait FlightCatalog: Send + Sync {
    async fn flight(&self, id: Uuid) -> CoreResult<Option<Flight>>;

    async fn flights(&self) -> CoreResult<Vec<Flight>>;

    /// Record a capacity edit. Callers must have cleared it with the seat inventory first.
    async fn update_capacity(&self, id: Uuid, total_seats: u32) -> CoreResult<Flight>;
}

/// Catalog held in memory, seeded from configuration.
#[derive(Default)]
pub struct StaticCatalog {
    flights: RwLock<HashMap<Uuid, Flight>>,
}

impl StaticCatalog {
    pub fn new(flights: impl IntoIterator<Item = Flight>) -> Self {
        Self {
            flights: RwLock::new(flights.into_iter().map(|f| (f.id, f)).collect()),
        }
    }

    pub async fn insert(&self, flight: Flight) {
        self.flights.write().await.insert(flight.id, flight);
    }
}

#[async_trait]
impl FlightCatalog for StaticCatalog {
    async fn flight(&self, id: Uuid) -> CoreResult<Option<Flight>> {
        Ok(self.flights.read().await.get(&id).cloned())
    }

    async fn flights(&self) -> CoreResult<Vec<Flight>> {
        let mut flights: Vec<Flight> = self.flights.read().await.values().cloned().collect();
        flights.sort_by(|a, b| a.flight_number.cmp(&b.flight_number));
        Ok(flights)
    }

    async fn update_capacity(&self, id: Uuid, total_seats: u32) -> CoreResult<Flight> {
        let mut flights = self.flights.write().await;
        let flight = flights
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("flight {}", id)))?;
        flight.total_seats = total_seats;
        Ok(flight.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_catalog_lookup_and_capacity_edit() {
        let flight = Flight::new("SB100", 20, 15_000, "USD");
        let id = flight.id;
        let catalog = StaticCatalog::new(vec![flight]);

        assert_eq!(catalog.flight(id).await.unwrap().unwrap().total_seats, 20);
        assert!(catalog.flight(Uuid::new_v4()).await.unwrap().is_none());

        let updated = catalog.update_capacity(id, 24).await.unwrap();
        assert_eq!(updated.total_seats, 24);
        assert!(catalog.update_capacity(Uuid::new_v4(), 1).await.is_err());
    }

    #[test]
    fn test_seats_per_row_defaults_to_six() {
        let json = serde_json::json!({
            "id": Uuid::nil(),
            "flight_number": "SB7",
            "total_seats": 12,
            "fare_cents": 9900,
            "currency": "EUR"
        });
        let flight: Flight = serde_json::from_value(json).unwrap();
        assert_eq!(flight.seats_per_row, 6);
    }
}
