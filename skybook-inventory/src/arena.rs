use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skybook_core::Flight;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::inventory::{
    ClaimToken, InventoryError, InventoryResult, OccupiedSeat, SeatClaim, SeatInventory, StaleHold,
};
use crate::seat_map::SeatMap;

#[derive(Debug)]
enum Slot {
    Open(SeatClaim),
    /// Seat removed by a shrink. Snapshots taken before the shrink still see
    /// this cell and must treat it as not found.
    Retired,
}

#[derive(Debug)]
struct SeatCell {
    slot: Mutex<Slot>,
}

impl SeatCell {
    fn free() -> Arc<Self> {
        Arc::new(Self { slot: Mutex::new(Slot::Open(SeatClaim::Free)) })
    }

    /// Replace the claim iff `update` accepts the current one. The lock is
    /// held only for the comparison and the write.
    fn compare_and_swap<F>(&self, update: F) -> Result<SeatClaim, Option<SeatClaim>>
    where
        F: FnOnce(&SeatClaim) -> Option<SeatClaim>,
    {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match &*slot {
            Slot::Retired => Err(None),
            Slot::Open(current) => match update(current) {
                Some(next) => {
                    *slot = Slot::Open(next.clone());
                    Ok(next)
                }
                None => Err(Some(current.clone())),
            },
        }
    }

    fn load(&self) -> Option<SeatClaim> {
        match &*self.slot.lock().unwrap_or_else(PoisonError::into_inner) {
            Slot::Open(claim) => Some(claim.clone()),
            Slot::Retired => None,
        }
    }

    fn retire_if_free(&self) -> Result<(), SeatClaim> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match &*slot {
            Slot::Open(SeatClaim::Free) | Slot::Retired => {
                *slot = Slot::Retired;
                Ok(())
            }
            Slot::Open(claim) => Err(claim.clone()),
        }
    }

    fn reopen(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Slot::Open(SeatClaim::Free);
    }
}

#[derive(Debug)]
struct FlightSeats {
    map: SeatMap,
    cells: Vec<Arc<SeatCell>>,
}

impl FlightSeats {
    fn new(map: SeatMap) -> Self {
        Self {
            map,
            cells: (0..map.capacity()).map(|_| SeatCell::free()).collect(),
        }
    }

    fn cell(&self, flight_id: Uuid, seat: &str) -> InventoryResult<&Arc<SeatCell>> {
        self.map
            .index_of(seat)
            .and_then(|i| self.cells.get(i as usize))
            .ok_or_else(|| InventoryError::SeatNotFound { flight_id, seat: seat.to_string() })
    }
}

/// Seat inventory held in process: one cell per (flight, seat), each updated
/// by compare-and-swap. The flight registry lock is only taken to look up or
/// replace a flight's cell vector, never while a cell is being mutated.
#[derive(Default)]
pub struct MemorySeatInventory {
    flights: RwLock<HashMap<Uuid, Arc<FlightSeats>>>,
}

impl MemorySeatInventory {
    pub fn new() -> Self {
        Self::default()
    }

    fn seats(&self, flight_id: Uuid) -> InventoryResult<Arc<FlightSeats>> {
        self.flights
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&flight_id)
            .cloned()
            .ok_or(InventoryError::FlightNotFound(flight_id))
    }

    fn resize_locked(
        registry: &mut HashMap<Uuid, Arc<FlightSeats>>,
        flight_id: Uuid,
        total_seats: u32,
    ) -> InventoryResult<()> {
        let current = registry
            .get(&flight_id)
            .cloned()
            .ok_or(InventoryError::FlightNotFound(flight_id))?;
        let old_capacity = current.map.capacity();
        if total_seats == old_capacity {
            return Ok(());
        }

        let map = current.map.with_capacity(total_seats);
        let keep = total_seats.min(old_capacity) as usize;
        let mut cells: Vec<Arc<SeatCell>> = current.cells[..keep].to_vec();

        if total_seats < old_capacity {
            let removed = &current.cells[keep..];
            for (offset, cell) in removed.iter().enumerate() {
                if cell.retire_if_free().is_err() {
                    removed[..offset].iter().for_each(|c| c.reopen());
                    let seat = current.map.label((keep + offset) as u32).unwrap_or_default();
                    warn!(%flight_id, %seat, requested = total_seats, "Capacity edit rejected, seat is claimed");
                    return Err(InventoryError::CapacityBelowClaims {
                        flight_id,
                        requested: total_seats,
                        seat,
                    });
                }
            }
        } else {
            cells.extend((old_capacity..total_seats).map(|_| SeatCell::free()));
        }

        info!(%flight_id, from = old_capacity, to = total_seats, "Resized seat inventory");
        registry.insert(flight_id, Arc::new(FlightSeats { map, cells }));
        Ok(())
    }
}

#[async_trait]
impl SeatInventory for MemorySeatInventory {
    async fn provision(&self, flight: &Flight) -> InventoryResult<()> {
        let map = SeatMap::for_flight(flight)?;
        {
            let registry = self.flights.read().unwrap_or_else(PoisonError::into_inner);
            if registry.get(&flight.id).is_some_and(|existing| existing.map == map) {
                return Ok(());
            }
        }

        let mut registry = self.flights.write().unwrap_or_else(PoisonError::into_inner);

        match registry.get(&flight.id) {
            None => {
                debug!(flight_id = %flight.id, seats = map.capacity(), "Provisioned seat inventory");
                registry.insert(flight.id, Arc::new(FlightSeats::new(map)));
                Ok(())
            }
            Some(existing) if existing.map.seats_per_row() != map.seats_per_row() => {
                Err(InventoryError::InvalidLayout(format!(
                    "flight {} already uses {} seats per row",
                    flight.id,
                    existing.map.seats_per_row()
                )))
            }
            Some(_) => Self::resize_locked(&mut registry, flight.id, map.capacity()),
        }
    }

    async fn resize(&self, flight_id: Uuid, total_seats: u32) -> InventoryResult<()> {
        let mut registry = self.flights.write().unwrap_or_else(PoisonError::into_inner);
        Self::resize_locked(&mut registry, flight_id, total_seats)
    }

    async fn claim(
        &self,
        flight_id: Uuid,
        seat: &str,
        booking_id: Uuid,
        deadline: DateTime<Utc>,
    ) -> InventoryResult<ClaimToken> {
        let seats = self.seats(flight_id)?;
        let cell = seats.cell(flight_id, seat)?;
        let token = ClaimToken::new();

        match cell.compare_and_swap(|current| {
            current.is_free().then_some(SeatClaim::Held { booking_id, token, deadline })
        }) {
            Ok(_) => Ok(token),
            Err(Some(_)) => Err(InventoryError::Conflict { flight_id, seat: seat.to_string() }),
            Err(None) => Err(InventoryError::SeatNotFound { flight_id, seat: seat.to_string() }),
        }
    }

    async fn confirm(&self, flight_id: Uuid, seat: &str, token: ClaimToken) -> InventoryResult<()> {
        let seats = self.seats(flight_id)?;
        let cell = seats.cell(flight_id, seat)?;

        let result = cell.compare_and_swap(|current| match current {
            SeatClaim::Held { booking_id, token: held, .. } if *held == token => Some(SeatClaim::Confirmed {
                booking_id: *booking_id,
                token,
            }),
            SeatClaim::Confirmed { token: held, .. } if *held == token => Some(current.clone()),
            _ => None,
        });
        result
            .map(|_| ())
            .map_err(|_| InventoryError::ClaimMismatch { flight_id, seat: seat.to_string() })
    }

    async fn release(&self, flight_id: Uuid, seat: &str, token: ClaimToken) -> InventoryResult<()> {
        let seats = self.seats(flight_id)?;
        let cell = seats.cell(flight_id, seat)?;

        let result = cell.compare_and_swap(|current| {
            (current.token() == Some(token)).then_some(SeatClaim::Free)
        });
        result
            .map(|_| ())
            .map_err(|_| InventoryError::ClaimMismatch { flight_id, seat: seat.to_string() })
    }

    async fn claim_state(&self, flight_id: Uuid, seat: &str) -> InventoryResult<SeatClaim> {
        let seats = self.seats(flight_id)?;
        seats
            .cell(flight_id, seat)?
            .load()
            .ok_or_else(|| InventoryError::SeatNotFound { flight_id, seat: seat.to_string() })
    }

    async fn occupied(&self, flight_id: Uuid) -> InventoryResult<Vec<OccupiedSeat>> {
        let seats = self.seats(flight_id)?;
        Ok(seats
            .cells
            .iter()
            .enumerate()
            .filter_map(|(i, cell)| {
                let claim = cell.load().filter(|c| !c.is_free())?;
                Some(OccupiedSeat { seat_number: seats.map.label(i as u32)?, claim })
            })
            .collect())
    }

    async fn held_before(&self, cutoff: DateTime<Utc>) -> InventoryResult<Vec<StaleHold>> {
        let snapshot: Vec<(Uuid, Arc<FlightSeats>)> = self
            .flights
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, seats)| (*id, Arc::clone(seats)))
            .collect();

        let mut stale = Vec::new();
        for (flight_id, seats) in snapshot {
            for (i, cell) in seats.cells.iter().enumerate() {
                if let Some(SeatClaim::Held { booking_id, token, deadline }) = cell.load() {
                    if deadline < cutoff {
                        stale.push(StaleHold {
                            flight_id,
                            seat_number: seats.map.label(i as u32).unwrap_or_default(),
                            booking_id,
                            token,
                            deadline,
                        });
                    }
                }
            }
        }
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn flight(seats: u32) -> Flight {
        Flight::new("SB100", seats, 15_000, "USD").with_seats_per_row(1)
    }

    async fn provisioned(seats: u32) -> (Arc<MemorySeatInventory>, Flight) {
        let inventory = Arc::new(MemorySeatInventory::new());
        let flight = flight(seats);
        inventory.provision(&flight).await.unwrap();
        (inventory, flight)
    }

    fn deadline() -> DateTime<Utc> {
        Utc::now() + Duration::minutes(10)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_have_one_winner() {
        let (inventory, flight) = provisioned(20).await;

        let mut handles = Vec::new();
        for _ in 0..32 {
            let inventory = Arc::clone(&inventory);
            let flight_id = flight.id;
            handles.push(tokio::spawn(async move {
                inventory.claim(flight_id, "12A", Uuid::new_v4(), deadline()).await
            }));
        }

        let mut winners = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(InventoryError::Conflict { .. }) => conflicts += 1,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(conflicts, 31);
    }

    #[tokio::test]
    async fn test_unknown_flight_and_seat_are_not_found() {
        let (inventory, flight) = provisioned(20).await;

        let missing_flight = inventory.claim(Uuid::new_v4(), "1A", Uuid::new_v4(), deadline()).await;
        assert!(matches!(missing_flight, Err(InventoryError::FlightNotFound(_))));

        let missing_seat = inventory.claim(flight.id, "21A", Uuid::new_v4(), deadline()).await;
        assert!(matches!(missing_seat, Err(InventoryError::SeatNotFound { .. })));
    }

    #[tokio::test]
    async fn test_confirm_and_release_require_the_token() {
        let (inventory, flight) = provisioned(20).await;
        let booking_id = Uuid::new_v4();
        let token = inventory.claim(flight.id, "3A", booking_id, deadline()).await.unwrap();

        let stranger = ClaimToken::new();
        assert!(matches!(
            inventory.release(flight.id, "3A", stranger).await,
            Err(InventoryError::ClaimMismatch { .. })
        ));

        inventory.confirm(flight.id, "3A", token).await.unwrap();
        inventory.confirm(flight.id, "3A", token).await.unwrap();
        assert_eq!(
            inventory.claim_state(flight.id, "3A").await.unwrap(),
            SeatClaim::Confirmed { booking_id, token }
        );

        inventory.release(flight.id, "3A", token).await.unwrap();
        assert!(inventory.claim_state(flight.id, "3A").await.unwrap().is_free());
        assert!(inventory.release(flight.id, "3A", token).await.is_err());
    }

    #[tokio::test]
    async fn test_shrink_rejected_below_claimed_seat() {
        let (inventory, flight) = provisioned(20).await;
        let token = inventory.claim(flight.id, "18A", Uuid::new_v4(), deadline()).await.unwrap();

        let err = inventory.resize(flight.id, 10).await.unwrap_err();
        assert!(matches!(err, InventoryError::CapacityBelowClaims { ref seat, .. } if seat == "18A"));
        // Rejected shrink leaves every seat usable.
        inventory.claim(flight.id, "12A", Uuid::new_v4(), deadline()).await.unwrap();

        inventory.release(flight.id, "18A", token).await.unwrap();
        inventory.resize(flight.id, 15).await.unwrap();
        assert!(matches!(
            inventory.claim_state(flight.id, "18A").await,
            Err(InventoryError::SeatNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_grow_keeps_existing_claims() {
        let (inventory, flight) = provisioned(2).await;
        let booking_id = Uuid::new_v4();
        inventory.claim(flight.id, "1A", booking_id, deadline()).await.unwrap();

        let mut bigger = flight.clone();
        bigger.total_seats = 4;
        inventory.provision(&bigger).await.unwrap();

        let occupied = inventory.occupied(flight.id).await.unwrap();
        assert_eq!(occupied.len(), 1);
        assert_eq!(occupied[0].seat_number, "1A");
        assert_eq!(occupied[0].claim.booking_id(), Some(booking_id));
        inventory.claim(flight.id, "4A", Uuid::new_v4(), deadline()).await.unwrap();
    }

    #[tokio::test]
    async fn test_layout_change_rejected() {
        let (inventory, flight) = provisioned(12).await;
        let relaid = flight.clone().with_seats_per_row(6);
        assert!(matches!(
            inventory.provision(&relaid).await,
            Err(InventoryError::InvalidLayout(_))
        ));
    }

    #[tokio::test]
    async fn test_held_before_lists_only_lapsed_holds() {
        let (inventory, flight) = provisioned(5).await;
        let now = Utc::now();
        let lapsed = Uuid::new_v4();
        inventory.claim(flight.id, "1A", lapsed, now - Duration::seconds(1)).await.unwrap();
        inventory.claim(flight.id, "2A", Uuid::new_v4(), now + Duration::seconds(60)).await.unwrap();
        let confirmed = inventory
            .claim(flight.id, "3A", Uuid::new_v4(), now - Duration::seconds(1))
            .await
            .unwrap();
        inventory.confirm(flight.id, "3A", confirmed).await.unwrap();

        let stale = inventory.held_before(now).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].booking_id, lapsed);
        assert_eq!(stale[0].seat_number, "1A");
    }
}
