use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use skybook_core::Flight;
use skybook_inventory::{
    ClaimToken, InventoryError, InventoryResult, OccupiedSeat, SeatClaim, SeatInventory, SeatMap, StaleHold,
};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

const FLIGHTS_KEY: &str = "skybook:flights";

fn layout_key(flight_id: Uuid) -> String {
    format!("flight:{}:layout", flight_id)
}

fn claimed_key(flight_id: Uuid) -> String {
    format!("flight:{}:claimed", flight_id)
}

fn seat_key(flight_id: Uuid, seat: &str) -> String {
    format!("seat:{}:{}", flight_id, seat)
}

fn backend(err: redis::RedisError) -> InventoryError {
    InventoryError::Backend(err.to_string())
}

/// Cell encoding: `HELD|booking|token|deadline_ms` or `CONFIRMED|booking|token`.
fn encode(claim: &SeatClaim) -> Option<String> {
    match claim {
        SeatClaim::Free => None,
        SeatClaim::Held { booking_id, token, deadline } => Some(format!(
            "HELD|{}|{}|{}",
            booking_id,
            token,
            deadline.timestamp_millis()
        )),
        SeatClaim::Confirmed { booking_id, token } => Some(format!("CONFIRMED|{}|{}", booking_id, token)),
    }
}

fn decode(value: &str) -> Option<SeatClaim> {
    let mut parts = value.split('|');
    let state = parts.next()?;
    let booking_id = Uuid::parse_str(parts.next()?).ok()?;
    let token = ClaimToken::from_uuid(Uuid::parse_str(parts.next()?).ok()?);
    match state {
        "HELD" => {
            let millis: i64 = parts.next()?.parse().ok()?;
            Some(SeatClaim::Held {
                booking_id,
                token,
                deadline: DateTime::from_timestamp_millis(millis)?,
            })
        }
        "CONFIRMED" => Some(SeatClaim::Confirmed { booking_id, token }),
        _ => None,
    }
}

// KEYS: layout, seat, claimed set. ARGV: seat index, encoded claim, seat label.
const CLAIM_LUA: &str = r#"
    local capacity = redis.call("HGET", KEYS[1], "capacity")
    if not capacity then
        return -2
    end
    if tonumber(ARGV[1]) >= tonumber(capacity) then
        return -3
    end
    if not redis.call("SET", KEYS[2], ARGV[2], "NX") then
        return 0
    end
    redis.call("SADD", KEYS[3], ARGV[3])
    return 1
"#;

// KEYS: seat. ARGV: token.
const CONFIRM_LUA: &str = r#"
    local value = redis.call("GET", KEYS[1])
    if not value then
        return 0
    end
    local state, booking, token = string.match(value, "^(%u+)|([^|]+)|([^|]+)")
    if token ~= ARGV[1] then
        return 0
    end
    if state ~= "CONFIRMED" then
        redis.call("SET", KEYS[1], "CONFIRMED|" .. booking .. "|" .. token)
    end
    return 1
"#;

// KEYS: seat, claimed set. ARGV: token, seat label.
const RELEASE_LUA: &str = r#"
    local value = redis.call("GET", KEYS[1])
    if not value then
        return 0
    end
    local token = string.match(value, "^%u+|[^|]+|([^|]+)")
    if token ~= ARGV[1] then
        return 0
    end
    redis.call("DEL", KEYS[1])
    redis.call("SREM", KEYS[2], ARGV[2])
    return 1
"#;

// KEYS: layout, flights set. ARGV: capacity, seats per row, flight id.
const PROVISION_LUA: &str = r#"
    if redis.call("EXISTS", KEYS[1]) == 1 then
        return 0
    end
    redis.call("HSET", KEYS[1], "capacity", ARGV[1], "seats_per_row", ARGV[2])
    redis.call("SADD", KEYS[2], ARGV[3])
    return 1
"#;

// KEYS: layout, claimed set. ARGV: new capacity, labels of removed seats...
const RESIZE_LUA: &str = r#"
    if redis.call("EXISTS", KEYS[1]) == 0 then
        return "MISSING"
    end
    for i = 2, #ARGV do
        if redis.call("SISMEMBER", KEYS[2], ARGV[i]) == 1 then
            return "CLAIMED:" .. ARGV[i]
        end
    end
    redis.call("HSET", KEYS[1], "capacity", ARGV[1])
    return "OK"
"#;

/// Seat inventory shared across processes. Each cell is one Redis key; every
/// transition is a single Lua script, so Redis' serial execution gives the
/// per-cell compare-and-set.
#[derive(Clone)]
pub struct RedisSeatInventory {
    client: redis::Client,
    provision_script: redis::Script,
    claim_script: redis::Script,
    confirm_script: redis::Script,
    release_script: redis::Script,
    resize_script: redis::Script,
}

impl RedisSeatInventory {
    pub fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self {
            client,
            provision_script: redis::Script::new(PROVISION_LUA),
            claim_script: redis::Script::new(CLAIM_LUA),
            confirm_script: redis::Script::new(CONFIRM_LUA),
            release_script: redis::Script::new(RELEASE_LUA),
            resize_script: redis::Script::new(RESIZE_LUA),
        })
    }

    async fn connection(&self) -> InventoryResult<redis::aio::MultiplexedConnection> {
        self.client.get_multiplexed_async_connection().await.map_err(backend)
    }

    async fn seat_map(&self, conn: &mut redis::aio::MultiplexedConnection, flight_id: Uuid) -> InventoryResult<SeatMap> {
        let layout: HashMap<String, u32> = conn.hgetall(layout_key(flight_id)).await.map_err(backend)?;
        match (layout.get("capacity"), layout.get("seats_per_row")) {
            (Some(capacity), Some(seats_per_row)) => SeatMap::new(*capacity, *seats_per_row),
            _ => Err(InventoryError::FlightNotFound(flight_id)),
        }
    }

    async fn resolve_seat(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        flight_id: Uuid,
        seat: &str,
    ) -> InventoryResult<u32> {
        self.seat_map(conn, flight_id)
            .await?
            .index_of(seat)
            .ok_or_else(|| InventoryError::SeatNotFound { flight_id, seat: seat.to_string() })
    }
}

#[async_trait]
impl SeatInventory for RedisSeatInventory {
    async fn provision(&self, flight: &Flight) -> InventoryResult<()> {
        let map = SeatMap::for_flight(flight)?;
        let mut conn = self.connection().await?;

        match self.seat_map(&mut conn, flight.id).await {
            Ok(existing) if existing.seats_per_row() != map.seats_per_row() => Err(InventoryError::InvalidLayout(
                format!("flight {} already uses {} seats per row", flight.id, existing.seats_per_row()),
            )),
            Ok(existing) if existing.capacity() == map.capacity() => Ok(()),
            Ok(_) => self.resize(flight.id, map.capacity()).await,
            Err(InventoryError::FlightNotFound(_)) => {
                let created: i64 = self
                    .provision_script
                    .key(layout_key(flight.id))
                    .key(FLIGHTS_KEY)
                    .arg(map.capacity())
                    .arg(map.seats_per_row())
                    .arg(flight.id.to_string())
                    .invoke_async(&mut conn)
                    .await
                    .map_err(backend)?;
                if created == 1 {
                    info!(flight_id = %flight.id, seats = map.capacity(), "Provisioned seat inventory in Redis");
                    Ok(())
                } else {
                    // Another node won the race; reconcile against its layout.
                    self.provision(flight).await
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn resize(&self, flight_id: Uuid, total_seats: u32) -> InventoryResult<()> {
        let mut conn = self.connection().await?;
        let current = self.seat_map(&mut conn, flight_id).await?;
        let removed: Vec<String> = (total_seats..current.capacity())
            .filter_map(|i| current.label(i))
            .collect();

        let mut invocation = self.resize_script.key(layout_key(flight_id));
        invocation.key(claimed_key(flight_id)).arg(total_seats);
        for label in &removed {
            invocation.arg(label);
        }
        let result: String = invocation.invoke_async(&mut conn).await.map_err(backend)?;

        match result.as_str() {
            "OK" => {
                info!(%flight_id, from = current.capacity(), to = total_seats, "Resized seat inventory");
                Ok(())
            }
            "MISSING" => Err(InventoryError::FlightNotFound(flight_id)),
            other => {
                let seat = other.trim_start_matches("CLAIMED:").to_string();
                warn!(%flight_id, %seat, requested = total_seats, "Capacity edit rejected, seat is claimed");
                Err(InventoryError::CapacityBelowClaims { flight_id, requested: total_seats, seat })
            }
        }
    }

    async fn claim(
        &self,
        flight_id: Uuid,
        seat: &str,
        booking_id: Uuid,
        deadline: DateTime<Utc>,
    ) -> InventoryResult<ClaimToken> {
        let mut conn = self.connection().await?;
        let index = self.resolve_seat(&mut conn, flight_id, seat).await?;
        let token = ClaimToken::new();
        let value = encode(&SeatClaim::Held { booking_id, token, deadline }).unwrap_or_default();

        let result: i64 = self
            .claim_script
            .key(layout_key(flight_id))
            .key(seat_key(flight_id, seat))
            .key(claimed_key(flight_id))
            .arg(index)
            .arg(value)
            .arg(seat)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;

        match result {
            1 => Ok(token),
            0 => Err(InventoryError::Conflict { flight_id, seat: seat.to_string() }),
            -2 => Err(InventoryError::FlightNotFound(flight_id)),
            _ => Err(InventoryError::SeatNotFound { flight_id, seat: seat.to_string() }),
        }
    }

    async fn confirm(&self, flight_id: Uuid, seat: &str, token: ClaimToken) -> InventoryResult<()> {
        let mut conn = self.connection().await?;
        let result: i64 = self
            .confirm_script
            .key(seat_key(flight_id, seat))
            .arg(token.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;

        if result == 1 {
            Ok(())
        } else {
            Err(InventoryError::ClaimMismatch { flight_id, seat: seat.to_string() })
        }
    }

    async fn release(&self, flight_id: Uuid, seat: &str, token: ClaimToken) -> InventoryResult<()> {
        let mut conn = self.connection().await?;
        let result: i64 = self
            .release_script
            .key(seat_key(flight_id, seat))
            .key(claimed_key(flight_id))
            .arg(token.to_string())
            .arg(seat)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;

        if result == 1 {
            Ok(())
        } else {
            Err(InventoryError::ClaimMismatch { flight_id, seat: seat.to_string() })
        }
    }

    async fn claim_state(&self, flight_id: Uuid, seat: &str) -> InventoryResult<SeatClaim> {
        let mut conn = self.connection().await?;
        self.resolve_seat(&mut conn, flight_id, seat).await?;
        let value: Option<String> = conn.get(seat_key(flight_id, seat)).await.map_err(backend)?;
        match value {
            None => Ok(SeatClaim::Free),
            Some(raw) => decode(&raw).ok_or_else(|| InventoryError::Backend(format!("corrupt seat cell {}", raw))),
        }
    }

    async fn occupied(&self, flight_id: Uuid) -> InventoryResult<Vec<OccupiedSeat>> {
        let mut conn = self.connection().await?;
        let map = self.seat_map(&mut conn, flight_id).await?;
        let mut labels: Vec<String> = conn.smembers(claimed_key(flight_id)).await.map_err(backend)?;
        labels.sort_by_key(|label| map.index_of(label));
        if labels.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = labels.iter().map(|l| seat_key(flight_id, l)).collect();
        let values: Vec<Option<String>> = redis::cmd("MGET").arg(&keys).query_async(&mut conn).await.map_err(backend)?;

        Ok(labels
            .into_iter()
            .zip(values)
            .filter_map(|(seat_number, value)| {
                let claim = decode(&value?)?;
                Some(OccupiedSeat { seat_number, claim })
            })
            .collect())
    }

    async fn held_before(&self, cutoff: DateTime<Utc>) -> InventoryResult<Vec<StaleHold>> {
        let mut conn = self.connection().await?;
        let flights: Vec<String> = conn.smembers(FLIGHTS_KEY).await.map_err(backend)?;

        let mut stale = Vec::new();
        for raw_id in flights {
            let Ok(flight_id) = Uuid::parse_str(&raw_id) else {
                warn!(flight = %raw_id, "Skipping malformed flight id in Redis");
                continue;
            };
            for seat in self.occupied(flight_id).await? {
                if let SeatClaim::Held { booking_id, token, deadline } = seat.claim {
                    if deadline < cutoff {
                        stale.push(StaleHold {
                            flight_id,
                            seat_number: seat.seat_number,
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

    #[test]
    fn test_cell_encoding() {
        let booking_id = Uuid::new_v4();
        let token = ClaimToken::new();
        let deadline = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();

        let held = SeatClaim::Held { booking_id, token, deadline };
        assert_eq!(decode(&encode(&held).unwrap()), Some(held));

        let confirmed = SeatClaim::Confirmed { booking_id, token };
        assert_eq!(decode(&encode(&confirmed).unwrap()), Some(confirmed));

        assert_eq!(encode(&SeatClaim::Free), None);
        assert_eq!(decode("GARBAGE"), None);
    }

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    #[tokio::test]
    #[ignore = "needs a running Redis"]
    async fn test_claim_conflict_and_release() {
        let inventory = RedisSeatInventory::new(&redis_url()).unwrap();
        let flight = Flight::new("SB900", 20, 10_000, "USD").with_seats_per_row(1);
        inventory.provision(&flight).await.unwrap();
        let deadline = Utc::now() + Duration::minutes(5);

        let token = inventory.claim(flight.id, "12A", Uuid::new_v4(), deadline).await.unwrap();
        assert!(matches!(
            inventory.claim(flight.id, "12A", Uuid::new_v4(), deadline).await,
            Err(InventoryError::Conflict { .. })
        ));
        assert!(matches!(
            inventory.release(flight.id, "12A", ClaimToken::new()).await,
            Err(InventoryError::ClaimMismatch { .. })
        ));

        inventory.confirm(flight.id, "12A", token).await.unwrap();
        assert!(matches!(
            inventory.resize(flight.id, 10).await,
            Err(InventoryError::CapacityBelowClaims { .. })
        ));
        inventory.release(flight.id, "12A", token).await.unwrap();
        assert!(inventory.claim_state(flight.id, "12A").await.unwrap().is_free());
    }
}
