pub mod arena;
pub mod inventory;
pub mod seat_map;

pub use arena::MemorySeatInventory;
pub use inventory::{
    ClaimToken, InventoryError, InventoryResult, OccupiedSeat, SeatClaim, SeatInventory, StaleHold,
};
pub use seat_map::SeatMap;
