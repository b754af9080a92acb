use skybook_core::Flight;

use crate::inventory::InventoryError;

const MAX_SEATS_PER_ROW: u32 = 26;

/// Maps seat labels ("1A", "12C") to dense indexes and back. Seats are laid out
/// row by row, `seats_per_row` letters per row, until `capacity` labels exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatMap {
    capacity: u32,
    seats_per_row: u32,
}

impl SeatMap {
    pub fn new(capacity: u32, seats_per_row: u32) -> Result<Self, InventoryError> {
        if seats_per_row == 0 || seats_per_row > MAX_SEATS_PER_ROW {
            return Err(InventoryError::InvalidLayout(format!(
                "seats_per_row must be between 1 and {}, got {}",
                MAX_SEATS_PER_ROW, seats_per_row
            )));
        }
        Ok(Self { capacity, seats_per_row })
    }

    pub fn for_flight(flight: &Flight) -> Result<Self, InventoryError> {
        Self::new(flight.total_seats, flight.seats_per_row)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn seats_per_row(&self) -> u32 {
        self.seats_per_row
    }

    pub fn with_capacity(&self, capacity: u32) -> Self {
        Self { capacity, seats_per_row: self.seats_per_row }
    }

    pub fn label(&self, index: u32) -> Option<String> {
        if index >= self.capacity {
            return None;
        }
        let row = index / self.seats_per_row + 1;
        let letter = (b'A' + (index % self.seats_per_row) as u8) as char;
        Some(format!("{}{}", row, letter))
    }

    /// Strict parse: canonical labels only (no leading zeros, uppercase letter),
    /// so every seat has exactly one spelling.
    pub fn index_of(&self, label: &str) -> Option<u32> {
        let letter = label.chars().last()?;
        if !letter.is_ascii_uppercase() {
            return None;
        }
        let row_part = &label[..label.len() - 1];
        if row_part.is_empty() || row_part.starts_with('0') || !row_part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let row: u32 = row_part.parse().ok()?;
        let column = letter as u32 - 'A' as u32;
        if column >= self.seats_per_row {
            return None;
        }
        let index = (row - 1).checked_mul(self.seats_per_row)?.checked_add(column)?;
        (index < self.capacity).then_some(index)
    }

    pub fn labels(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.capacity).filter_map(move |i| self.label(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_fill_rows() {
        let map = SeatMap::new(8, 6).unwrap();
        let labels: Vec<String> = map.labels().collect();
        assert_eq!(labels, vec!["1A", "1B", "1C", "1D", "1E", "1F", "2A", "2B"]);
    }

    #[test]
    fn test_index_round_trip_and_bounds() {
        let map = SeatMap::new(20, 6).unwrap();
        assert_eq!(map.index_of("1A"), Some(0));
        assert_eq!(map.index_of("4B"), Some(19));
        assert_eq!(map.index_of("4C"), None);
        assert_eq!(map.index_of("1G"), None);
        assert_eq!(map.label(19).as_deref(), Some("4B"));
    }

    #[test]
    fn test_rejects_non_canonical_labels() {
        let map = SeatMap::new(20, 1).unwrap();
        assert_eq!(map.index_of("12A"), Some(11));
        assert_eq!(map.index_of("012A"), None);
        assert_eq!(map.index_of("12a"), None);
        assert_eq!(map.index_of("A"), None);
        assert_eq!(map.index_of("0A"), None);
        assert_eq!(map.index_of(""), None);
    }

    #[test]
    fn test_invalid_layout() {
        assert!(SeatMap::new(10, 0).is_err());
        assert!(SeatMap::new(10, 27).is_err());
    }
}
