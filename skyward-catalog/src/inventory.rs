use skyward_core::flight::{Flight, SeatClass};
use skyward_core::CoreError;

/// Per-class seat counter arithmetic for a flight.
///
/// Counters move only on booking confirmation (reserve) and cancellation (restore)
/// and stay within `0..=capacity`.
pub struct SeatInventory;

impl SeatInventory {
    /// Take `quantity` seats of `class` off the sellable counter
    pub fn reserve(flight: &mut Flight, class: SeatClass, quantity: i32) -> Result<(), InventoryError> {
        let available = flight.available.get(class);
        if available < quantity {
            return Err(InventoryError::InsufficientInventory {
                flight: flight.flight_number.clone(),
                class,
                requested: quantity,
                available,
            });
        }

        *flight.available.get_mut(class) -= quantity;
        Ok(())
    }

    /// Put `quantity` seats back on the counter (booking cancelled)
    pub fn restore(flight: &mut Flight, class: SeatClass, quantity: i32) -> Result<(), InventoryError> {
        let available = flight.available.get(class);
        let capacity = flight.capacity.get(class);
        if available + quantity > capacity {
            return Err(InventoryError::OverCapacity {
                flight: flight.flight_number.clone(),
                class,
                capacity,
                resulting: available + quantity,
            });
        }

        *flight.available.get_mut(class) += quantity;
        Ok(())
    }

    /// Sold share of a class, 0.0 to 1.0
    pub fn utilization(flight: &Flight, class: SeatClass) -> f64 {
        let capacity = flight.capacity.get(class);
        if capacity == 0 {
            0.0
        } else {
            1.0 - (flight.available.get(class) as f64 / capacity as f64)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Not enough {class} seats on {flight}: requested {requested}, available {available}")]
    InsufficientInventory {
        flight: String,
        class: SeatClass,
        requested: i32,
        available: i32,
    },

    #[error("Restoring {class} seats on {flight} would exceed capacity {capacity} (got {resulting})")]
    OverCapacity {
        flight: String,
        class: SeatClass,
        capacity: i32,
        resulting: i32,
    },
}

impl From<InventoryError> for CoreError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::InsufficientInventory { .. } => CoreError::Conflict(err.to_string()),
            InventoryError::OverCapacity { .. } => CoreError::InternalError(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use skyward_core::flight::{ClassCounts, FlightStatus};
    use uuid::Uuid;

    fn flight() -> Flight {
        Flight {
            id: Uuid::new_v4(),
            flight_number: "SW202".to_string(),
            origin: "KUL".to_string(),
            destination: "MNL".to_string(),
            departure_time: Utc::now(),
            arrival_time: Utc::now(),
            status: FlightStatus::Scheduled,
            economy_price: Decimal::new(10000, 2),
            business_price: Decimal::new(40000, 2),
            first_class_price: Decimal::new(90000, 2),
            capacity: ClassCounts::new(100, 12, 4),
            available: ClassCounts::new(100, 12, 4),
        }
    }

    #[test]
    fn test_reserve_then_restore_round_trip() {
        let mut flight = flight();

        SeatInventory::reserve(&mut flight, SeatClass::Economy, 10).unwrap();
        assert_eq!(flight.available_seats(SeatClass::Economy), 90);
        assert_eq!(flight.available_seats(SeatClass::Business), 12);

        let utilization = SeatInventory::utilization(&flight, SeatClass::Economy);
        assert!((utilization - 0.1).abs() < 0.01);

        SeatInventory::restore(&mut flight, SeatClass::Economy, 10).unwrap();
        assert_eq!(flight.available_seats(SeatClass::Economy), 100);
    }

    #[test]
    fn test_reserve_never_goes_negative() {
        let mut flight = flight();

        let err = SeatInventory::reserve(&mut flight, SeatClass::First, 5).unwrap_err();
        assert!(matches!(err, InventoryError::InsufficientInventory { available: 4, .. }));
        assert_eq!(flight.available_seats(SeatClass::First), 4);
        assert!(CoreError::from(err).is_conflict());
    }

    #[test]
    fn test_restore_is_capped_by_capacity() {
        let mut flight = flight();
        assert!(SeatInventory::restore(&mut flight, SeatClass::Business, 1).is_err());
    }
}
