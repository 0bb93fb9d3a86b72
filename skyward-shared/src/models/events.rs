use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeatEventKind {
    Assigned,
    Released,
}

/// Seat map change pushed to listeners of a flight.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct SeatEvent {
    pub kind: SeatEventKind,
    pub flight_id: Uuid,
    pub seat_number: String,
    pub booking_reference: String,
    pub at: DateTime<Utc>,
}

impl SeatEvent {
    pub fn assigned(flight_id: Uuid, seat_number: &str, booking_reference: &str, at: DateTime<Utc>) -> Self {
        Self {
            kind: SeatEventKind::Assigned,
            flight_id,
            seat_number: seat_number.to_string(),
            booking_reference: booking_reference.to_string(),
            at,
        }
    }

    pub fn released(flight_id: Uuid, seat_number: &str, booking_reference: &str, at: DateTime<Utc>) -> Self {
        Self {
            kind: SeatEventKind::Released,
            flight_id,
            seat_number: seat_number.to_string(),
            booking_reference: booking_reference.to_string(),
            at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seat_event_wire_shape() {
        let event = SeatEvent::assigned(Uuid::nil(), "12A", "K7Q2ZD", Utc::now());
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["kind"], "assigned");
        assert_eq!(json["seat_number"], "12A");
        assert_eq!(json["booking_reference"], "K7Q2ZD");
    }
}
