use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::flight::SeatClass;
use crate::CoreError;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    Refunded,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
            BookingStatus::Refunded => "refunded",
        }
    }

    /// Only pending → confirmed → cancelled is allowed.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
        )
    }

    /// Seats may be picked or swapped while pending or confirmed
    pub fn allows_seat_changes(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            "refunded" => Ok(BookingStatus::Refunded),
            other => Err(CoreError::ValidationError(format!("Unknown booking status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TripType {
    #[default]
    OneWay,
    RoundTrip,
}

impl TripType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripType::OneWay => "one_way",
            TripType::RoundTrip => "round_trip",
        }
    }
}

impl FromStr for TripType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one_way" => Ok(TripType::OneWay),
            "round_trip" => Ok(TripType::RoundTrip),
            other => Err(CoreError::ValidationError(format!("Unknown trip type: {}", other))),
        }
    }
}

/// Which flight of the booking a seat belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
    #[default]
    Outbound,
    Return,
}

impl Leg {
    pub fn as_str(&self) -> &'static str {
        match self {
            Leg::Outbound => "outbound",
            Leg::Return => "return",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub reference: String,
    pub user_id: Uuid,
    pub trip_type: TripType,
    pub outbound_flight_id: Uuid,
    pub return_flight_id: Option<Uuid>,
    pub seat_class: SeatClass,
    pub passengers: i32,
    pub total_amount: Decimal,
    pub taxes: Decimal,
    pub service_fee: Decimal,
    pub status: BookingStatus,
    pub contact_email: String,
    pub contact_phone: String,
    pub booked_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Booking {
    pub fn grand_total(&self) -> Decimal {
        self.total_amount + self.taxes + self.service_fee
    }

    pub fn flight_for(&self, leg: Leg) -> Option<Uuid> {
        match leg {
            Leg::Outbound => Some(self.outbound_flight_id),
            Leg::Return => self.return_flight_id,
        }
    }

    /// Every flight whose seat counters this booking consumes.
    pub fn flight_ids(&self) -> Vec<Uuid> {
        let mut ids = vec![self.outbound_flight_id];
        ids.extend(self.return_flight_id);
        ids
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PassengerTitle {
    #[default]
    Mr,
    Mrs,
    Ms,
    Dr,
}

impl PassengerTitle {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassengerTitle::Mr => "mr",
            PassengerTitle::Mrs => "mrs",
            PassengerTitle::Ms => "ms",
            PassengerTitle::Dr => "dr",
        }
    }
}

impl FromStr for PassengerTitle {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mr" => Ok(PassengerTitle::Mr),
            "mrs" => Ok(PassengerTitle::Mrs),
            "ms" => Ok(PassengerTitle::Ms),
            "dr" => Ok(PassengerTitle::Dr),
            other => Err(CoreError::ValidationError(format!("Unknown title: {}", other))),
        }
    }
}

/// Personal and document fields captured on the passenger form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PassengerDetails {
    pub title: PassengerTitle,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub passport_number: String,
    #[serde(default)]
    pub nationality: String,
    #[serde(default)]
    pub meal_preference: String,
    #[serde(default)]
    pub special_assistance: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passenger {
    pub id: Uuid,
    pub booking_id: Uuid,
    /// Position within the booking, starting at 0
    pub position: i32,
    #[serde(flatten)]
    pub details: PassengerDetails,
    pub outbound_seat: Option<Uuid>,
    pub return_seat: Option<Uuid>,
}

impl Passenger {
    pub fn new(booking_id: Uuid, position: i32, details: PassengerDetails) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            position,
            details,
            outbound_seat: None,
            return_seat: None,
        }
    }

    pub fn seat_for(&self, leg: Leg) -> Option<Uuid> {
        match leg {
            Leg::Outbound => self.outbound_seat,
            Leg::Return => self.return_seat,
        }
    }

    pub fn seat_for_mut(&mut self, leg: Leg) -> &mut Option<Uuid> {
        match leg {
            Leg::Outbound => &mut self.outbound_seat,
            Leg::Return => &mut self.return_seat,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.details.first_name, self.details.last_name)
    }
}
