use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

/// Fare tier with its own pricing and inventory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SeatClass {
    Economy,
    Business,
    First,
}

impl SeatClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatClass::Economy => "economy",
            SeatClass::Business => "business",
            SeatClass::First => "first",
        }
    }
}

impl fmt::Display for SeatClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeatClass {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "economy" => Ok(SeatClass::Economy),
            "business" => Ok(SeatClass::Business),
            "first" => Ok(SeatClass::First),
            other => Err(CoreError::ValidationError(format!("Unknown seat class: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlightStatus {
    Scheduled,
    Delayed,
    Boarding,
    Departed,
    InAir,
    Landed,
    Cancelled,
}

impl FlightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlightStatus::Scheduled => "scheduled",
            FlightStatus::Delayed => "delayed",
            FlightStatus::Boarding => "boarding",
            FlightStatus::Departed => "departed",
            FlightStatus::InAir => "in_air",
            FlightStatus::Landed => "landed",
            FlightStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for FlightStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(FlightStatus::Scheduled),
            "delayed" => Ok(FlightStatus::Delayed),
            "boarding" => Ok(FlightStatus::Boarding),
            "departed" => Ok(FlightStatus::Departed),
            "in_air" => Ok(FlightStatus::InAir),
            "landed" => Ok(FlightStatus::Landed),
            "cancelled" => Ok(FlightStatus::Cancelled),
            other => Err(CoreError::ValidationError(format!("Unknown flight status: {}", other))),
        }
    }
}

/// One number per seat class.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassCounts {
    pub economy: i32,
    pub business: i32,
    pub first: i32,
}

impl ClassCounts {
    pub fn new(economy: i32, business: i32, first: i32) -> Self {
        Self { economy, business, first }
    }

    pub fn get(&self, class: SeatClass) -> i32 {
        match class {
            SeatClass::Economy => self.economy,
            SeatClass::Business => self.business,
            SeatClass::First => self.first,
        }
    }

    pub fn get_mut(&mut self, class: SeatClass) -> &mut i32 {
        match class {
            SeatClass::Economy => &mut self.economy,
            SeatClass::Business => &mut self.business,
            SeatClass::First => &mut self.first,
        }
    }

    pub fn total(&self) -> i32 {
        self.economy + self.business + self.first
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flight {
    pub id: Uuid,
    pub flight_number: String,
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub status: FlightStatus,
    pub economy_price: Decimal,
    pub business_price: Decimal,
    pub first_class_price: Decimal,
    /// Aircraft seats per class
    pub capacity: ClassCounts,
    /// Seats still sellable per class
    pub available: ClassCounts,
}

impl Flight {
    pub fn unit_price(&self, class: SeatClass) -> Decimal {
        match class {
            SeatClass::Economy => self.economy_price,
            SeatClass::Business => self.business_price,
            SeatClass::First => self.first_class_price,
        }
    }

    pub fn available_seats(&self, class: SeatClass) -> i32 {
        self.available.get(class)
    }

    pub fn total_available(&self) -> i32 {
        self.available.total()
    }

    pub fn is_bookable(&self) -> bool {
        self.total_available() > 0 && self.status == FlightStatus::Scheduled
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Seat {
    pub id: Uuid,
    pub flight_id: Uuid,
    pub seat_number: String,
    pub seat_class: SeatClass,
    pub is_available: bool,
    pub is_window: bool,
    pub is_aisle: bool,
}

impl Seat {
    pub fn new(flight_id: Uuid, seat_number: &str, seat_class: SeatClass) -> Self {
        Self {
            id: Uuid::new_v4(),
            flight_id,
            seat_number: seat_number.to_string(),
            seat_class,
            is_available: true,
            is_window: seat_number.ends_with('A') || seat_number.ends_with('F'),
            is_aisle: seat_number.ends_with('C') || seat_number.ends_with('D'),
        }
    }
}
