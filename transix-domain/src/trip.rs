use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub price_amount: i32,
    pub price_currency: String,
    pub status: TripStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Scheduled,
    Boarding,
    Departed,
    Arrived,
    Cancelled,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Scheduled => "scheduled",
            TripStatus::Boarding => "boarding",
            TripStatus::Departed => "departed",
            TripStatus::Arrived => "arrived",
            TripStatus::Cancelled => "cancelled",
        }
    }
}

/// A physical seat on a vehicle. Availability is never stored here; it is
/// derived per trip from reservations and live holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub seat_number: String,
    pub row_number: i32,
    pub seat_letter: String,
    pub is_window: bool,
}
