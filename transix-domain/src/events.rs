use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::availability::SeatStatusRecord;
use crate::reservation::ReservationStatus;

/// Messages fanned out to live subscribers. Seat updates go to the topic of
/// their trip; reservation updates to the topic of their reservation.
/// Consumers are expected to be idempotent: replaying a snapshot is harmless.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    SeatStatusUpdate {
        trip_id: Uuid,
        seats: Vec<SeatStatusRecord>,
        timestamp: DateTime<Utc>,
    },
    ReservationStatusUpdate {
        reservation_id: Uuid,
        status: ReservationStatus,
        timestamp: DateTime<Utc>,
    },
}

impl StreamEvent {
    /// Trip this event belongs to, if it is a per-trip event.
    pub fn trip_id(&self) -> Option<Uuid> {
        match self {
            StreamEvent::SeatStatusUpdate { trip_id, .. } => Some(*trip_id),
            StreamEvent::ReservationStatusUpdate { .. } => None,
        }
    }

    pub fn reservation_id(&self) -> Option<Uuid> {
        match self {
            StreamEvent::SeatStatusUpdate { .. } => None,
            StreamEvent::ReservationStatusUpdate { reservation_id, .. } => Some(*reservation_id),
        }
    }
}
