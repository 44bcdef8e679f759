use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Derived status of a seat for one trip. A reservation in pending or
/// confirmed wins over a live soft hold; everything else is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    Available,
    TempLocked,
    Reserved,
}

/// One row of the seat availability view, ordered by row then letter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatStatusRecord {
    pub id: Uuid,
    pub seat_number: String,
    pub row_number: i32,
    pub seat_letter: String,
    pub is_window: bool,
    pub status: SeatStatus,
}
