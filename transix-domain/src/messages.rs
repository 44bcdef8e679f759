use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound messages on a trip subscriber socket. Closed set, validated at
/// the boundary by serde; anything else is rejected before dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SeatSelect {
        seat_id: Uuid,
        user_session: String,
    },
    SeatRelease {
        seat_id: Uuid,
        user_session: String,
    },
    Ping {
        #[serde(default)]
        timestamp: Option<i64>,
    },
}

/// Direct replies to client messages. Broadcast traffic (seat and
/// reservation updates) is forwarded as [`crate::StreamEvent`] instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    InitialSeats {
        trip_id: Uuid,
        seats: Vec<crate::SeatStatusRecord>,
    },
    SeatSelectResponse {
        success: bool,
        message: String,
        seat_id: Uuid,
    },
    SeatReleaseResponse {
        success: bool,
        seat_id: Uuid,
    },
    Pong {
        timestamp: Option<i64>,
    },
    Error {
        message: String,
    },
}
