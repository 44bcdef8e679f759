use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use transix_domain::{SeatStatus, SeatStatusRecord};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips/{trip_id}/seats", get(trip_seats))
        .route("/v1/seats/select", post(select_seat))
        .route("/v1/seats/release", post(release_seat))
}

#[derive(Debug, Serialize)]
struct TripSeatsResponse {
    trip_id: Uuid,
    seats: Vec<SeatStatusRecord>,
    total_seats: usize,
    available_seats: usize,
}

async fn trip_seats(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<TripSeatsResponse>, AppError> {
    let seats = state.service.availability.trip_seats(trip_id).await?;
    let available_seats = seats
        .iter()
        .filter(|s| s.status == SeatStatus::Available)
        .count();
    Ok(Json(TripSeatsResponse {
        trip_id,
        total_seats: seats.len(),
        available_seats,
        seats,
    }))
}

#[derive(Debug, Deserialize)]
struct SelectSeatRequest {
    trip_id: Uuid,
    seat_id: Uuid,
    // Generated server-side when the client has none yet.
    user_session: Option<String>,
}

#[derive(Debug, Serialize)]
struct SelectSeatResponse {
    success: bool,
    message: String,
    user_session: String,
    seat_id: Uuid,
}

async fn select_seat(
    State(state): State<AppState>,
    Json(req): Json<SelectSeatRequest>,
) -> Json<SelectSeatResponse> {
    let user_session = req
        .user_session
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let (success, message) = match state
        .service
        .holds
        .acquire(req.trip_id, req.seat_id, &user_session)
        .await
    {
        Ok(()) => (true, "seat held".to_string()),
        Err(err) => (false, err.to_string()),
    };

    Json(SelectSeatResponse {
        success,
        message,
        user_session,
        seat_id: req.seat_id,
    })
}

#[derive(Debug, Deserialize)]
struct ReleaseSeatRequest {
    trip_id: Uuid,
    seat_id: Uuid,
    user_session: String,
}

#[derive(Debug, Serialize)]
struct ReleaseSeatResponse {
    success: bool,
    message: String,
}

async fn release_seat(
    State(state): State<AppState>,
    Json(req): Json<ReleaseSeatRequest>,
) -> Json<ReleaseSeatResponse> {
    let released = state
        .service
        .holds
        .release(req.trip_id, req.seat_id, &req.user_session)
        .await;

    Json(ReleaseSeatResponse {
        success: released,
        message: if released {
            "seat released".to_string()
        } else {
            "no hold to release".to_string()
        },
    })
}
