use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use transix_domain::{PassengerDetails, Reservation};
use transix_engine::EngineError;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/reservations", post(create_reservation))
        .route("/v1/reservations/{reservation_id}", get(reservation_status))
}

#[derive(Debug, Deserialize)]
struct CreateReservationRequest {
    trip_id: Uuid,
    seat_id: Uuid,
    user_session: String,
    passenger: PassengerDetails,
}

#[derive(Debug, Serialize)]
struct ReservationResponse {
    success: bool,
    message: String,
    reservation: Reservation,
}

async fn create_reservation(
    State(state): State<AppState>,
    Json(req): Json<CreateReservationRequest>,
) -> Result<Json<ReservationResponse>, AppError> {
    if req.passenger.phone.is_empty() {
        return Err(AppError::Validation("passenger phone is required".into()));
    }

    let reservation = state
        .service
        .committer
        .create_reservation(req.trip_id, req.seat_id, &req.user_session, &req.passenger)
        .await?;

    Ok(Json(ReservationResponse {
        success: true,
        message: "reservation created".into(),
        reservation,
    }))
}

async fn reservation_status(
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
) -> Result<Json<Reservation>, AppError> {
    let reservation = state
        .service
        .reservation(reservation_id)
        .await?
        .ok_or(EngineError::ReservationNotFound)?;
    Ok(Json(reservation))
}
