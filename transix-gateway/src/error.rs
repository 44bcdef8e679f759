use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use transix_engine::EngineError;

#[derive(Debug)]
pub enum AppError {
    Engine(EngineError),
    Validation(String),
    Anyhow(anyhow::Error),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Engine(err) => {
                let status = match &err {
                    EngineError::LockConflict | EngineError::AlreadyReserved => {
                        StatusCode::CONFLICT
                    }
                    EngineError::LockInvalid
                    | EngineError::InvalidState(_)
                    | EngineError::ReservationExpired
                    | EngineError::PaymentDeclined(_) => StatusCode::BAD_REQUEST,
                    EngineError::PassengerNotFound | EngineError::ReservationNotFound => {
                        StatusCode::NOT_FOUND
                    }
                    EngineError::StoreUnavailable(msg) => {
                        tracing::error!("store failure: {msg}");
                        // No internal detail leaves the process.
                        let body = Json(json!({ "success": false, "error": "service unavailable" }));
                        return (StatusCode::SERVICE_UNAVAILABLE, body).into_response();
                    }
                };
                (status, err.to_string())
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Anyhow(err) => {
                tracing::error!("internal error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "error": message,
        }));
        (status, body).into_response()
    }
}
