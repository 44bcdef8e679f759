use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use transix_domain::{CardDetails, Payment, PaymentMethod};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/payments", post(process_payment))
}

#[derive(Debug, Deserialize)]
struct PaymentDetails {
    method: PaymentMethod,
    card_number: String,
    card_name: String,
    expiry: String,
    cvv: String,
}

#[derive(Debug, Deserialize)]
struct ProcessPaymentRequest {
    reservation_id: Uuid,
    payment: PaymentDetails,
}

#[derive(Debug, Serialize)]
struct PaymentResponse {
    success: bool,
    message: String,
    payment: Payment,
}

async fn process_payment(
    State(state): State<AppState>,
    Json(req): Json<ProcessPaymentRequest>,
) -> Result<Json<PaymentResponse>, AppError> {
    let details = &req.payment;
    for (field, value) in [
        ("card_number", &details.card_number),
        ("card_name", &details.card_name),
        ("expiry", &details.expiry),
        ("cvv", &details.cvv),
    ] {
        if value.is_empty() {
            return Err(AppError::Validation(format!("missing payment field: {field}")));
        }
    }

    let card = CardDetails {
        card_number: details.card_number.clone(),
        card_name: details.card_name.clone(),
        expiry: details.expiry.clone(),
        cvv: details.cvv.clone(),
    };

    let payment = state
        .service
        .committer
        .process_payment(req.reservation_id, details.method, &card)
        .await?;

    Ok(Json(PaymentResponse {
        success: true,
        message: "payment completed".into(),
        payment,
    }))
}
