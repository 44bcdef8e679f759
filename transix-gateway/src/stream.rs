use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::Utc;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use transix_domain::{ServerMessage, StreamEvent};

use crate::session;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips/{trip_id}/stream", get(trip_stream))
        .route(
            "/v1/reservations/{reservation_id}/stream",
            get(reservation_stream),
        )
}

async fn trip_stream(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| trip_socket(socket, state, trip_id))
}

/// Per-trip subscriber: a snapshot on connect, live seat updates afterwards,
/// and seat select/release/ping handled inline from the closed message set.
async fn trip_socket(socket: WebSocket, state: AppState, trip_id: Uuid) {
    let (mut sink, mut inbound) = socket.split();

    // Subscribe before the snapshot so no update between the two is lost;
    // replaying one update over the snapshot is harmless.
    let mut rx = state.service.subscribe();

    match state.service.availability.trip_seats(trip_id).await {
        Ok(seats) => {
            let initial = ServerMessage::InitialSeats { trip_id, seats };
            if send_json(&mut sink, &initial).await.is_err() {
                return;
            }
        }
        Err(e) => {
            warn!(%trip_id, error = %e, "failed to send initial snapshot");
        }
    }

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    if event.trip_id() == Some(trip_id)
                        && send_json(&mut sink, &event).await.is_err()
                    {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Slow consumer: resync with a fresh snapshot.
                    warn!(%trip_id, skipped, "subscriber lagged, resending snapshot");
                    if let Ok(seats) = state.service.availability.trip_seats(trip_id).await {
                        let snapshot = ServerMessage::InitialSeats { trip_id, seats };
                        if send_json(&mut sink, &snapshot).await.is_err() {
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            message = inbound.next() => match message {
                Some(Ok(Message::Text(raw))) => {
                    let reply =
                        session::handle_client_message(&state.service, trip_id, &raw).await;
                    if send_json(&mut sink, &reply).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }
}

async fn reservation_stream(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| reservation_socket(socket, state, reservation_id))
}

/// Per-reservation subscriber: status-only updates for one interested party.
async fn reservation_socket(socket: WebSocket, state: AppState, reservation_id: Uuid) {
    let (mut sink, mut inbound) = socket.split();
    let mut rx = state.service.subscribe();

    // Current status straight away, so late subscribers do not wait for the
    // next transition.
    match state.service.reservation(reservation_id).await {
        Ok(Some(reservation)) => {
            let event = StreamEvent::ReservationStatusUpdate {
                reservation_id,
                status: reservation.status,
                timestamp: Utc::now(),
            };
            if send_json(&mut sink, &event).await.is_err() {
                return;
            }
        }
        Ok(None) => {
            let _ = send_json(
                &mut sink,
                &ServerMessage::Error {
                    message: "reservation not found".into(),
                },
            )
            .await;
            return;
        }
        Err(e) => {
            warn!(%reservation_id, error = %e, "failed to read reservation for stream");
        }
    }

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    if event.reservation_id() == Some(reservation_id)
                        && send_json(&mut sink, &event).await.is_err()
                    {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            message = inbound.next() => match message {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }
}

async fn send_json<T: Serialize>(
    sink: &mut SplitSink<WebSocket, Message>,
    value: &T,
) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(value).map_err(axum::Error::new)?;
    sink.send(Message::Text(payload.into())).await
}
