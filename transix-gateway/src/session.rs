use transix_domain::{ClientMessage, ServerMessage};
use transix_engine::ReservationService;
use uuid::Uuid;

/// Handle one inbound subscriber message. Pure over the service handle so
/// the dispatch is testable without a socket; the stream module feeds it
/// raw WebSocket text.
pub async fn handle_client_message(
    service: &ReservationService,
    trip_id: Uuid,
    raw: &str,
) -> ServerMessage {
    let message: ClientMessage = match serde_json::from_str(raw) {
        Ok(message) => message,
        Err(_) => {
            return ServerMessage::Error {
                message: "invalid message format".into(),
            }
        }
    };

    match message {
        ClientMessage::SeatSelect {
            seat_id,
            user_session,
        } => match service.holds.acquire(trip_id, seat_id, &user_session).await {
            Ok(()) => ServerMessage::SeatSelectResponse {
                success: true,
                message: "seat held".into(),
                seat_id,
            },
            Err(err) => ServerMessage::SeatSelectResponse {
                success: false,
                message: err.to_string(),
                seat_id,
            },
        },
        ClientMessage::SeatRelease {
            seat_id,
            user_session,
        } => {
            let released = service.holds.release(trip_id, seat_id, &user_session).await;
            ServerMessage::SeatReleaseResponse {
                success: released,
                seat_id,
            }
        }
        ClientMessage::Ping { timestamp } => ServerMessage::Pong { timestamp },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use transix_domain::{Seat, Trip, TripStatus};
    use transix_engine::memory::{
        MemoryPassengerDirectory, MemoryReservationStore, MemorySeatLockStore, MemorySnapshotCache,
    };
    use transix_engine::{FixedClock, ServiceConfig, SimulatedPaymentGateway};

    fn service() -> (ReservationService, Uuid, Uuid) {
        let clock = Arc::new(FixedClock::at(Utc::now()));
        let store = Arc::new(MemoryReservationStore::new());
        let locks = Arc::new(MemorySeatLockStore::new(clock.clone()));
        let cache = Arc::new(MemorySnapshotCache::new(clock.clone()));

        let trip_id = Uuid::new_v4();
        let vehicle_id = Uuid::new_v4();
        let seat_id = Uuid::new_v4();
        store.insert_trip(Trip {
            id: trip_id,
            vehicle_id,
            origin: "Bursa".into(),
            destination: "Antalya".into(),
            departure_time: Utc::now(),
            price_amount: 38000,
            price_currency: "USD".into(),
            status: TripStatus::Scheduled,
        });
        store.insert_seat(Seat {
            id: seat_id,
            vehicle_id,
            seat_number: "4D".into(),
            row_number: 4,
            seat_letter: "D".into(),
            is_window: true,
        });

        let service = ReservationService::new(
            store,
            locks,
            cache,
            Arc::new(MemoryPassengerDirectory::new()),
            Arc::new(SimulatedPaymentGateway::always_approve()),
            clock,
            ServiceConfig::default(),
        );
        (service, trip_id, seat_id)
    }

    #[tokio::test]
    async fn seat_select_and_conflict_responses() {
        let (service, trip_id, seat_id) = service();

        let raw = format!(
            r#"{{"type":"seat_select","seat_id":"{seat_id}","user_session":"s1"}}"#
        );
        match handle_client_message(&service, trip_id, &raw).await {
            ServerMessage::SeatSelectResponse { success, seat_id: echoed, .. } => {
                assert!(success);
                assert_eq!(echoed, seat_id);
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        let raw = format!(
            r#"{{"type":"seat_select","seat_id":"{seat_id}","user_session":"s2"}}"#
        );
        match handle_client_message(&service, trip_id, &raw).await {
            ServerMessage::SeatSelectResponse { success, message, .. } => {
                assert!(!success);
                assert_eq!(message, "seat is held by another session");
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn seat_release_round_trip() {
        let (service, trip_id, seat_id) = service();
        let select = format!(
            r#"{{"type":"seat_select","seat_id":"{seat_id}","user_session":"s1"}}"#
        );
        handle_client_message(&service, trip_id, &select).await;

        let release = format!(
            r#"{{"type":"seat_release","seat_id":"{seat_id}","user_session":"s1"}}"#
        );
        match handle_client_message(&service, trip_id, &release).await {
            ServerMessage::SeatReleaseResponse { success, .. } => assert!(success),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn ping_echoes_the_timestamp() {
        let (service, trip_id, _) = service();
        let reply =
            handle_client_message(&service, trip_id, r#"{"type":"ping","timestamp":1712}"#).await;
        assert!(matches!(reply, ServerMessage::Pong { timestamp: Some(1712) }));
    }

    #[tokio::test]
    async fn garbage_input_yields_a_structured_error() {
        let (service, trip_id, _) = service();
        let reply = handle_client_message(&service, trip_id, "not json at all").await;
        assert!(matches!(reply, ServerMessage::Error { .. }));

        let reply =
            handle_client_message(&service, trip_id, r#"{"type":"seat_grab"}"#).await;
        assert!(matches!(reply, ServerMessage::Error { .. }));
    }
}
