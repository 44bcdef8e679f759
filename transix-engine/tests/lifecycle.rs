//! End-to-end reservation lifecycle against the in-memory backends: hold
//! contention, conflict-checked commits, settlement, and sweeping, all on a
//! pinned clock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use transix_domain::{
    CardDetails, PassengerDetails, PassengerRecord, PaymentMethod, PaymentStatus,
    ReservationStatus, Seat, SeatStatus, StreamEvent, Trip, TripStatus,
};
use transix_engine::memory::{
    MemoryPassengerDirectory, MemoryReservationStore, MemorySeatLockStore, MemorySnapshotCache,
};
use transix_engine::repository::NewReservation;
use transix_engine::{
    Clock, EngineError, FixedClock, PaymentGateway, PaymentOutcome, ReservationService,
    ReservationStore, ServiceConfig,
};

/// Gateway that counts settlement attempts so tests can assert that expired
/// reservations never reach the adapter.
struct CountingGateway {
    attempts: AtomicUsize,
}

impl CountingGateway {
    fn new() -> Self {
        Self {
            attempts: AtomicUsize::new(0),
        }
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for CountingGateway {
    async fn attempt(
        &self,
        _amount: i32,
        _currency: &str,
        _method: PaymentMethod,
        _card: &CardDetails,
    ) -> Result<PaymentOutcome, EngineError> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PaymentOutcome::Approved {
            reference: format!("TXN_TEST{n:08}"),
        })
    }
}

struct Harness {
    service: ReservationService,
    store: Arc<MemoryReservationStore>,
    locks: Arc<MemorySeatLockStore>,
    clock: Arc<FixedClock>,
    gateway: Arc<CountingGateway>,
    trip_id: Uuid,
    seat_ids: Vec<Uuid>,
    passenger: PassengerDetails,
}

fn harness() -> Harness {
    let clock = Arc::new(FixedClock::at(Utc::now()));
    let store = Arc::new(MemoryReservationStore::new());
    let locks = Arc::new(MemorySeatLockStore::new(clock.clone()));
    let cache = Arc::new(MemorySnapshotCache::new(clock.clone()));
    let passengers = Arc::new(MemoryPassengerDirectory::new());
    let gateway = Arc::new(CountingGateway::new());

    let trip_id = Uuid::new_v4();
    let vehicle_id = Uuid::new_v4();
    store.insert_trip(Trip {
        id: trip_id,
        vehicle_id,
        origin: "Istanbul".into(),
        destination: "Izmir".into(),
        departure_time: Utc::now() + ChronoDuration::days(3),
        price_amount: 55000,
        price_currency: "USD".into(),
        status: TripStatus::Scheduled,
    });

    let mut seat_ids = Vec::new();
    for (row, letter) in [(1, "A"), (1, "B"), (2, "A"), (2, "B")] {
        let seat_id = Uuid::new_v4();
        store.insert_seat(Seat {
            id: seat_id,
            vehicle_id,
            seat_number: format!("{row}{letter}"),
            row_number: row,
            seat_letter: letter.into(),
            is_window: letter == "A",
        });
        seat_ids.push(seat_id);
    }

    let passenger_id = Uuid::new_v4();
    passengers.insert(PassengerRecord {
        id: passenger_id,
        first_name: "Mehmet".into(),
        last_name: "Demir".into(),
    });

    let service = ReservationService::new(
        store.clone(),
        locks.clone(),
        cache,
        passengers,
        gateway.clone(),
        clock.clone(),
        ServiceConfig::default(),
    );

    Harness {
        service,
        store,
        locks,
        clock,
        gateway,
        trip_id,
        seat_ids,
        passenger: PassengerDetails {
            id: passenger_id,
            phone: "+905321234567".into(),
        },
    }
}

fn card() -> CardDetails {
    CardDetails {
        card_number: "4111111111111111".into(),
        card_name: "MEHMET DEMIR".into(),
        expiry: "11/28".into(),
        cvv: "456".into(),
    }
}

#[tokio::test]
async fn hold_create_pay_and_recreate_scenario() {
    let h = harness();
    let seat = h.seat_ids[0];

    // Two sessions race for the same seat; the second is told why it lost.
    h.service.holds.acquire(h.trip_id, seat, "s1").await.unwrap();
    let err = h.service.holds.acquire(h.trip_id, seat, "s2").await.unwrap_err();
    assert_eq!(err.to_string(), "seat is held by another session");

    let reservation = h
        .service
        .committer
        .create_reservation(h.trip_id, seat, "s1", &h.passenger)
        .await
        .unwrap();
    assert_eq!(reservation.status, ReservationStatus::Pending);
    assert_eq!(
        reservation.expires_at,
        reservation.reserved_at + ChronoDuration::minutes(15)
    );

    let payment = h
        .service
        .committer
        .process_payment(reservation.id, PaymentMethod::CreditCard, &card())
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(h.gateway.attempts(), 1);

    let stored = h.service.reservation(reservation.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReservationStatus::Confirmed);
    assert_eq!(
        stored.payment_reference.as_deref(),
        Some(payment.transaction_id.as_str())
    );

    // Even with a fresh hold, the seat cannot be reserved a second time.
    h.service.holds.acquire(h.trip_id, seat, "s1").await.unwrap();
    let err = h
        .service
        .committer
        .create_reservation(h.trip_id, seat, "s1", &h.passenger)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyReserved));
}

#[tokio::test]
async fn racing_store_commits_admit_exactly_one_winner() {
    let h = harness();
    let seat = h.seat_ids[0];
    let now = h.clock.now();

    let mut tasks = Vec::new();
    for i in 0..10 {
        let store = h.store.clone();
        let new = NewReservation {
            trip_id: h.trip_id,
            seat_id: seat,
            passenger_id: h.passenger.id,
            passenger_phone: h.passenger.phone.clone(),
            reserved_at: now,
            expires_at: now + ChronoDuration::minutes(15),
            pnr_code: format!("RACE{i:02}"),
        };
        tasks.push(tokio::spawn(
            async move { store.create_reservation(&new).await },
        ));
    }

    let mut won = 0;
    let mut lost = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => won += 1,
            Err(EngineError::AlreadyReserved) => lost += 1,
            Err(other) => panic!("unexpected failure: {other}"),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(lost, 9);
}

#[tokio::test]
async fn double_submit_through_the_committer_books_once() {
    let h = harness();
    let seat = h.seat_ids[1];
    h.service.holds.acquire(h.trip_id, seat, "s1").await.unwrap();

    let first = h
        .service
        .committer
        .create_reservation(h.trip_id, seat, "s1", &h.passenger);
    let second = h
        .service
        .committer
        .create_reservation(h.trip_id, seat, "s1", &h.passenger);
    let (first, second) = tokio::join!(first, second);

    let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    for result in [first, second] {
        if let Err(err) = result {
            // The loser is stopped by the durable check, or by the hold
            // having been superseded when the winner finished first.
            assert!(matches!(
                err,
                EngineError::AlreadyReserved | EngineError::LockInvalid
            ));
        }
    }
    assert_eq!(h.store.active_seat_ids(h.trip_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn expired_reservation_never_reaches_the_gateway() {
    let h = harness();
    let seat = h.seat_ids[2];
    h.service.holds.acquire(h.trip_id, seat, "s1").await.unwrap();
    let reservation = h
        .service
        .committer
        .create_reservation(h.trip_id, seat, "s1", &h.passenger)
        .await
        .unwrap();

    h.clock.advance(ChronoDuration::minutes(16));
    let err = h
        .service
        .committer
        .process_payment(reservation.id, PaymentMethod::CreditCard, &card())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ReservationExpired));
    assert_eq!(h.gateway.attempts(), 0);

    let stored = h.service.reservation(reservation.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReservationStatus::Expired);
}

#[tokio::test]
async fn sweep_expires_stale_reservations_and_broadcasts_once_per_trip() {
    let h = harness();
    let seat = h.seat_ids[0];
    h.service.holds.acquire(h.trip_id, seat, "s1").await.unwrap();
    let reservation = h
        .service
        .committer
        .create_reservation(h.trip_id, seat, "s1", &h.passenger)
        .await
        .unwrap();
    assert!(h.locks.reservation_lock_exists(reservation.id));

    h.clock.advance(ChronoDuration::minutes(16));
    let mut rx = h.service.subscribe();

    let report = h.service.sweeper.sweep().await.unwrap();
    assert_eq!(report.expired, vec![reservation.id]);
    assert_eq!(report.trips, vec![h.trip_id]);
    assert!(!h.locks.reservation_lock_exists(reservation.id));

    let stored = h.service.reservation(reservation.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReservationStatus::Expired);

    // The refreshed view shows the seat free again.
    let seats = h.service.availability.trip_seats(h.trip_id).await.unwrap();
    let swept = seats.iter().find(|s| s.id == seat).unwrap();
    assert_eq!(swept.status, SeatStatus::Available);

    // Exactly one seat update for the trip plus one reservation update.
    let mut seat_updates = 0;
    let mut reservation_updates = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            StreamEvent::SeatStatusUpdate { trip_id, .. } => {
                assert_eq!(trip_id, h.trip_id);
                seat_updates += 1;
            }
            StreamEvent::ReservationStatusUpdate {
                reservation_id,
                status,
                ..
            } => {
                assert_eq!(reservation_id, reservation.id);
                assert_eq!(status, ReservationStatus::Expired);
                reservation_updates += 1;
            }
        }
    }
    assert_eq!(seat_updates, 1);
    assert_eq!(reservation_updates, 1);

    // Idempotence: a second run does nothing and stays silent.
    let report = h.service.sweeper.sweep().await.unwrap();
    assert!(report.expired.is_empty());
    assert!(report.trips.is_empty());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn confirmed_reservations_are_not_swept() {
    let h = harness();
    let seat = h.seat_ids[3];
    h.service.holds.acquire(h.trip_id, seat, "s1").await.unwrap();
    let reservation = h
        .service
        .committer
        .create_reservation(h.trip_id, seat, "s1", &h.passenger)
        .await
        .unwrap();
    h.service
        .committer
        .process_payment(reservation.id, PaymentMethod::DebitCard, &card())
        .await
        .unwrap();

    h.clock.advance(ChronoDuration::hours(1));
    let report = h.service.sweeper.sweep().await.unwrap();
    assert!(report.expired.is_empty());

    let stored = h.service.reservation(reservation.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReservationStatus::Confirmed);
}
