use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tracing::{info, warn};
use uuid::Uuid;

use transix_domain::{
    CardDetails, PassengerDetails, Payment, PaymentMethod, PaymentStatus, Reservation,
    ReservationStatus,
};

use crate::broadcast::Broadcaster;
use crate::clock::Clock;
use crate::codes;
use crate::error::EngineError;
use crate::payment::{PaymentGateway, PaymentOutcome};
use crate::repository::{NewReservation, PassengerDirectory, PendingLock, ReservationStore, SeatLockStore};

/// State machine that turns a valid soft hold into a pending reservation and
/// later confirms or rejects it based on the settlement outcome. All
/// conflict resolution is delegated to the durable store's transactional
/// guarantees; the soft hold is only consulted, never trusted.
pub struct ReservationCommitter {
    store: Arc<dyn ReservationStore>,
    locks: Arc<dyn SeatLockStore>,
    passengers: Arc<dyn PassengerDirectory>,
    payments: Arc<dyn PaymentGateway>,
    broadcaster: Broadcaster,
    clock: Arc<dyn Clock>,
    payment_window: ChronoDuration,
    reservation_lock_ttl: Duration,
}

impl ReservationCommitter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn ReservationStore>,
        locks: Arc<dyn SeatLockStore>,
        passengers: Arc<dyn PassengerDirectory>,
        payments: Arc<dyn PaymentGateway>,
        broadcaster: Broadcaster,
        clock: Arc<dyn Clock>,
        payment_window: ChronoDuration,
        reservation_lock_ttl: Duration,
    ) -> Self {
        Self {
            store,
            locks,
            passengers,
            payments,
            broadcaster,
            clock,
            payment_window,
            reservation_lock_ttl,
        }
    }

    pub async fn create_reservation(
        &self,
        trip_id: Uuid,
        seat_id: Uuid,
        session: &str,
        passenger: &PassengerDetails,
    ) -> Result<Reservation, EngineError> {
        // 1. The caller must still own the live hold. A lock-store outage
        // falls through: the transactional check below stays authoritative.
        match self.locks.owner(trip_id, seat_id).await {
            Ok(Some(owner)) if owner == session => {}
            Ok(_) => return Err(EngineError::LockInvalid),
            Err(e) => {
                warn!(%trip_id, %seat_id, error = %e, "lock store unavailable, relying on durable check");
            }
        }

        // 2. Resolve the passenger by identity reference; the phone number
        // is stored as contact data only.
        let record = self
            .passengers
            .resolve(passenger.id)
            .await?
            .ok_or(EngineError::PassengerNotFound)?;

        let now = self.clock.now();
        let pnr_code = codes::generate_unique(self.store.as_ref()).await?;
        let new = NewReservation {
            trip_id,
            seat_id,
            passenger_id: record.id,
            passenger_phone: passenger.phone.clone(),
            reserved_at: now,
            expires_at: now + self.payment_window,
            pnr_code,
        };

        // 3. Conflict-checked insert. Concurrent commits for the same trip
        // serialize on the trip row lock; exactly one wins the seat.
        let reservation = self.store.create_reservation(&new).await?;
        info!(
            reservation_id = %reservation.id,
            %trip_id,
            %seat_id,
            pnr = %reservation.pnr_code,
            "reservation created"
        );

        // 4. Outside the transaction: swap the soft hold for the
        // reservation-scoped lock, then publish the refreshed view.
        if let Err(e) = self
            .locks
            .set_reservation_lock(reservation.id, self.reservation_lock_ttl)
            .await
        {
            warn!(reservation_id = %reservation.id, error = %e, "failed to create reservation lock");
        }
        if let Err(e) = self.locks.purge(trip_id, seat_id).await {
            warn!(%trip_id, %seat_id, error = %e, "failed to drop superseded hold");
        }
        self.broadcaster.refresh_trip(trip_id).await;

        Ok(reservation)
    }

    pub async fn process_payment(
        &self,
        reservation_id: Uuid,
        method: PaymentMethod,
        card: &CardDetails,
    ) -> Result<Payment, EngineError> {
        let now = self.clock.now();

        // Re-check expiry under a row lock before any settlement attempt.
        let reservation = match self.store.lock_pending(reservation_id, now).await? {
            PendingLock::Ready(reservation) => reservation,
            PendingLock::Expired(reservation) => {
                info!(%reservation_id, "payment attempted after expiry");
                self.broadcaster.refresh_trip(reservation.trip_id).await;
                self.broadcaster
                    .reservation_update(reservation_id, ReservationStatus::Expired);
                return Err(EngineError::ReservationExpired);
            }
        };

        match self
            .payments
            .attempt(reservation.total_amount, &reservation.currency, method, card)
            .await?
        {
            PaymentOutcome::Declined { reason } => {
                // The reservation stays pending and may be retried until it
                // expires.
                info!(%reservation_id, %reason, "payment declined");
                Err(EngineError::PaymentDeclined(reason))
            }
            PaymentOutcome::Approved { reference } => {
                let payment = Payment {
                    id: Uuid::new_v4(),
                    reservation_id,
                    amount: reservation.total_amount,
                    currency: reservation.currency.clone(),
                    method,
                    status: PaymentStatus::Completed,
                    transaction_id: reference,
                    paid_at: now,
                    created_at: now,
                };
                // Guarded on the reservation still being pending; a sweep
                // racing us in the gap answers with InvalidState instead of
                // confirming an expired row.
                self.store.record_payment(&payment).await?;
                info!(
                    %reservation_id,
                    transaction = %payment.transaction_id,
                    "payment completed, reservation confirmed"
                );
                self.broadcaster.refresh_trip(reservation.trip_id).await;
                self.broadcaster
                    .reservation_update(reservation_id, ReservationStatus::Confirmed);
                Ok(payment)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::memory::{
        MemoryPassengerDirectory, MemoryReservationStore, MemorySeatLockStore, MemorySnapshotCache,
    };
    use crate::payment::SimulatedPaymentGateway;
    use crate::AvailabilityView;
    use chrono::Utc;
    use transix_domain::{PassengerRecord, Seat, Trip, TripStatus};

    struct Harness {
        committer: ReservationCommitter,
        locks: Arc<MemorySeatLockStore>,
        store: Arc<MemoryReservationStore>,
        trip_id: Uuid,
        seat_id: Uuid,
        passenger: PassengerDetails,
    }

    fn card() -> CardDetails {
        CardDetails {
            card_number: "4111111111111111".into(),
            card_name: "A TRAVELLER".into(),
            expiry: "12/29".into(),
            cvv: "123".into(),
        }
    }

    fn harness(gateway: SimulatedPaymentGateway) -> Harness {
        let clock = Arc::new(FixedClock::at(Utc::now()));
        let store = Arc::new(MemoryReservationStore::new());
        let locks = Arc::new(MemorySeatLockStore::new(clock.clone()));
        let cache = Arc::new(MemorySnapshotCache::new(clock.clone()));
        let passengers = Arc::new(MemoryPassengerDirectory::new());

        let trip_id = Uuid::new_v4();
        let vehicle_id = Uuid::new_v4();
        let seat_id = Uuid::new_v4();
        store.insert_trip(Trip {
            id: trip_id,
            vehicle_id,
            origin: "Istanbul".into(),
            destination: "Ankara".into(),
            departure_time: Utc::now(),
            price_amount: 42000,
            price_currency: "USD".into(),
            status: TripStatus::Scheduled,
        });
        store.insert_seat(Seat {
            id: seat_id,
            vehicle_id,
            seat_number: "3C".into(),
            row_number: 3,
            seat_letter: "C".into(),
            is_window: false,
        });

        let passenger_id = Uuid::new_v4();
        passengers.insert(PassengerRecord {
            id: passenger_id,
            first_name: "Ayse".into(),
            last_name: "Yilmaz".into(),
        });

        let view = AvailabilityView::new(
            store.clone(),
            locks.clone(),
            cache.clone(),
            Duration::from_secs(300),
        );
        let broadcaster = Broadcaster::new(view, cache, clock.clone(), 16);
        let committer = ReservationCommitter::new(
            store.clone(),
            locks.clone(),
            passengers,
            Arc::new(gateway),
            broadcaster,
            clock,
            ChronoDuration::minutes(15),
            Duration::from_secs(900),
        );

        Harness {
            committer,
            locks,
            store,
            trip_id,
            seat_id,
            passenger: PassengerDetails {
                id: passenger_id,
                phone: "+905551112233".into(),
            },
        }
    }

    async fn hold(h: &Harness, session: &str) {
        h.locks
            .acquire(h.trip_id, h.seat_id, session, Duration::from_secs(300))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_without_a_hold_fails_lock_invalid() {
        let h = harness(SimulatedPaymentGateway::always_approve());
        let err = h
            .committer
            .create_reservation(h.trip_id, h.seat_id, "s1", &h.passenger)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::LockInvalid));
    }

    #[tokio::test]
    async fn create_with_someone_elses_hold_fails_lock_invalid() {
        let h = harness(SimulatedPaymentGateway::always_approve());
        hold(&h, "s1").await;
        let err = h
            .committer
            .create_reservation(h.trip_id, h.seat_id, "s2", &h.passenger)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::LockInvalid));
    }

    #[tokio::test]
    async fn unknown_passenger_is_rejected() {
        let h = harness(SimulatedPaymentGateway::always_approve());
        hold(&h, "s1").await;
        let unknown = PassengerDetails {
            id: Uuid::new_v4(),
            phone: "+905550000000".into(),
        };
        let err = h
            .committer
            .create_reservation(h.trip_id, h.seat_id, "s1", &unknown)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PassengerNotFound));
    }

    #[tokio::test]
    async fn successful_create_supersedes_the_hold() {
        let h = harness(SimulatedPaymentGateway::always_approve());
        hold(&h, "s1").await;
        let reservation = h
            .committer
            .create_reservation(h.trip_id, h.seat_id, "s1", &h.passenger)
            .await
            .unwrap();

        assert_eq!(reservation.status, ReservationStatus::Pending);
        assert_eq!(reservation.total_amount, 42000);
        assert_eq!(reservation.pnr_code.len(), 6);
        assert!(h.locks.owner(h.trip_id, h.seat_id).await.unwrap().is_none());
        assert!(h.locks.reservation_lock_exists(reservation.id));
    }

    #[tokio::test]
    async fn declined_payment_leaves_the_reservation_pending() {
        let h = harness(SimulatedPaymentGateway::always_decline());
        hold(&h, "s1").await;
        let reservation = h
            .committer
            .create_reservation(h.trip_id, h.seat_id, "s1", &h.passenger)
            .await
            .unwrap();

        let err = h
            .committer
            .process_payment(reservation.id, PaymentMethod::CreditCard, &card())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PaymentDeclined(_)));

        let stored = h.store.get_reservation(reservation.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReservationStatus::Pending);
        assert!(h.store.payment_for(reservation.id).is_none());
    }

    #[tokio::test]
    async fn payment_for_unknown_reservation_fails() {
        let h = harness(SimulatedPaymentGateway::always_approve());
        let err = h
            .committer
            .process_payment(Uuid::new_v4(), PaymentMethod::CreditCard, &card())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ReservationNotFound));
    }

    #[tokio::test]
    async fn paying_twice_hits_the_status_guard() {
        let h = harness(SimulatedPaymentGateway::always_approve());
        hold(&h, "s1").await;
        let reservation = h
            .committer
            .create_reservation(h.trip_id, h.seat_id, "s1", &h.passenger)
            .await
            .unwrap();

        h.committer
            .process_payment(reservation.id, PaymentMethod::CreditCard, &card())
            .await
            .unwrap();
        let err = h
            .committer
            .process_payment(reservation.id, PaymentMethod::CreditCard, &card())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }
}
