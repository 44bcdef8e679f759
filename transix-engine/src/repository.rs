use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use transix_domain::{PassengerRecord, Payment, Reservation, Seat, SeatStatusRecord, Trip};

use crate::error::EngineError;

/// New reservation row handed to the durable store. The price is snapshotted
/// from the trip inside the creating transaction, not here.
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub trip_id: Uuid,
    pub seat_id: Uuid,
    pub passenger_id: Uuid,
    pub passenger_phone: String,
    pub reserved_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub pnr_code: String,
}

/// Outcome of row-locking a pending reservation for settlement.
#[derive(Debug)]
pub enum PendingLock {
    /// Pending and inside its payment window.
    Ready(Reservation),
    /// Was pending but past expiry; the store has already persisted the
    /// transition to expired before returning.
    Expired(Reservation),
}

/// The durable store is the sole writer of truth for reservations and
/// payments. Implementations must provide transactional atomicity: the
/// conflict checks in `create_reservation` and the status guards in
/// `record_payment`/`mark_expired` are what close the double-booking races.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn get_trip(&self, trip_id: Uuid) -> Result<Option<Trip>, EngineError>;

    /// Seats of a vehicle, ordered by row number then seat letter.
    async fn seats_for_vehicle(&self, vehicle_id: Uuid) -> Result<Vec<Seat>, EngineError>;

    /// Seat ids holding an active (pending or confirmed) reservation on the
    /// trip.
    async fn active_seat_ids(&self, trip_id: Uuid) -> Result<HashSet<Uuid>, EngineError>;

    async fn reservation_code_exists(&self, code: &str) -> Result<bool, EngineError>;

    /// Create a pending reservation. Runs in one transaction that row-locks
    /// the trip, re-checks active-reservation uniqueness and snapshots the
    /// trip price; of two racing committers for the same seat exactly one
    /// succeeds, the other observes `AlreadyReserved`.
    async fn create_reservation(&self, new: &NewReservation) -> Result<Reservation, EngineError>;

    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>, EngineError>;

    /// Row-lock a pending reservation for settlement, persisting the expired
    /// transition when the payment window has already lapsed.
    async fn lock_pending(&self, id: Uuid, now: DateTime<Utc>)
        -> Result<PendingLock, EngineError>;

    /// Insert the payment row, confirm the reservation and record the
    /// gateway reference, guarded on the reservation still being pending.
    async fn record_payment(&self, payment: &Payment) -> Result<(), EngineError>;

    /// Pending reservations whose expiry has passed.
    async fn expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>, EngineError>;

    /// Batch transition to expired, guarded on status still being pending.
    /// Returns the number of rows actually changed.
    async fn mark_expired(&self, ids: &[Uuid]) -> Result<u64, EngineError>;
}

/// Ephemeral, advisory seat locks. May be stale or absent without corrupting
/// correctness; every authoritative mutation re-validates against the
/// durable store.
#[async_trait]
pub trait SeatLockStore: Send + Sync {
    /// Atomically take or renew the hold on (trip, seat) for `session`.
    /// Returns false when a different session owns a live hold. Must be a
    /// single atomic operation; check-then-set is a race.
    async fn acquire(
        &self,
        trip_id: Uuid,
        seat_id: Uuid,
        session: &str,
        ttl: Duration,
    ) -> Result<bool, EngineError>;

    /// Delete the hold only if `session` owns it; returns whether a hold was
    /// removed.
    async fn release(&self, trip_id: Uuid, seat_id: Uuid, session: &str)
        -> Result<bool, EngineError>;

    /// Unconditionally drop the hold, used when a reservation supersedes it.
    async fn purge(&self, trip_id: Uuid, seat_id: Uuid) -> Result<(), EngineError>;

    async fn owner(&self, trip_id: Uuid, seat_id: Uuid) -> Result<Option<String>, EngineError>;

    /// Seat ids with a live hold on the trip.
    async fn locked_seats(&self, trip_id: Uuid) -> Result<HashSet<Uuid>, EngineError>;

    /// Bookkeeping lock created alongside a reservation; never authoritative
    /// for conflict resolution.
    async fn set_reservation_lock(
        &self,
        reservation_id: Uuid,
        ttl: Duration,
    ) -> Result<(), EngineError>;

    async fn clear_reservation_lock(&self, reservation_id: Uuid) -> Result<(), EngineError>;
}

/// Short-lived cache of computed seat snapshots, keyed by trip.
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    async fn get(&self, trip_id: Uuid) -> Result<Option<Vec<SeatStatusRecord>>, EngineError>;

    async fn put(
        &self,
        trip_id: Uuid,
        seats: &[SeatStatusRecord],
        ttl: Duration,
    ) -> Result<(), EngineError>;

    async fn invalidate(&self, trip_id: Uuid) -> Result<(), EngineError>;
}

/// Lookup into the externally managed identity store.
#[async_trait]
pub trait PassengerDirectory: Send + Sync {
    async fn resolve(&self, passenger_id: Uuid) -> Result<Option<PassengerRecord>, EngineError>;
}
