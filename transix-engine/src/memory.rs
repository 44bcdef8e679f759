//! In-memory backends guarding the same invariants as the production
//! stores: one mutex hold per operation stands in for a transaction, TTLs
//! are evaluated lazily against the injected clock.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use uuid::Uuid;

use transix_domain::{
    PassengerRecord, Payment, Reservation, ReservationStatus, Seat, SeatStatusRecord, Trip,
};

use crate::clock::Clock;
use crate::error::EngineError;
use crate::repository::{
    NewReservation, PassengerDirectory, PendingLock, ReservationStore, SeatLockStore,
    SnapshotCache,
};

fn ttl_to_chrono(ttl: Duration) -> ChronoDuration {
    ChronoDuration::seconds(ttl.as_secs().min(i64::MAX as u64) as i64)
}

#[derive(Default)]
struct StoreInner {
    trips: HashMap<Uuid, Trip>,
    seats: HashMap<Uuid, Seat>,
    reservations: HashMap<Uuid, Reservation>,
    payments: HashMap<Uuid, Payment>,
}

pub struct MemoryReservationStore {
    inner: Mutex<StoreInner>,
}

impl Default for MemoryReservationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryReservationStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().expect("store poisoned")
    }

    pub fn insert_trip(&self, trip: Trip) {
        self.lock().trips.insert(trip.id, trip);
    }

    pub fn insert_seat(&self, seat: Seat) {
        self.lock().seats.insert(seat.id, seat);
    }

    /// Payment recorded for a reservation, if any.
    pub fn payment_for(&self, reservation_id: Uuid) -> Option<Payment> {
        self.lock().payments.get(&reservation_id).cloned()
    }
}

#[async_trait]
impl ReservationStore for MemoryReservationStore {
    async fn get_trip(&self, trip_id: Uuid) -> Result<Option<Trip>, EngineError> {
        Ok(self.lock().trips.get(&trip_id).cloned())
    }

    async fn seats_for_vehicle(&self, vehicle_id: Uuid) -> Result<Vec<Seat>, EngineError> {
        let mut seats: Vec<Seat> = self
            .lock()
            .seats
            .values()
            .filter(|s| s.vehicle_id == vehicle_id)
            .cloned()
            .collect();
        seats.sort_by(|a, b| {
            a.row_number
                .cmp(&b.row_number)
                .then_with(|| a.seat_letter.cmp(&b.seat_letter))
        });
        Ok(seats)
    }

    async fn active_seat_ids(&self, trip_id: Uuid) -> Result<HashSet<Uuid>, EngineError> {
        Ok(self
            .lock()
            .reservations
            .values()
            .filter(|r| r.trip_id == trip_id && r.is_active())
            .map(|r| r.seat_id)
            .collect())
    }

    async fn reservation_code_exists(&self, code: &str) -> Result<bool, EngineError> {
        Ok(self
            .lock()
            .reservations
            .values()
            .any(|r| r.pnr_code == code))
    }

    async fn create_reservation(&self, new: &NewReservation) -> Result<Reservation, EngineError> {
        // Everything below happens under one lock hold, which is this
        // backend's equivalent of the row-locked transaction.
        let mut inner = self.lock();

        let trip = inner
            .trips
            .get(&new.trip_id)
            .cloned()
            .ok_or_else(|| EngineError::InvalidState("unknown trip".into()))?;
        let seat = inner
            .seats
            .get(&new.seat_id)
            .ok_or_else(|| EngineError::InvalidState("unknown seat".into()))?;
        if seat.vehicle_id != trip.vehicle_id {
            return Err(EngineError::InvalidState(
                "seat does not belong to the trip's vehicle".into(),
            ));
        }

        let conflict = inner
            .reservations
            .values()
            .any(|r| r.trip_id == new.trip_id && r.seat_id == new.seat_id && r.is_active());
        if conflict {
            return Err(EngineError::AlreadyReserved);
        }

        let reservation = Reservation {
            id: Uuid::new_v4(),
            trip_id: new.trip_id,
            seat_id: new.seat_id,
            passenger_id: new.passenger_id,
            passenger_phone: new.passenger_phone.clone(),
            status: ReservationStatus::Pending,
            reserved_at: new.reserved_at,
            expires_at: new.expires_at,
            payment_reference: None,
            total_amount: trip.price_amount,
            currency: trip.price_currency.clone(),
            pnr_code: new.pnr_code.clone(),
        };
        inner.reservations.insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>, EngineError> {
        Ok(self.lock().reservations.get(&id).cloned())
    }

    async fn lock_pending(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PendingLock, EngineError> {
        let mut inner = self.lock();
        let reservation = inner
            .reservations
            .get_mut(&id)
            .ok_or(EngineError::ReservationNotFound)?;

        if reservation.status != ReservationStatus::Pending {
            return Err(EngineError::InvalidState(format!(
                "reservation is {}",
                reservation.status.as_str()
            )));
        }
        if now > reservation.expires_at {
            reservation.status = ReservationStatus::Expired;
            return Ok(PendingLock::Expired(reservation.clone()));
        }
        Ok(PendingLock::Ready(reservation.clone()))
    }

    async fn record_payment(&self, payment: &Payment) -> Result<(), EngineError> {
        let mut inner = self.lock();
        let reservation = inner
            .reservations
            .get_mut(&payment.reservation_id)
            .ok_or(EngineError::ReservationNotFound)?;

        if reservation.status != ReservationStatus::Pending {
            return Err(EngineError::InvalidState(format!(
                "reservation is {}",
                reservation.status.as_str()
            )));
        }
        reservation.status = ReservationStatus::Confirmed;
        reservation.payment_reference = Some(payment.transaction_id.clone());
        inner
            .payments
            .insert(payment.reservation_id, payment.clone());
        Ok(())
    }

    async fn expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>, EngineError> {
        let mut stale: Vec<Reservation> = self
            .lock()
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Pending && r.expires_at < now)
            .cloned()
            .collect();
        stale.sort_by_key(|r| r.reserved_at);
        Ok(stale)
    }

    async fn mark_expired(&self, ids: &[Uuid]) -> Result<u64, EngineError> {
        let mut inner = self.lock();
        let mut updated = 0;
        for id in ids {
            if let Some(reservation) = inner.reservations.get_mut(id) {
                if reservation.status == ReservationStatus::Pending {
                    reservation.status = ReservationStatus::Expired;
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }
}

struct HoldEntry {
    session: String,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct LockInner {
    holds: HashMap<(Uuid, Uuid), HoldEntry>,
    reservation_locks: HashMap<Uuid, DateTime<Utc>>,
}

pub struct MemorySeatLockStore {
    clock: Arc<dyn Clock>,
    inner: Mutex<LockInner>,
}

impl MemorySeatLockStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(LockInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LockInner> {
        self.inner.lock().expect("lock store poisoned")
    }

    pub fn reservation_lock_exists(&self, reservation_id: Uuid) -> bool {
        let now = self.clock.now();
        self.lock()
            .reservation_locks
            .get(&reservation_id)
            .is_some_and(|expires| *expires > now)
    }
}

#[async_trait]
impl SeatLockStore for MemorySeatLockStore {
    async fn acquire(
        &self,
        trip_id: Uuid,
        seat_id: Uuid,
        session: &str,
        ttl: Duration,
    ) -> Result<bool, EngineError> {
        let now = self.clock.now();
        let mut inner = self.lock();
        let key = (trip_id, seat_id);

        if let Some(entry) = inner.holds.get(&key) {
            if entry.expires_at > now && entry.session != session {
                return Ok(false);
            }
        }
        inner.holds.insert(
            key,
            HoldEntry {
                session: session.to_string(),
                expires_at: now + ttl_to_chrono(ttl),
            },
        );
        Ok(true)
    }

    async fn release(
        &self,
        trip_id: Uuid,
        seat_id: Uuid,
        session: &str,
    ) -> Result<bool, EngineError> {
        let now = self.clock.now();
        let mut inner = self.lock();
        let key = (trip_id, seat_id);

        match inner.holds.get(&key) {
            Some(entry) if entry.expires_at > now && entry.session == session => {
                inner.holds.remove(&key);
                Ok(true)
            }
            Some(entry) if entry.expires_at <= now => {
                inner.holds.remove(&key);
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    async fn purge(&self, trip_id: Uuid, seat_id: Uuid) -> Result<(), EngineError> {
        self.lock().holds.remove(&(trip_id, seat_id));
        Ok(())
    }

    async fn owner(&self, trip_id: Uuid, seat_id: Uuid) -> Result<Option<String>, EngineError> {
        let now = self.clock.now();
        Ok(self
            .lock()
            .holds
            .get(&(trip_id, seat_id))
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.session.clone()))
    }

    async fn locked_seats(&self, trip_id: Uuid) -> Result<HashSet<Uuid>, EngineError> {
        let now = self.clock.now();
        Ok(self
            .lock()
            .holds
            .iter()
            .filter(|((trip, _), entry)| *trip == trip_id && entry.expires_at > now)
            .map(|((_, seat), _)| *seat)
            .collect())
    }

    async fn set_reservation_lock(
        &self,
        reservation_id: Uuid,
        ttl: Duration,
    ) -> Result<(), EngineError> {
        let expires = self.clock.now() + ttl_to_chrono(ttl);
        self.lock().reservation_locks.insert(reservation_id, expires);
        Ok(())
    }

    async fn clear_reservation_lock(&self, reservation_id: Uuid) -> Result<(), EngineError> {
        self.lock().reservation_locks.remove(&reservation_id);
        Ok(())
    }
}

struct CacheEntry {
    seats: Vec<SeatStatusRecord>,
    expires_at: DateTime<Utc>,
}

pub struct MemorySnapshotCache {
    clock: Arc<dyn Clock>,
    inner: Mutex<HashMap<Uuid, CacheEntry>>,
}

impl MemorySnapshotCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SnapshotCache for MemorySnapshotCache {
    async fn get(&self, trip_id: Uuid) -> Result<Option<Vec<SeatStatusRecord>>, EngineError> {
        let now = self.clock.now();
        Ok(self
            .inner
            .lock()
            .expect("cache poisoned")
            .get(&trip_id)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.seats.clone()))
    }

    async fn put(
        &self,
        trip_id: Uuid,
        seats: &[SeatStatusRecord],
        ttl: Duration,
    ) -> Result<(), EngineError> {
        let expires_at = self.clock.now() + ttl_to_chrono(ttl);
        self.inner.lock().expect("cache poisoned").insert(
            trip_id,
            CacheEntry {
                seats: seats.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, trip_id: Uuid) -> Result<(), EngineError> {
        self.inner.lock().expect("cache poisoned").remove(&trip_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPassengerDirectory {
    inner: Mutex<HashMap<Uuid, PassengerRecord>>,
}

impl MemoryPassengerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: PassengerRecord) {
        self.inner
            .lock()
            .expect("directory poisoned")
            .insert(record.id, record);
    }
}

#[async_trait]
impl PassengerDirectory for MemoryPassengerDirectory {
    async fn resolve(&self, passenger_id: Uuid) -> Result<Option<PassengerRecord>, EngineError> {
        Ok(self
            .inner
            .lock()
            .expect("directory poisoned")
            .get(&passenger_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    #[tokio::test]
    async fn hold_entries_lapse_against_the_clock() {
        let clock = Arc::new(FixedClock::at(Utc::now()));
        let locks = MemorySeatLockStore::new(clock.clone());
        let (trip, seat) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(locks
            .acquire(trip, seat, "s1", Duration::from_secs(300))
            .await
            .unwrap());
        assert!(!locks
            .acquire(trip, seat, "s2", Duration::from_secs(300))
            .await
            .unwrap());

        clock.advance(ChronoDuration::seconds(301));
        assert_eq!(locks.owner(trip, seat).await.unwrap(), None);
        assert!(locks
            .acquire(trip, seat, "s2", Duration::from_secs(300))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn release_of_an_expired_hold_reports_nothing_removed() {
        let clock = Arc::new(FixedClock::at(Utc::now()));
        let locks = MemorySeatLockStore::new(clock.clone());
        let (trip, seat) = (Uuid::new_v4(), Uuid::new_v4());

        locks
            .acquire(trip, seat, "s1", Duration::from_secs(300))
            .await
            .unwrap();
        clock.advance(ChronoDuration::seconds(301));
        assert!(!locks.release(trip, seat, "s1").await.unwrap());
    }
}
