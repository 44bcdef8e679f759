use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;
use uuid::Uuid;

use transix_domain::{SeatStatus, SeatStatusRecord};

use crate::error::EngineError;
use crate::repository::{ReservationStore, SeatLockStore, SnapshotCache};

/// Merged seat-status view for a trip: reserved beats temp-locked beats
/// available. Results are cached for a short interval; mutators go through
/// [`crate::broadcast::Broadcaster::refresh_trip`], which invalidates before
/// recomputing so readers never see a cache older than the mutation.
#[derive(Clone)]
pub struct AvailabilityView {
    store: Arc<dyn ReservationStore>,
    locks: Arc<dyn SeatLockStore>,
    cache: Arc<dyn SnapshotCache>,
    cache_ttl: Duration,
}

impl AvailabilityView {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        locks: Arc<dyn SeatLockStore>,
        cache: Arc<dyn SnapshotCache>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            store,
            locks,
            cache,
            cache_ttl,
        }
    }

    /// Seat snapshot for the trip, read through the cache. An unknown trip
    /// reads as "no seats" rather than an error.
    pub async fn trip_seats(&self, trip_id: Uuid) -> Result<Vec<SeatStatusRecord>, EngineError> {
        match self.cache.get(trip_id).await {
            Ok(Some(seats)) => return Ok(seats),
            Ok(None) => {}
            Err(e) => warn!(%trip_id, error = %e, "snapshot cache read failed, recomputing"),
        }
        self.compute(trip_id).await
    }

    /// Recompute the snapshot from the stores and refresh the cache entry.
    pub async fn compute(&self, trip_id: Uuid) -> Result<Vec<SeatStatusRecord>, EngineError> {
        let trip = match self.store.get_trip(trip_id).await? {
            Some(trip) => trip,
            None => return Ok(Vec::new()),
        };

        let seats = self.store.seats_for_vehicle(trip.vehicle_id).await?;
        let reserved = self.store.active_seat_ids(trip_id).await?;
        // The lock store is advisory; if it is unreachable the seats simply
        // show as unheld until the durable check catches any conflict.
        let held = match self.locks.locked_seats(trip_id).await {
            Ok(held) => held,
            Err(e) => {
                warn!(%trip_id, error = %e, "lock store unavailable, treating seats as unheld");
                HashSet::new()
            }
        };

        let mut records = Vec::with_capacity(seats.len());
        for seat in seats {
            let status = if reserved.contains(&seat.id) {
                SeatStatus::Reserved
            } else if held.contains(&seat.id) {
                SeatStatus::TempLocked
            } else {
                SeatStatus::Available
            };
            records.push(SeatStatusRecord {
                id: seat.id,
                seat_number: seat.seat_number,
                row_number: seat.row_number,
                seat_letter: seat.seat_letter,
                is_window: seat.is_window,
                status,
            });
        }

        if let Err(e) = self.cache.put(trip_id, &records, self.cache_ttl).await {
            warn!(%trip_id, error = %e, "snapshot cache write failed");
        }
        Ok(records)
    }
}
