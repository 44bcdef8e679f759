use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use transix_domain::ReservationStatus;

use crate::broadcast::Broadcaster;
use crate::clock::Clock;
use crate::error::EngineError;
use crate::repository::{ReservationStore, SeatLockStore};

/// What one sweep did: which reservations expired and which trips were
/// refreshed. An empty report means the run was a no-op.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub expired: Vec<Uuid>,
    pub trips: Vec<Uuid>,
    pub swept_at: Option<DateTime<Utc>>,
}

/// Expires stale pending reservations. A pure function over "now" and store
/// state: callable from a timer or on demand, idempotent, no hidden state.
pub struct ExpirySweeper {
    store: Arc<dyn ReservationStore>,
    locks: Arc<dyn SeatLockStore>,
    broadcaster: Broadcaster,
    clock: Arc<dyn Clock>,
}

impl ExpirySweeper {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        locks: Arc<dyn SeatLockStore>,
        broadcaster: Broadcaster,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            locks,
            broadcaster,
            clock,
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport, EngineError> {
        let now = self.clock.now();
        let stale = self.store.expired_pending(now).await?;
        if stale.is_empty() {
            return Ok(SweepReport::default());
        }

        // Reservation locks are bookkeeping; absence is not an error.
        for reservation in &stale {
            if let Err(e) = self.locks.clear_reservation_lock(reservation.id).await {
                warn!(reservation_id = %reservation.id, error = %e, "failed to clear reservation lock");
            }
        }

        let ids: Vec<Uuid> = stale.iter().map(|r| r.id).collect();
        let updated = self.store.mark_expired(&ids).await?;
        info!(count = updated, "expired stale pending reservations");

        let trips: BTreeSet<Uuid> = stale.iter().map(|r| r.trip_id).collect();
        for trip_id in &trips {
            self.broadcaster.refresh_trip(*trip_id).await;
        }
        for reservation in &stale {
            self.broadcaster
                .reservation_update(reservation.id, ReservationStatus::Expired);
        }

        Ok(SweepReport {
            expired: ids,
            trips: trips.into_iter().collect(),
            swept_at: Some(now),
        })
    }
}
