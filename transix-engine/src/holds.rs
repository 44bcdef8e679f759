use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::broadcast::Broadcaster;
use crate::error::EngineError;
use crate::repository::SeatLockStore;

/// Owns soft-lock acquisition, renewal and release. Holds are a UX
/// optimization that steer sessions away from doomed checkouts; the
/// committer's transactional check stays the source of truth.
pub struct HoldManager {
    locks: Arc<dyn SeatLockStore>,
    broadcaster: Broadcaster,
    hold_ttl: Duration,
}

impl HoldManager {
    pub fn new(locks: Arc<dyn SeatLockStore>, broadcaster: Broadcaster, hold_ttl: Duration) -> Self {
        Self {
            locks,
            broadcaster,
            hold_ttl,
        }
    }

    /// Take the hold on (trip, seat) for `session`, or renew it when the
    /// session already owns it. A live hold owned by anyone else rejects
    /// the caller with `LockConflict`.
    pub async fn acquire(
        &self,
        trip_id: Uuid,
        seat_id: Uuid,
        session: &str,
    ) -> Result<(), EngineError> {
        let acquired = match self
            .locks
            .acquire(trip_id, seat_id, session, self.hold_ttl)
            .await
        {
            Ok(acquired) => acquired,
            Err(e) => {
                // Advisory store: a transport failure must not block seat
                // selection, the committer re-validates durably.
                warn!(%trip_id, %seat_id, error = %e, "lock store unavailable during acquire");
                true
            }
        };

        if !acquired {
            return Err(EngineError::LockConflict);
        }

        info!(%trip_id, %seat_id, session, "seat hold acquired");
        self.broadcaster.refresh_trip(trip_id).await;
        Ok(())
    }

    /// Release the hold if `session` owns it; returns whether a hold was
    /// removed. Releasing someone else's hold (or nothing) is not an error.
    pub async fn release(&self, trip_id: Uuid, seat_id: Uuid, session: &str) -> bool {
        let released = match self.locks.release(trip_id, seat_id, session).await {
            Ok(released) => released,
            Err(e) => {
                warn!(%trip_id, %seat_id, error = %e, "lock store unavailable during release");
                false
            }
        };

        if released {
            info!(%trip_id, %seat_id, session, "seat hold released");
            self.broadcaster.refresh_trip(trip_id).await;
        }
        released
    }
}
