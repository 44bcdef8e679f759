use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, warn};
use uuid::Uuid;

use transix_domain::{ReservationStatus, StreamEvent};

use crate::availability::AvailabilityView;
use crate::clock::Clock;
use crate::repository::SnapshotCache;

/// Fan-out of seat and reservation updates to every live subscriber. One
/// process-wide channel; subscribers filter by trip or reservation id.
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<StreamEvent>,
    view: AvailabilityView,
    cache: Arc<dyn SnapshotCache>,
    clock: Arc<dyn Clock>,
}

impl Broadcaster {
    pub fn new(
        view: AvailabilityView,
        cache: Arc<dyn SnapshotCache>,
        clock: Arc<dyn Clock>,
        capacity: usize,
    ) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            view,
            cache,
            clock,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.tx.subscribe()
    }

    /// Invalidate the trip's cached snapshot, recompute it and publish the
    /// refreshed view. Invalidation happens before the recompute so no
    /// reader observes a cache older than the mutation that triggered this.
    /// Failures are logged: a broadcast never fails a mutation that already
    /// committed.
    pub async fn refresh_trip(&self, trip_id: Uuid) {
        if let Err(e) = self.cache.invalidate(trip_id).await {
            warn!(%trip_id, error = %e, "snapshot cache invalidation failed");
        }
        match self.view.compute(trip_id).await {
            Ok(seats) => {
                let _ = self.tx.send(StreamEvent::SeatStatusUpdate {
                    trip_id,
                    seats,
                    timestamp: self.clock.now(),
                });
            }
            Err(e) => error!(%trip_id, error = %e, "seat update broadcast failed"),
        }
    }

    /// Status-only update on the reservation's own topic.
    pub fn reservation_update(&self, reservation_id: Uuid, status: ReservationStatus) {
        let _ = self.tx.send(StreamEvent::ReservationStatusUpdate {
            reservation_id,
            status,
            timestamp: self.clock.now(),
        });
    }
}
