use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tokio::sync::broadcast;
use uuid::Uuid;

use transix_domain::{Reservation, StreamEvent};

use crate::availability::AvailabilityView;
use crate::broadcast::Broadcaster;
use crate::clock::Clock;
use crate::committer::ReservationCommitter;
use crate::error::EngineError;
use crate::holds::HoldManager;
use crate::payment::PaymentGateway;
use crate::repository::{PassengerDirectory, ReservationStore, SeatLockStore, SnapshotCache};
use crate::sweeper::ExpirySweeper;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Soft hold lifetime.
    pub seat_hold_ttl: Duration,
    /// Bookkeeping lock created per reservation.
    pub reservation_lock_ttl: Duration,
    /// How long a pending reservation may await payment.
    pub payment_window: ChronoDuration,
    /// Seat snapshot cache lifetime.
    pub snapshot_cache_ttl: Duration,
    /// Broadcast channel depth before slow subscribers start lagging.
    pub broadcast_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            seat_hold_ttl: Duration::from_secs(300),
            reservation_lock_ttl: Duration::from_secs(900),
            payment_window: ChronoDuration::minutes(15),
            snapshot_cache_ttl: Duration::from_secs(300),
            broadcast_capacity: 128,
        }
    }
}

/// The process-wide reservation service: constructed once at startup with
/// its store handles and passed by reference to every request-handling
/// unit. There is no module-level instance; lifecycle is the caller's.
pub struct ReservationService {
    pub availability: AvailabilityView,
    pub holds: HoldManager,
    pub committer: ReservationCommitter,
    pub sweeper: ExpirySweeper,
    broadcaster: Broadcaster,
    store: Arc<dyn ReservationStore>,
}

impl ReservationService {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        locks: Arc<dyn SeatLockStore>,
        cache: Arc<dyn SnapshotCache>,
        passengers: Arc<dyn PassengerDirectory>,
        payments: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        config: ServiceConfig,
    ) -> Self {
        let availability = AvailabilityView::new(
            store.clone(),
            locks.clone(),
            cache.clone(),
            config.snapshot_cache_ttl,
        );
        let broadcaster = Broadcaster::new(
            availability.clone(),
            cache,
            clock.clone(),
            config.broadcast_capacity,
        );
        let holds = HoldManager::new(locks.clone(), broadcaster.clone(), config.seat_hold_ttl);
        let committer = ReservationCommitter::new(
            store.clone(),
            locks.clone(),
            passengers,
            payments,
            broadcaster.clone(),
            clock.clone(),
            config.payment_window,
            config.reservation_lock_ttl,
        );
        let sweeper = ExpirySweeper::new(store.clone(), locks, broadcaster.clone(), clock);

        Self {
            availability,
            holds,
            committer,
            sweeper,
            broadcaster,
            store,
        }
    }

    /// Subscribe to the seat/reservation update stream.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.broadcaster.subscribe()
    }

    pub async fn reservation(&self, id: Uuid) -> Result<Option<Reservation>, EngineError> {
        self.store.get_reservation(id).await
    }
}
