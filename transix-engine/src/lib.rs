pub mod availability;
pub mod broadcast;
pub mod clock;
pub mod codes;
pub mod committer;
pub mod error;
pub mod holds;
pub mod memory;
pub mod payment;
pub mod repository;
pub mod service;
pub mod sweeper;

pub use availability::AvailabilityView;
pub use broadcast::Broadcaster;
pub use clock::{Clock, FixedClock, SystemClock};
pub use committer::ReservationCommitter;
pub use error::EngineError;
pub use holds::HoldManager;
pub use payment::{PaymentGateway, PaymentOutcome, SimulatedPaymentGateway};
pub use repository::{
    NewReservation, PassengerDirectory, PendingLock, ReservationStore, SeatLockStore,
    SnapshotCache,
};
pub use service::{ReservationService, ServiceConfig};
pub use sweeper::{ExpirySweeper, SweepReport};
