pub mod availability;
pub mod events;
pub mod messages;
pub mod reservation;
pub mod trip;

pub use availability::{SeatStatus, SeatStatusRecord};
pub use events::StreamEvent;
pub use messages::{ClientMessage, ServerMessage};
pub use reservation::{
    CardDetails, PassengerDetails, PassengerRecord, Payment, PaymentMethod, PaymentStatus,
    Reservation, ReservationStatus,
};
pub use trip::{Seat, Trip, TripStatus};
