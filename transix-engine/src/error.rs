/// Recoverable failures of the reservation engine. All of these are reported
/// to the caller as a structured failure with a readable reason; none crash
/// the process.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("seat is held by another session")]
    LockConflict,

    #[error("seat hold is missing or expired")]
    LockInvalid,

    #[error("seat is already reserved for this trip")]
    AlreadyReserved,

    #[error("passenger not found")]
    PassengerNotFound,

    #[error("reservation not found")]
    ReservationNotFound,

    #[error("invalid reservation state: {0}")]
    InvalidState(String),

    #[error("reservation has expired")]
    ReservationExpired,

    #[error("payment declined: {0}")]
    PaymentDeclined(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}
