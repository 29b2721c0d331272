use rust_decimal::Decimal;
use uuid::Uuid;

use crate::payment::PaymentError;
use crate::repository::StoreError;

/// Caller-facing class of a failure, translated to a transport status by the
/// request layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Conflict,
    PaymentRequired,
    Unprocessable,
    Upstream,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("Invalid reservation request: {0}")]
    InvalidRequest(String),

    #[error("Vehicle {0} not found or inactive")]
    VehicleUnavailable(Uuid),

    #[error("Cannot reserve {requested} seats: vehicle capacity is {capacity} with {held} already held")]
    SeatCountExceedsCapacity {
        requested: usize,
        held: usize,
        capacity: i32,
    },

    #[error("Seat {0} is already held")]
    SeatAlreadyHeld(String),

    #[error("No fare is configured for vehicle {0}")]
    RouteNotConfigured(Uuid),

    #[error("Cannot process a reservation with fare {0}")]
    InvalidFare(Decimal),

    #[error("Insufficient pass balance")]
    InsufficientBalance,

    #[error("Payment processing failed: {0}")]
    PaymentFailed(#[source] PaymentError),

    #[error("Reservation {0} not found")]
    ReservationNotFound(Uuid),

    #[error("Reservation {0} is already cancelled")]
    AlreadyCancelled(Uuid),

    #[error("Cannot cancel completed reservation {0}")]
    CannotCancelCompleted(Uuid),

    #[error("Refund failed: {0}")]
    RefundFailed(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl ReservationError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ReservationError::InvalidRequest(_) => "INVALID_REQUEST",
            ReservationError::VehicleUnavailable(_) => "VEHICLE_NOT_FOUND",
            ReservationError::SeatCountExceedsCapacity { .. } => "INVALID_SEAT_COUNT",
            ReservationError::SeatAlreadyHeld(_) => "SEAT_ALREADY_HELD",
            ReservationError::RouteNotConfigured(_) => "ROUTE_NOT_CONFIGURED",
            ReservationError::InvalidFare(_) => "INVALID_FARE",
            ReservationError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            ReservationError::PaymentFailed(_) => "PAYMENT_FAILED",
            ReservationError::ReservationNotFound(_) => "RESERVATION_NOT_FOUND",
            ReservationError::AlreadyCancelled(_) => "ALREADY_CANCELLED",
            ReservationError::CannotCancelCompleted(_) => "CANNOT_CANCEL_COMPLETED",
            ReservationError::RefundFailed(_) => "REFUND_FAILED",
            ReservationError::Storage(_) => "STORAGE_ERROR",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ReservationError::InvalidRequest(_) => ErrorKind::BadRequest,
            ReservationError::VehicleUnavailable(_) | ReservationError::ReservationNotFound(_) => {
                ErrorKind::NotFound
            }
            ReservationError::SeatCountExceedsCapacity { .. }
            | ReservationError::SeatAlreadyHeld(_)
            | ReservationError::AlreadyCancelled(_)
            | ReservationError::CannotCancelCompleted(_) => ErrorKind::Conflict,
            ReservationError::RouteNotConfigured(_) | ReservationError::InvalidFare(_) => {
                ErrorKind::Unprocessable
            }
            ReservationError::InsufficientBalance | ReservationError::PaymentFailed(_) => {
                ErrorKind::PaymentRequired
            }
            ReservationError::RefundFailed(_) => ErrorKind::Upstream,
            ReservationError::Storage(_) => ErrorKind::Internal,
        }
    }
}
