pub mod error;
pub mod models;
pub mod payment;
pub mod repository;

pub use error::{ErrorKind, ReservationError};
pub use models::{
    LoyaltyDiscount, Payment, Reservation, ReservationStatus, RiderPass, RouteAssignment, Vehicle,
    VehicleStatus,
};
pub use payment::{
    PaymentError, PaymentMethod, PaymentProcessor, PaymentReceipt, PaymentRequest, PaymentStatus,
    Settlement,
};
pub use repository::{LedgerStore, LedgerTx, StoreError, StoreResult};

pub type ReservationResult<T> = Result<T, ReservationError>;
