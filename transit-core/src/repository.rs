use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{LoyaltyDiscount, Payment, Reservation, ReservationStatus, RiderPass, RouteAssignment, Vehicle};
use crate::payment::PaymentStatus;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Corrupt ledger record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Transactional store holding vehicles, reservations, payments and passes.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a unit of work. Dropping it without `commit` rolls it back.
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>>;
}

/// One isolated unit of work against the ledger.
///
/// The `lock_*` reads take an exclusive row lock that is held until the unit
/// of work ends. Lock order is reservation, then vehicle, then pass.
#[async_trait]
pub trait LedgerTx: Send {
    async fn lock_vehicle(&mut self, vehicle_id: Uuid) -> StoreResult<Option<Vehicle>>;

    /// Seat labels of every reservation on the vehicle that still holds seats at `at`
    async fn held_seat_labels(
        &mut self,
        vehicle_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<String>>;

    async fn active_assignment(
        &mut self,
        vehicle_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<RouteAssignment>>;

    async fn loyalty_discount(
        &mut self,
        rider_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<LoyaltyDiscount>>;

    /// The rider's usable pass with the latest expiry, locked
    async fn lock_active_pass(
        &mut self,
        rider_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<RiderPass>>;

    async fn lock_pass(&mut self, pass_id: Uuid) -> StoreResult<Option<RiderPass>>;

    async fn set_pass_balance(&mut self, pass_id: Uuid, balance: Decimal) -> StoreResult<()>;

    async fn set_occupancy(&mut self, vehicle_id: Uuid, occupied: i32) -> StoreResult<()>;

    async fn insert_reservation(&mut self, reservation: &Reservation) -> StoreResult<()>;

    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()>;

    /// Loads a reservation owned by `rider_id`, locked
    async fn lock_reservation(
        &mut self,
        reservation_id: Uuid,
        rider_id: Uuid,
    ) -> StoreResult<Option<Reservation>>;

    async fn payment_for_reservation(&mut self, reservation_id: Uuid) -> StoreResult<Option<Payment>>;

    async fn set_reservation_status(
        &mut self,
        reservation_id: Uuid,
        status: ReservationStatus,
    ) -> StoreResult<()>;

    async fn set_payment_status(
        &mut self,
        payment_id: Uuid,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
