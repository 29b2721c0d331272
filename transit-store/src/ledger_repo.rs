use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use transit_core::models::{
    LoyaltyDiscount, Payment, Reservation, ReservationStatus, RiderPass, RouteAssignment, Vehicle,
};
use transit_core::payment::PaymentStatus;
use transit_core::repository::{LedgerStore, LedgerTx, StoreError, StoreResult};

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(Box::new(e))
}

fn corrupt(e: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(e.to_string())
}

/// Postgres-backed ledger. Every unit of work is one database transaction;
/// `lock_*` reads use `SELECT ... FOR UPDATE`.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        let tx = self.pool.begin().await.map_err(backend)?;
        Ok(Box::new(PgLedgerTx { tx }))
    }
}

pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct VehicleRow {
    id: Uuid,
    capacity: i32,
    current_occupancy: i32,
    status: String,
}

impl TryFrom<VehicleRow> for Vehicle {
    type Error = StoreError;

    fn try_from(row: VehicleRow) -> StoreResult<Self> {
        Ok(Vehicle {
            id: row.id,
            capacity: row.capacity,
            occupied: row.current_occupancy,
            status: row.status.parse().map_err(corrupt)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PassRow {
    id: Uuid,
    rider_id: Uuid,
    balance: Decimal,
    status: String,
    expires_at: DateTime<Utc>,
}

impl From<PassRow> for RiderPass {
    fn from(row: PassRow) -> Self {
        RiderPass {
            id: row.id,
            rider_id: row.rider_id,
            balance: row.balance,
            active: row.status == "active",
            expires_at: row.expires_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    rider_id: Uuid,
    vehicle_id: Uuid,
    route_id: Uuid,
    seat_labels: Vec<String>,
    total_fare: Decimal,
    currency: String,
    payment_method: String,
    status: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    boarded_at: Option<DateTime<Utc>>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = StoreError;

    fn try_from(row: ReservationRow) -> StoreResult<Self> {
        Ok(Reservation {
            id: row.id,
            rider_id: row.rider_id,
            vehicle_id: row.vehicle_id,
            route_id: row.route_id,
            seat_labels: row.seat_labels,
            total_fare: row.total_fare,
            currency: row.currency,
            payment_method: row.payment_method.parse().map_err(corrupt)?,
            status: row.status.parse().map_err(corrupt)?,
            created_at: row.created_at,
            expires_at: row.expires_at,
            boarded_at: row.boarded_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    reservation_id: Uuid,
    rider_id: Uuid,
    amount: Decimal,
    currency: String,
    payment_method: String,
    payment_status: String,
    transaction_ref: String,
    pass_id: Option<Uuid>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> StoreResult<Self> {
        Ok(Payment {
            id: row.id,
            reservation_id: row.reservation_id,
            rider_id: row.rider_id,
            amount: row.amount,
            currency: row.currency,
            method: row.payment_method.parse().map_err(corrupt)?,
            status: row.payment_status.parse().map_err(corrupt)?,
            transaction_ref: row.transaction_ref,
            pass_id: row.pass_id,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_vehicle(&mut self, vehicle_id: Uuid) -> StoreResult<Option<Vehicle>> {
        let row = sqlx::query_as::<_, VehicleRow>(
            r#"
            SELECT id, capacity, current_occupancy, status
            FROM vehicles
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(vehicle_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(backend)?;

        row.map(Vehicle::try_from).transpose()
    }

    async fn held_seat_labels(
        &mut self,
        vehicle_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<String>> {
        let rows: Vec<(Vec<String>,)> = sqlx::query_as(
            r#"
            SELECT seat_labels
            FROM reservations
            WHERE vehicle_id = $1
            AND status <> 'cancelled'
            AND expires_at > $2
            "#,
        )
        .bind(vehicle_id)
        .bind(at)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(backend)?;

        Ok(rows.into_iter().flat_map(|(labels,)| labels).collect())
    }

    async fn active_assignment(
        &mut self,
        vehicle_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<RouteAssignment>> {
        let row: Option<(Uuid, Uuid, Uuid, Decimal, DateTime<Utc>, Option<DateTime<Utc>>)> =
            sqlx::query_as(
                r#"
                SELECT a.id, a.vehicle_id, a.route_id, r.base_fare, a.starts_at, a.ends_at
                FROM route_assignments a
                JOIN routes r ON r.id = a.route_id
                WHERE a.vehicle_id = $1
                AND a.status = 'active'
                AND a.starts_at <= $2
                AND (a.ends_at IS NULL OR a.ends_at > $2)
                ORDER BY a.starts_at DESC
                LIMIT 1
                "#,
            )
            .bind(vehicle_id)
            .bind(at)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(backend)?;

        Ok(row.map(|(id, vehicle_id, route_id, base_fare, starts_at, ends_at)| RouteAssignment {
            id,
            vehicle_id,
            route_id,
            base_fare,
            starts_at,
            ends_at,
        }))
    }

    async fn loyalty_discount(
        &mut self,
        rider_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<LoyaltyDiscount>> {
        let row: Option<(Decimal, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT discount_percentage, expires_at
            FROM loyalty_discounts
            WHERE rider_id = $1
            AND expires_at > $2
            ORDER BY discount_percentage DESC
            LIMIT 1
            "#,
        )
        .bind(rider_id)
        .bind(at)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(backend)?;

        Ok(row.map(|(percentage, expires_at)| LoyaltyDiscount {
            rider_id,
            percentage,
            expires_at,
        }))
    }

    async fn lock_active_pass(
        &mut self,
        rider_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<RiderPass>> {
        let row = sqlx::query_as::<_, PassRow>(
            r#"
            SELECT id, rider_id, balance, status, expires_at
            FROM rider_passes
            WHERE rider_id = $1
            AND status = 'active'
            AND expires_at > $2
            ORDER BY expires_at DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(rider_id)
        .bind(at)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(backend)?;

        Ok(row.map(RiderPass::from))
    }

    async fn lock_pass(&mut self, pass_id: Uuid) -> StoreResult<Option<RiderPass>> {
        let row = sqlx::query_as::<_, PassRow>(
            "SELECT id, rider_id, balance, status, expires_at FROM rider_passes WHERE id = $1 FOR UPDATE",
        )
        .bind(pass_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(backend)?;

        Ok(row.map(RiderPass::from))
    }

    async fn set_pass_balance(&mut self, pass_id: Uuid, balance: Decimal) -> StoreResult<()> {
        sqlx::query("UPDATE rider_passes SET balance = $1, updated_at = NOW() WHERE id = $2")
            .bind(balance)
            .bind(pass_id)
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn set_occupancy(&mut self, vehicle_id: Uuid, occupied: i32) -> StoreResult<()> {
        sqlx::query("UPDATE vehicles SET current_occupancy = $1, updated_at = NOW() WHERE id = $2")
            .bind(occupied)
            .bind(vehicle_id)
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reservations (
                id, rider_id, vehicle_id, route_id, seat_labels, total_fare, currency,
                payment_method, status, created_at, expires_at, boarded_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(reservation.id)
        .bind(reservation.rider_id)
        .bind(reservation.vehicle_id)
        .bind(reservation.route_id)
        .bind(&reservation.seat_labels)
        .bind(reservation.total_fare)
        .bind(&reservation.currency)
        .bind(reservation.payment_method.as_str())
        .bind(reservation.status.as_str())
        .bind(reservation.created_at)
        .bind(reservation.expires_at)
        .bind(reservation.boarded_at)
        .execute(&mut *self.tx)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, reservation_id, rider_id, amount, currency, payment_method, payment_status,
                transaction_ref, pass_id, metadata, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(payment.id)
        .bind(payment.reservation_id)
        .bind(payment.rider_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.method.as_str())
        .bind(payment.status.as_str())
        .bind(&payment.transaction_ref)
        .bind(payment.pass_id)
        .bind(&payment.metadata)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn lock_reservation(
        &mut self,
        reservation_id: Uuid,
        rider_id: Uuid,
    ) -> StoreResult<Option<Reservation>> {
        let row = sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT id, rider_id, vehicle_id, route_id, seat_labels, total_fare, currency,
                   payment_method, status, created_at, expires_at, boarded_at
            FROM reservations
            WHERE id = $1 AND rider_id = $2
            FOR UPDATE
            "#,
        )
        .bind(reservation_id)
        .bind(rider_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(backend)?;

        row.map(Reservation::try_from).transpose()
    }

    async fn payment_for_reservation(&mut self, reservation_id: Uuid) -> StoreResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, reservation_id, rider_id, amount, currency, payment_method, payment_status,
                   transaction_ref, pass_id, metadata, created_at, updated_at
            FROM payments
            WHERE reservation_id = $1
            FOR UPDATE
            "#,
        )
        .bind(reservation_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(backend)?;

        row.map(Payment::try_from).transpose()
    }

    async fn set_reservation_status(
        &mut self,
        reservation_id: Uuid,
        status: ReservationStatus,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE reservations SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(reservation_id)
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn set_payment_status(
        &mut self,
        payment_id: Uuid,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE payments SET payment_status = $1, updated_at = $2 WHERE id = $3")
            .bind(status.as_str())
            .bind(at)
            .bind(payment_id)
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(backend)
    }
}
