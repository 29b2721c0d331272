use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use transit_core::models::{
    LoyaltyDiscount, Payment, Reservation, ReservationStatus, RiderPass, RouteAssignment, Vehicle,
};
use transit_core::payment::PaymentStatus;
use transit_core::repository::{LedgerStore, LedgerTx, StoreError, StoreResult};

/// Full contents of an in-memory ledger
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerSnapshot {
    pub vehicles: HashMap<Uuid, Vehicle>,
    pub assignments: Vec<RouteAssignment>,
    pub discounts: Vec<LoyaltyDiscount>,
    pub passes: HashMap<Uuid, RiderPass>,
    pub reservations: HashMap<Uuid, Reservation>,
    pub payments: HashMap<Uuid, Payment>,
}

/// Ledger kept in process memory, for tests and local runs.
///
/// A unit of work owns the ledger lock from `begin` until it is committed or
/// dropped, so units of work are fully serialized. Writes go to a staged copy
/// that only replaces the live ledger on commit.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<LedgerSnapshot>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_vehicle(&self, vehicle: Vehicle) {
        self.state.lock().await.vehicles.insert(vehicle.id, vehicle);
    }

    pub async fn put_assignment(&self, assignment: RouteAssignment) {
        self.state.lock().await.assignments.push(assignment);
    }

    pub async fn put_discount(&self, discount: LoyaltyDiscount) {
        self.state.lock().await.discounts.push(discount);
    }

    pub async fn put_pass(&self, pass: RiderPass) {
        self.state.lock().await.passes.insert(pass.id, pass);
    }

    pub async fn put_reservation(&self, reservation: Reservation) {
        self.state.lock().await.reservations.insert(reservation.id, reservation);
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.state.lock().await.clone()
    }

    pub async fn vehicle(&self, id: Uuid) -> Option<Vehicle> {
        self.state.lock().await.vehicles.get(&id).cloned()
    }

    pub async fn pass(&self, id: Uuid) -> Option<RiderPass> {
        self.state.lock().await.passes.get(&id).cloned()
    }

    pub async fn reservation(&self, id: Uuid) -> Option<Reservation> {
        self.state.lock().await.reservations.get(&id).cloned()
    }

    pub async fn payment_for(&self, reservation_id: Uuid) -> Option<Payment> {
        self.state
            .lock()
            .await
            .payments
            .values()
            .find(|p| p.reservation_id == reservation_id)
            .cloned()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(InMemoryTx { guard, staged }))
    }
}

pub struct InMemoryTx {
    guard: OwnedMutexGuard<LedgerSnapshot>,
    staged: LedgerSnapshot,
}

fn missing(what: &str, id: Uuid) -> StoreError {
    StoreError::Corrupt(format!("{} {} does not exist", what, id))
}

#[async_trait]
impl LedgerTx for InMemoryTx {
    async fn lock_vehicle(&mut self, vehicle_id: Uuid) -> StoreResult<Option<Vehicle>> {
        Ok(self.staged.vehicles.get(&vehicle_id).cloned())
    }

    async fn held_seat_labels(
        &mut self,
        vehicle_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<String>> {
        Ok(self
            .staged
            .reservations
            .values()
            .filter(|r| r.vehicle_id == vehicle_id && r.holds_seats(at))
            .flat_map(|r| r.seat_labels.iter().cloned())
            .collect())
    }

    async fn active_assignment(
        &mut self,
        vehicle_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<RouteAssignment>> {
        Ok(self
            .staged
            .assignments
            .iter()
            .filter(|a| a.vehicle_id == vehicle_id && a.covers(at))
            .max_by_key(|a| a.starts_at)
            .cloned())
    }

    async fn loyalty_discount(
        &mut self,
        rider_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<LoyaltyDiscount>> {
        Ok(self
            .staged
            .discounts
            .iter()
            .filter(|d| d.rider_id == rider_id && d.is_active(at))
            .max_by_key(|d| d.percentage)
            .cloned())
    }

    async fn lock_active_pass(
        &mut self,
        rider_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<RiderPass>> {
        Ok(self
            .staged
            .passes
            .values()
            .filter(|p| p.rider_id == rider_id && p.is_usable(at))
            .max_by_key(|p| p.expires_at)
            .cloned())
    }

    async fn lock_pass(&mut self, pass_id: Uuid) -> StoreResult<Option<RiderPass>> {
        Ok(self.staged.passes.get(&pass_id).cloned())
    }

    async fn set_pass_balance(&mut self, pass_id: Uuid, balance: Decimal) -> StoreResult<()> {
        let pass = self
            .staged
            .passes
            .get_mut(&pass_id)
            .ok_or_else(|| missing("pass", pass_id))?;
        pass.balance = balance;
        Ok(())
    }

    async fn set_occupancy(&mut self, vehicle_id: Uuid, occupied: i32) -> StoreResult<()> {
        let vehicle = self
            .staged
            .vehicles
            .get_mut(&vehicle_id)
            .ok_or_else(|| missing("vehicle", vehicle_id))?;
        if occupied < 0 || occupied > vehicle.capacity {
            return Err(StoreError::Corrupt(format!(
                "occupancy {} outside [0, {}] for vehicle {}",
                occupied, vehicle.capacity, vehicle_id
            )));
        }
        vehicle.occupied = occupied;
        Ok(())
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> StoreResult<()> {
        if self.staged.reservations.contains_key(&reservation.id) {
            return Err(StoreError::Corrupt(format!("duplicate reservation {}", reservation.id)));
        }
        self.staged.reservations.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        if self
            .staged
            .payments
            .values()
            .any(|p| p.reservation_id == payment.reservation_id)
        {
            return Err(StoreError::Corrupt(format!(
                "reservation {} already has a payment",
                payment.reservation_id
            )));
        }
        self.staged.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn lock_reservation(
        &mut self,
        reservation_id: Uuid,
        rider_id: Uuid,
    ) -> StoreResult<Option<Reservation>> {
        Ok(self
            .staged
            .reservations
            .get(&reservation_id)
            .filter(|r| r.rider_id == rider_id)
            .cloned())
    }

    async fn payment_for_reservation(&mut self, reservation_id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self
            .staged
            .payments
            .values()
            .find(|p| p.reservation_id == reservation_id)
            .cloned())
    }

    async fn set_reservation_status(
        &mut self,
        reservation_id: Uuid,
        status: ReservationStatus,
    ) -> StoreResult<()> {
        let reservation = self
            .staged
            .reservations
            .get_mut(&reservation_id)
            .ok_or_else(|| missing("reservation", reservation_id))?;
        reservation.status = status;
        Ok(())
    }

    async fn set_payment_status(
        &mut self,
        payment_id: Uuid,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let payment = self
            .staged
            .payments
            .get_mut(&payment_id)
            .ok_or_else(|| missing("payment", payment_id))?;
        payment.status = status;
        payment.updated_at = at;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}
