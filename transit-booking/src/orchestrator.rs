use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use transit_core::models::{Payment, Reservation, ReservationStatus, Vehicle};
use transit_core::payment::{
    PaymentError, PaymentMethod, PaymentProcessor, PaymentRequest, PaymentStatus, Settlement,
};
use transit_core::repository::{LedgerStore, LedgerTx, StoreError};
use transit_core::{ReservationError, ReservationResult};

use crate::events::ReservationEvent;
use crate::fare::{FareCalculator, FareQuote};

const PAYMENT_DESCRIPTION: &str = "Transit reservation payment";

/// Tunables for the reservation workflow
#[derive(Debug, Clone)]
pub struct ReservationRules {
    /// How long a fresh reservation holds its seats
    pub hold_window: Duration,
    pub currency: String,
}

impl Default for ReservationRules {
    fn default() -> Self {
        Self {
            hold_window: Duration::minutes(15),
            currency: "KES".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReservation {
    pub vehicle_id: Uuid,
    pub seat_labels: Vec<String>,
    pub payment_method: PaymentMethod,
    pub rider_id: Uuid,
}

/// Money taken for a reservation, before it is recorded
struct Settled {
    settlement: Settlement,
    transaction_ref: String,
    pass_id: Option<Uuid>,
}

/// Runs seat reservation and cancellation as single units of work against
/// the ledger.
///
/// Creation: availability check, fare, payment, reservation + payment records,
/// occupancy increment. Cancellation: status check, compensating refund,
/// status updates, occupancy decrement. Either every step commits or none does.
pub struct ReservationOrchestrator {
    store: Arc<dyn LedgerStore>,
    processor: Arc<dyn PaymentProcessor>,
    rules: ReservationRules,
    events: broadcast::Sender<ReservationEvent>,
}

impl ReservationOrchestrator {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        processor: Arc<dyn PaymentProcessor>,
        rules: ReservationRules,
    ) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            store,
            processor,
            rules,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReservationEvent> {
        self.events.subscribe()
    }

    pub async fn create_reservation(
        &self,
        request: CreateReservation,
    ) -> ReservationResult<Reservation> {
        validate_seat_labels(&request.seat_labels)?;

        let now = Utc::now();
        let reservation_id = Uuid::new_v4();
        let seat_count = request.seat_labels.len();

        // Any early return drops `tx`, which rolls the unit of work back
        let mut tx = self.store.begin().await?;

        // 1. Availability (locks the vehicle row)
        let vehicle =
            check_availability(tx.as_mut(), request.vehicle_id, &request.seat_labels, now).await?;

        // 2. Fare, same snapshot
        let quote = FareCalculator::compute_fare(
            tx.as_mut(),
            vehicle.id,
            seat_count,
            request.rider_id,
            now,
        )
        .await?;

        // 3. Payment
        let settled = match request.payment_method.settlement() {
            Settlement::Balance => {
                self.debit_pass(tx.as_mut(), request.rider_id, quote.total, now)
                    .await?
            }
            Settlement::Gateway => self.charge_gateway(&request, &quote, reservation_id).await?,
        };

        let reservation = Reservation {
            id: reservation_id,
            rider_id: request.rider_id,
            vehicle_id: vehicle.id,
            route_id: quote.route_id,
            seat_labels: request.seat_labels,
            total_fare: quote.total,
            currency: self.rules.currency.clone(),
            payment_method: request.payment_method,
            status: ReservationStatus::Confirmed,
            created_at: now,
            expires_at: now + self.rules.hold_window,
            boarded_at: None,
        };

        let payment = Payment {
            id: Uuid::new_v4(),
            reservation_id,
            rider_id: request.rider_id,
            amount: quote.total,
            currency: self.rules.currency.clone(),
            method: request.payment_method,
            status: PaymentStatus::Completed,
            transaction_ref: settled.transaction_ref.clone(),
            pass_id: settled.pass_id,
            metadata: serde_json::json!({
                "booking_type": "transit_ride",
                "seat_count": seat_count,
                "route_id": quote.route_id,
            }),
            created_at: now,
            updated_at: now,
        };

        // 4-6. Persist, occupancy, commit
        if let Err(e) = persist(tx, &vehicle, &reservation, &payment).await {
            error!("Failed to record reservation {}: {}", reservation_id, e);
            if settled.settlement == Settlement::Gateway {
                self.compensate_charge(&settled.transaction_ref).await;
            }
            return Err(e);
        }

        info!(
            "Reservation {} confirmed: vehicle {} seats {:?} fare {} {}",
            reservation.id,
            reservation.vehicle_id,
            reservation.seat_labels,
            reservation.total_fare,
            reservation.currency
        );

        let _ = self.events.send(ReservationEvent::Confirmed {
            reservation_id: reservation.id,
            rider_id: reservation.rider_id,
            vehicle_id: reservation.vehicle_id,
            seat_labels: reservation.seat_labels.clone(),
            total_fare: reservation.total_fare,
            occurred_at: now,
        });

        Ok(reservation)
    }

    pub async fn cancel_reservation(
        &self,
        reservation_id: Uuid,
        rider_id: Uuid,
    ) -> ReservationResult<()> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        // 1. Ownership
        let reservation = tx
            .lock_reservation(reservation_id, rider_id)
            .await?
            .ok_or(ReservationError::ReservationNotFound(reservation_id))?;

        // 2. Status
        match reservation.status {
            ReservationStatus::Confirmed => {}
            ReservationStatus::Cancelled => {
                warn!("Reservation {} is already cancelled", reservation_id);
                return Err(ReservationError::AlreadyCancelled(reservation_id));
            }
            ReservationStatus::Completed => {
                warn!("Reservation {} is already completed", reservation_id);
                return Err(ReservationError::CannotCancelCompleted(reservation_id));
            }
        }

        // Serialize with creations on the same vehicle
        let vehicle = tx
            .lock_vehicle(reservation.vehicle_id)
            .await?
            .ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "reservation {} references missing vehicle {}",
                    reservation_id, reservation.vehicle_id
                ))
            })?;

        // 3-4. Compensate the payment
        let mut refunded_amount = None;
        match tx.payment_for_reservation(reservation_id).await? {
            Some(payment) if payment.status == PaymentStatus::Completed => {
                self.refund(tx.as_mut(), &payment).await?;
                tx.set_payment_status(payment.id, PaymentStatus::Refunded, now).await?;
                refunded_amount = Some(payment.amount);
            }
            Some(payment) => {
                warn!(
                    "Payment {} for reservation {} is {}, nothing to refund",
                    payment.id,
                    reservation_id,
                    payment.status.as_str()
                );
            }
            None => warn!("Reservation {} has no payment record", reservation_id),
        }
        tx.set_reservation_status(reservation_id, ReservationStatus::Cancelled).await?;

        // 5. Occupancy
        let seat_count = reservation.seat_count();
        tx.set_occupancy(vehicle.id, vehicle.occupancy_after(-seat_count)).await?;

        // 6. Commit
        tx.commit().await?;

        info!("Successfully cancelled reservation {} for rider {}", reservation_id, rider_id);

        let _ = self.events.send(ReservationEvent::Cancelled {
            reservation_id,
            rider_id,
            vehicle_id: vehicle.id,
            seat_count,
            refunded_amount,
            occurred_at: now,
        });

        Ok(())
    }

    async fn debit_pass(
        &self,
        tx: &mut dyn LedgerTx,
        rider_id: Uuid,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> ReservationResult<Settled> {
        let pass = match tx.lock_active_pass(rider_id, now).await? {
            Some(pass) => pass,
            None => {
                warn!("No active pass found for rider {}", rider_id);
                return Err(ReservationError::InsufficientBalance);
            }
        };

        if pass.balance < amount {
            warn!("Insufficient pass balance: {} < {}", pass.balance, amount);
            return Err(ReservationError::InsufficientBalance);
        }

        tx.set_pass_balance(pass.id, pass.balance - amount).await?;

        Ok(Settled {
            settlement: Settlement::Balance,
            transaction_ref: format!("PASS_{}", Uuid::new_v4().simple()),
            pass_id: Some(pass.id),
        })
    }

    async fn charge_gateway(
        &self,
        request: &CreateReservation,
        quote: &FareQuote,
        reservation_id: Uuid,
    ) -> ReservationResult<Settled> {
        let payment_request = PaymentRequest {
            reservation_id,
            rider_id: request.rider_id,
            amount: quote.total,
            currency: self.rules.currency.clone(),
            method: request.payment_method,
            description: PAYMENT_DESCRIPTION.to_string(),
            metadata: serde_json::json!({
                "booking_type": "transit_ride",
                "seat_count": quote.seat_count,
                "route_id": quote.route_id,
            }),
        };

        let receipt = self.processor.process(&payment_request).await.map_err(|e| {
            warn!("Payment for reservation {} failed: {}", reservation_id, e);
            ReservationError::PaymentFailed(e)
        })?;

        if receipt.status != PaymentStatus::Completed {
            warn!(
                "Charge {} returned status {}, voiding it",
                receipt.transaction_ref,
                receipt.status.as_str()
            );
            if let Err(e) = self.processor.cancel(&receipt.transaction_ref).await {
                error!("Failed to void charge {}: {}", receipt.transaction_ref, e);
            }
            return Err(ReservationError::PaymentFailed(PaymentError::Declined(format!(
                "charge {} is {}",
                receipt.transaction_ref,
                receipt.status.as_str()
            ))));
        }

        Ok(Settled {
            settlement: Settlement::Gateway,
            transaction_ref: receipt.transaction_ref,
            pass_id: None,
        })
    }

    async fn refund(&self, tx: &mut dyn LedgerTx, payment: &Payment) -> ReservationResult<()> {
        match payment.method.settlement() {
            Settlement::Balance => {
                let pass_id = payment.pass_id.ok_or_else(|| {
                    ReservationError::RefundFailed(format!("pass payment {} has no linked pass", payment.id))
                })?;
                let pass = tx.lock_pass(pass_id).await?.ok_or_else(|| {
                    ReservationError::RefundFailed(format!("pass {} not found", pass_id))
                })?;
                tx.set_pass_balance(pass_id, pass.balance + payment.amount).await?;
            }
            Settlement::Gateway => {
                self.processor
                    .refund(&payment.transaction_ref)
                    .await
                    .map_err(|e| {
                        error!("Failed to process refund for {}: {}", payment.transaction_ref, e);
                        ReservationError::RefundFailed(e.to_string())
                    })?;
            }
        }
        Ok(())
    }

    /// Return a gateway charge whose reservation was rolled back
    async fn compensate_charge(&self, transaction_ref: &str) {
        match self.processor.refund(transaction_ref).await {
            Ok(()) => warn!("Refunded charge {} after rollback", transaction_ref),
            Err(e) => error!(
                "Charge {} could not be refunded after rollback, needs manual settlement: {}",
                transaction_ref, e
            ),
        }
    }
}

fn validate_seat_labels(seat_labels: &[String]) -> ReservationResult<()> {
    if seat_labels.is_empty() {
        return Err(ReservationError::InvalidRequest(
            "at least one seat label is required".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(seat_labels.len());
    for label in seat_labels {
        if label.trim().is_empty() {
            return Err(ReservationError::InvalidRequest("seat labels cannot be blank".to_string()));
        }
        if !seen.insert(label.as_str()) {
            return Err(ReservationError::InvalidRequest(format!(
                "seat {} is requested more than once",
                label
            )));
        }
    }
    Ok(())
}

async fn check_availability(
    tx: &mut dyn LedgerTx,
    vehicle_id: Uuid,
    seat_labels: &[String],
    now: DateTime<Utc>,
) -> ReservationResult<Vehicle> {
    let vehicle = match tx.lock_vehicle(vehicle_id).await? {
        Some(v) if v.status.is_operable() => v,
        _ => {
            warn!("Vehicle not found or inactive: {}", vehicle_id);
            return Err(ReservationError::VehicleUnavailable(vehicle_id));
        }
    };

    let held = tx.held_seat_labels(vehicle_id, now).await?;
    let requested = seat_labels.len();
    let capacity = vehicle.capacity.max(0) as usize;

    if requested > capacity {
        warn!("Invalid seat count: {} > {}", requested, capacity);
        return Err(ReservationError::SeatCountExceedsCapacity {
            requested,
            held: held.len(),
            capacity: vehicle.capacity,
        });
    }

    let held_set: HashSet<&str> = held.iter().map(String::as_str).collect();
    if let Some(taken) = seat_labels.iter().find(|s| held_set.contains(s.as_str())) {
        warn!("Seat already held: {} on vehicle {}", taken, vehicle_id);
        return Err(ReservationError::SeatAlreadyHeld(taken.clone()));
    }

    if held.len() + requested > capacity {
        warn!(
            "Vehicle {} is full: {} held + {} requested > {}",
            vehicle_id,
            held.len(),
            requested,
            capacity
        );
        return Err(ReservationError::SeatCountExceedsCapacity {
            requested,
            held: held.len(),
            capacity: vehicle.capacity,
        });
    }

    Ok(vehicle)
}

async fn persist(
    mut tx: Box<dyn LedgerTx>,
    vehicle: &Vehicle,
    reservation: &Reservation,
    payment: &Payment,
) -> ReservationResult<()> {
    tx.insert_reservation(reservation).await?;
    tx.insert_payment(payment).await?;

    let seats = reservation.seat_count();
    let occupied = vehicle.occupancy_after(seats);
    if occupied != vehicle.occupied + seats {
        warn!(
            "Occupancy counter for vehicle {} capped at capacity {} (was {})",
            vehicle.id, vehicle.capacity, vehicle.occupied
        );
    }
    tx.set_occupancy(vehicle.id, occupied).await?;

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_seat_label_validation() {
        assert!(validate_seat_labels(&labels(&["A1", "A2"])).is_ok());

        let err = validate_seat_labels(&[]).unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");

        let err = validate_seat_labels(&labels(&["A1", "B2", "A1"])).unwrap_err();
        assert!(err.to_string().contains("A1"));

        assert!(validate_seat_labels(&labels(&["A1", "  "])).is_err());
    }

    #[test]
    fn test_default_rules() {
        let rules = ReservationRules::default();
        assert_eq!(rules.hold_window, Duration::minutes(15));
        assert_eq!(rules.currency, "KES");
    }
}
