use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use transit_booking::{
    CreateReservation, MockPaymentProcessor, ReservationEvent, ReservationOrchestrator,
    ReservationRules,
};
use transit_core::models::{
    LoyaltyDiscount, Payment, Reservation, ReservationStatus, RiderPass, RouteAssignment, Vehicle,
    VehicleStatus,
};
use transit_core::payment::{
    PaymentError, PaymentMethod, PaymentProcessor, PaymentReceipt, PaymentRequest, PaymentStatus,
};
use transit_core::repository::{LedgerStore, LedgerTx, StoreError, StoreResult};
use transit_core::ReservationError;
use transit_store::InMemoryLedgerStore;

struct Fixture {
    store: InMemoryLedgerStore,
    processor: Arc<MockPaymentProcessor>,
    orchestrator: Arc<ReservationOrchestrator>,
    vehicle_id: Uuid,
    rider_id: Uuid,
}

async fn seed(store: &InMemoryLedgerStore, capacity: i32, base_fare: Decimal) -> Uuid {
    let vehicle = Vehicle::new(capacity);
    let vehicle_id = vehicle.id;
    store.put_vehicle(vehicle).await;
    store
        .put_assignment(RouteAssignment {
            id: Uuid::new_v4(),
            vehicle_id,
            route_id: Uuid::new_v4(),
            base_fare,
            starts_at: Utc::now() - Duration::hours(1),
            ends_at: None,
        })
        .await;
    vehicle_id
}

async fn fixture(capacity: i32, base_fare: Decimal) -> Fixture {
    let store = InMemoryLedgerStore::new();
    let vehicle_id = seed(&store, capacity, base_fare).await;
    let processor = Arc::new(MockPaymentProcessor::new(
        std::time::Duration::ZERO,
        dec!(10000),
    ));
    let orchestrator = Arc::new(ReservationOrchestrator::new(
        Arc::new(store.clone()),
        processor.clone(),
        ReservationRules::default(),
    ));
    Fixture {
        store,
        processor,
        orchestrator,
        vehicle_id,
        rider_id: Uuid::new_v4(),
    }
}

fn request(vehicle_id: Uuid, rider_id: Uuid, seats: &[&str], method: PaymentMethod) -> CreateReservation {
    CreateReservation {
        vehicle_id,
        seat_labels: seats.iter().map(|s| s.to_string()).collect(),
        payment_method: method,
        rider_id,
    }
}

fn pass(rider_id: Uuid, balance: Decimal) -> RiderPass {
    RiderPass {
        id: Uuid::new_v4(),
        rider_id,
        balance,
        active: true,
        expires_at: Utc::now() + Duration::days(30),
    }
}

fn held_reservation(vehicle_id: Uuid, rider_id: Uuid, seats: &[&str], status: ReservationStatus, expires_at: DateTime<Utc>) -> Reservation {
    Reservation {
        id: Uuid::new_v4(),
        rider_id,
        vehicle_id,
        route_id: Uuid::new_v4(),
        seat_labels: seats.iter().map(|s| s.to_string()).collect(),
        total_fare: dec!(100),
        currency: "KES".to_string(),
        payment_method: PaymentMethod::Cash,
        status,
        created_at: Utc::now() - Duration::minutes(30),
        expires_at,
        boarded_at: None,
    }
}

#[tokio::test]
async fn test_concurrent_requests_never_overbook() {
    let fx = fixture(3, dec!(50)).await;

    let mut handles = Vec::new();
    for i in 0..5 {
        let orchestrator = fx.orchestrator.clone();
        let seat = format!("S{}", i);
        let req = request(fx.vehicle_id, Uuid::new_v4(), &[seat.as_str()], PaymentMethod::Card);
        handles.push(tokio::spawn(async move { orchestrator.create_reservation(req).await }));
    }

    let results: Vec<_> = futures_util::future::join_all(handles)
        .await
        .into_iter()
        .map(|h| h.unwrap())
        .collect();

    let confirmed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(confirmed, 3);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(err, ReservationError::SeatCountExceedsCapacity { .. }));
    }

    assert_eq!(fx.store.vehicle(fx.vehicle_id).await.unwrap().occupied, 3);
    // Rejected requests were refused before any charge
    assert_eq!(fx.processor.charge_count().await, 3);
}

#[tokio::test]
async fn test_same_seat_race_has_one_winner() {
    let fx = fixture(10, dec!(50)).await;

    let a = fx.orchestrator.clone();
    let b = fx.orchestrator.clone();
    let req_a = request(fx.vehicle_id, Uuid::new_v4(), &["A1"], PaymentMethod::Card);
    let req_b = request(fx.vehicle_id, Uuid::new_v4(), &["A1"], PaymentMethod::MobileMoney);

    let (ra, rb) = tokio::join!(
        tokio::spawn(async move { a.create_reservation(req_a).await }),
        tokio::spawn(async move { b.create_reservation(req_b).await }),
    );
    let (ra, rb) = (ra.unwrap(), rb.unwrap());

    assert!(ra.is_ok() != rb.is_ok());
    let err = ra.err().or(rb.err()).unwrap();
    assert_eq!(err.to_string(), "Seat A1 is already held");
}

#[tokio::test]
async fn test_card_reservation_records_payment() {
    let fx = fixture(40, dec!(100)).await;
    fx.store
        .put_discount(LoyaltyDiscount {
            rider_id: fx.rider_id,
            percentage: dec!(10),
            expires_at: Utc::now() + Duration::days(7),
        })
        .await;

    let reservation = fx
        .orchestrator
        .create_reservation(request(fx.vehicle_id, fx.rider_id, &["A1", "A2"], PaymentMethod::Card))
        .await
        .unwrap();

    assert_eq!(reservation.total_fare, dec!(180.00));
    assert_eq!(reservation.status, ReservationStatus::Confirmed);
    assert_eq!(reservation.currency, "KES");
    assert_eq!(reservation.expires_at - reservation.created_at, Duration::minutes(15));

    let payment = fx.store.payment_for(reservation.id).await.unwrap();
    assert_eq!(payment.amount, dec!(180.00));
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert!(payment.transaction_ref.starts_with("MOCK_"));
    assert_eq!(payment.metadata["booking_type"], "transit_ride");
    assert_eq!(payment.metadata["seat_count"], 2);

    assert_eq!(fx.store.vehicle(fx.vehicle_id).await.unwrap().occupied, 2);
}

#[tokio::test]
async fn test_declined_charge_leaves_ledger_untouched() {
    // 2 x 6000 is above the processor's 10000 ceiling
    let fx = fixture(40, dec!(6000)).await;
    let before = fx.store.snapshot().await;

    let err = fx
        .orchestrator
        .create_reservation(request(fx.vehicle_id, fx.rider_id, &["A1", "A2"], PaymentMethod::Card))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReservationError::PaymentFailed(PaymentError::AmountExceedsLimit { .. })
    ));
    assert_eq!(fx.store.snapshot().await, before);
}

#[tokio::test]
async fn test_insufficient_pass_balance_leaves_ledger_untouched() {
    let fx = fixture(40, dec!(100)).await;
    fx.store.put_pass(pass(fx.rider_id, dec!(50))).await;
    let before = fx.store.snapshot().await;

    let err = fx
        .orchestrator
        .create_reservation(request(fx.vehicle_id, fx.rider_id, &["A1"], PaymentMethod::Pass))
        .await
        .unwrap_err();

    assert!(matches!(err, ReservationError::InsufficientBalance));
    assert_eq!(fx.store.snapshot().await, before);

    // No pass at all reads the same way
    let err = fx
        .orchestrator
        .create_reservation(request(fx.vehicle_id, Uuid::new_v4(), &["A1"], PaymentMethod::Pass))
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::InsufficientBalance));
}

#[tokio::test]
async fn test_unpriced_route_is_rejected() {
    let fx = fixture(40, dec!(0)).await;

    let err = fx
        .orchestrator
        .create_reservation(request(fx.vehicle_id, fx.rider_id, &["A1"], PaymentMethod::Card))
        .await
        .unwrap_err();

    assert!(matches!(err, ReservationError::RouteNotConfigured(id) if id == fx.vehicle_id));
    assert_eq!(fx.processor.charge_count().await, 0);
}

#[tokio::test]
async fn test_vehicle_without_assignment_is_rejected() {
    let store = InMemoryLedgerStore::new();
    let vehicle = Vehicle::new(10);
    let vehicle_id = vehicle.id;
    store.put_vehicle(vehicle).await;
    let orchestrator = ReservationOrchestrator::new(
        Arc::new(store),
        Arc::new(MockPaymentProcessor::new(std::time::Duration::ZERO, dec!(10000))),
        ReservationRules::default(),
    );

    let err = orchestrator
        .create_reservation(request(vehicle_id, Uuid::new_v4(), &["A1"], PaymentMethod::Card))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ROUTE_NOT_CONFIGURED");
}

#[tokio::test]
async fn test_full_discount_is_invalid_fare() {
    let fx = fixture(40, dec!(100)).await;
    fx.store
        .put_discount(LoyaltyDiscount {
            rider_id: fx.rider_id,
            percentage: dec!(100),
            expires_at: Utc::now() + Duration::days(7),
        })
        .await;

    let err = fx
        .orchestrator
        .create_reservation(request(fx.vehicle_id, fx.rider_id, &["A1"], PaymentMethod::Card))
        .await
        .unwrap_err();

    assert!(matches!(err, ReservationError::InvalidFare(_)));
    assert_eq!(fx.processor.charge_count().await, 0);
}

#[tokio::test]
async fn test_pass_reservation_and_cancellation() {
    let fx = fixture(40, dec!(100)).await;
    let rider_pass = pass(fx.rider_id, dec!(500));
    let pass_id = rider_pass.id;
    fx.store.put_pass(rider_pass).await;

    let reservation = fx
        .orchestrator
        .create_reservation(request(
            fx.vehicle_id,
            fx.rider_id,
            &["B1", "B2", "B3"],
            PaymentMethod::Pass,
        ))
        .await
        .unwrap();

    assert_eq!(reservation.total_fare, dec!(300));
    assert_eq!(fx.store.pass(pass_id).await.unwrap().balance, dec!(200));
    assert_eq!(fx.store.vehicle(fx.vehicle_id).await.unwrap().occupied, 3);

    let payment = fx.store.payment_for(reservation.id).await.unwrap();
    assert!(payment.transaction_ref.starts_with("PASS_"));
    assert_eq!(payment.pass_id, Some(pass_id));
    assert_eq!(fx.processor.charge_count().await, 0);

    fx.orchestrator
        .cancel_reservation(reservation.id, fx.rider_id)
        .await
        .unwrap();

    assert_eq!(fx.store.pass(pass_id).await.unwrap().balance, dec!(500));
    assert_eq!(fx.store.vehicle(fx.vehicle_id).await.unwrap().occupied, 0);
    assert_eq!(
        fx.store.reservation(reservation.id).await.unwrap().status,
        ReservationStatus::Cancelled
    );
    assert_eq!(
        fx.store.payment_for(reservation.id).await.unwrap().status,
        PaymentStatus::Refunded
    );

    // Second cancel changes nothing
    let before = fx.store.snapshot().await;
    let err = fx
        .orchestrator
        .cancel_reservation(reservation.id, fx.rider_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::AlreadyCancelled(_)));
    assert_eq!(fx.store.snapshot().await, before);
}

#[tokio::test]
async fn test_card_cancellation_refunds_through_processor() {
    let fx = fixture(40, dec!(120)).await;

    let reservation = fx
        .orchestrator
        .create_reservation(request(fx.vehicle_id, fx.rider_id, &["C4"], PaymentMethod::Card))
        .await
        .unwrap();
    fx.orchestrator
        .cancel_reservation(reservation.id, fx.rider_id)
        .await
        .unwrap();

    let payment = fx.store.payment_for(reservation.id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert_eq!(
        fx.processor.status(&payment.transaction_ref).await.unwrap(),
        PaymentStatus::Refunded
    );

    // The freed seat can be taken again
    fx.orchestrator
        .create_reservation(request(fx.vehicle_id, Uuid::new_v4(), &["C4"], PaymentMethod::Card))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_held_seat_conflict_names_the_seat() {
    let fx = fixture(40, dec!(80)).await;

    fx.orchestrator
        .create_reservation(request(fx.vehicle_id, fx.rider_id, &["A1", "A2"], PaymentMethod::Cash))
        .await
        .unwrap();

    let err = fx
        .orchestrator
        .create_reservation(request(fx.vehicle_id, Uuid::new_v4(), &["A3", "A1"], PaymentMethod::Cash))
        .await
        .unwrap_err();
    assert!(matches!(&err, ReservationError::SeatAlreadyHeld(seat) if seat == "A1"));

    fx.orchestrator
        .create_reservation(request(fx.vehicle_id, Uuid::new_v4(), &["A3", "A4"], PaymentMethod::Cash))
        .await
        .unwrap();
    assert_eq!(fx.store.vehicle(fx.vehicle_id).await.unwrap().occupied, 4);
}

#[tokio::test]
async fn test_lapsed_holds_do_not_block() {
    let fx = fixture(1, dec!(80)).await;
    fx.store
        .put_reservation(held_reservation(
            fx.vehicle_id,
            Uuid::new_v4(),
            &["A1"],
            ReservationStatus::Confirmed,
            Utc::now() - Duration::minutes(1),
        ))
        .await;

    let reservation = fx
        .orchestrator
        .create_reservation(request(fx.vehicle_id, fx.rider_id, &["A1"], PaymentMethod::Card))
        .await
        .unwrap();
    assert_eq!(reservation.seat_labels, vec!["A1".to_string()]);
}

#[tokio::test]
async fn test_more_seats_than_capacity() {
    let fx = fixture(2, dec!(80)).await;

    let err = fx
        .orchestrator
        .create_reservation(request(fx.vehicle_id, fx.rider_id, &["A1", "A2", "A3"], PaymentMethod::Card))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_SEAT_COUNT");
}

#[tokio::test]
async fn test_inoperable_and_unknown_vehicles() {
    let fx = fixture(10, dec!(80)).await;

    let mut parked = Vehicle::new(10);
    parked.status = VehicleStatus::Maintenance;
    let parked_id = parked.id;
    fx.store.put_vehicle(parked).await;

    for vehicle_id in [parked_id, Uuid::new_v4()] {
        let err = fx
            .orchestrator
            .create_reservation(request(vehicle_id, fx.rider_id, &["A1"], PaymentMethod::Card))
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::VehicleUnavailable(id) if id == vehicle_id));
    }
}

#[tokio::test]
async fn test_invalid_seat_lists() {
    let fx = fixture(10, dec!(80)).await;

    for seats in [&[][..], &["A1", "A1"][..], &[""][..]] {
        let err = fx
            .orchestrator
            .create_reservation(request(fx.vehicle_id, fx.rider_id, seats, PaymentMethod::Card))
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::InvalidRequest(_)));
    }
}

#[tokio::test]
async fn test_cancel_rules() {
    let fx = fixture(10, dec!(80)).await;

    let completed = held_reservation(
        fx.vehicle_id,
        fx.rider_id,
        &["A1"],
        ReservationStatus::Completed,
        Utc::now() + Duration::minutes(10),
    );
    let completed_id = completed.id;
    fx.store.put_reservation(completed).await;

    let err = fx
        .orchestrator
        .cancel_reservation(completed_id, fx.rider_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::CannotCancelCompleted(_)));

    // Someone else's reservation reads as missing
    let err = fx
        .orchestrator
        .cancel_reservation(completed_id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::ReservationNotFound(_)));

    let err = fx
        .orchestrator
        .cancel_reservation(Uuid::new_v4(), fx.rider_id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "RESERVATION_NOT_FOUND");
}

#[tokio::test]
async fn test_events_follow_commits() {
    let fx = fixture(10, dec!(80)).await;
    let mut events = fx.orchestrator.subscribe();

    let reservation = fx
        .orchestrator
        .create_reservation(request(fx.vehicle_id, fx.rider_id, &["D1"], PaymentMethod::Card))
        .await
        .unwrap();
    fx.orchestrator
        .cancel_reservation(reservation.id, fx.rider_id)
        .await
        .unwrap();

    match events.recv().await.unwrap() {
        ReservationEvent::Confirmed { reservation_id, seat_labels, total_fare, .. } => {
            assert_eq!(reservation_id, reservation.id);
            assert_eq!(seat_labels, vec!["D1".to_string()]);
            assert_eq!(total_fare, dec!(80));
        }
        other => panic!("unexpected event {:?}", other),
    }
    match events.recv().await.unwrap() {
        ReservationEvent::Cancelled { seat_count, refunded_amount, .. } => {
            assert_eq!(seat_count, 1);
            assert_eq!(refunded_amount, Some(dec!(80)));
        }
        other => panic!("unexpected event {:?}", other),
    }

    // Failed attempts publish nothing
    let _ = fx
        .orchestrator
        .cancel_reservation(reservation.id, fx.rider_id)
        .await;
    assert!(events.try_recv().is_err());
}

/// Charges succeed, refunds always fail
struct RefundOutage {
    inner: MockPaymentProcessor,
}

#[async_trait]
impl PaymentProcessor for RefundOutage {
    async fn process(&self, request: &PaymentRequest) -> Result<PaymentReceipt, PaymentError> {
        self.inner.process(request).await
    }

    async fn verify(&self, transaction_ref: &str) -> Result<PaymentReceipt, PaymentError> {
        self.inner.verify(transaction_ref).await
    }

    async fn status(&self, transaction_ref: &str) -> Result<PaymentStatus, PaymentError> {
        self.inner.status(transaction_ref).await
    }

    async fn refund(&self, _transaction_ref: &str) -> Result<(), PaymentError> {
        Err(PaymentError::Gateway("connection reset".to_string()))
    }

    async fn cancel(&self, transaction_ref: &str) -> Result<(), PaymentError> {
        self.inner.cancel(transaction_ref).await
    }
}

#[tokio::test]
async fn test_failed_refund_keeps_reservation_confirmed() {
    let store = InMemoryLedgerStore::new();
    let vehicle_id = seed(&store, 10, dec!(90)).await;
    let rider_id = Uuid::new_v4();
    let orchestrator = ReservationOrchestrator::new(
        Arc::new(store.clone()),
        Arc::new(RefundOutage {
            inner: MockPaymentProcessor::new(std::time::Duration::ZERO, dec!(10000)),
        }),
        ReservationRules::default(),
    );

    let reservation = orchestrator
        .create_reservation(request(vehicle_id, rider_id, &["E1", "E2"], PaymentMethod::MobileMoney))
        .await
        .unwrap();
    let before = store.snapshot().await;

    let err = orchestrator
        .cancel_reservation(reservation.id, rider_id)
        .await
        .unwrap_err();

    assert!(matches!(err, ReservationError::RefundFailed(_)));
    assert_eq!(store.snapshot().await, before);
    assert_eq!(
        store.reservation(reservation.id).await.unwrap().status,
        ReservationStatus::Confirmed
    );
    assert_eq!(store.vehicle(vehicle_id).await.unwrap().occupied, 2);
}

/// Accepts charges but leaves them pending
struct PendingGateway {
    cancelled: AtomicUsize,
}

#[async_trait]
impl PaymentProcessor for PendingGateway {
    async fn process(&self, request: &PaymentRequest) -> Result<PaymentReceipt, PaymentError> {
        Ok(PaymentReceipt {
            transaction_ref: "GW_pending".to_string(),
            status: PaymentStatus::Pending,
            amount: request.amount,
            currency: request.currency.clone(),
            method: request.method,
            processed_at: Utc::now(),
            metadata: serde_json::json!({}),
        })
    }

    async fn verify(&self, transaction_ref: &str) -> Result<PaymentReceipt, PaymentError> {
        Err(PaymentError::UnknownTransaction(transaction_ref.to_string()))
    }

    async fn status(&self, _transaction_ref: &str) -> Result<PaymentStatus, PaymentError> {
        Ok(PaymentStatus::Pending)
    }

    async fn refund(&self, _transaction_ref: &str) -> Result<(), PaymentError> {
        Ok(())
    }

    async fn cancel(&self, _transaction_ref: &str) -> Result<(), PaymentError> {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_pending_charge_is_voided() {
    let store = InMemoryLedgerStore::new();
    let vehicle_id = seed(&store, 10, dec!(90)).await;
    let gateway = Arc::new(PendingGateway {
        cancelled: AtomicUsize::new(0),
    });
    let orchestrator = ReservationOrchestrator::new(
        Arc::new(store.clone()),
        gateway.clone(),
        ReservationRules::default(),
    );
    let before = store.snapshot().await;

    let err = orchestrator
        .create_reservation(request(vehicle_id, Uuid::new_v4(), &["F1"], PaymentMethod::Card))
        .await
        .unwrap_err();

    assert!(matches!(err, ReservationError::PaymentFailed(PaymentError::Declined(_))));
    assert_eq!(gateway.cancelled.load(Ordering::SeqCst), 1);
    assert_eq!(store.snapshot().await, before);
}

/// Ledger whose payment inserts always fail
struct BrokenPaymentsStore {
    inner: InMemoryLedgerStore,
}

struct BrokenPaymentsTx {
    inner: Box<dyn LedgerTx>,
}

#[async_trait]
impl LedgerStore for BrokenPaymentsStore {
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        Ok(Box::new(BrokenPaymentsTx {
            inner: self.inner.begin().await?,
        }))
    }
}

#[async_trait]
impl LedgerTx for BrokenPaymentsTx {
    async fn lock_vehicle(&mut self, vehicle_id: Uuid) -> StoreResult<Option<Vehicle>> {
        self.inner.lock_vehicle(vehicle_id).await
    }

    async fn held_seat_labels(&mut self, vehicle_id: Uuid, at: DateTime<Utc>) -> StoreResult<Vec<String>> {
        self.inner.held_seat_labels(vehicle_id, at).await
    }

    async fn active_assignment(
        &mut self,
        vehicle_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<RouteAssignment>> {
        self.inner.active_assignment(vehicle_id, at).await
    }

    async fn loyalty_discount(
        &mut self,
        rider_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<LoyaltyDiscount>> {
        self.inner.loyalty_discount(rider_id, at).await
    }

    async fn lock_active_pass(&mut self, rider_id: Uuid, at: DateTime<Utc>) -> StoreResult<Option<RiderPass>> {
        self.inner.lock_active_pass(rider_id, at).await
    }

    async fn lock_pass(&mut self, pass_id: Uuid) -> StoreResult<Option<RiderPass>> {
        self.inner.lock_pass(pass_id).await
    }

    async fn set_pass_balance(&mut self, pass_id: Uuid, balance: Decimal) -> StoreResult<()> {
        self.inner.set_pass_balance(pass_id, balance).await
    }

    async fn set_occupancy(&mut self, vehicle_id: Uuid, occupied: i32) -> StoreResult<()> {
        self.inner.set_occupancy(vehicle_id, occupied).await
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> StoreResult<()> {
        self.inner.insert_reservation(reservation).await
    }

    async fn insert_payment(&mut self, _payment: &Payment) -> StoreResult<()> {
        Err(StoreError::Backend("disk full".into()))
    }

    async fn lock_reservation(
        &mut self,
        reservation_id: Uuid,
        rider_id: Uuid,
    ) -> StoreResult<Option<Reservation>> {
        self.inner.lock_reservation(reservation_id, rider_id).await
    }

    async fn payment_for_reservation(&mut self, reservation_id: Uuid) -> StoreResult<Option<Payment>> {
        self.inner.payment_for_reservation(reservation_id).await
    }

    async fn set_reservation_status(
        &mut self,
        reservation_id: Uuid,
        status: ReservationStatus,
    ) -> StoreResult<()> {
        self.inner.set_reservation_status(reservation_id, status).await
    }

    async fn set_payment_status(
        &mut self,
        payment_id: Uuid,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.inner.set_payment_status(payment_id, status, at).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.inner.commit().await
    }
}

#[tokio::test]
async fn test_charge_is_refunded_when_recording_fails() {
    let store = InMemoryLedgerStore::new();
    let vehicle_id = seed(&store, 10, dec!(90)).await;
    let processor = Arc::new(MockPaymentProcessor::new(std::time::Duration::ZERO, dec!(10000)));
    let orchestrator = ReservationOrchestrator::new(
        Arc::new(BrokenPaymentsStore {
            inner: store.clone(),
        }),
        processor.clone(),
        ReservationRules::default(),
    );
    let before = store.snapshot().await;

    let err = orchestrator
        .create_reservation(request(vehicle_id, Uuid::new_v4(), &["G1"], PaymentMethod::Card))
        .await
        .unwrap_err();

    assert!(matches!(err, ReservationError::Storage(_)));
    assert_eq!(store.snapshot().await, before);
    assert_eq!(processor.charge_count().await, 1);
    assert_eq!(processor.count_with_status(PaymentStatus::Refunded).await, 1);
}
