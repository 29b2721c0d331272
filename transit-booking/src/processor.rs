use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use transit_core::payment::{
    PaymentError, PaymentProcessor, PaymentReceipt, PaymentRequest, PaymentStatus,
};

/// Reference processor for development and tests.
///
/// Simulates network latency, rejects zero/negative amounts and amounts above
/// `max_amount`, and remembers every charge it issued so `verify`, `status`,
/// `refund` and `cancel` behave like a real gateway's bookkeeping.
pub struct MockPaymentProcessor {
    latency: Duration,
    max_amount: Decimal,
    charges: Mutex<HashMap<String, PaymentReceipt>>,
}

impl MockPaymentProcessor {
    pub fn new(latency: Duration, max_amount: Decimal) -> Self {
        Self {
            latency,
            max_amount,
            charges: Mutex::new(HashMap::new()),
        }
    }

    async fn simulate_network(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Number of charges issued so far
    pub async fn charge_count(&self) -> usize {
        self.charges.lock().await.len()
    }

    pub async fn count_with_status(&self, status: PaymentStatus) -> usize {
        self.charges
            .lock()
            .await
            .values()
            .filter(|r| r.status == status)
            .count()
    }

    async fn lookup(&self, transaction_ref: &str) -> Result<PaymentReceipt, PaymentError> {
        self.charges
            .lock()
            .await
            .get(transaction_ref)
            .cloned()
            .ok_or_else(|| PaymentError::UnknownTransaction(transaction_ref.to_string()))
    }
}

impl Default for MockPaymentProcessor {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), Decimal::from(10_000))
    }
}

#[async_trait]
impl PaymentProcessor for MockPaymentProcessor {
    async fn process(&self, request: &PaymentRequest) -> Result<PaymentReceipt, PaymentError> {
        self.simulate_network().await;

        // A zero charge is an error, never a no-op success
        if request.amount <= Decimal::ZERO {
            return Err(PaymentError::InvalidAmount(request.amount));
        }
        if request.amount > self.max_amount {
            return Err(PaymentError::AmountExceedsLimit {
                amount: request.amount,
                limit: self.max_amount,
            });
        }

        let receipt = PaymentReceipt {
            transaction_ref: format!("MOCK_{}", Uuid::new_v4().simple()),
            status: PaymentStatus::Completed,
            amount: request.amount,
            currency: request.currency.clone(),
            method: request.method,
            processed_at: Utc::now(),
            metadata: serde_json::json!({ "mocked": true }),
        };

        self.charges
            .lock()
            .await
            .insert(receipt.transaction_ref.clone(), receipt.clone());

        info!(
            "Mock charge {} for {} {} ({})",
            receipt.transaction_ref, receipt.amount, receipt.currency, request.description
        );
        Ok(receipt)
    }

    async fn verify(&self, transaction_ref: &str) -> Result<PaymentReceipt, PaymentError> {
        self.simulate_network().await;
        self.lookup(transaction_ref).await
    }

    async fn status(&self, transaction_ref: &str) -> Result<PaymentStatus, PaymentError> {
        self.simulate_network().await;
        Ok(self.lookup(transaction_ref).await?.status)
    }

    async fn refund(&self, transaction_ref: &str) -> Result<(), PaymentError> {
        self.simulate_network().await;

        let mut charges = self.charges.lock().await;
        let receipt = charges
            .get_mut(transaction_ref)
            .ok_or_else(|| PaymentError::UnknownTransaction(transaction_ref.to_string()))?;

        match receipt.status {
            PaymentStatus::Completed => {
                receipt.status = PaymentStatus::Refunded;
                info!("Mock refund {} for {}", transaction_ref, receipt.amount);
                Ok(())
            }
            PaymentStatus::Refunded => Ok(()),
            other => Err(PaymentError::Declined(format!(
                "cannot refund a {} charge",
                other.as_str()
            ))),
        }
    }

    async fn cancel(&self, transaction_ref: &str) -> Result<(), PaymentError> {
        self.simulate_network().await;

        let mut charges = self.charges.lock().await;
        let receipt = charges
            .get_mut(transaction_ref)
            .ok_or_else(|| PaymentError::UnknownTransaction(transaction_ref.to_string()))?;

        match receipt.status {
            PaymentStatus::Pending | PaymentStatus::Expired => {
                receipt.status = PaymentStatus::Expired;
                Ok(())
            }
            other => Err(PaymentError::Declined(format!(
                "cannot cancel a {} charge",
                other.as_str()
            ))),
        }
    }
}
