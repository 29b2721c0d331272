use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::ParseStatusError;

/// How a rider pays for a reservation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Prepaid rider pass, debited in the reservation transaction
    Pass,
    Card,
    MobileMoney,
    Cash,
}

/// Where a payment method settles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Balance,
    Gateway,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Pass => "pass",
            PaymentMethod::Card => "card",
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::Cash => "cash",
        }
    }

    pub fn settlement(&self) -> Settlement {
        match self {
            PaymentMethod::Pass => Settlement::Balance,
            PaymentMethod::Card | PaymentMethod::MobileMoney | PaymentMethod::Cash => {
                Settlement::Gateway
            }
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" => Ok(PaymentMethod::Pass),
            "card" => Ok(PaymentMethod::Card),
            "mobile_money" => Ok(PaymentMethod::MobileMoney),
            "cash" => Ok(PaymentMethod::Cash),
            other => Err(ParseStatusError::new("payment method", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    Expired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Expired => "expired",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            "expired" => Ok(PaymentStatus::Expired),
            other => Err(ParseStatusError::new("payment status", other)),
        }
    }
}

/// A charge to run through a gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub reservation_id: Uuid,
    pub rider_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub method: PaymentMethod,
    pub description: String,
    pub metadata: serde_json::Value,
}

/// What a processor reports back for a charge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentReceipt {
    pub transaction_ref: String,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub currency: String,
    pub method: PaymentMethod,
    pub processed_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PaymentError {
    #[error("Invalid payment amount: {0}")]
    InvalidAmount(Decimal),

    #[error("Amount {amount} exceeds maximum allowed {limit}")]
    AmountExceedsLimit { amount: Decimal, limit: Decimal },

    #[error("Payment declined: {0}")]
    Declined(String),

    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),

    #[error("Payment gateway error: {0}")]
    Gateway(String),
}

/// Settlement capability behind gateway-routed payment methods.
///
/// `process` is not idempotent; retrying a charge is the caller's call.
/// `refund` must be safe to retry for the same transaction reference.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Charge the rider
    async fn process(&self, request: &PaymentRequest) -> Result<PaymentReceipt, PaymentError>;

    /// Re-read a charge from the processor
    async fn verify(&self, transaction_ref: &str) -> Result<PaymentReceipt, PaymentError>;

    /// Current status of a charge
    async fn status(&self, transaction_ref: &str) -> Result<PaymentStatus, PaymentError>;

    /// Return a completed charge to the rider
    async fn refund(&self, transaction_ref: &str) -> Result<(), PaymentError>;

    /// Void a charge that has not settled yet
    async fn cancel(&self, transaction_ref: &str) -> Result<(), PaymentError>;
}
