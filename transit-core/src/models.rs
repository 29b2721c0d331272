use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::payment::{PaymentMethod, PaymentStatus};

/// Returned when a status column holds a value we do not know about
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind} value: {value}")]
pub struct ParseStatusError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseStatusError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Operating status of a vehicle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    Active,
    Assigned,
    Maintenance,
    Inactive,
}

impl VehicleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Active => "active",
            VehicleStatus::Assigned => "assigned",
            VehicleStatus::Maintenance => "maintenance",
            VehicleStatus::Inactive => "inactive",
        }
    }

    /// Only active and assigned vehicles take reservations.
    pub fn is_operable(&self) -> bool {
        matches!(self, VehicleStatus::Active | VehicleStatus::Assigned)
    }
}

impl FromStr for VehicleStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(VehicleStatus::Active),
            "assigned" => Ok(VehicleStatus::Assigned),
            "maintenance" => Ok(VehicleStatus::Maintenance),
            "inactive" => Ok(VehicleStatus::Inactive),
            other => Err(ParseStatusError::new("vehicle status", other)),
        }
    }
}

/// A vehicle instance riders can reserve seats on.
///
/// `0 <= occupied <= capacity` holds at all times; the counter is only
/// mutated inside reservation and cancellation units of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vehicle {
    pub id: Uuid,
    pub capacity: i32,
    pub occupied: i32,
    pub status: VehicleStatus,
}

impl Vehicle {
    pub fn new(capacity: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            capacity,
            occupied: 0,
            status: VehicleStatus::Active,
        }
    }

    /// Occupancy after adding `seats`, clamped to `[0, capacity]`
    pub fn occupancy_after(&self, seats: i32) -> i32 {
        (self.occupied + seats).clamp(0, self.capacity.max(0))
    }
}

/// Binds a vehicle to a route (and the route's base fare) for a time window.
/// Maintained by operator management; read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteAssignment {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub route_id: Uuid,
    pub base_fare: Decimal,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl RouteAssignment {
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.starts_at <= at && self.ends_at.map_or(true, |end| end > at)
    }
}

/// Per-rider loyalty discount
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoyaltyDiscount {
    pub rider_id: Uuid,
    /// Percentage off, e.g. `10` for 10%
    pub percentage: Decimal,
    pub expires_at: DateTime<Utc>,
}

impl LoyaltyDiscount {
    pub fn is_active(&self, at: DateTime<Utc>) -> bool {
        self.expires_at > at
    }
}

/// Prepaid rider pass, the record behind balance-backed payments
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiderPass {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub balance: Decimal,
    pub active: bool,
    pub expires_at: DateTime<Utc>,
}

impl RiderPass {
    pub fn is_usable(&self, at: DateTime<Utc>) -> bool {
        self.active && self.expires_at > at
    }
}

/// Reservation lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Confirmed,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Completed => "completed",
        }
    }
}

impl FromStr for ReservationStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(ReservationStatus::Confirmed),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            "completed" => Ok(ReservationStatus::Completed),
            other => Err(ParseStatusError::new("reservation status", other)),
        }
    }
}

/// A rider's seat reservation on a vehicle.
///
/// Never physically deleted; it only moves between statuses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reservation {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub vehicle_id: Uuid,
    /// Resolved from the active route assignment at creation time
    pub route_id: Uuid,
    pub seat_labels: Vec<String>,
    pub total_fare: Decimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub boarded_at: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn seat_count(&self) -> i32 {
        self.seat_labels.len() as i32
    }

    /// A reservation holds its seats while it is not cancelled and its hold
    /// window has not lapsed.
    pub fn holds_seats(&self, at: DateTime<Utc>) -> bool {
        self.status != ReservationStatus::Cancelled && self.expires_at > at
    }
}

/// The payment record paired with exactly one reservation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub rider_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    /// Processor (or pass ledger) transaction reference
    pub transaction_ref: String,
    pub pass_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
