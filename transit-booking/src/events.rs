use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Published after a reservation unit of work commits. Consumers (notification
/// fan-out, live seat maps) subscribe through the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReservationEvent {
    Confirmed {
        reservation_id: Uuid,
        rider_id: Uuid,
        vehicle_id: Uuid,
        seat_labels: Vec<String>,
        total_fare: Decimal,
        occurred_at: DateTime<Utc>,
    },
    Cancelled {
        reservation_id: Uuid,
        rider_id: Uuid,
        vehicle_id: Uuid,
        seat_count: i32,
        refunded_amount: Option<Decimal>,
        occurred_at: DateTime<Utc>,
    },
}

impl ReservationEvent {
    pub fn reservation_id(&self) -> Uuid {
        match self {
            ReservationEvent::Confirmed { reservation_id, .. }
            | ReservationEvent::Cancelled { reservation_id, .. } => *reservation_id,
        }
    }
}
