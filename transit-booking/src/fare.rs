use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

use transit_core::repository::LedgerTx;
use transit_core::{ReservationError, ReservationResult};

/// Priced result for a set of seats on a vehicle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FareQuote {
    pub route_id: Uuid,
    pub base_fare: Decimal,
    pub seat_count: usize,
    pub discount_percentage: Option<Decimal>,
    pub total: Decimal,
}

/// Fare pricing. Performs no writes; run it inside the same unit of work as
/// the availability check so it sees the same route and discount state.
pub struct FareCalculator;

impl FareCalculator {
    /// `base_fare * seat_count`, less the discount percentage, rounded to cents.
    /// Discounts at or below zero are ignored.
    pub fn price(base_fare: Decimal, seat_count: usize, discount_percentage: Option<Decimal>) -> Decimal {
        let mut total = base_fare * Decimal::from(seat_count);

        if let Some(pct) = discount_percentage.filter(|pct| *pct > Decimal::ZERO) {
            total *= Decimal::ONE - pct / Decimal::ONE_HUNDRED;
        }

        total.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    pub async fn compute_fare(
        tx: &mut dyn LedgerTx,
        vehicle_id: Uuid,
        seat_count: usize,
        rider_id: Uuid,
        at: DateTime<Utc>,
    ) -> ReservationResult<FareQuote> {
        let assignment = tx
            .active_assignment(vehicle_id, at)
            .await?
            .ok_or(ReservationError::RouteNotConfigured(vehicle_id))?;

        // An unpriced route is a data defect, never a free ride
        if assignment.base_fare <= Decimal::ZERO {
            error!(
                "Invalid base fare {} on route {} for vehicle {}",
                assignment.base_fare, assignment.route_id, vehicle_id
            );
            return Err(ReservationError::RouteNotConfigured(vehicle_id));
        }

        let discount_percentage = tx
            .loyalty_discount(rider_id, at)
            .await?
            .map(|d| d.percentage);

        let total = Self::price(assignment.base_fare, seat_count, discount_percentage);

        if total <= Decimal::ZERO {
            error!("Calculated fare is zero or negative after discounts: {}", total);
            return Err(ReservationError::InvalidFare(total));
        }

        debug!(
            "Fare for {} seat(s) on vehicle {}: base {} discount {:?} total {}",
            seat_count, vehicle_id, assignment.base_fare, discount_percentage, total
        );

        Ok(FareQuote {
            route_id: assignment.route_id,
            base_fare: assignment.base_fare,
            seat_count,
            discount_percentage,
            total,
        })
    }
}
