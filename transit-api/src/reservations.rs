use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    routing::{delete, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use transit_booking::CreateReservation;
use transit_core::{PaymentMethod, Reservation};

use crate::error::AppError;
use crate::state::AppState;

pub const RIDER_HEADER: &str = "x-rider-id";

/// Rider identity, set by the upstream gateway after authentication
pub struct RiderId(pub Uuid);

impl<S> FromRequestParts<S> for RiderId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(RIDER_HEADER)
            .ok_or_else(|| AppError::ValidationError(format!("Missing {} header", RIDER_HEADER)))?;

        value
            .to_str()
            .ok()
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(RiderId)
            .ok_or_else(|| AppError::ValidationError(format!("Invalid {} header", RIDER_HEADER)))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    pub vehicle_id: Uuid,
    pub seat_labels: Vec<String>,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Serialize)]
struct CancelResponse {
    reservation_id: Uuid,
    status: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/reservations", post(create_reservation))
        .route("/v1/reservations/{id}", delete(cancel_reservation))
}

async fn create_reservation(
    State(state): State<AppState>,
    RiderId(rider_id): RiderId,
    Json(req): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<Reservation>), AppError> {
    info!(
        "Reservation request from rider {} for vehicle {}: {:?}",
        rider_id, req.vehicle_id, req.seat_labels
    );

    let reservation = state
        .orchestrator
        .create_reservation(CreateReservation {
            vehicle_id: req.vehicle_id,
            seat_labels: req.seat_labels,
            payment_method: req.payment_method,
            rider_id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(reservation)))
}

async fn cancel_reservation(
    State(state): State<AppState>,
    RiderId(rider_id): RiderId,
    Path(reservation_id): Path<Uuid>,
) -> Result<Json<CancelResponse>, AppError> {
    state
        .orchestrator
        .cancel_reservation(reservation_id, rider_id)
        .await?;

    Ok(Json(CancelResponse {
        reservation_id,
        status: "cancelled".to_string(),
    }))
}
