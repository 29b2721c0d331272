use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use transit_core::{ErrorKind, ReservationError};

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    Reservation(ReservationError),
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::PaymentRequired => StatusCode::PAYMENT_REQUIRED,
        ErrorKind::Unprocessable => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg),
            AppError::Reservation(err) => match err.kind() {
                ErrorKind::Internal => {
                    tracing::error!("Internal Server Error: {}", err);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        err.code(),
                        "Internal Server Error".to_string(),
                    )
                }
                kind => (status_for(kind), err.code(), err.to_string()),
            },
        };

        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

impl From<ReservationError> for AppError {
    fn from(err: ReservationError) -> Self {
        Self::Reservation(err)
    }
}
