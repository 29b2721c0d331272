use std::sync::Arc;
use transit_booking::ReservationOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ReservationOrchestrator>,
}
