pub mod events;
pub mod fare;
pub mod orchestrator;
pub mod processor;

pub use events::ReservationEvent;
pub use fare::{FareCalculator, FareQuote};
pub use orchestrator::{CreateReservation, ReservationOrchestrator, ReservationRules};
pub use processor::MockPaymentProcessor;
