use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transit_api::{app, AppState};
use transit_booking::{MockPaymentProcessor, ReservationOrchestrator, ReservationRules};
use transit_core::LedgerStore;
use transit_store::app_config::Config;
use transit_store::{DbClient, InMemoryLedgerStore, PgLedgerStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "transit_api=debug,transit_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!("Starting transit API on port {}", config.server.port);

    let store: Arc<dyn LedgerStore> = match &config.database.url {
        Some(url) => {
            let db = DbClient::new(url, &config.database).await?;
            db.migrate().await?;
            Arc::new(PgLedgerStore::new(db.pool.clone()))
        }
        None => {
            tracing::warn!("No database.url configured, using the in-memory ledger");
            Arc::new(InMemoryLedgerStore::new())
        }
    };

    let processor = Arc::new(MockPaymentProcessor::new(
        Duration::from_millis(config.payments.latency_ms),
        Decimal::from(config.payments.max_amount),
    ));

    let rules = ReservationRules {
        hold_window: chrono::Duration::seconds(config.reservations.hold_window_seconds as i64),
        currency: config.reservations.currency.clone(),
    };

    let orchestrator = Arc::new(ReservationOrchestrator::new(store, processor, rules));
    let app = app(AppState { orchestrator });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
