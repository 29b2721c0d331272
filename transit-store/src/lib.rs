pub mod app_config;
pub mod database;
pub mod ledger_repo;
pub mod memory;

pub use database::DbClient;
pub use ledger_repo::PgLedgerStore;
pub use memory::{InMemoryLedgerStore, LedgerSnapshot};
