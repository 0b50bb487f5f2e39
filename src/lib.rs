// MedChain - Pharmaceutical batch ledger
// Tamper-evident entries per batch, append-only tracking, stock forecast.
// Exposes all modules for use in the CLI and tests

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod forecast;
pub mod ledger;
pub mod medicine;
pub mod service;
pub mod store;
pub mod tracking;

// Re-export commonly used types
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, MedchainConfig, StoreBackend, StoreConfig};
pub use db::{setup_database, SqliteStore};
pub use error::{LedgerError, Result};
pub use forecast::{forecast, ForecastResult, LinearFit, LOW_STOCK_THRESHOLD, MIN_HISTORY};
pub use ledger::{
    LedgerEntry, LedgerEntryBuilder, TrackingEvent,
    ETA_DAYS, MANUFACTURER_LOCATION, STATUS_IN_TRANSIT,
};
pub use medicine::{MedicineDescriptor, MedicineInput, ValidationError};
pub use service::{IntegrityReport, LedgerService, LocationUpdate};
pub use store::{open_store, DocumentId, DocumentStore, MemoryStore, StoreError, StoredEntry};
pub use tracking::{TrackingUpdate, TrackingUpdater, UpdatedEntry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
