//! Infrastructure layer: storage, locking, configuration and the services
//! that drive the stock ledger and payables domains.

pub mod config;
pub mod error;
pub mod locks;
pub mod projections;
pub mod publish;
pub mod services;
pub mod store;


use std::sync::Arc;

use serde_json::Value as JsonValue;

use fleetstock_events::{EventEnvelope, InMemoryEventBus};

pub use config::Settings;
pub use error::{ServiceError, ServiceResult};
pub use services::{
    ApplyPayment, IssuedInvoice, LedgerServices, MovementLedger, PayablesService, StockService,
    TransferWorkflow,
};
pub use store::{IdempotencyKey, InMemoryLedgerStore, LedgerStore, StoreError};

pub type JsonBus = InMemoryEventBus<EventEnvelope<JsonValue>>;

/// Services over a fresh in-memory store and bus, for tests/dev.
pub type InMemoryServices = LedgerServices<Arc<InMemoryLedgerStore>, Arc<JsonBus>>;

impl InMemoryServices {
    /// Build services plus handles on the store and bus they share.
    pub fn in_memory(settings: Settings) -> (Self, Arc<InMemoryLedgerStore>, Arc<JsonBus>) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let bus = Arc::new(JsonBus::new());
        let services = LedgerServices::new(Arc::clone(&store), Arc::clone(&bus), settings);
        (services, store, bus)
    }
}
