//! Application services: one unit of work per public operation.
//!
//! Every mutating operation follows the same pipeline:
//!
//! ```text
//! 1. Acquire the locks of every entity it will write (ordered, bounded wait)
//! 2. Read current state from the store
//! 3. Decide on a staged copy (pure domain logic; errors abort with nothing written)
//! 4. Commit one changeset (version-checked, all or nothing)
//! 5. Publish events for what was committed
//! ```

use std::sync::Arc;

use serde_json::Value as JsonValue;

use fleetstock_events::{EventBus, EventEnvelope};

use crate::config::Settings;
use crate::locks::LockManager;
use crate::publish::Publisher;
use crate::store::LedgerStore;

macro_rules! impl_service_clone {
    ($name:ident) => {
        impl<S, B> Clone for $name<S, B> {
            fn clone(&self) -> Self {
                Self {
                    ctx: std::sync::Arc::clone(&self.ctx),
                }
            }
        }
    };
}

pub(crate) use impl_service_clone;

pub mod ledger;
pub mod payables;
pub mod stock;
pub mod transfer;

pub use ledger::MovementLedger;
pub use payables::{ApplyPayment, IssuedInvoice, PayablesService};
pub use stock::StockService;
pub use transfer::TransferWorkflow;

/// Dependencies shared by every service of one ledger.
#[derive(Debug)]
pub(crate) struct Context<S, B> {
    pub(crate) store: S,
    pub(crate) publisher: Publisher<B>,
    pub(crate) locks: LockManager,
    pub(crate) settings: Settings,
}

/// The four services over one store, one bus and one lock table.
///
/// Services must share the lock table: a stock correction and a transfer
/// confirmation touching the same record serialize through it.
#[derive(Debug)]
pub struct LedgerServices<S, B> {
    pub stock: StockService<S, B>,
    pub movements: MovementLedger<S, B>,
    pub transfers: TransferWorkflow<S, B>,
    pub payables: PayablesService<S, B>,
}

impl<S, B> LedgerServices<S, B>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B, settings: Settings) -> Self {
        let ctx = Arc::new(Context {
            store,
            publisher: Publisher::new(bus),
            locks: LockManager::new(settings.lock_timeout),
            settings,
        });

        Self {
            stock: StockService::new(Arc::clone(&ctx)),
            movements: MovementLedger::new(Arc::clone(&ctx)),
            transfers: TransferWorkflow::new(Arc::clone(&ctx)),
            payables: PayablesService::new(ctx),
        }
    }
}

impl<S, B> Clone for LedgerServices<S, B> {
    fn clone(&self) -> Self {
        Self {
            stock: self.stock.clone(),
            movements: self.movements.clone(),
            transfers: self.transfers.clone(),
            payables: self.payables.clone(),
        }
    }
}
