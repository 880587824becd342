//! Domain events and their distribution.
//!
//! Services publish an [`EventEnvelope`] for every committed mutation (stock
//! movements, transfer decisions, invoice payments) so reporting collaborators
//! can follow the ledger without polling storage.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
