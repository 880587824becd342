//! Ledger storage boundary.
//!
//! Services stage a [`Changeset`] per unit of work and hand it to a
//! [`LedgerStore`], which validates every version expectation and applies the
//! whole changeset atomically. No storage technology is assumed.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use r#trait::{
    Changeset, CommitReceipt, IdempotencyKey, LedgerStore, MovementFilter, RecordedOutcome,
    SequenceClaim, StoreError, TransferFilter,
};
