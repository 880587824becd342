//! Read-side projections for presentation.
//!
//! Display names come from an external [`Directory`] and are joined at query
//! time; they are never stored next to the ledger data.

pub mod directory;
pub mod views;

pub use directory::{Directory, InMemoryDirectory};
pub use views::{InvoiceView, NamedRef, TransferLineView, TransferView};
