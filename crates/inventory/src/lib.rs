//! Warehouse stock domain module.
//!
//! This crate contains the business rules for per-(item, warehouse) stock,
//! the append-only movement audit trail and the transfer request workflow,
//! implemented purely as deterministic domain logic (no IO, no locking, no
//! storage).

pub mod movement;
pub mod posting;
pub mod stock;
pub mod transfer;

pub use movement::{MovementEntry, MovementId};
pub use posting::post_transfer;
pub use stock::{QuantityChange, StockBook, StockKey, StockRecord, StockRecordId};
pub use transfer::{
    ConfirmTransfer, CreateTransfer, RejectTransfer, RequestedLine, TransferCommand,
    TransferConfirmed, TransferEvent, TransferId, TransferLine, TransferRejected, TransferRequest,
    TransferRequested, TransferStatus,
};
