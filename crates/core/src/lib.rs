//! Domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! aggregate/entity traits, strongly-typed identifiers and the error taxonomy
//! shared by the stock ledger and payables modules.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, ItemId, SupplierId, UserId, WarehouseId};
pub use value_object::ValueObject;
