//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures only (validation, invariants, state-machine
/// violations). Infrastructure failures belong to the storage layer. Every
/// variant carries the offending entity so callers can act on it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A conflict occurred (stale version, reused idempotency key).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A transfer request was malformed (same source/destination, bad lines).
    #[error("invalid transfer request: {0}")]
    InvalidTransferRequest(String),

    /// A transfer was confirmed or rejected outside of `pending`.
    #[error("transfer {transfer} is {actual}, expected pending")]
    InvalidTransferState { transfer: String, actual: String },

    /// Applying a quantity change would make a stock record negative.
    #[error(
        "insufficient stock for item {item} at warehouse {warehouse} (available {available}, requested {requested})"
    )]
    InsufficientStock {
        item: String,
        warehouse: String,
        available: i64,
        requested: i64,
    },

    /// The (item, warehouse) pair already has a stock record.
    #[error("item {item} is already assigned to warehouse {warehouse}")]
    DuplicateAssignment { item: String, warehouse: String },

    /// A payment was malformed (non-positive amounts, allocations above total).
    #[error("invalid payment: {0}")]
    InvalidPayment(String),

    /// An allocation exceeds the target invoice's outstanding balance.
    #[error("allocation of {requested} exceeds balance {balance} of invoice {invoice}")]
    OverAllocation {
        invoice: String,
        balance: i64,
        requested: i64,
    },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_transfer(msg: impl Into<String>) -> Self {
        Self::InvalidTransferRequest(msg.into())
    }

    pub fn invalid_payment(msg: impl Into<String>) -> Self {
        Self::InvalidPayment(msg.into())
    }

    /// Stable, machine-readable kind name (used as a structured log field).
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation",
            DomainError::InvariantViolation(_) => "invariant_violation",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::NotFound { .. } => "not_found",
            DomainError::Conflict(_) => "conflict",
            DomainError::InvalidTransferRequest(_) => "invalid_transfer_request",
            DomainError::InvalidTransferState { .. } => "invalid_transfer_state",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::DuplicateAssignment { .. } => "duplicate_assignment",
            DomainError::InvalidPayment(_) => "invalid_payment",
            DomainError::OverAllocation { .. } => "over_allocation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_names_item_and_warehouse() {
        let err = DomainError::InsufficientStock {
            item: "P".to_string(),
            warehouse: "A".to_string(),
            available: 2,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "insufficient stock for item P at warehouse A (available 2, requested 5)"
        );
        assert_eq!(err.kind(), "insufficient_stock");
    }

    #[test]
    fn invalid_state_reports_actual_state() {
        let err = DomainError::InvalidTransferState {
            transfer: "t-1".to_string(),
            actual: "confirmed".to_string(),
        };
        assert_eq!(err.to_string(), "transfer t-1 is confirmed, expected pending");
    }

    #[test]
    fn not_found_carries_entity_and_id() {
        let err = DomainError::not_found("invoice", "inv-9");
        assert_eq!(err.to_string(), "invoice not found: inv-9");
    }
}
