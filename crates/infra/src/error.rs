//! Errors surfaced by the ledger services.

use thiserror::Error;

use fleetstock_core::DomainError;

use crate::store::StoreError;

/// Failure of a service operation.
///
/// Either a business rule refused the request (nothing was written), or the
/// storage layer failed (nothing was written either; the caller may retry).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage fault: {0}")]
    StorageFault(#[from] StoreError),
}

impl ServiceError {
    /// Whether retrying the same request can succeed without changing it.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Domain(_) => false,
            ServiceError::StorageFault(StoreError::Poisoned) => false,
            ServiceError::StorageFault(_) => true,
        }
    }

    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(err) => Some(err),
            ServiceError::StorageFault(_) => None,
        }
    }

    /// Short machine-readable name, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Domain(err) => err.kind(),
            ServiceError::StorageFault(StoreError::Unavailable(_)) => "storage_unavailable",
            ServiceError::StorageFault(StoreError::Conflict(_)) => "storage_conflict",
            ServiceError::StorageFault(StoreError::LockTimeout(_)) => "lock_timeout",
            ServiceError::StorageFault(StoreError::Poisoned) => "storage_poisoned",
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
