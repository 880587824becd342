use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use fleetstock_core::{DomainError, ExpectedVersion, ItemId, SupplierId, WarehouseId};
use fleetstock_inventory::{
    MovementEntry, StockKey, StockRecord, StockRecordId, TransferId, TransferRequest,
};
use fleetstock_payables::{InvoiceId, Payment, PaymentId, SupplierInvoice};

/// Storage operation error.
///
/// These are **infrastructure errors** (availability, concurrency, locking) as
/// opposed to domain errors (validation, insufficient stock, over-allocation).
/// A failed commit never leaves a partial write behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A staged write no longer matches the stored version.
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    #[error("timed out waiting for lock on {0}")]
    LockTimeout(String),

    #[error("storage lock poisoned")]
    Poisoned,
}

/// Client-supplied key making a confirm or payment safe to retry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub const MAX_LEN: usize = 128;

    pub fn new(key: impl Into<String>) -> Result<Self, DomainError> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("idempotency key cannot be empty"));
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(DomainError::validation(format!(
                "idempotency key longer than {} bytes",
                Self::MAX_LEN
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a keyed operation did the first time it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RecordedOutcome {
    TransferConfirmed(TransferId),
    PaymentApplied(PaymentId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferFilter {
    All,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementFilter {
    All,
    StockRecord(StockRecordId),
    Transfer(TransferId),
}

/// Claim on the next invoice number of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceClaim {
    pub branch: u32,
    pub sequence: u64,
}

/// Every write of one unit of work, committed together or not at all.
///
/// Each record write carries the version the record was read at; the store
/// rejects the whole changeset if any of them moved in the meantime.
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    stock: Vec<(StockRecord, ExpectedVersion)>,
    movements: Vec<MovementEntry>,
    transfers: Vec<(TransferRequest, ExpectedVersion)>,
    invoices: Vec<(SupplierInvoice, ExpectedVersion)>,
    payments: Vec<Payment>,
    outcomes: Vec<(IdempotencyKey, RecordedOutcome)>,
    sequence_claims: Vec<SequenceClaim>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_stock(&mut self, record: StockRecord, expected: ExpectedVersion) -> &mut Self {
        self.stock.push((record, expected));
        self
    }

    pub fn append_movement(&mut self, entry: MovementEntry) -> &mut Self {
        self.movements.push(entry);
        self
    }

    pub fn put_transfer(&mut self, transfer: TransferRequest, expected: ExpectedVersion) -> &mut Self {
        self.transfers.push((transfer, expected));
        self
    }

    pub fn put_invoice(&mut self, invoice: SupplierInvoice, expected: ExpectedVersion) -> &mut Self {
        self.invoices.push((invoice, expected));
        self
    }

    pub fn insert_payment(&mut self, payment: Payment) -> &mut Self {
        self.payments.push(payment);
        self
    }

    pub fn remember(&mut self, key: IdempotencyKey, outcome: RecordedOutcome) -> &mut Self {
        self.outcomes.push((key, outcome));
        self
    }

    pub fn claim_sequence(&mut self, claim: SequenceClaim) -> &mut Self {
        self.sequence_claims.push(claim);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.stock.is_empty()
            && self.movements.is_empty()
            && self.transfers.is_empty()
            && self.invoices.is_empty()
            && self.payments.is_empty()
            && self.outcomes.is_empty()
            && self.sequence_claims.is_empty()
    }

    pub fn stock(&self) -> &[(StockRecord, ExpectedVersion)] {
        &self.stock
    }

    pub fn movements(&self) -> &[MovementEntry] {
        &self.movements
    }

    pub fn transfers(&self) -> &[(TransferRequest, ExpectedVersion)] {
        &self.transfers
    }

    pub fn invoices(&self) -> &[(SupplierInvoice, ExpectedVersion)] {
        &self.invoices
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn outcomes(&self) -> &[(IdempotencyKey, RecordedOutcome)] {
        &self.outcomes
    }

    pub fn sequence_claims(&self) -> &[SequenceClaim] {
        &self.sequence_claims
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Ledger position of the first appended movement (1-based). Movements of
    /// the changeset occupy consecutive positions from here.
    pub first_movement_position: u64,
}

impl CommitReceipt {
    pub fn movement_position(&self, index: usize) -> u64 {
        self.first_movement_position + index as u64
    }
}

/// Durable state of the stock ledger and payables.
///
/// ## Commit semantics
///
/// `commit()`:
/// - checks every staged write against its `ExpectedVersion`
/// - rejects payments, idempotency keys and stock pairs that already exist
/// - checks sequence claims are exactly the next number of their branch
/// - applies everything or nothing
///
/// Reads see only committed state. Implementations must be safe to share
/// across threads; mutual exclusion over a read-validate-commit cycle is the
/// caller's job (see [`crate::locks::LockManager`]).
pub trait LedgerStore: Send + Sync {
    fn stock_record(&self, key: &StockKey) -> Result<Option<StockRecord>, StoreError>;

    fn stock_record_by_id(&self, id: StockRecordId) -> Result<Option<StockRecord>, StoreError>;

    /// Records held at a warehouse, ordered by item.
    fn stock_by_warehouse(&self, warehouse: WarehouseId) -> Result<Vec<StockRecord>, StoreError>;

    /// Records of an item across warehouses, ordered by warehouse.
    fn stock_by_item(&self, item: ItemId) -> Result<Vec<StockRecord>, StoreError>;

    /// Movement entries in append order.
    fn movements(&self, filter: MovementFilter) -> Result<Vec<MovementEntry>, StoreError>;

    fn transfer(&self, id: TransferId) -> Result<Option<TransferRequest>, StoreError>;

    /// Transfers in creation order.
    fn transfers(&self, filter: TransferFilter) -> Result<Vec<TransferRequest>, StoreError>;

    fn invoice(&self, id: InvoiceId) -> Result<Option<SupplierInvoice>, StoreError>;

    /// A supplier's invoices in issue order.
    fn invoices_by_supplier(&self, supplier: SupplierId) -> Result<Vec<SupplierInvoice>, StoreError>;

    fn payment(&self, id: PaymentId) -> Result<Option<Payment>, StoreError>;

    fn payments_by_supplier(&self, supplier: SupplierId) -> Result<Vec<Payment>, StoreError>;

    fn recorded_outcome(&self, key: &IdempotencyKey) -> Result<Option<RecordedOutcome>, StoreError>;

    /// Next unused invoice sequence of a branch. Does not reserve it; a
    /// [`SequenceClaim`] in the committing changeset does.
    fn next_invoice_sequence(&self, branch: u32) -> Result<u64, StoreError>;

    fn commit(&self, changes: Changeset) -> Result<CommitReceipt, StoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn stock_record(&self, key: &StockKey) -> Result<Option<StockRecord>, StoreError> {
        (**self).stock_record(key)
    }

    fn stock_record_by_id(&self, id: StockRecordId) -> Result<Option<StockRecord>, StoreError> {
        (**self).stock_record_by_id(id)
    }

    fn stock_by_warehouse(&self, warehouse: WarehouseId) -> Result<Vec<StockRecord>, StoreError> {
        (**self).stock_by_warehouse(warehouse)
    }

    fn stock_by_item(&self, item: ItemId) -> Result<Vec<StockRecord>, StoreError> {
        (**self).stock_by_item(item)
    }

    fn movements(&self, filter: MovementFilter) -> Result<Vec<MovementEntry>, StoreError> {
        (**self).movements(filter)
    }

    fn transfer(&self, id: TransferId) -> Result<Option<TransferRequest>, StoreError> {
        (**self).transfer(id)
    }

    fn transfers(&self, filter: TransferFilter) -> Result<Vec<TransferRequest>, StoreError> {
        (**self).transfers(filter)
    }

    fn invoice(&self, id: InvoiceId) -> Result<Option<SupplierInvoice>, StoreError> {
        (**self).invoice(id)
    }

    fn invoices_by_supplier(&self, supplier: SupplierId) -> Result<Vec<SupplierInvoice>, StoreError> {
        (**self).invoices_by_supplier(supplier)
    }

    fn payment(&self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        (**self).payment(id)
    }

    fn payments_by_supplier(&self, supplier: SupplierId) -> Result<Vec<Payment>, StoreError> {
        (**self).payments_by_supplier(supplier)
    }

    fn recorded_outcome(&self, key: &IdempotencyKey) -> Result<Option<RecordedOutcome>, StoreError> {
        (**self).recorded_outcome(key)
    }

    fn next_invoice_sequence(&self, branch: u32) -> Result<u64, StoreError> {
        (**self).next_invoice_sequence(branch)
    }

    fn commit(&self, changes: Changeset) -> Result<CommitReceipt, StoreError> {
        (**self).commit(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_is_trimmed_and_bounded() {
        assert_eq!(IdempotencyKey::new("  pay-1 ").unwrap().as_str(), "pay-1");
        assert!(IdempotencyKey::new("   ").is_err());
        assert!(IdempotencyKey::new("x".repeat(IdempotencyKey::MAX_LEN + 1)).is_err());
    }

    #[test]
    fn empty_changeset_reports_empty() {
        let mut changes = Changeset::new();
        assert!(changes.is_empty());
        changes.claim_sequence(SequenceClaim { branch: 1, sequence: 1 });
        assert!(!changes.is_empty());
    }
}
