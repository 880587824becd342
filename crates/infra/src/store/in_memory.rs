use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use fleetstock_core::{AggregateRoot, ExpectedVersion, ItemId, SupplierId, WarehouseId};
use fleetstock_inventory::{
    MovementEntry, StockKey, StockRecord, StockRecordId, TransferId, TransferRequest,
};
use fleetstock_payables::{InvoiceId, Payment, PaymentId, SupplierInvoice};

use super::r#trait::{
    Changeset, CommitReceipt, IdempotencyKey, LedgerStore, MovementFilter, RecordedOutcome,
    StoreError, TransferFilter,
};

#[derive(Debug, Default)]
struct Tables {
    stock: BTreeMap<StockKey, StockRecord>,
    stock_keys: HashMap<StockRecordId, StockKey>,
    movements: Vec<MovementEntry>,
    // Ids are time-ordered, so map order is creation order.
    transfers: BTreeMap<TransferId, TransferRequest>,
    invoices: BTreeMap<InvoiceId, SupplierInvoice>,
    payments: BTreeMap<PaymentId, Payment>,
    outcomes: HashMap<IdempotencyKey, RecordedOutcome>,
    last_sequence: HashMap<u32, u64>,
}

impl Tables {
    fn validate(&self, changes: &Changeset) -> Result<(), StoreError> {
        for (record, expected) in changes.stock() {
            let key = record.key();
            let current = self.stock.get(&key);
            check(expected, current.map(StockRecord::version), || {
                format!("stock record {}@{}", key.item_id, key.warehouse_id)
            })?;
            if let Some(current) = current {
                if current.id_typed() != record.id_typed() {
                    return Err(StoreError::Conflict(format!(
                        "stock record {}@{} replaced by a different record",
                        key.item_id, key.warehouse_id
                    )));
                }
            }
            if record.quantity() < 0 {
                return Err(StoreError::Conflict(format!(
                    "stock record {} would go negative",
                    record.id_typed()
                )));
            }
        }

        for entry in changes.movements() {
            let known = self.stock_keys.contains_key(&entry.stock_record_id())
                || changes
                    .stock()
                    .iter()
                    .any(|(r, _)| r.id_typed() == entry.stock_record_id());
            if !known {
                return Err(StoreError::Conflict(format!(
                    "movement {} references unknown stock record {}",
                    entry.id_typed(),
                    entry.stock_record_id()
                )));
            }
        }

        for (transfer, expected) in changes.transfers() {
            let id = transfer.id_typed();
            check(expected, self.transfers.get(&id).map(|t| t.version()), || {
                format!("transfer {id}")
            })?;
        }

        for (invoice, expected) in changes.invoices() {
            let id = invoice.id_typed();
            check(expected, self.invoices.get(&id).map(|i| i.version()), || {
                format!("invoice {id}")
            })?;
        }

        for payment in changes.payments() {
            if self.payments.contains_key(&payment.id_typed()) {
                return Err(StoreError::Conflict(format!(
                    "payment {} already recorded",
                    payment.id_typed()
                )));
            }
        }

        for (key, _) in changes.outcomes() {
            if self.outcomes.contains_key(key) {
                return Err(StoreError::Conflict(format!(
                    "idempotency key '{key}' already used"
                )));
            }
        }

        let mut claimed: HashMap<u32, u64> = HashMap::new();
        for claim in changes.sequence_claims() {
            let last = claimed
                .get(&claim.branch)
                .or_else(|| self.last_sequence.get(&claim.branch))
                .copied()
                .unwrap_or(0);
            if claim.sequence != last + 1 {
                return Err(StoreError::Conflict(format!(
                    "invoice sequence {} of branch {} is not next (last {last})",
                    claim.sequence, claim.branch
                )));
            }
            claimed.insert(claim.branch, claim.sequence);
        }

        Ok(())
    }

    fn apply(&mut self, changes: Changeset) -> CommitReceipt {
        let receipt = CommitReceipt {
            first_movement_position: self.movements.len() as u64 + 1,
        };

        for claim in changes.sequence_claims() {
            self.last_sequence.insert(claim.branch, claim.sequence);
        }
        for (record, _) in changes.stock() {
            self.stock_keys.insert(record.id_typed(), record.key());
            self.stock.insert(record.key(), record.clone());
        }
        self.movements.extend(changes.movements().iter().cloned());
        for (transfer, _) in changes.transfers() {
            self.transfers.insert(transfer.id_typed(), transfer.clone());
        }
        for (invoice, _) in changes.invoices() {
            self.invoices.insert(invoice.id_typed(), invoice.clone());
        }
        for payment in changes.payments() {
            self.payments.insert(payment.id_typed(), payment.clone());
        }
        for (key, outcome) in changes.outcomes() {
            self.outcomes.insert(key.clone(), *outcome);
        }

        receipt
    }
}

fn check(
    expected: &ExpectedVersion,
    current: Option<u64>,
    what: impl FnOnce() -> String,
) -> Result<(), StoreError> {
    let actual = current.unwrap_or(0);
    if expected.matches(actual) {
        Ok(())
    } else {
        Err(StoreError::Conflict(format!(
            "{} expected {expected:?}, found version {actual}",
            what()
        )))
    }
}

/// In-memory ledger store.
///
/// Intended for tests/dev. All tables sit behind one `RwLock`, so a commit is
/// trivially atomic: it validates the whole changeset, then applies it, while
/// holding the write lock.
///
/// Faults can be injected to exercise the failure paths of the services.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    tables: RwLock<Tables>,
    fail_next_commit: Mutex<Option<String>>,
    unavailable: AtomicBool,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail with `Unavailable` before touching any table.
    pub fn fail_next_commit(&self, reason: impl Into<String>) {
        if let Ok(mut slot) = self.fail_next_commit.lock() {
            *slot = Some(reason.into());
        }
    }

    /// Make every read and commit fail with `Unavailable` until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of movement entries in the ledger.
    pub fn movement_count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.movements.len())
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store marked unavailable".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.ensure_available()?;
        self.tables.read().map_err(|_| StoreError::Poisoned)
    }

    fn take_injected_fault(&self) -> Result<(), StoreError> {
        let mut slot = self.fail_next_commit.lock().map_err(|_| StoreError::Poisoned)?;
        match slot.take() {
            Some(reason) => Err(StoreError::Unavailable(reason)),
            None => Ok(()),
        }
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn stock_record(&self, key: &StockKey) -> Result<Option<StockRecord>, StoreError> {
        Ok(self.read()?.stock.get(key).cloned())
    }

    fn stock_record_by_id(&self, id: StockRecordId) -> Result<Option<StockRecord>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .stock_keys
            .get(&id)
            .and_then(|key| tables.stock.get(key))
            .cloned())
    }

    fn stock_by_warehouse(&self, warehouse: WarehouseId) -> Result<Vec<StockRecord>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .stock
            .range(StockKey::warehouse_range(warehouse))
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn stock_by_item(&self, item: ItemId) -> Result<Vec<StockRecord>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .stock
            .iter()
            .filter(|(k, _)| k.item_id == item)
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn movements(&self, filter: MovementFilter) -> Result<Vec<MovementEntry>, StoreError> {
        let tables = self.read()?;
        let entries = tables.movements.iter();
        Ok(match filter {
            MovementFilter::All => entries.cloned().collect(),
            MovementFilter::StockRecord(id) => entries
                .filter(|e| e.stock_record_id() == id)
                .cloned()
                .collect(),
            MovementFilter::Transfer(id) => entries
                .filter(|e| e.transfer_id() == Some(id))
                .cloned()
                .collect(),
        })
    }

    fn transfer(&self, id: TransferId) -> Result<Option<TransferRequest>, StoreError> {
        Ok(self.read()?.transfers.get(&id).cloned())
    }

    fn transfers(&self, filter: TransferFilter) -> Result<Vec<TransferRequest>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .transfers
            .values()
            .filter(|t| filter == TransferFilter::All || t.is_pending())
            .cloned()
            .collect())
    }

    fn invoice(&self, id: InvoiceId) -> Result<Option<SupplierInvoice>, StoreError> {
        Ok(self.read()?.invoices.get(&id).cloned())
    }

    fn invoices_by_supplier(&self, supplier: SupplierId) -> Result<Vec<SupplierInvoice>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .invoices
            .values()
            .filter(|i| i.supplier_id() == Some(supplier))
            .cloned()
            .collect())
    }

    fn payment(&self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        Ok(self.read()?.payments.get(&id).cloned())
    }

    fn payments_by_supplier(&self, supplier: SupplierId) -> Result<Vec<Payment>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .payments
            .values()
            .filter(|p| p.supplier_id() == supplier)
            .cloned()
            .collect())
    }

    fn recorded_outcome(&self, key: &IdempotencyKey) -> Result<Option<RecordedOutcome>, StoreError> {
        Ok(self.read()?.outcomes.get(key).copied())
    }

    fn next_invoice_sequence(&self, branch: u32) -> Result<u64, StoreError> {
        let tables = self.read()?;
        Ok(tables.last_sequence.get(&branch).copied().unwrap_or(0) + 1)
    }

    fn commit(&self, changes: Changeset) -> Result<CommitReceipt, StoreError> {
        self.ensure_available()?;
        self.take_injected_fault()?;

        let mut tables = self.tables.write().map_err(|_| StoreError::Poisoned)?;
        tables.validate(&changes)?;
        Ok(tables.apply(changes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fleetstock_core::AggregateId;
    use fleetstock_inventory::StockBook;

    use crate::store::SequenceClaim;

    fn assigned(quantity: i64) -> StockRecord {
        StockRecord::assign(ItemId::new(), WarehouseId::new(), quantity, Utc::now()).unwrap()
    }

    fn insert(store: &InMemoryLedgerStore, record: &StockRecord) {
        let mut changes = Changeset::new();
        changes.put_stock(record.clone(), ExpectedVersion::Exact(0));
        store.commit(changes).unwrap();
    }

    #[test]
    fn commit_then_read_back() {
        let store = InMemoryLedgerStore::new();
        let record = assigned(7);
        insert(&store, &record);

        let loaded = store.stock_record(&record.key()).unwrap().unwrap();
        assert_eq!(loaded.quantity(), 7);
        assert_eq!(
            store.stock_record_by_id(record.id_typed()).unwrap(),
            Some(loaded)
        );
    }

    #[test]
    fn stale_version_rejects_whole_changeset() {
        let store = InMemoryLedgerStore::new();
        let record = assigned(5);
        insert(&store, &record);

        let mut book = StockBook::new();
        book.load(record.clone());
        let (id, change) = book.adjust(&record.key(), -2, Utc::now()).unwrap();
        let (updated, _) = book.into_changed().remove(0);

        let mut changes = Changeset::new();
        changes
            .put_stock(updated, ExpectedVersion::Exact(0))
            .append_movement(MovementEntry::from_change(id, None, change, Utc::now()).unwrap());

        assert!(matches!(store.commit(changes), Err(StoreError::Conflict(_))));
        assert_eq!(store.stock_record(&record.key()).unwrap().unwrap().quantity(), 5);
        assert_eq!(store.movement_count().unwrap(), 0);
    }

    #[test]
    fn injected_fault_fails_once_and_writes_nothing() {
        let store = InMemoryLedgerStore::new();
        let record = assigned(1);
        store.fail_next_commit("disk full");

        let mut changes = Changeset::new();
        changes.put_stock(record.clone(), ExpectedVersion::Exact(0));
        assert!(matches!(
            store.commit(changes.clone()),
            Err(StoreError::Unavailable(reason)) if reason == "disk full"
        ));
        assert_eq!(store.stock_record(&record.key()).unwrap(), None);

        store.commit(changes).unwrap();
        assert!(store.stock_record(&record.key()).unwrap().is_some());
    }

    #[test]
    fn unavailable_store_fails_reads() {
        let store = InMemoryLedgerStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.transfers(TransferFilter::All),
            Err(StoreError::Unavailable(_))
        ));
        store.set_unavailable(false);
        assert!(store.transfers(TransferFilter::All).unwrap().is_empty());
    }

    #[test]
    fn sequence_claims_must_be_consecutive() {
        let store = InMemoryLedgerStore::new();
        assert_eq!(store.next_invoice_sequence(3).unwrap(), 1);

        let mut skip = Changeset::new();
        skip.claim_sequence(SequenceClaim { branch: 3, sequence: 2 });
        assert!(matches!(store.commit(skip), Err(StoreError::Conflict(_))));

        let mut first = Changeset::new();
        first.claim_sequence(SequenceClaim { branch: 3, sequence: 1 });
        store.commit(first).unwrap();
        assert_eq!(store.next_invoice_sequence(3).unwrap(), 2);
        assert_eq!(store.next_invoice_sequence(4).unwrap(), 1);
    }

    #[test]
    fn reused_idempotency_key_conflicts() {
        let store = InMemoryLedgerStore::new();
        let key = IdempotencyKey::new("confirm-1").unwrap();
        let outcome = RecordedOutcome::TransferConfirmed(TransferId::new(AggregateId::new()));

        let mut changes = Changeset::new();
        changes.remember(key.clone(), outcome);
        store.commit(changes.clone()).unwrap();

        assert_eq!(store.recorded_outcome(&key).unwrap(), Some(outcome));
        assert!(matches!(store.commit(changes), Err(StoreError::Conflict(_))));
    }

    #[test]
    fn movement_for_unknown_record_is_rejected() {
        let store = InMemoryLedgerStore::new();
        let entry = MovementEntry::record(
            StockRecordId::new(AggregateId::new()),
            None,
            3,
            0,
            3,
            Utc::now(),
        )
        .unwrap();
        let mut changes = Changeset::new();
        changes.append_movement(entry);
        assert!(matches!(store.commit(changes), Err(StoreError::Conflict(_))));
    }

    #[test]
    fn warehouse_listing_is_scoped() {
        let store = InMemoryLedgerStore::new();
        let warehouse = WarehouseId::new();
        let here = StockRecord::assign(ItemId::new(), warehouse, 1, Utc::now()).unwrap();
        let there = assigned(2);
        insert(&store, &here);
        insert(&store, &there);

        let listed = store.stock_by_warehouse(warehouse).unwrap();
        assert_eq!(listed, vec![here]);
    }

    #[test]
    fn warehouse_listing_stops_at_neighbouring_warehouses() {
        let store = InMemoryLedgerStore::new();
        let mut warehouses = [WarehouseId::new(), WarehouseId::new(), WarehouseId::new()];
        warehouses.sort();
        for warehouse in warehouses {
            for _ in 0..3 {
                let record = StockRecord::assign(ItemId::new(), warehouse, 1, Utc::now()).unwrap();
                insert(&store, &record);
            }
        }

        let middle = warehouses[1];
        let listed = store.stock_by_warehouse(middle).unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed.iter().all(|r| r.warehouse_id() == middle));
        assert!(store.stock_by_warehouse(WarehouseId::new()).unwrap().is_empty());
    }
}
