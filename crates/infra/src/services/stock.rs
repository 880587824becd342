//! Per-(item, warehouse) stock operations.
//!
//! Every quantity change funnels through [`StockRecord::adjust`], whether it
//! comes from a manual correction here or from a transfer leg.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{info, instrument, warn};

use fleetstock_core::{DomainError, ExpectedVersion, ItemId, WarehouseId};
use fleetstock_events::{EventBus, EventEnvelope};
use fleetstock_inventory::{MovementEntry, StockBook, StockKey, StockRecord, StockRecordId};

use super::{Context, impl_service_clone};
use crate::error::ServiceResult;
use crate::locks::LockKey;
use crate::store::{Changeset, LedgerStore};

#[derive(Debug)]
pub struct StockService<S, B> {
    ctx: Arc<Context<S, B>>,
}

impl_service_clone!(StockService);

impl<S, B> StockService<S, B>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub(crate) fn new(ctx: Arc<Context<S, B>>) -> Self {
        Self { ctx }
    }

    /// Start tracking an item at a warehouse.
    #[instrument(skip(self), fields(item = %item_id, warehouse = %warehouse_id), err)]
    pub fn assign(
        &self,
        item_id: ItemId,
        warehouse_id: WarehouseId,
        initial_quantity: i64,
    ) -> ServiceResult<StockRecordId> {
        let key = StockKey::new(item_id, warehouse_id);
        let _locks = self.ctx.locks.acquire([LockKey::Stock(key)])?;

        if self.ctx.store.stock_record(&key)?.is_some() {
            return Err(DomainError::DuplicateAssignment {
                item: item_id.to_string(),
                warehouse: warehouse_id.to_string(),
            }
            .into());
        }

        let record = StockRecord::assign(item_id, warehouse_id, initial_quantity, Utc::now())?;
        let id = record.id_typed();

        let mut changes = Changeset::new();
        changes.put_stock(record, ExpectedVersion::Exact(0));
        self.ctx.store.commit(changes)?;

        info!(stock_record = %id, quantity = initial_quantity, "stock assigned");
        Ok(id)
    }

    pub fn get(&self, item_id: ItemId, warehouse_id: WarehouseId) -> ServiceResult<StockRecord> {
        let key = StockKey::new(item_id, warehouse_id);
        self.ctx
            .store
            .stock_record(&key)?
            .ok_or_else(|| not_found(&key).into())
    }

    /// Apply a signed correction and return the new quantity.
    ///
    /// Writes one movement entry with no related transfer. A zero delta is a
    /// validation error.
    #[instrument(skip(self), fields(item = %item_id, warehouse = %warehouse_id), err)]
    pub fn adjust(&self, item_id: ItemId, warehouse_id: WarehouseId, delta: i64) -> ServiceResult<i64> {
        self.correct(StockKey::new(item_id, warehouse_id), |_| Some(delta))
    }

    /// Record a physical count: the quantity becomes `counted`.
    ///
    /// A count equal to the current quantity writes nothing.
    #[instrument(skip(self), fields(item = %item_id, warehouse = %warehouse_id), err)]
    pub fn set_quantity(
        &self,
        item_id: ItemId,
        warehouse_id: WarehouseId,
        counted: i64,
    ) -> ServiceResult<i64> {
        if counted < 0 {
            return Err(DomainError::validation("counted quantity cannot be negative").into());
        }
        self.correct(StockKey::new(item_id, warehouse_id), |record| {
            Some(counted - record.quantity()).filter(|delta| *delta != 0)
        })
    }

    #[instrument(skip(self), fields(item = %item_id, warehouse = %warehouse_id), err)]
    pub fn set_thresholds(
        &self,
        item_id: ItemId,
        warehouse_id: WarehouseId,
        min_quantity: i64,
        max_quantity: Option<i64>,
    ) -> ServiceResult<StockRecord> {
        let key = StockKey::new(item_id, warehouse_id);
        let _locks = self.ctx.locks.acquire([LockKey::Stock(key)])?;

        let mut record = self.ctx.store.stock_record(&key)?.ok_or_else(|| not_found(&key))?;
        let loaded = record.version();
        record.set_thresholds(min_quantity, max_quantity, Utc::now())?;

        let mut changes = Changeset::new();
        changes.put_stock(record.clone(), ExpectedVersion::Exact(loaded));
        self.ctx.store.commit(changes)?;

        info!(min = min_quantity, max = ?max_quantity, "stock thresholds updated");
        Ok(record)
    }

    pub fn list_by_warehouse(&self, warehouse_id: WarehouseId) -> ServiceResult<Vec<StockRecord>> {
        Ok(self.ctx.store.stock_by_warehouse(warehouse_id)?)
    }

    pub fn list_by_item(&self, item_id: ItemId) -> ServiceResult<Vec<StockRecord>> {
        Ok(self.ctx.store.stock_by_item(item_id)?)
    }

    /// Records at a warehouse whose quantity is under their minimum threshold.
    pub fn below_minimum(&self, warehouse_id: WarehouseId) -> ServiceResult<Vec<StockRecord>> {
        Ok(self
            .list_by_warehouse(warehouse_id)?
            .into_iter()
            .filter(StockRecord::is_below_minimum)
            .collect())
    }

    fn correct<F>(&self, key: StockKey, delta_for: F) -> ServiceResult<i64>
    where
        F: FnOnce(&StockRecord) -> Option<i64>,
    {
        let _locks = self.ctx.locks.acquire([LockKey::Stock(key)])?;

        let record = self.ctx.store.stock_record(&key)?.ok_or_else(|| not_found(&key))?;
        let Some(delta) = delta_for(&record) else {
            return Ok(record.quantity());
        };

        let now = Utc::now();
        let mut book = StockBook::new();
        book.load(record);
        let (record_id, change) = book.adjust(&key, delta, now).inspect_err(|err| {
            warn!(delta, error = %err, "stock correction refused");
        })?;
        let entry = MovementEntry::from_change(record_id, None, change, now)?;

        let mut changes = Changeset::new();
        for (record, loaded) in book.into_changed() {
            changes.put_stock(record, ExpectedVersion::Exact(loaded));
        }
        changes.append_movement(entry.clone());
        let receipt = self.ctx.store.commit(changes)?;

        info!(
            stock_record = %record_id,
            before = change.before,
            delta = change.delta,
            after = change.after,
            "stock corrected"
        );
        self.ctx.publisher.movements(&receipt, std::slice::from_ref(&entry));
        Ok(change.after)
    }

}

fn not_found(key: &StockKey) -> DomainError {
    DomainError::not_found("stock record", format!("{}@{}", key.item_id, key.warehouse_id))
}
