use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetstock_core::{AggregateId, DomainError, DomainResult, Entity, ItemId, WarehouseId};

/// Stock record identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockRecordId(pub AggregateId);

impl StockRecordId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for StockRecordId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Natural key of a stock record.
///
/// Ordered by warehouse first, then item, which is the global lock order used
/// when a unit of work touches several records.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub warehouse_id: WarehouseId,
    pub item_id: ItemId,
}

impl StockKey {
    pub fn new(item_id: ItemId, warehouse_id: WarehouseId) -> Self {
        Self {
            warehouse_id,
            item_id,
        }
    }

    /// Every key of one warehouse, as one contiguous range in key order.
    pub fn warehouse_range(warehouse_id: WarehouseId) -> RangeInclusive<StockKey> {
        StockKey::new(ItemId::MIN, warehouse_id)..=StockKey::new(ItemId::MAX, warehouse_id)
    }
}

/// Before/after snapshot of one quantity change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityChange {
    pub before: i64,
    pub delta: i64,
    pub after: i64,
}

/// Quantity of one item held at one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    id: StockRecordId,
    item_id: ItemId,
    warehouse_id: WarehouseId,
    quantity: i64,
    min_quantity: i64,
    max_quantity: Option<i64>,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StockRecord {
    /// First assignment of an item to a warehouse.
    pub fn assign(
        item_id: ItemId,
        warehouse_id: WarehouseId,
        initial_quantity: i64,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if initial_quantity < 0 {
            return Err(DomainError::validation(
                "initial quantity cannot be negative",
            ));
        }
        Ok(Self {
            id: StockRecordId::new(AggregateId::new()),
            item_id,
            warehouse_id,
            quantity: initial_quantity,
            min_quantity: 0,
            max_quantity: None,
            version: 1,
            created_at: at,
            updated_at: at,
        })
    }

    pub fn id_typed(&self) -> StockRecordId {
        self.id
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.item_id, self.warehouse_id)
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn min_quantity(&self) -> i64 {
        self.min_quantity
    }

    pub fn max_quantity(&self) -> Option<i64> {
        self.max_quantity
    }

    /// Storage version (+1 per mutation, 1 right after assignment).
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_below_minimum(&self) -> bool {
        self.quantity < self.min_quantity
    }

    /// The only quantity mutation. Rejects any change that would go negative.
    pub fn adjust(&mut self, delta: i64, at: DateTime<Utc>) -> DomainResult<QuantityChange> {
        if delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }

        let after = self
            .quantity
            .checked_add(delta)
            .ok_or_else(|| DomainError::invariant("stock quantity overflow"))?;

        if after < 0 {
            return Err(DomainError::InsufficientStock {
                item: self.item_id.to_string(),
                warehouse: self.warehouse_id.to_string(),
                available: self.quantity,
                requested: delta.checked_neg().unwrap_or(i64::MAX),
            });
        }

        let change = QuantityChange {
            before: self.quantity,
            delta,
            after,
        };
        self.quantity = after;
        self.version += 1;
        self.updated_at = at;
        Ok(change)
    }

    pub fn set_thresholds(
        &mut self,
        min_quantity: i64,
        max_quantity: Option<i64>,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        if min_quantity < 0 {
            return Err(DomainError::validation("minimum threshold cannot be negative"));
        }
        if let Some(max) = max_quantity {
            if max < min_quantity {
                return Err(DomainError::validation(
                    "maximum threshold cannot be below minimum threshold",
                ));
            }
        }
        self.min_quantity = min_quantity;
        self.max_quantity = max_quantity;
        self.version += 1;
        self.updated_at = at;
        Ok(())
    }
}

impl Entity for StockRecord {
    type Id = StockRecordId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone)]
struct StagedRecord {
    record: StockRecord,
    loaded_version: u64,
}

/// Staging area for a unit of work over several stock records.
///
/// Records are loaded in, mutated through [`StockRecord::adjust`], and the
/// changed ones are handed back with the version they were loaded at so
/// storage can commit them together. Nothing here is visible to other
/// readers until that commit.
#[derive(Debug, Clone, Default)]
pub struct StockBook {
    records: BTreeMap<StockKey, StagedRecord>,
}

impl StockBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a record as currently stored.
    pub fn load(&mut self, record: StockRecord) {
        let loaded_version = record.version();
        self.records.insert(
            record.key(),
            StagedRecord {
                record,
                loaded_version,
            },
        );
    }

    pub fn get(&self, key: &StockKey) -> Option<&StockRecord> {
        self.records.get(key).map(|s| &s.record)
    }

    pub fn quantity(&self, key: &StockKey) -> Option<i64> {
        self.get(key).map(StockRecord::quantity)
    }

    /// Stage an empty record for a pair that has never held stock.
    pub fn open(&mut self, key: StockKey, at: DateTime<Utc>) -> DomainResult<&StockRecord> {
        if self.records.contains_key(&key) {
            return Err(DomainError::DuplicateAssignment {
                item: key.item_id.to_string(),
                warehouse: key.warehouse_id.to_string(),
            });
        }
        let record = StockRecord::assign(key.item_id, key.warehouse_id, 0, at)?;
        let staged = self.records.entry(key).or_insert(StagedRecord {
            record,
            loaded_version: 0,
        });
        Ok(&staged.record)
    }

    /// Apply a delta to a staged record.
    pub fn adjust(
        &mut self,
        key: &StockKey,
        delta: i64,
        at: DateTime<Utc>,
    ) -> DomainResult<(StockRecordId, QuantityChange)> {
        let staged = self.records.get_mut(key).ok_or_else(|| {
            DomainError::not_found("stock record", format!("{}@{}", key.item_id, key.warehouse_id))
        })?;
        let change = staged.record.adjust(delta, at)?;
        Ok((staged.record.id_typed(), change))
    }

    /// Records changed since loading, with the version each was loaded at
    /// (`0` for records opened in this unit of work), in key order.
    pub fn into_changed(self) -> Vec<(StockRecord, u64)> {
        self.records
            .into_values()
            .filter(|s| s.record.version() != s.loaded_version)
            .map(|s| (s.record, s.loaded_version))
            .collect()
    }
}
