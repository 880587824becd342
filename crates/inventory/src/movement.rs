use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetstock_core::{AggregateId, DomainError, DomainResult, Entity};
use fleetstock_events::Event;

use crate::stock::{QuantityChange, StockRecordId};
use crate::transfer::TransferId;

/// Movement entry identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(pub AggregateId);

impl MovementId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for MovementId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Immutable audit record of one quantity change to one stock record.
///
/// Invariant: `quantity_before + delta == quantity_after`, both snapshots
/// non-negative. There are no setters; entries are never edited once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementEntry {
    id: MovementId,
    stock_record_id: StockRecordId,
    transfer_id: Option<TransferId>,
    delta: i64,
    quantity_before: i64,
    quantity_after: i64,
    recorded_at: DateTime<Utc>,
}

impl MovementEntry {
    pub fn record(
        stock_record_id: StockRecordId,
        transfer_id: Option<TransferId>,
        delta: i64,
        quantity_before: i64,
        quantity_after: i64,
        recorded_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if delta == 0 {
            return Err(DomainError::validation("movement delta cannot be zero"));
        }
        if quantity_before < 0 || quantity_after < 0 {
            return Err(DomainError::invariant(
                "movement snapshots cannot be negative",
            ));
        }
        if quantity_before.checked_add(delta) != Some(quantity_after) {
            return Err(DomainError::invariant(format!(
                "movement does not balance: {quantity_before} + {delta} != {quantity_after}"
            )));
        }

        Ok(Self {
            id: MovementId::new(AggregateId::new()),
            stock_record_id,
            transfer_id,
            delta,
            quantity_before,
            quantity_after,
            recorded_at,
        })
    }

    /// Build the entry for a change produced by [`crate::StockRecord::adjust`].
    pub fn from_change(
        stock_record_id: StockRecordId,
        transfer_id: Option<TransferId>,
        change: QuantityChange,
        recorded_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Self::record(
            stock_record_id,
            transfer_id,
            change.delta,
            change.before,
            change.after,
            recorded_at,
        )
    }

    pub fn id_typed(&self) -> MovementId {
        self.id
    }

    pub fn stock_record_id(&self) -> StockRecordId {
        self.stock_record_id
    }

    pub fn transfer_id(&self) -> Option<TransferId> {
        self.transfer_id
    }

    pub fn delta(&self) -> i64 {
        self.delta
    }

    pub fn quantity_before(&self) -> i64 {
        self.quantity_before
    }

    pub fn quantity_after(&self) -> i64 {
        self.quantity_after
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

impl Entity for MovementEntry {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Event for MovementEntry {
    fn event_type(&self) -> &'static str {
        "inventory.stock.movement_recorded"
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}
