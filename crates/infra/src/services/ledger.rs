//! Append-only movement history.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{info, instrument};

use fleetstock_core::DomainError;
use fleetstock_events::{EventBus, EventEnvelope};
use fleetstock_inventory::{MovementEntry, MovementId, StockRecordId, TransferId};

use super::{Context, impl_service_clone};
use crate::error::ServiceResult;
use crate::store::{Changeset, LedgerStore, MovementFilter};

/// Read side of the movement ledger, plus stand-alone recording.
///
/// Stock corrections and transfer confirmations append their entries inside
/// their own changesets; `record` is for changes made outside those flows
/// (e.g. importing counts from another system) and is not retried: calling it
/// twice writes two entries.
#[derive(Debug)]
pub struct MovementLedger<S, B> {
    ctx: Arc<Context<S, B>>,
}

impl_service_clone!(MovementLedger);

impl<S, B> MovementLedger<S, B>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub(crate) fn new(ctx: Arc<Context<S, B>>) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self), fields(stock_record = %stock_record_id), err)]
    pub fn record(
        &self,
        stock_record_id: StockRecordId,
        transfer_id: Option<TransferId>,
        delta: i64,
        quantity_before: i64,
        quantity_after: i64,
        recorded_at: DateTime<Utc>,
    ) -> ServiceResult<MovementId> {
        if self.ctx.store.stock_record_by_id(stock_record_id)?.is_none() {
            return Err(DomainError::not_found("stock record", stock_record_id).into());
        }
        if let Some(transfer_id) = transfer_id {
            if self.ctx.store.transfer(transfer_id)?.is_none() {
                return Err(DomainError::not_found("transfer", transfer_id).into());
            }
        }

        let entry = MovementEntry::record(
            stock_record_id,
            transfer_id,
            delta,
            quantity_before,
            quantity_after,
            recorded_at,
        )?;
        let id = entry.id_typed();

        let mut changes = Changeset::new();
        changes.append_movement(entry.clone());
        let receipt = self.ctx.store.commit(changes)?;

        info!(movement = %id, delta, "movement recorded");
        self.ctx.publisher.movements(&receipt, std::slice::from_ref(&entry));
        Ok(id)
    }

    /// Every entry of one stock record, oldest first.
    pub fn history(&self, stock_record_id: StockRecordId) -> ServiceResult<Vec<MovementEntry>> {
        Ok(self
            .ctx
            .store
            .movements(MovementFilter::StockRecord(stock_record_id))?)
    }

    /// Entries written by one transfer confirmation, in leg order.
    pub fn for_transfer(&self, transfer_id: TransferId) -> ServiceResult<Vec<MovementEntry>> {
        Ok(self.ctx.store.movements(MovementFilter::Transfer(transfer_id))?)
    }

    pub fn all(&self) -> ServiceResult<Vec<MovementEntry>> {
        Ok(self.ctx.store.movements(MovementFilter::All)?)
    }
}
