//! Transfer request workflow: create, then confirm or reject.
//!
//! Creation reserves nothing. Availability is checked only when a transfer is
//! confirmed, under the locks of every stock record it touches, and the whole
//! confirmation lands in one commit or not at all.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument, warn};

use fleetstock_core::{AggregateId, AggregateRoot, DomainError, ExpectedVersion, UserId, WarehouseId};
use fleetstock_events::{EventBus, EventEnvelope, execute};
use fleetstock_inventory::{
    ConfirmTransfer, CreateTransfer, MovementEntry, RejectTransfer, RequestedLine, StockBook,
    StockKey, TransferCommand, TransferId, TransferRequest, post_transfer,
};

use super::{Context, impl_service_clone};
use crate::error::{ServiceError, ServiceResult};
use crate::locks::LockKey;
use crate::projections::{Directory, TransferView};
use crate::publish::TRANSFER_AGGREGATE;
use crate::store::{Changeset, IdempotencyKey, LedgerStore, MovementFilter, RecordedOutcome, TransferFilter};

#[derive(Debug)]
pub struct TransferWorkflow<S, B> {
    ctx: Arc<Context<S, B>>,
}

impl_service_clone!(TransferWorkflow);

impl<S, B> TransferWorkflow<S, B>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub(crate) fn new(ctx: Arc<Context<S, B>>) -> Self {
        Self { ctx }
    }

    /// Record a pending transfer. Stock is not touched.
    #[instrument(skip(self, lines), fields(source = %source, destination = %destination, lines = lines.len()), err)]
    pub fn create(
        &self,
        source: WarehouseId,
        destination: WarehouseId,
        requested_by: UserId,
        lines: Vec<RequestedLine>,
    ) -> ServiceResult<TransferId> {
        let transfer_id = TransferId::new(AggregateId::new());
        let mut transfer = TransferRequest::empty(transfer_id);

        let cmd = TransferCommand::CreateTransfer(CreateTransfer {
            transfer_id,
            source,
            destination,
            requested_by,
            lines,
            occurred_at: Utc::now(),
        });
        let events = execute(&mut transfer, &cmd).inspect_err(|err| {
            warn!(error = %err, "transfer request refused");
        })?;

        let mut changes = Changeset::new();
        changes.put_transfer(transfer, ExpectedVersion::Exact(0));
        self.ctx.store.commit(changes)?;

        info!(transfer = %transfer_id, "transfer requested");
        self.ctx
            .publisher
            .aggregate_events(TRANSFER_AGGREGATE, transfer_id.0, 0, &events);
        Ok(transfer_id)
    }

    /// Apply every line of a pending transfer and mark it confirmed.
    ///
    /// Returns the movement entries written, one per leg in line order.
    pub fn confirm(&self, transfer_id: TransferId) -> ServiceResult<Vec<MovementEntry>> {
        self.confirm_inner(transfer_id, None)
    }

    /// [`Self::confirm`] made safe to retry.
    ///
    /// The first successful confirmation under `key` is remembered in the same
    /// commit. Retrying with the same key and transfer returns the entries
    /// already written; using the key for another transfer is a `Conflict`.
    pub fn confirm_with_key(
        &self,
        transfer_id: TransferId,
        key: IdempotencyKey,
    ) -> ServiceResult<Vec<MovementEntry>> {
        self.confirm_inner(transfer_id, Some(key))
    }

    #[instrument(skip(self), fields(transfer = %transfer_id), err)]
    fn confirm_inner(
        &self,
        transfer_id: TransferId,
        key: Option<IdempotencyKey>,
    ) -> ServiceResult<Vec<MovementEntry>> {
        if let Some(replayed) = self.replay(transfer_id, key.as_ref())? {
            return Ok(replayed);
        }

        // Read once, unlocked, only to learn which stock records to lock.
        let snapshot = self.load(transfer_id)?;
        ensure_pending(&snapshot)?;

        let mut lock_keys = vec![LockKey::Transfer(transfer_id)];
        lock_keys.extend(stock_keys(&snapshot).into_iter().map(LockKey::Stock));
        lock_keys.extend(key.clone().map(LockKey::Idempotency));
        let _locks = self.ctx.locks.acquire(lock_keys)?;
        debug!("transfer locks acquired");

        // Re-check everything under the locks.
        if let Some(replayed) = self.replay(transfer_id, key.as_ref())? {
            return Ok(replayed);
        }
        let transfer = self.load(transfer_id)?;
        ensure_pending(&transfer)?;

        let now = Utc::now();
        let mut book = StockBook::new();
        for stock_key in stock_keys(&transfer) {
            if let Some(record) = self.ctx.store.stock_record(&stock_key)? {
                book.load(record);
            }
        }

        let movements = post_transfer(&transfer, &mut book, now).inspect_err(|err| {
            warn!(error = %err, "transfer confirmation refused");
        })?;

        let version_before = transfer.version();
        let mut confirmed = transfer;
        let events = execute(
            &mut confirmed,
            &TransferCommand::ConfirmTransfer(ConfirmTransfer {
                transfer_id,
                occurred_at: now,
            }),
        )?;

        let mut changes = Changeset::new();
        for (record, loaded) in book.into_changed() {
            changes.put_stock(record, ExpectedVersion::Exact(loaded));
        }
        for entry in &movements {
            changes.append_movement(entry.clone());
        }
        changes.put_transfer(confirmed, ExpectedVersion::Exact(version_before));
        if let Some(key) = key {
            changes.remember(key, RecordedOutcome::TransferConfirmed(transfer_id));
        }
        let receipt = self.ctx.store.commit(changes).inspect_err(|err| {
            warn!(error = %err, "transfer confirmation not committed; transfer stays pending");
        })?;

        info!(legs = movements.len(), "transfer confirmed");
        self.ctx
            .publisher
            .aggregate_events(TRANSFER_AGGREGATE, transfer_id.0, version_before, &events);
        self.ctx.publisher.movements(&receipt, &movements);
        Ok(movements)
    }

    /// Mark a pending transfer rejected. Stock and ledger are untouched.
    #[instrument(skip(self), fields(transfer = %transfer_id), err)]
    pub fn reject(&self, transfer_id: TransferId, reason: Option<String>) -> ServiceResult<()> {
        let _locks = self.ctx.locks.acquire([LockKey::Transfer(transfer_id)])?;

        let transfer = self.load(transfer_id)?;
        let version_before = transfer.version();
        let mut rejected = transfer;
        let events = execute(
            &mut rejected,
            &TransferCommand::RejectTransfer(RejectTransfer {
                transfer_id,
                reason,
                occurred_at: Utc::now(),
            }),
        )
        .inspect_err(|err| warn!(error = %err, "transfer rejection refused"))?;

        let mut changes = Changeset::new();
        changes.put_transfer(rejected, ExpectedVersion::Exact(version_before));
        self.ctx.store.commit(changes)?;

        info!("transfer rejected");
        self.ctx
            .publisher
            .aggregate_events(TRANSFER_AGGREGATE, transfer_id.0, version_before, &events);
        Ok(())
    }

    pub fn get(&self, transfer_id: TransferId) -> ServiceResult<TransferRequest> {
        self.load(transfer_id)
    }

    /// Pending transfers with their lines, oldest first.
    pub fn list_pending(&self) -> ServiceResult<Vec<TransferRequest>> {
        Ok(self.ctx.store.transfers(TransferFilter::Pending)?)
    }

    /// Every transfer with its lines, oldest first.
    pub fn list_all(&self) -> ServiceResult<Vec<TransferRequest>> {
        Ok(self.ctx.store.transfers(TransferFilter::All)?)
    }

    /// Transfers joined with display names for presentation.
    pub fn list_views<D>(&self, pending_only: bool, directory: &D) -> ServiceResult<Vec<TransferView>>
    where
        D: Directory + ?Sized,
    {
        let transfers = if pending_only {
            self.list_pending()?
        } else {
            self.list_all()?
        };
        Ok(transfers
            .iter()
            .map(|t| TransferView::build(t, directory))
            .collect())
    }

    fn load(&self, transfer_id: TransferId) -> ServiceResult<TransferRequest> {
        self.ctx
            .store
            .transfer(transfer_id)?
            .ok_or_else(|| DomainError::not_found("transfer", transfer_id).into())
    }

    fn replay(
        &self,
        transfer_id: TransferId,
        key: Option<&IdempotencyKey>,
    ) -> ServiceResult<Option<Vec<MovementEntry>>> {
        let Some(key) = key else {
            return Ok(None);
        };
        match self.ctx.store.recorded_outcome(key)? {
            None => Ok(None),
            Some(RecordedOutcome::TransferConfirmed(done)) if done == transfer_id => {
                info!(key = %key, "transfer confirmation replayed");
                Ok(Some(
                    self.ctx.store.movements(MovementFilter::Transfer(transfer_id))?,
                ))
            }
            Some(other) => Err(ServiceError::Domain(DomainError::conflict(format!(
                "idempotency key '{key}' already used for {other:?}"
            )))),
        }
    }
}

fn ensure_pending(transfer: &TransferRequest) -> ServiceResult<()> {
    if transfer.is_pending() {
        Ok(())
    } else {
        Err(DomainError::InvalidTransferState {
            transfer: transfer.id_typed().to_string(),
            actual: transfer.status().to_string(),
        }
        .into())
    }
}

/// Source and destination records of every line, in lock order.
fn stock_keys(transfer: &TransferRequest) -> BTreeSet<StockKey> {
    let Some((source, destination)) = transfer.route() else {
        return BTreeSet::new();
    };
    transfer
        .lines()
        .iter()
        .flat_map(|line| {
            [
                StockKey::new(line.item_id, source),
                StockKey::new(line.item_id, destination),
            ]
        })
        .collect()
}
