//! Post-commit publication of domain events.
//!
//! Ordering invariant: **publish happens only after commit succeeds**. A
//! publication failure cannot undo the commit, so it is logged and swallowed;
//! subscribers that care about completeness can reconcile from storage.

use serde::Serialize;
use serde_json::Value as JsonValue;

use fleetstock_core::AggregateId;
use fleetstock_events::{Event, EventBus, EventEnvelope};
use fleetstock_inventory::MovementEntry;

use crate::store::CommitReceipt;

pub const TRANSFER_AGGREGATE: &str = "inventory.transfer";
pub const STOCK_AGGREGATE: &str = "inventory.stock_record";
pub const INVOICE_AGGREGATE: &str = "payables.invoice";
pub const PAYMENT_AGGREGATE: &str = "payables.payment";

/// Thin wrapper over an [`EventBus`] of JSON envelopes.
#[derive(Debug, Clone)]
pub struct Publisher<B> {
    bus: B,
}

impl<B> Publisher<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    /// Publish the events an aggregate emitted in one commit.
    ///
    /// `version_before` is the aggregate version the events were applied on;
    /// event `i` gets sequence number `version_before + 1 + i`.
    pub fn aggregate_events<E>(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
        version_before: u64,
        events: &[E],
    ) where
        E: Event + Serialize,
    {
        for (offset, event) in events.iter().enumerate() {
            self.one(aggregate_type, aggregate_id, version_before + 1 + offset as u64, event);
        }
    }

    /// Publish movement entries under their ledger positions.
    pub fn movements(&self, receipt: &CommitReceipt, entries: &[MovementEntry]) {
        for (index, entry) in entries.iter().enumerate() {
            self.one(
                STOCK_AGGREGATE,
                entry.stock_record_id().0,
                receipt.movement_position(index),
                entry,
            );
        }
    }

    pub fn one<E>(&self, aggregate_type: &str, aggregate_id: AggregateId, sequence: u64, event: &E)
    where
        E: Event + Serialize,
    {
        let envelope = match EventEnvelope::from_typed(aggregate_id, aggregate_type, sequence, event) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(
                    event_type = event.event_type(),
                    aggregate_id = %aggregate_id,
                    error = %err,
                    "event serialization failed; not published"
                );
                return;
            }
        };

        if let Err(err) = self.bus.publish(envelope) {
            tracing::warn!(
                event_type = event.event_type(),
                aggregate_id = %aggregate_id,
                error = ?err,
                "event publication failed after commit"
            );
        }
    }
}
