use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetstock_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, ItemId, UserId, ValueObject, WarehouseId,
};
use fleetstock_events::Event;

/// Transfer request identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(pub AggregateId);

impl TransferId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for TransferId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Transfer status lifecycle: `pending` → `confirmed` | `rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl TransferStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Confirmed => "confirmed",
            TransferStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != TransferStatus::Pending
    }
}

impl core::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Item + quantity as submitted by the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedLine {
    pub item_id: ItemId,
    pub quantity: i64,
}

/// One stored line of a transfer request (numbered in submission order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLine {
    pub line_no: u32,
    pub item_id: ItemId,
    pub quantity: i64,
}

impl ValueObject for TransferLine {}

/// Aggregate root: TransferRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    id: TransferId,
    source: Option<WarehouseId>,
    destination: Option<WarehouseId>,
    requested_by: Option<UserId>,
    status: TransferStatus,
    lines: Vec<TransferLine>,
    created_at: Option<DateTime<Utc>>,
    decided_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    version: u64,
    created: bool,
}

impl TransferRequest {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: TransferId) -> Self {
        Self {
            id,
            source: None,
            destination: None,
            requested_by: None,
            status: TransferStatus::Pending,
            lines: Vec::new(),
            created_at: None,
            decided_at: None,
            rejection_reason: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> TransferId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn source(&self) -> Option<WarehouseId> {
        self.source
    }

    pub fn destination(&self) -> Option<WarehouseId> {
        self.destination
    }

    pub fn requested_by(&self) -> Option<UserId> {
        self.requested_by
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn lines(&self) -> &[TransferLine] {
        &self.lines
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn decided_at(&self) -> Option<DateTime<Utc>> {
        self.decided_at
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn is_pending(&self) -> bool {
        self.created && !self.status.is_terminal()
    }

    /// Source and destination, once created.
    pub fn route(&self) -> Option<(WarehouseId, WarehouseId)> {
        Some((self.source?, self.destination?))
    }
}

impl AggregateRoot for TransferRequest {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransfer {
    pub transfer_id: TransferId,
    pub source: WarehouseId,
    pub destination: WarehouseId,
    pub requested_by: UserId,
    pub lines: Vec<RequestedLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmTransfer {
    pub transfer_id: TransferId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectTransfer {
    pub transfer_id: TransferId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferCommand {
    CreateTransfer(CreateTransfer),
    ConfirmTransfer(ConfirmTransfer),
    RejectTransfer(RejectTransfer),
}

/// Event: TransferRequested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequested {
    pub transfer_id: TransferId,
    pub source: WarehouseId,
    pub destination: WarehouseId,
    pub requested_by: UserId,
    pub lines: Vec<TransferLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferConfirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfirmed {
    pub transfer_id: TransferId,
    pub source: WarehouseId,
    pub destination: WarehouseId,
    pub lines: Vec<TransferLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRejected {
    pub transfer_id: TransferId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferEvent {
    TransferRequested(TransferRequested),
    TransferConfirmed(TransferConfirmed),
    TransferRejected(TransferRejected),
}

impl Event for TransferEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TransferEvent::TransferRequested(_) => "inventory.transfer.requested",
            TransferEvent::TransferConfirmed(_) => "inventory.transfer.confirmed",
            TransferEvent::TransferRejected(_) => "inventory.transfer.rejected",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TransferEvent::TransferRequested(e) => e.occurred_at,
            TransferEvent::TransferConfirmed(e) => e.occurred_at,
            TransferEvent::TransferRejected(e) => e.occurred_at,
        }
    }
}

impl Aggregate for TransferRequest {
    type Command = TransferCommand;
    type Event = TransferEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TransferEvent::TransferRequested(e) => {
                self.id = e.transfer_id;
                self.source = Some(e.source);
                self.destination = Some(e.destination);
                self.requested_by = Some(e.requested_by);
                self.lines = e.lines.clone();
                self.status = TransferStatus::Pending;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            TransferEvent::TransferConfirmed(e) => {
                self.status = TransferStatus::Confirmed;
                self.decided_at = Some(e.occurred_at);
            }
            TransferEvent::TransferRejected(e) => {
                self.status = TransferStatus::Rejected;
                self.decided_at = Some(e.occurred_at);
                self.rejection_reason = e.reason.clone();
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TransferCommand::CreateTransfer(cmd) => self.handle_create(cmd),
            TransferCommand::ConfirmTransfer(cmd) => self.handle_confirm(cmd),
            TransferCommand::RejectTransfer(cmd) => self.handle_reject(cmd),
        }
    }
}

impl TransferRequest {
    fn ensure_transfer_id(&self, transfer_id: TransferId) -> Result<(), DomainError> {
        if self.id != transfer_id {
            return Err(DomainError::invariant("transfer_id mismatch"));
        }
        Ok(())
    }

    fn ensure_pending(&self) -> Result<(WarehouseId, WarehouseId), DomainError> {
        let route = match self.route() {
            Some(route) if self.created => route,
            _ => return Err(DomainError::not_found("transfer", self.id)),
        };
        if self.status.is_terminal() {
            return Err(DomainError::InvalidTransferState {
                transfer: self.id.to_string(),
                actual: self.status.to_string(),
            });
        }
        Ok(route)
    }

    fn handle_create(&self, cmd: &CreateTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("transfer already exists"));
        }
        self.ensure_transfer_id(cmd.transfer_id)?;

        if cmd.source == cmd.destination {
            return Err(DomainError::invalid_transfer(
                "source and destination warehouse must differ",
            ));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::invalid_transfer(
                "transfer must have at least one line",
            ));
        }

        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (idx, line) in cmd.lines.iter().enumerate() {
            if line.quantity <= 0 {
                return Err(DomainError::invalid_transfer(format!(
                    "line {} for item {} has non-positive quantity {}",
                    idx + 1,
                    line.item_id,
                    line.quantity
                )));
            }
            let line_no = u32::try_from(idx + 1)
                .map_err(|_| DomainError::invalid_transfer("too many transfer lines"))?;
            lines.push(TransferLine {
                line_no,
                item_id: line.item_id,
                quantity: line.quantity,
            });
        }

        Ok(vec![TransferEvent::TransferRequested(TransferRequested {
            transfer_id: cmd.transfer_id,
            source: cmd.source,
            destination: cmd.destination,
            requested_by: cmd.requested_by,
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm(&self, cmd: &ConfirmTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        let (source, destination) = self.ensure_pending()?;
        self.ensure_transfer_id(cmd.transfer_id)?;

        Ok(vec![TransferEvent::TransferConfirmed(TransferConfirmed {
            transfer_id: cmd.transfer_id,
            source,
            destination,
            lines: self.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_pending()?;
        self.ensure_transfer_id(cmd.transfer_id)?;

        Ok(vec![TransferEvent::TransferRejected(TransferRejected {
            transfer_id: cmd.transfer_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
