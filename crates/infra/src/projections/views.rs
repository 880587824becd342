use chrono::{DateTime, Utc};
use serde::Serialize;

use fleetstock_core::UserId;
use fleetstock_inventory::{TransferId, TransferRequest, TransferStatus};
use fleetstock_payables::{InvoiceId, InvoiceStatus, SupplierInvoice};

use super::directory::Directory;

/// Reference with its display name; unknown names fall back to the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedRef {
    pub id: String,
    pub name: String,
}

impl NamedRef {
    fn new(id: impl ToString, name: Option<String>) -> Self {
        let id = id.to_string();
        let name = name.unwrap_or_else(|| id.clone());
        Self { id, name }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferLineView {
    pub line_no: u32,
    pub item: NamedRef,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferView {
    pub transfer_id: TransferId,
    pub status: TransferStatus,
    pub source: Option<NamedRef>,
    pub destination: Option<NamedRef>,
    pub requested_by: Option<UserId>,
    pub created_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub lines: Vec<TransferLineView>,
}

impl TransferView {
    pub fn build<D: Directory + ?Sized>(transfer: &TransferRequest, directory: &D) -> Self {
        let warehouse = |id| NamedRef::new(id, directory.warehouse_name(id));
        Self {
            transfer_id: transfer.id_typed(),
            status: transfer.status(),
            source: transfer.source().map(warehouse),
            destination: transfer.destination().map(warehouse),
            requested_by: transfer.requested_by(),
            created_at: transfer.created_at(),
            decided_at: transfer.decided_at(),
            rejection_reason: transfer.rejection_reason().map(str::to_string),
            lines: transfer
                .lines()
                .iter()
                .map(|line| TransferLineView {
                    line_no: line.line_no,
                    item: NamedRef::new(line.item_id, directory.item_name(line.item_id)),
                    quantity: line.quantity,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceView {
    pub invoice_id: InvoiceId,
    pub number: Option<String>,
    pub supplier: Option<NamedRef>,
    pub total: i64,
    pub amount_paid: i64,
    pub balance: i64,
    pub status: InvoiceStatus,
    pub issued_at: Option<DateTime<Utc>>,
}

impl InvoiceView {
    pub fn build<D: Directory + ?Sized>(invoice: &SupplierInvoice, directory: &D) -> Self {
        Self {
            invoice_id: invoice.id_typed(),
            number: invoice.number().map(|n| n.as_str().to_string()),
            supplier: invoice
                .supplier_id()
                .map(|id| NamedRef::new(id, directory.supplier_name(id))),
            total: invoice.total(),
            amount_paid: invoice.amount_paid(),
            balance: invoice.balance(),
            status: invoice.status(),
            issued_at: invoice.issued_at(),
        }
    }
}
