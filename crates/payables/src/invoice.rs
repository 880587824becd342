use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetstock_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, ItemId, SupplierId, ValueObject,
};
use fleetstock_events::Event;

use crate::payment::PaymentId;

/// Supplier invoice identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Zero-padding widths of the printed invoice number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberFormat {
    pub branch_width: usize,
    pub sequence_width: usize,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            branch_width: 4,
            sequence_width: 8,
        }
    }
}

/// Invoice identifier as printed on the document: branch + sequence, both
/// fixed-width and zero-padded (`0001-00000042`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvoiceNumber {
    branch: u32,
    sequence: u64,
    formatted: String,
}

impl ValueObject for InvoiceNumber {}

impl InvoiceNumber {
    pub fn new(branch: u32, sequence: u64, format: NumberFormat) -> Result<Self, DomainError> {
        if sequence == 0 {
            return Err(DomainError::validation("invoice sequence starts at 1"));
        }
        let formatted = format!(
            "{:0bw$}-{:0sw$}",
            branch,
            sequence,
            bw = format.branch_width,
            sw = format.sequence_width
        );
        let fits = branch.to_string().len() <= format.branch_width
            && sequence.to_string().len() <= format.sequence_width;
        if !fits {
            return Err(DomainError::validation(format!(
                "invoice number {formatted} exceeds its fixed width"
            )));
        }
        Ok(Self {
            branch,
            sequence,
            formatted,
        })
    }

    pub fn branch(&self) -> u32 {
        self.branch
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn as_str(&self) -> &str {
        &self.formatted
    }
}

impl core::fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.formatted)
    }
}

/// Invoice status, always derived from total and balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    PartiallyPaid,
    Paid,
}

impl InvoiceStatus {
    /// `0` → paid, `total` → pending (nothing applied yet), otherwise partially paid.
    pub fn derive(total: i64, balance: i64) -> Self {
        if balance == 0 {
            InvoiceStatus::Paid
        } else if balance == total {
            InvoiceStatus::Pending
        } else {
            InvoiceStatus::PartiallyPaid
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Paid => "paid",
        }
    }
}

impl core::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line as submitted for issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLineRequest {
    pub item_id: ItemId,
    pub quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: i64,
}

/// Stored invoice line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub line_no: u32,
    pub item_id: ItemId,
    pub quantity: i64,
    pub unit_price: i64,
    pub subtotal: i64,
}

/// Aggregate root: SupplierInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierInvoice {
    id: InvoiceId,
    supplier_id: Option<SupplierId>,
    number: Option<InvoiceNumber>,
    lines: Vec<InvoiceLine>,
    total: i64,
    balance: i64,
    status: InvoiceStatus,
    issued_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl SupplierInvoice {
    /// Create an empty, not-yet-issued aggregate instance.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            supplier_id: None,
            number: None,
            lines: Vec::new(),
            total: 0,
            balance: 0,
            status: InvoiceStatus::Pending,
            issued_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn number(&self) -> Option<&InvoiceNumber> {
        self.number.as_ref()
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    pub fn total(&self) -> i64 {
        self.total
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn amount_paid(&self) -> i64 {
        self.total - self.balance
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    pub fn is_outstanding(&self) -> bool {
        self.created && self.balance > 0
    }
}

impl AggregateRoot for SupplierInvoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: IssueInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueInvoice {
    pub invoice_id: InvoiceId,
    pub supplier_id: SupplierId,
    pub number: InvoiceNumber,
    pub lines: Vec<InvoiceLineRequest>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AllocatePayment (one allocation of one payment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatePayment {
    pub invoice_id: InvoiceId,
    pub payment_id: PaymentId,
    pub supplier_id: SupplierId,
    /// Amount in smallest currency unit.
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    IssueInvoice(IssueInvoice),
    AllocatePayment(AllocatePayment),
}

/// Event: InvoiceIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceIssued {
    pub invoice_id: InvoiceId,
    pub supplier_id: SupplierId,
    pub number: InvoiceNumber,
    pub lines: Vec<InvoiceLine>,
    pub total: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentAllocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAllocated {
    pub invoice_id: InvoiceId,
    pub payment_id: PaymentId,
    pub amount: i64,
    pub new_balance: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceIssued(InvoiceIssued),
    PaymentAllocated(PaymentAllocated),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceIssued(_) => "payables.invoice.issued",
            InvoiceEvent::PaymentAllocated(_) => "payables.invoice.payment_allocated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceIssued(e) => e.occurred_at,
            InvoiceEvent::PaymentAllocated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SupplierInvoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceIssued(e) => {
                self.id = e.invoice_id;
                self.supplier_id = Some(e.supplier_id);
                self.number = Some(e.number.clone());
                self.lines = e.lines.clone();
                self.total = e.total;
                self.balance = e.total;
                self.issued_at = Some(e.occurred_at);
                self.created = true;
            }
            InvoiceEvent::PaymentAllocated(e) => {
                self.balance = e.new_balance;
            }
        }
        self.status = InvoiceStatus::derive(self.total, self.balance);

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::IssueInvoice(cmd) => self.handle_issue(cmd),
            InvoiceCommand::AllocatePayment(cmd) => self.handle_allocate(cmd),
        }
    }
}

impl SupplierInvoice {
    fn ensure_invoice_id(&self, invoice_id: InvoiceId) -> Result<(), DomainError> {
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn handle_issue(&self, cmd: &IssueInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        self.ensure_invoice_id(cmd.invoice_id)?;

        if cmd.lines.is_empty() {
            return Err(DomainError::validation("cannot issue invoice without lines"));
        }

        let mut total: i64 = 0;
        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (idx, line) in cmd.lines.iter().enumerate() {
            if line.quantity <= 0 {
                return Err(DomainError::validation(
                    "invoice line quantity must be positive",
                ));
            }
            if line.unit_price <= 0 {
                return Err(DomainError::validation(
                    "invoice line unit_price must be positive",
                ));
            }
            let subtotal = line
                .quantity
                .checked_mul(line.unit_price)
                .ok_or_else(|| DomainError::invariant("invoice line amount overflow"))?;
            total = total
                .checked_add(subtotal)
                .ok_or_else(|| DomainError::invariant("invoice total overflow"))?;
            let line_no = u32::try_from(idx + 1)
                .map_err(|_| DomainError::validation("too many invoice lines"))?;
            lines.push(InvoiceLine {
                line_no,
                item_id: line.item_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                subtotal,
            });
        }

        Ok(vec![InvoiceEvent::InvoiceIssued(InvoiceIssued {
            invoice_id: cmd.invoice_id,
            supplier_id: cmd.supplier_id,
            number: cmd.number.clone(),
            lines,
            total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_allocate(&self, cmd: &AllocatePayment) -> Result<Vec<InvoiceEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found("invoice", cmd.invoice_id));
        }
        self.ensure_invoice_id(cmd.invoice_id)?;

        if self.supplier_id != Some(cmd.supplier_id) {
            return Err(DomainError::invalid_payment(format!(
                "invoice {} belongs to a different supplier",
                cmd.invoice_id
            )));
        }
        if cmd.amount <= 0 {
            return Err(DomainError::invalid_payment(
                "allocation amount must be positive",
            ));
        }
        if cmd.amount > self.balance {
            return Err(DomainError::OverAllocation {
                invoice: cmd.invoice_id.to_string(),
                balance: self.balance,
                requested: cmd.amount,
            });
        }

        Ok(vec![InvoiceEvent::PaymentAllocated(PaymentAllocated {
            invoice_id: cmd.invoice_id,
            payment_id: cmd.payment_id,
            amount: cmd.amount,
            new_balance: self.balance - cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetstock_events::execute;
    use proptest::prelude::*;

    fn test_invoice_id() -> InvoiceId {
        InvoiceId::new(AggregateId::new())
    }

    fn test_payment_id() -> PaymentId {
        PaymentId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_number(sequence: u64) -> InvoiceNumber {
        InvoiceNumber::new(1, sequence, NumberFormat::default()).unwrap()
    }

    fn issued(supplier_id: SupplierId, quantity: i64, unit_price: i64) -> SupplierInvoice {
        let invoice_id = test_invoice_id();
        let mut invoice = SupplierInvoice::empty(invoice_id);
        let cmd = IssueInvoice {
            invoice_id,
            supplier_id,
            number: test_number(1),
            lines: vec![InvoiceLineRequest {
                item_id: ItemId::new(),
                quantity,
                unit_price,
            }],
            occurred_at: test_time(),
        };
        execute(&mut invoice, &InvoiceCommand::IssueInvoice(cmd)).unwrap();
        invoice
    }

    fn allocate(
        invoice: &mut SupplierInvoice,
        supplier_id: SupplierId,
        amount: i64,
    ) -> Result<Vec<InvoiceEvent>, DomainError> {
        let cmd = AllocatePayment {
            invoice_id: invoice.id_typed(),
            payment_id: test_payment_id(),
            supplier_id,
            amount,
            occurred_at: test_time(),
        };
        execute(invoice, &InvoiceCommand::AllocatePayment(cmd))
    }

    #[test]
    fn invoice_number_is_zero_padded() {
        let number = InvoiceNumber::new(3, 42, NumberFormat::default()).unwrap();
        assert_eq!(number.to_string(), "0003-00000042");
    }

    #[test]
    fn invoice_number_must_fit_its_width() {
        let format = NumberFormat {
            branch_width: 2,
            sequence_width: 3,
        };
        assert!(InvoiceNumber::new(1, 999, format).is_ok());
        assert!(InvoiceNumber::new(1, 1000, format).is_err());
        assert!(InvoiceNumber::new(100, 1, format).is_err());
    }

    #[test]
    fn issue_computes_subtotals_and_total() {
        let invoice_id = test_invoice_id();
        let invoice = SupplierInvoice::empty(invoice_id);
        let cmd = IssueInvoice {
            invoice_id,
            supplier_id: SupplierId::new(),
            number: test_number(7),
            lines: vec![
                InvoiceLineRequest {
                    item_id: ItemId::new(),
                    quantity: 2,
                    unit_price: 150,
                },
                InvoiceLineRequest {
                    item_id: ItemId::new(),
                    quantity: 7,
                    unit_price: 100,
                },
            ],
            occurred_at: test_time(),
        };

        let events = invoice
            .handle(&InvoiceCommand::IssueInvoice(cmd))
            .unwrap();
        match &events[0] {
            InvoiceEvent::InvoiceIssued(e) => {
                assert_eq!(e.lines[0].subtotal, 300);
                assert_eq!(e.lines[1].subtotal, 700);
                assert_eq!(e.total, 1000);
            }
            _ => panic!("Expected InvoiceIssued event"),
        }
    }

    #[test]
    fn issued_invoice_starts_pending_with_full_balance() {
        let invoice = issued(SupplierId::new(), 10, 100);
        assert_eq!(invoice.total(), 1000);
        assert_eq!(invoice.balance(), 1000);
        assert_eq!(invoice.status(), InvoiceStatus::Pending);
    }

    #[test]
    fn partial_then_full_payment() {
        let supplier_id = SupplierId::new();
        let mut invoice = issued(supplier_id, 10, 100);

        allocate(&mut invoice, supplier_id, 400).unwrap();
        assert_eq!(invoice.balance(), 600);
        assert_eq!(invoice.status(), InvoiceStatus::PartiallyPaid);

        allocate(&mut invoice, supplier_id, 600).unwrap();
        assert_eq!(invoice.balance(), 0);
        assert_eq!(invoice.status(), InvoiceStatus::Paid);
    }

    #[test]
    fn allocation_above_balance_is_over_allocation() {
        let supplier_id = SupplierId::new();
        let mut invoice = issued(supplier_id, 5, 100);

        let err = allocate(&mut invoice, supplier_id, 700).unwrap_err();
        match err {
            DomainError::OverAllocation {
                balance, requested, ..
            } => {
                assert_eq!(balance, 500);
                assert_eq!(requested, 700);
            }
            other => panic!("expected OverAllocation, got {other:?}"),
        }
        assert_eq!(invoice.balance(), 500);
        assert_eq!(invoice.version(), 1);
    }

    #[test]
    fn other_suppliers_cannot_pay_the_invoice() {
        let mut invoice = issued(SupplierId::new(), 1, 100);
        assert!(matches!(
            allocate(&mut invoice, SupplierId::new(), 50),
            Err(DomainError::InvalidPayment(_))
        ));
    }

    #[test]
    fn non_positive_allocation_is_invalid() {
        let supplier_id = SupplierId::new();
        let mut invoice = issued(supplier_id, 1, 100);
        assert!(matches!(
            allocate(&mut invoice, supplier_id, 0),
            Err(DomainError::InvalidPayment(_))
        ));
    }

    #[test]
    fn status_derivation_rule() {
        assert_eq!(InvoiceStatus::derive(1000, 1000), InvoiceStatus::Pending);
        assert_eq!(InvoiceStatus::derive(1000, 1), InvoiceStatus::PartiallyPaid);
        assert_eq!(InvoiceStatus::derive(1000, 0), InvoiceStatus::Paid);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: under any sequence of attempted allocations the balance
        /// stays within [0, total], decreases by exactly the accepted amounts,
        /// and the status always matches the derivation rule.
        #[test]
        fn balance_stays_within_total(
            quantity in 1i64..100,
            unit_price in 1i64..10_000,
            amounts in prop::collection::vec(-100i64..50_000, 1..20)
        ) {
            let supplier_id = SupplierId::new();
            let mut invoice = issued(supplier_id, quantity, unit_price);
            let total = invoice.total();
            let mut paid = 0i64;

            for amount in amounts {
                if allocate(&mut invoice, supplier_id, amount).is_ok() {
                    paid += amount;
                }
                prop_assert!(invoice.balance() >= 0);
                prop_assert!(invoice.balance() <= total);
                prop_assert_eq!(invoice.balance(), total - paid);
                prop_assert_eq!(invoice.status(), InvoiceStatus::derive(total, invoice.balance()));
            }
        }
    }
}
