use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetstock_core::{AggregateId, DomainError, DomainResult, Entity, SupplierId, ValueObject};
use fleetstock_events::Event;

use crate::invoice::InvoiceId;

/// Payment identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub AggregateId);

impl PaymentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PaymentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Cheque,
    Card,
}

/// Portion of a payment applied to one invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAllocation {
    pub invoice_id: InvoiceId,
    /// Amount in smallest currency unit.
    pub amount: i64,
}

impl ValueObject for PaymentAllocation {}

/// Input for recording a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayment {
    pub supplier_id: SupplierId,
    pub method: PaymentMethod,
    pub total_amount: i64,
    pub allocations: Vec<PaymentAllocation>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub paid_at: DateTime<Utc>,
}

/// A recorded payment with its allocations. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    supplier_id: SupplierId,
    method: PaymentMethod,
    total_amount: i64,
    allocations: Vec<PaymentAllocation>,
    reference: Option<String>,
    notes: Option<String>,
    paid_at: DateTime<Utc>,
}

impl Payment {
    /// Validate the shape of a payment.
    ///
    /// Balances are not checked here; see [`crate::allocate_payment`].
    pub fn new(id: PaymentId, draft: NewPayment) -> DomainResult<Self> {
        if draft.total_amount <= 0 {
            return Err(DomainError::invalid_payment(format!(
                "total amount must be positive, got {}",
                draft.total_amount
            )));
        }
        if draft.allocations.is_empty() {
            return Err(DomainError::invalid_payment(
                "payment must be allocated to at least one invoice",
            ));
        }

        let mut allocated: i64 = 0;
        for allocation in &draft.allocations {
            if allocation.amount <= 0 {
                return Err(DomainError::invalid_payment(format!(
                    "allocation to invoice {} must be positive, got {}",
                    allocation.invoice_id, allocation.amount
                )));
            }
            allocated = allocated
                .checked_add(allocation.amount)
                .ok_or_else(|| DomainError::invalid_payment("allocation total overflow"))?;
        }
        if allocated > draft.total_amount {
            return Err(DomainError::invalid_payment(format!(
                "allocations total {allocated} exceeds payment amount {}",
                draft.total_amount
            )));
        }

        Ok(Self {
            id,
            supplier_id: draft.supplier_id,
            method: draft.method,
            total_amount: draft.total_amount,
            allocations: draft.allocations,
            reference: draft.reference,
            notes: draft.notes,
            paid_at: draft.paid_at,
        })
    }

    pub fn id_typed(&self) -> PaymentId {
        self.id
    }

    pub fn supplier_id(&self) -> SupplierId {
        self.supplier_id
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    pub fn total_amount(&self) -> i64 {
        self.total_amount
    }

    pub fn allocations(&self) -> &[PaymentAllocation] {
        &self.allocations
    }

    pub fn allocated_amount(&self) -> i64 {
        self.allocations.iter().map(|a| a.amount).sum()
    }

    /// Part of the payment not applied to any invoice.
    pub fn unallocated_amount(&self) -> i64 {
        self.total_amount - self.allocated_amount()
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn paid_at(&self) -> DateTime<Utc> {
        self.paid_at
    }
}

impl Entity for Payment {
    type Id = PaymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Event: PaymentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub payment_id: PaymentId,
    pub supplier_id: SupplierId,
    pub method: PaymentMethod,
    pub total_amount: i64,
    pub allocations: Vec<PaymentAllocation>,
    pub occurred_at: DateTime<Utc>,
}

impl From<&Payment> for PaymentRecorded {
    fn from(payment: &Payment) -> Self {
        Self {
            payment_id: payment.id,
            supplier_id: payment.supplier_id,
            method: payment.method,
            total_amount: payment.total_amount,
            allocations: payment.allocations.clone(),
            occurred_at: payment.paid_at,
        }
    }
}

impl Event for PaymentRecorded {
    fn event_type(&self) -> &'static str {
        "payables.payment.recorded"
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_payment_id() -> PaymentId {
        PaymentId::new(AggregateId::new())
    }

    fn test_invoice_id() -> InvoiceId {
        InvoiceId::new(AggregateId::new())
    }

    fn draft(total_amount: i64, amounts: &[i64]) -> NewPayment {
        NewPayment {
            supplier_id: SupplierId::new(),
            method: PaymentMethod::BankTransfer,
            total_amount,
            allocations: amounts
                .iter()
                .map(|&amount| PaymentAllocation {
                    invoice_id: test_invoice_id(),
                    amount,
                })
                .collect(),
            reference: Some("TRX-1".to_string()),
            notes: None,
            paid_at: Utc::now(),
        }
    }

    #[test]
    fn valid_payment_keeps_its_remainder() {
        let payment = Payment::new(test_payment_id(), draft(1000, &[400, 300])).unwrap();
        assert_eq!(payment.allocated_amount(), 700);
        assert_eq!(payment.unallocated_amount(), 300);
        assert_eq!(payment.reference(), Some("TRX-1"));
    }

    #[test]
    fn non_positive_total_is_invalid() {
        assert!(matches!(
            Payment::new(test_payment_id(), draft(0, &[])),
            Err(DomainError::InvalidPayment(_))
        ));
        assert!(matches!(
            Payment::new(test_payment_id(), draft(-10, &[5])),
            Err(DomainError::InvalidPayment(_))
        ));
    }

    #[test]
    fn non_positive_allocation_is_invalid() {
        assert!(matches!(
            Payment::new(test_payment_id(), draft(100, &[50, 0])),
            Err(DomainError::InvalidPayment(_))
        ));
    }

    #[test]
    fn allocations_above_total_are_invalid() {
        let err = Payment::new(test_payment_id(), draft(500, &[300, 300])).unwrap_err();
        match err {
            DomainError::InvalidPayment(msg) if msg.contains("exceeds payment amount") => {}
            other => panic!("expected InvalidPayment, got {other:?}"),
        }
    }

    #[test]
    fn payment_without_allocations_is_invalid() {
        assert!(matches!(
            Payment::new(test_payment_id(), draft(100, &[])),
            Err(DomainError::InvalidPayment(_))
        ));
    }
}
