//! Applying a payment's allocations to staged invoices.

use std::collections::BTreeMap;

use fleetstock_core::{DomainError, DomainResult};
use fleetstock_events::execute;

use crate::invoice::{AllocatePayment, InvoiceCommand, InvoiceEvent, InvoiceId, SupplierInvoice};
use crate::payment::Payment;

/// Apply every allocation of `payment` to the staged `invoices`, in order.
///
/// `invoices` holds the stored snapshots of the targeted invoices (missing ones
/// are `NotFound`). Allocations targeting the same invoice twice are checked
/// against the balance left by the earlier ones. The first failing allocation
/// aborts the whole payment; the caller must then discard the staged copies.
pub fn allocate_payment(
    payment: &Payment,
    invoices: &mut BTreeMap<InvoiceId, SupplierInvoice>,
) -> DomainResult<Vec<InvoiceEvent>> {
    let mut events = Vec::with_capacity(payment.allocations().len());

    for allocation in payment.allocations() {
        let invoice = invoices
            .get_mut(&allocation.invoice_id)
            .ok_or_else(|| DomainError::not_found("invoice", allocation.invoice_id))?;

        let cmd = AllocatePayment {
            invoice_id: allocation.invoice_id,
            payment_id: payment.id_typed(),
            supplier_id: payment.supplier_id(),
            amount: allocation.amount,
            occurred_at: payment.paid_at(),
        };
        events.extend(execute(invoice, &InvoiceCommand::AllocatePayment(cmd))?);
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fleetstock_core::{AggregateId, ItemId, SupplierId};

    use crate::invoice::{InvoiceLineRequest, InvoiceNumber, IssueInvoice, NumberFormat};
    use crate::payment::{NewPayment, PaymentAllocation, PaymentId, PaymentMethod};

    fn issued(supplier_id: SupplierId, total: i64) -> SupplierInvoice {
        let invoice_id = InvoiceId::new(AggregateId::new());
        let mut invoice = SupplierInvoice::empty(invoice_id);
        let cmd = IssueInvoice {
            invoice_id,
            supplier_id,
            number: InvoiceNumber::new(1, 1, NumberFormat::default()).unwrap(),
            lines: vec![InvoiceLineRequest {
                item_id: ItemId::new(),
                quantity: 1,
                unit_price: total,
            }],
            occurred_at: Utc::now(),
        };
        execute(&mut invoice, &InvoiceCommand::IssueInvoice(cmd)).unwrap();
        invoice
    }

    fn payment(supplier_id: SupplierId, total: i64, allocations: Vec<PaymentAllocation>) -> Payment {
        Payment::new(
            PaymentId::new(AggregateId::new()),
            NewPayment {
                supplier_id,
                method: PaymentMethod::Cash,
                total_amount: total,
                allocations,
                reference: None,
                notes: None,
                paid_at: Utc::now(),
            },
        )
        .unwrap()
    }

    #[test]
    fn splits_one_payment_across_invoices() {
        let supplier_id = SupplierId::new();
        let (a, b) = (issued(supplier_id, 300), issued(supplier_id, 500));
        let (a_id, b_id) = (a.id_typed(), b.id_typed());
        let mut staged = BTreeMap::from([(a_id, a), (b_id, b)]);

        let p = payment(
            supplier_id,
            800,
            vec![
                PaymentAllocation { invoice_id: a_id, amount: 300 },
                PaymentAllocation { invoice_id: b_id, amount: 200 },
            ],
        );
        let events = allocate_payment(&p, &mut staged).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(staged[&a_id].balance(), 0);
        assert_eq!(staged[&b_id].balance(), 300);
    }

    #[test]
    fn repeated_invoice_is_checked_cumulatively() {
        let supplier_id = SupplierId::new();
        let a = issued(supplier_id, 500);
        let a_id = a.id_typed();
        let mut staged = BTreeMap::from([(a_id, a)]);

        let p = payment(
            supplier_id,
            1000,
            vec![
                PaymentAllocation { invoice_id: a_id, amount: 300 },
                PaymentAllocation { invoice_id: a_id, amount: 300 },
            ],
        );
        let err = allocate_payment(&p, &mut staged).unwrap_err();
        assert!(matches!(
            err,
            DomainError::OverAllocation { balance: 200, requested: 300, .. }
        ));
    }

    #[test]
    fn unknown_invoice_is_not_found() {
        let supplier_id = SupplierId::new();
        let missing = InvoiceId::new(AggregateId::new());
        let mut staged = BTreeMap::new();
        let p = payment(
            supplier_id,
            10,
            vec![PaymentAllocation { invoice_id: missing, amount: 10 }],
        );
        assert!(matches!(
            allocate_payment(&p, &mut staged),
            Err(DomainError::NotFound { entity: "invoice", .. })
        ));
    }
}
