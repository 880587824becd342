//! Supplier invoices and payment application.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, instrument, warn};

use fleetstock_core::{AggregateId, AggregateRoot, DomainError, ExpectedVersion, SupplierId};
use fleetstock_events::{EventBus, EventEnvelope, execute};
use fleetstock_payables::{
    InvoiceCommand, InvoiceEvent, InvoiceId, InvoiceLineRequest, InvoiceNumber, IssueInvoice,
    NewPayment, Payment, PaymentAllocation, PaymentId, PaymentMethod, PaymentRecorded,
    SupplierInvoice, allocate_payment,
};

use super::{Context, impl_service_clone};
use crate::error::ServiceResult;
use crate::locks::LockKey;
use crate::projections::{Directory, InvoiceView};
use crate::publish::{INVOICE_AGGREGATE, PAYMENT_AGGREGATE};
use crate::store::{Changeset, IdempotencyKey, LedgerStore, RecordedOutcome, SequenceClaim};

/// Request to record a payment and apply it to invoices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyPayment {
    pub supplier_id: SupplierId,
    pub method: PaymentMethod,
    pub total_amount: i64,
    pub allocations: Vec<PaymentAllocation>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    /// Makes the request safe to retry; see [`PayablesService::apply_payment`].
    pub idempotency_key: Option<IdempotencyKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedInvoice {
    pub invoice_id: InvoiceId,
    pub number: InvoiceNumber,
    pub total: i64,
}

#[derive(Debug)]
pub struct PayablesService<S, B> {
    ctx: Arc<Context<S, B>>,
}

impl_service_clone!(PayablesService);

impl<S, B> PayablesService<S, B>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub(crate) fn new(ctx: Arc<Context<S, B>>) -> Self {
        Self { ctx }
    }

    /// Issue an invoice under the next number of the configured branch.
    #[instrument(skip(self, lines), fields(supplier = %supplier_id, lines = lines.len()), err)]
    pub fn issue_invoice(
        &self,
        supplier_id: SupplierId,
        lines: Vec<InvoiceLineRequest>,
    ) -> ServiceResult<IssuedInvoice> {
        let branch = self.ctx.settings.invoice_branch;
        let _locks = self.ctx.locks.acquire([LockKey::InvoiceBranch(branch)])?;

        let sequence = self.ctx.store.next_invoice_sequence(branch)?;
        let number = InvoiceNumber::new(branch, sequence, self.ctx.settings.number_format)?;

        let invoice_id = InvoiceId::new(AggregateId::new());
        let mut invoice = SupplierInvoice::empty(invoice_id);
        let events = execute(
            &mut invoice,
            &InvoiceCommand::IssueInvoice(IssueInvoice {
                invoice_id,
                supplier_id,
                number: number.clone(),
                lines,
                occurred_at: Utc::now(),
            }),
        )
        .inspect_err(|err| warn!(error = %err, "invoice refused"))?;
        let total = invoice.total();

        let mut changes = Changeset::new();
        changes
            .put_invoice(invoice, ExpectedVersion::Exact(0))
            .claim_sequence(SequenceClaim { branch, sequence });
        self.ctx.store.commit(changes)?;

        info!(invoice = %invoice_id, number = %number, total, "invoice issued");
        self.ctx
            .publisher
            .aggregate_events(INVOICE_AGGREGATE, invoice_id.0, 0, &events);
        Ok(IssuedInvoice {
            invoice_id,
            number,
            total,
        })
    }

    /// Record a payment and decrement every allocated invoice, atomically.
    ///
    /// With an idempotency key, a retry of the same request returns the
    /// payment recorded the first time; reusing the key for a different
    /// request is a `Conflict`.
    #[instrument(
        skip(self, request),
        fields(supplier = %request.supplier_id, amount = request.total_amount),
        err
    )]
    pub fn apply_payment(&self, request: ApplyPayment) -> ServiceResult<PaymentId> {
        let key = request.idempotency_key.clone();
        let payment = Payment::new(
            PaymentId::new(AggregateId::new()),
            NewPayment {
                supplier_id: request.supplier_id,
                method: request.method,
                total_amount: request.total_amount,
                allocations: request.allocations,
                reference: request.reference,
                notes: request.notes,
                paid_at: Utc::now(),
            },
        )
        .inspect_err(|err| warn!(error = %err, "payment refused"))?;

        if let Some(replayed) = self.replay(&payment, key.as_ref())? {
            return Ok(replayed);
        }

        let mut lock_keys: Vec<LockKey> = payment
            .allocations()
            .iter()
            .map(|a| LockKey::Invoice(a.invoice_id))
            .collect();
        lock_keys.extend(key.clone().map(LockKey::Idempotency));
        let _locks = self.ctx.locks.acquire(lock_keys)?;

        if let Some(replayed) = self.replay(&payment, key.as_ref())? {
            return Ok(replayed);
        }

        let mut staged: BTreeMap<InvoiceId, SupplierInvoice> = BTreeMap::new();
        for allocation in payment.allocations() {
            if staged.contains_key(&allocation.invoice_id) {
                continue;
            }
            if let Some(invoice) = self.ctx.store.invoice(allocation.invoice_id)? {
                staged.insert(allocation.invoice_id, invoice);
            }
        }
        let versions_before: HashMap<InvoiceId, u64> =
            staged.iter().map(|(id, inv)| (*id, inv.version())).collect();

        let events = allocate_payment(&payment, &mut staged)
            .inspect_err(|err| warn!(error = %err, "payment allocation refused"))?;

        let payment_id = payment.id_typed();
        let recorded = PaymentRecorded::from(&payment);

        let mut changes = Changeset::new();
        changes.insert_payment(payment);
        for (id, invoice) in staged {
            let before = versions_before.get(&id).copied().unwrap_or(0);
            changes.put_invoice(invoice, ExpectedVersion::Exact(before));
        }
        if let Some(key) = key {
            changes.remember(key, RecordedOutcome::PaymentApplied(payment_id));
        }
        self.ctx.store.commit(changes).inspect_err(|err| {
            warn!(error = %err, "payment not committed; no balance changed");
        })?;

        info!(payment = %payment_id, allocations = events.len(), "payment applied");
        self.ctx
            .publisher
            .one(PAYMENT_AGGREGATE, payment_id.0, 1, &recorded);
        let mut sequences = versions_before;
        for event in &events {
            let InvoiceEvent::PaymentAllocated(allocated) = event else {
                continue;
            };
            let sequence = sequences.entry(allocated.invoice_id).or_insert(0);
            *sequence += 1;
            self.ctx
                .publisher
                .one(INVOICE_AGGREGATE, allocated.invoice_id.0, *sequence, event);
        }
        Ok(payment_id)
    }

    pub fn invoice(&self, invoice_id: InvoiceId) -> ServiceResult<SupplierInvoice> {
        self.ctx
            .store
            .invoice(invoice_id)?
            .ok_or_else(|| DomainError::not_found("invoice", invoice_id).into())
    }

    /// A supplier's invoices, in issue order.
    pub fn list_by_supplier(&self, supplier_id: SupplierId) -> ServiceResult<Vec<SupplierInvoice>> {
        Ok(self.ctx.store.invoices_by_supplier(supplier_id)?)
    }

    /// A supplier's invoices with a balance left to pay.
    pub fn outstanding_invoices(&self, supplier_id: SupplierId) -> ServiceResult<Vec<SupplierInvoice>> {
        Ok(self
            .list_by_supplier(supplier_id)?
            .into_iter()
            .filter(SupplierInvoice::is_outstanding)
            .collect())
    }

    pub fn outstanding_views<D>(
        &self,
        supplier_id: SupplierId,
        directory: &D,
    ) -> ServiceResult<Vec<InvoiceView>>
    where
        D: Directory + ?Sized,
    {
        Ok(self
            .outstanding_invoices(supplier_id)?
            .iter()
            .map(|invoice| InvoiceView::build(invoice, directory))
            .collect())
    }

    pub fn payment(&self, payment_id: PaymentId) -> ServiceResult<Payment> {
        self.ctx
            .store
            .payment(payment_id)?
            .ok_or_else(|| DomainError::not_found("payment", payment_id).into())
    }

    pub fn payments_by_supplier(&self, supplier_id: SupplierId) -> ServiceResult<Vec<Payment>> {
        Ok(self.ctx.store.payments_by_supplier(supplier_id)?)
    }

    /// The payment already recorded under `key` for the same request, if any.
    fn replay(&self, request: &Payment, key: Option<&IdempotencyKey>) -> ServiceResult<Option<PaymentId>> {
        let Some(key) = key else {
            return Ok(None);
        };
        let recorded = match self.ctx.store.recorded_outcome(key)? {
            None => return Ok(None),
            Some(RecordedOutcome::PaymentApplied(id)) => self.ctx.store.payment(id)?,
            Some(RecordedOutcome::TransferConfirmed(_)) => None,
        };

        match recorded {
            Some(earlier) if same_request(&earlier, request) => {
                info!(key = %key, payment = %earlier.id_typed(), "payment replayed");
                Ok(Some(earlier.id_typed()))
            }
            _ => Err(DomainError::conflict(format!(
                "idempotency key '{key}' already used for a different request"
            ))
            .into()),
        }
    }
}

fn same_request(earlier: &Payment, request: &Payment) -> bool {
    earlier.supplier_id() == request.supplier_id()
        && earlier.method() == request.method()
        && earlier.total_amount() == request.total_amount()
        && earlier.allocations() == request.allocations()
}
