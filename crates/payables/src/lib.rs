//! Accounts-payable domain module.
//!
//! Supplier invoices with a running balance, and payments split across one or
//! more of them. Pure domain logic (no IO, no HTTP, no storage).

pub mod allocation;
pub mod invoice;
pub mod payment;

pub use allocation::allocate_payment;
pub use invoice::{
    AllocatePayment, InvoiceCommand, InvoiceEvent, InvoiceId, InvoiceIssued, InvoiceLine,
    InvoiceLineRequest, InvoiceNumber, InvoiceStatus, IssueInvoice, NumberFormat,
    PaymentAllocated, SupplierInvoice,
};
pub use payment::{
    NewPayment, Payment, PaymentAllocation, PaymentId, PaymentMethod, PaymentRecorded,
};
