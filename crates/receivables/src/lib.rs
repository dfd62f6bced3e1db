//! `daftar-receivables` — matching customer money to customer invoices.
//!
//! An allocation ties part of a posted receipt to a posted invoice. The sum
//! allocated from a receipt never exceeds the receipt amount, and the sum
//! allocated to an invoice never exceeds the invoice total.

pub mod allocation;

pub use allocation::{
    Allocation, AllocationId, invoice_outstanding, receipt_remainder, validate_allocation,
};
