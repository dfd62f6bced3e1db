use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use daftar_core::{DomainError, DomainResult, RecordId, UserId};
use daftar_documents::{DocumentId, DocumentStatus, Receipt, SalesInvoice};

/// Allocation identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationId(pub RecordId);

impl AllocationId {
    pub fn new(id: RecordId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for AllocationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Part of a receipt applied against an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: AllocationId,
    pub receipt_id: DocumentId,
    pub invoice_id: DocumentId,
    pub amount: i64,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl Allocation {
    /// Validate against both documents and their already-allocated sums,
    /// then build the record.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: AllocationId,
        receipt: &Receipt,
        invoice: &SalesInvoice,
        receipt_allocated: i64,
        invoice_allocated: i64,
        amount: i64,
        created_by: UserId,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        validate_allocation(receipt, invoice, receipt_allocated, invoice_allocated, amount)?;
        Ok(Self {
            id,
            receipt_id: receipt.id,
            invoice_id: invoice.id,
            amount,
            created_by,
            created_at,
        })
    }
}

/// Unallocated remainder of a receipt.
pub fn receipt_remainder(receipt: &Receipt, allocated: i64) -> i64 {
    (receipt.amount - allocated).max(0)
}

/// Unsettled remainder of an invoice.
pub fn invoice_outstanding(invoice: &SalesInvoice, allocated: i64) -> i64 {
    (invoice.total - allocated).max(0)
}

/// The allocation rules:
/// both documents posted, same customer, positive amount, and the amount
/// fits inside both the receipt remainder and the invoice outstanding.
pub fn validate_allocation(
    receipt: &Receipt,
    invoice: &SalesInvoice,
    receipt_allocated: i64,
    invoice_allocated: i64,
    amount: i64,
) -> DomainResult<()> {
    if amount <= 0 {
        return Err(DomainError::validation(
            "allocation amount must be positive",
        ));
    }
    if receipt.customer_id != invoice.customer_id {
        return Err(DomainError::validation(format!(
            "receipt {} and invoice {} belong to different customers",
            receipt.document_number, invoice.document_number
        )));
    }
    if receipt.state.status != DocumentStatus::Posted {
        return Err(DomainError::invariant(format!(
            "receipt {} is '{}'; only posted receipts can be allocated",
            receipt.document_number,
            receipt.state.status.as_str()
        )));
    }
    if invoice.state.status != DocumentStatus::Posted {
        return Err(DomainError::invariant(format!(
            "invoice {} is '{}'; only posted invoices can be settled",
            invoice.document_number,
            invoice.state.status.as_str()
        )));
    }
    let remainder = receipt_remainder(receipt, receipt_allocated);
    if amount > remainder {
        return Err(DomainError::validation(format!(
            "allocation of {amount} exceeds the {remainder} left on receipt {}",
            receipt.document_number
        )));
    }
    let outstanding = invoice_outstanding(invoice, invoice_allocated);
    if amount > outstanding {
        return Err(DomainError::validation(format!(
            "allocation of {amount} exceeds the {outstanding} outstanding on invoice {}",
            invoice.document_number
        )));
    }
    Ok(())
}
