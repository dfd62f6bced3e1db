//! Matching customer receipts against their invoices.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use daftar_core::{RecordId, UserId};
use daftar_documents::{DocumentId, DocumentType};
use daftar_receivables::{Allocation, AllocationId};

use crate::store::LedgerStore;

use super::{ServiceError, ServiceResult};

/// Applies part of a posted receipt against a posted invoice.
#[derive(Debug, Clone)]
pub struct AllocationService<S> {
    store: Arc<S>,
}

impl<S: LedgerStore> AllocationService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Allocate `amount` of a receipt to an invoice.
    ///
    /// The domain validates ownership, lifecycle, and both remainders
    /// against the already-allocated sums the store reports.
    #[instrument(
        skip(self),
        fields(receipt_id = %receipt_id, invoice_id = %invoice_id, amount),
        err
    )]
    pub async fn allocate(
        &self,
        receipt_id: DocumentId,
        invoice_id: DocumentId,
        amount: i64,
        user_id: UserId,
    ) -> ServiceResult<Allocation> {
        let receipt = self
            .store
            .document(DocumentType::Receipt, receipt_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("receipt {receipt_id}")))?
            .into_receipt()?;
        let invoice = self
            .store
            .document(DocumentType::SalesInvoice, invoice_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("sales invoice {invoice_id}")))?
            .into_sales_invoice()?;

        let receipt_allocated = self.store.allocated_from_receipt(receipt_id).await?;
        let invoice_allocated = self.store.allocated_to_invoice(invoice_id).await?;

        let allocation = Allocation::new(
            AllocationId::new(RecordId::new()),
            &receipt,
            &invoice,
            receipt_allocated,
            invoice_allocated,
            amount,
            user_id,
            Utc::now(),
        )?;
        self.store.insert_allocation(&allocation).await?;

        info!(
            allocation_id = %allocation.id,
            receipt = %receipt.document_number,
            invoice = %invoice.document_number,
            "receipt allocated to invoice"
        );
        Ok(allocation)
    }
}
