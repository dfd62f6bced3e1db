use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use daftar_core::{DomainError, DomainResult};

use crate::document::{DocumentId, PartyId};
use crate::lifecycle::PostingState;

/// A sales invoice: the amount a customer owes us.
///
/// Amounts are minor currency units. `total` is always `subtotal +
/// tax_amount`; it is computed once at draft time and never recomputed from
/// mutable parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesInvoice {
    pub id: DocumentId,
    pub document_number: String,
    pub customer_id: PartyId,
    pub subtotal: i64,
    pub tax_amount: i64,
    pub total: i64,
    pub issue_date: DateTime<Utc>,
    pub state: PostingState,
}

impl SalesInvoice {
    pub fn draft(
        id: DocumentId,
        document_number: impl Into<String>,
        customer_id: PartyId,
        subtotal: i64,
        tax_amount: i64,
        issue_date: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let document_number = document_number.into();
        if document_number.trim().is_empty() {
            return Err(DomainError::validation("invoice number cannot be empty"));
        }
        if subtotal <= 0 {
            return Err(DomainError::validation("invoice subtotal must be positive"));
        }
        if tax_amount < 0 {
            return Err(DomainError::validation("invoice tax cannot be negative"));
        }
        let total = subtotal
            .checked_add(tax_amount)
            .ok_or_else(|| DomainError::validation("invoice total overflows"))?;
        Ok(Self {
            id,
            document_number,
            customer_id,
            subtotal,
            tax_amount,
            total,
            issue_date,
            state: PostingState::draft(),
        })
    }
}
