use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use daftar_core::{DomainError, DomainResult};

use crate::document::{DocumentId, PartyId};
use crate::lifecycle::PostingState;

/// A customer receipt: money received, later allocated against invoices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: DocumentId,
    pub document_number: String,
    pub customer_id: PartyId,
    pub amount: i64,
    pub received_at: DateTime<Utc>,
    pub state: PostingState,
}

impl Receipt {
    pub fn draft(
        id: DocumentId,
        document_number: impl Into<String>,
        customer_id: PartyId,
        amount: i64,
        received_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let document_number = document_number.into();
        if document_number.trim().is_empty() {
            return Err(DomainError::validation("receipt number cannot be empty"));
        }
        if amount <= 0 {
            return Err(DomainError::validation("receipt amount must be positive"));
        }
        Ok(Self {
            id,
            document_number,
            customer_id,
            amount,
            received_at,
            state: PostingState::draft(),
        })
    }
}
