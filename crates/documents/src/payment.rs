use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use daftar_core::{DomainError, DomainResult};

use crate::document::{DocumentId, PartyId};
use crate::lifecycle::PostingState;

/// A supplier payment: money paid out against what we owe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: DocumentId,
    pub document_number: String,
    pub supplier_id: PartyId,
    pub amount: i64,
    pub paid_at: DateTime<Utc>,
    pub state: PostingState,
}

impl Payment {
    pub fn draft(
        id: DocumentId,
        document_number: impl Into<String>,
        supplier_id: PartyId,
        amount: i64,
        paid_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let document_number = document_number.into();
        if document_number.trim().is_empty() {
            return Err(DomainError::validation("payment number cannot be empty"));
        }
        if amount <= 0 {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        Ok(Self {
            id,
            document_number,
            supplier_id,
            amount,
            paid_at,
            state: PostingState::draft(),
        })
    }
}
