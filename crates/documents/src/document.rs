use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use daftar_core::{DomainError, DomainResult, RecordId};

use crate::invoice::SalesInvoice;
use crate::lifecycle::PostingState;
use crate::payment::Payment;
use crate::receipt::Receipt;

/// Source document identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub RecordId);

impl DocumentId {
    pub fn new(id: RecordId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Customer or supplier identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub RecordId);

impl PartyId {
    pub fn new(id: RecordId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PartyId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// The document kinds the posting engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    SalesInvoice,
    Receipt,
    Payment,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::SalesInvoice => "sales_invoice",
            DocumentType::Receipt => "receipt",
            DocumentType::Payment => "payment",
        }
    }

    /// Human-readable label for descriptions and logs.
    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::SalesInvoice => "sales invoice",
            DocumentType::Receipt => "receipt",
            DocumentType::Payment => "payment",
        }
    }
}

impl core::str::FromStr for DocumentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sales_invoice" => Ok(DocumentType::SalesInvoice),
            "receipt" => Ok(DocumentType::Receipt),
            "payment" => Ok(DocumentType::Payment),
            other => Err(DomainError::validation(format!(
                "unknown document type '{other}'"
            ))),
        }
    }
}

/// Any postable document, dispatched by kind.
///
/// Posting and reversal work against this enum so the engine has one code
/// path per lifecycle transition rather than one per document kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDocument {
    SalesInvoice(SalesInvoice),
    Receipt(Receipt),
    Payment(Payment),
}

impl SourceDocument {
    pub fn id(&self) -> DocumentId {
        match self {
            SourceDocument::SalesInvoice(d) => d.id,
            SourceDocument::Receipt(d) => d.id,
            SourceDocument::Payment(d) => d.id,
        }
    }

    pub fn document_type(&self) -> DocumentType {
        match self {
            SourceDocument::SalesInvoice(_) => DocumentType::SalesInvoice,
            SourceDocument::Receipt(_) => DocumentType::Receipt,
            SourceDocument::Payment(_) => DocumentType::Payment,
        }
    }

    pub fn document_number(&self) -> &str {
        match self {
            SourceDocument::SalesInvoice(d) => &d.document_number,
            SourceDocument::Receipt(d) => &d.document_number,
            SourceDocument::Payment(d) => &d.document_number,
        }
    }

    pub fn party_id(&self) -> PartyId {
        match self {
            SourceDocument::SalesInvoice(d) => d.customer_id,
            SourceDocument::Receipt(d) => d.customer_id,
            SourceDocument::Payment(d) => d.supplier_id,
        }
    }

    /// Full monetary value of the document in minor units.
    pub fn gross_amount(&self) -> i64 {
        match self {
            SourceDocument::SalesInvoice(d) => d.total,
            SourceDocument::Receipt(d) => d.amount,
            SourceDocument::Payment(d) => d.amount,
        }
    }

    /// Date the resulting journal entry carries.
    pub fn entry_date(&self) -> DateTime<Utc> {
        match self {
            SourceDocument::SalesInvoice(d) => d.issue_date,
            SourceDocument::Receipt(d) => d.received_at,
            SourceDocument::Payment(d) => d.paid_at,
        }
    }

    pub fn state(&self) -> &PostingState {
        match self {
            SourceDocument::SalesInvoice(d) => &d.state,
            SourceDocument::Receipt(d) => &d.state,
            SourceDocument::Payment(d) => &d.state,
        }
    }

    pub fn state_mut(&mut self) -> &mut PostingState {
        match self {
            SourceDocument::SalesInvoice(d) => &mut d.state,
            SourceDocument::Receipt(d) => &mut d.state,
            SourceDocument::Payment(d) => &mut d.state,
        }
    }

    pub fn into_sales_invoice(self) -> DomainResult<SalesInvoice> {
        match self {
            SourceDocument::SalesInvoice(invoice) => Ok(invoice),
            other => Err(DomainError::validation(format!(
                "{} {} is not a sales invoice",
                other.document_type().label(),
                other.document_number()
            ))),
        }
    }

    pub fn into_receipt(self) -> DomainResult<Receipt> {
        match self {
            SourceDocument::Receipt(receipt) => Ok(receipt),
            other => Err(DomainError::validation(format!(
                "{} {} is not a receipt",
                other.document_type().label(),
                other.document_number()
            ))),
        }
    }
}
