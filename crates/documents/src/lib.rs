//! `daftar-documents` — source documents that feed the ledger.
//!
//! Sales invoices, receipts and payments share one posting lifecycle:
//! `draft -> posted -> reversed`. A draft is editable, posting freezes it,
//! a reversal makes it editable again. Documents never touch the ledger
//! themselves; posting reads them and writes journals.

pub mod document;
pub mod invoice;
pub mod lifecycle;
pub mod payment;
pub mod receipt;

pub use document::{DocumentId, DocumentType, PartyId, SourceDocument};
pub use invoice::SalesInvoice;
pub use lifecycle::{DocumentStatus, PostingState};
pub use payment::Payment;
pub use receipt::Receipt;
