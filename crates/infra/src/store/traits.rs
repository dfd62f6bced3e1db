use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use daftar_accounts::{Account, AccountCode, AccountId};
use daftar_documents::{DocumentId, DocumentStatus, DocumentType, PostingState, SourceDocument};
use daftar_ledger::{BalanceDelta, FixPlan, Journal, JournalId, JournalLine};
use daftar_receivables::Allocation;

/// Storage failures, already classified for the caller.
///
/// `Conflict` covers everything the caller may retry after re-reading:
/// a lost compare-and-set race or a unique constraint firing underneath us.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Compare-and-set transition of one document's lifecycle state.
///
/// The store updates the document row only while its status column still
/// equals `expected_status`; zero updated rows means another writer won the
/// race and the whole commit rolls back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTransition {
    pub document_type: DocumentType,
    pub document_id: DocumentId,
    pub expected_status: DocumentStatus,
    pub new_state: PostingState,
}

/// Everything one posting commits atomically: the journal entry with its
/// lines, the balance movements, and the document status flip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingWrite {
    pub journal: Journal,
    pub lines: Vec<JournalLine>,
    pub deltas: Vec<BalanceDelta>,
    pub transition: DocumentTransition,
}

/// Everything one reversal commits atomically. On top of the posting shape
/// it flips the original journal from posted to reversed, also guarded by
/// compare-and-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReversalWrite {
    pub original_journal: JournalId,
    pub journal: Journal,
    pub lines: Vec<JournalLine>,
    pub deltas: Vec<BalanceDelta>,
    pub transition: DocumentTransition,
}

/// Identity of a committed journal, with the sequence number the store
/// assigned to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostedJournal {
    pub journal_id: JournalId,
    pub journal_no: i64,
}

/// Fix-mode writes: balance corrections plus the logged equity adjustment,
/// committed together or not at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditFixWrite {
    pub run_at: DateTime<Utc>,
    pub plan: FixPlan,
}

/// Storage contract of the ledger.
///
/// Implementations guarantee that the `commit_*` methods are all-or-nothing
/// and that losing a status race surfaces as [`StoreError::Conflict`].
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_account(&self, account: &Account) -> StoreResult<()>;
    async fn account(&self, id: AccountId) -> StoreResult<Option<Account>>;
    async fn account_by_code(&self, code: &AccountCode) -> StoreResult<Option<Account>>;
    async fn accounts(&self) -> StoreResult<Vec<Account>>;

    async fn insert_document(&self, document: &SourceDocument) -> StoreResult<()>;
    async fn document(
        &self,
        document_type: DocumentType,
        id: DocumentId,
    ) -> StoreResult<Option<SourceDocument>>;

    async fn journal(&self, id: JournalId) -> StoreResult<Option<Journal>>;
    /// The live posting journal of a document: produced by it, not itself a
    /// reversal, still posted. `None` once reversed or never posted.
    async fn posting_journal_for(
        &self,
        document_type: DocumentType,
        id: DocumentId,
    ) -> StoreResult<Option<Journal>>;
    async fn journal_lines(&self, id: JournalId) -> StoreResult<Vec<JournalLine>>;
    async fn journals(&self) -> StoreResult<Vec<Journal>>;
    async fn all_journal_lines(&self) -> StoreResult<Vec<JournalLine>>;

    async fn insert_allocation(&self, allocation: &Allocation) -> StoreResult<()>;
    async fn allocated_from_receipt(&self, receipt_id: DocumentId) -> StoreResult<i64>;
    async fn allocated_to_invoice(&self, invoice_id: DocumentId) -> StoreResult<i64>;

    /// Net logged balance adjustment per account, summed over every fix run.
    /// The auditor counts these toward computed balances.
    async fn balance_adjustments(&self) -> StoreResult<Vec<BalanceDelta>>;

    async fn commit_posting(&self, write: PostingWrite) -> StoreResult<PostedJournal>;
    async fn commit_reversal(&self, write: ReversalWrite) -> StoreResult<PostedJournal>;
    async fn apply_audit_fixes(&self, write: AuditFixWrite) -> StoreResult<()>;
}
