//! Posting and reversal of source documents.

use std::sync::Arc;

use chrono::Utc;
use tracing::{Span, info, instrument};

use daftar_core::UserId;
use daftar_documents::{DocumentId, DocumentStatus, DocumentType};
use daftar_ledger::{
    JournalId, PostingRules, derive_posting, derive_reversal, format_journal_no,
};

use crate::store::{DocumentTransition, LedgerStore, PostingWrite, ReversalWrite};

use super::{ServiceError, ServiceResult, load_chart};

/// Identity of the journal entry an operation produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostingOutcome {
    pub journal_id: JournalId,
    pub journal_no: i64,
}

impl PostingOutcome {
    /// Human-facing reference, e.g. `JE-000042`.
    pub fn reference(&self) -> String {
        format_journal_no(self.journal_no)
    }
}

/// Posts draft documents and reverses posted ones.
///
/// Both operations follow the same shape: load current state, derive the
/// journal in the domain layer, flip the document lifecycle, then hand the
/// store one atomic commit guarded by compare-and-set on the document
/// status. Losing that race surfaces as a conflict and writes nothing.
#[derive(Debug, Clone)]
pub struct PostingService<S> {
    store: Arc<S>,
    rules: PostingRules,
}

impl<S: LedgerStore> PostingService<S> {
    pub fn new(store: Arc<S>, rules: PostingRules) -> Self {
        Self { store, rules }
    }

    /// Post a draft document, producing its journal entry.
    #[instrument(
        skip(self),
        fields(
            document_type = document_type.as_str(),
            document_id = %document_id,
            journal_no = tracing::field::Empty,
        ),
        err
    )]
    pub async fn post(
        &self,
        document_type: DocumentType,
        document_id: DocumentId,
        user_id: UserId,
    ) -> ServiceResult<PostingOutcome> {
        let mut document = self
            .store
            .document(document_type, document_id)
            .await?
            .ok_or_else(|| {
                ServiceError::not_found(format!("{} {}", document_type.label(), document_id))
            })?;

        let chart = load_chart(&*self.store).await?;
        let now = Utc::now();
        let draft = derive_posting(&document, &self.rules, &chart, user_id, now)?;
        document.state_mut().mark_posted(user_id, now)?;

        let posted = self
            .store
            .commit_posting(PostingWrite {
                journal: draft.journal,
                lines: draft.lines,
                deltas: draft.deltas,
                transition: DocumentTransition {
                    document_type,
                    document_id,
                    expected_status: DocumentStatus::Draft,
                    new_state: document.state().clone(),
                },
            })
            .await?;

        Span::current().record("journal_no", posted.journal_no);
        info!(
            journal = %format_journal_no(posted.journal_no),
            "document posted"
        );
        Ok(PostingOutcome {
            journal_id: posted.journal_id,
            journal_no: posted.journal_no,
        })
    }

    /// Reverse a posted document: mirror entry, original marked reversed,
    /// document editable again.
    #[instrument(
        skip(self, reason),
        fields(
            document_type = document_type.as_str(),
            document_id = %document_id,
            journal_no = tracing::field::Empty,
        ),
        err
    )]
    pub async fn reverse(
        &self,
        document_type: DocumentType,
        document_id: DocumentId,
        user_id: UserId,
        reason: &str,
    ) -> ServiceResult<PostingOutcome> {
        let mut document = self
            .store
            .document(document_type, document_id)
            .await?
            .ok_or_else(|| {
                ServiceError::not_found(format!("{} {}", document_type.label(), document_id))
            })?;

        let original = self
            .store
            .posting_journal_for(document_type, document_id)
            .await?
            .ok_or_else(|| {
                ServiceError::not_found(format!(
                    "posting journal for {} {}",
                    document_type.label(),
                    document_id
                ))
            })?;
        let original_lines = self.store.journal_lines(original.id).await?;

        let chart = load_chart(&*self.store).await?;
        let now = Utc::now();
        let draft = derive_reversal(
            &original,
            &original_lines,
            &document,
            &chart,
            user_id,
            now,
            reason,
        )?;
        document.state_mut().mark_reversed(reason, now)?;

        let posted = self
            .store
            .commit_reversal(ReversalWrite {
                original_journal: original.id,
                journal: draft.journal,
                lines: draft.lines,
                deltas: draft.deltas,
                transition: DocumentTransition {
                    document_type,
                    document_id,
                    expected_status: DocumentStatus::Posted,
                    new_state: document.state().clone(),
                },
            })
            .await?;

        Span::current().record("journal_no", posted.journal_no);
        info!(
            journal = %format_journal_no(posted.journal_no),
            reverses = %original.reference(),
            "document reversed"
        );
        Ok(PostingOutcome {
            journal_id: posted.journal_id,
            journal_no: posted.journal_no,
        })
    }
}
