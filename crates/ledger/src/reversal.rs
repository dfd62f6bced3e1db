use chrono::{DateTime, Utc};

use daftar_accounts::Chart;
use daftar_core::{DomainError, DomainResult, RecordId, UserId};
use daftar_documents::{DocumentStatus, SourceDocument};

use crate::journal::{Journal, JournalId, JournalLine, JournalStatus, ensure_balanced, line_totals};
use crate::posting::{BalanceDelta, accumulate};

/// Everything one reversal writes: the mirror journal, its lines, and the
/// balance movements that undo the original posting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReversalDraft {
    pub journal: Journal,
    pub lines: Vec<JournalLine>,
    pub deltas: Vec<BalanceDelta>,
}

/// Derive the reversal entry for a posted journal.
///
/// The reversal mirrors the original: same accounts, same amounts, debit and
/// credit swapped, linked back via `reversal_of`. Accounts are not checked
/// for postability here: an entry must stay reversible even after its
/// account was deactivated.
pub fn derive_reversal(
    original: &Journal,
    original_lines: &[JournalLine],
    document: &SourceDocument,
    chart: &Chart,
    reversed_by: UserId,
    now: DateTime<Utc>,
    reason: &str,
) -> DomainResult<ReversalDraft> {
    if reason.trim().is_empty() {
        return Err(DomainError::validation("reversal reason cannot be empty"));
    }
    if document.state().status != DocumentStatus::Posted {
        return Err(DomainError::invariant(format!(
            "cannot reverse {} {}: status is '{}'",
            document.document_type().label(),
            document.document_number(),
            document.state().status.as_str()
        )));
    }
    if original.status != JournalStatus::Posted {
        return Err(DomainError::invariant(format!(
            "journal {} is '{}' and cannot be reversed",
            original.reference(),
            original.status.as_str()
        )));
    }
    if original.reversal_of.is_some() {
        return Err(DomainError::invariant(format!(
            "journal {} is itself a reversal",
            original.reference()
        )));
    }
    if original.source_id != Some(document.id()) {
        return Err(DomainError::validation(format!(
            "journal {} was not produced by document {}",
            original.reference(),
            document.id()
        )));
    }

    let journal_id = JournalId::new(RecordId::new());
    let mut lines = Vec::with_capacity(original_lines.len());
    let mut deltas: Vec<BalanceDelta> = Vec::new();
    for line in original_lines {
        if line.journal_id != original.id {
            return Err(DomainError::validation(format!(
                "line {} does not belong to journal {}",
                line.line_no,
                original.reference()
            )));
        }
        let account = chart.require(line.account_id)?;
        lines.push(JournalLine {
            journal_id,
            line_no: line.line_no,
            account_id: line.account_id,
            debit: line.credit,
            credit: line.debit,
            description: line.description.clone(),
        });
        accumulate(
            &mut deltas,
            line.account_id,
            account.signed_delta(line.credit, line.debit),
        );
    }

    let (total_debit, total_credit) = line_totals(&lines)?;
    ensure_balanced(total_debit, total_credit)?;

    let journal = Journal {
        id: journal_id,
        journal_no: None,
        entry_date: now,
        description: format!("Reversal of {}: {}", original.reference(), reason),
        total_debit,
        total_credit,
        status: JournalStatus::Posted,
        source_type: original.source_type,
        source_id: original.source_id,
        reversal_of: Some(original.id),
        posted_by: reversed_by,
        posted_at: now,
    };

    Ok(ReversalDraft {
        journal,
        lines,
        deltas,
    })
}
