use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use daftar_accounts::AccountId;
use daftar_core::{DomainError, DomainResult, RecordId, UserId};
use daftar_documents::{DocumentId, DocumentType};

/// Journal entry identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JournalId(pub RecordId);

impl JournalId {
    pub fn new(id: RecordId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for JournalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Journal lifecycle. The engine only ever writes `Posted` journals; `Draft`
/// and `Reversed` exist for rows the auditor reads back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalStatus {
    Draft,
    Posted,
    Reversed,
}

impl JournalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalStatus::Draft => "draft",
            JournalStatus::Posted => "posted",
            JournalStatus::Reversed => "reversed",
        }
    }
}

impl core::str::FromStr for JournalStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(JournalStatus::Draft),
            "posted" => Ok(JournalStatus::Posted),
            "reversed" => Ok(JournalStatus::Reversed),
            other => Err(DomainError::validation(format!(
                "unknown journal status '{other}'"
            ))),
        }
    }
}

/// Journal entry header.
///
/// `journal_no` is the human-facing sequence number; it is `None` until the
/// store assigns one at commit. `reversal_of` links a reversal entry back to
/// the journal it undoes. `source_type`/`source_id` tie the entry to the
/// document that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    pub id: JournalId,
    pub journal_no: Option<i64>,
    pub entry_date: DateTime<Utc>,
    pub description: String,
    pub total_debit: i64,
    pub total_credit: i64,
    pub status: JournalStatus,
    pub source_type: Option<DocumentType>,
    pub source_id: Option<DocumentId>,
    pub reversal_of: Option<JournalId>,
    pub posted_by: UserId,
    pub posted_at: DateTime<Utc>,
}

impl Journal {
    /// Reference shown in descriptions and logs: `JE-000042`, or the raw id
    /// while the store has not assigned a number yet.
    pub fn reference(&self) -> String {
        match self.journal_no {
            Some(no) => format_journal_no(no),
            None => self.id.to_string(),
        }
    }
}

/// Render a journal sequence number as `JE-000001`.
pub fn format_journal_no(no: i64) -> String {
    format!("JE-{no:06}")
}

/// A single debit or credit against one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    pub journal_id: JournalId,
    pub line_no: u32,
    pub account_id: AccountId,
    pub debit: i64,
    pub credit: i64,
    pub description: Option<String>,
}

impl JournalLine {
    pub fn debit(
        journal_id: JournalId,
        line_no: u32,
        account_id: AccountId,
        amount: i64,
        description: Option<String>,
    ) -> Self {
        Self {
            journal_id,
            line_no,
            account_id,
            debit: amount,
            credit: 0,
            description,
        }
    }

    pub fn credit(
        journal_id: JournalId,
        line_no: u32,
        account_id: AccountId,
        amount: i64,
        description: Option<String>,
    ) -> Self {
        Self {
            journal_id,
            line_no,
            account_id,
            debit: 0,
            credit: amount,
            description,
        }
    }

    /// A line must hit exactly one side with a positive amount.
    pub fn validate(&self) -> DomainResult<()> {
        if self.debit < 0 || self.credit < 0 {
            return Err(DomainError::invariant(format!(
                "journal line {} has a negative amount",
                self.line_no
            )));
        }
        match (self.debit > 0, self.credit > 0) {
            (true, false) | (false, true) => Ok(()),
            (true, true) => Err(DomainError::invariant(format!(
                "journal line {} has both a debit and a credit",
                self.line_no
            ))),
            (false, false) => Err(DomainError::invariant(format!(
                "journal line {} moves no amount",
                self.line_no
            ))),
        }
    }
}

/// Validate every line and sum both sides.
///
/// Sums are carried in `i128` so a pathological set of lines cannot wrap;
/// totals that do not fit back into `i64` are rejected.
pub fn line_totals(lines: &[JournalLine]) -> DomainResult<(i64, i64)> {
    if lines.len() < 2 {
        return Err(DomainError::invariant(
            "a journal entry needs at least two lines",
        ));
    }
    let mut debit: i128 = 0;
    let mut credit: i128 = 0;
    for line in lines {
        line.validate()?;
        debit += i128::from(line.debit);
        credit += i128::from(line.credit);
    }
    let debit = i64::try_from(debit)
        .map_err(|_| DomainError::validation("journal debit total overflows"))?;
    let credit = i64::try_from(credit)
        .map_err(|_| DomainError::validation("journal credit total overflows"))?;
    Ok((debit, credit))
}

/// Debits must equal credits exactly. Rounding slack is the auditor's
/// business for legacy rows, never the posting engine's.
pub fn ensure_balanced(total_debit: i64, total_credit: i64) -> DomainResult<()> {
    if total_debit != total_credit {
        return Err(DomainError::invariant(format!(
            "journal entry is unbalanced: debits {total_debit} != credits {total_credit}"
        )));
    }
    Ok(())
}
