//! `daftar-ledger` — the double-entry posting engine.
//!
//! This crate holds the pure accounting logic: deriving balanced journal
//! entries from source documents, deriving reversal entries from posted
//! journals, and auditing the stored ledger against what the journals say it
//! should contain. Nothing here touches storage; the engine produces drafts
//! and the infra layer writes them atomically.

pub mod audit;
pub mod journal;
pub mod posting;
pub mod reversal;

pub use audit::{
    AccountDiscrepancy, AuditReport, BALANCE_TOLERANCE, BalanceCorrection, EquationCheck,
    EquityAdjustment, FixPlan, NatureViolation, OrphanedAccount, TrialBalance, TrialBalanceRow,
    UnbalancedJournal, plan_fixes, run_audit,
};
pub use journal::{Journal, JournalId, JournalLine, JournalStatus, format_journal_no};
pub use posting::{BalanceDelta, PostingDraft, PostingRules, derive_posting};
pub use reversal::{ReversalDraft, derive_reversal};
