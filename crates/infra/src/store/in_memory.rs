//! In-memory `LedgerStore` for tests and local development.
//!
//! Mirrors the Postgres implementation's semantics: compare-and-set races
//! and uniqueness violations surface as `StoreError::Conflict`, and every
//! commit method checks all its preconditions before mutating anything.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use daftar_accounts::{Account, AccountCode, AccountId};
use daftar_documents::{DocumentId, DocumentType, SourceDocument};
use daftar_ledger::{BalanceDelta, Journal, JournalId, JournalLine, JournalStatus};
use daftar_receivables::Allocation;

use super::traits::{
    AuditFixWrite, DocumentTransition, LedgerStore, PostedJournal, PostingWrite, ReversalWrite,
    StoreError, StoreResult,
};

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<AccountId, Account>,
    documents: HashMap<(DocumentType, DocumentId), SourceDocument>,
    journals: HashMap<JournalId, Journal>,
    lines: Vec<JournalLine>,
    allocations: Vec<Allocation>,
    fixes: Vec<AuditFixWrite>,
    last_journal_no: i64,
}

impl Inner {
    fn next_journal_no(&mut self) -> i64 {
        self.last_journal_no += 1;
        self.last_journal_no
    }

    fn live_posting_journal(
        &self,
        document_type: DocumentType,
        id: DocumentId,
    ) -> Option<&Journal> {
        self.journals.values().find(|j| {
            j.source_type == Some(document_type)
                && j.source_id == Some(id)
                && j.reversal_of.is_none()
                && j.status == JournalStatus::Posted
        })
    }

    /// Compute the balances a delta set produces, without applying them.
    fn balances_after(&self, deltas: &[BalanceDelta]) -> StoreResult<Vec<(AccountId, i64)>> {
        let mut updates = Vec::with_capacity(deltas.len());
        for delta in deltas {
            let account = self.accounts.get(&delta.account_id).ok_or_else(|| {
                StoreError::Backend(format!("account {} does not exist", delta.account_id))
            })?;
            let balance = account.balance.checked_add(delta.delta).ok_or_else(|| {
                StoreError::Backend(format!("balance overflow on account {}", account.code))
            })?;
            updates.push((delta.account_id, balance));
        }
        Ok(updates)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    inner: RwLock<Inner>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    /// Fix-mode writes recorded so far, oldest first.
    pub fn recorded_fixes(&self) -> StoreResult<Vec<AuditFixWrite>> {
        Ok(self.read()?.fixes.clone())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_account(&self, account: &Account) -> StoreResult<()> {
        let mut inner = self.write()?;
        if inner.accounts.contains_key(&account.id) {
            return Err(StoreError::Conflict(format!(
                "account {} already exists",
                account.id
            )));
        }
        if inner.accounts.values().any(|a| a.code == account.code) {
            return Err(StoreError::Conflict(format!(
                "account code {} already exists",
                account.code
            )));
        }
        inner.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        Ok(self.read()?.accounts.get(&id).cloned())
    }

    async fn account_by_code(&self, code: &AccountCode) -> StoreResult<Option<Account>> {
        Ok(self
            .read()?
            .accounts
            .values()
            .find(|a| &a.code == code)
            .cloned())
    }

    async fn accounts(&self) -> StoreResult<Vec<Account>> {
        let mut accounts: Vec<Account> = self.read()?.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.code.as_str().cmp(b.code.as_str()));
        Ok(accounts)
    }

    async fn insert_document(&self, document: &SourceDocument) -> StoreResult<()> {
        let mut inner = self.write()?;
        let key = (document.document_type(), document.id());
        if inner.documents.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "document {} already exists",
                document.id()
            )));
        }
        let duplicate_number = inner.documents.values().any(|d| {
            d.document_type() == document.document_type()
                && d.document_number() == document.document_number()
        });
        if duplicate_number {
            return Err(StoreError::Conflict(format!(
                "document number {} already exists",
                document.document_number()
            )));
        }
        inner.documents.insert(key, document.clone());
        Ok(())
    }

    async fn document(
        &self,
        document_type: DocumentType,
        id: DocumentId,
    ) -> StoreResult<Option<SourceDocument>> {
        Ok(self.read()?.documents.get(&(document_type, id)).cloned())
    }

    async fn journal(&self, id: JournalId) -> StoreResult<Option<Journal>> {
        Ok(self.read()?.journals.get(&id).cloned())
    }

    async fn posting_journal_for(
        &self,
        document_type: DocumentType,
        id: DocumentId,
    ) -> StoreResult<Option<Journal>> {
        Ok(self
            .read()?
            .live_posting_journal(document_type, id)
            .cloned())
    }

    async fn journal_lines(&self, id: JournalId) -> StoreResult<Vec<JournalLine>> {
        let inner = self.read()?;
        let mut lines: Vec<JournalLine> = inner
            .lines
            .iter()
            .filter(|l| l.journal_id == id)
            .cloned()
            .collect();
        lines.sort_by_key(|l| l.line_no);
        Ok(lines)
    }

    async fn journals(&self) -> StoreResult<Vec<Journal>> {
        let mut journals: Vec<Journal> = self.read()?.journals.values().cloned().collect();
        journals.sort_by_key(|j| j.journal_no.unwrap_or(i64::MAX));
        Ok(journals)
    }

    async fn all_journal_lines(&self) -> StoreResult<Vec<JournalLine>> {
        Ok(self.read()?.lines.clone())
    }

    async fn insert_allocation(&self, allocation: &Allocation) -> StoreResult<()> {
        let mut inner = self.write()?;
        if inner.allocations.iter().any(|a| a.id == allocation.id) {
            return Err(StoreError::Conflict(format!(
                "allocation {} already exists",
                allocation.id
            )));
        }
        inner.allocations.push(allocation.clone());
        Ok(())
    }

    async fn allocated_from_receipt(&self, receipt_id: DocumentId) -> StoreResult<i64> {
        let inner = self.read()?;
        let sum: i128 = inner
            .allocations
            .iter()
            .filter(|a| a.receipt_id == receipt_id)
            .map(|a| i128::from(a.amount))
            .sum();
        i64::try_from(sum).map_err(|_| StoreError::Backend("allocation sum overflows".to_string()))
    }

    async fn allocated_to_invoice(&self, invoice_id: DocumentId) -> StoreResult<i64> {
        let inner = self.read()?;
        let sum: i128 = inner
            .allocations
            .iter()
            .filter(|a| a.invoice_id == invoice_id)
            .map(|a| i128::from(a.amount))
            .sum();
        i64::try_from(sum).map_err(|_| StoreError::Backend("allocation sum overflows".to_string()))
    }

    async fn balance_adjustments(&self) -> StoreResult<Vec<BalanceDelta>> {
        let inner = self.read()?;
        let mut sums: HashMap<AccountId, i64> = HashMap::new();
        for fix in &inner.fixes {
            if let Some(adjustment) = &fix.plan.equity_adjustment {
                let entry = sums.entry(adjustment.account_id).or_insert(0);
                *entry = entry.checked_add(adjustment.amount).ok_or_else(|| {
                    StoreError::Backend("adjustment sum overflows".to_string())
                })?;
            }
        }
        Ok(sums
            .into_iter()
            .map(|(account_id, delta)| BalanceDelta { account_id, delta })
            .collect())
    }

    async fn commit_posting(&self, write: PostingWrite) -> StoreResult<PostedJournal> {
        let mut inner = self.write()?;
        let transition = &write.transition;
        let key = (transition.document_type, transition.document_id);

        // Preconditions first; nothing is mutated until all of them hold.
        let document = inner.documents.get(&key).ok_or_else(|| {
            StoreError::Conflict(format!("document {} not found", transition.document_id))
        })?;
        if document.state().status != transition.expected_status {
            return Err(StoreError::Conflict(format!(
                "document {} is '{}', expected '{}'",
                transition.document_id,
                document.state().status.as_str(),
                transition.expected_status.as_str()
            )));
        }
        if inner.journals.contains_key(&write.journal.id) {
            return Err(StoreError::Conflict(format!(
                "journal {} already exists",
                write.journal.id
            )));
        }
        if inner
            .live_posting_journal(transition.document_type, transition.document_id)
            .is_some()
        {
            return Err(StoreError::Conflict(format!(
                "document {} already has a posting journal",
                transition.document_id
            )));
        }
        let balances = inner.balances_after(&write.deltas)?;

        let journal_no = inner.next_journal_no();
        let mut journal = write.journal;
        journal.journal_no = Some(journal_no);
        let journal_id = journal.id;
        inner.journals.insert(journal_id, journal);
        inner.lines.extend(write.lines);
        for (account_id, balance) in balances {
            if let Some(account) = inner.accounts.get_mut(&account_id) {
                account.balance = balance;
            }
        }
        if let Some(document) = inner.documents.get_mut(&key) {
            *document.state_mut() = transition.new_state.clone();
        }

        Ok(PostedJournal {
            journal_id,
            journal_no,
        })
    }

    async fn commit_reversal(&self, write: ReversalWrite) -> StoreResult<PostedJournal> {
        let mut inner = self.write()?;
        let transition = &write.transition;
        let key = (transition.document_type, transition.document_id);

        let document = inner.documents.get(&key).ok_or_else(|| {
            StoreError::Conflict(format!("document {} not found", transition.document_id))
        })?;
        if document.state().status != transition.expected_status {
            return Err(StoreError::Conflict(format!(
                "document {} is '{}', expected '{}'",
                transition.document_id,
                document.state().status.as_str(),
                transition.expected_status.as_str()
            )));
        }
        let original = inner.journals.get(&write.original_journal).ok_or_else(|| {
            StoreError::Conflict(format!("journal {} not found", write.original_journal))
        })?;
        if original.status != JournalStatus::Posted {
            return Err(StoreError::Conflict(format!(
                "journal {} is already '{}'",
                write.original_journal,
                original.status.as_str()
            )));
        }
        if inner.journals.contains_key(&write.journal.id) {
            return Err(StoreError::Conflict(format!(
                "journal {} already exists",
                write.journal.id
            )));
        }
        let balances = inner.balances_after(&write.deltas)?;

        let journal_no = inner.next_journal_no();
        let mut journal = write.journal;
        journal.journal_no = Some(journal_no);
        let journal_id = journal.id;
        inner.journals.insert(journal_id, journal);
        inner.lines.extend(write.lines);
        if let Some(original) = inner.journals.get_mut(&write.original_journal) {
            original.status = JournalStatus::Reversed;
        }
        for (account_id, balance) in balances {
            if let Some(account) = inner.accounts.get_mut(&account_id) {
                account.balance = balance;
            }
        }
        if let Some(document) = inner.documents.get_mut(&key) {
            *document.state_mut() = transition.new_state.clone();
        }

        Ok(PostedJournal {
            journal_id,
            journal_no,
        })
    }

    async fn apply_audit_fixes(&self, write: AuditFixWrite) -> StoreResult<()> {
        let mut inner = self.write()?;

        let mut updates = Vec::with_capacity(write.plan.corrections.len() + 1);
        for correction in &write.plan.corrections {
            if !inner.accounts.contains_key(&correction.account_id) {
                return Err(StoreError::Backend(format!(
                    "account {} does not exist",
                    correction.account_id
                )));
            }
            updates.push((correction.account_id, correction.corrected_balance));
        }
        if let Some(adjustment) = &write.plan.equity_adjustment {
            let account = inner.accounts.get(&adjustment.account_id).ok_or_else(|| {
                StoreError::Backend(format!("account {} does not exist", adjustment.account_id))
            })?;
            // An adjusted balance may itself have just been corrected.
            let base = updates
                .iter()
                .find(|(id, _)| *id == adjustment.account_id)
                .map(|(_, balance)| *balance)
                .unwrap_or(account.balance);
            let balance = base.checked_add(adjustment.amount).ok_or_else(|| {
                StoreError::Backend(format!("balance overflow on account {}", account.code))
            })?;
            updates.push((adjustment.account_id, balance));
        }

        for (account_id, balance) in updates {
            if let Some(account) = inner.accounts.get_mut(&account_id) {
                account.balance = balance;
            }
        }
        inner.fixes.push(write);
        Ok(())
    }
}
