use std::collections::{BTreeMap, HashMap};

use daftar_core::{DomainError, DomainResult};

use crate::account::{Account, AccountId};
use crate::code::AccountCode;

/// In-memory index over a set of accounts.
///
/// Built from the stored rows whenever posting or auditing needs fast lookup
/// by id or code. Codes are unique; insertion rejects duplicates.
#[derive(Debug, Default, Clone)]
pub struct Chart {
    by_id: HashMap<AccountId, Account>,
    by_code: BTreeMap<String, AccountId>,
}

impl Chart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_accounts(accounts: impl IntoIterator<Item = Account>) -> DomainResult<Self> {
        let mut chart = Self::new();
        for account in accounts {
            chart.insert(account)?;
        }
        Ok(chart)
    }

    pub fn insert(&mut self, account: Account) -> DomainResult<()> {
        if self.by_code.contains_key(account.code.as_str()) {
            return Err(DomainError::validation(format!(
                "duplicate account code {}",
                account.code
            )));
        }
        self.by_code
            .insert(account.code.as_str().to_string(), account.id);
        self.by_id.insert(account.id, account);
        Ok(())
    }

    pub fn get(&self, id: AccountId) -> Option<&Account> {
        self.by_id.get(&id)
    }

    pub fn by_code(&self, code: &AccountCode) -> Option<&Account> {
        self.by_code
            .get(code.as_str())
            .and_then(|id| self.by_id.get(id))
    }

    pub fn require(&self, id: AccountId) -> DomainResult<&Account> {
        self.get(id)
            .ok_or_else(|| DomainError::validation(format!("account {id} does not exist")))
    }

    /// Direct children of `id`, in code order.
    pub fn children(&self, id: AccountId) -> Vec<&Account> {
        self.iter()
            .filter(|account| account.parent_id == Some(id))
            .collect()
    }

    /// Accounts whose `parent_id` points at a missing account.
    pub fn orphans(&self) -> Vec<&Account> {
        self.iter()
            .filter(|account| {
                account
                    .parent_id
                    .is_some_and(|parent| !self.by_id.contains_key(&parent))
            })
            .collect()
    }

    /// All accounts in code order.
    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.by_code.values().filter_map(|id| self.by_id.get(id))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
