use serde::{Deserialize, Serialize};

use daftar_core::{DomainError, DomainResult, RecordId};

use crate::code::AccountCode;

/// Account identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub RecordId);

impl AccountId {
    pub fn new(id: RecordId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for AccountId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// The five account types of the accounting equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountType {
    /// Normal-balance side for this type. Assets and expenses grow on the
    /// debit side; liabilities, equity and revenue grow on the credit side.
    pub fn normal_nature(&self) -> AccountNature {
        match self {
            AccountType::Asset | AccountType::Expense => AccountNature::Debit,
            AccountType::Liability | AccountType::Equity | AccountType::Revenue => {
                AccountNature::Credit
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Asset => "asset",
            AccountType::Liability => "liability",
            AccountType::Equity => "equity",
            AccountType::Revenue => "revenue",
            AccountType::Expense => "expense",
        }
    }
}

impl core::str::FromStr for AccountType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asset" => Ok(AccountType::Asset),
            "liability" => Ok(AccountType::Liability),
            "equity" => Ok(AccountType::Equity),
            "revenue" => Ok(AccountType::Revenue),
            "expense" => Ok(AccountType::Expense),
            other => Err(DomainError::validation(format!(
                "unknown account type '{other}'"
            ))),
        }
    }
}

/// Which side increases the account balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountNature {
    Debit,
    Credit,
}

impl AccountNature {
    /// Balance movement for a `(debit, credit)` pair posted to an account of
    /// this nature. A debit-nature account grows with debits; a credit-nature
    /// account grows with credits.
    pub fn signed_amount(&self, debit: i64, credit: i64) -> i64 {
        match self {
            AccountNature::Debit => debit - credit,
            AccountNature::Credit => credit - debit,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountNature::Debit => "debit",
            AccountNature::Credit => "credit",
        }
    }
}

impl core::str::FromStr for AccountNature {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debit" => Ok(AccountNature::Debit),
            "credit" => Ok(AccountNature::Credit),
            other => Err(DomainError::validation(format!(
                "unknown account nature '{other}'"
            ))),
        }
    }
}

/// A node in the chart of accounts.
///
/// `balance` is the denormalised running balance in minor currency units,
/// signed by the account's `nature` (a liability with a credit balance of
/// 5_00 stores `500`, not `-500`). `level` is derived from the code depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub code: AccountCode,
    pub name: String,
    pub account_type: AccountType,
    pub nature: AccountNature,
    pub parent_id: Option<AccountId>,
    pub level: u32,
    pub is_group: bool,
    pub balance: i64,
    pub is_active: bool,
}

impl Account {
    /// Create an account with the normal nature for its type and a zero
    /// balance.
    pub fn new(
        id: AccountId,
        code: AccountCode,
        name: impl Into<String>,
        account_type: AccountType,
        parent_id: Option<AccountId>,
        is_group: bool,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("account name cannot be empty"));
        }
        let level = code.level();
        Ok(Self {
            id,
            code,
            name,
            account_type,
            nature: account_type.normal_nature(),
            parent_id,
            level,
            is_group,
            balance: 0,
            is_active: true,
        })
    }

    /// Override the nature (contra accounts carry the opposite of their
    /// type's normal side).
    pub fn with_nature(mut self, nature: AccountNature) -> Self {
        self.nature = nature;
        self
    }

    /// Reject postings to accounts that cannot take journal lines.
    pub fn ensure_postable(&self) -> DomainResult<()> {
        if self.is_group {
            return Err(DomainError::invariant(format!(
                "account {} is a group and cannot take postings",
                self.code
            )));
        }
        if !self.is_active {
            return Err(DomainError::invariant(format!(
                "account {} is inactive and cannot take postings",
                self.code
            )));
        }
        Ok(())
    }

    /// Balance movement this account records for a `(debit, credit)` line.
    pub fn signed_delta(&self, debit: i64, credit: i64) -> i64 {
        self.nature.signed_amount(debit, credit)
    }
}
