use std::fmt;
use std::str::FromStr;

use daftar_core::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};

/// Hierarchical account code: dot-separated numeric segments, e.g. `1.2.3`.
///
/// The code encodes the account's position in the tree: `1.2.3` is the third
/// child of `1.2`, which is itself the second child of `1`. Depth in the tree
/// is the segment count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountCode(String);

impl AccountCode {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        if raw.is_empty() {
            return Err(DomainError::validation("account code cannot be empty"));
        }
        for segment in raw.split('.') {
            if segment.is_empty() {
                return Err(DomainError::validation(format!(
                    "account code '{raw}' has an empty segment"
                )));
            }
            if !segment.bytes().all(|b| b.is_ascii_digit()) {
                return Err(DomainError::validation(format!(
                    "account code '{raw}' must contain only digits and dots"
                )));
            }
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Depth in the account tree; a top-level code like `1` is level 1.
    pub fn level(&self) -> u32 {
        self.0.split('.').count() as u32
    }

    /// Code of the parent node, `None` for top-level codes.
    pub fn parent(&self) -> Option<AccountCode> {
        let (head, _) = self.0.rsplit_once('.')?;
        Some(Self(head.to_string()))
    }

    /// Whether `self` names the direct parent of `child`.
    pub fn is_parent_of(&self, child: &AccountCode) -> bool {
        child.parent().as_ref() == Some(self)
    }
}

impl fmt::Display for AccountCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AccountCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AccountCode> for String {
    fn from(code: AccountCode) -> Self {
        code.0
    }
}
