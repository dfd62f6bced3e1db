use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use daftar_core::{DomainError, DomainResult, UserId};

/// Posting lifecycle of a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Draft,
    Posted,
    Reversed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Posted => "posted",
            DocumentStatus::Reversed => "reversed",
        }
    }
}

impl core::str::FromStr for DocumentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(DocumentStatus::Draft),
            "posted" => Ok(DocumentStatus::Posted),
            "reversed" => Ok(DocumentStatus::Reversed),
            other => Err(DomainError::validation(format!(
                "unknown document status '{other}'"
            ))),
        }
    }
}

/// Lifecycle state shared by every document kind.
///
/// `can_edit` tracks editability alongside the status: drafts are editable,
/// posted documents are frozen, reversing restores editability so the
/// document can be corrected and posted again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingState {
    pub status: DocumentStatus,
    pub can_edit: bool,
    pub posted_at: Option<DateTime<Utc>>,
    pub posted_by: Option<UserId>,
    pub reversed_at: Option<DateTime<Utc>>,
    pub reversal_reason: Option<String>,
}

impl PostingState {
    pub fn draft() -> Self {
        Self {
            status: DocumentStatus::Draft,
            can_edit: true,
            posted_at: None,
            posted_by: None,
            reversed_at: None,
            reversal_reason: None,
        }
    }

    /// Transition `draft -> posted`. Fails for any other starting status.
    pub fn mark_posted(&mut self, by: UserId, at: DateTime<Utc>) -> DomainResult<()> {
        if self.status != DocumentStatus::Draft {
            return Err(DomainError::invariant(format!(
                "cannot post a document in status '{}'",
                self.status.as_str()
            )));
        }
        self.status = DocumentStatus::Posted;
        self.can_edit = false;
        self.posted_at = Some(at);
        self.posted_by = Some(by);
        Ok(())
    }

    /// Transition `posted -> reversed` and restore editability.
    pub fn mark_reversed(
        &mut self,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        if self.status != DocumentStatus::Posted {
            return Err(DomainError::invariant(format!(
                "cannot reverse a document in status '{}'",
                self.status.as_str()
            )));
        }
        self.status = DocumentStatus::Reversed;
        self.can_edit = true;
        self.reversed_at = Some(at);
        self.reversal_reason = Some(reason.into());
        Ok(())
    }
}
