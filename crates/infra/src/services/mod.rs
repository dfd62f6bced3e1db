//! Application services: the operations the CLI drives.
//!
//! Each service composes pure domain logic from `daftar-ledger` and
//! `daftar-receivables` with a [`LedgerStore`]. The services read state, let
//! the domain decide, and hand the store one atomic write. They never apply
//! business rules themselves.

use thiserror::Error;

use daftar_accounts::{AccountCode, AccountId, Chart};
use daftar_core::DomainError;
use daftar_ledger::PostingRules;

use crate::store::{LedgerStore, StoreError};

mod allocation;
mod audit;
mod posting;

pub use allocation::AllocationService;
pub use audit::{AuditOptions, AuditOutcome, AuditService};
pub use posting::{PostingOutcome, PostingService};

/// Failures surfaced by the services, classified for the caller.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Deterministic business failure from the domain layer.
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// A referenced record does not exist.
    #[error("{0} not found")]
    NotFound(String),
    /// Storage failure, including lost status races.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Chart codes of the control accounts the posting engine writes to.
///
/// Held as raw strings so they can come straight from configuration; they
/// are parsed and resolved against the stored chart once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleCodes {
    pub accounts_receivable: String,
    pub sales_revenue: String,
    pub tax_payable: String,
    pub cash: String,
    pub accounts_payable: String,
}

impl Default for RuleCodes {
    fn default() -> Self {
        Self {
            accounts_receivable: "1.2.1".to_string(),
            sales_revenue: "4.1".to_string(),
            tax_payable: "2.2.1".to_string(),
            cash: "1.1.1".to_string(),
            accounts_payable: "2.1.1".to_string(),
        }
    }
}

/// Resolve configured control account codes to chart identifiers.
pub async fn resolve_posting_rules<S>(store: &S, codes: &RuleCodes) -> ServiceResult<PostingRules>
where
    S: LedgerStore + ?Sized,
{
    Ok(PostingRules {
        accounts_receivable: control_account(store, &codes.accounts_receivable).await?,
        sales_revenue: control_account(store, &codes.sales_revenue).await?,
        tax_payable: control_account(store, &codes.tax_payable).await?,
        cash: control_account(store, &codes.cash).await?,
        accounts_payable: control_account(store, &codes.accounts_payable).await?,
    })
}

async fn control_account<S>(store: &S, code: &str) -> ServiceResult<AccountId>
where
    S: LedgerStore + ?Sized,
{
    let code = AccountCode::parse(code)?;
    let account = store
        .account_by_code(&code)
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("control account {code}")))?;
    Ok(account.id)
}

/// Load the full chart of accounts into memory.
///
/// The chart is small (tens to hundreds of rows); posting and auditing both
/// work against an in-memory snapshot of it.
pub(crate) async fn load_chart<S>(store: &S) -> ServiceResult<Chart>
where
    S: LedgerStore + ?Sized,
{
    let accounts = store.accounts().await?;
    Ok(Chart::from_accounts(accounts)?)
}
