//! Batch integrity audit over the whole ledger.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use daftar_accounts::AccountCode;
use daftar_ledger::{AuditReport, FixPlan, plan_fixes, run_audit};

use crate::store::{AuditFixWrite, LedgerStore};

use super::{ServiceError, ServiceResult, load_chart};

/// How an audit run behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditOptions {
    /// Write balance corrections and the equity adjustment instead of only
    /// reporting.
    pub fix: bool,
    /// Chart code of the equity account absorbing any residual.
    pub equity_code: String,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            fix: false,
            equity_code: "3.1".to_string(),
        }
    }
}

/// Result of one audit run: the findings, and the fixes if any were applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditOutcome {
    pub report: AuditReport,
    pub applied: Option<FixPlan>,
}

/// Recomputes every balance from journal lines and checks the accounting
/// equation. Report-only by default; in fix mode the corrections and a
/// logged equity adjustment are committed in one transaction.
#[derive(Debug, Clone)]
pub struct AuditService<S> {
    store: Arc<S>,
}

impl<S: LedgerStore> AuditService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, options), fields(fix = options.fix), err)]
    pub async fn run(&self, options: &AuditOptions) -> ServiceResult<AuditOutcome> {
        let chart = load_chart(&*self.store).await?;
        let journals = self.store.journals().await?;
        let lines = self.store.all_journal_lines().await?;
        let adjustments = self.store.balance_adjustments().await?;
        let now = Utc::now();

        let report = run_audit(&chart, &journals, &lines, &adjustments, now)?;
        info!(
            discrepancies = report.discrepancies.len(),
            nature_violations = report.nature_violations.len(),
            orphans = report.orphaned_accounts.len(),
            unbalanced_journals = report.unbalanced_journals.len(),
            equation_balanced = report.equation.balanced,
            "audit completed"
        );

        if !options.fix || report.is_clean() {
            return Ok(AuditOutcome {
                report,
                applied: None,
            });
        }

        let equity_code = AccountCode::parse(&options.equity_code)?;
        let equity = self
            .store
            .account_by_code(&equity_code)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("equity account {equity_code}")))?;

        let plan = plan_fixes(&report, &chart, &equity)?;
        if plan.is_empty() {
            info!("nothing to fix: findings need manual attention");
            return Ok(AuditOutcome {
                report,
                applied: None,
            });
        }

        self.store
            .apply_audit_fixes(AuditFixWrite {
                run_at: now,
                plan: plan.clone(),
            })
            .await?;
        warn!(
            corrections = plan.corrections.len(),
            adjusted = plan.equity_adjustment.is_some(),
            "ledger balances corrected"
        );
        Ok(AuditOutcome {
            report,
            applied: Some(plan),
        })
    }
}
