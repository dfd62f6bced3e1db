use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use daftar_accounts::{Account, AccountCode, AccountId, AccountNature, AccountType, Chart};
use daftar_core::{DomainError, DomainResult};

use crate::journal::{Journal, JournalId, JournalLine, JournalStatus};
use crate::posting::BalanceDelta;

/// Slack tolerated in stored data, in minor units. Posting is exact; one
/// unit absorbs rounding in rows imported from elsewhere.
pub const BALANCE_TOLERANCE: i64 = 1;

/// Stored balance disagrees with what the journal lines add up to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDiscrepancy {
    pub account_id: AccountId,
    pub code: AccountCode,
    pub stored_balance: i64,
    pub computed_balance: i64,
}

impl AccountDiscrepancy {
    pub fn difference(&self) -> i64 {
        self.stored_balance - self.computed_balance
    }
}

/// Account whose recomputed balance went negative on its declared side (a
/// debit-nature account below zero, or the credit mirror). The lines behind
/// it need review, which is why this is reported rather than fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatureViolation {
    pub account_id: AccountId,
    pub code: AccountCode,
    pub account_type: AccountType,
    pub nature: AccountNature,
    pub balance: i64,
}

/// Account whose parent id points at nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanedAccount {
    pub account_id: AccountId,
    pub code: AccountCode,
    pub missing_parent: AccountId,
}

/// Journal whose lines do not balance within the tolerance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbalancedJournal {
    pub journal_id: JournalId,
    pub journal_no: Option<i64>,
    pub total_debit: i64,
    pub total_credit: i64,
    pub line_debit: i64,
    pub line_credit: i64,
}

impl UnbalancedJournal {
    pub fn imbalance(&self) -> i64 {
        self.line_debit - self.line_credit
    }
}

/// Accounting equation over the stored balances:
/// assets = liabilities + equity + (revenue - expenses).
///
/// Every term is the natural-positive magnitude for its type; contra
/// balances are converted through the account nature before summing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquationCheck {
    pub assets: i64,
    pub liabilities: i64,
    pub equity: i64,
    pub revenue: i64,
    pub expenses: i64,
    pub difference: i64,
    pub balanced: bool,
}

/// One trial-balance row: the raw net of an account's lines, placed in the
/// debit column when positive and the credit column when negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceRow {
    pub account_id: AccountId,
    pub code: AccountCode,
    pub name: String,
    pub debit: i64,
    pub credit: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalance {
    pub rows: Vec<TrialBalanceRow>,
    pub total_debit: i64,
    pub total_credit: i64,
}

/// Outcome of one audit run. Report-only; fixes are a separate plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub run_at: DateTime<Utc>,
    pub accounts_checked: usize,
    pub journals_checked: usize,
    pub discrepancies: Vec<AccountDiscrepancy>,
    pub nature_violations: Vec<NatureViolation>,
    pub orphaned_accounts: Vec<OrphanedAccount>,
    pub unbalanced_journals: Vec<UnbalancedJournal>,
    pub equation: EquationCheck,
    pub trial_balance: TrialBalance,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
            && self.nature_violations.is_empty()
            && self.orphaned_accounts.is_empty()
            && self.unbalanced_journals.is_empty()
            && self.equation.balanced
    }
}

/// Overwrite a stale stored balance with the recomputed one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceCorrection {
    pub account_id: AccountId,
    pub code: AccountCode,
    pub previous_balance: i64,
    pub corrected_balance: i64,
}

/// Direct balance adjustment against the designated equity account,
/// absorbing whatever residual the corrections cannot explain (legacy
/// unbalanced journals). Always logged, never a one-sided journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquityAdjustment {
    pub account_id: AccountId,
    pub code: AccountCode,
    pub amount: i64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixPlan {
    pub corrections: Vec<BalanceCorrection>,
    pub equity_adjustment: Option<EquityAdjustment>,
}

impl FixPlan {
    pub fn is_empty(&self) -> bool {
        self.corrections.is_empty() && self.equity_adjustment.is_none()
    }
}

fn to_i64(value: i128, what: &str) -> DomainResult<i64> {
    i64::try_from(value).map_err(|_| DomainError::validation(format!("{what} overflows")))
}

/// Sum the equation terms over `(account, balance)` pairs, converting each
/// balance to its type's natural side through the account nature.
fn equation_terms<'a>(
    pairs: impl Iterator<Item = (&'a Account, i64)>,
) -> (i128, i128, i128, i128, i128) {
    let mut assets: i128 = 0;
    let mut liabilities: i128 = 0;
    let mut equity: i128 = 0;
    let mut revenue: i128 = 0;
    let mut expenses: i128 = 0;
    for (account, balance) in pairs {
        let debit_term = match account.nature {
            AccountNature::Debit => i128::from(balance),
            AccountNature::Credit => -i128::from(balance),
        };
        match account.account_type {
            AccountType::Asset => assets += debit_term,
            AccountType::Expense => expenses += debit_term,
            AccountType::Liability => liabilities -= debit_term,
            AccountType::Equity => equity -= debit_term,
            AccountType::Revenue => revenue -= debit_term,
        }
    }
    (assets, liabilities, equity, revenue, expenses)
}

fn equation_difference(terms: (i128, i128, i128, i128, i128)) -> i128 {
    let (assets, liabilities, equity, revenue, expenses) = terms;
    assets - liabilities - equity - revenue + expenses
}

/// Audit the ledger: recompute balances from journal lines, check stored
/// balances, the account tree, per-journal balance and the accounting
/// equation, and produce a trial balance.
///
/// Draft journals are excluded from recomputation; posted and reversed
/// journals both count (a reversed journal's effect is cancelled by its
/// reversal entry, not erased). `adjustments` are the logged balance
/// adjustments of earlier fix runs; they moved balances without journal
/// lines and count toward the computed side.
pub fn run_audit(
    chart: &Chart,
    journals: &[Journal],
    lines: &[JournalLine],
    adjustments: &[BalanceDelta],
    now: DateTime<Utc>,
) -> DomainResult<AuditReport> {
    let included: HashSet<JournalId> = journals
        .iter()
        .filter(|j| matches!(j.status, JournalStatus::Posted | JournalStatus::Reversed))
        .map(|j| j.id)
        .collect();

    // One pass over the lines: per-journal sums for the balance check,
    // per-account nature-signed movements for recomputation, per-account raw
    // sums for the trial balance.
    let mut journal_sums: HashMap<JournalId, (i128, i128)> = HashMap::new();
    let mut computed: HashMap<AccountId, i128> = HashMap::new();
    let mut raw_sums: HashMap<AccountId, (i128, i128)> = HashMap::new();
    for line in lines {
        if !included.contains(&line.journal_id) {
            continue;
        }
        let sums = journal_sums.entry(line.journal_id).or_insert((0, 0));
        sums.0 += i128::from(line.debit);
        sums.1 += i128::from(line.credit);

        let Some(account) = chart.get(line.account_id) else {
            continue;
        };
        *computed.entry(line.account_id).or_insert(0) +=
            i128::from(account.signed_delta(line.debit, line.credit));
        let raw = raw_sums.entry(line.account_id).or_insert((0, 0));
        raw.0 += i128::from(line.debit);
        raw.1 += i128::from(line.credit);
    }
    for adjustment in adjustments {
        *computed.entry(adjustment.account_id).or_insert(0) += i128::from(adjustment.delta);
    }

    let mut unbalanced_journals = Vec::new();
    for journal in journals {
        if !included.contains(&journal.id) {
            continue;
        }
        let (line_debit, line_credit) = journal_sums.get(&journal.id).copied().unwrap_or((0, 0));
        let line_debit = to_i64(line_debit, "journal debit total")?;
        let line_credit = to_i64(line_credit, "journal credit total")?;
        if (line_debit - line_credit).abs() > BALANCE_TOLERANCE {
            unbalanced_journals.push(UnbalancedJournal {
                journal_id: journal.id,
                journal_no: journal.journal_no,
                total_debit: journal.total_debit,
                total_credit: journal.total_credit,
                line_debit,
                line_credit,
            });
        }
    }

    let mut discrepancies = Vec::new();
    let mut nature_violations = Vec::new();
    let mut trial_rows = Vec::new();
    let mut trial_debit: i128 = 0;
    let mut trial_credit: i128 = 0;
    for account in chart.iter() {
        let computed_balance = to_i64(
            computed.get(&account.id).copied().unwrap_or(0),
            "account balance",
        )?;
        // Stored balances must match the lines exactly; the tolerance only
        // softens aggregate checks.
        if account.balance != computed_balance {
            discrepancies.push(AccountDiscrepancy {
                account_id: account.id,
                code: account.code.clone(),
                stored_balance: account.balance,
                computed_balance,
            });
        }
        // Balances are nature-signed, so any negative computed balance means
        // the account moved against its declared side.
        if computed_balance < 0 {
            nature_violations.push(NatureViolation {
                account_id: account.id,
                code: account.code.clone(),
                account_type: account.account_type,
                nature: account.nature,
                balance: computed_balance,
            });
        }
        if let Some((debit, credit)) = raw_sums.get(&account.id) {
            let net = debit - credit;
            if net != 0 {
                let row = TrialBalanceRow {
                    account_id: account.id,
                    code: account.code.clone(),
                    name: account.name.clone(),
                    debit: to_i64(net.max(0), "trial balance debit")?,
                    credit: to_i64((-net).max(0), "trial balance credit")?,
                };
                trial_debit += i128::from(row.debit);
                trial_credit += i128::from(row.credit);
                trial_rows.push(row);
            }
        }
    }

    let orphaned_accounts = chart
        .orphans()
        .into_iter()
        .filter_map(|account| {
            account.parent_id.map(|parent| OrphanedAccount {
                account_id: account.id,
                code: account.code.clone(),
                missing_parent: parent,
            })
        })
        .collect();

    let terms = equation_terms(chart.iter().map(|account| (account, account.balance)));
    let difference = to_i64(equation_difference(terms), "equation difference")?;
    let equation = EquationCheck {
        assets: to_i64(terms.0, "asset total")?,
        liabilities: to_i64(terms.1, "liability total")?,
        equity: to_i64(terms.2, "equity total")?,
        revenue: to_i64(terms.3, "revenue total")?,
        expenses: to_i64(terms.4, "expense total")?,
        difference,
        balanced: difference.abs() <= BALANCE_TOLERANCE,
    };

    Ok(AuditReport {
        run_at: now,
        accounts_checked: chart.len(),
        journals_checked: included.len(),
        discrepancies,
        nature_violations,
        orphaned_accounts,
        unbalanced_journals,
        equation,
        trial_balance: TrialBalance {
            rows: trial_rows,
            total_debit: to_i64(trial_debit, "trial balance debit total")?,
            total_credit: to_i64(trial_credit, "trial balance credit total")?,
        },
    })
}

/// Turn a report into the writes that repair it.
///
/// Stale balances are overwritten with the recomputed values. Whatever
/// difference remains in the equation afterwards can only come from
/// unbalanced journals; that residual is absorbed by a logged adjustment
/// against the designated equity account.
pub fn plan_fixes(
    report: &AuditReport,
    chart: &Chart,
    equity_account: &Account,
) -> DomainResult<FixPlan> {
    if equity_account.account_type != AccountType::Equity {
        return Err(DomainError::validation(format!(
            "fix account {} must be an equity account, got '{}'",
            equity_account.code,
            equity_account.account_type.as_str()
        )));
    }
    if equity_account.nature != AccountNature::Credit {
        return Err(DomainError::validation(format!(
            "fix account {} must carry the normal credit nature",
            equity_account.code
        )));
    }
    if equity_account.is_group || !equity_account.is_active {
        return Err(DomainError::validation(format!(
            "fix account {} must be an active leaf account",
            equity_account.code
        )));
    }

    let corrections: Vec<BalanceCorrection> = report
        .discrepancies
        .iter()
        .map(|d| BalanceCorrection {
            account_id: d.account_id,
            code: d.code.clone(),
            previous_balance: d.stored_balance,
            corrected_balance: d.computed_balance,
        })
        .collect();

    let corrected: HashMap<AccountId, i64> = corrections
        .iter()
        .map(|c| (c.account_id, c.corrected_balance))
        .collect();
    let terms = equation_terms(chart.iter().map(|account| {
        let balance = corrected.get(&account.id).copied().unwrap_or(account.balance);
        (account, balance)
    }));
    let residual = to_i64(equation_difference(terms), "equation residual")?;

    let equity_adjustment = if residual.abs() > BALANCE_TOLERANCE {
        Some(EquityAdjustment {
            account_id: equity_account.id,
            code: equity_account.code.clone(),
            amount: residual,
            reason: format!("audit balancing adjustment, residual {residual} minor units"),
        })
    } else {
        None
    };

    Ok(FixPlan {
        corrections,
        equity_adjustment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use daftar_core::{RecordId, UserId};
    use daftar_documents::{DocumentId, PartyId, SalesInvoice, SourceDocument};

    use crate::posting::{PostingDraft, PostingRules, derive_posting};

    fn account(code: &str, account_type: AccountType) -> Account {
        Account::new(
            AccountId::new(RecordId::new()),
            AccountCode::parse(code).unwrap(),
            format!("Account {code}"),
            account_type,
            None,
            false,
        )
        .unwrap()
    }

    struct World {
        chart: Chart,
        rules: PostingRules,
        equity: AccountId,
        journals: Vec<Journal>,
        lines: Vec<JournalLine>,
    }

    fn world() -> World {
        let ar = account("1.2.1", AccountType::Asset);
        let revenue = account("4.1", AccountType::Revenue);
        let tax = account("2.2.1", AccountType::Liability);
        let cash = account("1.1.1", AccountType::Asset);
        let ap = account("2.1.1", AccountType::Liability);
        let equity = account("3.1", AccountType::Equity);
        let rules = PostingRules {
            accounts_receivable: ar.id,
            sales_revenue: revenue.id,
            tax_payable: tax.id,
            cash: cash.id,
            accounts_payable: ap.id,
        };
        let equity_id = equity.id;
        let chart = Chart::from_accounts([ar, revenue, tax, cash, ap, equity]).unwrap();
        World {
            chart,
            rules,
            equity: equity_id,
            journals: Vec::new(),
            lines: Vec::new(),
        }
    }

    /// Post an invoice and fold the journal, lines and balance deltas into
    /// the world, as the store would at commit.
    fn apply_invoice(world: &mut World, subtotal: i64, tax: i64) -> PostingDraft {
        let document = SourceDocument::SalesInvoice(
            SalesInvoice::draft(
                DocumentId::new(RecordId::new()),
                format!("INV-{:03}", world.journals.len() + 1),
                PartyId::new(RecordId::new()),
                subtotal,
                tax,
                Utc::now(),
            )
            .unwrap(),
        );
        let draft =
            derive_posting(&document, &world.rules, &world.chart, UserId::new(), Utc::now())
                .unwrap();
        apply_draft(world, &draft);
        draft
    }

    fn apply_draft(world: &mut World, draft: &PostingDraft) {
        world.journals.push(draft.journal.clone());
        world.lines.extend(draft.lines.iter().cloned());
        let mut accounts: Vec<Account> = world.chart.iter().cloned().collect();
        for delta in &draft.deltas {
            let account = accounts.iter_mut().find(|a| a.id == delta.account_id).unwrap();
            account.balance += delta.delta;
        }
        world.chart = Chart::from_accounts(accounts).unwrap();
    }

    fn set_balance(world: &mut World, id: AccountId, balance: i64) {
        let accounts: Vec<Account> = world
            .chart
            .iter()
            .cloned()
            .map(|mut a| {
                if a.id == id {
                    a.balance = balance;
                }
                a
            })
            .collect();
        world.chart = Chart::from_accounts(accounts).unwrap();
    }

    fn audit(world: &World) -> AuditReport {
        run_audit(&world.chart, &world.journals, &world.lines, &[], Utc::now()).unwrap()
    }

    #[test]
    fn consistent_ledger_audits_clean() {
        let mut w = world();
        apply_invoice(&mut w, 100_00, 15_00);

        let report = audit(&w);
        assert!(report.is_clean(), "unexpected findings: {report:?}");
        assert_eq!(report.accounts_checked, 6);
        assert_eq!(report.journals_checked, 1);
        assert_eq!(report.equation.assets, 115_00);
        assert_eq!(report.equation.revenue, 100_00);
        assert_eq!(report.equation.liabilities, 15_00);
        assert_eq!(report.equation.difference, 0);
        assert_eq!(report.trial_balance.total_debit, 115_00);
        assert_eq!(report.trial_balance.total_credit, 115_00);
    }

    #[test]
    fn one_unit_drift_is_a_discrepancy_but_keeps_the_equation() {
        let mut w = world();
        apply_invoice(&mut w, 100_00, 0);
        let ar = w.rules.accounts_receivable;
        let stored = w.chart.get(ar).unwrap().balance;
        set_balance(&mut w, ar, stored + 1);

        let report = audit(&w);
        assert!(!report.is_clean());
        assert_eq!(report.discrepancies.len(), 1);
        assert_eq!(report.discrepancies[0].difference(), 1);
        // Within tolerance, the aggregate equation still holds.
        assert!(report.equation.balanced);
        assert_eq!(report.equation.difference, 1);
    }

    #[test]
    fn two_unit_drift_breaks_the_equation() {
        let mut w = world();
        apply_invoice(&mut w, 100_00, 0);
        let ar = w.rules.accounts_receivable;
        let stored = w.chart.get(ar).unwrap().balance;
        set_balance(&mut w, ar, stored + 2);

        let report = audit(&w);
        assert!(!report.equation.balanced);
        assert_eq!(report.equation.difference, 2);
    }

    #[test]
    fn draft_journals_are_excluded_from_recomputation() {
        let mut w = world();
        apply_invoice(&mut w, 50_00, 0);

        let draft_journal = Journal {
            id: JournalId::new(RecordId::new()),
            journal_no: None,
            entry_date: Utc::now(),
            description: "unposted scratch entry".into(),
            total_debit: 10_00,
            total_credit: 10_00,
            status: JournalStatus::Draft,
            source_type: None,
            source_id: None,
            reversal_of: None,
            posted_by: UserId::new(),
            posted_at: Utc::now(),
        };
        w.lines.push(JournalLine::debit(
            draft_journal.id,
            1,
            w.rules.cash,
            10_00,
            None,
        ));
        w.journals.push(draft_journal);

        let report = audit(&w);
        assert!(report.is_clean());
        assert_eq!(report.journals_checked, 1);
    }

    #[test]
    fn unbalanced_journal_is_flagged_beyond_tolerance() {
        let mut w = world();
        let journal_id = JournalId::new(RecordId::new());
        w.journals.push(Journal {
            id: journal_id,
            journal_no: Some(7),
            entry_date: Utc::now(),
            description: "legacy import".into(),
            total_debit: 100_00,
            total_credit: 100_00,
            status: JournalStatus::Posted,
            source_type: None,
            source_id: None,
            reversal_of: None,
            posted_by: UserId::new(),
            posted_at: Utc::now(),
        });
        w.lines.push(JournalLine::debit(journal_id, 1, w.rules.cash, 100_00, None));
        w.lines.push(JournalLine::credit(
            journal_id,
            2,
            w.rules.sales_revenue,
            99_98,
            None,
        ));
        let cash = w.rules.cash;
        let revenue = w.rules.sales_revenue;
        set_balance(&mut w, cash, 100_00);
        set_balance(&mut w, revenue, 99_98);

        let report = audit(&w);
        assert_eq!(report.unbalanced_journals.len(), 1);
        let flagged = &report.unbalanced_journals[0];
        assert_eq!(flagged.journal_no, Some(7));
        assert_eq!(flagged.imbalance(), 2);
    }

    #[test]
    fn one_unit_journal_imbalance_is_tolerated() {
        let mut w = world();
        let journal_id = JournalId::new(RecordId::new());
        w.journals.push(Journal {
            id: journal_id,
            journal_no: Some(8),
            entry_date: Utc::now(),
            description: "rounded import".into(),
            total_debit: 50_00,
            total_credit: 49_99,
            status: JournalStatus::Posted,
            source_type: None,
            source_id: None,
            reversal_of: None,
            posted_by: UserId::new(),
            posted_at: Utc::now(),
        });
        w.lines.push(JournalLine::debit(journal_id, 1, w.rules.cash, 50_00, None));
        w.lines.push(JournalLine::credit(
            journal_id,
            2,
            w.rules.sales_revenue,
            49_99,
            None,
        ));
        let cash = w.rules.cash;
        let revenue = w.rules.sales_revenue;
        set_balance(&mut w, cash, 50_00);
        set_balance(&mut w, revenue, 49_99);

        let report = audit(&w);
        assert!(report.unbalanced_journals.is_empty());
        assert!(report.equation.balanced);
    }

    #[test]
    fn orphaned_parents_are_reported() {
        let mut accounts = vec![
            account("1", AccountType::Asset),
            account("1.9", AccountType::Asset),
        ];
        // A configured contra account with no movement is legal.
        accounts[1].nature = AccountNature::Credit;
        accounts[1].parent_id = Some(AccountId::new(RecordId::new()));
        let chart = Chart::from_accounts(accounts).unwrap();

        let report = run_audit(&chart, &[], &[], &[], Utc::now()).unwrap();
        assert_eq!(report.orphaned_accounts.len(), 1);
        assert_eq!(report.orphaned_accounts[0].code.as_str(), "1.9");
        assert!(report.nature_violations.is_empty());
        assert!(!report.is_clean());
    }

    #[test]
    fn negative_balance_on_the_declared_side_is_flagged() {
        let mut w = world();
        // A balanced journal that drives cash below zero and revenue into
        // debit territory; stored balances agree with the lines.
        let journal_id = JournalId::new(RecordId::new());
        w.journals.push(Journal {
            id: journal_id,
            journal_no: Some(4),
            entry_date: Utc::now(),
            description: "refund without funds".into(),
            total_debit: 100_00,
            total_credit: 100_00,
            status: JournalStatus::Posted,
            source_type: None,
            source_id: None,
            reversal_of: None,
            posted_by: UserId::new(),
            posted_at: Utc::now(),
        });
        w.lines.push(JournalLine::debit(
            journal_id,
            1,
            w.rules.sales_revenue,
            100_00,
            None,
        ));
        w.lines.push(JournalLine::credit(journal_id, 2, w.rules.cash, 100_00, None));
        let cash = w.rules.cash;
        let revenue = w.rules.sales_revenue;
        set_balance(&mut w, cash, -100_00);
        set_balance(&mut w, revenue, -100_00);

        let report = audit(&w);
        // Every other check passes; only the balance signs are wrong.
        assert!(report.discrepancies.is_empty());
        assert!(report.unbalanced_journals.is_empty());
        assert!(report.equation.balanced);
        assert_eq!(report.nature_violations.len(), 2);
        let flagged = report
            .nature_violations
            .iter()
            .find(|v| v.account_id == cash)
            .unwrap();
        assert_eq!(flagged.nature, AccountNature::Debit);
        assert_eq!(flagged.balance, -100_00);
        assert!(!report.is_clean());
    }

    #[test]
    fn logged_adjustments_count_toward_computed_balances() {
        let mut w = world();
        apply_invoice(&mut w, 100_00, 0);
        // a past fix run moved equity directly and logged it
        let equity = w.equity;
        set_balance(&mut w, equity, 25_00);

        let flagged = audit(&w);
        assert_eq!(flagged.discrepancies.len(), 1);

        let adjustments = [BalanceDelta {
            account_id: w.equity,
            delta: 25_00,
        }];
        let report =
            run_audit(&w.chart, &w.journals, &w.lines, &adjustments, Utc::now()).unwrap();
        assert!(report.discrepancies.is_empty());
    }

    #[test]
    fn fix_plan_rewrites_stale_balances() {
        let mut w = world();
        apply_invoice(&mut w, 100_00, 15_00);
        let ar = w.rules.accounts_receivable;
        set_balance(&mut w, ar, 999_00);

        let report = audit(&w);
        let equity = w.chart.get(w.equity).unwrap().clone();
        let plan = plan_fixes(&report, &w.chart, &equity).unwrap();

        assert_eq!(plan.corrections.len(), 1);
        assert_eq!(plan.corrections[0].account_id, ar);
        assert_eq!(plan.corrections[0].previous_balance, 999_00);
        assert_eq!(plan.corrections[0].corrected_balance, 115_00);
        // Corrections alone restore the equation, so no adjustment.
        assert!(plan.equity_adjustment.is_none());
    }

    #[test]
    fn residual_from_unbalanced_journal_lands_on_equity() {
        let mut w = world();
        let journal_id = JournalId::new(RecordId::new());
        w.journals.push(Journal {
            id: journal_id,
            journal_no: Some(3),
            entry_date: Utc::now(),
            description: "one-sided legacy row".into(),
            total_debit: 100_00,
            total_credit: 0,
            status: JournalStatus::Posted,
            source_type: None,
            source_id: None,
            reversal_of: None,
            posted_by: UserId::new(),
            posted_at: Utc::now(),
        });
        w.lines.push(JournalLine::debit(journal_id, 1, w.rules.cash, 100_00, None));

        let report = audit(&w);
        assert_eq!(report.unbalanced_journals.len(), 1);
        // Stored cash is still zero, so it is also a discrepancy.
        assert_eq!(report.discrepancies.len(), 1);

        let equity = w.chart.get(w.equity).unwrap().clone();
        let plan = plan_fixes(&report, &w.chart, &equity).unwrap();
        assert_eq!(plan.corrections.len(), 1);
        let adjustment = plan.equity_adjustment.unwrap();
        assert_eq!(adjustment.account_id, w.equity);
        assert_eq!(adjustment.amount, 100_00);
    }

    #[test]
    fn fix_account_must_be_a_normal_active_equity_leaf() {
        let w = world();
        let report = audit(&w);

        let revenue = w.chart.get(w.rules.sales_revenue).unwrap().clone();
        assert!(plan_fixes(&report, &w.chart, &revenue).is_err());

        let contra = account("3.9", AccountType::Equity).with_nature(AccountNature::Debit);
        assert!(plan_fixes(&report, &w.chart, &contra).is_err());

        let mut group = account("3", AccountType::Equity);
        group.is_group = true;
        assert!(plan_fixes(&report, &w.chart, &group).is_err());

        let mut inactive = account("3.2", AccountType::Equity);
        inactive.is_active = false;
        assert!(plan_fixes(&report, &w.chart, &inactive).is_err());
    }

    #[test]
    fn clean_report_yields_an_empty_plan() {
        let mut w = world();
        apply_invoice(&mut w, 42_00, 0);
        let report = audit(&w);
        let equity = w.chart.get(w.equity).unwrap().clone();
        let plan = plan_fixes(&report, &w.chart, &equity).unwrap();
        assert!(plan.is_empty());
    }
}
