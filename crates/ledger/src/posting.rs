use chrono::{DateTime, Utc};

use daftar_accounts::{AccountId, Chart};
use daftar_core::{DomainError, DomainResult, RecordId, UserId};
use daftar_documents::{DocumentStatus, SourceDocument};

use crate::journal::{Journal, JournalId, JournalLine, JournalStatus, ensure_balanced, line_totals};

/// Control accounts the posting engine writes to, resolved from the chart
/// by code once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostingRules {
    pub accounts_receivable: AccountId,
    pub sales_revenue: AccountId,
    pub tax_payable: AccountId,
    pub cash: AccountId,
    pub accounts_payable: AccountId,
}

/// Nature-signed balance movement for one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceDelta {
    pub account_id: AccountId,
    pub delta: i64,
}

pub(crate) fn accumulate(deltas: &mut Vec<BalanceDelta>, account_id: AccountId, delta: i64) {
    if let Some(existing) = deltas.iter_mut().find(|d| d.account_id == account_id) {
        existing.delta += delta;
    } else {
        deltas.push(BalanceDelta { account_id, delta });
    }
}

/// Everything one posting writes: the journal, its lines, and the balance
/// movements for the accounts the lines touch. The store commits all of it
/// in a single transaction or none of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingDraft {
    pub journal: Journal,
    pub lines: Vec<JournalLine>,
    pub deltas: Vec<BalanceDelta>,
}

/// Derive the journal entry a draft document produces.
///
/// Line shape by document kind:
/// - sales invoice: debit receivables for the total, credit revenue for the
///   subtotal, credit tax payable for the tax (omitted when zero)
/// - receipt: debit cash, credit receivables
/// - payment: debit payables, credit cash
pub fn derive_posting(
    document: &SourceDocument,
    rules: &PostingRules,
    chart: &Chart,
    posted_by: UserId,
    now: DateTime<Utc>,
) -> DomainResult<PostingDraft> {
    if document.state().status != DocumentStatus::Draft {
        return Err(DomainError::invariant(format!(
            "cannot post {} {}: status is '{}'",
            document.document_type().label(),
            document.document_number(),
            document.state().status.as_str()
        )));
    }

    let mut movements: Vec<(AccountId, i64, i64)> = Vec::with_capacity(3);
    match document {
        SourceDocument::SalesInvoice(invoice) => {
            movements.push((rules.accounts_receivable, invoice.total, 0));
            movements.push((rules.sales_revenue, 0, invoice.subtotal));
            if invoice.tax_amount > 0 {
                movements.push((rules.tax_payable, 0, invoice.tax_amount));
            }
        }
        SourceDocument::Receipt(receipt) => {
            movements.push((rules.cash, receipt.amount, 0));
            movements.push((rules.accounts_receivable, 0, receipt.amount));
        }
        SourceDocument::Payment(payment) => {
            movements.push((rules.accounts_payable, payment.amount, 0));
            movements.push((rules.cash, 0, payment.amount));
        }
    }

    let journal_id = JournalId::new(RecordId::new());
    let mut lines = Vec::with_capacity(movements.len());
    let mut deltas: Vec<BalanceDelta> = Vec::new();
    for (index, (account_id, debit, credit)) in movements.into_iter().enumerate() {
        let account = chart.require(account_id)?;
        account.ensure_postable()?;
        lines.push(JournalLine {
            journal_id,
            line_no: index as u32 + 1,
            account_id,
            debit,
            credit,
            description: None,
        });
        accumulate(&mut deltas, account_id, account.signed_delta(debit, credit));
    }

    let (total_debit, total_credit) = line_totals(&lines)?;
    ensure_balanced(total_debit, total_credit)?;

    let journal = Journal {
        id: journal_id,
        journal_no: None,
        entry_date: document.entry_date(),
        description: format!(
            "Post {} {}",
            document.document_type().label(),
            document.document_number()
        ),
        total_debit,
        total_credit,
        status: JournalStatus::Posted,
        source_type: Some(document.document_type()),
        source_id: Some(document.id()),
        reversal_of: None,
        posted_by,
        posted_at: now,
    };

    Ok(PostingDraft {
        journal,
        lines,
        deltas,
    })
}
