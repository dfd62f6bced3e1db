//! End-to-end flows over the in-memory store: seed, post, reverse,
//! allocate, audit. The same services run against Postgres unchanged.

use std::sync::Arc;

use chrono::Utc;

use daftar_accounts::{Account, AccountCode, Chart};
use daftar_core::{DomainError, RecordId, UserId};
use daftar_documents::{
    DocumentId, DocumentStatus, DocumentType, PartyId, Receipt, SalesInvoice, SourceDocument,
};
use daftar_ledger::{
    BalanceDelta, Journal, JournalId, JournalLine, JournalStatus, derive_posting,
};

use crate::seed::{seed_chart, seed_demo_documents};
use crate::services::{
    AllocationService, AuditOptions, AuditService, PostingOutcome, PostingService, RuleCodes,
    ServiceError, resolve_posting_rules,
};
use crate::store::{DocumentTransition, InMemoryLedgerStore, LedgerStore, PostingWrite};

struct Harness {
    store: Arc<InMemoryLedgerStore>,
    posting: PostingService<InMemoryLedgerStore>,
    allocation: AllocationService<InMemoryLedgerStore>,
    audit: AuditService<InMemoryLedgerStore>,
    user: UserId,
}

async fn harness() -> Harness {
    let store = Arc::new(InMemoryLedgerStore::new());
    seed_chart(&*store).await.unwrap();
    let rules = resolve_posting_rules(&*store, &RuleCodes::default())
        .await
        .unwrap();
    Harness {
        posting: PostingService::new(Arc::clone(&store), rules),
        allocation: AllocationService::new(Arc::clone(&store)),
        audit: AuditService::new(Arc::clone(&store)),
        store,
        user: UserId::new(),
    }
}

async fn draft_invoice(
    h: &Harness,
    number: &str,
    customer: PartyId,
    subtotal: i64,
    tax: i64,
) -> DocumentId {
    let invoice = SalesInvoice::draft(
        DocumentId::new(RecordId::new()),
        number,
        customer,
        subtotal,
        tax,
        Utc::now(),
    )
    .unwrap();
    let id = invoice.id;
    h.store
        .insert_document(&SourceDocument::SalesInvoice(invoice))
        .await
        .unwrap();
    id
}

async fn draft_receipt(h: &Harness, number: &str, customer: PartyId, amount: i64) -> DocumentId {
    let receipt = Receipt::draft(
        DocumentId::new(RecordId::new()),
        number,
        customer,
        amount,
        Utc::now(),
    )
    .unwrap();
    let id = receipt.id;
    h.store
        .insert_document(&SourceDocument::Receipt(receipt))
        .await
        .unwrap();
    id
}

async fn post(h: &Harness, document_type: DocumentType, id: DocumentId) -> PostingOutcome {
    h.posting.post(document_type, id, h.user).await.unwrap()
}

async fn account_of(h: &Harness, code: &str) -> Account {
    let code = AccountCode::parse(code).unwrap();
    h.store
        .account_by_code(&code)
        .await
        .unwrap()
        .expect("seeded account")
}

async fn balance_of(h: &Harness, code: &str) -> i64 {
    account_of(h, code).await.balance
}

#[tokio::test]
async fn posting_an_invoice_moves_control_balances() {
    let h = harness().await;
    let customer = PartyId::new(RecordId::new());
    let invoice_id = draft_invoice(&h, "INV-2001", customer, 1000_00, 150_00).await;

    let outcome = post(&h, DocumentType::SalesInvoice, invoice_id).await;
    assert_eq!(outcome.journal_no, 1);
    assert_eq!(outcome.reference(), "JE-000001");

    assert_eq!(balance_of(&h, "1.2.1").await, 1150_00);
    assert_eq!(balance_of(&h, "4.1").await, 1000_00);
    assert_eq!(balance_of(&h, "2.2.1").await, 150_00);

    let journal = h
        .store
        .journal(outcome.journal_id)
        .await
        .unwrap()
        .expect("committed journal");
    assert_eq!(journal.status, JournalStatus::Posted);
    assert_eq!(journal.total_debit, 1150_00);
    assert_eq!(journal.total_credit, 1150_00);
    assert_eq!(journal.source_id, Some(invoice_id));
    assert_eq!(
        h.store.journal_lines(outcome.journal_id).await.unwrap().len(),
        3
    );

    let document = h
        .store
        .document(DocumentType::SalesInvoice, invoice_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(document.state().status, DocumentStatus::Posted);
    assert!(!document.state().can_edit);

    let outcome = h.audit.run(&AuditOptions::default()).await.unwrap();
    assert!(outcome.report.is_clean(), "{:?}", outcome.report);
}

#[tokio::test]
async fn posting_twice_is_rejected() {
    let h = harness().await;
    let customer = PartyId::new(RecordId::new());
    let invoice_id = draft_invoice(&h, "INV-2002", customer, 100_00, 0).await;

    post(&h, DocumentType::SalesInvoice, invoice_id).await;
    let err = h
        .posting
        .post(DocumentType::SalesInvoice, invoice_id, h.user)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::InvariantViolation(_))
    ));
}

#[tokio::test]
async fn zero_tax_invoice_posts_two_lines() {
    let h = harness().await;
    let customer = PartyId::new(RecordId::new());
    let invoice_id = draft_invoice(&h, "INV-2003", customer, 250_00, 0).await;

    let outcome = post(&h, DocumentType::SalesInvoice, invoice_id).await;
    let lines = h.store.journal_lines(outcome.journal_id).await.unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(balance_of(&h, "2.2.1").await, 0);
}

#[tokio::test]
async fn reversal_restores_balances_and_editability() {
    let h = harness().await;
    let customer = PartyId::new(RecordId::new());
    let invoice_id = draft_invoice(&h, "INV-2004", customer, 500_00, 0).await;
    let posted = post(&h, DocumentType::SalesInvoice, invoice_id).await;

    let reversal = h
        .posting
        .reverse(
            DocumentType::SalesInvoice,
            invoice_id,
            h.user,
            "entered twice",
        )
        .await
        .unwrap();
    assert_eq!(reversal.journal_no, 2);

    assert_eq!(balance_of(&h, "1.2.1").await, 0);
    assert_eq!(balance_of(&h, "4.1").await, 0);

    let original = h.store.journal(posted.journal_id).await.unwrap().unwrap();
    assert_eq!(original.status, JournalStatus::Reversed);

    let mirror = h.store.journal(reversal.journal_id).await.unwrap().unwrap();
    assert_eq!(mirror.reversal_of, Some(posted.journal_id));
    assert!(mirror.description.contains("entered twice"));

    let original_lines = h.store.journal_lines(posted.journal_id).await.unwrap();
    let mirror_lines = h.store.journal_lines(reversal.journal_id).await.unwrap();
    assert_eq!(original_lines.len(), mirror_lines.len());
    for (original, mirrored) in original_lines.iter().zip(&mirror_lines) {
        assert_eq!(original.account_id, mirrored.account_id);
        assert_eq!(original.debit, mirrored.credit);
        assert_eq!(original.credit, mirrored.debit);
    }

    let document = h
        .store
        .document(DocumentType::SalesInvoice, invoice_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(document.state().status, DocumentStatus::Reversed);
    assert!(document.state().can_edit);
    assert_eq!(
        document.state().reversal_reason.as_deref(),
        Some("entered twice")
    );

    let outcome = h.audit.run(&AuditOptions::default()).await.unwrap();
    assert!(outcome.report.is_clean(), "{:?}", outcome.report);

    // The live posting journal is gone, so a second reversal has nothing
    // to act on.
    let err = h
        .posting
        .reverse(DocumentType::SalesInvoice, invoice_id, h.user, "again")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn allocation_respects_receipt_remainder() {
    let h = harness().await;
    let customer = PartyId::new(RecordId::new());
    let invoice_id = draft_invoice(&h, "INV-2005", customer, 1000_00, 0).await;
    let receipt_id = draft_receipt(&h, "RCP-2005", customer, 600_00).await;
    post(&h, DocumentType::SalesInvoice, invoice_id).await;
    post(&h, DocumentType::Receipt, receipt_id).await;

    let allocation = h
        .allocation
        .allocate(receipt_id, invoice_id, 400_00, h.user)
        .await
        .unwrap();
    assert_eq!(allocation.amount, 400_00);

    // 200_00 of the receipt remains.
    let err = h
        .allocation
        .allocate(receipt_id, invoice_id, 300_00, h.user)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::Validation(_))
    ));

    h.allocation
        .allocate(receipt_id, invoice_id, 200_00, h.user)
        .await
        .unwrap();
    assert_eq!(
        h.store.allocated_from_receipt(receipt_id).await.unwrap(),
        600_00
    );
}

#[tokio::test]
async fn allocation_respects_invoice_outstanding() {
    let h = harness().await;
    let customer = PartyId::new(RecordId::new());
    let invoice_id = draft_invoice(&h, "INV-2006", customer, 500_00, 0).await;
    let first = draft_receipt(&h, "RCP-2006", customer, 400_00).await;
    let second = draft_receipt(&h, "RCP-2007", customer, 300_00).await;
    post(&h, DocumentType::SalesInvoice, invoice_id).await;
    post(&h, DocumentType::Receipt, first).await;
    post(&h, DocumentType::Receipt, second).await;

    h.allocation
        .allocate(first, invoice_id, 400_00, h.user)
        .await
        .unwrap();

    // Only 100_00 of the invoice is still open.
    let err = h
        .allocation
        .allocate(second, invoice_id, 200_00, h.user)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::Validation(_))
    ));

    h.allocation
        .allocate(second, invoice_id, 100_00, h.user)
        .await
        .unwrap();
    assert_eq!(
        h.store.allocated_to_invoice(invoice_id).await.unwrap(),
        500_00
    );
}

#[tokio::test]
async fn allocation_requires_posted_documents_of_one_customer() {
    let h = harness().await;
    let customer = PartyId::new(RecordId::new());
    let invoice_id = draft_invoice(&h, "INV-2007", customer, 100_00, 0).await;
    let receipt_id = draft_receipt(&h, "RCP-2008", customer, 100_00).await;
    post(&h, DocumentType::SalesInvoice, invoice_id).await;

    // Receipt still draft.
    let err = h
        .allocation
        .allocate(receipt_id, invoice_id, 50_00, h.user)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::InvariantViolation(_))
    ));
    post(&h, DocumentType::Receipt, receipt_id).await;

    // Someone else's receipt.
    let stranger = PartyId::new(RecordId::new());
    let foreign_receipt = draft_receipt(&h, "RCP-2009", stranger, 100_00).await;
    post(&h, DocumentType::Receipt, foreign_receipt).await;
    let err = h
        .allocation
        .allocate(foreign_receipt, invoice_id, 50_00, h.user)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::Validation(_))
    ));

    // Unknown receipt id.
    let err = h
        .allocation
        .allocate(DocumentId::new(RecordId::new()), invoice_id, 50_00, h.user)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

/// Post an invoice but drop the revenue balance movement, leaving the
/// stored balance stale the way a buggy migration would.
async fn post_with_stale_revenue(h: &Harness, invoice_id: DocumentId) {
    let chart = Chart::from_accounts(h.store.accounts().await.unwrap()).unwrap();
    let rules = resolve_posting_rules(&*h.store, &RuleCodes::default())
        .await
        .unwrap();
    let mut document = h
        .store
        .document(DocumentType::SalesInvoice, invoice_id)
        .await
        .unwrap()
        .unwrap();
    let draft = derive_posting(&document, &rules, &chart, h.user, Utc::now()).unwrap();
    let revenue = account_of(h, "4.1").await;
    let mut deltas = draft.deltas;
    deltas.retain(|d| d.account_id != revenue.id);
    document.state_mut().mark_posted(h.user, Utc::now()).unwrap();
    h.store
        .commit_posting(PostingWrite {
            journal: draft.journal,
            lines: draft.lines,
            deltas,
            transition: DocumentTransition {
                document_type: DocumentType::SalesInvoice,
                document_id: invoice_id,
                expected_status: DocumentStatus::Draft,
                new_state: document.state().clone(),
            },
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn audit_reports_and_fixes_stale_balances() {
    let h = harness().await;
    let customer = PartyId::new(RecordId::new());
    let invoice_id = draft_invoice(&h, "INV-2008", customer, 1000_00, 150_00).await;
    post_with_stale_revenue(&h, invoice_id).await;

    let outcome = h.audit.run(&AuditOptions::default()).await.unwrap();
    assert_eq!(outcome.report.discrepancies.len(), 1);
    assert_eq!(outcome.report.discrepancies[0].code.as_str(), "4.1");
    assert_eq!(outcome.report.discrepancies[0].stored_balance, 0);
    assert_eq!(outcome.report.discrepancies[0].computed_balance, 1000_00);
    assert!(!outcome.report.equation.balanced);
    assert!(outcome.applied.is_none());

    let fix = AuditOptions {
        fix: true,
        ..AuditOptions::default()
    };
    let outcome = h.audit.run(&fix).await.unwrap();
    let plan = outcome.applied.expect("fixes applied");
    assert_eq!(plan.corrections.len(), 1);
    assert_eq!(plan.corrections[0].corrected_balance, 1000_00);
    assert!(plan.equity_adjustment.is_none());
    assert_eq!(balance_of(&h, "4.1").await, 1000_00);

    let outcome = h.audit.run(&AuditOptions::default()).await.unwrap();
    assert!(outcome.report.is_clean(), "{:?}", outcome.report);
}

#[tokio::test]
async fn report_only_audit_writes_nothing() {
    let h = harness().await;
    let customer = PartyId::new(RecordId::new());
    let invoice_id = draft_invoice(&h, "INV-2009", customer, 300_00, 0).await;
    post_with_stale_revenue(&h, invoice_id).await;

    let outcome = h.audit.run(&AuditOptions::default()).await.unwrap();
    assert!(!outcome.report.is_clean());
    assert!(outcome.applied.is_none());
    assert_eq!(balance_of(&h, "4.1").await, 0);
    assert!(h.store.recorded_fixes().unwrap().is_empty());
}

#[tokio::test]
async fn audit_fix_absorbs_legacy_residual_into_equity() {
    let h = harness().await;
    let customer = PartyId::new(RecordId::new());
    let receipt_id = draft_receipt(&h, "RCP-2010", customer, 50_00).await;

    // A one-sided row imported from the old books: cash debited, nothing
    // credited.
    let mut document = h
        .store
        .document(DocumentType::Receipt, receipt_id)
        .await
        .unwrap()
        .unwrap();
    document.state_mut().mark_posted(h.user, Utc::now()).unwrap();
    let cash = account_of(&h, "1.1.1").await;
    let journal_id = JournalId::new(RecordId::new());
    h.store
        .commit_posting(PostingWrite {
            journal: Journal {
                id: journal_id,
                journal_no: None,
                entry_date: Utc::now(),
                description: "Imported opening entry".to_string(),
                total_debit: 50_00,
                total_credit: 0,
                status: JournalStatus::Posted,
                source_type: Some(DocumentType::Receipt),
                source_id: Some(receipt_id),
                reversal_of: None,
                posted_by: h.user,
                posted_at: Utc::now(),
            },
            lines: vec![JournalLine::debit(journal_id, 1, cash.id, 50_00, None)],
            deltas: vec![BalanceDelta {
                account_id: cash.id,
                delta: 50_00,
            }],
            transition: DocumentTransition {
                document_type: DocumentType::Receipt,
                document_id: receipt_id,
                expected_status: DocumentStatus::Draft,
                new_state: document.state().clone(),
            },
        })
        .await
        .unwrap();

    let fix = AuditOptions {
        fix: true,
        ..AuditOptions::default()
    };
    let outcome = h.audit.run(&fix).await.unwrap();
    assert_eq!(outcome.report.unbalanced_journals.len(), 1);
    assert!(outcome.report.discrepancies.is_empty());
    let plan = outcome.applied.expect("fixes applied");
    assert!(plan.corrections.is_empty());
    let adjustment = plan.equity_adjustment.expect("residual absorbed");
    assert_eq!(adjustment.amount, 50_00);
    assert_eq!(adjustment.code.as_str(), "3.1");
    assert_eq!(balance_of(&h, "3.1").await, 50_00);

    // A second fix run converges: the bad row stays flagged, but the
    // adjustment is accounted for and nothing new is written.
    let outcome = h.audit.run(&fix).await.unwrap();
    assert!(outcome.report.discrepancies.is_empty());
    assert!(outcome.report.equation.balanced);
    assert_eq!(outcome.report.unbalanced_journals.len(), 1);
    assert!(outcome.applied.is_none());
    assert_eq!(h.store.recorded_fixes().unwrap().len(), 1);
}

#[tokio::test]
async fn seeding_is_idempotent() {
    let store = InMemoryLedgerStore::new();
    assert_eq!(seed_chart(&store).await.unwrap(), 16);
    assert_eq!(seed_chart(&store).await.unwrap(), 0);
    assert_eq!(seed_demo_documents(&store).await.unwrap(), 3);
    assert_eq!(seed_demo_documents(&store).await.unwrap(), 0);
}

#[tokio::test]
async fn resolving_rules_needs_a_seeded_chart() {
    let store = InMemoryLedgerStore::new();
    let err = resolve_posting_rules(&store, &RuleCodes::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}
