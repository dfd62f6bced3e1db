//! Idempotent seeding of the standard chart and demo documents.

use std::collections::HashMap;

use chrono::Utc;
use tracing::info;

use daftar_accounts::{Account, AccountCode, AccountId, AccountType};
use daftar_core::RecordId;
use daftar_documents::{DocumentId, PartyId, Payment, Receipt, SalesInvoice, SourceDocument};

use crate::services::ServiceResult;
use crate::store::{LedgerStore, StoreError};

/// The standard chart: `(code, name, type, is_group)`.
///
/// Ordered parents-first so each child can link to the id of an account
/// inserted (or found) earlier in the same pass.
const STANDARD_CHART: &[(&str, &str, AccountType, bool)] = &[
    ("1", "Assets", AccountType::Asset, true),
    ("1.1", "Cash & bank", AccountType::Asset, true),
    ("1.1.1", "Cash on hand", AccountType::Asset, false),
    ("1.2", "Receivables", AccountType::Asset, true),
    ("1.2.1", "Accounts receivable", AccountType::Asset, false),
    ("2", "Liabilities", AccountType::Liability, true),
    ("2.1", "Payables", AccountType::Liability, true),
    ("2.1.1", "Accounts payable", AccountType::Liability, false),
    ("2.2", "Tax", AccountType::Liability, true),
    ("2.2.1", "Tax payable", AccountType::Liability, false),
    ("3", "Equity", AccountType::Equity, true),
    ("3.1", "Owner capital", AccountType::Equity, false),
    ("4", "Revenue", AccountType::Revenue, true),
    ("4.1", "Sales revenue", AccountType::Revenue, false),
    ("5", "Expenses", AccountType::Expense, true),
    ("5.1", "General expenses", AccountType::Expense, false),
];

/// Insert every standard account that does not exist yet.
///
/// Safe to run repeatedly: existing codes are left untouched, including
/// their balances.
pub async fn seed_chart<S>(store: &S) -> ServiceResult<usize>
where
    S: LedgerStore + ?Sized,
{
    let mut ids: HashMap<&str, AccountId> = HashMap::new();
    let mut inserted = 0;

    for (code_str, name, account_type, is_group) in STANDARD_CHART {
        let code = AccountCode::parse(code_str)?;
        if let Some(existing) = store.account_by_code(&code).await? {
            ids.insert(code_str, existing.id);
            continue;
        }

        let parent_id = code
            .parent()
            .and_then(|parent| ids.get(parent.as_str()).copied());
        let account = Account::new(
            AccountId::new(RecordId::new()),
            code,
            *name,
            *account_type,
            parent_id,
            *is_group,
        )?;
        store.insert_account(&account).await?;
        ids.insert(code_str, account.id);
        inserted += 1;
    }

    info!(inserted, "chart of accounts seeded");
    Ok(inserted)
}

/// Insert a small set of draft documents to exercise the posting flow.
///
/// Document numbers are fixed, so a re-run hits the unique constraint and
/// skips instead of duplicating.
pub async fn seed_demo_documents<S>(store: &S) -> ServiceResult<usize>
where
    S: LedgerStore + ?Sized,
{
    let customer = PartyId::new(RecordId::new());
    let supplier = PartyId::new(RecordId::new());
    let now = Utc::now();

    let documents = vec![
        SourceDocument::SalesInvoice(SalesInvoice::draft(
            DocumentId::new(RecordId::new()),
            "INV-1001",
            customer,
            1250_00,
            187_50,
            now,
        )?),
        SourceDocument::Receipt(Receipt::draft(
            DocumentId::new(RecordId::new()),
            "RCP-1001",
            customer,
            800_00,
            now,
        )?),
        SourceDocument::Payment(Payment::draft(
            DocumentId::new(RecordId::new()),
            "PAY-1001",
            supplier,
            300_00,
            now,
        )?),
    ];

    let mut inserted = 0;
    for document in &documents {
        match store.insert_document(document).await {
            Ok(()) => {
                info!(
                    document_type = document.document_type().as_str(),
                    number = document.document_number(),
                    id = %document.id(),
                    "demo document created"
                );
                inserted += 1;
            }
            // Fixed numbers collide on re-runs; that means already seeded.
            Err(StoreError::Conflict(_)) => {}
            Err(err) => return Err(err.into()),
        }
    }

    info!(inserted, "demo documents seeded");
    Ok(inserted)
}
