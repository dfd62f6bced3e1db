//! Postgres-backed `LedgerStore`.
//!
//! All writes are parameterized statements; table names are chosen by
//! matching on the document kind, never interpolated from input. Posting and
//! reversal run in one transaction each: the document status flip is a
//! compare-and-set `UPDATE ... WHERE status = $expected`, and zero affected
//! rows rolls the whole commit back as a conflict.
//!
//! SQLx errors are mapped to `StoreError` as follows: PostgreSQL error code
//! `23505` (unique violation, e.g. the one-live-posting-journal index) maps
//! to `Conflict`; everything else maps to `Backend`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use daftar_accounts::{Account, AccountCode, AccountId};
use daftar_core::RecordId;
use daftar_documents::{
    DocumentId, DocumentType, PartyId, Payment, PostingState, Receipt, SalesInvoice,
    SourceDocument,
};
use daftar_ledger::{BalanceDelta, Journal, JournalId, JournalLine, JournalStatus};
use daftar_receivables::Allocation;

use super::traits::{
    AuditFixWrite, DocumentTransition, LedgerStore, PostedJournal, PostingWrite, ReversalWrite,
    StoreError, StoreResult,
};
use async_trait::async_trait;
use daftar_core::UserId;

/// Postgres implementation of the ledger storage contract.
///
/// Holds an explicit connection pool handed in at construction; nothing in
/// this crate reaches for global state.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            if let Some(code) = db_err.code() {
                match code.as_ref() {
                    "23505" => {
                        // Unique violation
                        StoreError::Conflict(msg)
                    }
                    _ => StoreError::Backend(msg),
                }
            } else {
                StoreError::Backend(msg)
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::RowNotFound => {
            // Queries here use fetch_optional/fetch_all, so this is unexpected
            StoreError::Backend(format!("unexpected row not found in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn corrupt_row(table: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("corrupt {table} row: {err}"))
}

// Row types. Domain enums live in TEXT columns; conversion failures mean a
// corrupted row and surface as backend errors, never panics.

#[derive(Debug)]
struct AccountRow {
    id: Uuid,
    code: String,
    name: String,
    account_type: String,
    nature: String,
    parent_id: Option<Uuid>,
    is_group: bool,
    balance: i64,
    is_active: bool,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for AccountRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(AccountRow {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            account_type: row.try_get("account_type")?,
            nature: row.try_get("nature")?,
            parent_id: row.try_get("parent_id")?,
            is_group: row.try_get("is_group")?,
            balance: row.try_get("balance")?,
            is_active: row.try_get("is_active")?,
        })
    }
}

impl AccountRow {
    fn into_account(self) -> StoreResult<Account> {
        let code = AccountCode::parse(&self.code).map_err(|e| corrupt_row("accounts", e))?;
        let level = code.level();
        Ok(Account {
            id: AccountId::new(RecordId::from_uuid(self.id)),
            code,
            name: self.name,
            account_type: self
                .account_type
                .parse()
                .map_err(|e| corrupt_row("accounts", e))?,
            nature: self.nature.parse().map_err(|e| corrupt_row("accounts", e))?,
            parent_id: self
                .parent_id
                .map(|p| AccountId::new(RecordId::from_uuid(p))),
            level,
            is_group: self.is_group,
            balance: self.balance,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug)]
struct JournalRow {
    id: Uuid,
    journal_no: i64,
    entry_date: DateTime<Utc>,
    description: String,
    total_debit: i64,
    total_credit: i64,
    status: String,
    source_type: Option<String>,
    source_id: Option<Uuid>,
    reversal_of: Option<Uuid>,
    posted_by: Uuid,
    posted_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for JournalRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(JournalRow {
            id: row.try_get("id")?,
            journal_no: row.try_get("journal_no")?,
            entry_date: row.try_get("entry_date")?,
            description: row.try_get("description")?,
            total_debit: row.try_get("total_debit")?,
            total_credit: row.try_get("total_credit")?,
            status: row.try_get("status")?,
            source_type: row.try_get("source_type")?,
            source_id: row.try_get("source_id")?,
            reversal_of: row.try_get("reversal_of")?,
            posted_by: row.try_get("posted_by")?,
            posted_at: row.try_get("posted_at")?,
        })
    }
}

impl JournalRow {
    fn into_journal(self) -> StoreResult<Journal> {
        let source_type = match self.source_type {
            Some(raw) => Some(raw.parse().map_err(|e| corrupt_row("journals", e))?),
            None => None,
        };
        Ok(Journal {
            id: JournalId::new(RecordId::from_uuid(self.id)),
            journal_no: Some(self.journal_no),
            entry_date: self.entry_date,
            description: self.description,
            total_debit: self.total_debit,
            total_credit: self.total_credit,
            status: self.status.parse().map_err(|e| corrupt_row("journals", e))?,
            source_type,
            source_id: self
                .source_id
                .map(|id| DocumentId::new(RecordId::from_uuid(id))),
            reversal_of: self
                .reversal_of
                .map(|id| JournalId::new(RecordId::from_uuid(id))),
            posted_by: UserId::from(self.posted_by),
            posted_at: self.posted_at,
        })
    }
}

#[derive(Debug)]
struct JournalLineRow {
    journal_id: Uuid,
    line_no: i32,
    account_id: Uuid,
    debit: i64,
    credit: i64,
    description: Option<String>,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for JournalLineRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(JournalLineRow {
            journal_id: row.try_get("journal_id")?,
            line_no: row.try_get("line_no")?,
            account_id: row.try_get("account_id")?,
            debit: row.try_get("debit")?,
            credit: row.try_get("credit")?,
            description: row.try_get("description")?,
        })
    }
}

impl JournalLineRow {
    fn into_line(self) -> JournalLine {
        JournalLine {
            journal_id: JournalId::new(RecordId::from_uuid(self.journal_id)),
            line_no: self.line_no as u32,
            account_id: AccountId::new(RecordId::from_uuid(self.account_id)),
            debit: self.debit,
            credit: self.credit,
            description: self.description,
        }
    }
}

/// Lifecycle columns shared by the three document tables.
#[derive(Debug)]
struct LifecycleColumns {
    status: String,
    can_edit: bool,
    posted_at: Option<DateTime<Utc>>,
    posted_by: Option<Uuid>,
    reversed_at: Option<DateTime<Utc>>,
    reversal_reason: Option<String>,
}

impl LifecycleColumns {
    fn from_pg_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(LifecycleColumns {
            status: row.try_get("status")?,
            can_edit: row.try_get("can_edit")?,
            posted_at: row.try_get("posted_at")?,
            posted_by: row.try_get("posted_by")?,
            reversed_at: row.try_get("reversed_at")?,
            reversal_reason: row.try_get("reversal_reason")?,
        })
    }

    fn into_state(self, table: &str) -> StoreResult<PostingState> {
        Ok(PostingState {
            status: self.status.parse().map_err(|e| corrupt_row(table, e))?,
            can_edit: self.can_edit,
            posted_at: self.posted_at,
            posted_by: self.posted_by.map(UserId::from),
            reversed_at: self.reversed_at,
            reversal_reason: self.reversal_reason,
        })
    }
}

async fn apply_document_transition(
    tx: &mut Transaction<'_, Postgres>,
    transition: &DocumentTransition,
) -> StoreResult<u64> {
    let sql = match transition.document_type {
        DocumentType::SalesInvoice => {
            r#"
            UPDATE sales_invoices
            SET status = $1, can_edit = $2, posted_at = $3, posted_by = $4,
                reversed_at = $5, reversal_reason = $6, updated_at = now()
            WHERE id = $7 AND status = $8
            "#
        }
        DocumentType::Receipt => {
            r#"
            UPDATE receipts
            SET status = $1, can_edit = $2, posted_at = $3, posted_by = $4,
                reversed_at = $5, reversal_reason = $6, updated_at = now()
            WHERE id = $7 AND status = $8
            "#
        }
        DocumentType::Payment => {
            r#"
            UPDATE payments
            SET status = $1, can_edit = $2, posted_at = $3, posted_by = $4,
                reversed_at = $5, reversal_reason = $6, updated_at = now()
            WHERE id = $7 AND status = $8
            "#
        }
    };
    let state = &transition.new_state;
    let result = sqlx::query(sql)
        .bind(state.status.as_str())
        .bind(state.can_edit)
        .bind(state.posted_at)
        .bind(state.posted_by.map(Uuid::from))
        .bind(state.reversed_at)
        .bind(state.reversal_reason.as_deref())
        .bind(Uuid::from(transition.document_id.0))
        .bind(transition.expected_status.as_str())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("update_document_status", e))?;
    Ok(result.rows_affected())
}

/// Insert the journal header; the `journal_no` sequence fills in the number.
async fn insert_journal(
    tx: &mut Transaction<'_, Postgres>,
    journal: &Journal,
) -> StoreResult<i64> {
    let row = sqlx::query(
        r#"
        INSERT INTO journals (
            id, entry_date, description, total_debit, total_credit,
            status, source_type, source_id, reversal_of, posted_by, posted_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING journal_no
        "#,
    )
    .bind(Uuid::from(journal.id.0))
    .bind(journal.entry_date)
    .bind(&journal.description)
    .bind(journal.total_debit)
    .bind(journal.total_credit)
    .bind(journal.status.as_str())
    .bind(journal.source_type.map(|t| t.as_str()))
    .bind(journal.source_id.map(|id| Uuid::from(id.0)))
    .bind(journal.reversal_of.map(|id| Uuid::from(id.0)))
    .bind(Uuid::from(journal.posted_by))
    .bind(journal.posted_at)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_journal", e))?;
    row.try_get("journal_no")
        .map_err(|e| corrupt_row("journals", e))
}

async fn insert_lines(
    tx: &mut Transaction<'_, Postgres>,
    lines: &[JournalLine],
) -> StoreResult<()> {
    for line in lines {
        sqlx::query(
            r#"
            INSERT INTO journal_lines (journal_id, line_no, account_id, debit, credit, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::from(line.journal_id.0))
        .bind(line.line_no as i32)
        .bind(Uuid::from(line.account_id.0))
        .bind(line.debit)
        .bind(line.credit)
        .bind(line.description.as_deref())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_journal_line", e))?;
    }
    Ok(())
}

async fn apply_deltas(
    tx: &mut Transaction<'_, Postgres>,
    deltas: &[BalanceDelta],
) -> StoreResult<()> {
    for delta in deltas {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = balance + $1, updated_at = now()
            WHERE id = $2
            "#,
        )
        .bind(delta.delta)
        .bind(Uuid::from(delta.account_id.0))
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("update_account_balance", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Backend(format!(
                "account {} does not exist",
                delta.account_id
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(skip(self, account), fields(account_code = %account.code), err)]
    async fn insert_account(&self, account: &Account) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, code, name, account_type, nature, parent_id,
                level, is_group, balance, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(Uuid::from(account.id.0))
        .bind(account.code.as_str())
        .bind(&account.name)
        .bind(account.account_type.as_str())
        .bind(account.nature.as_str())
        .bind(account.parent_id.map(|p| Uuid::from(p.0)))
        .bind(account.level as i32)
        .bind(account.is_group)
        .bind(account.balance)
        .bind(account.is_active)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_account", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(account_id = %id), err)]
    async fn account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, code, name, account_type, nature, parent_id,
                   level, is_group, balance, is_active
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id.0))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_account", e))?;
        match row {
            Some(row) => {
                let account = AccountRow::from_row(&row)
                    .map_err(|e| corrupt_row("accounts", e))?
                    .into_account()?;
                Ok(Some(account))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(account_code = %code), err)]
    async fn account_by_code(&self, code: &AccountCode) -> StoreResult<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, code, name, account_type, nature, parent_id,
                   level, is_group, balance, is_active
            FROM accounts
            WHERE code = $1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_account_by_code", e))?;
        match row {
            Some(row) => {
                let account = AccountRow::from_row(&row)
                    .map_err(|e| corrupt_row("accounts", e))?
                    .into_account()?;
                Ok(Some(account))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self), err)]
    async fn accounts(&self) -> StoreResult<Vec<Account>> {
        let rows = sqlx::query(
            r#"
            SELECT id, code, name, account_type, nature, parent_id,
                   level, is_group, balance, is_active
            FROM accounts
            ORDER BY code
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_accounts", e))?;
        let mut accounts = Vec::with_capacity(rows.len());
        for row in rows {
            accounts.push(
                AccountRow::from_row(&row)
                    .map_err(|e| corrupt_row("accounts", e))?
                    .into_account()?,
            );
        }
        Ok(accounts)
    }

    #[instrument(
        skip(self, document),
        fields(document_type = document.document_type().as_str(), document_id = %document.id()),
        err
    )]
    async fn insert_document(&self, document: &SourceDocument) -> StoreResult<()> {
        match document {
            SourceDocument::SalesInvoice(invoice) => {
                let state = &invoice.state;
                sqlx::query(
                    r#"
                    INSERT INTO sales_invoices (
                        id, document_number, customer_id, subtotal, tax_amount, total,
                        issue_date, status, can_edit, posted_at, posted_by,
                        reversed_at, reversal_reason
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                    "#,
                )
                .bind(Uuid::from(invoice.id.0))
                .bind(&invoice.document_number)
                .bind(Uuid::from(invoice.customer_id.0))
                .bind(invoice.subtotal)
                .bind(invoice.tax_amount)
                .bind(invoice.total)
                .bind(invoice.issue_date)
                .bind(state.status.as_str())
                .bind(state.can_edit)
                .bind(state.posted_at)
                .bind(state.posted_by.map(Uuid::from))
                .bind(state.reversed_at)
                .bind(state.reversal_reason.as_deref())
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("insert_sales_invoice", e))?;
            }
            SourceDocument::Receipt(receipt) => {
                let state = &receipt.state;
                sqlx::query(
                    r#"
                    INSERT INTO receipts (
                        id, document_number, customer_id, amount, received_at,
                        status, can_edit, posted_at, posted_by, reversed_at, reversal_reason
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                    "#,
                )
                .bind(Uuid::from(receipt.id.0))
                .bind(&receipt.document_number)
                .bind(Uuid::from(receipt.customer_id.0))
                .bind(receipt.amount)
                .bind(receipt.received_at)
                .bind(state.status.as_str())
                .bind(state.can_edit)
                .bind(state.posted_at)
                .bind(state.posted_by.map(Uuid::from))
                .bind(state.reversed_at)
                .bind(state.reversal_reason.as_deref())
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("insert_receipt", e))?;
            }
            SourceDocument::Payment(payment) => {
                let state = &payment.state;
                sqlx::query(
                    r#"
                    INSERT INTO payments (
                        id, document_number, supplier_id, amount, paid_at,
                        status, can_edit, posted_at, posted_by, reversed_at, reversal_reason
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                    "#,
                )
                .bind(Uuid::from(payment.id.0))
                .bind(&payment.document_number)
                .bind(Uuid::from(payment.supplier_id.0))
                .bind(payment.amount)
                .bind(payment.paid_at)
                .bind(state.status.as_str())
                .bind(state.can_edit)
                .bind(state.posted_at)
                .bind(state.posted_by.map(Uuid::from))
                .bind(state.reversed_at)
                .bind(state.reversal_reason.as_deref())
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("insert_payment", e))?;
            }
        }
        Ok(())
    }

    #[instrument(
        skip(self),
        fields(document_type = document_type.as_str(), document_id = %id),
        err
    )]
    async fn document(
        &self,
        document_type: DocumentType,
        id: DocumentId,
    ) -> StoreResult<Option<SourceDocument>> {
        match document_type {
            DocumentType::SalesInvoice => {
                let row = sqlx::query(
                    r#"
                    SELECT id, document_number, customer_id, subtotal, tax_amount, total,
                           issue_date, status, can_edit, posted_at, posted_by,
                           reversed_at, reversal_reason
                    FROM sales_invoices
                    WHERE id = $1
                    "#,
                )
                .bind(Uuid::from(id.0))
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("load_sales_invoice", e))?;
                let Some(row) = row else { return Ok(None) };
                let state = LifecycleColumns::from_pg_row(&row)
                    .map_err(|e| corrupt_row("sales_invoices", e))?
                    .into_state("sales_invoices")?;
                let invoice = SalesInvoice {
                    id: DocumentId::new(RecordId::from_uuid(
                        row.try_get("id").map_err(|e| corrupt_row("sales_invoices", e))?,
                    )),
                    document_number: row
                        .try_get("document_number")
                        .map_err(|e| corrupt_row("sales_invoices", e))?,
                    customer_id: PartyId::new(RecordId::from_uuid(
                        row.try_get("customer_id")
                            .map_err(|e| corrupt_row("sales_invoices", e))?,
                    )),
                    subtotal: row
                        .try_get("subtotal")
                        .map_err(|e| corrupt_row("sales_invoices", e))?,
                    tax_amount: row
                        .try_get("tax_amount")
                        .map_err(|e| corrupt_row("sales_invoices", e))?,
                    total: row
                        .try_get("total")
                        .map_err(|e| corrupt_row("sales_invoices", e))?,
                    issue_date: row
                        .try_get("issue_date")
                        .map_err(|e| corrupt_row("sales_invoices", e))?,
                    state,
                };
                Ok(Some(SourceDocument::SalesInvoice(invoice)))
            }
            DocumentType::Receipt => {
                let row = sqlx::query(
                    r#"
                    SELECT id, document_number, customer_id, amount, received_at,
                           status, can_edit, posted_at, posted_by, reversed_at, reversal_reason
                    FROM receipts
                    WHERE id = $1
                    "#,
                )
                .bind(Uuid::from(id.0))
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("load_receipt", e))?;
                let Some(row) = row else { return Ok(None) };
                let state = LifecycleColumns::from_pg_row(&row)
                    .map_err(|e| corrupt_row("receipts", e))?
                    .into_state("receipts")?;
                let receipt = Receipt {
                    id: DocumentId::new(RecordId::from_uuid(
                        row.try_get("id").map_err(|e| corrupt_row("receipts", e))?,
                    )),
                    document_number: row
                        .try_get("document_number")
                        .map_err(|e| corrupt_row("receipts", e))?,
                    customer_id: PartyId::new(RecordId::from_uuid(
                        row.try_get("customer_id")
                            .map_err(|e| corrupt_row("receipts", e))?,
                    )),
                    amount: row
                        .try_get("amount")
                        .map_err(|e| corrupt_row("receipts", e))?,
                    received_at: row
                        .try_get("received_at")
                        .map_err(|e| corrupt_row("receipts", e))?,
                    state,
                };
                Ok(Some(SourceDocument::Receipt(receipt)))
            }
            DocumentType::Payment => {
                let row = sqlx::query(
                    r#"
                    SELECT id, document_number, supplier_id, amount, paid_at,
                           status, can_edit, posted_at, posted_by, reversed_at, reversal_reason
                    FROM payments
                    WHERE id = $1
                    "#,
                )
                .bind(Uuid::from(id.0))
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("load_payment", e))?;
                let Some(row) = row else { return Ok(None) };
                let state = LifecycleColumns::from_pg_row(&row)
                    .map_err(|e| corrupt_row("payments", e))?
                    .into_state("payments")?;
                let payment = Payment {
                    id: DocumentId::new(RecordId::from_uuid(
                        row.try_get("id").map_err(|e| corrupt_row("payments", e))?,
                    )),
                    document_number: row
                        .try_get("document_number")
                        .map_err(|e| corrupt_row("payments", e))?,
                    supplier_id: PartyId::new(RecordId::from_uuid(
                        row.try_get("supplier_id")
                            .map_err(|e| corrupt_row("payments", e))?,
                    )),
                    amount: row
                        .try_get("amount")
                        .map_err(|e| corrupt_row("payments", e))?,
                    paid_at: row
                        .try_get("paid_at")
                        .map_err(|e| corrupt_row("payments", e))?,
                    state,
                };
                Ok(Some(SourceDocument::Payment(payment)))
            }
        }
    }

    #[instrument(skip(self), fields(journal_id = %id), err)]
    async fn journal(&self, id: JournalId) -> StoreResult<Option<Journal>> {
        let row = sqlx::query(
            r#"
            SELECT id, journal_no, entry_date, description, total_debit, total_credit,
                   status, source_type, source_id, reversal_of, posted_by, posted_at
            FROM journals
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id.0))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_journal", e))?;
        match row {
            Some(row) => {
                let journal = JournalRow::from_row(&row)
                    .map_err(|e| corrupt_row("journals", e))?
                    .into_journal()?;
                Ok(Some(journal))
            }
            None => Ok(None),
        }
    }

    #[instrument(
        skip(self),
        fields(document_type = document_type.as_str(), document_id = %id),
        err
    )]
    async fn posting_journal_for(
        &self,
        document_type: DocumentType,
        id: DocumentId,
    ) -> StoreResult<Option<Journal>> {
        let row = sqlx::query(
            r#"
            SELECT id, journal_no, entry_date, description, total_debit, total_credit,
                   status, source_type, source_id, reversal_of, posted_by, posted_at
            FROM journals
            WHERE source_type = $1 AND source_id = $2
              AND reversal_of IS NULL AND status = $3
            "#,
        )
        .bind(document_type.as_str())
        .bind(Uuid::from(id.0))
        .bind(JournalStatus::Posted.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_posting_journal", e))?;
        match row {
            Some(row) => {
                let journal = JournalRow::from_row(&row)
                    .map_err(|e| corrupt_row("journals", e))?
                    .into_journal()?;
                Ok(Some(journal))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(journal_id = %id), err)]
    async fn journal_lines(&self, id: JournalId) -> StoreResult<Vec<JournalLine>> {
        let rows = sqlx::query(
            r#"
            SELECT journal_id, line_no, account_id, debit, credit, description
            FROM journal_lines
            WHERE journal_id = $1
            ORDER BY line_no
            "#,
        )
        .bind(Uuid::from(id.0))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_journal_lines", e))?;
        let mut lines = Vec::with_capacity(rows.len());
        for row in rows {
            lines.push(
                JournalLineRow::from_row(&row)
                    .map_err(|e| corrupt_row("journal_lines", e))?
                    .into_line(),
            );
        }
        Ok(lines)
    }

    #[instrument(skip(self), err)]
    async fn journals(&self) -> StoreResult<Vec<Journal>> {
        let rows = sqlx::query(
            r#"
            SELECT id, journal_no, entry_date, description, total_debit, total_credit,
                   status, source_type, source_id, reversal_of, posted_by, posted_at
            FROM journals
            ORDER BY journal_no
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_journals", e))?;
        let mut journals = Vec::with_capacity(rows.len());
        for row in rows {
            journals.push(
                JournalRow::from_row(&row)
                    .map_err(|e| corrupt_row("journals", e))?
                    .into_journal()?,
            );
        }
        Ok(journals)
    }

    #[instrument(skip(self), err)]
    async fn all_journal_lines(&self) -> StoreResult<Vec<JournalLine>> {
        let rows = sqlx::query(
            r#"
            SELECT journal_id, line_no, account_id, debit, credit, description
            FROM journal_lines
            ORDER BY journal_id, line_no
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_all_journal_lines", e))?;
        let mut lines = Vec::with_capacity(rows.len());
        for row in rows {
            lines.push(
                JournalLineRow::from_row(&row)
                    .map_err(|e| corrupt_row("journal_lines", e))?
                    .into_line(),
            );
        }
        Ok(lines)
    }

    #[instrument(skip(self, allocation), fields(allocation_id = %allocation.id), err)]
    async fn insert_allocation(&self, allocation: &Allocation) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO allocations (id, receipt_id, invoice_id, amount, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::from(allocation.id.0))
        .bind(Uuid::from(allocation.receipt_id.0))
        .bind(Uuid::from(allocation.invoice_id.0))
        .bind(allocation.amount)
        .bind(Uuid::from(allocation.created_by))
        .bind(allocation.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_allocation", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(receipt_id = %receipt_id), err)]
    async fn allocated_from_receipt(&self, receipt_id: DocumentId) -> StoreResult<i64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount), 0)::BIGINT AS total
            FROM allocations
            WHERE receipt_id = $1
            "#,
        )
        .bind(Uuid::from(receipt_id.0))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("sum_receipt_allocations", e))?;
        row.try_get("total")
            .map_err(|e| corrupt_row("allocations", e))
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id), err)]
    async fn allocated_to_invoice(&self, invoice_id: DocumentId) -> StoreResult<i64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount), 0)::BIGINT AS total
            FROM allocations
            WHERE invoice_id = $1
            "#,
        )
        .bind(Uuid::from(invoice_id.0))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("sum_invoice_allocations", e))?;
        row.try_get("total")
            .map_err(|e| corrupt_row("allocations", e))
    }

    #[instrument(skip(self), err)]
    async fn balance_adjustments(&self) -> StoreResult<Vec<BalanceDelta>> {
        let rows = sqlx::query(
            r#"
            SELECT account_id, COALESCE(SUM(amount), 0)::BIGINT AS total
            FROM audit_adjustments
            GROUP BY account_id
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("sum_audit_adjustments", e))?;
        let mut adjustments = Vec::with_capacity(rows.len());
        for row in rows {
            let account_id: Uuid = row
                .try_get("account_id")
                .map_err(|e| corrupt_row("audit_adjustments", e))?;
            let delta: i64 = row
                .try_get("total")
                .map_err(|e| corrupt_row("audit_adjustments", e))?;
            adjustments.push(BalanceDelta {
                account_id: AccountId::new(RecordId::from_uuid(account_id)),
                delta,
            });
        }
        Ok(adjustments)
    }

    #[instrument(
        skip(self, write),
        fields(
            journal_id = %write.journal.id,
            document_id = %write.transition.document_id,
            line_count = write.lines.len()
        ),
        err
    )]
    async fn commit_posting(&self, write: PostingWrite) -> StoreResult<PostedJournal> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Compare-and-set on the document row decides the race. Losing it
        // means someone else posted first.
        let updated = apply_document_transition(&mut tx, &write.transition).await?;
        if updated == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Conflict(format!(
                "document {} is no longer '{}'",
                write.transition.document_id,
                write.transition.expected_status.as_str()
            )));
        }

        let journal_no = insert_journal(&mut tx, &write.journal).await?;
        insert_lines(&mut tx, &write.lines).await?;
        apply_deltas(&mut tx, &write.deltas).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(PostedJournal {
            journal_id: write.journal.id,
            journal_no,
        })
    }

    #[instrument(
        skip(self, write),
        fields(
            journal_id = %write.journal.id,
            original_journal = %write.original_journal,
            document_id = %write.transition.document_id
        ),
        err
    )]
    async fn commit_reversal(&self, write: ReversalWrite) -> StoreResult<PostedJournal> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let updated = apply_document_transition(&mut tx, &write.transition).await?;
        if updated == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Conflict(format!(
                "document {} is no longer '{}'",
                write.transition.document_id,
                write.transition.expected_status.as_str()
            )));
        }

        // Same guard on the original journal, so two reversals cannot both
        // land even if they raced past the document check.
        let marked = sqlx::query(
            r#"
            UPDATE journals
            SET status = $1
            WHERE id = $2 AND status = $3
            "#,
        )
        .bind(JournalStatus::Reversed.as_str())
        .bind(Uuid::from(write.original_journal.0))
        .bind(JournalStatus::Posted.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("mark_journal_reversed", e))?;
        if marked.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Conflict(format!(
                "journal {} is no longer posted",
                write.original_journal
            )));
        }

        let journal_no = insert_journal(&mut tx, &write.journal).await?;
        insert_lines(&mut tx, &write.lines).await?;
        apply_deltas(&mut tx, &write.deltas).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(PostedJournal {
            journal_id: write.journal.id,
            journal_no,
        })
    }

    #[instrument(
        skip(self, write),
        fields(
            corrections = write.plan.corrections.len(),
            adjustment = write.plan.equity_adjustment.is_some()
        ),
        err
    )]
    async fn apply_audit_fixes(&self, write: AuditFixWrite) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        for correction in &write.plan.corrections {
            let result = sqlx::query(
                r#"
                UPDATE accounts
                SET balance = $1, updated_at = now()
                WHERE id = $2
                "#,
            )
            .bind(correction.corrected_balance)
            .bind(Uuid::from(correction.account_id.0))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("correct_account_balance", e))?;
            if result.rows_affected() == 0 {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(StoreError::Backend(format!(
                    "account {} does not exist",
                    correction.account_id
                )));
            }
        }

        if let Some(adjustment) = &write.plan.equity_adjustment {
            let result = sqlx::query(
                r#"
                UPDATE accounts
                SET balance = balance + $1, updated_at = now()
                WHERE id = $2
                "#,
            )
            .bind(adjustment.amount)
            .bind(Uuid::from(adjustment.account_id.0))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("apply_equity_adjustment", e))?;
            if result.rows_affected() == 0 {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(StoreError::Backend(format!(
                    "account {} does not exist",
                    adjustment.account_id
                )));
            }

            let corrections = serde_json::to_value(&write.plan.corrections)
                .map_err(|e| StoreError::Backend(format!("serialize corrections: {e}")))?;
            sqlx::query(
                r#"
                INSERT INTO audit_adjustments (id, run_at, account_id, amount, reason, corrections)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::from(RecordId::new()))
            .bind(write.run_at)
            .bind(Uuid::from(adjustment.account_id.0))
            .bind(adjustment.amount)
            .bind(&adjustment.reason)
            .bind(corrections)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("log_audit_adjustment", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }
}
