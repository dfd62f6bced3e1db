//! `daftar` — operational entry point for the posting/ledger engine.

mod args;
mod config;
mod telemetry;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::json;

use daftar_core::{RecordId, UserId};
use daftar_documents::DocumentId;
use daftar_infra::{
    AllocationService, AuditOptions, AuditService, PostingService, PostgresLedgerStore, db,
    resolve_posting_rules, seed,
};

use args::{Cli, Command};
use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url)
        .await
        .context("failed to connect to the database")?;

    match cli.command {
        Command::Migrate => {
            db::run_migrations(&pool)
                .await
                .context("failed to apply migrations")?;
            println!("migrations applied");
        }

        Command::Seed { chart_only } => {
            let store = PostgresLedgerStore::new(pool);
            let accounts = seed::seed_chart(&store).await?;
            let documents = if chart_only {
                0
            } else {
                seed::seed_demo_documents(&store).await?
            };
            println!(
                "{}",
                json!({ "accounts_inserted": accounts, "documents_inserted": documents })
            );
        }

        Command::Post {
            document,
            document_id,
            user,
        } => {
            let store = Arc::new(PostgresLedgerStore::new(pool));
            let rules = resolve_posting_rules(&*store, &config.rule_codes).await?;
            let service = PostingService::new(store, rules);
            let outcome = service
                .post(
                    document.into(),
                    DocumentId::new(RecordId::from_uuid(document_id)),
                    UserId::from(user),
                )
                .await?;
            println!(
                "{}",
                json!({
                    "journal_id": outcome.journal_id,
                    "journal_no": outcome.journal_no,
                    "reference": outcome.reference(),
                })
            );
        }

        Command::Reverse {
            document,
            document_id,
            user,
            reason,
        } => {
            let store = Arc::new(PostgresLedgerStore::new(pool));
            let rules = resolve_posting_rules(&*store, &config.rule_codes).await?;
            let service = PostingService::new(store, rules);
            let outcome = service
                .reverse(
                    document.into(),
                    DocumentId::new(RecordId::from_uuid(document_id)),
                    UserId::from(user),
                    &reason,
                )
                .await?;
            println!(
                "{}",
                json!({
                    "journal_id": outcome.journal_id,
                    "journal_no": outcome.journal_no,
                    "reference": outcome.reference(),
                })
            );
        }

        Command::Allocate {
            receipt,
            invoice,
            amount,
            user,
        } => {
            let store = Arc::new(PostgresLedgerStore::new(pool));
            let service = AllocationService::new(store);
            let allocation = service
                .allocate(
                    DocumentId::new(RecordId::from_uuid(receipt)),
                    DocumentId::new(RecordId::from_uuid(invoice)),
                    amount,
                    UserId::from(user),
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&allocation)?);
        }

        Command::Audit { fix } => {
            let store = Arc::new(PostgresLedgerStore::new(pool));
            let service = AuditService::new(store);
            let outcome = service
                .run(&AuditOptions {
                    fix,
                    equity_code: config.equity_code.clone(),
                })
                .await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "report": outcome.report,
                    "applied": outcome.applied,
                }))?
            );
            if !outcome.report.is_clean() && outcome.applied.is_none() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
