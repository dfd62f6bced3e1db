//! Command-line surface of the `daftar` binary.

use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use daftar_documents::DocumentType;

/// Double-entry posting, reversal, AR allocation and ledger audit.
#[derive(Parser, Debug)]
#[command(name = "daftar", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply pending database migrations in order.
    Migrate,

    /// Install the standard chart of accounts and demo documents.
    ///
    /// Idempotent: existing accounts and document numbers are left alone.
    Seed {
        /// Seed only the chart, no demo documents.
        #[arg(long)]
        chart_only: bool,
    },

    /// Post a draft document, writing its balanced journal entry.
    Post {
        /// Kind of the document to post.
        #[arg(value_enum)]
        document: DocumentKind,
        /// Id of the document.
        document_id: Uuid,
        /// Acting user.
        #[arg(long)]
        user: Uuid,
    },

    /// Reverse a posted document with an equal-and-opposite entry.
    Reverse {
        /// Kind of the document to reverse.
        #[arg(value_enum)]
        document: DocumentKind,
        /// Id of the document.
        document_id: Uuid,
        /// Acting user.
        #[arg(long)]
        user: Uuid,
        /// Why the posting is being undone.
        #[arg(long)]
        reason: String,
    },

    /// Allocate part of a posted receipt against a posted invoice.
    Allocate {
        /// Id of the receipt.
        #[arg(long)]
        receipt: Uuid,
        /// Id of the invoice.
        #[arg(long)]
        invoice: Uuid,
        /// Amount in currency units, e.g. 1250.00.
        #[arg(long, value_parser = parse_amount)]
        amount: i64,
        /// Acting user.
        #[arg(long)]
        user: Uuid,
    },

    /// Recompute balances from journal lines and check the accounting
    /// equation. Read-only unless --fix is given.
    Audit {
        /// Write balance corrections and a logged equity adjustment.
        #[arg(long)]
        fix: bool,
    },
}

/// Document kinds as spelled on the command line.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum DocumentKind {
    Invoice,
    Receipt,
    Payment,
}

impl From<DocumentKind> for DocumentType {
    fn from(kind: DocumentKind) -> Self {
        match kind {
            DocumentKind::Invoice => DocumentType::SalesInvoice,
            DocumentKind::Receipt => DocumentType::Receipt,
            DocumentKind::Payment => DocumentType::Payment,
        }
    }
}

/// Parse a positive decimal amount ("1250", "1250.5", "1250.50") into minor
/// currency units.
pub fn parse_amount(raw: &str) -> Result<i64, String> {
    let (units, cents) = match raw.split_once('.') {
        Some((units, cents)) => (units, cents),
        None => (raw, ""),
    };
    if units.is_empty() || !units.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("invalid amount '{raw}'"));
    }
    if cents.len() > 2 || !cents.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!(
            "invalid amount '{raw}': at most two decimal places"
        ));
    }
    let units: i64 = units
        .parse()
        .map_err(|_| format!("amount '{raw}' is out of range"))?;
    let minor: i64 = if cents.is_empty() {
        0
    } else if cents.len() == 1 {
        cents.parse::<i64>().map_err(|_| format!("invalid amount '{raw}'"))? * 10
    } else {
        cents.parse().map_err(|_| format!("invalid amount '{raw}'"))?
    };
    units
        .checked_mul(100)
        .and_then(|v| v.checked_add(minor))
        .ok_or_else(|| format!("amount '{raw}' is out of range"))
}
