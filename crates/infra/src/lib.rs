//! Infrastructure layer: Postgres storage, migrations, seeding and the
//! application services that drive posting, reversal, allocation and audit.

pub mod db;
pub mod seed;
pub mod services;
pub mod store;

pub use services::{
    AllocationService, AuditOptions, AuditOutcome, AuditService, PostingOutcome, PostingService,
    RuleCodes, ServiceError, ServiceResult, resolve_posting_rules,
};
pub use store::{
    AuditFixWrite, DocumentTransition, InMemoryLedgerStore, LedgerStore, PostedJournal,
    PostgresLedgerStore, PostingWrite, ReversalWrite, StoreError, StoreResult,
};

#[cfg(test)]
mod integration_tests;
