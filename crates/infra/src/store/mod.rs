//! Ledger storage boundary.
//!
//! The trait speaks in domain types and keeps every multi-row write (a
//! posting, a reversal, an audit fix) behind a single atomic commit method.
//! Reads are plain lookups; transactional orchestration never leaks out.

pub mod in_memory;
pub mod postgres;
pub mod traits;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use traits::{
    AuditFixWrite, DocumentTransition, LedgerStore, PostedJournal, PostingWrite, ReversalWrite,
    StoreError, StoreResult,
};
