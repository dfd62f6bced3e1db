//! `daftar-accounts` — the chart of accounts.
//!
//! Accounts form a tree addressed by hierarchical dot codes (`1.2.3`). Each
//! account carries a type, a normal-balance nature and a denormalised balance
//! in minor currency units. Group accounts structure the tree and never take
//! postings directly.

pub mod account;
pub mod chart;
pub mod code;

pub use account::{Account, AccountId, AccountNature, AccountType};
pub use chart::Chart;
pub use code::AccountCode;
