//! Port definitions (hexagonal architecture)
//!
//! Ports define the store seams. The engines depend only on these traits;
//! the DuckDB adapter implements them.
//!
//! Each store exposes read helpers that run outside any explicit transaction
//! and an `atomically` entry point. `atomically` runs the closure inside one
//! database transaction: `Ok` commits, `Err` rolls back. Everything a
//! closure does through its unit is therefore all-or-nothing.

mod credentials;
mod ledger;

pub use credentials::{CredentialStore, CredentialUnit};
pub use ledger::{LedgerStore, LedgerUnit};
