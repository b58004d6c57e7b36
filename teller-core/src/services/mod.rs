//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

pub mod accounts;
pub mod audit;
pub mod auth;
pub mod ledger;
pub mod migration;
pub mod token;

pub use accounts::{AccountService, BalanceView, TransactionPage, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use audit::{AuditEntry, AuditEvent, AuditLog, EntryPoint};
pub use auth::{AuthService, CredentialHasher, LoginSuccess};
pub use ledger::{LedgerReceipt, LedgerService, Reconciliation};
pub use migration::{MigrationResult, MigrationService};
pub use token::{IssuedToken, SessionClaims, TokenService};
