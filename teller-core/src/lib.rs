//! Teller Core - ledger and authentication logic for a retail bank
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core business entities (Account, Transaction, User, etc.)
//! - **ports**: Store traits the engines depend on (LedgerStore, CredentialStore)
//! - **services**: Ledger engine, account queries, auth engine, tokens, audit log
//! - **adapters**: Concrete implementations (DuckDB)
//! - **api**: The facade external callers use, returning result DTOs

pub mod adapters;
pub mod api;
pub mod audit_migrations;
pub mod config;
pub mod domain;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use mockable::{Clock, DefaultClock};

use adapters::duckdb::DuckDbRepository;
use config::Config;
use services::*;

// Re-export commonly used types at crate root
pub use api::{AuthResult, TransactionResult};
pub use domain::result::{Error, ErrorKind, OperationResult};
pub use domain::{
    Account, AccountStatus, AccountType, Customer, DepositRequest, IdempotencyKey,
    OpenAccountRequest, RegisterRequest, Role, Transaction, TransferRequest, UserView,
    WithdrawalRequest,
};
pub use services::EntryPoint;

/// Ledger database file inside the teller directory
pub const LEDGER_DB_FILE: &str = "teller.duckdb";

/// Main context for Teller operations
///
/// This is the primary entry point for all business logic. It holds
/// the database connection, configuration, and all services.
pub struct TellerContext {
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub ledger_service: LedgerService,
    pub account_service: AccountService,
    pub auth_service: AuthService,
    pub audit_log: AuditLog,
}

impl TellerContext {
    /// Open the teller directory with settings from disk and the system clock
    pub fn new(teller_dir: &Path, entry_point: EntryPoint) -> Result<Self> {
        std::fs::create_dir_all(teller_dir)
            .with_context(|| format!("Failed to create {}", teller_dir.display()))?;
        let mut config = Config::load(teller_dir)?;
        if config.ensure_token_secret(teller_dir)? {
            tracing::info!("generated a new token signing secret");
        }
        Self::with_config(teller_dir, config, entry_point, Arc::new(DefaultClock))
    }

    /// Build a context from explicit settings and clock
    pub fn with_config(
        teller_dir: &Path,
        config: Config,
        entry_point: EntryPoint,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let db_path = teller_dir.join(LEDGER_DB_FILE);
        let repository = Arc::new(DuckDbRepository::new(
            &db_path,
            config.ledger.lock_timeout(),
        )?);

        // Initialize schema
        repository.ensure_schema()?;

        let ledger_service = LedgerService::new(
            Arc::clone(&repository),
            Arc::clone(&clock),
            config.ledger.clone(),
        );
        let account_service = AccountService::new(
            Arc::clone(&repository),
            Arc::clone(&clock),
            config.ledger.default_currency.clone(),
        );
        let auth_service =
            AuthService::new(Arc::clone(&repository), clock, config.auth.clone())?;
        let audit_log = AuditLog::new(teller_dir, entry_point, env!("CARGO_PKG_VERSION"))?;

        Ok(Self {
            config,
            repository,
            ledger_service,
            account_service,
            auth_service,
            audit_log,
        })
    }
}
