//! Ledger store port - accounts, the transaction log and idempotency keys

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{Account, AccountStatus, IdempotencyKey, IdempotencyRecord, Transaction};

/// Operations available while holding the store
///
/// Inside `LedgerStore::atomically` every call belongs to the same database
/// transaction. Inside `LedgerStore::read` each call sees committed data only.
pub trait LedgerUnit {
    // === Accounts ===

    fn get_account(&self, id: Uuid) -> Result<Option<Account>>;

    fn get_account_by_number(&self, account_number: &str) -> Result<Option<Account>>;

    /// Accounts of one owner, newest opened first
    fn get_accounts_by_owner(&self, owner_id: Uuid) -> Result<Vec<Account>>;

    fn insert_account(&self, account: &Account) -> Result<()>;

    /// Set the balance and stamp the last movement time
    fn update_balance(&self, id: Uuid, balance: Decimal, at: DateTime<Utc>) -> Result<()>;

    fn set_account_status(
        &self,
        id: Uuid,
        status: AccountStatus,
        closed_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    // === Transaction log ===

    fn reference_exists(&self, reference_number: &str) -> Result<bool>;

    /// Append a record, returning its store-assigned sequence number
    fn insert_transaction(&self, tx: &Transaction) -> Result<i64>;

    fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>>;

    fn get_transaction_by_reference(&self, reference_number: &str)
        -> Result<Option<Transaction>>;

    /// Records where the account is the source or the counterparty,
    /// newest first
    fn get_account_transactions(
        &self,
        account_id: Uuid,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<Transaction>>;

    fn count_account_transactions(&self, account_id: Uuid) -> Result<u64>;

    /// Every completed record touching the account, oldest first
    fn get_completed_transactions_involving(&self, account_id: Uuid) -> Result<Vec<Transaction>>;

    // === Idempotency ===

    fn find_idempotency(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>>;

    fn insert_idempotency(&self, record: &IdempotencyRecord) -> Result<()>;
}

/// Durable home of accounts and the transaction log
pub trait LedgerStore: Send + Sync {
    /// Run `f` inside one database transaction; `Ok` commits, `Err` rolls back
    fn atomically<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn LedgerUnit) -> Result<T>;

    /// Run read-only queries against committed state
    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn LedgerUnit) -> Result<T>;
}
