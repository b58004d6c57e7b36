//! DuckDB repository implementation
//!
//! One connection, guarded by a `parking_lot::Mutex`, serves every store
//! operation. Waiting for the guard is bounded by the configured lock
//! timeout; a caller that cannot get it fails with `Error::Busy` instead of
//! queueing forever.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use duckdb::{params, Connection};
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::{is_transient_storage_error, Error, Result};
use crate::domain::{
    Account, AccountStatus, Customer, IdempotencyKey, IdempotencyRecord, PayloadHash,
    Transaction, User,
};
use crate::ports::{CredentialStore, CredentialUnit, LedgerStore, LedgerUnit};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const ACCOUNT_COLUMNS: &str = "account_id, owner_id, account_number, account_type, \
     balance::VARCHAR, currency, status, interest_rate::VARCHAR, opened_at, closed_at, \
     last_transaction_at";

const TRANSACTION_COLUMNS: &str = "transaction_id, seq, account_id, transaction_type, \
     amount::VARCHAR, currency, created_at, description, status, counterparty_account_id, \
     reference_number, balance_after::VARCHAR, created_by";

const USER_COLUMNS: &str = "user_id, username, password_hash, email, full_name, role, \
     is_active, created_at, last_login_at, failed_login_attempts, locked_until";

const CUSTOMER_COLUMNS: &str = "customer_id, user_id, first_name, last_name, middle_name, \
     date_of_birth::VARCHAR, email, phone_number, passport_number, address, city, country, \
     is_active, created_at, updated_at";

/// DuckDB repository implementation
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
    lock_timeout: Duration,
}

impl DuckDbRepository {
    /// Open (or create) the database file
    ///
    /// Includes retry logic with exponential backoff for file locking errors,
    /// which occur when another process holds the file at startup.
    pub fn new(db_path: &Path, lock_timeout: Duration) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                        lock_timeout,
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_transient_storage_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            error = %err_msg,
                            "database busy, retrying"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::Transient(format!(
                "Failed to open database after {} retries",
                MAX_RETRIES
            ))
        }))
    }

    /// In-memory database, used by tests and dry runs
    pub fn open_in_memory(lock_timeout: Duration) -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
            lock_timeout,
        })
    }

    /// Attempt to open a database connection (called by new() with retry logic)
    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading stays off; nothing here needs extensions
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.connection()?;
        MigrationService::new(&conn)
            .run_pending()
            .map_err(|e| Error::database(format!("{:#}", e)))
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        let result = self.run_migrations()?;
        if !result.applied.is_empty() {
            tracing::info!(applied = ?result.applied, "database schema upgraded");
        }
        Ok(())
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Acquire the connection, waiting at most the lock timeout
    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.try_lock_for(self.lock_timeout).ok_or_else(|| {
            tracing::warn!(
                timeout_ms = self.lock_timeout.as_millis() as u64,
                "store lock wait timed out"
            );
            Error::Busy(format!(
                "store lock not acquired within {}ms",
                self.lock_timeout.as_millis()
            ))
        })
    }

    fn in_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&DuckDbUnit<'_>) -> Result<T>,
    {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let outcome = f(&DuckDbUnit { conn: &tx });
        match outcome {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    tracing::error!(error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }

    fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&DuckDbUnit<'_>) -> Result<T>,
    {
        let conn = self.connection()?;
        f(&DuckDbUnit { conn: &conn })
    }
}

impl LedgerStore for DuckDbRepository {
    fn atomically<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn LedgerUnit) -> Result<T>,
    {
        self.in_transaction(|unit| f(unit))
    }

    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn LedgerUnit) -> Result<T>,
    {
        self.with_connection(|unit| f(unit))
    }
}

impl CredentialStore for DuckDbRepository {
    fn atomically<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn CredentialUnit) -> Result<T>,
    {
        self.in_transaction(|unit| f(unit))
    }

    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn CredentialUnit) -> Result<T>,
    {
        self.with_connection(|unit| f(unit))
    }
}

/// Store operations bound to a held connection (and possibly an open
/// transaction)
pub struct DuckDbUnit<'c> {
    conn: &'c Connection,
}

impl LedgerUnit for DuckDbUnit<'_> {
    fn get_account(&self, id: Uuid) -> Result<Option<Account>> {
        let sql = format!("SELECT {} FROM accounts WHERE account_id = ?", ACCOUNT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(AccountRow::from_row(row)?.into_account()?)),
            None => Ok(None),
        }
    }

    fn get_account_by_number(&self, account_number: &str) -> Result<Option<Account>> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE account_number = ?",
            ACCOUNT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![account_number])?;
        match rows.next()? {
            Some(row) => Ok(Some(AccountRow::from_row(row)?.into_account()?)),
            None => Ok(None),
        }
    }

    fn get_accounts_by_owner(&self, owner_id: Uuid) -> Result<Vec<Account>> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE owner_id = ? ORDER BY opened_at DESC, account_number",
            ACCOUNT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![owner_id.to_string()], AccountRow::from_row)?;

        let mut accounts = Vec::new();
        for row in rows {
            accounts.push(row?.into_account()?);
        }
        Ok(accounts)
    }

    fn insert_account(&self, account: &Account) -> Result<()> {
        self.conn.execute(
            "INSERT INTO accounts (
                account_id, owner_id, account_number, account_type, balance, currency,
                status, interest_rate, opened_at, closed_at, last_transaction_at
            ) VALUES (?, ?, ?, ?, CAST(? AS DECIMAL(18,2)), ?, ?, CAST(? AS DECIMAL(9,4)), ?, ?, ?)",
            params![
                account.id.to_string(),
                account.owner_id.to_string(),
                &account.account_number,
                account.account_type.as_str(),
                account.balance.to_string(),
                &account.currency,
                account.status.as_str(),
                account.interest_rate.to_string(),
                format_timestamp(account.opened_at),
                account.closed_at.map(format_timestamp),
                account.last_transaction_at.map(format_timestamp),
            ],
        )?;
        Ok(())
    }

    fn update_balance(&self, id: Uuid, balance: Decimal, at: DateTime<Utc>) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE accounts
             SET balance = CAST(? AS DECIMAL(18,2)), last_transaction_at = ?
             WHERE account_id = ?",
            params![balance.to_string(), format_timestamp(at), id.to_string()],
        )?;
        if updated != 1 {
            return Err(Error::integrity(format!(
                "balance update touched {} rows for account {}",
                updated, id
            )));
        }
        Ok(())
    }

    fn set_account_status(
        &self,
        id: Uuid,
        status: AccountStatus,
        closed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE accounts SET status = ?, closed_at = ? WHERE account_id = ?",
            params![
                status.as_str(),
                closed_at.map(format_timestamp),
                id.to_string()
            ],
        )?;
        if updated != 1 {
            return Err(Error::AccountNotFound(id));
        }
        Ok(())
    }

    fn reference_exists(&self, reference_number: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE reference_number = ?",
            params![reference_number],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn insert_transaction(&self, tx: &Transaction) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO transactions (
                transaction_id, account_id, transaction_type, amount, currency, created_at,
                description, status, counterparty_account_id, reference_number,
                balance_after, created_by
            ) VALUES (?, ?, ?, CAST(? AS DECIMAL(18,2)), ?, ?, ?, ?, ?, ?, CAST(? AS DECIMAL(18,2)), ?)",
            params![
                tx.id.to_string(),
                tx.account_id.to_string(),
                tx.transaction_type.as_str(),
                tx.amount.to_string(),
                &tx.currency,
                format_timestamp(tx.created_at),
                &tx.description,
                tx.status.as_str(),
                tx.counterparty_account_id.map(|id| id.to_string()),
                &tx.reference_number,
                tx.balance_after.map(|b| b.to_string()),
                &tx.created_by,
            ],
        )?;

        let seq: i64 = self.conn.query_row(
            "SELECT seq FROM transactions WHERE transaction_id = ?",
            params![tx.id.to_string()],
            |row| row.get(0),
        )?;
        Ok(seq)
    }

    fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE transaction_id = ?",
            TRANSACTION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(TransactionRow::from_row(row)?.into_transaction()?)),
            None => Ok(None),
        }
    }

    fn get_transaction_by_reference(
        &self,
        reference_number: &str,
    ) -> Result<Option<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE reference_number = ?",
            TRANSACTION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![reference_number])?;
        match rows.next()? {
            Some(row) => Ok(Some(TransactionRow::from_row(row)?.into_transaction()?)),
            None => Ok(None),
        }
    }

    fn get_account_transactions(
        &self,
        account_id: Uuid,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions
             WHERE account_id = ? OR counterparty_account_id = ?
             ORDER BY seq DESC
             LIMIT ? OFFSET ?",
            TRANSACTION_COLUMNS
        );
        let id = account_id.to_string();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![&id, &id, limit as i64, offset as i64],
            TransactionRow::from_row,
        )?;

        let mut transactions = Vec::new();
        for row in rows {
            transactions.push(row?.into_transaction()?);
        }
        Ok(transactions)
    }

    fn count_account_transactions(&self, account_id: Uuid) -> Result<u64> {
        let id = account_id.to_string();
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM transactions
             WHERE account_id = ? OR counterparty_account_id = ?",
            params![&id, &id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn get_completed_transactions_involving(&self, account_id: Uuid) -> Result<Vec<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions
             WHERE (account_id = ? OR counterparty_account_id = ?) AND status = 'Completed'
             ORDER BY seq",
            TRANSACTION_COLUMNS
        );
        let id = account_id.to_string();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![&id, &id], TransactionRow::from_row)?;

        let mut transactions = Vec::new();
        for row in rows {
            transactions.push(row?.into_transaction()?);
        }
        Ok(transactions)
    }

    fn find_idempotency(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT idempotency_key, operation, request_hash, transaction_id, created_at
             FROM idempotency_keys WHERE idempotency_key = ?",
        )?;
        let mut rows = stmt.query(params![key.to_string()])?;
        let row = match rows.next()? {
            Some(row) => row,
            None => return Ok(None),
        };

        let key_str: String = row.get(0)?;
        let operation: String = row.get(1)?;
        let request_hash: String = row.get(2)?;
        let transaction_id: String = row.get(3)?;
        let created_at: String = row.get(4)?;

        Ok(Some(IdempotencyRecord {
            key: IdempotencyKey::from_uuid(parse_uuid(&key_str)?),
            operation: operation.parse().map_err(Error::database)?,
            request_hash: PayloadHash::from_hex(request_hash),
            transaction_id: parse_uuid(&transaction_id)?,
            created_at: parse_timestamp(&created_at)?,
        }))
    }

    fn insert_idempotency(&self, record: &IdempotencyRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO idempotency_keys (
                idempotency_key, operation, request_hash, transaction_id, created_at
            ) VALUES (?, ?, ?, ?, ?)",
            params![
                record.key.to_string(),
                record.operation.as_str(),
                record.request_hash.as_str(),
                record.transaction_id.to_string(),
                format_timestamp(record.created_at),
            ],
        )?;
        Ok(())
    }
}

impl CredentialUnit for DuckDbUnit<'_> {
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE username_normalized = ?",
            USER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![User::normalize_identity(username)])?;
        match rows.next()? {
            Some(row) => Ok(Some(UserRow::from_row(row)?.into_user()?)),
            None => Ok(None),
        }
    }

    fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE user_id = ?", USER_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(UserRow::from_row(row)?.into_user()?)),
            None => Ok(None),
        }
    }

    fn username_exists(&self, username: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE username_normalized = ?",
            params![User::normalize_identity(username)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn email_exists(&self, email: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE email_normalized = ?",
            params![User::normalize_identity(email)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn passport_exists(&self, passport_number: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM customers WHERE passport_number = ?",
            params![passport_number.trim()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn insert_user(&self, user: &User) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO users (
                    user_id, username, username_normalized, password_hash, email,
                    email_normalized, full_name, role, is_active, created_at, last_login_at,
                    failed_login_attempts, locked_until
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    user.id.to_string(),
                    &user.username,
                    User::normalize_identity(&user.username),
                    &user.password_hash,
                    &user.email,
                    User::normalize_identity(&user.email),
                    &user.full_name,
                    user.role.as_str(),
                    user.is_active,
                    format_timestamp(user.created_at),
                    user.last_login_at.map(format_timestamp),
                    user.failed_login_attempts as i32,
                    user.locked_until.map(format_timestamp),
                ],
            )
            .map_err(classify_user_insert_error)?;
        Ok(())
    }

    fn insert_customer(&self, customer: &Customer) -> Result<()> {
        self.conn.execute(
            "INSERT INTO customers (
                customer_id, user_id, first_name, last_name, middle_name, date_of_birth,
                email, phone_number, passport_number, address, city, country, is_active,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                customer.id.to_string(),
                customer.user_id.to_string(),
                &customer.first_name,
                &customer.last_name,
                &customer.middle_name,
                customer.date_of_birth.format("%Y-%m-%d").to_string(),
                &customer.email,
                &customer.phone_number,
                &customer.passport_number,
                &customer.address,
                &customer.city,
                &customer.country,
                customer.is_active,
                format_timestamp(customer.created_at),
                format_timestamp(customer.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_customer_by_user(&self, user_id: Uuid) -> Result<Option<Customer>> {
        let sql = format!(
            "SELECT {} FROM customers WHERE user_id = ?",
            CUSTOMER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![user_id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(CustomerRow::from_row(row)?.into_customer()?)),
            None => Ok(None),
        }
    }

    fn update_login_failures(
        &self,
        user_id: Uuid,
        failed_attempts: u32,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE users SET failed_login_attempts = ?, locked_until = ? WHERE user_id = ?",
            params![
                failed_attempts as i32,
                locked_until.map(format_timestamp),
                user_id.to_string()
            ],
        )?;
        if updated != 1 {
            return Err(Error::integrity(format!("user {} vanished", user_id)));
        }
        Ok(())
    }

    fn record_successful_login(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE users
             SET failed_login_attempts = 0, locked_until = NULL, last_login_at = ?
             WHERE user_id = ?",
            params![format_timestamp(at), user_id.to_string()],
        )?;
        if updated != 1 {
            return Err(Error::integrity(format!("user {} vanished", user_id)));
        }
        Ok(())
    }

    fn set_user_active(&self, user_id: Uuid, active: bool) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE users SET is_active = ? WHERE user_id = ?",
            params![active, user_id.to_string()],
        )?;
        if updated != 1 {
            return Err(Error::not_found(format!("user {}", user_id)));
        }
        Ok(())
    }
}

/// Unique-index violations on users mean a concurrent registration won
fn classify_user_insert_error(err: duckdb::Error) -> Error {
    let msg = err.to_string();
    if msg.contains("username_normalized") {
        Error::UsernameTaken
    } else if msg.contains("email_normalized") {
        Error::EmailTaken
    } else {
        Error::from(err)
    }
}

// === Row mapping ===
//
// Raw column values are pulled inside the duckdb row callback and converted
// to domain types afterwards, so parse failures surface as our own errors.

struct AccountRow {
    id: String,
    owner_id: String,
    account_number: String,
    account_type: String,
    balance: String,
    currency: String,
    status: String,
    interest_rate: String,
    opened_at: String,
    closed_at: Option<String>,
    last_transaction_at: Option<String>,
}

impl AccountRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            account_number: row.get(2)?,
            account_type: row.get(3)?,
            balance: row.get(4)?,
            currency: row.get(5)?,
            status: row.get(6)?,
            interest_rate: row.get(7)?,
            opened_at: row.get(8)?,
            closed_at: row.get(9)?,
            last_transaction_at: row.get(10)?,
        })
    }

    fn into_account(self) -> Result<Account> {
        Ok(Account {
            id: parse_uuid(&self.id)?,
            owner_id: parse_uuid(&self.owner_id)?,
            account_number: self.account_number,
            account_type: self.account_type.parse().map_err(Error::database)?,
            balance: parse_decimal(&self.balance)?,
            currency: self.currency,
            status: self.status.parse().map_err(Error::database)?,
            interest_rate: parse_decimal(&self.interest_rate)?.normalize(),
            opened_at: parse_timestamp(&self.opened_at)?,
            closed_at: parse_optional_timestamp(self.closed_at)?,
            last_transaction_at: parse_optional_timestamp(self.last_transaction_at)?,
        })
    }
}

struct TransactionRow {
    id: String,
    seq: i64,
    account_id: String,
    transaction_type: String,
    amount: String,
    currency: String,
    created_at: String,
    description: Option<String>,
    status: String,
    counterparty_account_id: Option<String>,
    reference_number: String,
    balance_after: Option<String>,
    created_by: String,
}

impl TransactionRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            seq: row.get(1)?,
            account_id: row.get(2)?,
            transaction_type: row.get(3)?,
            amount: row.get(4)?,
            currency: row.get(5)?,
            created_at: row.get(6)?,
            description: row.get(7)?,
            status: row.get(8)?,
            counterparty_account_id: row.get(9)?,
            reference_number: row.get(10)?,
            balance_after: row.get(11)?,
            created_by: row.get(12)?,
        })
    }

    fn into_transaction(self) -> Result<Transaction> {
        Ok(Transaction {
            id: parse_uuid(&self.id)?,
            account_id: parse_uuid(&self.account_id)?,
            transaction_type: self.transaction_type.parse().map_err(Error::database)?,
            amount: parse_decimal(&self.amount)?,
            currency: self.currency,
            created_at: parse_timestamp(&self.created_at)?,
            description: self.description,
            status: self.status.parse().map_err(Error::database)?,
            counterparty_account_id: self
                .counterparty_account_id
                .as_deref()
                .map(parse_uuid)
                .transpose()?,
            reference_number: self.reference_number,
            balance_after: self.balance_after.as_deref().map(parse_decimal).transpose()?,
            created_by: self.created_by,
            seq: self.seq,
        })
    }
}

struct UserRow {
    id: String,
    username: String,
    password_hash: String,
    email: String,
    full_name: String,
    role: String,
    is_active: bool,
    created_at: String,
    last_login_at: Option<String>,
    failed_login_attempts: i32,
    locked_until: Option<String>,
}

impl UserRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            password_hash: row.get(2)?,
            email: row.get(3)?,
            full_name: row.get(4)?,
            role: row.get(5)?,
            is_active: row.get(6)?,
            created_at: row.get(7)?,
            last_login_at: row.get(8)?,
            failed_login_attempts: row.get(9)?,
            locked_until: row.get(10)?,
        })
    }

    fn into_user(self) -> Result<User> {
        Ok(User {
            id: parse_uuid(&self.id)?,
            username: self.username,
            password_hash: self.password_hash,
            email: self.email,
            full_name: self.full_name,
            role: self.role.parse().map_err(Error::database)?,
            is_active: self.is_active,
            created_at: parse_timestamp(&self.created_at)?,
            last_login_at: parse_optional_timestamp(self.last_login_at)?,
            failed_login_attempts: self.failed_login_attempts.max(0) as u32,
            locked_until: parse_optional_timestamp(self.locked_until)?,
        })
    }
}

struct CustomerRow {
    id: String,
    user_id: String,
    first_name: String,
    last_name: String,
    middle_name: Option<String>,
    date_of_birth: String,
    email: String,
    phone_number: String,
    passport_number: String,
    address: Option<String>,
    city: Option<String>,
    country: String,
    is_active: bool,
    created_at: String,
    updated_at: String,
}

impl CustomerRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            middle_name: row.get(4)?,
            date_of_birth: row.get(5)?,
            email: row.get(6)?,
            phone_number: row.get(7)?,
            passport_number: row.get(8)?,
            address: row.get(9)?,
            city: row.get(10)?,
            country: row.get(11)?,
            is_active: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }

    fn into_customer(self) -> Result<Customer> {
        Ok(Customer {
            id: parse_uuid(&self.id)?,
            user_id: parse_uuid(&self.user_id)?,
            first_name: self.first_name,
            last_name: self.last_name,
            middle_name: self.middle_name,
            date_of_birth: NaiveDate::parse_from_str(&self.date_of_birth, "%Y-%m-%d")
                .map_err(|e| Error::database(format!("bad date '{}': {}", self.date_of_birth, e)))?,
            email: self.email,
            phone_number: self.phone_number,
            passport_number: self.passport_number,
            address: self.address,
            city: self.city,
            country: self.country,
            is_active: self.is_active,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

// === Value conversion ===

/// RFC 3339 with fixed nanosecond precision, so text order matches time order
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::database(format!("bad timestamp '{}': {}", s, e)))
}

fn parse_optional_timestamp(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_timestamp).transpose()
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::database(format!("bad id '{}': {}", s, e)))
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str_exact(s.trim())
        .map_err(|e| Error::database(format!("bad decimal '{}': {}", s, e)))
}
