//! Result and error types for the core library

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::AccountStatus;

/// Broad classification used by callers to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected before any mutation (bad amount, missing fields)
    Validation,
    /// Rejected by a business rule, no partial mutation
    BusinessRule,
    /// Storage busy or conflicting; safe to retry
    Transient,
    /// Integrity or programming error; details are never shown to callers
    Internal,
}

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    // === Validation ===
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Source and destination accounts must differ")]
    SameAccount,

    // === Ledger business rules ===
    #[error("Account {0} not found")]
    AccountNotFound(Uuid),

    #[error("Account {0} is closed")]
    AccountClosed(Uuid),

    #[error("Account {account_id} is {status} and cannot be debited or credited")]
    AccountFrozenOrClosed {
        account_id: Uuid,
        status: AccountStatus,
    },

    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account_id: Uuid,
        balance: Decimal,
        requested: Decimal,
    },

    #[error("Currency mismatch: {from} cannot be moved into a {to} account")]
    CurrencyMismatch { from: String, to: String },

    #[error("Idempotency key conflict: {0}")]
    IdempotencyConflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // === Authentication ===
    #[error("Invalid username or password")]
    InvalidCredentials { remaining_attempts: Option<u32> },

    #[error("Account locked until {0}")]
    AccountLocked(DateTime<Utc>),

    #[error("Account deactivated")]
    AccountDeactivated,

    #[error("Username is already taken")]
    UsernameTaken,

    #[error("Email is already registered")]
    EmailTaken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    // === Transient ===
    #[error("Store busy: {0}")]
    Busy(String),

    #[error("Transient storage error: {0}")]
    Transient(String),

    // === Internal ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an invalid amount error
    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self::InvalidAmount(msg.into())
    }

    /// Create an integrity error
    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount(_) | Self::Validation(_) | Self::SameAccount => {
                ErrorKind::Validation
            }
            Self::AccountNotFound(_)
            | Self::AccountClosed(_)
            | Self::AccountFrozenOrClosed { .. }
            | Self::InsufficientFunds { .. }
            | Self::CurrencyMismatch { .. }
            | Self::IdempotencyConflict(_)
            | Self::NotFound(_)
            | Self::InvalidCredentials { .. }
            | Self::AccountLocked(_)
            | Self::AccountDeactivated
            | Self::UsernameTaken
            | Self::EmailTaken
            | Self::InvalidToken(_) => ErrorKind::BusinessRule,
            Self::Busy(_) | Self::Transient(_) => ErrorKind::Transient,
            Self::Database(_)
            | Self::Integrity(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code for the boundary
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::SameAccount => "SAME_ACCOUNT",
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::AccountClosed(_) => "ACCOUNT_CLOSED",
            Self::AccountFrozenOrClosed { .. } => "ACCOUNT_FROZEN_OR_CLOSED",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            Self::IdempotencyConflict(_) => "IDEMPOTENCY_CONFLICT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidCredentials { .. } => "INVALID_CREDENTIALS",
            Self::AccountLocked(_) => "ACCOUNT_LOCKED",
            Self::AccountDeactivated => "ACCOUNT_DEACTIVATED",
            Self::UsernameTaken => "USERNAME_TAKEN",
            Self::EmailTaken => "EMAIL_TAKEN",
            Self::InvalidToken(_) => "INVALID_TOKEN",
            Self::Busy(_) => "STORE_BUSY",
            Self::Transient(_) => "TRANSIENT_ERROR",
            Self::Database(_)
            | Self::Integrity(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Message safe to hand to an external caller
    ///
    /// Internal errors collapse to a generic sentence. Credential failures
    /// never say whether the username exists.
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidCredentials {
                remaining_attempts: Some(remaining),
            } => format!(
                "Invalid username or password. Attempts remaining: {}",
                remaining
            ),
            Self::AccountLocked(until) => format!(
                "Account is locked until {}",
                until.format("%Y-%m-%d %H:%M UTC")
            ),
            Self::Busy(_) | Self::Transient(_) => {
                "The service is busy, please retry the request".to_string()
            }
            _ if self.kind() == ErrorKind::Internal => "Internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        let msg = err.to_string();
        if is_transient_storage_error(&msg) {
            Self::Transient(msg)
        } else {
            Self::Database(msg)
        }
    }
}

impl From<argon2::password_hash::Error> for Error {
    fn from(err: argon2::password_hash::Error) -> Self {
        Self::Other(format!("password hashing failed: {}", err))
    }
}

/// Check if a storage error message describes a retryable condition
pub(crate) fn is_transient_storage_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("transaction conflict")
        || lower.contains("write-write conflict")
        || lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
        || lower.contains("could not set lock on file")
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result with optional context (serializable envelope for callers)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: "OK".to_string(),
            data: Some(data),
            error: None,
            error_code: None,
            context: None,
        }
    }

    /// Create a successful result with context
    pub fn ok_with_context(data: T, context: HashMap<String, serde_json::Value>) -> Self {
        Self {
            context: Some(context),
            ..Self::ok(data)
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            message: error.clone(),
            data: None,
            error: Some(error),
            error_code: None,
            context: None,
        }
    }

    /// Create a failed result from a core error
    pub fn from_error(err: &Error) -> Self {
        let mut result = Self::fail(err.public_message());
        result.error_code = Some(err.code().to_string());
        result
    }

    /// Attach a human-readable message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::from_error(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_result_ok() {
        let result: OperationResult<i32> = OperationResult::ok(42);
        assert!(result.success);
        assert_eq!(result.data, Some(42));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_operation_result_fail() {
        let result: OperationResult<i32> = OperationResult::fail("Something went wrong");
        assert!(!result.success);
        assert!(result.data.is_none());
        assert_eq!(result.error, Some("Something went wrong".to_string()));
    }

    #[test]
    fn test_from_result_carries_code() {
        let err: Result<i32> = Err(Error::SameAccount);
        let result: OperationResult<i32> = err.into();
        assert!(!result.success);
        assert_eq!(result.error_code.as_deref(), Some("SAME_ACCOUNT"));
    }

    #[test]
    fn test_internal_errors_do_not_leak_details() {
        let err = Error::integrity("account 42 vanished mid-transaction");
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.public_message(), "Internal error");
    }

    #[test]
    fn test_invalid_credentials_message_is_generic() {
        let unknown_user = Error::InvalidCredentials {
            remaining_attempts: None,
        };
        assert_eq!(unknown_user.public_message(), "Invalid username or password");

        let known_user = Error::InvalidCredentials {
            remaining_attempts: Some(3),
        };
        assert!(known_user.public_message().ends_with("Attempts remaining: 3"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::Busy("lock wait".into()).is_retryable());
        assert!(is_transient_storage_error(
            "TransactionContext Error: Catalog write-write conflict on alter"
        ));
        assert!(!Error::SameAccount.is_retryable());
    }
}
