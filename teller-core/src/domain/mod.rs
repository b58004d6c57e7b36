//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod account;
mod customer;
pub mod idempotency;
pub mod requests;
pub mod result;
mod transaction;
mod user;

pub use account::{
    generate_account_number, is_valid_account_number, Account, AccountStatus, AccountType,
};
pub use customer::{Customer, DEFAULT_COUNTRY};
pub use idempotency::{IdempotencyKey, IdempotencyRecord, LedgerOperation, PayloadHash};
pub use requests::{
    DepositRequest, OpenAccountRequest, RegisterRequest, TransferRequest, WithdrawalRequest,
};
pub use transaction::{
    generate_reference_number, Transaction, TransactionStatus, TransactionType, SYSTEM_CREATOR,
};
pub use user::{LoginState, Role, User, UserView};
