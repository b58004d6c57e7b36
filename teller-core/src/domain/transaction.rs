//! Transaction domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Creator tag used when no operator is attached to a movement
pub const SYSTEM_CREATOR: &str = "System";

const REFERENCE_PREFIX: &str = "TX";
const REFERENCE_SUFFIX_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "Deposit",
            Self::Withdrawal => "Withdrawal",
            Self::Transfer => "Transfer",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deposit" => Ok(Self::Deposit),
            "withdrawal" => Ok(Self::Withdrawal),
            "transfer" => Ok(Self::Transfer),
            other => Err(format!("unknown transaction type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

/// An immutable entry in the transaction log
///
/// Transfers are recorded once, from the source account's perspective, with
/// the destination in `counterparty_account_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub transaction_type: TransactionType,
    /// Always positive; direction follows from the type
    pub amount: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub description: Option<String>,
    pub status: TransactionStatus,
    pub counterparty_account_id: Option<Uuid>,
    pub reference_number: String,
    /// Source balance after the movement (unchanged balance for failures)
    pub balance_after: Option<Decimal>,
    pub created_by: String,
    /// Store-assigned insertion order, 0 until persisted
    #[serde(default)]
    pub seq: i64,
}

impl Transaction {
    /// Create a completed transaction with required fields
    pub fn new(
        account_id: Uuid,
        transaction_type: TransactionType,
        amount: Decimal,
        currency: impl Into<String>,
        reference_number: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            transaction_type,
            amount,
            currency: currency.into(),
            created_at,
            description: None,
            status: TransactionStatus::Completed,
            counterparty_account_id: None,
            reference_number: reference_number.into(),
            balance_after: None,
            created_by: SYSTEM_CREATOR.to_string(),
            seq: 0,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_counterparty(mut self, counterparty: Uuid) -> Self {
        self.counterparty_account_id = Some(counterparty);
        self
    }

    pub fn with_balance_after(mut self, balance: Decimal) -> Self {
        self.balance_after = Some(balance);
        self
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == TransactionStatus::Completed
    }

    /// Effect of this record on the given account's balance
    ///
    /// Returns zero for records that did not complete or do not involve the
    /// account.
    pub fn signed_amount_for(&self, account_id: Uuid) -> Decimal {
        if !self.is_completed() {
            return Decimal::ZERO;
        }
        match self.transaction_type {
            TransactionType::Deposit if self.account_id == account_id => self.amount,
            TransactionType::Withdrawal if self.account_id == account_id => -self.amount,
            TransactionType::Transfer if self.account_id == account_id => -self.amount,
            TransactionType::Transfer if self.counterparty_account_id == Some(account_id) => {
                self.amount
            }
            _ => Decimal::ZERO,
        }
    }
}

/// Build a reference number: `TX` + UTC date + `-` + 10 random characters
pub fn generate_reference_number(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFERENCE_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("{}{}-{}", REFERENCE_PREFIX, now.format("%Y%m%d"), suffix)
}
