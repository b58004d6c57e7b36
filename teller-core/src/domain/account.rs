//! Account domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of the externally visible account number
pub const ACCOUNT_NUMBER_LEN: usize = 16;

/// Product type of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    Checking,
    Savings,
    Credit,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checking => "Checking",
            Self::Savings => "Savings",
            Self::Credit => "Credit",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "checking" => Ok(Self::Checking),
            "savings" => Ok(Self::Savings),
            "credit" => Ok(Self::Credit),
            other => Err(format!("unknown account type '{}'", other)),
        }
    }
}

/// Lifecycle status of an account
///
/// `Frozen` accounts may still receive deposits but cannot be debited or take
/// part in transfers. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    Frozen,
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Frozen => "Frozen",
            Self::Closed => "Closed",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "frozen" => Ok(Self::Frozen),
            "closed" => Ok(Self::Closed),
            other => Err(format!("unknown account status '{}'", other)),
        }
    }
}

/// A customer account held at the bank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    /// Owning customer
    pub owner_id: Uuid,
    /// Externally visible 16-digit number, unique
    pub account_number: String,
    pub account_type: AccountType,
    /// Never negative. Only the ledger engine writes it.
    pub balance: Decimal,
    /// ISO 4217 currency code, normalized to uppercase
    pub currency: String,
    pub status: AccountStatus,
    pub interest_rate: Decimal,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub last_transaction_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Create a new, empty, active account
    pub fn new(
        owner_id: Uuid,
        account_number: impl Into<String>,
        account_type: AccountType,
        currency: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            account_number: account_number.into(),
            account_type,
            balance: Decimal::ZERO,
            currency: Self::normalize_currency(currency),
            status: AccountStatus::Active,
            interest_rate: Decimal::ZERO,
            opened_at: Utc::now(),
            closed_at: None,
            last_transaction_at: None,
        }
    }

    /// Normalize currency code to uppercase
    pub fn normalize_currency(currency: &str) -> String {
        currency.trim().to_uppercase()
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    pub fn is_closed(&self) -> bool {
        self.status == AccountStatus::Closed
    }

    /// Deposits are accepted unless the account is closed
    pub fn can_receive_deposit(&self) -> bool {
        self.status != AccountStatus::Closed
    }

    /// Validate account data
    pub fn validate(&self) -> Result<(), &'static str> {
        if !is_valid_account_number(&self.account_number) {
            return Err("account number must be 16 digits");
        }
        let currency = self.currency.trim();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err("currency must be a 3-letter ISO 4217 code");
        }
        if self.balance.is_sign_negative() && !self.balance.is_zero() {
            return Err("balance cannot be negative");
        }
        if self.interest_rate.is_sign_negative() && !self.interest_rate.is_zero() {
            return Err("interest rate cannot be negative");
        }
        Ok(())
    }
}

/// Generate a random 16-digit account number (no leading zero)
pub fn generate_account_number() -> String {
    let mut rng = rand::thread_rng();
    let mut number = String::with_capacity(ACCOUNT_NUMBER_LEN);
    number.push(char::from(b'1' + rng.gen_range(0..9u8)));
    for _ in 1..ACCOUNT_NUMBER_LEN {
        number.push(char::from(b'0' + rng.gen_range(0..10u8)));
    }
    number
}

pub fn is_valid_account_number(number: &str) -> bool {
    number.len() == ACCOUNT_NUMBER_LEN && number.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_normalization() {
        assert_eq!(Account::normalize_currency("tjs"), "TJS");
        assert_eq!(Account::normalize_currency(" usd "), "USD");
    }

    #[test]
    fn test_account_validation() {
        let mut account = Account::new(
            Uuid::new_v4(),
            generate_account_number(),
            AccountType::Checking,
            "tjs",
        );
        assert!(account.validate().is_ok());
        assert_eq!(account.currency, "TJS");

        account.account_number = "1234".to_string();
        assert!(account.validate().is_err());
    }

    #[test]
    fn test_generated_account_numbers() {
        for _ in 0..50 {
            let number = generate_account_number();
            assert!(is_valid_account_number(&number));
            assert!(!number.starts_with('0'));
        }
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [AccountStatus::Active, AccountStatus::Frozen, AccountStatus::Closed] {
            assert_eq!(status.as_str().parse::<AccountStatus>().unwrap(), status);
        }
        assert!("dormant".parse::<AccountStatus>().is_err());
        assert_eq!("SAVINGS".parse::<AccountType>().unwrap(), AccountType::Savings);
    }

    #[test]
    fn test_frozen_account_still_takes_deposits() {
        let mut account = Account::new(
            Uuid::new_v4(),
            generate_account_number(),
            AccountType::Savings,
            "TJS",
        );
        account.status = AccountStatus::Frozen;
        assert!(account.can_receive_deposit());
        assert!(!account.is_active());

        account.status = AccountStatus::Closed;
        assert!(!account.can_receive_deposit());
    }
}
