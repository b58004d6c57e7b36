//! Boundary request types
//!
//! These are the typed inputs of the facade. `validate` applies the boundary
//! policy (amount limits, field lengths) before any engine is called; the
//! engines still enforce their own invariants.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::idempotency::{IdempotencyKey, LedgerOperation, PayloadHash};
use super::result::{Error, Result};
use super::{AccountType, Role};
use crate::config::AmountLimits;

/// Amounts carry at most two decimal places
pub const MONEY_SCALE: u32 = 2;

/// Reject non-positive amounts and sub-cent precision
pub fn check_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::invalid_amount(format!(
            "amount must be greater than zero, got {}",
            amount
        )));
    }
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(Error::invalid_amount(format!(
            "amount {} has more than {} decimal places",
            amount, MONEY_SCALE
        )));
    }
    Ok(())
}

fn check_amount_range(amount: Decimal, min: Decimal, max: Decimal, what: &str) -> Result<()> {
    check_amount(amount)?;
    if amount < min || amount > max {
        return Err(Error::invalid_amount(format!(
            "{} amount must be between {} and {}",
            what, min, max
        )));
    }
    Ok(())
}

fn check_description(description: Option<&str>, max_len: usize) -> Result<()> {
    if let Some(desc) = description {
        if desc.chars().count() > max_len {
            return Err(Error::validation(format!(
                "description cannot exceed {} characters",
                max_len
            )));
        }
    }
    Ok(())
}

fn amount_field(amount: Decimal) -> String {
    amount.normalize().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositRequest {
    pub account_id: Uuid,
    pub amount: Decimal,
    pub description: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<IdempotencyKey>,
}

impl DepositRequest {
    pub fn new(account_id: Uuid, amount: Decimal) -> Self {
        Self {
            account_id,
            amount,
            description: None,
            idempotency_key: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: IdempotencyKey) -> Self {
        self.idempotency_key = Some(key);
        self
    }

    pub fn validate(&self, limits: &AmountLimits) -> Result<()> {
        check_amount_range(self.amount, limits.min_amount, limits.max_deposit, "deposit")?;
        check_description(self.description.as_deref(), limits.max_description_len)
    }

    pub fn payload_hash(&self) -> PayloadHash {
        PayloadHash::of_fields(&[
            LedgerOperation::Deposit.as_str(),
            &self.account_id.to_string(),
            &amount_field(self.amount),
            self.description.as_deref().unwrap_or(""),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub account_id: Uuid,
    pub amount: Decimal,
    pub description: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<IdempotencyKey>,
}

impl WithdrawalRequest {
    pub fn new(account_id: Uuid, amount: Decimal) -> Self {
        Self {
            account_id,
            amount,
            description: None,
            idempotency_key: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: IdempotencyKey) -> Self {
        self.idempotency_key = Some(key);
        self
    }

    pub fn validate(&self, limits: &AmountLimits) -> Result<()> {
        check_amount_range(
            self.amount,
            limits.min_amount,
            limits.max_withdrawal,
            "withdrawal",
        )?;
        check_description(self.description.as_deref(), limits.max_description_len)
    }

    pub fn payload_hash(&self) -> PayloadHash {
        PayloadHash::of_fields(&[
            LedgerOperation::Withdrawal.as_str(),
            &self.account_id.to_string(),
            &amount_field(self.amount),
            self.description.as_deref().unwrap_or(""),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount: Decimal,
    pub description: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<IdempotencyKey>,
}

impl TransferRequest {
    pub fn new(from_account_id: Uuid, to_account_id: Uuid, amount: Decimal) -> Self {
        Self {
            from_account_id,
            to_account_id,
            amount,
            description: None,
            idempotency_key: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: IdempotencyKey) -> Self {
        self.idempotency_key = Some(key);
        self
    }

    pub fn validate(&self, limits: &AmountLimits) -> Result<()> {
        if self.from_account_id == self.to_account_id {
            return Err(Error::SameAccount);
        }
        check_amount_range(self.amount, limits.min_amount, limits.max_transfer, "transfer")?;
        check_description(self.description.as_deref(), limits.max_description_len)
    }

    pub fn payload_hash(&self) -> PayloadHash {
        PayloadHash::of_fields(&[
            LedgerOperation::Transfer.as_str(),
            &self.from_account_id.to_string(),
            &self.to_account_id.to_string(),
            &amount_field(self.amount),
            self.description.as_deref().unwrap_or(""),
        ])
    }
}

/// Profile fields are optional; a customer profile is only created when all
/// of first name, last name, date of birth, passport and phone are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub middle_name: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub passport_number: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl RegisterRequest {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        email: impl Into<String>,
        full_name: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            email: email.into(),
            full_name: full_name.into(),
            ..Self::default()
        }
    }

    pub fn role(&self) -> Role {
        self.role.unwrap_or_default()
    }

    /// True when the request carries everything a customer profile needs
    pub fn has_complete_profile(&self) -> bool {
        fn present(value: &Option<String>) -> bool {
            value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
        }
        present(&self.first_name)
            && present(&self.last_name)
            && self.date_of_birth.is_some()
            && present(&self.passport_number)
            && present(&self.phone_number)
    }

    pub fn validate(&self) -> Result<()> {
        let username_len = self.username.trim().chars().count();
        if !(3..=50).contains(&username_len) {
            return Err(Error::validation(
                "username must be between 3 and 50 characters",
            ));
        }
        let password_len = self.password.chars().count();
        if !(6..=100).contains(&password_len) {
            return Err(Error::validation(
                "password must be between 6 and 100 characters",
            ));
        }
        if !is_valid_email(&self.email) {
            return Err(Error::validation("email address is not valid"));
        }
        let name_len = self.full_name.trim().chars().count();
        if !(3..=100).contains(&name_len) {
            return Err(Error::validation(
                "full name must be between 3 and 100 characters",
            ));
        }
        Ok(())
    }
}

/// Minimal shape check: one `@`, non-empty local part, dotted domain
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.splitn(2, '@');
    let (local, domain) = match (parts.next(), parts.next()) {
        (Some(local), Some(domain)) => (local, domain),
        _ => return false,
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAccountRequest {
    pub owner_id: Uuid,
    pub account_type: AccountType,
    /// Falls back to the configured default currency
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub initial_deposit: Option<Decimal>,
    #[serde(default)]
    pub interest_rate: Option<Decimal>,
}

impl OpenAccountRequest {
    pub fn new(owner_id: Uuid, account_type: AccountType) -> Self {
        Self {
            owner_id,
            account_type,
            currency: None,
            initial_deposit: None,
            interest_rate: None,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_initial_deposit(mut self, amount: Decimal) -> Self {
        self.initial_deposit = Some(amount);
        self
    }

    pub fn validate(&self, limits: &AmountLimits) -> Result<()> {
        if let Some(amount) = self.initial_deposit {
            check_amount_range(amount, limits.min_amount, limits.max_deposit, "opening")?;
        }
        if let Some(rate) = self.interest_rate {
            if rate < Decimal::ZERO || rate > Decimal::from(100) {
                return Err(Error::validation("interest rate must be between 0 and 100"));
            }
        }
        if let Some(currency) = &self.currency {
            let currency = currency.trim();
            if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(Error::validation(
                    "currency must be a 3-letter ISO 4217 code",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    #[test]
    fn test_check_amount() {
        assert!(check_amount(money("0.01")).is_ok());
        assert!(check_amount(money("10.50")).is_ok());
        // Trailing zeros do not count as precision
        assert!(check_amount(money("10.5000")).is_ok());
        assert!(matches!(check_amount(Decimal::ZERO), Err(Error::InvalidAmount(_))));
        assert!(matches!(check_amount(money("-5")), Err(Error::InvalidAmount(_))));
        assert!(matches!(check_amount(money("0.001")), Err(Error::InvalidAmount(_))));
    }

    #[test]
    fn test_deposit_limits() {
        let limits = AmountLimits::default();
        let id = Uuid::new_v4();

        assert!(DepositRequest::new(id, money("10000000")).validate(&limits).is_ok());
        assert!(DepositRequest::new(id, money("10000000.01"))
            .validate(&limits)
            .is_err());
    }

    #[test]
    fn test_withdrawal_limits_and_description() {
        let limits = AmountLimits::default();
        let id = Uuid::new_v4();

        assert!(WithdrawalRequest::new(id, money("50000")).validate(&limits).is_ok());
        assert!(WithdrawalRequest::new(id, money("50000.01"))
            .validate(&limits)
            .is_err());

        let long = "x".repeat(201);
        let err = WithdrawalRequest::new(id, money("1"))
            .with_description(long)
            .validate(&limits)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_transfer_same_account_rejected_first() {
        let id = Uuid::new_v4();
        let err = TransferRequest::new(id, id, Decimal::ZERO)
            .validate(&AmountLimits::default())
            .unwrap_err();
        assert!(matches!(err, Error::SameAccount));
    }

    #[test]
    fn test_payload_hash_ignores_trailing_zeros() {
        let id = Uuid::new_v4();
        let a = DepositRequest::new(id, money("100")).payload_hash();
        let b = DepositRequest::new(id, money("100.00")).payload_hash();
        let c = WithdrawalRequest::new(id, money("100")).payload_hash();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_register_validation() {
        let ok = RegisterRequest::new("alice", "secret1", "alice@example.com", "Alice Smith");
        assert!(ok.validate().is_ok());
        assert_eq!(ok.role(), Role::Customer);

        let mut bad = ok.clone();
        bad.username = "al".to_string();
        assert!(bad.validate().is_err());

        let mut bad = ok.clone();
        bad.password = "12345".to_string();
        assert!(bad.validate().is_err());

        let mut bad = ok.clone();
        bad.email = "alice.example.com".to_string();
        assert!(bad.validate().is_err());

        let mut bad = ok;
        bad.full_name = "Al".to_string();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_email_shapes() {
        assert!(is_valid_email("a@b.tj"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("@b.tj"));
        assert!(!is_valid_email("a@@b.tj"));
        assert!(!is_valid_email("a b@c.tj"));
    }

    #[test]
    fn test_complete_profile_detection() {
        let mut req = RegisterRequest::new("rustam", "secret1", "r@example.tj", "Rustam N");
        assert!(!req.has_complete_profile());

        req.first_name = Some("Rustam".into());
        req.last_name = Some("Nazarov".into());
        req.date_of_birth = NaiveDate::from_ymd_opt(1990, 1, 1);
        req.passport_number = Some("A1234567".into());
        assert!(!req.has_complete_profile());

        req.phone_number = Some("+992900000000".into());
        assert!(req.has_complete_profile());
    }

    #[test]
    fn test_open_account_validation() {
        let limits = AmountLimits::default();
        let req = OpenAccountRequest::new(Uuid::new_v4(), AccountType::Savings);
        assert!(req.clone().with_currency("usd").validate(&limits).is_ok());
        assert!(req.clone().with_currency("dollars").validate(&limits).is_err());
        assert!(req
            .with_initial_deposit(money("0.001"))
            .validate(&limits)
            .is_err());
    }
}
