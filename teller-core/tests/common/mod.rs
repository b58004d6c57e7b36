//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use mockable::Clock;
use rust_decimal::Decimal;
use tempfile::TempDir;
use uuid::Uuid;

use teller_core::config::{Config, PasswordHashSettings};
use teller_core::{
    AccountType, DepositRequest, EntryPoint, OpenAccountRequest, RegisterRequest, TellerContext,
};

/// Clock the tests move by hand
pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn starting_2026() -> Arc<Self> {
        Arc::new(Self::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()))
    }

    pub fn advance(&self, delta: Duration) {
        *self.0.lock().unwrap() += delta;
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

pub fn money(s: &str) -> Decimal {
    Decimal::from_str_exact(s).unwrap()
}

/// Settings that keep Argon2 cheap and carry a fixed token secret
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.password_hash = PasswordHashSettings::minimal();
    config.auth.token.secret = "integration-test-secret-0123456789abcdef".to_string();
    config
}

pub fn context_with(temp_dir: &TempDir, config: Config, clock: Arc<dyn Clock>) -> TellerContext {
    TellerContext::with_config(temp_dir.path(), config, EntryPoint::Library, clock)
        .expect("Failed to build context")
}

pub fn context(temp_dir: &TempDir) -> TellerContext {
    context_with(temp_dir, test_config(), Arc::new(mockable::DefaultClock))
}

/// Open an active TJS checking account holding `balance`
pub fn funded_account(ctx: &TellerContext, balance: &str) -> Uuid {
    let account = ctx
        .account_service
        .open(&OpenAccountRequest::new(Uuid::new_v4(), AccountType::Checking))
        .expect("Failed to open account");
    let amount = money(balance);
    if amount > Decimal::ZERO {
        ctx.ledger_service
            .deposit(&DepositRequest::new(account.id, amount))
            .expect("Failed to fund account");
    }
    account.id
}

pub fn register_user(ctx: &TellerContext, username: &str, password: &str) -> Uuid {
    let result = ctx.register(&RegisterRequest::new(
        username,
        password,
        format!("{}@example.com", username),
        format!("{} Tester", username),
    ));
    assert!(result.success, "registration failed: {}", result.message);
    result.user.expect("user view").id
}
