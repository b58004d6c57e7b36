//! Configuration management
//!
//! Settings live in `settings.json` inside the teller directory:
//! ```json
//! {
//!   "auth": {
//!     "maxFailedAttempts": 5,
//!     "lockoutMinutes": 30,
//!     "passwordHash": { "memoryKib": 19456, "iterations": 2, "parallelism": 1 },
//!     "token": { "secret": "...", "issuer": "TellerBank", "audience": "TellerBankClients", "expiryMinutes": 60 }
//!   },
//!   "ledger": {
//!     "lockTimeoutMs": 5000,
//!     "recordFailedAttempts": true,
//!     "defaultCurrency": "TJS",
//!     "limits": { "minAmount": "0.01", "maxDeposit": "10000000", ... }
//!   }
//! }
//! ```
//!
//! Keys the library does not manage are preserved on save.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::RngCore;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const SETTINGS_FILE: &str = "settings.json";

const MIN_SECRET_LEN: usize = 32;

/// Upper bound for lockout and token lifetimes (one year)
pub const MAX_PERIOD_MINUTES: i64 = 525_600;

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    auth: AuthSettings,
    #[serde(default)]
    ledger: LedgerSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Login lockout, password hashing and session token settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Consecutive failures that trigger a temporary lock
    pub max_failed_attempts: u32,
    pub lockout_minutes: i64,
    pub password_hash: PasswordHashSettings,
    pub token: TokenSettings,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_minutes: 30,
            password_hash: PasswordHashSettings::default(),
            token: TokenSettings::default(),
        }
    }
}

/// Argon2id cost parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PasswordHashSettings {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordHashSettings {
    fn default() -> Self {
        // OWASP baseline for Argon2id
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl PasswordHashSettings {
    /// Cheapest parameters argon2 accepts, for tests
    pub fn minimal() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenSettings {
    /// HS256 signing secret; generated on first start when empty
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub expiry_minutes: i64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: "TellerBank".to_string(),
            audience: "TellerBankClients".to_string(),
            expiry_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LedgerSettings {
    /// Longest wait for the store lock before failing with `Busy`
    pub lock_timeout_ms: u64,
    /// Append a `Failed` record when a debit is rejected for funds
    pub record_failed_attempts: bool,
    pub default_currency: String,
    pub limits: AmountLimits,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
            record_failed_attempts: true,
            default_currency: "TJS".to_string(),
            limits: AmountLimits::default(),
        }
    }
}

impl LedgerSettings {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Per-request amount policy applied at the boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AmountLimits {
    pub min_amount: Decimal,
    pub max_deposit: Decimal,
    pub max_withdrawal: Decimal,
    pub max_transfer: Decimal,
    pub max_description_len: usize,
}

impl Default for AmountLimits {
    fn default() -> Self {
        Self {
            min_amount: Decimal::new(1, 2),
            max_deposit: Decimal::from(10_000_000),
            max_withdrawal: Decimal::from(50_000),
            max_transfer: Decimal::from(1_000_000),
            max_description_len: 200,
        }
    }
}

/// Teller configuration (typed view of settings)
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub auth: AuthSettings,
    pub ledger: LedgerSettings,
    // Keep the raw settings for preservation when saving
    _raw_settings: SettingsFile,
}

impl Config {
    /// Load config from the teller directory and apply environment overrides
    ///
    /// Overrides: `TELLER_JWT_SECRET`, `TELLER_LOCK_TIMEOUT_MS`,
    /// `TELLER_MAX_FAILED_ATTEMPTS`, `TELLER_LOCKOUT_MINUTES`.
    pub fn load(teller_dir: &Path) -> Result<Self> {
        let settings_path = teller_dir.join(SETTINGS_FILE);

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)
                .with_context(|| format!("Failed to read {}", settings_path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid settings in {}", settings_path.display()))?
        } else {
            SettingsFile::default()
        };

        let mut config = Self {
            auth: raw.auth.clone(),
            ledger: raw.ledger.clone(),
            _raw_settings: raw,
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup("TELLER_JWT_SECRET").filter(|s| !s.is_empty()) {
            self.auth.token.secret = secret;
        }
        if let Some(value) = lookup("TELLER_LOCK_TIMEOUT_MS") {
            self.ledger.lock_timeout_ms = value
                .trim()
                .parse()
                .with_context(|| format!("TELLER_LOCK_TIMEOUT_MS is not a number: {}", value))?;
        }
        if let Some(value) = lookup("TELLER_MAX_FAILED_ATTEMPTS") {
            self.auth.max_failed_attempts = value.trim().parse().with_context(|| {
                format!("TELLER_MAX_FAILED_ATTEMPTS is not a number: {}", value)
            })?;
        }
        if let Some(value) = lookup("TELLER_LOCKOUT_MINUTES") {
            self.auth.lockout_minutes = value
                .trim()
                .parse()
                .with_context(|| format!("TELLER_LOCKOUT_MINUTES is not a number: {}", value))?;
        }
        Ok(())
    }

    /// Reject settings the engines cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.auth.max_failed_attempts == 0 {
            anyhow::bail!("auth.maxFailedAttempts must be at least 1");
        }
        if !(1..=MAX_PERIOD_MINUTES).contains(&self.auth.lockout_minutes) {
            anyhow::bail!(
                "auth.lockoutMinutes must be between 1 and {}",
                MAX_PERIOD_MINUTES
            );
        }
        if !(1..=MAX_PERIOD_MINUTES).contains(&self.auth.token.expiry_minutes) {
            anyhow::bail!(
                "auth.token.expiryMinutes must be between 1 and {}",
                MAX_PERIOD_MINUTES
            );
        }
        if !self.auth.token.secret.is_empty() && self.auth.token.secret.len() < MIN_SECRET_LEN {
            anyhow::bail!(
                "auth.token.secret must be at least {} characters",
                MIN_SECRET_LEN
            );
        }
        let limits = &self.ledger.limits;
        if limits.min_amount <= Decimal::ZERO {
            anyhow::bail!("ledger.limits.minAmount must be positive");
        }
        for (name, max) in [
            ("maxDeposit", limits.max_deposit),
            ("maxWithdrawal", limits.max_withdrawal),
            ("maxTransfer", limits.max_transfer),
        ] {
            if max < limits.min_amount {
                anyhow::bail!("ledger.limits.{} is below minAmount", name);
            }
        }
        Ok(())
    }

    /// Make sure a signing secret exists, generating and persisting one if not
    ///
    /// Returns true when a new secret was written.
    pub fn ensure_token_secret(&mut self, teller_dir: &Path) -> Result<bool> {
        if !self.auth.token.secret.is_empty() {
            return Ok(false);
        }
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        self.auth.token.secret = hex::encode(bytes);
        self.save(teller_dir)?;
        Ok(true)
    }

    /// Save config to the teller directory
    /// Preserves other settings that the library doesn't manage
    pub fn save(&self, teller_dir: &Path) -> Result<()> {
        let settings_path = teller_dir.join(SETTINGS_FILE);

        // Load existing settings to preserve fields we don't manage
        let mut settings = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str::<SettingsFile>(&content).unwrap_or_default()
        } else {
            self._raw_settings.clone()
        };

        settings.auth = self.auth.clone();
        settings.ledger = self.ledger.clone();

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)
            .with_context(|| format!("Failed to write {}", settings_path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_settings_file() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path()).unwrap();

        assert_eq!(config.auth.max_failed_attempts, 5);
        assert_eq!(config.auth.lockout_minutes, 30);
        assert_eq!(config.auth.token.expiry_minutes, 60);
        assert_eq!(config.ledger.lock_timeout_ms, 5_000);
        assert!(config.ledger.record_failed_attempts);
        assert_eq!(config.ledger.limits.max_withdrawal, Decimal::from(50_000));
    }

    #[test]
    fn test_partial_settings_keep_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{ "auth": { "lockoutMinutes": 10 }, "ledger": { "limits": { "maxDeposit": "500" } } }"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.auth.lockout_minutes, 10);
        assert_eq!(config.auth.max_failed_attempts, 5);
        assert_eq!(config.ledger.limits.max_deposit, Decimal::from(500));
        assert_eq!(config.ledger.limits.max_transfer, Decimal::from(1_000_000));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        let env: HashMap<&str, &str> = [
            ("TELLER_LOCK_TIMEOUT_MS", "250"),
            ("TELLER_MAX_FAILED_ATTEMPTS", "3"),
            ("TELLER_LOCKOUT_MINUTES", "5"),
            ("TELLER_JWT_SECRET", "0123456789abcdef0123456789abcdef"),
        ]
        .into_iter()
        .collect();

        config
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.ledger.lock_timeout(), Duration::from_millis(250));
        assert_eq!(config.auth.max_failed_attempts, 3);
        assert_eq!(config.auth.lockout_minutes, 5);
        assert_eq!(config.auth.token.secret.len(), 32);
    }

    #[test]
    fn test_bad_override_is_an_error() {
        let mut config = Config::default();
        let result = config.apply_overrides(|name| {
            (name == "TELLER_LOCK_TIMEOUT_MS").then(|| "soon".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_short_secret() {
        let mut config = Config::default();
        config.auth.token.secret = "short".to_string();
        assert!(config.validate().is_err());

        config.auth.token.secret = String::new();
        config.auth.max_failed_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_bounds_lockout_and_expiry() {
        let mut config = Config::default();
        config.auth.lockout_minutes = MAX_PERIOD_MINUTES;
        config.auth.token.expiry_minutes = MAX_PERIOD_MINUTES;
        assert!(config.validate().is_ok());

        config.auth.lockout_minutes = i64::MAX;
        assert!(config.validate().is_err());

        config.auth.lockout_minutes = 30;
        config.auth.token.expiry_minutes = MAX_PERIOD_MINUTES + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_huge_lockout_from_settings_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{ "auth": { "lockoutMinutes": 9223372036854775807 } }"#,
        )
        .unwrap();
        let err = Config::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("lockoutMinutes"), "{}", err);
    }

    #[test]
    fn test_save_preserves_unknown_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, r#"{ "ui": { "theme": "dark" } }"#).unwrap();

        let mut config = Config::load(dir.path()).unwrap();
        assert!(config.ensure_token_secret(dir.path()).unwrap());
        assert!(!config.ensure_token_secret(dir.path()).unwrap());

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["ui"]["theme"], "dark");
        assert_eq!(saved["auth"]["token"]["secret"].as_str().unwrap().len(), 64);

        let reloaded = Config::load(dir.path()).unwrap();
        assert_eq!(reloaded.auth.token.secret, config.auth.token.secret);
    }
}
