//! Auth service - registration, login lockout and user activation
//!
//! Login state per user: active, temporarily locked, or deactivated. Each
//! wrong password increments the failure counter inside one store
//! transaction; reaching the threshold locks the user for a fixed period.
//! Only a successful login clears the counter and the lock, together.
//!
//! Argon2 verification is slow, so it runs before the store is taken.

use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use chrono::{DateTime, Duration, Utc};
use mockable::Clock;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::token::{IssuedToken, TokenService};
use crate::adapters::duckdb::DuckDbRepository;
use crate::config::{AuthSettings, PasswordHashSettings, MAX_PERIOD_MINUTES};
use crate::domain::result::{Error, Result};
use crate::domain::{Customer, LoginState, RegisterRequest, Role, User, UserView, DEFAULT_COUNTRY};
use crate::ports::CredentialStore;

/// Successful login or registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginSuccess {
    pub token: IssuedToken,
    pub user: UserView,
    /// Set when registration also created a customer profile
    pub customer_id: Option<Uuid>,
}

/// Argon2id hashing with configurable cost
pub struct CredentialHasher {
    argon2: Argon2<'static>,
    /// Hash with the same cost as real ones, checked when no user matches
    decoy: String,
}

impl CredentialHasher {
    pub fn new(settings: &PasswordHashSettings) -> Result<Self> {
        let params = Params::new(
            settings.memory_kib,
            settings.iterations,
            settings.parallelism,
            None,
        )
        .map_err(|e| Error::Config(format!("invalid argon2 parameters: {}", e)))?;
        let mut hasher = Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            decoy: String::new(),
        };
        hasher.decoy = hasher.hash("teller-decoy-password")?;
        Ok(hasher)
    }

    /// PHC string with a fresh random salt
    pub fn hash(&self, password: &str) -> Result<String> {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt = SaltString::encode_b64(&salt)?;
        Ok(self
            .argon2
            .hash_password(password.as_bytes(), &salt)?
            .to_string())
    }

    /// Cost parameters are taken from the stored hash
    pub fn verify(&self, password: &str, phc: &str) -> Result<bool> {
        let parsed = PasswordHash::new(phc)
            .map_err(|e| Error::integrity(format!("stored password hash is malformed: {}", e)))?;
        Ok(self
            .argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Spend one verification so unknown usernames take as long as wrong passwords
    pub fn verify_decoy(&self, password: &str) {
        let _ = self.verify(password, &self.decoy);
    }
}

pub struct AuthService<S = DuckDbRepository> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    settings: AuthSettings,
    hasher: CredentialHasher,
    tokens: TokenService,
}

impl<S: CredentialStore> AuthService<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, settings: AuthSettings) -> Result<Self> {
        if !(1..=MAX_PERIOD_MINUTES).contains(&settings.lockout_minutes) {
            return Err(Error::Config(format!(
                "lockout must be between 1 and {} minutes",
                MAX_PERIOD_MINUTES
            )));
        }
        let hasher = CredentialHasher::new(&settings.password_hash)?;
        let tokens = TokenService::new(settings.token.clone(), Arc::clone(&clock))?;
        Ok(Self {
            store,
            clock,
            settings,
            hasher,
            tokens,
        })
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Create a user, and a customer profile when the request carries one
    ///
    /// Both rows are written in the same store transaction.
    pub fn register(&self, request: &RegisterRequest) -> Result<LoginSuccess> {
        let password_hash = self.hasher.hash(&request.password)?;
        let now = self.clock.utc();
        let role = request.role();
        let user = User::new(
            &request.username,
            password_hash,
            &request.email,
            &request.full_name,
            role,
            now,
        );
        let customer = (role == Role::Customer && request.has_complete_profile())
            .then(|| customer_profile(request, user.id, now))
            .flatten();

        self.store.atomically(|unit| {
            if unit.username_exists(&user.username)? {
                return Err(Error::UsernameTaken);
            }
            if unit.email_exists(&user.email)? {
                return Err(Error::EmailTaken);
            }
            unit.insert_user(&user)?;
            if let Some(customer) = &customer {
                if unit.passport_exists(&customer.passport_number)? {
                    return Err(Error::validation("passport number is already registered"));
                }
                unit.insert_customer(customer)?;
            }
            Ok(())
        })?;

        tracing::info!(
            user_id = %user.id,
            username = %user.username,
            role = %role,
            with_profile = customer.is_some(),
            "user registered"
        );

        Ok(LoginSuccess {
            token: self.tokens.issue(&user)?,
            user: user.view(),
            customer_id: customer.map(|c| c.id),
        })
    }

    /// Verify credentials and drive the lockout state machine
    pub fn login(&self, username: &str, password: &str) -> Result<LoginSuccess> {
        let user = match CredentialStore::read(self.store.as_ref(), |unit| {
            unit.get_user_by_username(username)
        })? {
            Some(user) => user,
            None => {
                self.hasher.verify_decoy(password);
                tracing::warn!("login failed for unknown user");
                return Err(Error::InvalidCredentials {
                    remaining_attempts: None,
                });
            }
        };

        match user.login_state(self.clock.utc()) {
            LoginState::Deactivated => return Err(Error::AccountDeactivated),
            LoginState::LockedTemporary(until) => return Err(Error::AccountLocked(until)),
            LoginState::Active => {}
        }

        if !self.hasher.verify(password, &user.password_hash)? {
            return Err(self.record_failure(user.id)?);
        }

        let user = CredentialStore::atomically(self.store.as_ref(), |unit| {
            let now = self.clock.utc();
            let mut current = unit
                .get_user(user.id)?
                .ok_or_else(|| Error::integrity(format!("user {} vanished during login", user.id)))?;
            // A concurrent failure may have locked the user meanwhile
            match current.login_state(now) {
                LoginState::Deactivated => return Err(Error::AccountDeactivated),
                LoginState::LockedTemporary(until) => return Err(Error::AccountLocked(until)),
                LoginState::Active => {}
            }
            unit.record_successful_login(current.id, now)?;
            current.failed_login_attempts = 0;
            current.locked_until = None;
            current.last_login_at = Some(now);
            Ok(current)
        })?;

        tracing::info!(user_id = %user.id, "login succeeded");
        Ok(LoginSuccess {
            token: self.tokens.issue(&user)?,
            user: user.view(),
            customer_id: None,
        })
    }

    /// Increment the failure counter and decide the resulting error
    ///
    /// The read and the write happen in one store transaction so concurrent
    /// failures never lose an increment.
    fn record_failure(&self, user_id: Uuid) -> Result<Error> {
        let threshold = self.settings.max_failed_attempts;
        let lockout = Duration::minutes(self.settings.lockout_minutes);

        CredentialStore::atomically(self.store.as_ref(), |unit| {
            let now = self.clock.utc();
            let current = unit
                .get_user(user_id)?
                .ok_or_else(|| Error::integrity(format!("user {} vanished during login", user_id)))?;
            let attempts = current.failed_login_attempts.saturating_add(1);

            if let Some(until) = current.locked_until.filter(|until| now < *until) {
                unit.update_login_failures(user_id, attempts, Some(until))?;
                return Ok(Error::AccountLocked(until));
            }

            if attempts >= threshold {
                let until: DateTime<Utc> = now + lockout;
                unit.update_login_failures(user_id, attempts, Some(until))?;
                tracing::warn!(user_id = %user_id, attempts, until = %until, "user locked out");
                return Ok(Error::AccountLocked(until));
            }

            unit.update_login_failures(user_id, attempts, current.locked_until)?;
            tracing::warn!(user_id = %user_id, attempts, "login failed");
            Ok(Error::InvalidCredentials {
                remaining_attempts: Some(threshold - attempts),
            })
        })
    }

    pub fn get_user(&self, user_id: Uuid) -> Result<UserView> {
        CredentialStore::read(self.store.as_ref(), |unit| unit.get_user(user_id))?
            .map(|user| user.view())
            .ok_or_else(|| Error::not_found(format!("user {}", user_id)))
    }

    pub fn get_customer(&self, user_id: Uuid) -> Result<Customer> {
        CredentialStore::read(self.store.as_ref(), |unit| unit.get_customer_by_user(user_id))?
            .ok_or_else(|| Error::not_found(format!("customer profile for user {}", user_id)))
    }

    pub fn deactivate(&self, user_id: Uuid) -> Result<()> {
        self.set_active(user_id, false)
    }

    pub fn reactivate(&self, user_id: Uuid) -> Result<()> {
        self.set_active(user_id, true)
    }

    fn set_active(&self, user_id: Uuid, active: bool) -> Result<()> {
        CredentialStore::atomically(self.store.as_ref(), |unit| {
            if unit.get_user(user_id)?.is_none() {
                return Err(Error::not_found(format!("user {}", user_id)));
            }
            unit.set_user_active(user_id, active)
        })?;
        tracing::info!(user_id = %user_id, active, "user activation changed");
        Ok(())
    }
}

fn customer_profile(request: &RegisterRequest, user_id: Uuid, now: DateTime<Utc>) -> Option<Customer> {
    let trimmed = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    Some(Customer {
        id: Uuid::new_v4(),
        user_id,
        first_name: trimmed(&request.first_name)?,
        last_name: trimmed(&request.last_name)?,
        middle_name: trimmed(&request.middle_name),
        date_of_birth: request.date_of_birth?,
        email: request.email.trim().to_string(),
        phone_number: trimmed(&request.phone_number)?,
        passport_number: trimmed(&request.passport_number)?,
        address: trimmed(&request.address),
        city: trimmed(&request.city),
        country: trimmed(&request.country).unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
        is_active: true,
        created_at: now,
        updated_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    use crate::config::TokenSettings;
    use chrono::NaiveDate;
    use mockable::DefaultClock;

    fn settings() -> AuthSettings {
        AuthSettings {
            password_hash: PasswordHashSettings::minimal(),
            token: TokenSettings {
                secret: "s".repeat(32),
                ..TokenSettings::default()
            },
            ..AuthSettings::default()
        }
    }

    fn setup() -> AuthService {
        let repo = Arc::new(DuckDbRepository::open_in_memory(StdDuration::from_secs(5)).unwrap());
        repo.ensure_schema().unwrap();
        AuthService::new(repo, Arc::new(DefaultClock), settings()).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = CredentialHasher::new(&PasswordHashSettings::minimal()).unwrap();
        let phc = hasher.hash("correct horse").unwrap();

        assert!(phc.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse", &phc).unwrap());
        assert!(!hasher.verify("wrong horse", &phc).unwrap());
        // Same password, different salt
        assert_ne!(phc, hasher.hash("correct horse").unwrap());
        assert!(hasher.verify("x", "not a phc string").is_err());
    }

    #[test]
    fn test_decoy_hash_matches_real_cost() {
        let hasher = CredentialHasher::new(&PasswordHashSettings::minimal()).unwrap();
        let real = hasher.hash("correct horse").unwrap();
        let params = |phc: &str| phc.split('$').take(4).collect::<Vec<_>>().join("$");

        assert_eq!(params(&hasher.decoy), params(&real));
        assert!(!hasher.verify("correct horse", &hasher.decoy).unwrap());
    }

    #[test]
    fn test_unknown_user_login_is_generic_failure() {
        let auth = setup();
        let err = auth.login("nobody", "whatever").err().unwrap();
        assert!(matches!(
            err,
            Error::InvalidCredentials {
                remaining_attempts: None
            }
        ));
    }

    #[test]
    fn test_out_of_range_lockout_is_config_error() {
        let repo = Arc::new(DuckDbRepository::open_in_memory(StdDuration::from_secs(5)).unwrap());
        for minutes in [0, MAX_PERIOD_MINUTES + 1, i64::MAX] {
            let settings = AuthSettings {
                lockout_minutes: minutes,
                ..settings()
            };
            assert!(
                matches!(
                    AuthService::new(Arc::clone(&repo), Arc::new(DefaultClock), settings),
                    Err(Error::Config(_))
                ),
                "{} accepted",
                minutes
            );
        }
    }

    #[test]
    fn test_register_then_login() {
        let auth = setup();
        let registered = auth
            .register(&RegisterRequest::new("Alice", "secret1", "alice@example.com", "Alice A"))
            .unwrap();
        assert_eq!(registered.user.username, "Alice");
        assert_eq!(registered.user.role, Role::Customer);
        assert!(registered.customer_id.is_none());

        // Username lookup is case-insensitive
        let login = auth.login("alice", "secret1").unwrap();
        assert_eq!(login.user.id, registered.user.id);
        assert!(login.user.last_login_at.is_some());

        let claims = auth.tokens().verify(&login.token.token).unwrap();
        assert_eq!(claims.sub, registered.user.id.to_string());
    }

    #[test]
    fn test_register_with_profile() {
        let auth = setup();
        let mut request = RegisterRequest::new("bobby", "secret1", "bob@example.com", "Bob B");
        request.first_name = Some("Bob".to_string());
        request.last_name = Some("Builder".to_string());
        request.date_of_birth = NaiveDate::from_ymd_opt(1990, 5, 17);
        request.passport_number = Some("A1234567".to_string());
        request.phone_number = Some("+992900000000".to_string());

        let registered = auth.register(&request).unwrap();
        let customer_id = registered.customer_id.unwrap();

        let customer = auth.get_customer(registered.user.id).unwrap();
        assert_eq!(customer.id, customer_id);
        assert_eq!(customer.country, DEFAULT_COUNTRY);

        // Same passport on another user rolls back the whole registration
        let mut duplicate = request.clone();
        duplicate.username = "robert".to_string();
        duplicate.email = "robert@example.com".to_string();
        assert!(matches!(
            auth.register(&duplicate).unwrap_err(),
            Error::Validation(_)
        ));
        assert!(matches!(
            auth.login("robert", "secret1").unwrap_err(),
            Error::InvalidCredentials {
                remaining_attempts: None
            }
        ));
    }

    #[test]
    fn test_duplicate_username_and_email() {
        let auth = setup();
        auth.register(&RegisterRequest::new("carol", "secret1", "carol@example.com", "Carol C"))
            .unwrap();

        assert!(matches!(
            auth.register(&RegisterRequest::new("CAROL", "secret1", "c2@example.com", "Carol C"))
                .unwrap_err(),
            Error::UsernameTaken
        ));
        assert!(matches!(
            auth.register(&RegisterRequest::new("carol2", "secret1", "Carol@Example.com", "Carol C"))
                .unwrap_err(),
            Error::EmailTaken
        ));
    }

    #[test]
    fn test_failures_count_down_then_lock() {
        let auth = setup();
        auth.register(&RegisterRequest::new("dave", "secret1", "dave@example.com", "Dave D"))
            .unwrap();

        for remaining in (1..5).rev() {
            match auth.login("dave", "wrong").unwrap_err() {
                Error::InvalidCredentials {
                    remaining_attempts: Some(r),
                } => assert_eq!(r, remaining),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(matches!(
            auth.login("dave", "wrong").unwrap_err(),
            Error::AccountLocked(_)
        ));
        assert!(matches!(
            auth.login("dave", "secret1").unwrap_err(),
            Error::AccountLocked(_)
        ));
    }

    #[test]
    fn test_success_resets_counter() {
        let auth = setup();
        auth.register(&RegisterRequest::new("erin", "secret1", "erin@example.com", "Erin E"))
            .unwrap();

        for _ in 0..3 {
            assert!(auth.login("erin", "wrong").is_err());
        }
        auth.login("erin", "secret1").unwrap();

        match auth.login("erin", "wrong").unwrap_err() {
            Error::InvalidCredentials {
                remaining_attempts: Some(r),
            } => assert_eq!(r, 4),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_deactivated_user_cannot_login() {
        let auth = setup();
        let registered = auth
            .register(&RegisterRequest::new("frank", "secret1", "frank@example.com", "Frank F"))
            .unwrap();

        auth.deactivate(registered.user.id).unwrap();
        assert!(matches!(
            auth.login("frank", "secret1").unwrap_err(),
            Error::AccountDeactivated
        ));
        assert!(!auth.get_user(registered.user.id).unwrap().is_active);

        auth.reactivate(registered.user.id).unwrap();
        assert!(auth.login("frank", "secret1").is_ok());
        assert!(auth.deactivate(Uuid::new_v4()).is_err());
    }
}
