//! Credential store port - users and customer profiles

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{Customer, User};

pub trait CredentialUnit {
    /// Case-insensitive lookup
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;

    fn get_user(&self, id: Uuid) -> Result<Option<User>>;

    /// Case-insensitive
    fn username_exists(&self, username: &str) -> Result<bool>;

    /// Case-insensitive
    fn email_exists(&self, email: &str) -> Result<bool>;

    fn passport_exists(&self, passport_number: &str) -> Result<bool>;

    fn insert_user(&self, user: &User) -> Result<()>;

    fn insert_customer(&self, customer: &Customer) -> Result<()>;

    fn get_customer_by_user(&self, user_id: Uuid) -> Result<Option<Customer>>;

    /// Persist the failure counter and lock together
    fn update_login_failures(
        &self,
        user_id: Uuid,
        failed_attempts: u32,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Reset the counter, clear the lock and stamp the login time
    fn record_successful_login(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    fn set_user_active(&self, user_id: Uuid, active: bool) -> Result<()>;
}

/// Durable home of credential records
pub trait CredentialStore: Send + Sync {
    /// Run `f` inside one database transaction; `Ok` commits, `Err` rolls back
    fn atomically<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn CredentialUnit) -> Result<T>;

    /// Run read-only queries against committed state
    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn CredentialUnit) -> Result<T>;
}
