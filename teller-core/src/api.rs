//! External contract - the operations callers see and the shapes they get
//!
//! Every method here returns a result DTO and never propagates an error.
//! Ledger failures carry specific messages; authentication failures stay
//! generic. Internal errors are logged and replaced by a fixed sentence.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::result::{Error, ErrorKind, OperationResult, Result};
use crate::domain::{
    Account, Customer, DepositRequest, OpenAccountRequest, RegisterRequest, Transaction,
    TransferRequest, UserView, WithdrawalRequest,
};
use crate::services::{
    AuditEvent, BalanceView, LedgerReceipt, LoginSuccess, Reconciliation, SessionClaims,
    TransactionPage, DEFAULT_PAGE_SIZE,
};
use crate::TellerContext;

/// Outcome of a deposit, withdrawal or transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub success: bool,
    pub message: String,
    pub transaction_id: Option<Uuid>,
    pub reference_number: Option<String>,
    pub new_balance: Option<Decimal>,
    pub error_code: Option<String>,
}

impl TransactionResult {
    fn completed(message: &str, receipt: LedgerReceipt) -> Self {
        let message = if receipt.replayed {
            format!("{} (already processed)", message)
        } else {
            message.to_string()
        };
        Self {
            success: true,
            message,
            transaction_id: Some(receipt.transaction_id),
            reference_number: Some(receipt.reference_number),
            new_balance: Some(receipt.new_balance),
            error_code: None,
        }
    }

    fn failed(err: &Error) -> Self {
        Self {
            success: false,
            message: err.public_message(),
            transaction_id: None,
            reference_number: None,
            new_balance: None,
            error_code: Some(err.code().to_string()),
        }
    }
}

/// Outcome of a login or registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResult {
    pub success: bool,
    pub token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: Option<UserView>,
    pub customer_id: Option<Uuid>,
    pub message: String,
    pub error_code: Option<String>,
}

impl AuthResult {
    fn succeeded(message: &str, success: LoginSuccess) -> Self {
        Self {
            success: true,
            token: Some(success.token.token),
            expires_at: Some(success.token.expires_at),
            user: Some(success.user),
            customer_id: success.customer_id,
            message: message.to_string(),
            error_code: None,
        }
    }

    fn failed(err: &Error) -> Self {
        Self {
            success: false,
            token: None,
            expires_at: None,
            user: None,
            customer_id: None,
            message: err.public_message(),
            error_code: Some(err.code().to_string()),
        }
    }
}

impl TellerContext {
    // === Accounts ===

    pub fn open_account(&self, request: &OpenAccountRequest) -> OperationResult<Account> {
        let result = request
            .validate(&self.config.ledger.limits)
            .and_then(|_| self.account_service.open(request));
        match &result {
            Ok(account) => self.audit(
                AuditEvent::new("account_opened")
                    .with_subject(account.id)
                    .with_command(account.account_type.as_str()),
            ),
            Err(e) => self.audit_failure("account_open_rejected", request.owner_id, e),
        }
        self.envelope("open_account", result)
    }

    pub fn get_account(&self, account_id: Uuid) -> OperationResult<Account> {
        self.envelope("get_account", self.account_service.get(account_id))
    }

    pub fn get_account_by_number(&self, account_number: &str) -> OperationResult<Account> {
        self.envelope(
            "get_account_by_number",
            self.account_service.get_by_number(account_number),
        )
    }

    pub fn get_accounts_by_owner(&self, owner_id: Uuid) -> OperationResult<Vec<Account>> {
        self.envelope(
            "get_accounts_by_owner",
            self.account_service.list_by_owner(owner_id),
        )
    }

    pub fn get_balance(&self, account_id: Uuid) -> OperationResult<BalanceView> {
        self.envelope("get_balance", self.account_service.balance(account_id))
    }

    pub fn freeze_account(&self, account_id: Uuid) -> OperationResult<Account> {
        let result = self.account_service.freeze(account_id);
        self.audit_status("account_frozen", account_id, &result);
        self.envelope("freeze_account", result)
    }

    pub fn unfreeze_account(&self, account_id: Uuid) -> OperationResult<Account> {
        let result = self.account_service.unfreeze(account_id);
        self.audit_status("account_unfrozen", account_id, &result);
        self.envelope("unfreeze_account", result)
    }

    pub fn close_account(&self, account_id: Uuid) -> OperationResult<Account> {
        let result = self.account_service.close(account_id);
        self.audit_status("account_closed", account_id, &result);
        self.envelope("close_account", result)
    }

    pub fn reconcile(&self, account_id: Uuid) -> OperationResult<Reconciliation> {
        let result = self.ledger_service.reconcile(account_id);
        if let Ok(rec) = &result {
            if !rec.is_balanced() {
                self.audit(
                    AuditEvent::new("reconciliation_mismatch")
                        .with_subject(account_id)
                        .with_error("BALANCE_MISMATCH", "stored balance differs from log"),
                );
            }
        }
        self.envelope("reconcile", result)
    }

    // === Money movement ===

    pub fn deposit(&self, request: &DepositRequest) -> TransactionResult {
        let result = request
            .validate(&self.config.ledger.limits)
            .and_then(|_| self.ledger_service.deposit(request));
        self.movement("deposit", request.account_id, "Deposit completed", result)
    }

    pub fn withdraw(&self, request: &WithdrawalRequest) -> TransactionResult {
        let result = request
            .validate(&self.config.ledger.limits)
            .and_then(|_| self.ledger_service.withdraw(request));
        self.movement("withdrawal", request.account_id, "Withdrawal completed", result)
    }

    pub fn transfer(&self, request: &TransferRequest) -> TransactionResult {
        let result = request
            .validate(&self.config.ledger.limits)
            .and_then(|_| self.ledger_service.transfer(request));
        self.movement(
            "transfer",
            request.from_account_id,
            "Transfer completed",
            result,
        )
    }

    fn movement(
        &self,
        operation: &str,
        account_id: Uuid,
        message: &str,
        result: Result<LedgerReceipt>,
    ) -> TransactionResult {
        match result {
            Ok(receipt) => {
                let event = if receipt.replayed { "replayed" } else { "completed" };
                self.audit(
                    AuditEvent::new(format!("{}_{}", operation, event))
                        .with_subject(account_id)
                        .with_reference(receipt.reference_number.clone()),
                );
                TransactionResult::completed(message, receipt)
            }
            Err(e) => {
                self.log_internal(operation, &e);
                self.audit_failure(&format!("{}_rejected", operation), account_id, &e);
                TransactionResult::failed(&e)
            }
        }
    }

    // === Transaction queries ===

    pub fn get_transaction(&self, transaction_id: Uuid) -> OperationResult<Transaction> {
        self.envelope(
            "get_transaction",
            self.account_service.get_transaction(transaction_id),
        )
    }

    pub fn get_transaction_by_reference(&self, reference_number: &str) -> OperationResult<Transaction> {
        self.envelope(
            "get_transaction_by_reference",
            self.account_service
                .get_transaction_by_reference(reference_number),
        )
    }

    /// Newest first; `page` starts at 1, `page_size` defaults to 20
    pub fn get_account_transactions(
        &self,
        account_id: Uuid,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> OperationResult<Vec<Transaction>> {
        let result = self.account_service.history(
            account_id,
            page.unwrap_or(1),
            page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        );
        match result {
            Ok(page) => page_result(page),
            Err(e) => {
                self.log_internal("get_account_transactions", &e);
                OperationResult::from_error(&e)
            }
        }
    }

    // === Authentication ===

    pub fn login(&self, username: &str, password: &str) -> AuthResult {
        match self.auth_service.login(username, password) {
            Ok(success) => {
                self.audit(AuditEvent::new("login_succeeded").with_subject(success.user.id));
                AuthResult::succeeded("Login successful", success)
            }
            Err(e) => {
                self.log_internal("login", &e);
                let event = match e {
                    Error::AccountLocked(_) => "account_locked",
                    _ => "login_failed",
                };
                // Usernames are user-supplied; record them only when they exist
                let mut audit = AuditEvent::new(event).with_error(e.code(), e.to_string());
                if !matches!(e, Error::InvalidCredentials { remaining_attempts: None }) {
                    audit = audit.with_subject(username.trim().to_lowercase());
                }
                self.audit(audit);
                AuthResult::failed(&e)
            }
        }
    }

    pub fn register(&self, request: &RegisterRequest) -> AuthResult {
        let result = request
            .validate()
            .and_then(|_| self.auth_service.register(request));
        match result {
            Ok(success) => {
                self.audit(AuditEvent::new("user_registered").with_subject(success.user.id));
                AuthResult::succeeded("Registration successful", success)
            }
            Err(e) => {
                self.log_internal("register", &e);
                self.audit(
                    AuditEvent::new("registration_rejected").with_error(e.code(), e.to_string()),
                );
                AuthResult::failed(&e)
            }
        }
    }

    pub fn verify_token(&self, token: &str) -> OperationResult<SessionClaims> {
        self.envelope("verify_token", self.auth_service.tokens().verify(token))
    }

    pub fn get_user(&self, user_id: Uuid) -> OperationResult<UserView> {
        self.envelope("get_user", self.auth_service.get_user(user_id))
    }

    pub fn get_customer(&self, user_id: Uuid) -> OperationResult<Customer> {
        self.envelope("get_customer", self.auth_service.get_customer(user_id))
    }

    pub fn deactivate_user(&self, user_id: Uuid) -> OperationResult<()> {
        let result = self.auth_service.deactivate(user_id);
        if result.is_ok() {
            self.audit(AuditEvent::new("user_deactivated").with_subject(user_id));
        }
        self.envelope("deactivate_user", result)
    }

    pub fn reactivate_user(&self, user_id: Uuid) -> OperationResult<()> {
        let result = self.auth_service.reactivate(user_id);
        if result.is_ok() {
            self.audit(AuditEvent::new("user_reactivated").with_subject(user_id));
        }
        self.envelope("reactivate_user", result)
    }

    // === Plumbing ===

    fn envelope<T>(&self, operation: &str, result: Result<T>) -> OperationResult<T> {
        if let Err(e) = &result {
            self.log_internal(operation, e);
        }
        OperationResult::from(result)
    }

    fn log_internal(&self, operation: &str, err: &Error) {
        if err.kind() == ErrorKind::Internal {
            tracing::error!(operation, error = %err, "internal error");
        }
    }

    fn audit(&self, event: AuditEvent) {
        if let Err(e) = self.audit_log.record(event) {
            tracing::warn!(error = %e, "failed to write audit event");
        }
    }

    fn audit_failure(&self, event: &str, subject: Uuid, err: &Error) {
        self.audit(
            AuditEvent::new(event)
                .with_subject(subject)
                .with_error(err.code(), err.public_message()),
        );
    }

    fn audit_status(&self, event: &str, account_id: Uuid, result: &Result<Account>) {
        match result {
            Ok(_) => self.audit(AuditEvent::new(event).with_subject(account_id)),
            Err(e) => self.audit_failure(&format!("{}_rejected", event), account_id, e),
        }
    }
}

fn page_result(page: TransactionPage) -> OperationResult<Vec<Transaction>> {
    let mut context = std::collections::HashMap::new();
    context.insert("page".to_string(), serde_json::json!(page.page));
    context.insert("pageSize".to_string(), serde_json::json!(page.page_size));
    context.insert("total".to_string(), serde_json::json!(page.total));
    context.insert("totalPages".to_string(), serde_json::json!(page.total_pages()));
    OperationResult::ok_with_context(page.items, context)
}
