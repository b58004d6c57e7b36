//! Account service - opening, lifecycle and read-side queries

use std::sync::Arc;

use mockable::Clock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ledger::{allocate_reference, credited};
use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::{Error, Result};
use crate::domain::{
    generate_account_number, Account, AccountStatus, OpenAccountRequest, Transaction,
    TransactionType,
};
use crate::ports::{LedgerStore, LedgerUnit};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

const MAX_NUMBER_ATTEMPTS: u32 = 5;
const OPENING_DESCRIPTION: &str = "Opening balance";

/// Balance snapshot of one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceView {
    pub account_id: Uuid,
    pub account_number: String,
    pub balance: Decimal,
    pub currency: String,
    pub status: AccountStatus,
}

impl From<&Account> for BalanceView {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.id,
            account_number: account.account_number.clone(),
            balance: account.balance,
            currency: account.currency.clone(),
            status: account.status,
        }
    }
}

/// One page of an account's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionPage {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub items: Vec<Transaction>,
}

impl TransactionPage {
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(u64::from(self.page_size))
    }
}

pub struct AccountService<S = DuckDbRepository> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    default_currency: String,
}

impl<S: LedgerStore> AccountService<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, default_currency: impl Into<String>) -> Self {
        Self {
            store,
            clock,
            default_currency: default_currency.into(),
        }
    }

    /// Open an account with a fresh number
    ///
    /// A non-zero opening balance is written as a completed deposit so the
    /// log accounts for every unit of the balance.
    pub fn open(&self, request: &OpenAccountRequest) -> Result<Account> {
        let now = self.clock.utc();
        let currency = request
            .currency
            .as_deref()
            .unwrap_or(&self.default_currency);

        let account = self.store.atomically(|unit| {
            let mut account = Account::new(
                request.owner_id,
                unique_account_number(unit)?,
                request.account_type,
                currency,
            );
            account.opened_at = now;
            if let Some(rate) = request.interest_rate {
                account.interest_rate = rate;
            }
            account.validate().map_err(Error::validation)?;
            unit.insert_account(&account)?;

            if let Some(amount) = request.initial_deposit.filter(|a| *a > Decimal::ZERO) {
                let amount = credited(Decimal::ZERO, amount)?;
                unit.update_balance(account.id, amount, now)?;
                let tx = Transaction::new(
                    account.id,
                    TransactionType::Deposit,
                    amount,
                    &account.currency,
                    allocate_reference(unit, now)?,
                    now,
                )
                .with_description(Some(OPENING_DESCRIPTION.to_string()))
                .with_balance_after(amount);
                unit.insert_transaction(&tx)?;
                account.balance = amount;
                account.last_transaction_at = Some(now);
            }
            Ok(account)
        })?;

        tracing::info!(
            account_id = %account.id,
            account_number = %account.account_number,
            owner_id = %account.owner_id,
            "account opened"
        );
        Ok(account)
    }

    pub fn get(&self, id: Uuid) -> Result<Account> {
        self.store
            .read(|unit| unit.get_account(id))?
            .ok_or(Error::AccountNotFound(id))
    }

    pub fn get_by_number(&self, account_number: &str) -> Result<Account> {
        self.store
            .read(|unit| unit.get_account_by_number(account_number))?
            .ok_or_else(|| Error::not_found(format!("account number {}", account_number)))
    }

    pub fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Account>> {
        self.store.read(|unit| unit.get_accounts_by_owner(owner_id))
    }

    pub fn balance(&self, id: Uuid) -> Result<BalanceView> {
        self.get(id).map(|account| BalanceView::from(&account))
    }

    pub fn freeze(&self, id: Uuid) -> Result<Account> {
        self.transition(id, AccountStatus::Frozen)
    }

    pub fn unfreeze(&self, id: Uuid) -> Result<Account> {
        self.transition(id, AccountStatus::Active)
    }

    /// Close an account; there is no way back
    pub fn close(&self, id: Uuid) -> Result<Account> {
        self.transition(id, AccountStatus::Closed)
    }

    fn transition(&self, id: Uuid, target: AccountStatus) -> Result<Account> {
        let now = self.clock.utc();
        let account = self.store.atomically(|unit| {
            let mut account = unit.get_account(id)?.ok_or(Error::AccountNotFound(id))?;
            if account.is_closed() {
                return Err(Error::AccountClosed(id));
            }
            if account.status == target {
                return Ok(account);
            }
            let closed_at = (target == AccountStatus::Closed).then_some(now);
            unit.set_account_status(id, target, closed_at)?;
            account.status = target;
            account.closed_at = closed_at;
            Ok(account)
        })?;

        tracing::info!(account_id = %id, status = %account.status, "account status changed");
        Ok(account)
    }

    pub fn get_transaction(&self, id: Uuid) -> Result<Transaction> {
        self.store
            .read(|unit| unit.get_transaction(id))?
            .ok_or_else(|| Error::not_found(format!("transaction {}", id)))
    }

    pub fn get_transaction_by_reference(&self, reference_number: &str) -> Result<Transaction> {
        self.store
            .read(|unit| unit.get_transaction_by_reference(reference_number))?
            .ok_or_else(|| Error::not_found(format!("transaction {}", reference_number)))
    }

    /// Page through an account's history, newest first
    ///
    /// Includes transfers where the account is the counterparty.
    pub fn history(&self, account_id: Uuid, page: u32, page_size: u32) -> Result<TransactionPage> {
        if page == 0 {
            return Err(Error::validation("page must be at least 1"));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(Error::validation(format!(
                "page size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        let offset = u64::from(page - 1) * u64::from(page_size);

        self.store.read(|unit| {
            if unit.get_account(account_id)?.is_none() {
                return Err(Error::AccountNotFound(account_id));
            }
            let total = unit.count_account_transactions(account_id)?;
            let items = unit.get_account_transactions(account_id, page_size, offset)?;
            Ok(TransactionPage {
                page,
                page_size,
                total,
                items,
            })
        })
    }
}

fn unique_account_number(unit: &dyn LedgerUnit) -> Result<String> {
    for _ in 0..MAX_NUMBER_ATTEMPTS {
        let candidate = generate_account_number();
        if unit.get_account_by_number(&candidate)?.is_none() {
            return Ok(candidate);
        }
    }
    Err(Error::integrity(format!(
        "no unused account number after {} attempts",
        MAX_NUMBER_ATTEMPTS
    )))
}
