//! Ledger service - deposits, withdrawals and transfers
//!
//! Every movement is one atomic unit against the store: read the current
//! balance, validate, write the new balance, append the log record. The store
//! serializes units, so two debits can never both observe the same balance.
//!
//! Rejections for insufficient funds can leave a `Failed` record behind
//! (when `record_failed_attempts` is on). That record is committed on its
//! own; the balance is never touched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mockable::Clock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapters::duckdb::DuckDbRepository;
use crate::config::LedgerSettings;
use crate::domain::idempotency::IdempotencyLookup;
use crate::domain::requests::check_amount;
use crate::domain::result::{Error, Result};
use crate::domain::{
    generate_reference_number, Account, AccountStatus, DepositRequest, IdempotencyKey,
    IdempotencyRecord, LedgerOperation, PayloadHash, Transaction, TransactionStatus,
    TransactionType, TransferRequest, WithdrawalRequest,
};
use crate::ports::{LedgerStore, LedgerUnit};

/// Attempts at drawing an unused reference number before giving up
const MAX_REFERENCE_ATTEMPTS: u32 = 5;

/// Largest balance the DECIMAL(18,2) column holds
// Same value as Decimal::new(999_999_999_999_999_999, 2); from_parts is const
pub const MAX_BALANCE: Decimal = Decimal::from_parts(0xA763_FFFF, 0x0DE0_B6B3, 0, false, 2);

/// Outcome of a completed (or replayed) movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub transaction_id: Uuid,
    pub reference_number: String,
    /// Account whose balance is reported (the source for transfers)
    pub account_id: Uuid,
    pub new_balance: Decimal,
    /// Destination balance after a transfer; unknown on replay
    pub counterparty_balance: Option<Decimal>,
    /// True when the result was served from an earlier request with the same
    /// idempotency key
    pub replayed: bool,
}

/// Stored balance against the log recomputation for one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub account_id: Uuid,
    pub stored_balance: Decimal,
    pub computed_balance: Decimal,
    pub completed_transactions: usize,
}

impl Reconciliation {
    pub fn is_balanced(&self) -> bool {
        self.stored_balance == self.computed_balance
    }

    pub fn difference(&self) -> Decimal {
        self.stored_balance - self.computed_balance
    }
}

/// Ledger engine
pub struct LedgerService<S = DuckDbRepository> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    settings: LedgerSettings,
}

impl<S: LedgerStore> LedgerService<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, settings: LedgerSettings) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    /// Credit an account
    ///
    /// Frozen accounts still accept deposits; closed ones do not.
    pub fn deposit(&self, request: &DepositRequest) -> Result<LedgerReceipt> {
        check_amount(request.amount)?;
        let guard = Idempotency::new(
            request.idempotency_key,
            LedgerOperation::Deposit,
            || request.payload_hash(),
        );
        let now = self.clock.utc();

        let receipt = self.store.atomically(|unit| {
            if let Some(receipt) = guard.replay(unit)? {
                return Ok(receipt);
            }

            let account = load_account(unit, request.account_id)?;
            if !account.can_receive_deposit() {
                return Err(Error::AccountClosed(account.id));
            }

            let new_balance = credited(account.balance, request.amount)?;
            unit.update_balance(account.id, new_balance, now)?;

            let tx = Transaction::new(
                account.id,
                TransactionType::Deposit,
                request.amount,
                &account.currency,
                allocate_reference(unit, now)?,
                now,
            )
            .with_description(request.description.clone())
            .with_balance_after(new_balance);
            unit.insert_transaction(&tx)?;
            guard.remember(unit, tx.id, now)?;

            Ok(receipt_for(&tx, new_balance, None))
        })?;

        if !receipt.replayed {
            tracing::info!(
                account_id = %receipt.account_id,
                reference = %receipt.reference_number,
                amount = %request.amount,
                "deposit completed"
            );
        }
        Ok(receipt)
    }

    /// Debit an active account
    pub fn withdraw(&self, request: &WithdrawalRequest) -> Result<LedgerReceipt> {
        check_amount(request.amount)?;
        let guard = Idempotency::new(
            request.idempotency_key,
            LedgerOperation::Withdrawal,
            || request.payload_hash(),
        );
        let now = self.clock.utc();

        // Outer error rolls back; inner error is a rejection whose Failed
        // record should still be committed.
        let outcome = self.store.atomically(|unit| {
            if let Some(receipt) = guard.replay(unit)? {
                return Ok(Ok(receipt));
            }

            let account = load_account(unit, request.account_id)?;
            ensure_debitable(&account)?;

            if account.balance < request.amount {
                let rejection = Error::InsufficientFunds {
                    account_id: account.id,
                    balance: account.balance,
                    requested: request.amount,
                };
                if self.settings.record_failed_attempts {
                    let failed = Transaction::new(
                        account.id,
                        TransactionType::Withdrawal,
                        request.amount,
                        &account.currency,
                        allocate_reference(unit, now)?,
                        now,
                    )
                    .with_description(request.description.clone())
                    .with_status(TransactionStatus::Failed)
                    .with_balance_after(account.balance);
                    unit.insert_transaction(&failed)?;
                    return Ok(Err(rejection));
                }
                return Err(rejection);
            }

            let new_balance = account.balance - request.amount;
            unit.update_balance(account.id, new_balance, now)?;

            let tx = Transaction::new(
                account.id,
                TransactionType::Withdrawal,
                request.amount,
                &account.currency,
                allocate_reference(unit, now)?,
                now,
            )
            .with_description(request.description.clone())
            .with_balance_after(new_balance);
            unit.insert_transaction(&tx)?;
            guard.remember(unit, tx.id, now)?;

            Ok(Ok(receipt_for(&tx, new_balance, None)))
        });

        match outcome.and_then(|inner| inner) {
            Ok(receipt) => {
                if !receipt.replayed {
                    tracing::info!(
                        account_id = %receipt.account_id,
                        reference = %receipt.reference_number,
                        amount = %request.amount,
                        "withdrawal completed"
                    );
                }
                Ok(receipt)
            }
            Err(e) => {
                tracing::warn!(
                    account_id = %request.account_id,
                    amount = %request.amount,
                    code = e.code(),
                    "withdrawal rejected"
                );
                Err(e)
            }
        }
    }

    /// Move funds between two active accounts of the same currency
    ///
    /// One record is appended, from the source perspective, with the
    /// destination as counterparty.
    pub fn transfer(&self, request: &TransferRequest) -> Result<LedgerReceipt> {
        if request.from_account_id == request.to_account_id {
            return Err(Error::SameAccount);
        }
        check_amount(request.amount)?;
        let guard = Idempotency::new(
            request.idempotency_key,
            LedgerOperation::Transfer,
            || request.payload_hash(),
        );
        let now = self.clock.utc();

        let outcome = self.store.atomically(|unit| {
            if let Some(receipt) = guard.replay(unit)? {
                return Ok(Ok(receipt));
            }

            let (source, destination) =
                load_pair(unit, request.from_account_id, request.to_account_id)?;
            ensure_debitable(&source)?;
            ensure_debitable(&destination)?;
            if source.currency != destination.currency {
                return Err(Error::CurrencyMismatch {
                    from: source.currency.clone(),
                    to: destination.currency.clone(),
                });
            }

            if source.balance < request.amount {
                let rejection = Error::InsufficientFunds {
                    account_id: source.id,
                    balance: source.balance,
                    requested: request.amount,
                };
                if self.settings.record_failed_attempts {
                    let failed = Transaction::new(
                        source.id,
                        TransactionType::Transfer,
                        request.amount,
                        &source.currency,
                        allocate_reference(unit, now)?,
                        now,
                    )
                    .with_description(request.description.clone())
                    .with_counterparty(destination.id)
                    .with_status(TransactionStatus::Failed)
                    .with_balance_after(source.balance);
                    unit.insert_transaction(&failed)?;
                    return Ok(Err(rejection));
                }
                return Err(rejection);
            }

            let destination_balance = credited(destination.balance, request.amount)?;
            let source_balance = source.balance - request.amount;
            unit.update_balance(source.id, source_balance, now)?;
            unit.update_balance(destination.id, destination_balance, now)?;

            let tx = Transaction::new(
                source.id,
                TransactionType::Transfer,
                request.amount,
                &source.currency,
                allocate_reference(unit, now)?,
                now,
            )
            .with_description(request.description.clone())
            .with_counterparty(destination.id)
            .with_balance_after(source_balance);
            unit.insert_transaction(&tx)?;
            guard.remember(unit, tx.id, now)?;

            Ok(Ok(receipt_for(&tx, source_balance, Some(destination_balance))))
        });

        match outcome.and_then(|inner| inner) {
            Ok(receipt) => {
                if !receipt.replayed {
                    tracing::info!(
                        from = %request.from_account_id,
                        to = %request.to_account_id,
                        reference = %receipt.reference_number,
                        amount = %request.amount,
                        "transfer completed"
                    );
                }
                Ok(receipt)
            }
            Err(e) => {
                tracing::warn!(
                    from = %request.from_account_id,
                    to = %request.to_account_id,
                    amount = %request.amount,
                    code = e.code(),
                    "transfer rejected"
                );
                Err(e)
            }
        }
    }

    /// Recompute an account's balance from its completed log records
    pub fn reconcile(&self, account_id: Uuid) -> Result<Reconciliation> {
        self.store.read(|unit| {
            let account = load_account(unit, account_id)?;
            let records = unit.get_completed_transactions_involving(account_id)?;
            let computed_balance = records
                .iter()
                .map(|tx| tx.signed_amount_for(account_id))
                .sum();

            let result = Reconciliation {
                account_id,
                stored_balance: account.balance,
                computed_balance,
                completed_transactions: records.len(),
            };
            if !result.is_balanced() {
                tracing::error!(
                    account_id = %account_id,
                    stored = %result.stored_balance,
                    computed = %result.computed_balance,
                    "balance does not match transaction log"
                );
            }
            Ok(result)
        })
    }
}

/// Idempotency handling for one request
struct Idempotency {
    key: Option<IdempotencyKey>,
    operation: LedgerOperation,
    request_hash: Option<PayloadHash>,
}

impl Idempotency {
    fn new<H>(key: Option<IdempotencyKey>, operation: LedgerOperation, hash: H) -> Self
    where
        H: FnOnce() -> PayloadHash,
    {
        let request_hash = key.map(|_| hash());
        Self {
            key,
            operation,
            request_hash,
        }
    }

    /// Prior receipt for a repeated request, or a conflict error
    fn replay(&self, unit: &dyn LedgerUnit) -> Result<Option<LedgerReceipt>> {
        let (key, hash) = match (&self.key, &self.request_hash) {
            (Some(key), Some(hash)) => (key, hash),
            _ => return Ok(None),
        };
        let existing = unit.find_idempotency(key)?;
        match IdempotencyRecord::lookup(existing.as_ref(), self.operation, hash) {
            IdempotencyLookup::Fresh => Ok(None),
            IdempotencyLookup::Conflict => Err(Error::IdempotencyConflict(format!(
                "key {} was already used for a different request",
                key
            ))),
            IdempotencyLookup::Replay(transaction_id) => {
                let tx = unit.get_transaction(transaction_id)?.ok_or_else(|| {
                    Error::integrity(format!(
                        "idempotency key {} points at missing transaction {}",
                        key, transaction_id
                    ))
                })?;
                tracing::debug!(key = %key, reference = %tx.reference_number, "replaying request");
                let mut receipt = receipt_for(&tx, tx.balance_after.unwrap_or_default(), None);
                receipt.replayed = true;
                Ok(Some(receipt))
            }
        }
    }

    fn remember(
        &self,
        unit: &dyn LedgerUnit,
        transaction_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if let (Some(key), Some(hash)) = (&self.key, &self.request_hash) {
            unit.insert_idempotency(&IdempotencyRecord {
                key: *key,
                operation: self.operation,
                request_hash: hash.clone(),
                transaction_id,
                created_at: now,
            })?;
        }
        Ok(())
    }
}

fn receipt_for(
    tx: &Transaction,
    new_balance: Decimal,
    counterparty_balance: Option<Decimal>,
) -> LedgerReceipt {
    LedgerReceipt {
        transaction_id: tx.id,
        reference_number: tx.reference_number.clone(),
        account_id: tx.account_id,
        new_balance,
        counterparty_balance,
        replayed: false,
    }
}

fn load_account(unit: &dyn LedgerUnit, id: Uuid) -> Result<Account> {
    unit.get_account(id)?.ok_or(Error::AccountNotFound(id))
}

/// Load both sides of a transfer in ascending id order
fn load_pair(unit: &dyn LedgerUnit, from: Uuid, to: Uuid) -> Result<(Account, Account)> {
    if from < to {
        let source = load_account(unit, from)?;
        let destination = load_account(unit, to)?;
        Ok((source, destination))
    } else {
        let destination = load_account(unit, to)?;
        let source = load_account(unit, from)?;
        Ok((source, destination))
    }
}

fn ensure_debitable(account: &Account) -> Result<()> {
    if account.status != AccountStatus::Active {
        return Err(Error::AccountFrozenOrClosed {
            account_id: account.id,
            status: account.status,
        });
    }
    Ok(())
}

/// Balance after a credit, refused when it would pass `MAX_BALANCE`
pub(crate) fn credited(balance: Decimal, amount: Decimal) -> Result<Decimal> {
    balance
        .checked_add(amount)
        .filter(|total| *total <= MAX_BALANCE)
        .ok_or_else(|| {
            Error::invalid_amount(format!(
                "amount {} would take the balance above {}",
                amount, MAX_BALANCE
            ))
        })
}

/// Draw a reference number not yet present in the log
pub(crate) fn allocate_reference(unit: &dyn LedgerUnit, now: DateTime<Utc>) -> Result<String> {
    for _ in 0..MAX_REFERENCE_ATTEMPTS {
        let candidate = generate_reference_number(now);
        if !unit.reference_exists(&candidate)? {
            return Ok(candidate);
        }
        tracing::debug!(reference = %candidate, "reference collision, drawing again");
    }
    Err(Error::integrity(format!(
        "no unused reference number after {} attempts",
        MAX_REFERENCE_ATTEMPTS
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::domain::{generate_account_number, AccountType};
    use mockable::DefaultClock;

    fn money(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    fn setup(settings: LedgerSettings) -> (Arc<DuckDbRepository>, LedgerService) {
        let repo = Arc::new(DuckDbRepository::open_in_memory(Duration::from_secs(5)).unwrap());
        repo.ensure_schema().unwrap();
        let service = LedgerService::new(Arc::clone(&repo), Arc::new(DefaultClock), settings);
        (repo, service)
    }

    fn open(repo: &DuckDbRepository, balance: &str, currency: &str, status: AccountStatus) -> Uuid {
        let mut account = Account::new(
            Uuid::new_v4(),
            generate_account_number(),
            AccountType::Checking,
            currency,
        );
        account.balance = money(balance);
        account.status = status;
        repo.atomically(|unit| unit.insert_account(&account)).unwrap();
        account.id
    }

    fn balance(repo: &DuckDbRepository, id: Uuid) -> Decimal {
        repo.read(|unit| unit.get_account(id)).unwrap().unwrap().balance
    }

    fn history(repo: &DuckDbRepository, id: Uuid) -> Vec<Transaction> {
        repo.read(|unit| unit.get_account_transactions(id, 100, 0)).unwrap()
    }

    #[test]
    fn test_deposit_credits_and_logs() {
        let (repo, ledger) = setup(LedgerSettings::default());
        let id = open(&repo, "10.00", "TJS", AccountStatus::Active);

        let receipt = ledger
            .deposit(&DepositRequest::new(id, money("5.25")).with_description("cash"))
            .unwrap();

        assert_eq!(receipt.new_balance, money("15.25"));
        assert!(!receipt.replayed);
        assert_eq!(balance(&repo, id), money("15.25"));

        let log = history(&repo, id);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].transaction_type, TransactionType::Deposit);
        assert_eq!(log[0].status, TransactionStatus::Completed);
        assert_eq!(log[0].balance_after, Some(money("15.25")));
        assert_eq!(log[0].description.as_deref(), Some("cash"));
        assert_eq!(log[0].reference_number, receipt.reference_number);
    }

    #[test]
    fn test_deposit_past_balance_ceiling_rejected() {
        let (repo, ledger) = setup(LedgerSettings::default());
        let id = open(&repo, "10.00", "TJS", AccountStatus::Active);

        for amount in [Decimal::MAX, money("100000000000000000")] {
            let err = ledger.deposit(&DepositRequest::new(id, amount)).unwrap_err();
            assert!(matches!(err, Error::InvalidAmount(_)), "{:?}", err);
        }
        assert_eq!(balance(&repo, id), money("10.00"));
        assert!(history(&repo, id).is_empty());

        let receipt = ledger
            .deposit(&DepositRequest::new(id, MAX_BALANCE - money("10.00")))
            .unwrap();
        assert_eq!(receipt.new_balance, MAX_BALANCE);
        assert_eq!(balance(&repo, id), MAX_BALANCE);
    }

    #[test]
    fn test_transfer_past_destination_ceiling_rejected() {
        let (repo, ledger) = setup(LedgerSettings::default());
        let from = open(&repo, "100.00", "TJS", AccountStatus::Active);
        let to = open(&repo, "9999999999999999.00", "TJS", AccountStatus::Active);

        let err = ledger
            .transfer(&TransferRequest::new(from, to, money("1.00")))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(_)), "{:?}", err);
        assert_eq!(balance(&repo, from), money("100.00"));
        assert_eq!(balance(&repo, to), money("9999999999999999.00"));
        assert!(history(&repo, from).is_empty());
    }

    #[test]
    fn test_deposit_into_frozen_allowed_closed_rejected() {
        let (repo, ledger) = setup(LedgerSettings::default());
        let frozen = open(&repo, "0.00", "TJS", AccountStatus::Frozen);
        let closed = open(&repo, "0.00", "TJS", AccountStatus::Closed);

        assert!(ledger.deposit(&DepositRequest::new(frozen, money("1"))).is_ok());
        let err = ledger
            .deposit(&DepositRequest::new(closed, money("1")))
            .unwrap_err();
        assert!(matches!(err, Error::AccountClosed(id) if id == closed));
        assert!(history(&repo, closed).is_empty());
    }

    #[test]
    fn test_invalid_amounts_rejected_before_store() {
        let (repo, ledger) = setup(LedgerSettings::default());
        let id = open(&repo, "10.00", "TJS", AccountStatus::Active);

        for bad in ["0", "-1", "0.005"] {
            let err = ledger
                .withdraw(&WithdrawalRequest::new(id, money(bad)))
                .unwrap_err();
            assert!(matches!(err, Error::InvalidAmount(_)), "{} accepted", bad);
        }
        assert!(history(&repo, id).is_empty());
    }

    #[test]
    fn test_unknown_account() {
        let (_repo, ledger) = setup(LedgerSettings::default());
        let missing = Uuid::new_v4();
        let err = ledger
            .deposit(&DepositRequest::new(missing, money("1")))
            .unwrap_err();
        assert!(matches!(err, Error::AccountNotFound(id) if id == missing));
    }

    #[test]
    fn test_insufficient_funds_records_failed_attempt() {
        let (repo, ledger) = setup(LedgerSettings::default());
        let id = open(&repo, "20.00", "TJS", AccountStatus::Active);

        let err = ledger
            .withdraw(&WithdrawalRequest::new(id, money("20.01")))
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { .. }));
        assert_eq!(balance(&repo, id), money("20.00"));

        let log = history(&repo, id);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status, TransactionStatus::Failed);
        assert_eq!(log[0].balance_after, Some(money("20.00")));
    }

    #[test]
    fn test_insufficient_funds_without_failed_records() {
        let settings = LedgerSettings {
            record_failed_attempts: false,
            ..LedgerSettings::default()
        };
        let (repo, ledger) = setup(settings);
        let id = open(&repo, "1.00", "TJS", AccountStatus::Active);

        assert!(ledger
            .withdraw(&WithdrawalRequest::new(id, money("2")))
            .is_err());
        assert!(history(&repo, id).is_empty());
    }

    #[test]
    fn test_withdraw_from_frozen_rejected() {
        let (repo, ledger) = setup(LedgerSettings::default());
        let id = open(&repo, "100.00", "TJS", AccountStatus::Frozen);

        let err = ledger
            .withdraw(&WithdrawalRequest::new(id, money("1")))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::AccountFrozenOrClosed { status: AccountStatus::Frozen, .. }
        ));
        assert_eq!(balance(&repo, id), money("100.00"));
    }

    #[test]
    fn test_transfer_moves_both_balances() {
        let (repo, ledger) = setup(LedgerSettings::default());
        let from = open(&repo, "100.00", "TJS", AccountStatus::Active);
        let to = open(&repo, "5.00", "TJS", AccountStatus::Active);

        let receipt = ledger
            .transfer(&TransferRequest::new(from, to, money("40")))
            .unwrap();
        assert_eq!(receipt.new_balance, money("60.00"));
        assert_eq!(receipt.counterparty_balance, Some(money("45.00")));
        assert_eq!(balance(&repo, from), money("60.00"));
        assert_eq!(balance(&repo, to), money("45.00"));

        // Single record, visible from both sides
        let source_log = history(&repo, from);
        let destination_log = history(&repo, to);
        assert_eq!(source_log.len(), 1);
        assert_eq!(source_log, destination_log);
        assert_eq!(source_log[0].counterparty_account_id, Some(to));
    }

    #[test]
    fn test_transfer_rejections_change_nothing() {
        let (repo, ledger) = setup(LedgerSettings::default());
        let from = open(&repo, "10.00", "TJS", AccountStatus::Active);
        let usd = open(&repo, "10.00", "USD", AccountStatus::Active);
        let frozen = open(&repo, "10.00", "TJS", AccountStatus::Frozen);

        let err = ledger
            .transfer(&TransferRequest::new(from, from, money("1")))
            .unwrap_err();
        assert!(matches!(err, Error::SameAccount));

        let err = ledger
            .transfer(&TransferRequest::new(from, usd, money("1")))
            .unwrap_err();
        assert!(matches!(err, Error::CurrencyMismatch { .. }));

        let err = ledger
            .transfer(&TransferRequest::new(from, frozen, money("1")))
            .unwrap_err();
        assert!(matches!(err, Error::AccountFrozenOrClosed { .. }));

        let err = ledger
            .transfer(&TransferRequest::new(from, Uuid::new_v4(), money("1")))
            .unwrap_err();
        assert!(matches!(err, Error::AccountNotFound(_)));

        for id in [from, usd, frozen] {
            assert_eq!(balance(&repo, id), money("10.00"));
            assert!(history(&repo, id).is_empty());
        }
    }

    #[test]
    fn test_idempotent_replay_and_conflict() {
        let (repo, ledger) = setup(LedgerSettings::default());
        let id = open(&repo, "0.00", "TJS", AccountStatus::Active);
        let key = IdempotencyKey::random();

        let request = DepositRequest::new(id, money("50")).with_idempotency_key(key);
        let first = ledger.deposit(&request).unwrap();
        let second = ledger.deposit(&request).unwrap();

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.transaction_id, second.transaction_id);
        assert_eq!(second.new_balance, money("50.00"));
        assert_eq!(balance(&repo, id), money("50.00"));
        assert_eq!(history(&repo, id).len(), 1);

        let different = DepositRequest::new(id, money("60")).with_idempotency_key(key);
        assert!(matches!(
            ledger.deposit(&different).unwrap_err(),
            Error::IdempotencyConflict(_)
        ));

        let other_operation = WithdrawalRequest::new(id, money("50")).with_idempotency_key(key);
        assert!(matches!(
            ledger.withdraw(&other_operation).unwrap_err(),
            Error::IdempotencyConflict(_)
        ));
        assert_eq!(balance(&repo, id), money("50.00"));
    }

    #[test]
    fn test_rejected_request_does_not_consume_key() {
        let (repo, ledger) = setup(LedgerSettings::default());
        let id = open(&repo, "5.00", "TJS", AccountStatus::Active);
        let key = IdempotencyKey::random();
        let request = WithdrawalRequest::new(id, money("10")).with_idempotency_key(key);

        assert!(ledger.withdraw(&request).is_err());

        ledger.deposit(&DepositRequest::new(id, money("5"))).unwrap();
        let receipt = ledger.withdraw(&request).unwrap();
        assert!(!receipt.replayed);
        assert_eq!(receipt.new_balance, money("0.00"));
    }

    #[test]
    fn test_reconcile_matches_after_mixed_operations() {
        let (repo, ledger) = setup(LedgerSettings::default());
        let a = open(&repo, "0.00", "TJS", AccountStatus::Active);
        let b = open(&repo, "0.00", "TJS", AccountStatus::Active);

        ledger.deposit(&DepositRequest::new(a, money("300"))).unwrap();
        ledger.withdraw(&WithdrawalRequest::new(a, money("45.55"))).unwrap();
        ledger.transfer(&TransferRequest::new(a, b, money("100"))).unwrap();
        let _ = ledger.withdraw(&WithdrawalRequest::new(b, money("1000")));
        ledger.transfer(&TransferRequest::new(b, a, money("0.45"))).unwrap();

        for id in [a, b] {
            let rec = ledger.reconcile(id).unwrap();
            assert!(rec.is_balanced(), "{:?}", rec);
        }
        assert_eq!(balance(&repo, a), money("154.90"));
        assert_eq!(balance(&repo, b), money("99.55"));
    }
}
