//! Deposit, withdraw and transfer commands

use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use colored::Colorize;

use super::{get_context, parse_amount, resolve_account};
use crate::output;
use teller_core::{
    DepositRequest, IdempotencyKey, TransactionResult, TransferRequest, WithdrawalRequest,
};

/// Arguments shared by every money movement
pub struct MovementArgs {
    pub amount: String,
    pub description: Option<String>,
    pub key: Option<String>,
    pub json: bool,
}

impl MovementArgs {
    fn idempotency_key(&self) -> Result<Option<IdempotencyKey>> {
        self.key
            .as_deref()
            .map(|k| IdempotencyKey::from_str(k.trim()).map_err(|e| anyhow!(e)))
            .transpose()
    }
}

pub fn run_deposit(account: &str, args: MovementArgs) -> Result<()> {
    let ctx = get_context("deposit")?;
    let mut request = DepositRequest::new(resolve_account(&ctx, account)?, parse_amount(&args.amount)?);
    if let Some(description) = &args.description {
        request = request.with_description(description.clone());
    }
    if let Some(key) = args.idempotency_key()? {
        request = request.with_idempotency_key(key);
    }
    report(&ctx.deposit(&request), args.json)
}

pub fn run_withdraw(account: &str, args: MovementArgs) -> Result<()> {
    let ctx = get_context("withdraw")?;
    let mut request =
        WithdrawalRequest::new(resolve_account(&ctx, account)?, parse_amount(&args.amount)?);
    if let Some(description) = &args.description {
        request = request.with_description(description.clone());
    }
    if let Some(key) = args.idempotency_key()? {
        request = request.with_idempotency_key(key);
    }
    report(&ctx.withdraw(&request), args.json)
}

pub fn run_transfer(from: &str, to: &str, args: MovementArgs) -> Result<()> {
    let ctx = get_context("transfer")?;
    let mut request = TransferRequest::new(
        resolve_account(&ctx, from)?,
        resolve_account(&ctx, to)?,
        parse_amount(&args.amount)?,
    );
    if let Some(description) = &args.description {
        request = request.with_description(description.clone());
    }
    if let Some(key) = args.idempotency_key()? {
        request = request.with_idempotency_key(key);
    }
    report(&ctx.transfer(&request), args.json)
}

fn report(result: &TransactionResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else if result.success {
        output::success(&result.message);
        if let Some(reference) = &result.reference_number {
            println!("  {}  {}", "Reference:".dimmed(), reference);
        }
        if let Some(balance) = result.new_balance {
            println!("  {}  {:.2}", "New balance:".dimmed(), balance);
        }
    } else {
        output::error(&result.message);
    }

    if !result.success {
        bail!("{}", result.error_code.as_deref().unwrap_or("FAILED"));
    }
    Ok(())
}
