//! Account command - open, inspect and change the status of accounts

use std::str::FromStr;

use anyhow::{anyhow, Result};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Confirm;

use super::{fail_on, get_context, parse_amount, parse_uuid, resolve_account};
use crate::output;
use teller_core::{Account, AccountType, OpenAccountRequest};

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account for a customer
    Open {
        /// Owner user id
        #[arg(long)]
        owner: String,
        /// Account type: checking, savings or credit
        #[arg(long = "type", default_value = "checking")]
        account_type: String,
        /// ISO 4217 currency code (defaults to the configured currency)
        #[arg(long)]
        currency: Option<String>,
        /// Opening deposit
        #[arg(long)]
        initial_deposit: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one account
    Show {
        /// Account id or 16-digit number
        account: String,
        #[arg(long)]
        json: bool,
    },
    /// List accounts owned by a user
    List {
        /// Owner user id
        owner: String,
        #[arg(long)]
        json: bool,
    },
    /// Show the current balance
    Balance {
        account: String,
        #[arg(long)]
        json: bool,
    },
    /// Stop withdrawals and outgoing transfers
    Freeze {
        account: String,
        #[arg(long)]
        json: bool,
    },
    /// Return a frozen account to active
    Unfreeze {
        account: String,
        #[arg(long)]
        json: bool,
    },
    /// Close an account permanently
    Close {
        account: String,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
        #[arg(long)]
        json: bool,
    },
    /// Compare the stored balance with the transaction log
    Reconcile {
        account: String,
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: AccountCommands) -> Result<()> {
    let ctx = get_context("account")?;

    match command {
        AccountCommands::Open {
            owner,
            account_type,
            currency,
            initial_deposit,
            json,
        } => {
            let account_type = AccountType::from_str(&account_type).map_err(|e| anyhow!(e))?;
            let mut request = OpenAccountRequest::new(parse_uuid(&owner, "owner")?, account_type);
            if let Some(currency) = currency {
                request = request.with_currency(currency);
            }
            if let Some(amount) = initial_deposit {
                request = request.with_initial_deposit(parse_amount(&amount)?);
            }

            let result = ctx.open_account(&request);
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            fail_on(&result, json)?;
            if let (false, Some(account)) = (json, &result.data) {
                output::success(&format!("Opened account {}", account.account_number));
                print_account(account);
            }
        }
        AccountCommands::Show { account, json } => {
            let id = resolve_account(&ctx, &account)?;
            let result = ctx.get_account(id);
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            fail_on(&result, json)?;
            if let (false, Some(account)) = (json, &result.data) {
                print_account(account);
            }
        }
        AccountCommands::List { owner, json } => {
            let result = ctx.get_accounts_by_owner(parse_uuid(&owner, "owner")?);
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            fail_on(&result, json)?;
            let accounts = result.data.unwrap_or_default();
            if json {
                return Ok(());
            }
            if accounts.is_empty() {
                println!("No accounts found.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Number", "Type", "Balance", "Status", "Opened"]);
            for account in &accounts {
                table.add_row(vec![
                    account.account_number.clone(),
                    account.account_type.to_string(),
                    output::format_money(account.balance, &account.currency),
                    output::format_status(account.status),
                    output::format_time(account.opened_at),
                ]);
            }
            println!("{}", table);
        }
        AccountCommands::Balance { account, json } => {
            let id = resolve_account(&ctx, &account)?;
            let result = ctx.get_balance(id);
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            fail_on(&result, json)?;
            if let (false, Some(view)) = (json, &result.data) {
                println!(
                    "{}  {}  {}",
                    view.account_number,
                    output::format_money(view.balance, &view.currency).bold(),
                    output::format_status(view.status)
                );
            }
        }
        AccountCommands::Freeze { account, json } => {
            let id = resolve_account(&ctx, &account)?;
            let result = ctx.freeze_account(id);
            report_status_change(&result, "frozen", json)?;
        }
        AccountCommands::Unfreeze { account, json } => {
            let id = resolve_account(&ctx, &account)?;
            let result = ctx.unfreeze_account(id);
            report_status_change(&result, "active", json)?;
        }
        AccountCommands::Close {
            account,
            force,
            json,
        } => {
            let id = resolve_account(&ctx, &account)?;
            if !force && !json {
                let confirmed = Confirm::new()
                    .with_prompt(format!("Close account {}? This cannot be undone", account))
                    .default(false)
                    .interact()?;
                if !confirmed {
                    println!("Cancelled.");
                    return Ok(());
                }
            }
            let result = ctx.close_account(id);
            report_status_change(&result, "closed", json)?;
        }
        AccountCommands::Reconcile { account, json } => {
            let id = resolve_account(&ctx, &account)?;
            let result = ctx.reconcile(id);
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            fail_on(&result, json)?;
            if let (false, Some(rec)) = (json, &result.data) {
                println!("  Stored balance:   {:.2}", rec.stored_balance);
                println!("  Computed balance: {:.2}", rec.computed_balance);
                println!("  Completed transactions: {}", rec.completed_transactions);
                if rec.is_balanced() {
                    output::success("Balance matches the transaction log");
                } else {
                    output::warning(&format!("Balance is off by {:.2}", rec.difference()));
                }
            }
        }
    }

    Ok(())
}

fn report_status_change(
    result: &teller_core::OperationResult<Account>,
    state: &str,
    json: bool,
) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    }
    fail_on(result, json)?;
    if let (false, Some(account)) = (json, &result.data) {
        output::success(&format!("Account {} is {}", account.account_number, state));
    }
    Ok(())
}

fn print_account(account: &Account) {
    println!("  {}  {}", "Id:".dimmed(), account.id);
    println!("  {}  {}", "Number:".dimmed(), account.account_number);
    println!("  {}  {}", "Owner:".dimmed(), account.owner_id);
    println!("  {}  {}", "Type:".dimmed(), account.account_type);
    println!(
        "  {}  {}",
        "Balance:".dimmed(),
        output::format_money(account.balance, &account.currency)
    );
    println!("  {}  {}", "Status:".dimmed(), output::format_status(account.status));
    println!("  {}  {}", "Opened:".dimmed(), output::format_time(account.opened_at));
    if let Some(closed_at) = account.closed_at {
        println!("  {}  {}", "Closed:".dimmed(), output::format_time(closed_at));
    }
}
