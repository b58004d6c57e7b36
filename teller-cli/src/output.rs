//! Output formatting utilities

use chrono::{DateTime, Utc};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};
use rust_decimal::Decimal;

use teller_core::domain::{TransactionStatus, TransactionType};
use teller_core::{AccountStatus, Transaction};

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn format_money(amount: Decimal, currency: &str) -> String {
    format!("{:.2} {}", amount.round_dp(2), currency)
}

pub fn format_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn format_status(status: AccountStatus) -> String {
    match status {
        AccountStatus::Active => status.to_string().green().to_string(),
        AccountStatus::Frozen => status.to_string().yellow().to_string(),
        AccountStatus::Closed => status.to_string().red().to_string(),
    }
}

/// Amount with a sign from the account's point of view
pub fn format_movement(tx: &Transaction, account_id: uuid::Uuid) -> String {
    let credit = tx.counterparty_account_id == Some(account_id)
        || tx.transaction_type == TransactionType::Deposit;
    let text = format!("{}{:.2}", if credit { "+" } else { "-" }, tx.amount);
    match tx.status {
        TransactionStatus::Completed if credit => text.green().to_string(),
        TransactionStatus::Completed => text,
        _ => text.dimmed().to_string(),
    }
}
