//! Transaction history and lookup

use anyhow::Result;
use colored::Colorize;
use uuid::Uuid;

use super::{fail_on, get_context, resolve_account};
use crate::output;
use teller_core::Transaction;

pub fn run_history(account: &str, page: Option<u32>, page_size: Option<u32>, json: bool) -> Result<()> {
    let ctx = get_context("history")?;
    let account_id = resolve_account(&ctx, account)?;
    let result = ctx.get_account_transactions(account_id, page, page_size);

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    fail_on(&result, json)?;
    if json {
        return Ok(());
    }

    let items = result.data.clone().unwrap_or_default();
    if items.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Time", "Reference", "Type", "Amount", "Status", "Description"]);
    for tx in &items {
        table.add_row(vec![
            output::format_time(tx.created_at),
            tx.reference_number.clone(),
            tx.transaction_type.to_string(),
            output::format_movement(tx, account_id),
            tx.status.to_string(),
            tx.description.clone().unwrap_or_default(),
        ]);
    }
    println!("{}", table);

    if let Some(context) = &result.context {
        let field = |name: &str| context.get(name).map(|v| v.to_string()).unwrap_or_default();
        println!(
            "{}",
            format!(
                "Page {} of {} ({} transactions)",
                field("page"),
                field("totalPages"),
                field("total")
            )
            .dimmed()
        );
    }
    Ok(())
}

/// Look up one transaction by id or reference number
pub fn run_show(reference: &str, json: bool) -> Result<()> {
    let ctx = get_context("tx")?;
    let result = match Uuid::parse_str(reference.trim()) {
        Ok(id) => ctx.get_transaction(id),
        Err(_) => ctx.get_transaction_by_reference(reference),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    fail_on(&result, json)?;
    if let (false, Some(tx)) = (json, &result.data) {
        print_transaction(tx);
    }
    Ok(())
}

fn print_transaction(tx: &Transaction) {
    println!("  {}  {}", "Id:".dimmed(), tx.id);
    println!("  {}  {}", "Reference:".dimmed(), tx.reference_number);
    println!("  {}  {}", "Type:".dimmed(), tx.transaction_type);
    println!("  {}  {}", "Status:".dimmed(), tx.status);
    println!(
        "  {}  {}",
        "Amount:".dimmed(),
        output::format_money(tx.amount, &tx.currency)
    );
    println!("  {}  {}", "Account:".dimmed(), tx.account_id);
    if let Some(counterparty) = tx.counterparty_account_id {
        println!("  {}  {}", "To account:".dimmed(), counterparty);
    }
    if let Some(balance) = tx.balance_after {
        println!("  {}  {:.2}", "Balance after:".dimmed(), balance);
    }
    if let Some(description) = &tx.description {
        println!("  {}  {}", "Description:".dimmed(), description);
    }
    println!("  {}  {}", "Created:".dimmed(), output::format_time(tx.created_at));
    println!("  {}  {}", "Created by:".dimmed(), tx.created_by);
}
