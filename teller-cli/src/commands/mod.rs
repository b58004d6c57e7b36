//! CLI command implementations

pub mod account;
pub mod audit;
pub mod history;
pub mod money;
pub mod user;

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use rust_decimal::Decimal;
use uuid::Uuid;

use teller_core::{EntryPoint, OperationResult, TellerContext};

use crate::output;

/// Get the teller directory from environment or default
pub fn get_teller_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("TELLER_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".teller"))
        .ok_or_else(|| anyhow!("Could not find home directory; set TELLER_DIR"))
}

/// Open the teller context and note the command in the audit log
pub fn get_context(command: &str) -> Result<TellerContext> {
    let teller_dir = get_teller_dir()?;
    let ctx = TellerContext::new(&teller_dir, EntryPoint::Cli)
        .context("Failed to initialize teller context")?;
    if let Err(e) = ctx.audit_log.record_command(command) {
        tracing::warn!(error = %e, "could not record command");
    }
    Ok(ctx)
}

/// Resolve an account given as a UUID or a 16-digit account number
pub fn resolve_account(ctx: &TellerContext, reference: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(reference) {
        return Ok(id);
    }
    let result = ctx.get_account_by_number(reference.trim());
    match result.data {
        Some(account) => Ok(account.id),
        None => bail!("{}", result.message),
    }
}

pub fn parse_amount(value: &str) -> Result<Decimal> {
    Decimal::from_str(value.trim()).with_context(|| format!("Not a valid amount: {}", value))
}

pub fn parse_uuid(value: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(value.trim()).with_context(|| format!("Not a valid {} id: {}", what, value))
}

/// Print a failed result and turn it into an error exit
pub fn fail_on<T>(result: &OperationResult<T>, json: bool) -> Result<()> {
    if result.success {
        return Ok(());
    }
    if !json {
        output::error(&result.message);
    }
    bail!(
        "{}",
        result.error_code.as_deref().unwrap_or("FAILED")
    )
}
