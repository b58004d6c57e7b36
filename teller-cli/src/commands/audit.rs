//! Audit command - inspect and manage the audit trail

use std::path::PathBuf;

use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use clap::Subcommand;
use colored::Colorize;

use super::get_teller_dir;
use crate::output;
use teller_core::services::audit::now_ms;
use teller_core::services::AuditLog;
use teller_core::EntryPoint;

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Show recent audit entries
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Show only rejected operations
        #[arg(long)]
        errors: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete old audit entries
    Clear {
        /// Delete entries older than N days
        #[arg(long, default_value = "365", value_parser = clap::value_parser!(u64).range(0..=36_500))]
        older_than_days: u64,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show audit statistics and database path
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Copy the audit database to a file
    Export {
        /// Destination path
        output: PathBuf,
    },
}

fn open_audit_log() -> Result<AuditLog> {
    let teller_dir = get_teller_dir()?;
    std::fs::create_dir_all(&teller_dir)?;
    AuditLog::new(&teller_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION"))
}

fn format_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(output::format_time)
        .unwrap_or_else(|| timestamp_ms.to_string())
}

pub fn run(command: AuditCommands) -> Result<()> {
    match command {
        AuditCommands::List { limit, errors, json } => {
            let audit = open_audit_log()?;
            let entries = if errors {
                audit.get_errors(limit)?
            } else {
                audit.get_recent(limit)?
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }

            if entries.is_empty() {
                println!("No audit entries found.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Time", "Event", "Subject", "Reference", "Code"]);
            for entry in &entries {
                let code = match &entry.error_code {
                    Some(code) => code.red().to_string(),
                    None => String::new(),
                };
                table.add_row(vec![
                    format_timestamp(entry.timestamp),
                    entry.event.clone(),
                    entry
                        .subject
                        .clone()
                        .or_else(|| entry.command.clone())
                        .unwrap_or_default(),
                    entry.reference.clone().unwrap_or_default(),
                    code,
                ]);
            }
            println!("{}", table);

            if !errors {
                let rejected: Vec<_> = entries.iter().filter(|e| e.error_code.is_some()).collect();
                if !rejected.is_empty() {
                    println!();
                    println!("{}", "Recent Rejections:".red().bold());
                    for entry in rejected.iter().take(3) {
                        println!(
                            "  {} [{}]: {}",
                            format_timestamp(entry.timestamp).dimmed(),
                            entry.event,
                            entry.error_message.as_deref().unwrap_or("Unknown error")
                        );
                    }
                }
            }
        }
        AuditCommands::Clear {
            older_than_days,
            force,
            json,
        } => {
            let audit = open_audit_log()?;
            let cutoff_ms = now_ms() - Duration::days(older_than_days as i64).num_milliseconds();

            if !force && !json {
                use dialoguer::Confirm;
                if !Confirm::new()
                    .with_prompt(format!(
                        "Delete audit entries older than {} days?",
                        older_than_days
                    ))
                    .default(false)
                    .interact()?
                {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            let deleted = audit.delete_before(cutoff_ms)?;
            if json {
                println!("{}", serde_json::json!({ "deleted": deleted }));
            } else {
                println!("Deleted {} audit entries", deleted);
            }
        }
        AuditCommands::Stats { json } => {
            let audit = open_audit_log()?;
            let total = audit.count()?;
            let errors = audit.get_errors(10_000)?.len();
            let db_path = audit.db_path().to_path_buf();
            let size_bytes = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "total_entries": total,
                        "rejected_count": errors,
                        "database_path": db_path.to_string_lossy(),
                        "database_size_bytes": size_bytes
                    })
                );
            } else {
                println!("{}", "Audit Statistics".bold());
                println!("  Total entries: {}", total);
                println!("  Rejected: {}", errors);
                println!("  Database: {}", db_path.display());
                println!("  Size: {} bytes", size_bytes);
            }
        }
        AuditCommands::Export { output: path } => {
            let audit = open_audit_log()?;
            let written = audit.export(&path)?;
            output::success(&format!("Audit log exported to {}", written.display()));
        }
    }

    Ok(())
}
