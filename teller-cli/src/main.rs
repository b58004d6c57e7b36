//! Teller CLI - operate the bank ledger from a terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::account::AccountCommands;
use commands::audit::AuditCommands;
use commands::money::MovementArgs;
use commands::user::UserCommands;
use commands::{account, audit, history, money, user};

/// Teller - ledger, accounts and logins for a retail bank
#[derive(Parser)]
#[command(name = "teller", version, about, long_about = None)]
struct Cli {
    /// Log core activity to stderr (same as TELLER_LOG=debug)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open, inspect and manage accounts
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },

    /// Deposit money into an account
    Deposit {
        /// Account id or 16-digit number
        account: String,
        /// Amount with up to two decimals
        amount: String,
        #[arg(long)]
        description: Option<String>,
        /// Idempotency key (UUID); retries with the same key are applied once
        #[arg(long)]
        key: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Withdraw money from an account
    Withdraw {
        account: String,
        amount: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Move money between two accounts
    Transfer {
        /// Source account
        from: String,
        /// Destination account
        to: String,
        amount: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Show an account's transactions, newest first
    History {
        account: String,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        page_size: Option<u32>,
        #[arg(long)]
        json: bool,
    },

    /// Show one transaction by id or reference number
    Tx {
        reference: String,
        #[arg(long)]
        json: bool,
    },

    /// Register users, log in and manage access
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Inspect the audit trail
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("teller_core=debug,teller=debug")
    } else {
        EnvFilter::try_from_env("TELLER_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Account { command } => account::run(command),
        Commands::Deposit { account, amount, description, key, json } => {
            money::run_deposit(&account, MovementArgs { amount, description, key, json })
        }
        Commands::Withdraw { account, amount, description, key, json } => {
            money::run_withdraw(&account, MovementArgs { amount, description, key, json })
        }
        Commands::Transfer { from, to, amount, description, key, json } => {
            money::run_transfer(&from, &to, MovementArgs { amount, description, key, json })
        }
        Commands::History { account, page, page_size, json } => {
            history::run_history(&account, page, page_size, json)
        }
        Commands::Tx { reference, json } => history::run_show(&reference, json),
        Commands::User { command } => user::run(command),
        Commands::Audit { command } => audit::run(command),
    }
}
