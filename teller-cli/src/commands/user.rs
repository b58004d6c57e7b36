//! User command - registration, login and access control

use std::io::BufRead;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use colored::Colorize;
use dialoguer::Password;

use super::{fail_on, get_context, parse_uuid};
use crate::output;
use teller_core::{AuthResult, RegisterRequest, Role};

/// Where the password comes from
#[derive(Args)]
pub struct PasswordSource {
    /// Read the password from the first line of stdin instead of prompting
    #[arg(long)]
    password_stdin: bool,
}

impl PasswordSource {
    fn read(&self, confirm: bool) -> Result<String> {
        if self.password_stdin {
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("Failed to read password from stdin")?;
            return Ok(line.trim_end_matches(['\r', '\n']).to_string());
        }
        let mut prompt = Password::new().with_prompt("Password");
        if confirm {
            prompt = prompt.with_confirmation("Repeat password", "Passwords do not match");
        }
        Ok(prompt.interact()?)
    }
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Register a new user
    Register {
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        full_name: String,
        /// Customer, Teller, Manager or Admin
        #[arg(long, default_value = "customer")]
        role: String,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        middle_name: Option<String>,
        /// Date of birth as YYYY-MM-DD
        #[arg(long)]
        date_of_birth: Option<String>,
        #[arg(long)]
        passport: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        country: Option<String>,
        #[command(flatten)]
        password: PasswordSource,
        #[arg(long)]
        json: bool,
    },
    /// Log in and print a session token
    Login {
        username: String,
        #[command(flatten)]
        password: PasswordSource,
        #[arg(long)]
        json: bool,
    },
    /// Check a session token and show its claims
    Verify {
        token: String,
        #[arg(long)]
        json: bool,
    },
    /// Show a user and their customer profile
    Show {
        user_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Block a user from logging in
    Deactivate {
        user_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Allow a deactivated user to log in again
    Reactivate {
        user_id: String,
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: UserCommands) -> Result<()> {
    match command {
        UserCommands::Register {
            username,
            email,
            full_name,
            role,
            first_name,
            last_name,
            middle_name,
            date_of_birth,
            passport,
            phone,
            address,
            city,
            country,
            password,
            json,
        } => {
            let mut request = RegisterRequest::new(username, password.read(true)?, email, full_name);
            request.role = Some(Role::from_str(&role).map_err(|e| anyhow!(e))?);
            request.first_name = first_name;
            request.last_name = last_name;
            request.middle_name = middle_name;
            request.date_of_birth = date_of_birth
                .map(|d| {
                    NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d")
                        .with_context(|| format!("Not a valid date: {}", d))
                })
                .transpose()?;
            request.passport_number = passport;
            request.phone_number = phone;
            request.address = address;
            request.city = city;
            request.country = country;

            let ctx = get_context("user register")?;
            let result = ctx.register(&request);
            report_auth(&result, json)?;
            if let (false, Some(customer_id)) = (json, result.customer_id) {
                println!("  {}  {}", "Customer:".dimmed(), customer_id);
            }
        }
        UserCommands::Login {
            username,
            password,
            json,
        } => {
            let secret = password.read(false)?;
            let ctx = get_context("user login")?;
            let result = ctx.login(&username, &secret);
            report_auth(&result, json)?;
            if let (false, Some(token)) = (json, &result.token) {
                println!("{}", token);
            }
        }
        UserCommands::Verify { token, json } => {
            let ctx = get_context("user verify")?;
            let result = ctx.verify_token(token.trim());
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            fail_on(&result, json)?;
            if let (false, Some(claims)) = (json, &result.data) {
                output::success("Token is valid");
                println!("  {}  {}", "User:".dimmed(), claims.sub);
                println!("  {}  {}", "Username:".dimmed(), claims.name);
                println!("  {}  {}", "Role:".dimmed(), claims.role);
                if let Some(expires_at) = claims.expires_at() {
                    println!("  {}  {}", "Expires:".dimmed(), output::format_time(expires_at));
                }
            }
        }
        UserCommands::Show { user_id, json } => {
            let ctx = get_context("user show")?;
            let user_id = parse_uuid(&user_id, "user")?;
            let user = ctx.get_user(user_id);
            fail_on(&user, json)?;
            let customer = ctx.get_customer(user_id);

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "user": user.data,
                        "customer": customer.data,
                    }))?
                );
                return Ok(());
            }
            if let Some(user) = &user.data {
                println!("  {}  {}", "Id:".dimmed(), user.id);
                println!("  {}  {}", "Username:".dimmed(), user.username);
                println!("  {}  {}", "Email:".dimmed(), user.email);
                println!("  {}  {}", "Name:".dimmed(), user.full_name);
                println!("  {}  {}", "Role:".dimmed(), user.role);
                let state = if user.is_active {
                    "active".green()
                } else {
                    "deactivated".red()
                };
                println!("  {}  {}", "State:".dimmed(), state);
            }
            if let Some(customer) = &customer.data {
                println!("  {}  {}", "Customer:".dimmed(), customer.id);
                println!("  {}  {}", "Legal name:".dimmed(), customer.full_name());
                println!("  {}  {}", "Country:".dimmed(), customer.country);
            }
        }
        UserCommands::Deactivate { user_id, json } => {
            let ctx = get_context("user deactivate")?;
            let result = ctx.deactivate_user(parse_uuid(&user_id, "user")?);
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            fail_on(&result, json)?;
            if !json {
                output::success("User deactivated");
            }
        }
        UserCommands::Reactivate { user_id, json } => {
            let ctx = get_context("user reactivate")?;
            let result = ctx.reactivate_user(parse_uuid(&user_id, "user")?);
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            fail_on(&result, json)?;
            if !json {
                output::success("User reactivated");
            }
        }
    }

    Ok(())
}

fn report_auth(result: &AuthResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else if result.success {
        output::success(&result.message);
        if let Some(user) = &result.user {
            println!("  {}  {}", "User:".dimmed(), user.id);
        }
        if let Some(expires_at) = result.expires_at {
            println!("  {}  {}", "Expires:".dimmed(), output::format_time(expires_at));
        }
    } else {
        output::error(&result.message);
    }

    if !result.success {
        bail!("{}", result.error_code.as_deref().unwrap_or("FAILED"));
    }
    Ok(())
}
