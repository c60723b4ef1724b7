use std::process;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use gitswitch::{
    accounts::{AccountManager, SetupRequest, SetupStep, StepStatus},
    config::Settings,
    error::AppError,
};

use cli::{Cli, Commands};

mod cli;
mod menu;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!("{} {}", "error:".red(), err);
        process::exit(1);
    }
}

/// Logs go to stderr; `RUST_LOG` takes precedence over `-v`
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), AppError> {
    let settings = Settings::from_env()?;
    let manager = AccountManager::from_settings(&settings)?;

    match cli.command {
        Some(Commands::Setup { name, email, alias, token, no_input }) => {
            let request = SetupRequest {
                name: name.unwrap_or_default(),
                email: email.unwrap_or_default(),
                host_alias: alias,
                token,
            };
            let request = if no_input { request } else { menu::prompt_setup(&manager, request)? };
            setup_account(&manager, &request)
        }
        Some(Commands::List { verify, json }) => list_accounts(&manager, verify, json),
        Some(Commands::Switch { account }) => {
            let account = match account {
                Some(account) => Some(account),
                None => menu::select_account(&manager, "select account to switch to:")?,
            };
            match account {
                Some(account) => switch_account(&manager, &account),
                None => Ok(()),
            }
        }
        Some(Commands::Delete { account, yes }) => {
            let account = match account {
                Some(account) => Some(account),
                None => menu::select_account(&manager, "select account to delete:")?,
            };
            let Some(account) = account else {
                return Ok(());
            };
            if yes || menu::confirm_delete(&account)? {
                delete_account(&manager, &account)
            } else {
                println!("{}", "deletion canceled".yellow());
                Ok(())
            }
        }
        Some(Commands::Verify { username, token }) => verify_account(&manager, &username, token.as_deref()),
        Some(Commands::Current) => show_current_account(&manager),
        None => menu::run_menu(&manager),
    }
}

/// Runs account setup and prints the public key with next steps
pub fn setup_account(manager: &AccountManager, request: &SetupRequest) -> Result<(), AppError> {
    let report = manager.setup(request)?;

    for (step, status) in &report.steps.steps {
        match status {
            StepStatus::Done => println!("{} {:?}", "done".green(), step),
            StepStatus::Skipped(reason) => println!("{} {:?}: {}", "skipped".yellow(), step, reason),
        }
    }
    if let Some(verification) = &report.token_verification {
        if let Some(reason) = verification.reason {
            println!("{} {}", "token not saved:".red(), reason);
        }
    }

    let alias = &report.identity.host_alias;
    println!("\n{} {} ({})\n", "setup complete for".green(), report.account.name, alias);
    println!("{}", "ssh public key:".blue());
    println!("{}\n", report.public_key.cyan());
    let on_github = matches!(report.steps.status(SetupStep::UploadKey), Some(StepStatus::Done))
        || report.token_verification.as_ref().is_some_and(|v| v.valid);
    if !on_github {
        println!("add it at {}", "https://github.com/settings/keys".blue());
        println!("key file: {}", report.identity.public_key_path.display());
    }
    println!("clone with: {}", format!("git@{}:<owner>/<repo>.git", alias).cyan());
    Ok(())
}

/// Lists configured accounts, marking the active one
pub fn list_accounts(manager: &AccountManager, verify: bool, json: bool) -> Result<(), AppError> {
    let accounts = manager.list(verify)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&accounts)?);
        return Ok(());
    }
    if accounts.is_empty() {
        println!("{}", "no accounts configured, run `gitswitch setup` to add one".yellow());
        return Ok(());
    }

    for (index, account) in accounts.iter().enumerate() {
        let token = match (account.has_token, account.token_verified) {
            (false, _) => "no token".dimmed(),
            (true, Some(false)) => "token invalid".red(),
            (true, Some(true)) => "token verified".green(),
            (true, None) => "token stored".normal(),
        };
        let active = if account.active { "active".green().bold() } else { "".normal() };
        println!("{}.\t{}\t<{}>\t{}\t{}", index + 1, account.name, account.email, token, active);
    }
    Ok(())
}

/// Switches the active account
pub fn switch_account(manager: &AccountManager, account: &str) -> Result<(), AppError> {
    let outcome = manager.switch(account)?;
    if outcome.verification.is_none() {
        println!("{}", format!("no token stored for '{}', switched without verification", account).yellow());
    }
    if let Some(err) = &outcome.pointer_error {
        println!("{} {}", "could not record active account:".yellow(), err);
    }
    println!("{} {}", "switched to account:".green(), outcome.account);
    Ok(())
}

/// Deletes local data of an account
pub fn delete_account(manager: &AccountManager, account: &str) -> Result<(), AppError> {
    let report = manager.delete(account)?;
    if report.success() {
        println!("{} {}", "deleted account:".green(), report.account);
    } else {
        println!("{} '{}'", "nothing left to delete for account".yellow(), report.account);
    }
    Ok(())
}

/// Verifies a GitHub username and optional token
pub fn verify_account(manager: &AccountManager, username: &str, token: Option<&str>) -> Result<(), AppError> {
    let result = manager.verify(username, token)?;
    match (result.valid, result.reason) {
        (true, _) if token.is_some() => println!("{} '{}'", "token verified for".green(), username),
        (true, _) => println!("{} '{}' {}", "GitHub account".green(), username, "exists".green()),
        (false, Some(reason)) => {
            let owner = result.remote_identity.map(|o| format!(" ({o})")).unwrap_or_default();
            println!("{} {}{}", "verification failed:".red(), reason, owner);
        }
        (false, None) => println!("{}", "verification failed".red()),
    }
    Ok(())
}

/// Shows the active account
pub fn show_current_account(manager: &AccountManager) -> Result<(), AppError> {
    let current = manager.current()?;
    match (&current.active, &current.global_user) {
        (Some(active), _) => println!("{} {}", "active account:".blue(), active),
        (None, Some(user)) => println!("{} {} {}", "global git user:".blue(), user, "(not a configured account)".dimmed()),
        (None, None) => println!("{}", "no active account".yellow()),
    }
    if let Some(pointer) = current.pointer.filter(|p| Some(p) != current.active.as_ref()) {
        println!("{} {}", "last switched to:".dimmed(), pointer);
    }
    Ok(())
}
