use colored::Colorize;
use inquire::{Confirm, Password, PasswordDisplayMode, Select, Text};

use gitswitch::{
    accounts::{AccountManager, SetupRequest},
    error::AppError,
    validation::{
        BACK_OPTION, prompt_until_valid, validate_account_name, validate_email, validate_host_alias,
        validate_token,
    },
};

use crate::{delete_account, list_accounts, setup_account, show_current_account, switch_account, verify_account};

/// Runs interactive menu interface
pub fn run_menu(manager: &AccountManager) -> Result<(), AppError> {
    loop {
        let actions: Vec<&'static str> = vec![
            "setup account",
            "list accounts",
            "switch account",
            "delete account",
            "verify account",
            "show current account",
            "quit",
        ];

        let action_selected: &'static str = Select::new(&format!("{}", "select action".blue()), actions)
            .prompt()?;

        let result = match action_selected {
            "setup account" => prompt_setup(manager, SetupRequest::default()).and_then(|request| setup_account(manager, &request)),
            "list accounts" => list_accounts(manager, false, false),
            "switch account" => match select_account(manager, "select account to switch to:")? {
                Some(account) => switch_account(manager, &account),
                None => Ok(()),
            },
            "delete account" => menu_delete(manager),
            "verify account" => menu_verify(manager),
            "show current account" => show_current_account(manager),
            "quit" => {
                println!("{}", "quitting".yellow());
                break Ok(());
            }
            _ => unreachable!("unexpected input"),
        };

        // Inside the menu a failed action is reported and the loop continues
        match result {
            Err(AppError::Inquire(err)) => return Err(AppError::Inquire(err)),
            Err(err) => println!("{} {}", "error:".red(), err),
            Ok(()) => {}
        }
    }
}

/// Fills the missing fields of a setup request by prompting
pub fn prompt_setup(manager: &AccountManager, mut request: SetupRequest) -> Result<SetupRequest, AppError> {
    if request.name.is_empty() {
        request.name = prompt_until_valid(&format!("{}", "enter GitHub account name:".blue()), validate_account_name)?;
    }
    if request.email.is_empty() {
        request.email = prompt_until_valid(
            &format!("{}", "enter email for this account:".blue()),
            validate_email,
        )?;
    }
    if request.host_alias.is_none() {
        let default_alias = format!("github-{}", request.name);
        let alias = loop {
            let input = Text::new(&format!("{}", "enter ssh host alias:".blue()))
                .with_default(&default_alias)
                .prompt()?;
            match validate_host_alias(input.trim()) {
                Ok(()) => break input.trim().to_string(),
                Err(AppError::Validation(msg)) => println!("{}", msg.red()),
                Err(e) => return Err(e),
            }
        };
        request.host_alias = Some(alias);
    }
    if request.token.is_none() && manager.has_stored_token(&request.name)? {
        println!("{}", "using the token saved for this account".green());
    } else if request.token.is_none() {
        let has_token = Confirm::new("do you have a GitHub personal access token?")
            .with_default(false)
            .prompt()?;
        if has_token {
            let token = Password::new("enter token:")
                .with_display_mode(PasswordDisplayMode::Masked)
                .without_confirmation()
                .with_validator(|input: &str| {
                    Ok(match validate_token(input.trim()) {
                        Ok(()) => inquire::validator::Validation::Valid,
                        Err(err) => inquire::validator::Validation::Invalid(err.to_string().into()),
                    })
                })
                .prompt()?;
            request.token = Some(token.trim().to_string());
        }
    }
    Ok(request)
}

/// Lets the user pick a configured account; `None` when "back" is chosen
pub fn select_account(manager: &AccountManager, message: &str) -> Result<Option<String>, AppError> {
    let names = manager.account_names()?;
    if names.is_empty() {
        return Err(AppError::Validation("no accounts configured, run `gitswitch setup`".to_string()));
    }

    let choices: Vec<String> = build_account_list(names);
    let selected: String = Select::new(&format!("{}", message.blue()), choices).prompt()?;
    Ok((selected != BACK_OPTION).then_some(selected))
}

/// Asks before deleting all local data of an account
pub fn confirm_delete(account: &str) -> Result<bool, AppError> {
    Ok(Confirm::new(&format!("delete all local data for '{}'?", account))
        .with_default(false)
        .prompt()?)
}

fn menu_delete(manager: &AccountManager) -> Result<(), AppError> {
    let Some(account) = select_account(manager, "select account to delete:")? else {
        return Ok(());
    };
    if confirm_delete(&account)? {
        delete_account(manager, &account)
    } else {
        println!("{}", "deletion canceled".yellow());
        Ok(())
    }
}

fn menu_verify(manager: &AccountManager) -> Result<(), AppError> {
    let username = prompt_until_valid(&format!("{}", "enter GitHub username:".blue()), validate_account_name)?;
    let token = Password::new("enter token (leave empty to skip):")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()?;
    let token = token.trim();
    verify_account(manager, &username, (!token.is_empty()).then_some(token))
}

/// Builds list of account names for menu to display
pub fn build_account_list(names: Vec<String>) -> Vec<String> {
    let mut choices = names;
    choices.push(BACK_OPTION.to_string());
    choices
}
