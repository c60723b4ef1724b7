use colored::Colorize;
use inquire::Text;
use validator::ValidateEmail;

use crate::error::AppError;

/// Maximum length for a GitHub account name
const MAX_ACCOUNT_NAME_LENGTH: usize = 39;
/// Maximum length for Git email address
const MAX_EMAIL_LENGTH: usize = 100;
/// Maximum length for an SSH host alias
const MAX_HOST_ALIAS_LENGTH: usize = 64;
/// Menu entry that can never be an account name
pub const BACK_OPTION: &str = "back";

/// Prompts user for input until valid input is provided
pub fn prompt_until_valid<F>(prompt_message: &str, input_validation: F) -> Result<String, AppError>
where
    F: Fn(&str) -> Result<(), AppError>,
{
    loop {
        let input: String = Text::new(prompt_message).prompt()?;
        let input = input.trim().to_string();
        match input_validation(&input) {
            Ok(_) => break Ok(input),
            Err(AppError::Validation(msg)) => println!("{}", msg.red()),
            Err(e) => return Err(e),
        }
    }
}

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Validates an account name: it becomes part of file names and SSH aliases
pub fn validate_account_name(name: &str) -> Result<(), AppError> {
    if name.is_empty() {
        Err(AppError::Validation("account name cannot be empty".to_string()))
    } else if name.len() > MAX_ACCOUNT_NAME_LENGTH {
        Err(AppError::Validation(format!(
            "account name too long, max {} characters",
            MAX_ACCOUNT_NAME_LENGTH
        )))
    } else if name.starts_with('.') || name.starts_with('-') {
        Err(AppError::Validation("account name cannot start with '.' or '-'".to_string()))
    } else if !name.chars().all(is_safe_char) {
        Err(AppError::Validation(
            "account name may only contain letters, digits, '-', '_' and '.'".to_string(),
        ))
    } else if name == BACK_OPTION {
        Err(AppError::Validation(format!("account name cannot be '{}'", BACK_OPTION)))
    } else {
        Ok(())
    }
}

/// Validates email input
pub fn validate_email(email: &str) -> Result<(), AppError> {
    if email.is_empty() {
        Err(AppError::Validation("email cannot be empty".to_string()))
    } else if email.len() > MAX_EMAIL_LENGTH {
        Err(AppError::Validation(format!("email too long, max {} characters", MAX_EMAIL_LENGTH)))
    } else if !email.validate_email() {
        Err(AppError::Validation(format!("'{}' does not look like an email", email)))
    } else {
        Ok(())
    }
}

/// Validates an SSH host alias
pub fn validate_host_alias(alias: &str) -> Result<(), AppError> {
    if alias.is_empty() {
        Err(AppError::Validation("host alias cannot be empty".to_string()))
    } else if alias.len() > MAX_HOST_ALIAS_LENGTH {
        Err(AppError::Validation(format!(
            "host alias too long, max {} characters",
            MAX_HOST_ALIAS_LENGTH
        )))
    } else if !alias.chars().all(is_safe_char) {
        Err(AppError::Validation(
            "host alias may only contain letters, digits, '-', '_' and '.'".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Validates a personal access token before it is sent anywhere
pub fn validate_token(token: &str) -> Result<(), AppError> {
    if token.is_empty() {
        Err(AppError::Validation("token cannot be empty".to_string()))
    } else if token.chars().any(char::is_whitespace) {
        Err(AppError::Validation("token cannot contain whitespace".to_string()))
    } else {
        Ok(())
    }
}
