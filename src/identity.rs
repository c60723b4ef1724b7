//! Per-account git identity files (`~/.gitconfig-<name>`).
//!
//! Existence of the file is what makes an account "configured".

use std::{fs, io};

use tracing::{debug, info};

use crate::{
    error::AppError,
    profile::Account,
    storage::{self, IDENTITY_FILE_PREFIX, Layout},
    validation::validate_account_name,
};

/// Renders the `[user]` block stored in identity files and the global config
pub fn render(account: &Account) -> String {
    format!("[user]\n\tname = {}\n\temail = {}\n", account.name, account.email)
}

/// Reads the `[user]` section's `name` and `email`, ignoring all other sections
fn user_fields(contents: &str) -> (Option<String>, Option<String>) {
    let mut in_user = false;
    let mut name = None;
    let mut email = None;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') {
            in_user = line
                .trim_start_matches('[')
                .trim_end_matches(']')
                .trim()
                .eq_ignore_ascii_case("user");
            continue;
        }
        if !in_user {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().to_string();
            match key.trim().to_ascii_lowercase().as_str() {
                "name" => name = Some(value),
                "email" => email = Some(value),
                _ => {}
            }
        }
    }

    (name, email)
}

/// Parses an account out of a git config. Returns `None` unless both
/// `user.name` and `user.email` are set.
pub fn parse(contents: &str) -> Option<Account> {
    let (name, email) = user_fields(contents);
    Some(Account { name: name?, email: email? })
}

/// `user.name` of a git config, if set
pub fn parse_user_name(contents: &str) -> Option<String> {
    user_fields(contents).0
}

/// Store for `~/.gitconfig-<name>` files
#[derive(Debug, Clone)]
pub struct IdentityFileStore {
    layout: Layout,
}

impl IdentityFileStore {
    pub fn new(layout: Layout) -> Self {
        IdentityFileStore { layout }
    }

    /// Writes (or overwrites) the identity file for `account`
    pub fn write(&self, account: &Account) -> Result<(), AppError> {
        validate_account_name(&account.name)?;
        let path = self.layout.identity_file(&account.name);
        fs::create_dir_all(self.layout.home())?;
        storage::write_atomic(&path, render(account).as_bytes())?;
        info!(account = %account.name, path = %path.display(), "identity file written");
        Ok(())
    }

    pub fn exists(&self, account_name: &str) -> bool {
        self.layout.identity_file(account_name).is_file()
    }

    /// Reads and parses the identity file for `account_name`
    pub fn read(&self, account_name: &str) -> Result<Account, AppError> {
        let path = self.layout.identity_file(account_name);
        let contents = storage::read_optional(&path)?
            .ok_or_else(|| AppError::AccountNotFound(account_name.to_string()))?;
        parse(&contents).ok_or_else(|| {
            AppError::Validation(format!("{} has no [user] name/email", path.display()))
        })
    }

    /// Raw bytes of the identity file, as copied into the global config
    pub fn read_raw(&self, account_name: &str) -> Result<Vec<u8>, AppError> {
        let path = self.layout.identity_file(account_name);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(AppError::AccountNotFound(account_name.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Removes the identity file. Returns whether a file was actually removed.
    pub fn delete(&self, account_name: &str) -> Result<bool, AppError> {
        let path = self.layout.identity_file(account_name);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(account = %account_name, path = %path.display(), "identity file deleted");
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(account = %account_name, "no identity file to delete");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// All configured accounts, ordered by name.
    ///
    /// Files whose suffix is not a valid account name are skipped, and so are
    /// files without a parsable `[user]` block.
    pub fn list_all(&self) -> Result<Vec<Account>, AppError> {
        let entries = match fs::read_dir(self.layout.home()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut accounts = Vec::new();
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(account_name) = file_name.to_str().and_then(|n| n.strip_prefix(IDENTITY_FILE_PREFIX)) else {
                continue;
            };
            if validate_account_name(account_name).is_err() || !entry.path().is_file() {
                continue;
            }
            match self.read(account_name) {
                Ok(account) => accounts.push(Account {
                    name: account_name.to_string(),
                    email: account.email,
                }),
                Err(AppError::Validation(msg)) => debug!(%msg, "skipping unparsable identity file"),
                Err(AppError::AccountNotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }

        accounts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(accounts)
    }
}
