//! Per-account GitHub tokens, kept only in a secret store.
//!
//! "No token for this account" and "the secret store cannot be used" are
//! different outcomes: the first is `Ok(None)` / `Ok(false)`, the second is
//! `AppError::VaultUnavailable` and aborts the calling operation.

use std::{collections::HashMap, sync::Mutex};

use tracing::debug;

use crate::error::AppError;

/// Narrow get/set/delete capability over a secret store keyed by account name
pub trait SecretStore: Send + Sync {
    fn set(&self, account_name: &str, token: &str) -> Result<(), AppError>;
    fn get(&self, account_name: &str) -> Result<Option<String>, AppError>;
    /// Returns whether a secret was actually removed
    fn delete(&self, account_name: &str) -> Result<bool, AppError>;
}

/// Secret store backed by the OS keychain via `keyring`
#[derive(Debug, Clone)]
pub struct KeyringVault {
    service: String,
}

impl KeyringVault {
    pub fn new(service: impl Into<String>) -> Self {
        KeyringVault {
            service: service.into(),
        }
    }

    fn entry(&self, account_name: &str) -> Result<keyring::Entry, AppError> {
        keyring::Entry::new(&self.service, account_name).map_err(unavailable)
    }
}

fn unavailable(err: keyring::Error) -> AppError {
    AppError::VaultUnavailable(err.to_string())
}

impl SecretStore for KeyringVault {
    fn set(&self, account_name: &str, token: &str) -> Result<(), AppError> {
        self.entry(account_name)?.set_password(token).map_err(unavailable)?;
        debug!(account = %account_name, "token stored in keychain");
        Ok(())
    }

    fn get(&self, account_name: &str) -> Result<Option<String>, AppError> {
        match self.entry(account_name)?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(unavailable(err)),
        }
    }

    fn delete(&self, account_name: &str) -> Result<bool, AppError> {
        match self.entry(account_name)?.delete_credential() {
            Ok(()) => {
                debug!(account = %account_name, "token removed from keychain");
                Ok(true)
            }
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(err) => Err(unavailable(err)),
        }
    }
}

/// In-process secret store used in place of the keychain under test
#[derive(Debug, Default)]
pub struct MemoryVault {
    secrets: Mutex<HashMap<String, String>>,
    unavailable: bool,
}

impl MemoryVault {
    pub fn new() -> Self {
        MemoryVault::default()
    }

    /// A store whose every call fails as `VaultUnavailable`
    pub fn unavailable() -> Self {
        MemoryVault {
            secrets: Mutex::default(),
            unavailable: true,
        }
    }

    fn secrets(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, AppError> {
        if self.unavailable {
            return Err(AppError::VaultUnavailable("memory vault disabled".to_string()));
        }
        self.secrets
            .lock()
            .map_err(|_| AppError::VaultUnavailable("memory vault poisoned".to_string()))
    }
}

impl SecretStore for MemoryVault {
    fn set(&self, account_name: &str, token: &str) -> Result<(), AppError> {
        self.secrets()?.insert(account_name.to_string(), token.to_string());
        Ok(())
    }

    fn get(&self, account_name: &str) -> Result<Option<String>, AppError> {
        Ok(self.secrets()?.get(account_name).cloned())
    }

    fn delete(&self, account_name: &str) -> Result<bool, AppError> {
        Ok(self.secrets()?.remove(account_name).is_some())
    }
}
