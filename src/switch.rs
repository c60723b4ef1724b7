//! Making one account the active global git identity.
//!
//! The global `~/.gitconfig` is what git reads, so its `user.name` is the
//! authoritative "active account". `~/.active-account` is a convenience copy.
//! Both are replaced by rename while `~/.gitconfig.lock` is held, so concurrent
//! switches serialize and neither file is ever observed half-written.

use std::{sync::Arc, time::Duration};

use tracing::{info, warn};

use crate::{
    error::AppError,
    github::{Verification, VerificationGateway},
    identity::{self, IdentityFileStore},
    lock::FileLock,
    profile::Account,
    storage::{self, Layout},
    validation::validate_account_name,
    vault::SecretStore,
};

/// Result of a completed switch
#[derive(Debug, Clone)]
pub struct SwitchOutcome {
    pub account: String,
    /// Present when a stored token was checked
    pub verification: Option<Verification>,
    /// Set when the global config was replaced but the pointer write failed
    pub pointer_error: Option<String>,
}

pub struct SwitchCoordinator {
    layout: Layout,
    identities: IdentityFileStore,
    vault: Arc<dyn SecretStore>,
    gateway: VerificationGateway,
    lock_timeout: Duration,
}

impl SwitchCoordinator {
    pub fn new(
        layout: Layout,
        vault: Arc<dyn SecretStore>,
        gateway: VerificationGateway,
        lock_timeout: Duration,
    ) -> Self {
        SwitchCoordinator {
            identities: IdentityFileStore::new(layout.clone()),
            layout,
            vault,
            gateway,
            lock_timeout,
        }
    }

    /// Makes `account_name` the active account.
    ///
    /// Order: identity file check, token verification, global config replace,
    /// pointer write. A missing token is not an error; a token the API
    /// definitively rejects aborts before anything is written. An unreachable
    /// API does not block the switch.
    pub fn activate(&self, account_name: &str) -> Result<SwitchOutcome, AppError> {
        validate_account_name(account_name)?;
        if !self.identities.exists(account_name) {
            return Err(AppError::AccountNotFound(account_name.to_string()));
        }

        let verification = match self.vault.get(account_name)? {
            Some(token) => Some(self.gateway.verify(account_name, Some(&token))),
            None => {
                info!(account = %account_name, "no token stored, switching without verification");
                None
            }
        };
        if let Some(result) = &verification {
            if let (true, Some(reason)) = (result.is_definitive_failure(), result.reason) {
                return Err(AppError::TokenInvalid {
                    account: account_name.to_string(),
                    reason,
                });
            }
            if !result.valid {
                warn!(account = %account_name, "token could not be verified, switching anyway");
            }
        }

        let contents = self.identities.read_raw(account_name)?;

        let _lock = FileLock::acquire(&self.layout.global_git_config(), self.lock_timeout)?;
        storage::write_atomic(&self.layout.global_git_config(), &contents)
            .map_err(|e| AppError::CopyFailed(e.to_string()))?;
        info!(account = %account_name, "global git config replaced");

        let pointer = self.layout.active_pointer();
        let pointer_error = match storage::write_atomic(&pointer, format!("{account_name}\n").as_bytes()) {
            Ok(()) => None,
            Err(err) => {
                warn!(path = %pointer.display(), error = %err, "could not record active account");
                Some(err.to_string())
            }
        };

        Ok(SwitchOutcome {
            account: account_name.to_string(),
            verification,
            pointer_error,
        })
    }

    /// Name in the global config, if it belongs to one of `known`
    pub fn active_account(&self, known: &[Account]) -> Result<Option<String>, AppError> {
        let Some(contents) = storage::read_optional(&self.layout.global_git_config())? else {
            return Ok(None);
        };
        Ok(identity::parse_user_name(&contents).filter(|name| known.iter().any(|a| &a.name == name)))
    }

    /// Raw `user.name` of the global config
    pub fn global_user_name(&self) -> Result<Option<String>, AppError> {
        Ok(storage::read_optional(&self.layout.global_git_config())?
            .and_then(|contents| identity::parse_user_name(&contents)))
    }

    /// Contents of the best-effort pointer file; unreadable counts as unset
    pub fn pointer(&self) -> Option<String> {
        let path = self.layout.active_pointer();
        match storage::read_optional(&path) {
            Ok(contents) => contents.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "active account pointer unreadable");
                None
            }
        }
    }
}
