//! Account use cases: setup, list, delete, switch and verify.
//!
//! Setup and delete touch four stores that share no transaction. Each is an
//! explicit, ordered list of steps, and every step is idempotent, so re-running
//! an interrupted operation continues where the previous run stopped:
//!
//! | setup step      | re-run behaviour                                   |
//! |-----------------|----------------------------------------------------|
//! | `ResolveToken`  | re-verifies; drops a stored token GitHub rejects   |
//! | `ProvisionKey`  | existing key pair is kept, half-written one rebuilt |
//! | `RegisterHost`  | own `Host` block is skipped, another key's fails   |
//! | `WriteIdentity` | identity file is overwritten with the same content |
//! | `StoreToken`    | same token is stored again                         |
//! | `UploadKey`     | skipped when GitHub already has the key            |
//!
//! Delete runs `DeleteToken`, `DeleteIdentity`, `DeleteKeys`, `RemoveHost`;
//! each treats already-absent state as done.

use std::{path::Path, sync::Arc};

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    config::Settings,
    error::AppError,
    github::{GitHubApi, GitHubClient, Verification, VerificationGateway},
    identity::IdentityFileStore,
    keys::{KeyProvisioner, KeygenTool, SshIdentity, SshKeygen},
    profile::{Account, default_host_alias},
    ssh_config::{ConfigEntryStore, SshConfigEntry},
    storage::Layout,
    switch::{SwitchCoordinator, SwitchOutcome},
    validation::{validate_account_name, validate_email, validate_host_alias, validate_token},
    vault::{KeyringVault, SecretStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SetupStep {
    ResolveToken,
    ProvisionKey,
    RegisterHost,
    WriteIdentity,
    StoreToken,
    UploadKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeleteStep {
    DeleteToken,
    DeleteIdentity,
    DeleteKeys,
    RemoveHost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StepStatus {
    Done,
    Skipped(String),
}

/// Ordered record of what each step did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport<S> {
    pub steps: Vec<(S, StepStatus)>,
}

impl<S: Copy + PartialEq> StepReport<S> {
    fn new() -> Self {
        StepReport { steps: Vec::new() }
    }

    fn done(&mut self, step: S) {
        self.steps.push((step, StepStatus::Done));
    }

    fn skipped(&mut self, step: S, reason: impl Into<String>) {
        self.steps.push((step, StepStatus::Skipped(reason.into())));
    }

    pub fn status(&self, step: S) -> Option<&StepStatus> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, status)| status)
    }
}

/// Raw setup input, typically collected by the prompt flow
#[derive(Debug, Clone, Default)]
pub struct SetupRequest {
    pub name: String,
    pub email: String,
    /// Defaults to `github-<name>`
    pub host_alias: Option<String>,
    /// New token to verify and store
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SetupReport {
    pub account: Account,
    pub identity: SshIdentity,
    pub public_key: String,
    pub token_verification: Option<Verification>,
    pub steps: StepReport<SetupStep>,
}

#[derive(Debug, Clone)]
pub struct DeleteReport {
    pub account: String,
    pub token_deleted: bool,
    pub identity_deleted: bool,
    pub keys_deleted: bool,
    pub host_removed: bool,
    pub steps: StepReport<DeleteStep>,
}

impl DeleteReport {
    /// The identity file and the key pair were both removed by this run
    pub fn success(&self) -> bool {
        self.identity_deleted && self.keys_deleted
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub name: String,
    pub email: String,
    pub active: bool,
    pub has_token: bool,
    /// Remote check of the stored token, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_verified: Option<bool>,
}

impl AccountSummary {
    /// Token present and, if it was checked, accepted by GitHub
    pub fn token_valid(&self) -> bool {
        self.has_token && self.token_verified.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentAccount {
    /// Global `user.name`, when it belongs to a configured account
    pub active: Option<String>,
    /// Global `user.name`, whatever it is
    pub global_user: Option<String>,
    /// Contents of `~/.active-account`
    pub pointer: Option<String>,
}

/// Composes the stores into account use cases
pub struct AccountManager {
    identities: IdentityFileStore,
    ssh_config: ConfigEntryStore,
    vault: Arc<dyn SecretStore>,
    keys: KeyProvisioner,
    gateway: VerificationGateway,
    switcher: SwitchCoordinator,
}

impl AccountManager {
    pub fn new(
        settings: &Settings,
        vault: Arc<dyn SecretStore>,
        api: Arc<dyn GitHubApi>,
        keygen: Box<dyn KeygenTool + Send>,
    ) -> Self {
        let layout = Layout::new(settings.home.clone());
        let gateway = VerificationGateway::new(api);
        AccountManager {
            identities: IdentityFileStore::new(layout.clone()),
            ssh_config: ConfigEntryStore::new(layout.ssh_config(), settings.lock_timeout),
            keys: KeyProvisioner::new(layout.clone(), keygen),
            switcher: SwitchCoordinator::new(layout, vault.clone(), gateway.clone(), settings.lock_timeout),
            vault,
            gateway,
        }
    }

    /// Manager backed by the OS keychain, the GitHub API and `ssh-keygen`
    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        let vault = Arc::new(KeyringVault::new(settings.keyring_service.clone()));
        let api = Arc::new(GitHubClient::new(&settings.api_url, settings.http_timeout)?);
        Ok(AccountManager::new(settings, vault, api, Box::new(SshKeygen)))
    }

    /// Creates or completes an account. Safe to re-run with the same input.
    pub fn setup(&self, request: &SetupRequest) -> Result<SetupReport, AppError> {
        let name = request.name.trim();
        let email = request.email.trim();
        validate_account_name(name)?;
        validate_email(email)?;
        let host_alias = match request.host_alias.as_deref().map(str::trim) {
            Some(alias) if !alias.is_empty() => alias.to_string(),
            _ => default_host_alias(name),
        };
        validate_host_alias(&host_alias)?;
        let new_token = request.token.as_deref().map(str::trim).filter(|t| !t.is_empty());
        if let Some(token) = new_token {
            validate_token(token)?;
        }

        let account = Account::new(name, email);
        let private_key = self.keys.identity(name).private_key_path;
        self.ensure_host_alias_usable(&host_alias, &private_key)?;
        let mut steps = StepReport::new();

        // ResolveToken
        let (token, from_vault) = match new_token {
            Some(token) => (Some(token.to_string()), false),
            None => (self.vault.get(name)?, true),
        };
        let token_verification = token.as_deref().map(|t| self.gateway.verify(name, Some(t)));
        let verified_token = match (&token, &token_verification) {
            (Some(token), Some(result)) if result.valid => {
                steps.done(SetupStep::ResolveToken);
                Some(token.clone())
            }
            (Some(_), Some(result)) => {
                let reason = result.reason.map(|r| r.to_string()).unwrap_or_default();
                if from_vault && result.is_definitive_failure() {
                    warn!(account = %name, %reason, "removing rejected stored token");
                    self.vault.delete(name)?;
                }
                steps.skipped(SetupStep::ResolveToken, format!("token not verified: {reason}"));
                None
            }
            _ => {
                steps.skipped(SetupStep::ResolveToken, "no token");
                None
            }
        };

        // ProvisionKey
        let had_key = self.keys.has_key(name);
        let mut identity = self.keys.ensure_key(name, email)?;
        identity.host_alias = host_alias.clone();
        if had_key {
            steps.skipped(SetupStep::ProvisionKey, "key pair already exists");
        } else {
            steps.done(SetupStep::ProvisionKey);
        }

        // RegisterHost
        let entry = SshConfigEntry::for_github(host_alias.clone(), identity.private_key_path.clone());
        match self.ssh_config.append_entry(&entry) {
            Ok(()) => steps.done(SetupStep::RegisterHost),
            Err(AppError::AlreadyExists(_)) => {
                self.ensure_host_alias_usable(&host_alias, &identity.private_key_path)?;
                info!(alias = %host_alias, "ssh config entry already present");
                steps.skipped(SetupStep::RegisterHost, "host entry already present");
            }
            Err(err) => return Err(err),
        }

        // WriteIdentity
        self.identities.write(&account)?;
        steps.done(SetupStep::WriteIdentity);

        // StoreToken
        match (&verified_token, from_vault) {
            (Some(token), false) => {
                self.vault.set(name, token)?;
                steps.done(SetupStep::StoreToken);
            }
            (Some(_), true) => steps.skipped(SetupStep::StoreToken, "token already stored"),
            (None, _) => steps.skipped(SetupStep::StoreToken, "no verified token"),
        }

        // UploadKey
        let public_key = self.keys.public_key(name)?;
        match &verified_token {
            Some(token) => {
                if self.gateway.key_registered(token, &public_key)? {
                    steps.skipped(SetupStep::UploadKey, "key already registered on GitHub");
                } else {
                    self.gateway.upload_key(token, &host_alias, &public_key)?;
                    steps.done(SetupStep::UploadKey);
                }
            }
            None => steps.skipped(SetupStep::UploadKey, "no verified token"),
        }

        info!(account = %name, alias = %host_alias, "setup complete");
        Ok(SetupReport {
            account,
            identity,
            public_key,
            token_verification,
            steps,
        })
    }

    /// Whether a token is stored for the account that GitHub has not rejected.
    /// An unreachable GitHub does not count as a rejection.
    pub fn has_stored_token(&self, account_name: &str) -> Result<bool, AppError> {
        validate_account_name(account_name)?;
        Ok(match self.vault.get(account_name)? {
            Some(token) => !self.gateway.verify(account_name, Some(&token)).is_definitive_failure(),
            None => false,
        })
    }

    /// Configured accounts with token and active state
    pub fn list(&self, verify_tokens: bool) -> Result<Vec<AccountSummary>, AppError> {
        let accounts = self.identities.list_all()?;
        let active = self.switcher.active_account(&accounts)?;

        let mut summaries = Vec::with_capacity(accounts.len());
        for account in accounts {
            let token = self.vault.get(&account.name)?;
            let token_verified = match (&token, verify_tokens) {
                (Some(token), true) => Some(self.gateway.verify(&account.name, Some(token)).valid),
                _ => None,
            };
            summaries.push(AccountSummary {
                active: active.as_deref() == Some(account.name.as_str()),
                has_token: token.is_some(),
                token_verified,
                name: account.name,
                email: account.email,
            });
        }
        Ok(summaries)
    }

    /// Removes every local trace of an account. Already-absent pieces count as
    /// done; `DeleteReport::success` tells whether the account existed.
    pub fn delete(&self, account_name: &str) -> Result<DeleteReport, AppError> {
        validate_account_name(account_name)?;
        let mut steps = StepReport::new();

        let token_deleted = self.vault.delete(account_name)?;
        if token_deleted {
            steps.done(DeleteStep::DeleteToken);
        } else {
            steps.skipped(DeleteStep::DeleteToken, "no token stored");
        }

        let identity_deleted = self.identities.delete(account_name)?;
        if identity_deleted {
            steps.done(DeleteStep::DeleteIdentity);
        } else {
            steps.skipped(DeleteStep::DeleteIdentity, "no identity file");
        }

        let private_key = self.keys.identity(account_name).private_key_path;
        let keys_deleted = self.keys.remove_keys(account_name)?;
        if keys_deleted {
            steps.done(DeleteStep::DeleteKeys);
        } else {
            steps.skipped(DeleteStep::DeleteKeys, "no ssh keys");
        }

        let host_removed = match self.ssh_config.find_alias_by_identity_file(&private_key)? {
            Some(host_alias) => match self.ssh_config.remove_entry(&host_alias) {
                Ok(()) => {
                    steps.done(DeleteStep::RemoveHost);
                    true
                }
                Err(AppError::NotFound(_)) => {
                    steps.skipped(DeleteStep::RemoveHost, "no ssh config entry");
                    false
                }
                Err(err) => return Err(err),
            },
            None => {
                let default_alias = default_host_alias(account_name);
                if self.ssh_config.entry(&default_alias)?.is_some() {
                    warn!(alias = %default_alias, "ssh config entry uses another key, leaving it");
                    steps.skipped(
                        DeleteStep::RemoveHost,
                        format!("ssh host '{default_alias}' uses another key"),
                    );
                } else {
                    steps.skipped(DeleteStep::RemoveHost, "no ssh config entry");
                }
                false
            }
        };

        info!(account = %account_name, identity_deleted, keys_deleted, "delete finished");
        Ok(DeleteReport {
            account: account_name.to_string(),
            token_deleted,
            identity_deleted,
            keys_deleted,
            host_removed,
            steps,
        })
    }

    /// Fails with `AlreadyExists` when `host_alias` has a block that uses a
    /// key other than `private_key`
    fn ensure_host_alias_usable(&self, host_alias: &str, private_key: &Path) -> Result<(), AppError> {
        match self.ssh_config.entry(host_alias)? {
            None => Ok(()),
            Some(entry) if entry.uses_identity_file(private_key) => Ok(()),
            Some(entry) => Err(AppError::AlreadyExists(format!(
                "ssh host '{}' already uses {}",
                host_alias,
                entry.identity_file.display()
            ))),
        }
    }

    pub fn switch(&self, account_name: &str) -> Result<SwitchOutcome, AppError> {
        self.switcher.activate(account_name)
    }

    /// Checks a GitHub username, and a token if one is given
    pub fn verify(&self, username: &str, token: Option<&str>) -> Result<Verification, AppError> {
        validate_account_name(username)?;
        let token = token.map(str::trim).filter(|t| !t.is_empty());
        if let Some(token) = token {
            validate_token(token)?;
        }
        Ok(self.gateway.verify(username, token))
    }

    pub fn current(&self) -> Result<CurrentAccount, AppError> {
        let accounts = self.identities.list_all()?;
        Ok(CurrentAccount {
            active: self.switcher.active_account(&accounts)?,
            global_user: self.switcher.global_user_name()?,
            pointer: self.switcher.pointer(),
        })
    }

    /// Names of configured accounts, for the interactive pickers
    pub fn account_names(&self) -> Result<Vec<String>, AppError> {
        Ok(self.identities.list_all()?.into_iter().map(|a| a.name).collect())
    }
}
