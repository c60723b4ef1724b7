//! SSH key pairs per account, generated by an external tool.

use std::{
    cell::OnceCell,
    fs, io,
    path::{Path, PathBuf},
    process::Command,
};

use tracing::{debug, info, warn};

use crate::{
    error::AppError,
    profile::default_host_alias,
    storage::{Layout, ensure_private_dir},
};

/// Key pair and alias belonging to one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshIdentity {
    pub account_name: String,
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
    pub host_alias: String,
}

/// External key-generation capability
pub trait KeygenTool {
    /// One-time check that the tool can be run at all
    fn probe(&self) -> Result<(), AppError>;
    /// Writes a passphrase-less key pair at `private_key` and `private_key.pub`
    fn generate(&self, private_key: &Path, comment: &str) -> Result<(), AppError>;
}

/// `ssh-keygen` from the OpenSSH client
#[derive(Debug, Default, Clone)]
pub struct SshKeygen;

impl KeygenTool for SshKeygen {
    fn probe(&self) -> Result<(), AppError> {
        which::which("ssh-keygen")
            .map(|path| debug!(path = %path.display(), "found ssh-keygen"))
            .map_err(|e| AppError::KeygenUnavailable(e.to_string()))
    }

    fn generate(&self, private_key: &Path, comment: &str) -> Result<(), AppError> {
        let output = Command::new("ssh-keygen")
            .args(["-t", "ed25519", "-q", "-N", "", "-C", comment, "-f"])
            .arg(private_key)
            .output()
            .map_err(|e| AppError::KeyGenerationFailed(e.to_string()))?;

        if !output.status.success() {
            return Err(AppError::KeyGenerationFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }
}

/// Ensures each account has exactly one key pair on disk
pub struct KeyProvisioner {
    layout: Layout,
    tool: Box<dyn KeygenTool + Send>,
    probed: OnceCell<Result<(), String>>,
}

impl KeyProvisioner {
    pub fn new(layout: Layout, tool: Box<dyn KeygenTool + Send>) -> Self {
        KeyProvisioner {
            layout,
            tool,
            probed: OnceCell::new(),
        }
    }

    /// Identity paths for `account_name`, whether or not the keys exist
    pub fn identity(&self, account_name: &str) -> SshIdentity {
        SshIdentity {
            account_name: account_name.to_string(),
            private_key_path: self.layout.private_key(account_name),
            public_key_path: self.layout.public_key(account_name),
            host_alias: default_host_alias(account_name),
        }
    }

    /// Whether both halves of the account's key pair are on disk
    pub fn has_key(&self, account_name: &str) -> bool {
        self.layout.private_key(account_name).is_file() && self.layout.public_key(account_name).is_file()
    }

    fn ensure_tool(&self) -> Result<(), AppError> {
        self.probed
            .get_or_init(|| {
                self.tool.probe().map_err(|err| match err {
                    AppError::KeygenUnavailable(msg) => msg,
                    other => other.to_string(),
                })
            })
            .clone()
            .map_err(AppError::KeygenUnavailable)
    }

    /// Returns the account's key pair, generating it only if absent.
    ///
    /// An existing pair is never regenerated. A half-written pair (only one of
    /// the two files) is removed first.
    pub fn ensure_key(&self, account_name: &str, email: &str) -> Result<SshIdentity, AppError> {
        let identity = self.identity(account_name);
        let has_private = identity.private_key_path.is_file();
        let has_public = identity.public_key_path.is_file();

        if has_private && has_public {
            info!(account = %account_name, "ssh key already exists, skipping generation");
            return Ok(identity);
        }
        if has_private || has_public {
            warn!(account = %account_name, "removing half-written ssh key pair");
            remove_if_exists(&identity.private_key_path)?;
            remove_if_exists(&identity.public_key_path)?;
        }

        self.ensure_tool()?;
        ensure_private_dir(&self.layout.ssh_dir())?;

        info!(account = %account_name, path = %identity.private_key_path.display(), "generating ssh key");
        if let Err(err) = self.tool.generate(&identity.private_key_path, email) {
            self.cleanup_partial(&identity);
            return Err(err);
        }
        if !identity.private_key_path.is_file() || !identity.public_key_path.is_file() {
            self.cleanup_partial(&identity);
            return Err(AppError::KeyGenerationFailed(format!(
                "key pair missing at {} after generation",
                identity.private_key_path.display()
            )));
        }
        Ok(identity)
    }

    fn cleanup_partial(&self, identity: &SshIdentity) {
        for path in [&identity.private_key_path, &identity.public_key_path] {
            if let Err(err) = remove_if_exists(path) {
                warn!(path = %path.display(), error = %err, "failed to remove partial key");
            }
        }
    }

    /// Trimmed contents of the account's public key
    pub fn public_key(&self, account_name: &str) -> Result<String, AppError> {
        let path = self.layout.public_key(account_name);
        match fs::read_to_string(&path) {
            Ok(key) => Ok(key.trim().to_string()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("public key {}", path.display())))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Deletes both key files. Returns whether any key file was removed.
    pub fn remove_keys(&self, account_name: &str) -> Result<bool, AppError> {
        let identity = self.identity(account_name);
        let removed_private = remove_if_exists(&identity.private_key_path)?;
        let removed_public = remove_if_exists(&identity.public_key_path)?;
        if removed_private || removed_public {
            info!(account = %account_name, "ssh keys deleted");
        }
        Ok(removed_private || removed_public)
    }
}

fn remove_if_exists(path: &Path) -> Result<bool, AppError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}
