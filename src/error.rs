use thiserror::Error;

use crate::github::FailureReason;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Error during file I/O operations
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Error during JSON serialization or deserialization
    #[error("json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    /// Error when user input fails.
    #[error("inquire error: {0}")]
    Inquire(#[from] inquire::InquireError),
    /// Error during input validation.
    #[error("validation error: {0}")]
    Validation(String),
    /// No identity file exists for the account
    #[error("account not found: '{0}'")]
    AccountNotFound(String),
    /// A file, key or config entry is absent
    #[error("not found: {0}")]
    NotFound(String),
    /// A config entry or key already exists
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// Home directory could not be resolved
    #[error("failed to find the home directory")]
    HomeDirNotFound,
    /// Key generation tool is not installed
    #[error("ssh-keygen not available: {0}")]
    KeygenUnavailable(String),
    /// Key generation tool ran but failed
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),
    /// Transport-level failure talking to GitHub
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// GitHub answered with an unexpected status
    #[error("remote error: {0}")]
    Remote(String),
    /// Exclusive access to a shared file could not be obtained
    #[error("lock error: {0}")]
    Lock(String),
    /// Platform secret store cannot be used
    #[error("secret store unavailable: {0}")]
    VaultUnavailable(String),
    /// Stored token failed verification
    #[error("token for '{account}' is invalid: {reason}")]
    TokenInvalid {
        account: String,
        reason: FailureReason,
    },
    /// Global identity file could not be replaced
    #[error("failed to update global git config: {0}")]
    CopyFailed(String),
}

