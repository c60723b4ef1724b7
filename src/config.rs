use std::{env, path::PathBuf, time::Duration};

use crate::error::AppError;

/// Keyring service name all tokens are stored under
pub const KEYRING_SERVICE: &str = "gitSwitch";
/// Default GitHub REST API base
pub const DEFAULT_API_URL: &str = "https://api.github.com";
/// Default bound on every remote call
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
/// Default wait for an advisory lock
const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 5;

/// Runtime settings, resolved from the environment
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory all state files live under
    pub home: PathBuf,
    /// GitHub REST API base URL, without trailing slash
    pub api_url: String,
    /// Timeout applied to each HTTP request
    pub http_timeout: Duration,
    /// Maximum wait when acquiring a lock file
    pub lock_timeout: Duration,
    /// Keyring service name
    pub keyring_service: String,
}

impl Settings {
    /// Settings rooted at `home` with every other value at its default
    pub fn new(home: PathBuf) -> Self {
        Settings {
            home,
            api_url: DEFAULT_API_URL.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            lock_timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS),
            keyring_service: KEYRING_SERVICE.to_string(),
        }
    }

    /// Loads settings from `GITSWITCH_HOME`, `GITHUB_API_URL`,
    /// `GITSWITCH_HTTP_TIMEOUT_SECS` and `GITSWITCH_LOCK_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, AppError> {
        let home = match env::var_os("GITSWITCH_HOME") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::home_dir().ok_or(AppError::HomeDirNotFound)?,
        };

        let mut settings = Settings::new(home);
        if let Ok(url) = env::var("GITHUB_API_URL") {
            if !url.trim().is_empty() {
                settings.api_url = url.trim().trim_end_matches('/').to_string();
            }
        }
        if let Some(secs) = env_secs("GITSWITCH_HTTP_TIMEOUT_SECS")? {
            settings.http_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_secs("GITSWITCH_LOCK_TIMEOUT_SECS")? {
            settings.lock_timeout = Duration::from_secs(secs);
        }
        Ok(settings)
    }
}

fn env_secs(key: &str) -> Result<Option<u64>, AppError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| AppError::Validation(format!("{key} must be a whole number of seconds"))),
        Err(_) => Ok(None),
    }
}
