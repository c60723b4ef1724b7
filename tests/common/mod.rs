//! Fakes shared by the integration tests.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    fs,
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use gitswitch::{
    accounts::AccountManager,
    config::Settings,
    error::AppError,
    github::GitHubApi,
    keys::KeygenTool,
    vault::MemoryVault,
};
use tempfile::TempDir;

/// Writes deterministic key files instead of running ssh-keygen
#[derive(Default, Clone)]
pub struct FakeKeygen {
    pub runs: Arc<AtomicUsize>,
}

impl KeygenTool for FakeKeygen {
    fn probe(&self) -> Result<(), AppError> {
        Ok(())
    }

    fn generate(&self, private_key: &Path, comment: &str) -> Result<(), AppError> {
        let n = self.runs.fetch_add(1, Ordering::SeqCst);
        fs::write(private_key, format!("PRIVATE-{n}\n"))?;
        fs::write(
            format!("{}.pub", private_key.display()),
            format!("ssh-ed25519 AAAAC3Nz{n} {comment}\n"),
        )?;
        Ok(())
    }
}

#[derive(Default)]
struct RemoteState {
    users: Vec<String>,
    tokens: HashMap<String, String>,
    keys: HashMap<String, Vec<String>>,
    uploads: usize,
    offline: bool,
}

/// In-memory GitHub: known logins, token owners and registered keys
#[derive(Default)]
pub struct FakeGitHub {
    state: Mutex<RemoteState>,
}

impl FakeGitHub {
    pub fn with_user(self, login: &str) -> Self {
        self.state.lock().unwrap().users.push(login.to_string());
        self
    }

    pub fn with_token(self, token: &str, login: &str) -> Self {
        self.state.lock().unwrap().tokens.insert(token.to_string(), login.to_string());
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn uploads(&self) -> usize {
        self.state.lock().unwrap().uploads
    }

    pub fn keys_of(&self, login: &str) -> Vec<String> {
        self.state.lock().unwrap().keys.get(login).cloned().unwrap_or_default()
    }
}

fn offline() -> AppError {
    AppError::Remote("connection refused".to_string())
}

impl GitHubApi for FakeGitHub {
    fn lookup_user(&self, username: &str) -> Result<Option<String>, AppError> {
        let state = self.state.lock().unwrap();
        if state.offline {
            return Err(offline());
        }
        Ok(state.users.iter().find(|u| u.eq_ignore_ascii_case(username)).cloned())
    }

    fn authenticated_login(&self, token: &str) -> Result<Option<String>, AppError> {
        let state = self.state.lock().unwrap();
        if state.offline {
            return Err(offline());
        }
        Ok(state.tokens.get(token).cloned())
    }

    fn list_keys(&self, token: &str) -> Result<Vec<String>, AppError> {
        let state = self.state.lock().unwrap();
        let login = state.tokens.get(token).ok_or_else(|| AppError::Remote("401".to_string()))?;
        Ok(state.keys.get(login).cloned().unwrap_or_default())
    }

    fn upload_key(&self, token: &str, _title: &str, key: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        let login = state
            .tokens
            .get(token)
            .cloned()
            .ok_or_else(|| AppError::Remote("401".to_string()))?;
        // GitHub stores keys without their comment
        let stored: Vec<&str> = key.split_whitespace().take(2).collect();
        state.keys.entry(login).or_default().push(stored.join(" "));
        state.uploads += 1;
        Ok(())
    }
}

/// A manager over a temporary home directory
pub struct Harness {
    pub home: TempDir,
    pub settings: Settings,
    pub vault: Arc<MemoryVault>,
    pub github: Arc<FakeGitHub>,
    pub keygen: FakeKeygen,
    pub manager: AccountManager,
}

impl Harness {
    pub fn new(github: FakeGitHub) -> Self {
        let home = tempfile::tempdir().unwrap();
        let mut settings = Settings::new(home.path().to_path_buf());
        settings.lock_timeout = Duration::from_secs(5);
        let vault = Arc::new(MemoryVault::new());
        let github = Arc::new(github);
        let keygen = FakeKeygen::default();
        let manager = AccountManager::new(&settings, vault.clone(), github.clone(), Box::new(keygen.clone()));
        Harness {
            home,
            settings,
            vault,
            github,
            keygen,
            manager,
        }
    }

    /// A manager over the same home but with a different secret store
    pub fn manager_with_vault(&self, vault: MemoryVault) -> AccountManager {
        AccountManager::new(
            &self.settings,
            Arc::new(vault),
            self.github.clone(),
            Box::new(self.keygen.clone()),
        )
    }

    /// An independent manager over the same home, like a second process
    pub fn second_manager(&self) -> AccountManager {
        AccountManager::new(
            &self.settings,
            self.vault.clone(),
            self.github.clone(),
            Box::new(self.keygen.clone()),
        )
    }

    /// A manager over the same home that gives up on locks after `timeout`
    pub fn manager_with_lock_timeout(&self, timeout: Duration) -> AccountManager {
        let mut settings = self.settings.clone();
        settings.lock_timeout = timeout;
        AccountManager::new(&settings, self.vault.clone(), self.github.clone(), Box::new(self.keygen.clone()))
    }

    pub fn path(&self, relative: &str) -> std::path::PathBuf {
        self.home.path().join(relative)
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative)).unwrap_or_default()
    }

    pub fn key_runs(&self) -> usize {
        self.keygen.runs.load(Ordering::SeqCst)
    }
}
