//! Account verification and key upload against the GitHub REST API.
//!
//! `GitHubApi` is the raw remote collaborator; `VerificationGateway` turns its
//! answers into a `Verification` value. Business outcomes (unknown user, bad
//! token, token for another user, unreachable API) are results, not errors.
//! Nothing here retries.

use std::{fmt, sync::Arc, time::Duration};

use reqwest::{StatusCode, blocking::Client, header};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::AppError;

const USER_AGENT: &str = concat!("gitswitch/", env!("CARGO_PKG_VERSION"));

/// Remote calls the core needs from GitHub
pub trait GitHubApi: Send + Sync {
    /// `GET /users/{username}`: the canonical login, or `None` on 404
    fn lookup_user(&self, username: &str) -> Result<Option<String>, AppError>;
    /// `GET /user`: the login the token belongs to, or `None` on 401
    fn authenticated_login(&self, token: &str) -> Result<Option<String>, AppError>;
    /// `GET /user/keys`: public keys registered for the token's user
    fn list_keys(&self, token: &str) -> Result<Vec<String>, AppError>;
    /// `POST /user/keys`
    fn upload_key(&self, token: &str, title: &str, key: &str) -> Result<(), AppError>;
}

#[derive(Deserialize)]
struct UserResponse {
    login: String,
}

#[derive(Deserialize)]
struct KeyResponse {
    key: String,
}

#[derive(Serialize)]
struct NewKey<'a> {
    title: &'a str,
    key: &'a str,
}

/// Blocking HTTP client for the GitHub REST API
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    base_url: String,
}

impl GitHubClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(GitHubClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn get(&self, path: &str, token: Option<&str>) -> reqwest::blocking::RequestBuilder {
        let request = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header(header::ACCEPT, "application/vnd.github+json");
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn unexpected(what: &str, status: StatusCode) -> AppError {
    AppError::Remote(format!("{what} returned {status}"))
}

impl GitHubApi for GitHubClient {
    fn lookup_user(&self, username: &str) -> Result<Option<String>, AppError> {
        let response = self.get(&format!("/users/{username}"), None).send()?;
        match response.status() {
            StatusCode::OK => Ok(Some(response.json::<UserResponse>()?.login)),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(unexpected("GET /users/{username}", status)),
        }
    }

    fn authenticated_login(&self, token: &str) -> Result<Option<String>, AppError> {
        let response = self.get("/user", Some(token)).send()?;
        match response.status() {
            StatusCode::OK => Ok(Some(response.json::<UserResponse>()?.login)),
            StatusCode::UNAUTHORIZED => Ok(None),
            status => Err(unexpected("GET /user", status)),
        }
    }

    fn list_keys(&self, token: &str) -> Result<Vec<String>, AppError> {
        let response = self.get("/user/keys", Some(token)).send()?;
        match response.status() {
            StatusCode::OK => Ok(response
                .json::<Vec<KeyResponse>>()?
                .into_iter()
                .map(|k| k.key)
                .collect()),
            status => Err(unexpected("GET /user/keys", status)),
        }
    }

    fn upload_key(&self, token: &str, title: &str, key: &str) -> Result<(), AppError> {
        let response = self
            .http
            .post(format!("{}/user/keys", self.base_url))
            .header(header::ACCEPT, "application/vnd.github+json")
            .bearer_auth(token)
            .json(&NewKey { title, key })
            .send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        Err(AppError::Remote(format!("POST /user/keys returned {status}: {}", body.trim())))
    }
}

/// Why a verification did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NotFound,
    Unauthorized,
    WrongUser,
    NetworkError,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureReason::NotFound => "account not found",
            FailureReason::Unauthorized => "invalid or expired token",
            FailureReason::WrongUser => "token belongs to a different user",
            FailureReason::NetworkError => "GitHub could not be reached",
        };
        f.write_str(text)
    }
}

/// Outcome of checking a username, optionally with a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    /// Login the token is bound to, when the API reported one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_identity: Option<String>,
}

impl Verification {
    fn ok(remote_identity: Option<String>) -> Self {
        Verification {
            valid: true,
            reason: None,
            remote_identity,
        }
    }

    fn failed(reason: FailureReason, remote_identity: Option<String>) -> Self {
        Verification {
            valid: false,
            reason: Some(reason),
            remote_identity,
        }
    }

    /// Invalid for a reason other than the API being unreachable
    pub fn is_definitive_failure(&self) -> bool {
        !self.valid && self.reason != Some(FailureReason::NetworkError)
    }
}

/// Normalizes remote answers into `Verification` values
#[derive(Clone)]
pub struct VerificationGateway {
    api: Arc<dyn GitHubApi>,
}

impl VerificationGateway {
    pub fn new(api: Arc<dyn GitHubApi>) -> Self {
        VerificationGateway { api }
    }

    /// Without a token only checks that the username exists. With a token,
    /// checks that the token's owner is `username`, compared case-insensitively.
    pub fn verify(&self, username: &str, token: Option<&str>) -> Verification {
        match token.filter(|t| !t.is_empty()) {
            None => self.verify_exists(username),
            Some(token) => self.verify_token(username, token),
        }
    }

    fn verify_exists(&self, username: &str) -> Verification {
        match self.api.lookup_user(username) {
            Ok(Some(login)) if login.eq_ignore_ascii_case(username) => {
                debug!(%username, "github account exists");
                Verification::ok(None)
            }
            Ok(_) => {
                info!(%username, "github account not found");
                Verification::failed(FailureReason::NotFound, None)
            }
            Err(err) => {
                warn!(%username, error = %err, "github lookup failed");
                Verification::failed(FailureReason::NetworkError, None)
            }
        }
    }

    fn verify_token(&self, username: &str, token: &str) -> Verification {
        match self.api.authenticated_login(token) {
            Ok(Some(login)) if login.eq_ignore_ascii_case(username) => {
                debug!(%username, "token verified");
                Verification::ok(Some(login))
            }
            Ok(Some(login)) => {
                info!(%username, owner = %login, "token belongs to another user");
                Verification::failed(FailureReason::WrongUser, Some(login))
            }
            Ok(None) => {
                info!(%username, "token rejected");
                Verification::failed(FailureReason::Unauthorized, None)
            }
            Err(err) => {
                warn!(%username, error = %err, "token verification failed");
                Verification::failed(FailureReason::NetworkError, None)
            }
        }
    }

    /// Whether `public_key` is already registered for the token's user.
    /// Keys are compared by type and base64 body, ignoring the comment.
    pub fn key_registered(&self, token: &str, public_key: &str) -> Result<bool, AppError> {
        let wanted = key_material(public_key);
        Ok(self
            .api
            .list_keys(token)?
            .iter()
            .any(|key| key_material(key) == wanted))
    }

    pub fn upload_key(&self, token: &str, title: &str, public_key: &str) -> Result<(), AppError> {
        self.api.upload_key(token, title, public_key.trim())?;
        info!(%title, "ssh key uploaded");
        Ok(())
    }
}

fn key_material(key: &str) -> Vec<&str> {
    key.split_whitespace().take(2).collect()
}
