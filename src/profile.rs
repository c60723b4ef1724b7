use serde::Serialize;

/// A locally configured GitHub identity
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// GitHub account name, also the git `user.name`
    pub name: String,
    /// Email written as git `user.email`
    pub email: String,
}

impl Account {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Account {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// `github-<name>`
pub fn default_host_alias(account_name: &str) -> String {
    format!("github-{account_name}")
}
