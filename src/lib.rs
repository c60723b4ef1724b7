//! Local state store for multiple GitHub identities: per-account SSH keys,
//! SSH host entries, git identity files, keychain tokens and the active
//! global identity.

pub mod accounts;
pub mod config;
pub mod error;
pub mod github;
pub mod identity;
pub mod keys;
pub mod lock;
pub mod profile;
pub mod ssh_config;
pub mod storage;
pub mod switch;
pub mod validation;
pub mod vault;
