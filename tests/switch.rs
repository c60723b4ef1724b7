//! Activating accounts and reading back the active one.

mod common;

use std::{fs, thread, time::Duration};

use common::{FakeGitHub, Harness};
use gitswitch::{
    accounts::SetupRequest,
    error::AppError,
    github::FailureReason,
    identity,
    lock::FileLock,
    profile::Account,
    vault::SecretStore,
};

fn setup(h: &Harness, name: &str) {
    h.manager
        .setup(&SetupRequest {
            name: name.to_string(),
            email: format!("{name}@x.com"),
            ..SetupRequest::default()
        })
        .unwrap();
}

#[test]
fn activate_replaces_global_config_and_writes_pointer() {
    let h = Harness::new(FakeGitHub::default());
    setup(&h, "alice");
    setup(&h, "bob");

    let outcome = h.manager.switch("alice").unwrap();

    assert!(outcome.verification.is_none());
    assert!(outcome.pointer_error.is_none());
    assert_eq!(h.read(".gitconfig"), h.read(".gitconfig-alice"));
    assert_eq!(h.read(".active-account").trim(), "alice");
    let listed = h.manager.list(false).unwrap();
    assert!(listed.iter().find(|a| a.name == "alice").unwrap().active);
    assert!(!listed.iter().find(|a| a.name == "bob").unwrap().active);

    h.manager.switch("bob").unwrap();
    assert_eq!(h.manager.current().unwrap().active.as_deref(), Some("bob"));
}

#[test]
fn activate_unknown_account_fails_without_writing() {
    let h = Harness::new(FakeGitHub::default());

    let err = h.manager.switch("ghost").unwrap_err();

    assert!(matches!(err, AppError::AccountNotFound(ref name) if name == "ghost"));
    assert!(!h.path(".gitconfig").exists());
    assert!(!h.path(".active-account").exists());
}

#[test]
fn rejected_token_aborts_before_mutation() {
    let h = Harness::new(FakeGitHub::default().with_token("ghp_bob", "bob"));
    setup(&h, "alice");
    setup(&h, "bob");
    h.manager.switch("bob").unwrap();
    h.vault.set("alice", "ghp_bob").unwrap();

    let err = h.manager.switch("alice").unwrap_err();

    assert!(matches!(
        err,
        AppError::TokenInvalid { reason: FailureReason::WrongUser, .. }
    ));
    assert_eq!(h.read(".gitconfig"), h.read(".gitconfig-bob"));
    assert_eq!(h.read(".active-account").trim(), "bob");
}

#[test]
fn valid_token_is_verified_before_switch() {
    let h = Harness::new(FakeGitHub::default().with_token("ghp_alice", "alice"));
    setup(&h, "alice");
    h.vault.set("alice", "ghp_alice").unwrap();

    let outcome = h.manager.switch("alice").unwrap();

    assert!(outcome.verification.unwrap().valid);
}

#[test]
fn unreachable_github_does_not_block_switch() {
    let h = Harness::new(FakeGitHub::default().with_token("ghp_alice", "alice"));
    setup(&h, "alice");
    h.vault.set("alice", "ghp_alice").unwrap();
    h.github.set_offline(true);

    let outcome = h.manager.switch("alice").unwrap();

    assert_eq!(
        outcome.verification.and_then(|v| v.reason),
        Some(FailureReason::NetworkError)
    );
    assert_eq!(h.read(".gitconfig"), h.read(".gitconfig-alice"));
}

#[test]
fn pointer_write_failure_is_reported_not_fatal() {
    let h = Harness::new(FakeGitHub::default());
    setup(&h, "alice");
    fs::create_dir(h.path(".active-account")).unwrap();

    let outcome = h.manager.switch("alice").unwrap();

    assert!(outcome.pointer_error.is_some());
    assert_eq!(h.manager.current().unwrap().active.as_deref(), Some("alice"));
}

#[test]
fn global_user_outside_configured_accounts_is_not_active() {
    let h = Harness::new(FakeGitHub::default());
    setup(&h, "alice");
    fs::write(h.path(".gitconfig"), identity::render(&Account::new("someone", "s@x.com"))).unwrap();

    let current = h.manager.current().unwrap();

    assert_eq!(current.active, None);
    assert_eq!(current.global_user.as_deref(), Some("someone"));
}

#[test]
fn concurrent_switches_leave_exactly_one_account_active() {
    let h = Harness::new(FakeGitHub::default());
    setup(&h, "alice");
    setup(&h, "bob");
    let alice = h.read(".gitconfig-alice");
    let bob = h.read(".gitconfig-bob");

    for _ in 0..10 {
        let first = h.second_manager();
        let second = h.second_manager();
        let a = thread::spawn(move || first.switch("alice").map(|o| o.account));
        let b = thread::spawn(move || second.switch("bob").map(|o| o.account));
        a.join().unwrap().unwrap();
        b.join().unwrap().unwrap();

        let global = h.read(".gitconfig");
        assert!(global == alice || global == bob, "torn global config: {global:?}");
        let active = h.manager.current().unwrap();
        assert_eq!(active.pointer, active.active);
    }
}

#[test]
fn unavailable_vault_aborts_switch() {
    let h = Harness::new(FakeGitHub::default());
    setup(&h, "alice");
    let broken = h.manager_with_vault(gitswitch::vault::MemoryVault::unavailable());

    let err = broken.switch("alice").unwrap_err();

    assert!(matches!(err, AppError::VaultUnavailable(_)));
    assert!(!h.path(".gitconfig").exists());
}

#[test]
fn locked_global_config_fails_switch_without_changes() {
    let h = Harness::new(FakeGitHub::default());
    setup(&h, "alice");
    setup(&h, "bob");
    h.manager.switch("alice").unwrap();
    let manager = h.manager_with_lock_timeout(Duration::from_millis(200));
    let _held = FileLock::acquire(&h.path(".gitconfig"), Duration::from_secs(1)).unwrap();

    let err = manager.switch("bob").unwrap_err();

    assert!(matches!(err, AppError::Lock(_)));
    assert_eq!(h.read(".gitconfig"), h.read(".gitconfig-alice"));
    assert_eq!(h.read(".active-account").trim(), "alice");
}

#[cfg(unix)]
#[test]
fn symlinked_global_config_stays_a_link() {
    let h = Harness::new(FakeGitHub::default());
    setup(&h, "alice");
    fs::create_dir(h.path("dotfiles")).unwrap();
    fs::write(h.path("dotfiles/gitconfig"), "[core]\n").unwrap();
    std::os::unix::fs::symlink(h.path("dotfiles/gitconfig"), h.path(".gitconfig")).unwrap();

    h.manager.switch("alice").unwrap();

    let meta = fs::symlink_metadata(h.path(".gitconfig")).unwrap();
    assert!(meta.file_type().is_symlink());
    assert_eq!(h.read("dotfiles/gitconfig"), h.read(".gitconfig-alice"));
    assert_eq!(h.manager.current().unwrap().active.as_deref(), Some("alice"));
}
