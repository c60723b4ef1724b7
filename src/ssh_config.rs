//! Named `Host` blocks inside the shared `~/.ssh/config`.
//!
//! The file is parsed into blocks: a block starts at a `Host` or `Match` header
//! line and runs up to the next header or end of file. Entries are addressed by
//! the exact argument list of their `Host` line, so `work` never matches `work2`.
//! Mutations hold `config.lock` for the whole read-modify-write cycle.
//!
//! Removing an entry restores the file byte for byte, with one exception: when
//! the file did not end in a newline, append first writes a `\n` so the new
//! `Host` line starts on its own line, and that newline stays after removal.

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::{debug, info};

use crate::{
    error::AppError,
    lock::FileLock,
    storage::{self, ensure_private_dir},
};

/// A `Host` block pointing an alias at github.com with a dedicated key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfigEntry {
    pub host_alias: String,
    pub host_name: String,
    pub user: String,
    pub identity_file: PathBuf,
    pub identities_only: bool,
}

impl SshConfigEntry {
    pub fn for_github(host_alias: impl Into<String>, identity_file: impl Into<PathBuf>) -> Self {
        SshConfigEntry {
            host_alias: host_alias.into(),
            host_name: "github.com".to_string(),
            user: "git".to_string(),
            identity_file: identity_file.into(),
            identities_only: true,
        }
    }

    /// Renders the block exactly as it is appended to the file
    pub fn render(&self) -> String {
        let identity_file = self.identity_file.to_string_lossy().replace('\\', "/");
        let identity_file = if identity_file.contains(char::is_whitespace) {
            format!("\"{identity_file}\"")
        } else {
            identity_file
        };
        format!(
            "Host {}\n  HostName {}\n  User {}\n  IdentityFile {}\n  IdentitiesOnly {}\n",
            self.host_alias,
            self.host_name,
            self.user,
            identity_file,
            if self.identities_only { "yes" } else { "no" },
        )
    }

    /// Whether this block authenticates with the key at `identity_file`
    pub fn uses_identity_file(&self, identity_file: &Path) -> bool {
        self.identity_file.to_string_lossy() == identity_file.to_string_lossy().replace('\\', "/")
    }
}

/// Byte range of one block and the key it is addressed by
#[derive(Debug)]
struct Block {
    start: usize,
    end: usize,
    /// Normalized `Host` arguments, `None` for `Match` blocks
    key: Option<String>,
}

/// Splits a config line into its keyword and argument string.
/// Accepts both `Key value` and `Key=value`.
fn split_directive(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let end = line
        .find(|c: char| c.is_whitespace() || c == '=')
        .unwrap_or(line.len());
    let (keyword, rest) = line.split_at(end);
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('=').unwrap_or(rest).trim();
    Some((keyword, rest))
}

fn parse_blocks(contents: &str) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut offset = 0;

    for line in contents.split_inclusive('\n') {
        if let Some((keyword, args)) = split_directive(line) {
            let key = if keyword.eq_ignore_ascii_case("host") {
                Some(Some(args.split_whitespace().collect::<Vec<_>>().join(" ")))
            } else if keyword.eq_ignore_ascii_case("match") {
                Some(None)
            } else {
                None
            };
            if let Some(key) = key {
                if let Some(previous) = blocks.last_mut() {
                    previous.end = offset;
                }
                blocks.push(Block { start: offset, end: contents.len(), key });
            }
        }
        offset += line.len();
    }

    blocks
}

fn parse_entry(key: &str, body: &str) -> SshConfigEntry {
    let mut entry = SshConfigEntry {
        host_alias: key.to_string(),
        host_name: String::new(),
        user: String::new(),
        identity_file: PathBuf::new(),
        identities_only: false,
    };
    for line in body.lines().skip(1) {
        let Some((keyword, value)) = split_directive(line) else {
            continue;
        };
        let value = value.trim_matches('"');
        match keyword.to_ascii_lowercase().as_str() {
            "hostname" => entry.host_name = value.to_string(),
            "user" => entry.user = value.to_string(),
            "identityfile" => entry.identity_file = PathBuf::from(value),
            "identitiesonly" => entry.identities_only = value.eq_ignore_ascii_case("yes"),
            _ => {}
        }
    }
    entry
}

/// Store for named blocks in the SSH client config
#[derive(Debug, Clone)]
pub struct ConfigEntryStore {
    path: PathBuf,
    lock_timeout: Duration,
}

impl ConfigEntryStore {
    pub fn new(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        ConfigEntryStore {
            path: path.into(),
            lock_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<String, AppError> {
        Ok(storage::read_optional(&self.path)?.unwrap_or_default())
    }

    /// Whether a `Host` block with exactly this alias exists
    pub fn has_entry(&self, host_alias: &str) -> Result<bool, AppError> {
        let contents = self.read()?;
        Ok(find_block(&contents, host_alias).is_some())
    }

    /// All `Host` blocks in file order
    pub fn entries(&self) -> Result<Vec<SshConfigEntry>, AppError> {
        let contents = self.read()?;
        Ok(parse_blocks(&contents)
            .into_iter()
            .filter_map(|block| {
                let key = block.key?;
                Some(parse_entry(&key, &contents[block.start..block.end]))
            })
            .collect())
    }

    /// The block whose `Host` line is exactly `host_alias`
    pub fn entry(&self, host_alias: &str) -> Result<Option<SshConfigEntry>, AppError> {
        Ok(self
            .entries()?
            .into_iter()
            .find(|entry| entry.host_alias == host_alias))
    }

    /// Alias of the first block whose `IdentityFile` is `identity_file`
    pub fn find_alias_by_identity_file(&self, identity_file: &Path) -> Result<Option<String>, AppError> {
        Ok(self
            .entries()?
            .into_iter()
            .find(|entry| entry.uses_identity_file(identity_file))
            .map(|entry| entry.host_alias))
    }

    /// Appends `entry`, failing with `AlreadyExists` if its alias is present
    pub fn append_entry(&self, entry: &SshConfigEntry) -> Result<(), AppError> {
        if let Some(dir) = self.path.parent() {
            ensure_private_dir(dir)?;
        }
        let _lock = FileLock::acquire(&self.path, self.lock_timeout)?;

        let contents = self.read()?;
        if find_block(&contents, &entry.host_alias).is_some() {
            return Err(AppError::AlreadyExists(format!("ssh host '{}'", entry.host_alias)));
        }

        let mut rendered = String::new();
        if !contents.is_empty() && !contents.ends_with('\n') {
            rendered.push('\n');
        }
        rendered.push_str(&entry.render());

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;
        file.write_all(rendered.as_bytes())?;
        file.sync_all()?;

        info!(alias = %entry.host_alias, path = %self.path.display(), "ssh config entry appended");
        Ok(())
    }

    /// Removes exactly the bytes of the block for `host_alias`
    pub fn remove_entry(&self, host_alias: &str) -> Result<(), AppError> {
        let _lock = FileLock::acquire(&self.path, self.lock_timeout)?;

        let contents = match storage::read_optional(&self.path)? {
            Some(contents) => contents,
            None => return Err(AppError::NotFound(format!("ssh config {}", self.path.display()))),
        };
        let Some(block) = find_block(&contents, host_alias) else {
            debug!(alias = %host_alias, "no ssh config entry to remove");
            return Err(AppError::NotFound(format!("ssh host '{host_alias}'")));
        };

        let mut updated = String::with_capacity(contents.len());
        updated.push_str(&contents[..block.start]);
        updated.push_str(&contents[block.end..]);
        storage::write_atomic(&self.path, updated.as_bytes())?;

        info!(alias = %host_alias, path = %self.path.display(), "ssh config entry removed");
        Ok(())
    }
}

fn find_block(contents: &str, host_alias: &str) -> Option<Block> {
    parse_blocks(contents)
        .into_iter()
        .find(|block| block.key.as_deref() == Some(host_alias))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn store(dir: &Path) -> ConfigEntryStore {
        ConfigEntryStore::new(dir.join(".ssh").join("config"), Duration::from_secs(1))
    }

    #[test]
    fn render_matches_expected_block() {
        let entry = SshConfigEntry::for_github("github-alice", "/home/a/.ssh/id_ed25519_alice");
        assert_eq!(
            entry.render(),
            "Host github-alice\n  HostName github.com\n  User git\n  IdentityFile /home/a/.ssh/id_ed25519_alice\n  IdentitiesOnly yes\n"
        );
    }

    #[test]
    fn append_then_duplicate_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let entry = SshConfigEntry::for_github("github-alice", "/k/alice");

        store.append_entry(&entry).unwrap();
        assert!(store.has_entry("github-alice").unwrap());
        assert!(matches!(store.append_entry(&entry), Err(AppError::AlreadyExists(_))));

        let contents = fs::read_to_string(store.path()).unwrap();
        assert_eq!(contents.matches("Host github-alice").count(), 1);
    }

    #[test]
    fn append_then_remove_restores_original_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        let original = "# personal\nHost *\n  AddKeysToAgent yes\n\nHost example\n  HostName example.com\n";
        fs::write(store.path(), original).unwrap();

        store.append_entry(&SshConfigEntry::for_github("github-bob", "/k/bob")).unwrap();
        store.remove_entry("github-bob").unwrap();

        assert_eq!(fs::read_to_string(store.path()).unwrap(), original);
    }

    #[test]
    fn remove_never_touches_prefix_sharing_neighbours() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        for alias in ["github-work", "github-work2", "github-work-old"] {
            store.append_entry(&SshConfigEntry::for_github(alias, format!("/k/{alias}"))).unwrap();
        }

        store.remove_entry("github-work").unwrap();

        let aliases: Vec<String> = store.entries().unwrap().into_iter().map(|e| e.host_alias).collect();
        assert_eq!(aliases, vec!["github-work2", "github-work-old"]);
        let contents = fs::read_to_string(store.path()).unwrap();
        assert_eq!(
            contents,
            format!(
                "{}{}",
                SshConfigEntry::for_github("github-work2", "/k/github-work2").render(),
                SshConfigEntry::for_github("github-work-old", "/k/github-work-old").render()
            )
        );
    }

    #[test]
    fn remove_missing_alias_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert!(matches!(store.remove_entry("github-ghost"), Err(AppError::NotFound(_))));

        store.append_entry(&SshConfigEntry::for_github("github-alice", "/k/alice")).unwrap();
        assert!(matches!(store.remove_entry("github-ghost"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn match_blocks_bound_host_blocks() {
        let contents = "Host a\n  User git\nMatch host b\n  User x\nHost=c d\n";
        let blocks = parse_blocks(contents);
        assert_eq!(blocks.len(), 3);
        assert_eq!(&contents[blocks[0].start..blocks[0].end], "Host a\n  User git\n");
        assert_eq!(blocks[1].key, None);
        assert_eq!(blocks[2].key.as_deref(), Some("c d"));
    }

    #[test]
    fn entries_parse_fields_and_lookup_by_identity_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.append_entry(&SshConfigEntry::for_github("work", "/k/id_ed25519_alice")).unwrap();

        let entries = store.entries().unwrap();
        assert_eq!(entries, vec![SshConfigEntry::for_github("work", "/k/id_ed25519_alice")]);
        assert_eq!(
            store.find_alias_by_identity_file(Path::new("/k/id_ed25519_alice")).unwrap(),
            Some("work".to_string())
        );
    }

    #[test]
    fn append_after_file_without_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "Host x\n  User y").unwrap();

        store.append_entry(&SshConfigEntry::for_github("github-z", "/k/z")).unwrap();

        let aliases: Vec<String> = store.entries().unwrap().into_iter().map(|e| e.host_alias).collect();
        assert_eq!(aliases, vec!["x", "github-z"]);

        // The separating newline is all that remains of the entry
        store.remove_entry("github-z").unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "Host x\n  User y\n");
    }

    #[test]
    fn entry_looks_up_exact_alias() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.append_entry(&SshConfigEntry::for_github("github-alice", "/k/id_ed25519_alice")).unwrap();

        let entry = store.entry("github-alice").unwrap().unwrap();
        assert!(entry.uses_identity_file(Path::new("/k/id_ed25519_alice")));
        assert!(!entry.uses_identity_file(Path::new("/k/id_ed25519_bob")));
        assert!(store.entry("github-ali").unwrap().is_none());
    }
}
