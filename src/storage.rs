use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::error::AppError;

/// Prefix of per-account identity files in the home directory
pub const IDENTITY_FILE_PREFIX: &str = ".gitconfig-";
/// Global git config file name
const GLOBAL_GIT_CONFIG_FILE: &str = ".gitconfig";
/// Best-effort active account pointer
const ACTIVE_ACCOUNT_FILE: &str = ".active-account";
/// Prefix of generated SSH private keys
const KEY_FILE_PREFIX: &str = "id_ed25519_";

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Every on-disk location derived from a home directory
#[derive(Debug, Clone)]
pub struct Layout {
    home: PathBuf,
}

impl Layout {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Layout { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// `<home>/.gitconfig-<name>`
    pub fn identity_file(&self, account_name: &str) -> PathBuf {
        self.home.join(format!("{IDENTITY_FILE_PREFIX}{account_name}"))
    }

    /// `<home>/.gitconfig`
    pub fn global_git_config(&self) -> PathBuf {
        self.home.join(GLOBAL_GIT_CONFIG_FILE)
    }

    /// `<home>/.active-account`
    pub fn active_pointer(&self) -> PathBuf {
        self.home.join(ACTIVE_ACCOUNT_FILE)
    }

    /// `<home>/.ssh`
    pub fn ssh_dir(&self) -> PathBuf {
        self.home.join(".ssh")
    }

    /// `<home>/.ssh/config`
    pub fn ssh_config(&self) -> PathBuf {
        self.ssh_dir().join("config")
    }

    /// `<home>/.ssh/id_ed25519_<name>`
    pub fn private_key(&self, account_name: &str) -> PathBuf {
        self.ssh_dir().join(format!("{KEY_FILE_PREFIX}{account_name}"))
    }

    /// `<home>/.ssh/id_ed25519_<name>.pub`
    pub fn public_key(&self, account_name: &str) -> PathBuf {
        self.ssh_dir().join(format!("{KEY_FILE_PREFIX}{account_name}.pub"))
    }
}

/// Reads a file, mapping "does not exist" to `None`
pub fn read_optional(path: &Path) -> Result<Option<String>, AppError> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Replaces `path` with `contents` through a synced sibling temp file and a rename,
/// so readers see either the old or the new file, never a torn one.
///
/// A symlinked `path` keeps its link: the file it points at is replaced instead.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), AppError> {
    let resolved = resolve_symlink(path)?;
    let path = resolved.as_path();
    let parent = path
        .parent()
        .ok_or_else(|| AppError::Validation(format!("no parent directory for {}", path.display())))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| AppError::Validation(format!("no file name in {}", path.display())))?
        .to_string_lossy();
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_path = parent.join(format!(".{}.{}.{}.tmp", file_name, process::id(), seq));

    let result = (|| -> io::Result<()> {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        if let Ok(meta) = fs::metadata(path) {
            if meta.is_file() {
                fs::set_permissions(&tmp_path, meta.permissions())?;
            }
        }
        fs::rename(&tmp_path, path)
    })();

    if let Err(err) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}

/// Follows `path` to the file it names when it is a symlink, including a
/// dangling one whose target does not exist yet
fn resolve_symlink(path: &Path) -> io::Result<PathBuf> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => match fs::canonicalize(path) {
            Ok(target) => Ok(target),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let link = fs::read_link(path)?;
                Ok(path.parent().map(|p| p.join(&link)).unwrap_or(link))
            }
            Err(err) => Err(err),
        },
        _ => Ok(path.to_path_buf()),
    }
}

/// Creates `dir` if needed and restricts it to the owner on unix
pub fn ensure_private_dir(dir: &Path) -> Result<(), AppError> {
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_follow_account_name() {
        let layout = Layout::new("/home/dev");
        assert_eq!(layout.identity_file("alice"), PathBuf::from("/home/dev/.gitconfig-alice"));
        assert_eq!(layout.global_git_config(), PathBuf::from("/home/dev/.gitconfig"));
        assert_eq!(layout.ssh_config(), PathBuf::from("/home/dev/.ssh/config"));
        assert_eq!(layout.public_key("alice"), PathBuf::from("/home/dev/.ssh/id_ed25519_alice.pub"));
    }

    #[test]
    fn write_atomic_replaces_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join(".gitconfig");
        fs::write(&target, "old").unwrap();

        write_atomic(&target, b"new contents").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "new contents");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn write_atomic_updates_symlink_target_in_place() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("dotfiles")).unwrap();
        let real = dir.path().join("dotfiles").join("gitconfig");
        fs::write(&real, "old").unwrap();
        let link = dir.path().join(".gitconfig");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        write_atomic(&link, b"new").unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&real).unwrap(), "new");
    }

    #[cfg(unix)]
    #[test]
    fn write_atomic_creates_target_of_dangling_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("config");
        std::os::unix::fs::symlink("real-config", &link).unwrap();

        write_atomic(&link, b"Host a\n").unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(dir.path().join("real-config")).unwrap(), "Host a\n");
    }

    #[test]
    fn read_optional_maps_missing_file_to_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_optional(&dir.path().join("missing")).unwrap().is_none());
    }
}
