//! Persistent storage for pre-change resolver state.
//!
//! A backup is the only state that survives between calls. Restoring is
//! only ever done from a backup that exists; a missing backup is an
//! error, never an empty record.

use crate::error::{DnsError, Result};
use crate::servers::BackupName;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Captured resolver state for one [`BackupName`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupRecord {
    /// Verbatim resolver file bytes (Linux).
    ResolverFile(Vec<u8>),
    /// Previously active server addresses, in order (macOS).
    Servers(Vec<String>),
    /// No static servers were configured; restoring means DHCP.
    Automatic,
}

/// Where and how backups are laid out on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupLayout {
    /// `<file>.<name>`, holding a verbatim copy of `file`.
    Sibling {
        /// The file being backed up.
        file: PathBuf,
    },
    /// `<dir>/<name>.txt`, one server address per line.
    CacheDir {
        /// Directory holding the backup files.
        dir: PathBuf,
    },
}

/// Save, load and remove backups by name.
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Persists `record` under `name`, replacing any previous record.
    async fn save(&self, name: &BackupName, record: &BackupRecord) -> Result<()>;

    /// Loads the record stored under `name`.
    ///
    /// Fails with [`DnsError::BackupNotFound`] if there is none.
    async fn load(&self, name: &BackupName) -> Result<BackupRecord>;

    /// Deletes the record stored under `name`. Missing records are a no-op.
    async fn remove(&self, name: &BackupName) -> Result<()>;

    /// Returns `true` if a record exists under `name`.
    async fn exists(&self, name: &BackupName) -> bool;
}

/// File-backed [`BackupStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBackupStore {
    layout: BackupLayout,
}

impl FileBackupStore {
    /// Stores verbatim copies next to `file`.
    #[must_use]
    pub fn sibling(file: impl Into<PathBuf>) -> Self {
        Self {
            layout: BackupLayout::Sibling { file: file.into() },
        }
    }

    /// Stores server lists as text files in `dir`.
    #[must_use]
    pub fn cache_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            layout: BackupLayout::CacheDir { dir: dir.into() },
        }
    }

    /// Returns the layout.
    #[must_use]
    pub const fn layout(&self) -> &BackupLayout {
        &self.layout
    }

    /// Returns the on-disk location for `name`.
    #[must_use]
    pub fn path_for(&self, name: &BackupName) -> PathBuf {
        match &self.layout {
            BackupLayout::Sibling { file } => {
                let mut os = file.clone().into_os_string();
                os.push(".");
                os.push(name.as_str());
                PathBuf::from(os)
            }
            BackupLayout::CacheDir { dir } => dir.join(format!("{name}.txt")),
        }
    }

    fn encode(record: &BackupRecord) -> Vec<u8> {
        match record {
            BackupRecord::ResolverFile(content) => content.clone(),
            BackupRecord::Automatic => Vec::new(),
            BackupRecord::Servers(servers) => {
                let mut out = servers.join("\n");
                out.push('\n');
                out.into_bytes()
            }
        }
    }

    fn decode(&self, content: Vec<u8>) -> BackupRecord {
        match self.layout {
            BackupLayout::Sibling { .. } => BackupRecord::ResolverFile(content),
            BackupLayout::CacheDir { .. } => {
                let servers: Vec<String> = String::from_utf8_lossy(&content)
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(ToString::to_string)
                    .collect();
                if servers.is_empty() {
                    BackupRecord::Automatic
                } else {
                    BackupRecord::Servers(servers)
                }
            }
        }
    }
}

#[async_trait]
impl BackupStore for FileBackupStore {
    async fn save(&self, name: &BackupName, record: &BackupRecord) -> Result<()> {
        let path = self.path_for(name);
        let write_failed = |source| DnsError::BackupWriteFailed {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(write_failed)?;
        }
        tokio::fs::write(&path, Self::encode(record))
            .await
            .map_err(write_failed)?;

        tracing::debug!(backup = %name, path = %path.display(), "Saved DNS backup");
        Ok(())
    }

    async fn load(&self, name: &BackupName) -> Result<BackupRecord> {
        let path = self.path_for(name);
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(self.decode(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(DnsError::BackupNotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, name: &BackupName) -> Result<()> {
        let path = self.path_for(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(backup = %name, path = %path.display(), "Removed DNS backup");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(DnsError::BackupRemoveFailed { path, source }),
        }
    }

    async fn exists(&self, name: &BackupName) -> bool {
        is_file(&self.path_for(name)).await
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> BackupName {
        BackupName::new(s).unwrap()
    }

    #[test]
    fn sibling_path_appends_name() {
        let store = FileBackupStore::sibling("/etc/resolv.conf");
        assert_eq!(
            store.path_for(&name("before-dns-changer")),
            PathBuf::from("/etc/resolv.conf.before-dns-changer")
        );
    }

    #[test]
    fn cache_dir_path_uses_txt() {
        let store = FileBackupStore::cache_dir("/Library/Caches");
        assert_eq!(
            store.path_for(&name("vpn")),
            PathBuf::from("/Library/Caches/vpn.txt")
        );
    }

    #[tokio::test]
    async fn sibling_round_trip_is_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackupStore::sibling(dir.path().join("resolv.conf"));
        let content = "# from dhcp\nnameserver 192.168.1.1\noptions edns0\n";

        store
            .save(&name("b"), &BackupRecord::ResolverFile(content.into()))
            .await
            .unwrap();
        assert!(dir.path().join("resolv.conf.b").exists());
        assert_eq!(
            store.load(&name("b")).await.unwrap(),
            BackupRecord::ResolverFile(content.into())
        );
    }

    #[tokio::test]
    async fn sibling_keeps_non_utf8_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackupStore::sibling(dir.path().join("resolv.conf"));
        let record = BackupRecord::ResolverFile(b"# caf\xe9\nnameserver 10.0.0.1\n".to_vec());

        store.save(&name("b"), &record).await.unwrap();
        assert_eq!(store.load(&name("b")).await.unwrap(), record);
    }

    #[tokio::test]
    async fn cache_dir_stores_one_server_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackupStore::cache_dir(dir.path());
        let record = BackupRecord::Servers(vec!["192.168.1.1".into(), "fe80::1".into()]);

        store.save(&name("b"), &record).await.unwrap();
        let raw = std::fs::read_to_string(dir.path().join("b.txt")).unwrap();
        assert_eq!(raw, "192.168.1.1\nfe80::1\n");
        assert_eq!(store.load(&name("b")).await.unwrap(), record);
    }

    #[tokio::test]
    async fn empty_cache_file_means_automatic() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackupStore::cache_dir(dir.path());

        store.save(&name("b"), &BackupRecord::Automatic).await.unwrap();
        assert_eq!(
            store.load(&name("b")).await.unwrap(),
            BackupRecord::Automatic
        );
    }

    #[tokio::test]
    async fn missing_backup_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackupStore::cache_dir(dir.path());
        let err = store.load(&name("nope")).await.unwrap_err();
        assert!(matches!(err, DnsError::BackupNotFound { ref name } if name == "nope"));
        assert!(!store.exists(&name("nope")).await);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackupStore::cache_dir(dir.path());
        store
            .save(&name("b"), &BackupRecord::Servers(vec!["1.1.1.1".into()]))
            .await
            .unwrap();

        store.remove(&name("b")).await.unwrap();
        assert!(!store.exists(&name("b")).await);
        store.remove(&name("b")).await.unwrap();
    }

    #[tokio::test]
    async fn save_creates_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackupStore::cache_dir(dir.path().join("nested/caches"));
        store.save(&name("b"), &BackupRecord::Automatic).await.unwrap();
        assert!(dir.path().join("nested/caches/b.txt").exists());
    }
}
