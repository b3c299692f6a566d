//! `/etc/resolv.conf` management.
//!
//! Linux has no per-interface step here: the resolver file is host-global,
//! so any failure while writing it aborts the call.

use super::{BackendReport, Platform, PlatformBackend};
use crate::backup::{BackupRecord, BackupStore, FileBackupStore};
use crate::config::{BackupPolicy, RestoreOptions, SetOptions};
use crate::error::{DnsError, Result};
use crate::process::{CommandRunner, Invocation, run_checked};
use crate::servers::ServerList;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default resolver file.
pub const RESOLV_CONF: &str = "/etc/resolv.conf";

/// First line of every resolver file written by this crate.
pub const GENERATED_HEADER: &str = "# generated by dns-changer";

/// Rewrites the resolver file and keeps verbatim backups next to it.
///
/// # Lifecycle
///
/// 1. [`apply_servers`](PlatformBackend::apply_servers) copies the current
///    file to `<file>.<backup>`, writes two `nameserver` lines and marks the
///    file immutable so DHCP clients leave it alone.
/// 2. [`restore_servers`](PlatformBackend::restore_servers) clears the
///    immutable flag and copies the backup back.
///
/// Attribute changes and cache flushes go through the injected
/// [`CommandRunner`].
pub struct LinuxBackend {
    resolv_conf: PathBuf,
    store: FileBackupStore,
    runner: Arc<dyn CommandRunner>,
}

impl LinuxBackend {
    /// Creates a backend targeting `/etc/resolv.conf`.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            resolv_conf: PathBuf::from(RESOLV_CONF),
            store: FileBackupStore::sibling(RESOLV_CONF),
            runner,
        }
    }

    /// Targets a custom resolver file (useful for testing). Backups follow it.
    #[must_use]
    pub fn with_resolv_conf(mut self, path: impl Into<PathBuf>) -> Self {
        self.resolv_conf = path.into();
        self.store = FileBackupStore::sibling(&self.resolv_conf);
        self
    }

    /// Returns the resolver file path.
    #[must_use]
    pub fn resolv_conf(&self) -> &Path {
        &self.resolv_conf
    }

    /// Returns the backup store.
    #[must_use]
    pub const fn store(&self) -> &FileBackupStore {
        &self.store
    }

    async fn backup_current(&self, opts: &SetOptions) -> Result<()> {
        let name = &opts.backup_name;
        if opts.backup_policy == BackupPolicy::KeepExisting && self.store.exists(name).await {
            step!(opts.logging, backup = %name, "Keeping existing backup");
            return Ok(());
        }

        let path = self.store.path_for(name);
        step!(opts.logging, backup = %name, path = %path.display(), "Backing up resolver file");
        match tokio::fs::read(&self.resolv_conf).await {
            Ok(content) => {
                self.store
                    .save(name, &BackupRecord::ResolverFile(content))
                    .await
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                step_warn!(
                    opts.logging,
                    path = %self.resolv_conf.display(),
                    "No resolver file to back up"
                );
                Ok(())
            }
            Err(source) => Err(DnsError::ConfigReadFailed {
                path: self.resolv_conf.clone(),
                source,
            }),
        }
    }

    async fn set_immutable(&self, immutable: bool) -> Result<()> {
        run_checked(self.runner.as_ref(), &chattr(immutable, &self.resolv_conf))
            .await
            .map(drop)
    }

    /// Makes the file writable for restore. A missing `chattr`, or a file
    /// that cannot carry attributes (a symlink, tmpfs), means the attribute
    /// cannot have been set either.
    async fn clear_immutable_for_restore(&self) -> Result<()> {
        let inv = chattr(false, &self.resolv_conf);
        match self.runner.run(&inv).await {
            Ok(out) if out.success() => Ok(()),
            Ok(out) if attributes_unsupported(&out.stderr) => {
                tracing::debug!(
                    path = %self.resolv_conf.display(),
                    "File does not support attributes, skipping attribute change"
                );
                Ok(())
            }
            Ok(out) => Err(DnsError::PermissionDenied {
                path: self.resolv_conf.clone(),
                detail: format!("`{inv}` exited with {:?}: {}", out.code, out.stderr.trim()),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("chattr not available, skipping attribute change");
                Ok(())
            }
            Err(e) => Err(DnsError::PermissionDenied {
                path: self.resolv_conf.clone(),
                detail: e.to_string(),
            }),
        }
    }

    async fn write_resolv_conf(&self, content: &[u8]) -> Result<()> {
        tokio::fs::write(&self.resolv_conf, content)
            .await
            .map_err(|source| DnsError::ConfigWriteFailed {
                path: self.resolv_conf.clone(),
                source,
            })
    }

    /// Best effort: the first systemd flavor that works, then nscd.
    async fn flush_caches(&self, logging: bool) {
        step!(logging, "Flushing resolver caches");
        let [resolvectl, systemd_resolve, nscd] = flush_invocations();

        let mut flushed = false;
        for inv in [resolvectl, systemd_resolve] {
            match self.runner.run(&inv).await {
                Ok(out) if out.success() => {
                    flushed = true;
                    break;
                }
                Ok(out) => tracing::debug!(command = %inv, code = ?out.code, "Cache flush failed"),
                Err(e) => tracing::debug!(command = %inv, error = %e, "Cache flush unavailable"),
            }
        }
        if !flushed {
            step!(logging, "No systemd resolver cache flushed");
        }

        if let Err(e) = self.runner.run(&nscd).await {
            tracing::debug!(command = %nscd, error = %e, "nscd restart unavailable");
        }
    }
}

impl std::fmt::Debug for LinuxBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinuxBackend")
            .field("resolv_conf", &self.resolv_conf)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PlatformBackend for LinuxBackend {
    fn platform(&self) -> Platform {
        Platform::Linux
    }

    fn requires_privilege(&self) -> bool {
        true
    }

    async fn apply_servers(
        &self,
        servers: &ServerList,
        opts: &SetOptions,
    ) -> Result<BackendReport> {
        if opts.make_backup {
            self.backup_current(opts).await?;
        }

        // A previous apply leaves the file immutable.
        if let Err(e) = self.set_immutable(false).await {
            tracing::debug!(error = %e, "Could not clear immutable attribute before write");
        }

        step!(opts.logging, path = %self.resolv_conf.display(), "Writing resolver file");
        self.write_resolv_conf(generate_resolv_conf(servers).as_bytes())
            .await?;

        step!(opts.logging, "Marking resolver file immutable");
        if let Err(e) = self.set_immutable(true).await {
            step_warn!(opts.logging, error = %e, "Could not mark resolver file immutable");
        }

        self.flush_caches(opts.logging).await;
        Ok(BackendReport::default())
    }

    async fn restore_servers(&self, opts: &RestoreOptions) -> Result<BackendReport> {
        let name = &opts.backup_name;
        let record = self.store.load(name).await?;
        let path = self.store.path_for(name);
        step!(opts.logging, backup = %name, path = %path.display(), "Found backed up resolver file");

        step!(opts.logging, "Clearing immutable attribute");
        self.clear_immutable_for_restore().await?;

        step!(opts.logging, "Restoring backup");
        self.write_resolv_conf(&record_content(record)).await?;

        // The file is already restored; flush even if removal fails.
        self.flush_caches(opts.logging).await;

        if opts.remove_backup {
            step!(opts.logging, backup = %name, "Removing backup");
            self.store.remove(name).await?;
        }
        Ok(BackendReport::default())
    }
}

/// Renders the resolver file for `servers`, primary first.
///
/// ```text
/// # generated by dns-changer
/// nameserver 8.8.8.8
/// nameserver 8.8.4.4
/// ```
#[must_use]
pub fn generate_resolv_conf(servers: &ServerList) -> String {
    format!(
        "{GENERATED_HEADER}\nnameserver {}\nnameserver {}\n",
        servers.primary(),
        servers.secondary()
    )
}

/// `chattr +i <path>` or `chattr -i <path>`.
#[must_use]
pub fn chattr(immutable: bool, path: &Path) -> Invocation {
    let flag = if immutable { "+i" } else { "-i" };
    Invocation::new("chattr")
        .arg(flag)
        .arg(path.to_string_lossy())
}

/// `resolvectl flush-caches`, `systemd-resolve --flush-caches`,
/// `service nscd restart`.
#[must_use]
pub fn flush_invocations() -> [Invocation; 3] {
    [
        Invocation::new("resolvectl").arg("flush-caches"),
        Invocation::new("systemd-resolve").arg("--flush-caches"),
        Invocation::new("service").args(["nscd", "restart"]),
    ]
}

/// `chattr` reports these for symlinks and filesystems without inode flags.
fn attributes_unsupported(stderr: &str) -> bool {
    stderr.contains("Operation not supported") || stderr.contains("Inappropriate ioctl")
}

fn record_content(record: BackupRecord) -> Vec<u8> {
    match record {
        BackupRecord::ResolverFile(content) => content,
        BackupRecord::Servers(servers) => servers
            .iter()
            .map(|s| format!("nameserver {s}\n"))
            .collect::<String>()
            .into_bytes(),
        BackupRecord::Automatic => Vec::new(),
    }
}
