//! Per-service DNS settings through `networksetup`.

use super::{BackendReport, Platform, PlatformBackend, fan_out, run_for_interface};
use crate::backup::{BackupRecord, BackupStore, FileBackupStore};
use crate::config::{BackupPolicy, RestoreOptions, SetOptions};
use crate::error::Result;
use crate::interfaces::{InterfaceDescriptor, mac_interfaces};
use crate::process::{CommandRunner, Invocation, run_checked};
use crate::servers::ServerList;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Default directory for backup files.
pub const MAC_CACHE_DIR: &str = "/Library/Caches";

/// Sets DNS servers on every configurable network service.
///
/// Services are enumerated at call time. A failing service never stops
/// the others; failures come back in the [`BackendReport`].
pub struct MacBackend {
    store: FileBackupStore,
    runner: Arc<dyn CommandRunner>,
}

impl MacBackend {
    /// Creates a backend storing backups under `/Library/Caches`.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            store: FileBackupStore::cache_dir(MAC_CACHE_DIR),
            runner,
        }
    }

    /// Stores backups in a custom directory (useful for testing).
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store = FileBackupStore::cache_dir(dir);
        self
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

        step!(opts.logging, backup = %name, "Backing up current DNS servers");
        let out = run_checked(self.runner.as_ref(), &scutil_dns()).await?;
        let servers = parse_scutil_nameservers(&out.stdout);
        let record = if servers.is_empty() {
            BackupRecord::Automatic
        } else {
            BackupRecord::Servers(servers)
        };
        self.store.save(name, &record).await
    }

    async fn set_everywhere(&self, servers: Vec<String>, logging: bool) -> Result<BackendReport> {
        let interfaces = mac_interfaces(self.runner.as_ref()).await?;
        let runner = self.runner.as_ref();
        let servers = &servers;

        Ok(fan_out(interfaces, logging, |iface: InterfaceDescriptor| async move {
            let inv = set_dns_servers(&iface.name, servers);
            step!(logging, interface = %iface, command = %inv, "Setting interface");
            run_for_interface(runner, &iface, vec![inv], reports_error).await
        })
        .await)
    }
}

impl std::fmt::Debug for MacBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacBackend")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PlatformBackend for MacBackend {
    fn platform(&self) -> Platform {
        Platform::MacOs
    }

    fn requires_privilege(&self) -> bool {
        false
    }

    async fn apply_servers(
        &self,
        servers: &ServerList,
        opts: &SetOptions,
    ) -> Result<BackendReport> {
        if opts.make_backup {
            self.backup_current(opts).await?;
        }
        self.set_everywhere(servers.to_strings(), opts.logging).await
    }

    async fn restore_servers(&self, opts: &RestoreOptions) -> Result<BackendReport> {
        let name = &opts.backup_name;
        let servers = if opts.use_dhcp {
            step!(opts.logging, "Reverting interfaces to DHCP");
            Vec::new()
        } else {
            let record = self.store.load(name).await?;
            step!(opts.logging, backup = %name, "Found backed up DNS file");
            match record {
                BackupRecord::Servers(servers) => servers,
                BackupRecord::Automatic => Vec::new(),
                BackupRecord::ResolverFile(content) => {
                    parse_nameserver_lines(&String::from_utf8_lossy(&content))
                }
            }
        };

        let report = self.set_everywhere(servers, opts.logging).await?;

        if opts.remove_backup {
            if report.failures.is_empty() {
                step!(opts.logging, backup = %name, "Removing backup");
                self.store.remove(name).await?;
            } else {
                step_warn!(
                    opts.logging,
                    backup = %name,
                    failed = report.failures.len(),
                    "Keeping backup because some interfaces were not restored"
                );
            }
        }
        Ok(report)
    }
}

/// `networksetup -setdnsservers <service> <servers...>`.
///
/// An empty list becomes `Empty`, which hands the service back to DHCP.
#[must_use]
pub fn set_dns_servers(service: &str, servers: &[String]) -> Invocation {
    let inv = Invocation::new("networksetup")
        .arg("-setdnsservers")
        .arg(service);
    if servers.is_empty() {
        inv.arg("Empty")
    } else {
        inv.args(servers.iter().cloned())
    }
}

/// `scutil --dns`.
#[must_use]
pub fn scutil_dns() -> Invocation {
    Invocation::new("scutil").arg("--dns")
}

/// Extracts the first two distinct `nameserver[N] : <addr>` entries from
/// `scutil --dns` output, in order.
#[must_use]
pub fn parse_scutil_nameservers(output: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for line in output.lines().map(str::trim) {
        let Some(rest) = line.strip_prefix("nameserver[") else {
            continue;
        };
        let Some((_, addr)) = rest.split_once(':') else {
            continue;
        };
        let addr = addr.trim();
        if !addr.is_empty() && !found.iter().any(|a| a == addr) {
            found.push(addr.to_string());
            if found.len() == 2 {
                break;
            }
        }
    }
    found
}

fn parse_nameserver_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|l| l.trim().strip_prefix("nameserver"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// `networksetup` exits 0 on most errors and prints `** Error` instead.
fn reports_error(stdout: &str) -> bool {
    stdout.contains("** Error")
}
