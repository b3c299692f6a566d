//! Platform backends.
//!
//! Each backend turns "apply these servers" / "restore the backup" into the
//! native operations for one OS. Validation, privilege checks and result
//! reporting live in [`DnsChanger`](crate::DnsChanger); backends only own
//! the mechanism.

pub mod linux;
pub mod macos;
pub mod windows;

use crate::config::{RestoreOptions, SetOptions};
use crate::error::{DnsError, Result};
use crate::interfaces::InterfaceDescriptor;
use crate::process::{CommandRunner, Invocation};
use crate::servers::ServerList;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;

pub use linux::LinuxBackend;
pub use macos::MacBackend;
pub use windows::{NetConfigTool, WindowsBackend, WindowsRelease};

/// Operating systems with a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Host-global `/etc/resolv.conf`.
    Linux,
    /// Per-service settings through `networksetup`.
    MacOs,
    /// Per-adapter settings through `netsh` or PowerShell.
    Windows,
}

impl Platform {
    /// Maps a `std::env::consts::OS` value to a platform.
    ///
    /// # Errors
    ///
    /// Returns [`DnsError::UnsupportedPlatform`] for any other OS.
    pub fn from_os(os: &str) -> Result<Self> {
        match os {
            "linux" => Ok(Self::Linux),
            "macos" => Ok(Self::MacOs),
            "windows" => Ok(Self::Windows),
            other => Err(DnsError::UnsupportedPlatform {
                os: other.to_string(),
            }),
        }
    }

    /// The platform this process runs on.
    ///
    /// # Errors
    ///
    /// See [`from_os`](Self::from_os).
    pub fn current() -> Result<Self> {
        Self::from_os(std::env::consts::OS)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::Windows => "windows",
        })
    }
}

/// One interface whose command failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceFailure {
    /// The interface name.
    pub interface: String,
    /// The command line that failed.
    pub command: String,
    /// Exit status and output, or the spawn error.
    pub detail: String,
}

impl fmt::Display for InterfaceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: `{}` failed: {}", self.interface, self.command, self.detail)
    }
}

/// What a backend touched and which interfaces failed.
///
/// Empty for host-global backends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendReport {
    /// Every interface a command was issued for.
    pub interfaces: Vec<InterfaceDescriptor>,
    /// Interfaces on which a command failed.
    pub failures: Vec<InterfaceFailure>,
}

/// The per-OS mechanism behind [`DnsChanger`](crate::DnsChanger).
#[async_trait]
pub trait PlatformBackend: Send + Sync {
    /// The OS this backend targets.
    fn platform(&self) -> Platform;

    /// Whether the engine must confirm elevation before calling in.
    fn requires_privilege(&self) -> bool;

    /// Captures a backup if asked to, then applies `servers`.
    async fn apply_servers(&self, servers: &ServerList, opts: &SetOptions)
    -> Result<BackendReport>;

    /// Restores the state captured under `opts.backup_name`.
    async fn restore_servers(&self, opts: &RestoreOptions) -> Result<BackendReport>;
}

/// Runs `invocations` in order for one interface, stopping at the first
/// failure.
pub(crate) async fn run_for_interface(
    runner: &dyn CommandRunner,
    interface: &InterfaceDescriptor,
    invocations: Vec<Invocation>,
    rejects_output: fn(&str) -> bool,
) -> std::result::Result<(), InterfaceFailure> {
    for inv in invocations {
        let failure = |detail: String| InterfaceFailure {
            interface: interface.name.clone(),
            command: inv.to_string(),
            detail,
        };
        let out = runner.run(&inv).await.map_err(|e| failure(e.to_string()))?;
        if let Err(e) = out.clone().check(&inv) {
            let detail = match e {
                DnsError::CommandExecutionFailed { detail, .. } => detail,
                other => other.to_string(),
            };
            return Err(failure(detail));
        }
        if rejects_output(&out.stdout) {
            return Err(failure(out.stdout.trim().to_string()));
        }
    }
    Ok(())
}

/// Runs `task` for every interface concurrently and collects failures.
///
/// Every interface is attempted; one failure never stops the others.
pub(crate) async fn fan_out<F, Fut>(
    interfaces: Vec<InterfaceDescriptor>,
    logging: bool,
    task: F,
) -> BackendReport
where
    F: Fn(InterfaceDescriptor) -> Fut,
    Fut: Future<Output = std::result::Result<(), InterfaceFailure>>,
{
    let results = futures::future::join_all(interfaces.iter().cloned().map(&task)).await;

    let mut failures = Vec::new();
    for (iface, result) in interfaces.iter().zip(results) {
        match result {
            Ok(()) => step!(logging, interface = %iface, "Interface updated"),
            Err(failure) => {
                step_warn!(
                    logging,
                    interface = %failure.interface,
                    command = %failure.command,
                    detail = %failure.detail,
                    "Interface update failed"
                );
                failures.push(failure);
            }
        }
    }
    BackendReport {
        interfaces,
        failures,
    }
}

/// Output check for tools that always exit 0.
pub(crate) const fn accept_any_output(_: &str) -> bool {
    false
}
