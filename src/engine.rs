//! The configuration engine: validation, privilege gate, then the backend.

use crate::backend::{
    BackendReport, InterfaceFailure, LinuxBackend, MacBackend, Platform, PlatformBackend,
    WindowsBackend,
};
use crate::config::{RestoreOptions, SetOptions};
use crate::error::{DnsError, Result};
use crate::interfaces::InterfaceDescriptor;
use crate::privilege::{PrivilegeGate, SystemPrivilege};
use crate::process::{CommandRunner, SystemRunner};
use crate::servers::{ServerInput, ServerList};
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;

/// The change a call performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// New servers were applied.
    Apply(ServerList),
    /// A backup (or DHCP) was restored.
    Restore,
}

/// Outcome of a call that reached the backend.
///
/// A call that could not be attempted at all (bad input, no privilege,
/// missing backup) returns an error instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeReport {
    /// Platform the change ran on.
    pub platform: Platform,
    /// What was done.
    pub transition: Transition,
    /// Interfaces a command was issued for. Empty on Linux.
    pub interfaces: Vec<InterfaceDescriptor>,
    /// Interfaces whose command failed.
    pub failures: Vec<InterfaceFailure>,
}

impl ChangeReport {
    fn new(platform: Platform, transition: Transition, report: BackendReport) -> Self {
        Self {
            platform,
            transition,
            interfaces: report.interfaces,
            failures: report.failures,
        }
    }

    /// Returns `true` if no interface failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Names of the interfaces that failed.
    #[must_use]
    pub fn failed_interfaces(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.interface.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Validating,
    CheckingPrivilege,
    Applying,
    Restoring,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Validating => "validating",
            Self::CheckingPrivilege => "checking-privilege",
            Self::Applying => "applying",
            Self::Restoring => "restoring",
            Self::Done => "done",
        })
    }
}

/// Replaces and restores the host's DNS servers.
///
/// One backend is picked at construction; every call runs
/// validate -> check privilege -> backend, and nothing on the host is
/// touched unless the first two succeed.
///
/// # Concurrency
///
/// No lock is held over the OS resolver configuration. Two calls that
/// touch the same backup name or the same host at once race; callers that
/// may run concurrently (even across processes) must serialize their
/// DNS-changing calls themselves.
///
/// # Example
///
/// ```rust,ignore
/// use dns_changer::{DnsChanger, RestoreOptions, SetOptions};
///
/// let changer = DnsChanger::for_current_platform()?;
/// let report = changer
///     .set_servers("1.1.1.1 1.0.0.1", &SetOptions::default())
///     .await?;
/// assert!(report.is_success());
/// // ...
/// changer.restore_servers(&RestoreOptions::default()).await?;
/// ```
pub struct DnsChanger {
    backend: Box<dyn PlatformBackend>,
    gate: Box<dyn PrivilegeGate>,
}

impl DnsChanger {
    /// Builds an engine around an explicit backend and privilege gate.
    #[must_use]
    pub fn new(
        backend: impl PlatformBackend + 'static,
        gate: impl PrivilegeGate + 'static,
    ) -> Self {
        Self {
            backend: Box::new(backend),
            gate: Box::new(gate),
        }
    }

    /// Builds the default backend for `platform`, running commands through
    /// `runner`.
    #[must_use]
    pub fn for_platform(platform: Platform, runner: Arc<dyn CommandRunner>) -> Self {
        let backend: Box<dyn PlatformBackend> = match platform {
            Platform::Linux => Box::new(LinuxBackend::new(Arc::clone(&runner))),
            Platform::MacOs => Box::new(MacBackend::new(Arc::clone(&runner))),
            Platform::Windows => Box::new(WindowsBackend::new(Arc::clone(&runner))),
        };
        Self {
            backend,
            gate: Box::new(SystemPrivilege::new(runner)),
        }
    }

    /// Builds the engine for the running OS with real commands.
    ///
    /// # Errors
    ///
    /// Returns [`DnsError::UnsupportedPlatform`] on any OS other than
    /// Linux, macOS and Windows.
    pub fn for_current_platform() -> Result<Self> {
        Ok(Self::for_platform(Platform::current()?, Arc::new(SystemRunner)))
    }

    /// The platform this engine targets.
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.backend.platform()
    }

    /// Backs up the current resolver state (if asked to) and applies
    /// `servers`.
    ///
    /// # Errors
    ///
    /// Validation and privilege errors are returned before anything is
    /// changed. On Linux any write failure is returned as an error. On
    /// macOS and Windows interface failures are collected in the report
    /// instead; only enumeration and backup failures are errors.
    pub async fn set_servers(
        &self,
        servers: impl Into<ServerInput>,
        opts: &SetOptions,
    ) -> Result<ChangeReport> {
        let platform = self.platform();
        let span = tracing::info_span!("set_servers", %platform, backup = %opts.backup_name);
        let input: ServerInput = servers.into();

        async move {
            enter(opts.logging, Phase::Validating);
            let servers = ServerList::parse(input)?;
            self.ensure_privilege(opts.logging).await?;

            enter(opts.logging, Phase::Applying);
            step!(opts.logging, %servers, "Setting DNS servers");
            let report = self.backend.apply_servers(&servers, opts).await?;

            enter(opts.logging, Phase::Done);
            Ok(ChangeReport::new(platform, Transition::Apply(servers), report))
        }
        .instrument(span)
        .await
    }

    /// Restores the state captured under `opts.backup_name`.
    ///
    /// # Errors
    ///
    /// Returns [`DnsError::BackupNotFound`] without changing anything if the
    /// backup does not exist (Linux, and macOS unless `use_dhcp` is set).
    /// Privilege and write errors are returned as for
    /// [`set_servers`](Self::set_servers).
    pub async fn restore_servers(&self, opts: &RestoreOptions) -> Result<ChangeReport> {
        let platform = self.platform();
        let span = tracing::info_span!("restore_servers", %platform, backup = %opts.backup_name);

        async move {
            enter(opts.logging, Phase::Validating);
            self.ensure_privilege(opts.logging).await?;

            enter(opts.logging, Phase::Restoring);
            let report = self.backend.restore_servers(opts).await?;

            enter(opts.logging, Phase::Done);
            Ok(ChangeReport::new(platform, Transition::Restore, report))
        }
        .instrument(span)
        .await
    }

    /// Awaits the privilege gate to completion before any mutation.
    async fn ensure_privilege(&self, logging: bool) -> Result<()> {
        if !self.backend.requires_privilege() {
            return Ok(());
        }
        enter(logging, Phase::CheckingPrivilege);

        let required = match self.platform() {
            Platform::Windows => "administrator rights are required to change DNS settings",
            _ => "must run as root to change DNS settings",
        };
        match self.gate.is_elevated().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(DnsError::InsufficientPrivilege(required.to_string())),
            Err(e) => Err(DnsError::InsufficientPrivilege(format!(
                "{required} (privilege check failed: {e})"
            ))),
        }
    }
}

impl fmt::Debug for DnsChanger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsChanger")
            .field("platform", &self.platform())
            .finish_non_exhaustive()
    }
}

fn enter(logging: bool, phase: Phase) {
    if logging {
        tracing::debug!(%phase, "Entering phase");
    }
}

/// Sets the DNS servers on the running OS.
///
/// Returns `Ok(true)` on full success and `Ok(false)` for handled failures:
/// an unsupported OS, or some interfaces failing. Everything else is an
/// `Err`, so callers must handle both channels.
///
/// # Errors
///
/// See [`DnsChanger::set_servers`].
pub async fn set_servers(servers: impl Into<ServerInput>, opts: &SetOptions) -> Result<bool> {
    let Some(changer) = current_or_unsupported(opts.logging)? else {
        return Ok(false);
    };
    Ok(changer.set_servers(servers, opts).await?.is_success())
}

/// Restores the DNS servers on the running OS.
///
/// Same return contract as [`set_servers`].
///
/// # Errors
///
/// See [`DnsChanger::restore_servers`].
pub async fn restore_servers(opts: &RestoreOptions) -> Result<bool> {
    let Some(changer) = current_or_unsupported(opts.logging)? else {
        return Ok(false);
    };
    Ok(changer.restore_servers(opts).await?.is_success())
}

fn current_or_unsupported(logging: bool) -> Result<Option<DnsChanger>> {
    match DnsChanger::for_current_platform() {
        Ok(changer) => Ok(Some(changer)),
        Err(DnsError::UnsupportedPlatform { os }) => {
            step_warn!(logging, %os, "Unsupported platform");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
