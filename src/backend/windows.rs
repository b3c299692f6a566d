//! Per-adapter DNS settings through `netsh` or PowerShell.
//!
//! Windows keeps no backup artifact: restoring always hands every adapter
//! back to DHCP-assigned DNS.

use super::{
    BackendReport, Platform, PlatformBackend, accept_any_output, fan_out, run_for_interface,
};
use crate::config::{RestoreOptions, SetOptions};
use crate::error::Result;
use crate::interfaces::{InterfaceDescriptor, windows_interfaces};
use crate::process::{CommandRunner, Invocation};
use crate::servers::ServerList;
use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

/// A Windows kernel release, e.g. `10.0.19045`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WindowsRelease {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
}

impl WindowsRelease {
    /// Creates a release.
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parses `10.0.19045` or `cmd /C ver` output such as
    /// `Microsoft Windows [Version 10.0.19045.3803]`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let version = text
            .split(|c: char| !(c.is_ascii_digit() || c == '.'))
            .find(|token| token.contains('.'))?;
        let mut parts = version.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        Some(Self { major, minor })
    }
}

impl fmt::Display for WindowsRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Which native tool configures adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetConfigTool {
    /// `netsh interface ...`, for Windows 7 / Server 2008 R2 and older.
    Netsh,
    /// `Set-DnsClientServerAddress`, for Windows 8 and newer.
    PowerShell,
}

impl NetConfigTool {
    /// Picks the tool for `release`. Releases up to 6.1 use `netsh`.
    #[must_use]
    pub const fn for_release(release: WindowsRelease) -> Self {
        if release.major < 6 || (release.major == 6 && release.minor <= 1) {
            Self::Netsh
        } else {
            Self::PowerShell
        }
    }

    /// Commands that make `alias` use `servers`, run in order.
    #[must_use]
    pub fn apply_commands(self, alias: &str, servers: &ServerList) -> Vec<Invocation> {
        match self {
            Self::Netsh => vec![
                netsh(servers.primary())
                    .args(["set", "dnsservers"])
                    .arg(alias)
                    .arg("static")
                    .arg(servers.primary().to_string())
                    .arg("primary"),
                netsh(servers.secondary())
                    .args(["add", "dnsservers"])
                    .arg(alias)
                    .arg(servers.secondary().to_string())
                    .arg("index=2"),
            ],
            Self::PowerShell => vec![powershell(&format!(
                "Set-DnsClientServerAddress -InterfaceAlias {} -ServerAddresses ({},{})",
                ps_quote(alias),
                ps_quote(&servers.primary().to_string()),
                ps_quote(&servers.secondary().to_string()),
            ))],
        }
    }

    /// Commands that hand `alias` back to DHCP-assigned DNS.
    #[must_use]
    pub fn reset_commands(self, alias: &str) -> Vec<Invocation> {
        match self {
            // Apply may have put a server in either context.
            Self::Netsh => ["ipv4", "ipv6"]
                .into_iter()
                .map(|family| {
                    Invocation::new("netsh")
                        .args(["interface", family, "set", "dnsservers"])
                        .arg(alias)
                        .arg("dhcp")
                })
                .collect(),
            Self::PowerShell => vec![powershell(&format!(
                "Set-DnsClientServerAddress -InterfaceAlias {} -ResetServerAddresses",
                ps_quote(alias)
            ))],
        }
    }
}

/// `ipconfig /flushdns`.
#[must_use]
pub fn flush_dns() -> Invocation {
    Invocation::new("ipconfig").arg("/flushdns")
}

/// `cmd /C ver`.
#[must_use]
pub fn windows_version() -> Invocation {
    Invocation::new("cmd").args(["/C", "ver"])
}

fn netsh(addr: IpAddr) -> Invocation {
    let family = if addr.is_ipv6() { "ipv6" } else { "ipv4" };
    Invocation::new("netsh").args(["interface", family])
}

fn powershell(script: &str) -> Invocation {
    Invocation::new("powershell").args(["-NoProfile", "-NonInteractive", "-Command", script])
}

fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Sets DNS servers on every adapter.
///
/// The tool is chosen from the kernel release, detected once per call
/// unless pinned with [`with_release`](Self::with_release).
pub struct WindowsBackend {
    runner: Arc<dyn CommandRunner>,
    release: Option<WindowsRelease>,
}

impl WindowsBackend {
    /// Creates a backend that detects the release at call time.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            release: None,
        }
    }

    /// Pins the release instead of detecting it.
    #[must_use]
    pub const fn with_release(mut self, release: WindowsRelease) -> Self {
        self.release = Some(release);
        self
    }

    /// Resolves the tool to use, falling back to PowerShell when the
    /// release cannot be read.
    pub async fn tool(&self) -> NetConfigTool {
        if let Some(release) = self.release {
            return NetConfigTool::for_release(release);
        }
        let inv = windows_version();
        match self.runner.run(&inv).await {
            Ok(out) => match WindowsRelease::parse(&out.stdout) {
                Some(release) => {
                    tracing::debug!(%release, "Detected Windows release");
                    NetConfigTool::for_release(release)
                }
                None => {
                    tracing::warn!(output = %out.stdout.trim(), "Unrecognised Windows version");
                    NetConfigTool::PowerShell
                }
            },
            Err(e) => {
                tracing::warn!(command = %inv, error = %e, "Could not read Windows version");
                NetConfigTool::PowerShell
            }
        }
    }

    async fn for_each_adapter(
        &self,
        logging: bool,
        commands: impl Fn(&str) -> Vec<Invocation> + Sync,
    ) -> Result<BackendReport> {
        let interfaces = windows_interfaces(self.runner.as_ref()).await?;
        step!(logging, count = interfaces.len(), "Enumerated interfaces");
        let runner = self.runner.as_ref();
        let commands = &commands;

        let report = fan_out(interfaces, logging, |iface: InterfaceDescriptor| async move {
            step!(logging, interface = %iface, "Setting ethernet interface");
            let invocations = commands(&iface.name);
            run_for_interface(runner, &iface, invocations, accept_any_output).await
        })
        .await;

        step!(logging, "Flushing DNS cache");
        let flush = flush_dns();
        match self.runner.run(&flush).await {
            Ok(out) if out.success() => {}
            Ok(out) => step_warn!(logging, command = %flush, code = ?out.code, "Cache flush failed"),
            Err(e) => step_warn!(logging, command = %flush, error = %e, "Cache flush failed"),
        }
        Ok(report)
    }
}

impl fmt::Debug for WindowsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowsBackend")
            .field("release", &self.release)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PlatformBackend for WindowsBackend {
    fn platform(&self) -> Platform {
        Platform::Windows
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
            step!(
                opts.logging,
                "No backup written on Windows; restore reverts adapters to DHCP"
            );
        }
        let tool = self.tool().await;
        self.for_each_adapter(opts.logging, |alias| tool.apply_commands(alias, servers))
            .await
    }

    async fn restore_servers(&self, opts: &RestoreOptions) -> Result<BackendReport> {
        let tool = self.tool().await;
        self.for_each_adapter(opts.logging, |alias| tool.reset_commands(alias))
            .await
    }
}
