//! Network interface enumeration for the per-interface backends.

use crate::error::Result;
use crate::process::{CommandRunner, Invocation, run_checked};
use std::fmt;

/// macOS services that cannot carry their own DNS settings.
pub const MAC_IGNORED_INTERFACES: &[&str] =
    &["iPhone USB", "Bluetooth PAN", "Thunderbolt Bridge", "lo0", ""];

/// A network service (macOS) or adapter alias (Windows).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceDescriptor {
    /// Name as the platform tools expect it.
    pub name: String,
}

impl InterfaceDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for InterfaceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// `networksetup -listallnetworkservices`.
#[must_use]
pub fn mac_list_services() -> Invocation {
    Invocation::new("networksetup").arg("-listallnetworkservices")
}

/// `netsh interface show interface`.
#[must_use]
pub fn windows_list_interfaces() -> Invocation {
    Invocation::new("netsh").args(["interface", "show", "interface"])
}

/// Parses `networksetup -listallnetworkservices` output.
///
/// The first line is a legend, not a service. A leading `*` marks a
/// disabled service and is stripped. Every returned name is unfiltered;
/// see [`is_mac_ignored`].
#[must_use]
pub fn parse_mac_services(output: &str) -> Vec<InterfaceDescriptor> {
    output
        .lines()
        .skip(1)
        .map(|line| line.trim_start_matches('*').trim())
        .map(InterfaceDescriptor::new)
        .collect()
}

/// Returns `true` for services on the macOS ignore list.
#[must_use]
pub fn is_mac_ignored(name: &str) -> bool {
    MAC_IGNORED_INTERFACES.contains(&name.trim())
}

/// Parses the `netsh interface show interface` table.
///
/// ```text
/// Admin State    State          Type             Interface Name
/// -------------------------------------------------------------------------
/// Enabled        Connected      Dedicated        Ethernet 2
/// ```
///
/// The name is the fourth column and may contain spaces.
#[must_use]
pub fn parse_netsh_interfaces(output: &str) -> Vec<InterfaceDescriptor> {
    output
        .lines()
        .skip_while(|line| !line.trim_start().starts_with('-'))
        .skip(1)
        .filter_map(|line| {
            let mut rest = line.trim();
            for _ in 0..3 {
                let end = rest.find(char::is_whitespace)?;
                rest = rest[end..].trim_start();
            }
            (!rest.is_empty()).then(|| InterfaceDescriptor::new(rest))
        })
        .collect()
}

/// Lists the macOS services that should receive DNS settings.
///
/// # Errors
///
/// Returns [`DnsError::CommandExecutionFailed`](crate::DnsError::CommandExecutionFailed)
/// if `networksetup` cannot be run.
pub async fn mac_interfaces(runner: &dyn CommandRunner) -> Result<Vec<InterfaceDescriptor>> {
    let out = run_checked(runner, &mac_list_services()).await?;
    let all = parse_mac_services(&out.stdout);
    for ignored in all.iter().filter(|i| is_mac_ignored(&i.name)) {
        tracing::debug!(interface = %ignored, "Ignoring interface");
    }
    Ok(all.into_iter().filter(|i| !is_mac_ignored(&i.name)).collect())
}

/// Lists the Windows adapters that should receive DNS settings.
///
/// # Errors
///
/// Returns [`DnsError::CommandExecutionFailed`](crate::DnsError::CommandExecutionFailed)
/// if `netsh` cannot be run.
pub async fn windows_interfaces(runner: &dyn CommandRunner) -> Result<Vec<InterfaceDescriptor>> {
    let out = run_checked(runner, &windows_list_interfaces()).await?;
    Ok(parse_netsh_interfaces(&out.stdout))
}
