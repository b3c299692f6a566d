//! Server list and backup name validation.
//!
//! Everything here is pure: inputs are checked and normalized before any
//! backend sees them, on every platform.

use crate::error::{DnsError, Result};
use std::fmt;
use std::net::IpAddr;

/// Backup name used when the caller does not pick one.
pub const DEFAULT_BACKUP_NAME: &str = "before-dns-changer";

/// Raw server input as supplied by a caller.
///
/// Either a sequence of address strings or one space-delimited string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerInput {
    /// Already split, e.g. `["8.8.8.8", "8.8.4.4"]`.
    List(Vec<String>),
    /// Space-delimited, e.g. `"8.8.8.8 8.8.4.4"`.
    Line(String),
}

impl From<&str> for ServerInput {
    fn from(s: &str) -> Self {
        Self::Line(s.to_string())
    }
}

impl From<String> for ServerInput {
    fn from(s: String) -> Self {
        Self::Line(s)
    }
}

impl From<Vec<String>> for ServerInput {
    fn from(v: Vec<String>) -> Self {
        Self::List(v)
    }
}

impl From<&[&str]> for ServerInput {
    fn from(v: &[&str]) -> Self {
        Self::List(v.iter().map(ToString::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ServerInput {
    fn from(v: [&str; N]) -> Self {
        Self::List(v.iter().map(ToString::to_string).collect())
    }
}

/// A validated primary/secondary DNS server pair.
///
/// Order is significant: index 0 is the primary, index 1 the secondary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerList {
    servers: [IpAddr; 2],
}

impl ServerList {
    /// Builds a list from two already-parsed addresses.
    #[must_use]
    pub const fn new(primary: IpAddr, secondary: IpAddr) -> Self {
        Self {
            servers: [primary, secondary],
        }
    }

    /// Validates and normalizes caller input.
    ///
    /// # Errors
    ///
    /// Returns [`DnsError::InvalidServerFormat`] if the input does not hold
    /// exactly two entries (including a single string without a space), or
    /// [`DnsError::InvalidAddress`] naming the first entry that is not an
    /// IPv4 or IPv6 literal.
    pub fn parse(input: impl Into<ServerInput>) -> Result<Self> {
        let entries: Vec<String> = match input.into() {
            ServerInput::List(list) => list.into_iter().map(|s| s.trim().to_string()).collect(),
            ServerInput::Line(line) => {
                if !line.trim().contains(' ') {
                    return Err(DnsError::InvalidServerFormat(format!(
                        "{line:?} must hold two space-separated addresses"
                    )));
                }
                line.split_whitespace().map(ToString::to_string).collect()
            }
        };

        if entries.len() != 2 {
            return Err(DnsError::InvalidServerFormat(format!(
                "expected 2 servers, got {}",
                entries.len()
            )));
        }

        let primary = parse_address(&entries[0])?;
        let secondary = parse_address(&entries[1])?;
        Ok(Self::new(primary, secondary))
    }

    /// The primary server.
    #[must_use]
    pub const fn primary(&self) -> IpAddr {
        self.servers[0]
    }

    /// The secondary server.
    #[must_use]
    pub const fn secondary(&self) -> IpAddr {
        self.servers[1]
    }

    /// Both servers in order.
    #[must_use]
    pub const fn as_slice(&self) -> &[IpAddr] {
        &self.servers
    }

    /// Both servers rendered as strings, in order.
    #[must_use]
    pub fn to_strings(&self) -> Vec<String> {
        self.servers.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for ServerList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.servers[0], self.servers[1])
    }
}

fn parse_address(value: &str) -> Result<IpAddr> {
    value.parse().map_err(|_| DnsError::InvalidAddress {
        value: value.to_string(),
    })
}

/// Name of a backup slot.
///
/// Spliced into a file path on Linux and macOS, so it must be a single,
/// non-empty path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackupName(String);

impl BackupName {
    /// Validates a backup name.
    ///
    /// # Errors
    ///
    /// Returns [`DnsError::InvalidBackupName`] for empty names, names with
    /// path separators or NUL bytes, and `.`/`..`.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let bad = name.trim().is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0']);
        if bad {
            return Err(DnsError::InvalidBackupName(name));
        }
        Ok(Self(name))
    }

    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BackupName {
    fn default() -> Self {
        Self(DEFAULT_BACKUP_NAME.to_string())
    }
}

impl fmt::Display for BackupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_delimited_string_normalizes() {
        let list = ServerList::parse("8.8.8.8 8.8.4.4").unwrap();
        assert_eq!(list.to_strings(), vec!["8.8.8.8", "8.8.4.4"]);
    }

    #[test]
    fn comma_delimited_string_is_rejected() {
        let err = ServerList::parse("8.8.8.8,8.8.4.4").unwrap_err();
        assert!(matches!(err, DnsError::InvalidServerFormat(_)));
    }

    #[test]
    fn list_input_keeps_order() {
        let list = ServerList::parse(["1.1.1.1", "2001:db8::1"]).unwrap();
        assert_eq!(list.primary().to_string(), "1.1.1.1");
        assert_eq!(list.secondary().to_string(), "2001:db8::1");
    }

    #[test]
    fn out_of_range_octet_is_invalid_address() {
        let err = ServerList::parse(["999.1.1.1", "8.8.8.8"]).unwrap_err();
        match err {
            DnsError::InvalidAddress { value } => assert_eq!(value, "999.1.1.1"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn wrong_arity_is_rejected() {
        assert!(matches!(
            ServerList::parse(["8.8.8.8"]).unwrap_err(),
            DnsError::InvalidServerFormat(_)
        ));
        assert!(matches!(
            ServerList::parse("1.1.1.1 8.8.8.8 9.9.9.9").unwrap_err(),
            DnsError::InvalidServerFormat(_)
        ));
    }

    #[test]
    fn hostnames_are_not_addresses() {
        let err = ServerList::parse("dns.google 8.8.4.4").unwrap_err();
        assert!(matches!(err, DnsError::InvalidAddress { .. }));
    }

    #[test]
    fn backup_name_rules() {
        assert_eq!(BackupName::default().as_str(), DEFAULT_BACKUP_NAME);
        assert!(BackupName::new("vpn-session").is_ok());
        for bad in ["", "  ", ".", "..", "a/b", "a\\b"] {
            assert!(
                matches!(BackupName::new(bad), Err(DnsError::InvalidBackupName(_))),
                "{bad:?} should be rejected"
            );
        }
    }
}
