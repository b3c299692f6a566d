//! Error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for DNS changer operations.
pub type Result<T> = std::result::Result<T, DnsError>;

/// Errors returned by DNS changer operations.
///
/// Validation and privilege errors are always raised before anything on the
/// host is touched. The remaining variants come from the mutation phase.
#[derive(Debug, Error)]
pub enum DnsError {
    /// The server list could not be read as exactly two addresses.
    #[error("invalid server list: {0}")]
    InvalidServerFormat(String),

    /// One server entry is not an IPv4 or IPv6 literal.
    #[error("invalid DNS server address: {value:?}")]
    InvalidAddress {
        /// The offending entry.
        value: String,
    },

    /// A flag value is not a boolean.
    #[error("flag {flag} must be a boolean, got {value:?}")]
    InvalidFlagType {
        /// Name of the flag (or environment variable).
        flag: String,
        /// The rejected raw value.
        value: String,
    },

    /// The backup name is empty or cannot be used as a file name.
    #[error("invalid backup name: {0:?}")]
    InvalidBackupName(String),

    /// The process lacks root (Linux) or administrator (Windows) rights.
    #[error("insufficient privilege: {0}")]
    InsufficientPrivilege(String),

    /// Capturing the pre-change resolver state failed.
    #[error("failed to write backup {}: {source}", path.display())]
    BackupWriteFailed {
        /// Backup location.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// No backup exists under the requested name.
    #[error("no DNS backup named {name:?}")]
    BackupNotFound {
        /// The requested backup name.
        name: String,
    },

    /// Removing a consumed backup failed.
    #[error("failed to remove backup {}: {source}", path.display())]
    BackupRemoveFailed {
        /// Backup location.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Reading the current resolver configuration failed.
    #[error("failed to read resolver config {}: {source}", path.display())]
    ConfigReadFailed {
        /// Resolver file location.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Writing the resolver configuration failed.
    #[error("failed to write resolver config {}: {source}", path.display())]
    ConfigWriteFailed {
        /// Resolver file location.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The resolver file could not be made writable.
    #[error("permission denied on {}: {detail}", path.display())]
    PermissionDenied {
        /// Resolver file location.
        path: PathBuf,
        /// What the OS reported.
        detail: String,
    },

    /// A native command could not be run or reported failure.
    #[error("command `{command}` failed: {detail}")]
    CommandExecutionFailed {
        /// The command line that was run.
        command: String,
        /// Exit status and output, or the spawn error.
        detail: String,
    },

    /// The running OS has no backend.
    #[error("unsupported platform: {os}")]
    UnsupportedPlatform {
        /// `std::env::consts::OS` of the running process.
        os: String,
    },

    /// Filesystem I/O failed outside the steps above.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DnsError {
    /// Returns `true` if the underlying cause is a denied permission.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::PermissionDenied { .. } | Self::InsufficientPrivilege(_) => true,
            Self::Io(e)
            | Self::BackupWriteFailed { source: e, .. }
            | Self::BackupRemoveFailed { source: e, .. }
            | Self::ConfigReadFailed { source: e, .. }
            | Self::ConfigWriteFailed { source: e, .. } => {
                e.kind() == std::io::ErrorKind::PermissionDenied
            }
            _ => false,
        }
    }

    /// Returns `true` for input errors raised before any side effect.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidServerFormat(_)
                | Self::InvalidAddress { .. }
                | Self::InvalidFlagType { .. }
                | Self::InvalidBackupName(_)
        )
    }

    /// Returns `true` if the requested backup does not exist.
    #[must_use]
    pub const fn is_backup_not_found(&self) -> bool {
        matches!(self, Self::BackupNotFound { .. })
    }
}
