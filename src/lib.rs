//! # dns-changer
//!
//! Replace the host's DNS servers with a primary/secondary pair and later
//! put the previous configuration back, on Linux, macOS and Windows.
//!
//! | Platform | Mechanism | Backup |
//! |---|---|---|
//! | Linux | rewrites `/etc/resolv.conf`, `chattr +i` | `/etc/resolv.conf.<name>` (verbatim) |
//! | macOS | `networksetup -setdnsservers` per service | `/Library/Caches/<name>.txt` |
//! | Windows | `netsh` (<= 6.1) or `Set-DnsClientServerAddress` per adapter | none, restore means DHCP |
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use dns_changer::{RestoreOptions, SetOptions};
//!
//! // Requires root (Linux) or administrator (Windows).
//! dns_changer::set_servers("1.1.1.1 1.0.0.1", &SetOptions::default()).await?;
//!
//! // ...
//!
//! dns_changer::restore_servers(&RestoreOptions::default().with_remove_backup(true)).await?;
//! ```
//!
//! The free functions return `Ok(false)` for handled failures (unsupported
//! OS, some interfaces failed). [`DnsChanger`] returns a [`ChangeReport`]
//! naming every failed interface instead.
//!
//! ## Backups
//!
//! By default an existing backup is kept, so calling `set_servers` twice
//! still restores the state from before the first call. Use
//! [`BackupPolicy::Overwrite`] to always capture the latest state.
//!
//! The default restore keeps its backup too. A backup left over from an
//! earlier session is then reused by the next `set_servers`, and restoring
//! brings back that stale state. Restore with `with_remove_backup(true)`
//! unless the backup is meant to outlive the call.
//!
//! ## Concurrency
//!
//! Nothing here locks the OS resolver configuration. Callers that may run
//! concurrently, in one process or several, must serialize their calls.
//!
//! ## Testing without touching the host
//!
//! Every backend runs native tools through a [`CommandRunner`].
//! [`ScriptedRunner`] answers from a closure and records each call, and
//! the file paths can be pointed at a temporary directory.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

/// Step narration: info when the call asked for logging, debug otherwise.
macro_rules! step {
    ($logging:expr, $($arg:tt)+) => {
        if $logging {
            ::tracing::info!($($arg)+);
        } else {
            ::tracing::debug!($($arg)+);
        }
    };
}

/// Like `step!`, for failures that do not abort the call.
macro_rules! step_warn {
    ($logging:expr, $($arg:tt)+) => {
        if $logging {
            ::tracing::warn!($($arg)+);
        } else {
            ::tracing::debug!($($arg)+);
        }
    };
}

pub mod backend;
pub mod backup;
pub mod config;
pub mod engine;
pub mod error;
pub mod interfaces;
pub mod privilege;
pub mod process;
pub mod servers;

pub use backend::{
    BackendReport, InterfaceFailure, LinuxBackend, MacBackend, NetConfigTool, Platform,
    PlatformBackend, WindowsBackend, WindowsRelease,
};
pub use backup::{BackupRecord, BackupStore, FileBackupStore};
pub use config::{BackupPolicy, EnvConfig, RestoreOptions, SetOptions};
pub use engine::{ChangeReport, DnsChanger, Transition, restore_servers, set_servers};
pub use error::{DnsError, Result};
pub use interfaces::InterfaceDescriptor;
pub use privilege::{PrivilegeGate, StaticPrivilege, SystemPrivilege};
pub use process::{CommandOutput, CommandRunner, Invocation, ScriptedRunner, SystemRunner};
pub use servers::{BackupName, DEFAULT_BACKUP_NAME, ServerInput, ServerList};

/// Crate version.
#[must_use]
pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
