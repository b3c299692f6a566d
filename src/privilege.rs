//! Privilege checks performed before any mutation.

use crate::process::{CommandRunner, Invocation, SystemRunner};
use async_trait::async_trait;
use std::io;
use std::sync::Arc;

/// Answers whether the process may change system network configuration.
#[async_trait]
pub trait PrivilegeGate: Send + Sync {
    /// Returns `true` if the process is elevated.
    async fn is_elevated(&self) -> io::Result<bool>;
}

/// A fixed answer, for tests and for callers that checked elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticPrivilege(pub bool);

#[async_trait]
impl PrivilegeGate for StaticPrivilege {
    async fn is_elevated(&self) -> io::Result<bool> {
        Ok(self.0)
    }
}

/// Asks the running OS.
///
/// Unix: effective uid is 0. Windows: `net session` only succeeds for
/// administrators. Anything else is never elevated.
#[derive(Clone)]
pub struct SystemPrivilege {
    runner: Arc<dyn CommandRunner>,
}

impl SystemPrivilege {
    /// Creates a gate that uses `runner` for the Windows check.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

impl Default for SystemPrivilege {
    fn default() -> Self {
        Self::new(Arc::new(SystemRunner))
    }
}

impl std::fmt::Debug for SystemPrivilege {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemPrivilege").finish_non_exhaustive()
    }
}

#[async_trait]
impl PrivilegeGate for SystemPrivilege {
    async fn is_elevated(&self) -> io::Result<bool> {
        if cfg!(windows) {
            let out = self
                .runner
                .run(&Invocation::new("net").arg("session"))
                .await?;
            return Ok(out.success());
        }
        Ok(effective_uid_is_root())
    }
}

/// Returns `true` if the effective user is the superuser.
#[cfg(unix)]
#[must_use]
pub fn effective_uid_is_root() -> bool {
    // SAFETY: `geteuid` has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Returns `true` if the effective user is the superuser.
#[cfg(not(unix))]
#[must_use]
pub const fn effective_uid_is_root() -> bool {
    false
}
