//! Per-call options and environment configuration.

use crate::error::{DnsError, Result};
use crate::servers::BackupName;

/// Prefix of every environment variable read by [`EnvConfig`].
pub const ENV_PREFIX: &str = "DNS_CHANGER_";

/// What to do when a backup with the requested name already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackupPolicy {
    /// Leave the existing backup alone. Repeated `set_servers` calls keep
    /// the state captured before the first one.
    ///
    /// This includes a backup left behind by an earlier session that
    /// restored without `remove_backup`: it is reused as is, and a later
    /// restore brings back that older state.
    #[default]
    KeepExisting,
    /// Replace the existing backup with the current state.
    Overwrite,
}

impl BackupPolicy {
    /// Parses `keep`/`keep-existing` or `overwrite`.
    ///
    /// # Errors
    ///
    /// Returns [`DnsError::InvalidFlagType`] for anything else.
    pub fn parse(flag: &str, value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keep" | "keep-existing" | "keep_existing" => Ok(Self::KeepExisting),
            "overwrite" => Ok(Self::Overwrite),
            _ => Err(DnsError::InvalidFlagType {
                flag: flag.to_string(),
                value: value.to_string(),
            }),
        }
    }
}

/// Options for [`DnsChanger::set_servers`](crate::DnsChanger::set_servers).
///
/// With the defaults, a backup that already exists under `backup_name` is
/// kept, even one from a previous session. Pair them with
/// [`RestoreOptions::with_remove_backup`] so each restore consumes its
/// backup, or use [`BackupPolicy::Overwrite`] to always capture the live
/// state.
///
/// # Example
///
/// ```
/// use dns_changer::{BackupPolicy, SetOptions};
///
/// let opts = SetOptions::default()
///     .with_logging(true)
///     .with_backup_policy(BackupPolicy::Overwrite);
///
/// assert_eq!(opts.backup_name.as_str(), "before-dns-changer");
/// assert!(opts.make_backup);
/// assert!(opts.logging);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOptions {
    /// Backup slot to capture the current state into.
    pub backup_name: BackupName,
    /// Narrate every step through `tracing` at info level.
    pub logging: bool,
    /// Capture the current state before changing it.
    pub make_backup: bool,
    /// Behavior when the backup slot is already taken.
    pub backup_policy: BackupPolicy,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            backup_name: BackupName::default(),
            logging: false,
            make_backup: true,
            backup_policy: BackupPolicy::default(),
        }
    }
}

impl SetOptions {
    /// Overrides the backup name.
    #[must_use]
    pub fn with_backup_name(mut self, name: BackupName) -> Self {
        self.backup_name = name;
        self
    }

    /// Enables or disables step logging.
    #[must_use]
    pub const fn with_logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    /// Enables or disables the backup step.
    #[must_use]
    pub const fn with_make_backup(mut self, make_backup: bool) -> Self {
        self.make_backup = make_backup;
        self
    }

    /// Overrides the backup policy.
    #[must_use]
    pub const fn with_backup_policy(mut self, policy: BackupPolicy) -> Self {
        self.backup_policy = policy;
        self
    }
}

/// Options for [`DnsChanger::restore_servers`](crate::DnsChanger::restore_servers).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Backup slot to restore from.
    pub backup_name: BackupName,
    /// Narrate every step through `tracing` at info level.
    pub logging: bool,
    /// Delete the backup once it has been restored.
    pub remove_backup: bool,
    /// macOS only: revert every interface to DHCP instead of reading a backup.
    pub use_dhcp: bool,
}

impl RestoreOptions {
    /// Overrides the backup name.
    #[must_use]
    pub fn with_backup_name(mut self, name: BackupName) -> Self {
        self.backup_name = name;
        self
    }

    /// Enables or disables step logging.
    #[must_use]
    pub const fn with_logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    /// Enables or disables backup removal after restore.
    #[must_use]
    pub const fn with_remove_backup(mut self, remove_backup: bool) -> Self {
        self.remove_backup = remove_backup;
        self
    }

    /// Enables or disables the macOS DHCP path.
    #[must_use]
    pub const fn with_dhcp(mut self, use_dhcp: bool) -> Self {
        self.use_dhcp = use_dhcp;
        self
    }
}

/// Options loaded from `DNS_CHANGER_*` environment variables.
///
/// | Variable | Meaning |
/// |---|---|
/// | `DNS_CHANGER_BACKUP_NAME` | backup slot |
/// | `DNS_CHANGER_LOGGING` | step logging |
/// | `DNS_CHANGER_MAKE_BACKUP` | capture before set |
/// | `DNS_CHANGER_REMOVE_BACKUP` | delete after restore |
/// | `DNS_CHANGER_USE_DHCP` | macOS DHCP restore |
/// | `DNS_CHANGER_BACKUP_POLICY` | `keep` or `overwrite` |
///
/// Unset variables keep their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvConfig {
    /// Options for setting servers.
    pub set: SetOptions,
    /// Options for restoring servers.
    pub restore: RestoreOptions,
}

impl EnvConfig {
    /// Reads the process environment.
    ///
    /// # Errors
    ///
    /// See [`from_lookup`](Self::from_lookup).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads options through `lookup`, which maps a full variable name to
    /// its value.
    ///
    /// # Errors
    ///
    /// Returns [`DnsError::InvalidFlagType`] if a boolean variable holds a
    /// non-boolean value, or [`DnsError::InvalidBackupName`] for a bad name.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();
        let var = |suffix: &str| {
            let key = format!("{ENV_PREFIX}{suffix}");
            lookup(&key).map(|value| (key, value))
        };

        if let Some((_, name)) = var("BACKUP_NAME") {
            let name = BackupName::new(name)?;
            cfg.set.backup_name = name.clone();
            cfg.restore.backup_name = name;
        }
        if let Some((key, value)) = var("LOGGING") {
            let logging = parse_flag(&key, &value)?;
            cfg.set.logging = logging;
            cfg.restore.logging = logging;
        }
        if let Some((key, value)) = var("MAKE_BACKUP") {
            cfg.set.make_backup = parse_flag(&key, &value)?;
        }
        if let Some((key, value)) = var("REMOVE_BACKUP") {
            cfg.restore.remove_backup = parse_flag(&key, &value)?;
        }
        if let Some((key, value)) = var("USE_DHCP") {
            cfg.restore.use_dhcp = parse_flag(&key, &value)?;
        }
        if let Some((key, value)) = var("BACKUP_POLICY") {
            cfg.set.backup_policy = BackupPolicy::parse(&key, &value)?;
        }
        Ok(cfg)
    }
}

/// Parses a boolean flag value.
///
/// Accepts `true/false`, `1/0`, `yes/no` and `on/off`, case-insensitively.
///
/// # Errors
///
/// Returns [`DnsError::InvalidFlagType`] naming `flag` for anything else.
pub fn parse_flag(flag: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(DnsError::InvalidFlagType {
            flag: flag.to_string(),
            value: value.to_string(),
        }),
    }
}
