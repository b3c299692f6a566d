//! Integration tests for `dns-changer`.
//!
//! Everything runs against temporary directories and a [`ScriptedRunner`],
//! so no test touches the host's DNS settings. Tests marked `#[ignore]`
//! change the real configuration and require root:
//!
//! ```bash
//! sudo cargo test -- --ignored
//! ```

use dns_changer::{
    BackupName, BackupPolicy, CommandOutput, DnsChanger, DnsError, LinuxBackend, MacBackend,
    RestoreOptions, ScriptedRunner, SetOptions, StaticPrivilege, WindowsBackend, WindowsRelease,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const ORIGINAL: &str = "# Generated by NetworkManager\nsearch lan\nnameserver 192.168.1.1\n";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct LinuxHost {
    _dir: tempfile::TempDir,
    resolv_conf: PathBuf,
    runner: ScriptedRunner,
}

impl LinuxHost {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let resolv_conf = dir.path().join("resolv.conf");
        std::fs::write(&resolv_conf, ORIGINAL).unwrap();
        Self {
            _dir: dir,
            resolv_conf,
            runner: ScriptedRunner::succeeding(),
        }
    }

    fn changer(&self, elevated: bool) -> DnsChanger {
        DnsChanger::new(
            LinuxBackend::new(Arc::new(self.runner.clone())).with_resolv_conf(&self.resolv_conf),
            StaticPrivilege(elevated),
        )
    }

    fn content(&self) -> String {
        std::fs::read_to_string(&self.resolv_conf).unwrap()
    }

    fn backup_path(&self, name: &str) -> PathBuf {
        PathBuf::from(format!("{}.{name}", self.resolv_conf.display()))
    }
}

fn content_hash(path: &Path) -> u64 {
    let mut hasher = DefaultHasher::new();
    std::fs::read(path).unwrap().hash(&mut hasher);
    hasher.finish()
}

const SERVICES: &str = "\
An asterisk (*) denotes that a network service is disabled.
Ethernet
Wi-Fi
Bluetooth PAN
USB LAN
";

const NETSH: &str = "
Admin State    State          Type             Interface Name
-------------------------------------------------------------------------
Enabled        Connected      Dedicated        Ethernet
Enabled        Connected      Dedicated        Wi-Fi
Enabled        Connected      Dedicated        USB LAN
";

/// A fake macOS/Windows host where commands naming `failing` fail.
fn per_interface_host(failing: Option<&'static str>) -> ScriptedRunner {
    ScriptedRunner::new(move |inv| {
        let args = &inv.args;
        match inv.program.as_str() {
            "networksetup" if args[0] == "-listallnetworkservices" => {
                return Ok(CommandOutput::ok(SERVICES));
            }
            "netsh" if args[1] == "show" => return Ok(CommandOutput::ok(NETSH)),
            "scutil" => {
                return Ok(CommandOutput::ok(
                    "resolver #1\n  nameserver[0] : 192.168.1.1\n  nameserver[1] : 192.168.1.2\n",
                ));
            }
            _ => {}
        }
        let hits_failing = failing.is_some_and(|name| {
            args.iter()
                .any(|a| a == name || a.contains(&format!("'{name}'")))
        });
        if hits_failing {
            Ok(CommandOutput::failed(1, "interface is not configurable"))
        } else {
            Ok(CommandOutput::ok(""))
        }
    })
}

// ---------------------------------------------------------------------------
// Linux
// ---------------------------------------------------------------------------

#[tokio::test]
async fn linux_set_then_restore_is_byte_identical() {
    let host = LinuxHost::new();
    let changer = host.changer(true);

    let report = changer
        .set_servers("8.8.8.8 8.8.4.4", &SetOptions::default())
        .await
        .unwrap();
    assert!(report.is_success());
    assert!(host.content().contains("nameserver 8.8.8.8\nnameserver 8.8.4.4\n"));

    changer
        .restore_servers(&RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(host.content(), ORIGINAL);
}

#[tokio::test]
async fn linux_unprivileged_set_leaves_file_untouched() {
    let host = LinuxHost::new();
    let before = content_hash(&host.resolv_conf);

    let err = host
        .changer(false)
        .set_servers("8.8.8.8 8.8.4.4", &SetOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, DnsError::InsufficientPrivilege(_)));
    assert_eq!(content_hash(&host.resolv_conf), before);
    assert!(!host.backup_path("before-dns-changer").exists());
    assert!(host.runner.calls().is_empty());
}

#[tokio::test]
async fn restore_of_unknown_backup_fails_without_mutation() {
    let host = LinuxHost::new();
    let before = content_hash(&host.resolv_conf);
    let opts = RestoreOptions::default().with_backup_name(BackupName::new("never-created").unwrap());

    let err = host.changer(true).restore_servers(&opts).await.unwrap_err();

    assert!(matches!(err, DnsError::BackupNotFound { ref name } if name == "never-created"));
    assert_eq!(content_hash(&host.resolv_conf), before);
    assert!(host.runner.calls().is_empty());
}

#[tokio::test]
async fn removed_backup_cannot_be_restored_twice() {
    let host = LinuxHost::new();
    let changer = host.changer(true);
    let name = BackupName::new("vpn").unwrap();

    changer
        .set_servers(
            ["1.1.1.1", "1.0.0.1"],
            &SetOptions::default().with_backup_name(name.clone()),
        )
        .await
        .unwrap();
    assert!(host.backup_path("vpn").exists());

    let restore = RestoreOptions::default()
        .with_backup_name(name)
        .with_remove_backup(true);
    changer.restore_servers(&restore).await.unwrap();
    assert!(!host.backup_path("vpn").exists());

    let err = changer.restore_servers(&restore).await.unwrap_err();
    assert!(err.is_backup_not_found());
}

#[tokio::test]
async fn setting_twice_equals_setting_once() {
    let once = LinuxHost::new();
    once.changer(true)
        .set_servers("9.9.9.9 149.112.112.112", &SetOptions::default())
        .await
        .unwrap();

    let twice = LinuxHost::new();
    let changer = twice.changer(true);
    for _ in 0..2 {
        changer
            .set_servers("9.9.9.9 149.112.112.112", &SetOptions::default())
            .await
            .unwrap();
    }

    assert_eq!(once.content(), twice.content());
    assert_eq!(twice.content().matches("nameserver").count(), 2);
    assert_eq!(
        std::fs::read_to_string(twice.backup_path("before-dns-changer")).unwrap(),
        ORIGINAL
    );

    changer
        .restore_servers(&RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(twice.content(), ORIGINAL);
}

#[tokio::test]
async fn overwrite_policy_captures_latest_state() {
    let host = LinuxHost::new();
    let changer = host.changer(true);
    let opts = SetOptions::default().with_backup_policy(BackupPolicy::Overwrite);

    changer.set_servers("1.1.1.1 1.0.0.1", &opts).await.unwrap();
    changer.set_servers("8.8.8.8 8.8.4.4", &opts).await.unwrap();
    changer
        .restore_servers(&RestoreOptions::default())
        .await
        .unwrap();

    assert!(host.content().contains("nameserver 1.1.1.1"));
}

#[tokio::test]
async fn invalid_input_is_rejected_before_anything_runs() {
    let host = LinuxHost::new();
    let changer = host.changer(true);

    let err = changer
        .set_servers("8.8.8.8,8.8.4.4", &SetOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DnsError::InvalidServerFormat(_)));

    let err = changer
        .set_servers(["999.1.1.1", "8.8.8.8"], &SetOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DnsError::InvalidAddress { ref value } if value == "999.1.1.1"));

    assert_eq!(host.content(), ORIGINAL);
    assert!(host.runner.calls().is_empty());
}

#[tokio::test]
async fn ipv6_secondary_is_written() {
    let host = LinuxHost::new();
    host.changer(true)
        .set_servers(["8.8.8.8", "2001:db8::1"], &SetOptions::default())
        .await
        .unwrap();
    assert!(host.content().ends_with("nameserver 8.8.8.8\nnameserver 2001:db8::1\n"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn serialized_callers_restore_the_original() {
    let host = LinuxHost::new();
    let changer = Arc::new(host.changer(true));
    // Callers own serialization; this lock stands in for theirs.
    let lock = Arc::new(tokio::sync::Mutex::new(()));

    let tasks: Vec<_> = ["1.1.1.1 1.0.0.1", "8.8.8.8 8.8.4.4"]
        .into_iter()
        .map(|servers| {
            let changer = Arc::clone(&changer);
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                let _guard = lock.lock().await;
                changer
                    .set_servers(servers, &SetOptions::default())
                    .await
                    .unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    changer
        .restore_servers(&RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(host.content(), ORIGINAL);
}

// ---------------------------------------------------------------------------
// macOS
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mac_one_failing_interface_is_reported_alone() {
    let dir = tempfile::tempdir().unwrap();
    let runner = per_interface_host(Some("Wi-Fi"));
    let changer = DnsChanger::new(
        MacBackend::new(Arc::new(runner.clone())).with_cache_dir(dir.path()),
        StaticPrivilege(false),
    );

    let report = changer
        .set_servers("1.1.1.1 1.0.0.1", &SetOptions::default())
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failed_interfaces(), vec!["Wi-Fi"]);
    assert_eq!(report.interfaces.len(), 3);
    let set_calls = runner
        .calls()
        .into_iter()
        .filter(|c| c.args.first().is_some_and(|a| a == "-setdnsservers"))
        .count();
    assert_eq!(set_calls, 3);
}

#[tokio::test]
async fn mac_restore_reapplies_captured_addresses() {
    let dir = tempfile::tempdir().unwrap();
    let runner = per_interface_host(None);
    let changer = DnsChanger::new(
        MacBackend::new(Arc::new(runner.clone())).with_cache_dir(dir.path()),
        StaticPrivilege(false),
    );

    changer
        .set_servers("1.1.1.1 1.0.0.1", &SetOptions::default())
        .await
        .unwrap();
    let report = changer
        .restore_servers(&RestoreOptions::default().with_remove_backup(true))
        .await
        .unwrap();

    assert!(report.is_success());
    let lines = runner.command_lines();
    for service in ["Ethernet", "Wi-Fi", "\"USB LAN\""] {
        let expected = format!("networksetup -setdnsservers {service} 192.168.1.1 192.168.1.2");
        assert!(lines.contains(&expected), "missing {expected}");
    }
    assert!(!dir.path().join("before-dns-changer.txt").exists());
}

// ---------------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------------

#[tokio::test]
async fn windows_one_failing_adapter_is_reported_alone() {
    let runner = per_interface_host(Some("USB LAN"));
    let changer = DnsChanger::new(
        WindowsBackend::new(Arc::new(runner.clone())).with_release(WindowsRelease::new(10, 0)),
        StaticPrivilege(true),
    );

    let report = changer
        .set_servers("1.1.1.1 1.0.0.1", &SetOptions::default())
        .await
        .unwrap();

    assert_eq!(report.failed_interfaces(), vec!["USB LAN"]);
    assert!(report.failures[0].command.contains("Set-DnsClientServerAddress"));
    assert_eq!(
        runner.command_lines().last().map(String::as_str),
        Some("ipconfig /flushdns")
    );
}

#[tokio::test]
async fn windows_requires_administrator() {
    let runner = per_interface_host(None);
    let changer = DnsChanger::new(
        WindowsBackend::new(Arc::new(runner.clone())),
        StaticPrivilege(false),
    );

    let err = changer
        .restore_servers(&RestoreOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_permission_denied());
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn windows_restore_returns_adapters_to_dhcp() {
    let runner = per_interface_host(None);
    let changer = DnsChanger::new(
        WindowsBackend::new(Arc::new(runner.clone())).with_release(WindowsRelease::new(6, 1)),
        StaticPrivilege(true),
    );

    changer
        .set_servers("1.1.1.1 1.0.0.1", &SetOptions::default())
        .await
        .unwrap();
    let report = changer
        .restore_servers(&RestoreOptions::default())
        .await
        .unwrap();

    assert!(report.is_success());
    let lines = runner.command_lines();
    assert!(lines.contains(&"netsh interface ipv4 set dnsservers Wi-Fi dhcp".to_string()));
    assert!(lines.contains(&"netsh interface ipv4 add dnsservers Wi-Fi 1.0.0.1 index=2".to_string()));
}

// ---------------------------------------------------------------------------
// Root-only tests
// ---------------------------------------------------------------------------

#[cfg(target_os = "linux")]
#[tokio::test]
#[ignore = "requires root and rewrites /etc/resolv.conf"]
async fn real_set_and_restore() {
    let before = std::fs::read("/etc/resolv.conf").unwrap();
    let name = BackupName::new("dns-changer-test").unwrap();

    assert!(
        dns_changer::set_servers(
            "1.1.1.1 1.0.0.1",
            &SetOptions::default().with_backup_name(name.clone())
        )
        .await
        .unwrap()
    );
    assert!(
        dns_changer::restore_servers(
            &RestoreOptions::default()
                .with_backup_name(name)
                .with_remove_backup(true)
        )
        .await
        .unwrap()
    );
    assert_eq!(std::fs::read("/etc/resolv.conf").unwrap(), before);
}
