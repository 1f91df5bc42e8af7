//! Loading configuration from disk

use std::path::Path;
use std::time::Duration;

use virtmgr_core::{Config, ConfigError};

const CONFIG: &str = r#"
[hosts.host01]

[hosts.host02]
params = []

[hosts.host03]
address = "10.0.10.1"

[hosts.host04]
address = "10.0.10.4"
user = "libvirt"
port = 2200
params = ["command=/opt/openssh/bin/ssh", "no_verify=1", "no_tty=0"]
path = "notsys"

[hosts.host05]
uri = "test+tcp://localhost:5000/default"
group = "offline"
flavour = "ignored"

[groups.offline]
different_group_flags = ["offline", "persist_dest"]

[migration]
shutdown_timeout = 0
poll_interval = 2
"#;

fn uri<'a>(config: &'a Config, host: &str) -> &'a str {
    config.registry.host(host).unwrap().uri()
}

#[test]
fn test_load_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, CONFIG).unwrap();

    let config = Config::load(&path).unwrap();

    assert_eq!(uri(&config, "host01"), "qemu+ssh://root@host01/system?no_tty=1");
    assert_eq!(uri(&config, "host02"), "qemu+ssh://root@host02/system");
    assert_eq!(uri(&config, "host03"), "qemu+ssh://root@10.0.10.1/system?no_tty=1");
    assert_eq!(
        uri(&config, "host04"),
        "qemu+ssh://libvirt@10.0.10.4:2200/notsys?command=/opt/openssh/bin/ssh&no_verify=1&no_tty=0"
    );
    assert_eq!(uri(&config, "host05"), "test+tcp://localhost:5000/default");
    assert_eq!(uri(&config, "localhost"), "qemu:///system");

    assert_eq!(config.registry.host("host05").unwrap().group(), "offline");
    assert_eq!(config.migration.shutdown_timeout, None);
    assert_eq!(config.migration.poll_interval, Duration::from_secs(2));
    assert_eq!(config.migration.recovery_attempts, 5);
}

#[test]
fn test_missing_config_file() {
    let err = Config::load(Path::new("/i/hope/nobody/has/this")).unwrap_err();

    assert!(matches!(err, ConfigError::NotFound(_)));
    assert_eq!(
        err.to_string(),
        "Could not find config file: /i/hope/nobody/has/this"
    );
}

#[test]
fn test_invalid_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[hosts.host01\naddress = ").unwrap();

    assert!(matches!(
        Config::load(&path).unwrap_err(),
        ConfigError::Parse(_)
    ));
}

#[test]
fn test_empty_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "").unwrap();

    let err = Config::load(&path).unwrap_err();
    assert_eq!(err.to_string(), "No hosts in configuration");
}
