//! Configuration document parsing
//!
//! Each entity has an explicit list of recognised keys. Unknown keys are
//! logged and dropped before the entry is deserialized, so a typo never
//! aborts startup but a value of the wrong type does.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::registry::{Registry, RegistryDefaults};

/// Keys accepted in a `[hosts.<name>]` table
pub const HOST_KEYS: &[&str] = &["group", "address", "user", "port", "path", "params", "uri"];

/// Keys accepted in a `[groups.<name>]` table
pub const GROUP_KEYS: &[&str] = &["same_group_flags", "different_group_flags"];

/// Keys accepted in the `[migration]` table
pub const MIGRATION_KEYS: &[&str] = &["shutdown_timeout", "poll_interval", "recovery_attempts"];

const TOP_LEVEL_KEYS: &[&str] = &["hosts", "groups", "migration"];

/// Host entry as written in the config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSpec {
    /// Group name (default group when absent)
    pub group: Option<String>,
    /// Address used in the derived URI (host name when absent)
    pub address: Option<String>,
    /// SSH user (defaults to root)
    pub user: Option<String>,
    /// SSH port (defaults to 22)
    pub port: Option<u16>,
    /// libvirt path component (defaults to `system`)
    pub path: Option<String>,
    /// URI query parameters (defaults to `no_tty=1`)
    pub params: Option<Vec<String>>,
    /// Explicit URI, overrides every other connection field
    pub uri: Option<String>,
}

/// Group entry as written in the config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    /// Flag names for migrations inside the group
    pub same_group_flags: Option<Vec<String>>,
    /// Flag names for migrations leaving the group
    pub different_group_flags: Option<Vec<String>>,
}

/// The optional `[migration]` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSection {
    /// Seconds to wait for a guest shutdown, 0 waits forever
    pub shutdown_timeout: Option<u64>,
    /// Seconds between state polls
    pub poll_interval: Option<u64>,
    /// State polls after a failed migration
    pub recovery_attempts: Option<u32>,
}

/// Parsed config file, before registry validation
#[derive(Debug, Clone, Default)]
pub struct ConfigDocument {
    pub hosts: BTreeMap<String, HostSpec>,
    pub groups: BTreeMap<String, GroupSpec>,
    pub migration: MigrationSection,
    /// Dotted paths of keys that were ignored
    pub ignored: Vec<String>,
}

impl ConfigDocument {
    /// Parse a TOML document
    ///
    /// # Errors
    /// Returns `ConfigError` for invalid TOML or mistyped values
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let table: toml::Table =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let mut doc = ConfigDocument::default();

        for key in table.keys() {
            if !TOP_LEVEL_KEYS.contains(&key.as_str()) {
                warn!("Configuration contains unknown section \"{key}\"");
                doc.ignored.push(key.clone());
            }
        }

        for (name, value) in section(&table, "groups")? {
            let entry = doc.filter_entry("Group", "groups", name, value, GROUP_KEYS)?;
            doc.groups
                .insert(name.clone(), deserialize_entry("Group", name, entry)?);
        }

        for (name, value) in section(&table, "hosts")? {
            let entry = doc.filter_entry("Host", "hosts", name, value, HOST_KEYS)?;
            doc.hosts
                .insert(name.clone(), deserialize_entry("Host", name, entry)?);
        }

        if let Some(value) = table.get("migration") {
            let entry = doc.filter_entry("Section", "", "migration", value, MIGRATION_KEYS)?;
            doc.migration = deserialize_entry("Section", "migration", entry)?;
        }

        Ok(doc)
    }

    /// Keep the allowed keys of one entry, recording and logging the rest
    fn filter_entry(
        &mut self,
        kind: &'static str,
        prefix: &str,
        name: &str,
        value: &toml::Value,
        allowed: &[&str],
    ) -> Result<toml::Table, ConfigError> {
        let toml::Value::Table(entry) = value else {
            return Err(ConfigError::InvalidEntry {
                kind,
                name: name.to_string(),
                reason: format!("expected a table, found {}", value.type_str()),
            });
        };

        let mut kept = toml::Table::new();
        for (key, value) in entry {
            if allowed.contains(&key.as_str()) {
                kept.insert(key.clone(), value.clone());
            } else {
                warn!("{kind} \"{name}\" contains unknown parameter \"{key}\"");
                let path = if prefix.is_empty() {
                    format!("{name}.{key}")
                } else {
                    format!("{prefix}.{name}.{key}")
                };
                self.ignored.push(path);
            }
        }
        Ok(kept)
    }
}

/// Borrow a top-level table of named entries, empty when absent
fn section<'a>(table: &'a toml::Table, key: &str) -> Result<Vec<(&'a String, &'a toml::Value)>, ConfigError> {
    match table.get(key) {
        None => Ok(Vec::new()),
        Some(toml::Value::Table(entries)) => Ok(entries.iter().collect()),
        Some(other) => Err(ConfigError::Parse(format!(
            "\"{key}\" must be a table, found {}",
            other.type_str()
        ))),
    }
}

fn deserialize_entry<T: DeserializeOwned>(
    kind: &'static str,
    name: &str,
    entry: toml::Table,
) -> Result<T, ConfigError> {
    toml::Value::Table(entry)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::InvalidEntry {
            kind,
            name: name.to_string(),
            reason: e.to_string().trim().to_string(),
        })
}

/// Timing and retry settings for the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSettings {
    /// Delay between domain state polls
    pub poll_interval: Duration,
    /// Polls of the source domain after a failed migration
    pub recovery_attempts: u32,
    /// Upper bound on the shutdown wait, `None` waits forever
    pub shutdown_timeout: Option<Duration>,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            recovery_attempts: 5,
            shutdown_timeout: Some(Duration::from_secs(300)),
        }
    }
}

impl MigrationSettings {
    /// Apply the `[migration]` table over the defaults
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidEntry` for a zero poll interval
    pub fn from_section(section: &MigrationSection) -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        if let Some(secs) = section.poll_interval {
            if secs == 0 {
                return Err(ConfigError::InvalidEntry {
                    kind: "Section",
                    name: "migration".to_string(),
                    reason: "poll_interval must be at least 1 second".to_string(),
                });
            }
            settings.poll_interval = Duration::from_secs(secs);
        }
        if let Some(attempts) = section.recovery_attempts {
            settings.recovery_attempts = attempts;
        }
        if let Some(secs) = section.shutdown_timeout {
            settings.shutdown_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(settings)
    }
}

/// Fully validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub registry: Registry,
    pub migration: MigrationSettings,
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file is missing, unreadable, or invalid
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        debug!(path = %path.display(), "reading config file");

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Build configuration from TOML text with the default registry policy
    ///
    /// # Errors
    /// Returns `ConfigError` if parsing or registry validation fails
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let doc = ConfigDocument::parse(content)?;
        Self::from_document(&doc, &RegistryDefaults::default())
    }

    /// Build configuration from a parsed document
    ///
    /// # Errors
    /// Returns `ConfigError` if registry validation fails
    pub fn from_document(
        doc: &ConfigDocument,
        defaults: &RegistryDefaults,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            registry: Registry::build(&doc.hosts, &doc.groups, defaults)?,
            migration: MigrationSettings::from_section(&doc.migration)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hosts_and_groups() {
        let doc = ConfigDocument::parse(
            r#"
            [hosts.host01]
            address = "10.0.10.1"
            port = 2200
            params = []

            [groups.offline]
            different_group_flags = ["offline"]
            "#,
        )
        .unwrap();

        let host = &doc.hosts["host01"];
        assert_eq!(host.address.as_deref(), Some("10.0.10.1"));
        assert_eq!(host.port, Some(2200));
        assert_eq!(host.params, Some(vec![]));
        assert_eq!(host.uri, None);

        let group = &doc.groups["offline"];
        assert_eq!(group.same_group_flags, None);
        assert_eq!(
            group.different_group_flags,
            Some(vec!["offline".to_string()])
        );
        assert!(doc.ignored.is_empty());
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let doc = ConfigDocument::parse(
            r#"
            colour = "blue"

            [hosts.host01]
            idontexist = 42

            [groups.live]
            speed = "fast"

            [migration]
            retries = 3
            "#,
        )
        .unwrap();

        assert!(doc.hosts.contains_key("host01"));
        assert_eq!(doc.hosts["host01"], HostSpec::default());
        assert_eq!(
            doc.ignored,
            vec![
                "colour".to_string(),
                "groups.live.speed".to_string(),
                "hosts.host01.idontexist".to_string(),
                "migration.retries".to_string(),
            ]
        );
    }

    #[test]
    fn test_wrong_value_type_is_fatal() {
        let err = ConfigDocument::parse(
            r#"
            [hosts.host01]
            port = "twenty-two"
            "#,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::InvalidEntry { kind: "Host", ref name, .. } if name == "host01"
        ));
    }

    #[test]
    fn test_host_must_be_table() {
        let err = ConfigDocument::parse("hosts = { host01 = 1 }").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEntry { kind: "Host", .. }));
    }

    #[test]
    fn test_invalid_toml() {
        let err = ConfigDocument::parse("[hosts.host01").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_migration_settings() {
        let defaults = MigrationSettings::from_section(&MigrationSection::default()).unwrap();
        assert_eq!(defaults, MigrationSettings::default());

        let section = MigrationSection {
            shutdown_timeout: Some(0),
            poll_interval: Some(2),
            recovery_attempts: Some(10),
        };
        let settings = MigrationSettings::from_section(&section).unwrap();
        assert_eq!(settings.shutdown_timeout, None);
        assert_eq!(settings.poll_interval, Duration::from_secs(2));
        assert_eq!(settings.recovery_attempts, 10);

        let section = MigrationSection {
            poll_interval: Some(0),
            ..MigrationSection::default()
        };
        assert!(MigrationSettings::from_section(&section).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Path::new("/i/hope/nobody/has/this")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Could not find config file: /i/hope/nobody/has/this"
        );
    }
}
