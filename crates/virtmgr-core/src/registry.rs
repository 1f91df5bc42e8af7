//! Host and group registry
//!
//! Built once from the configuration document and read-only afterwards.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;
use virtmgr_virt::MigrateFlags;

use crate::config::{GroupSpec, HostSpec};
use crate::error::{ConfigError, MigrateError};

/// Name of the host that is synthesized when the config omits it
pub const LOCALHOST: &str = "localhost";

const DEFAULT_USER: &str = "root";
const DEFAULT_PORT: u16 = 22;
const DEFAULT_PATH: &str = "system";
const DEFAULT_PARAM: &str = "no_tty=1";

/// Defaults injected into [`Registry::build`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryDefaults {
    /// Group assigned to hosts that name none; always present
    pub group: String,
    /// Same-group policy of the default group and of groups that omit it
    pub same_group_flags: MigrateFlags,
    /// Different-group policy of the default group and of groups that omit it
    pub different_group_flags: MigrateFlags,
    /// URI of the synthesized `localhost` host
    pub localhost_uri: String,
}

impl Default for RegistryDefaults {
    fn default() -> Self {
        Self {
            group: "live".to_string(),
            same_group_flags: MigrateFlags::LIVE
                | MigrateFlags::PEER2PEER
                | MigrateFlags::TUNNELLED
                | MigrateFlags::PERSIST_DEST
                | MigrateFlags::UNDEFINE_SOURCE,
            different_group_flags: MigrateFlags::OFFLINE
                | MigrateFlags::PERSIST_DEST
                | MigrateFlags::UNDEFINE_SOURCE,
            localhost_uri: "qemu:///system".to_string(),
        }
    }
}

/// A hypervisor host
#[derive(Debug, Clone, Serialize)]
pub struct Host {
    name: String,
    uri: String,
    group: String,
}

impl Host {
    /// Create a host with an explicit URI
    pub fn new(name: impl Into<String>, uri: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            group: group.into(),
        }
    }

    /// Create a host from its config entry, deriving the URI when needed
    pub fn from_spec(name: &str, spec: &HostSpec, default_group: &str) -> Self {
        let uri = match &spec.uri {
            Some(uri) => uri.clone(),
            None => {
                let default_params = [DEFAULT_PARAM.to_string()];
                derive_uri(
                    spec.address.as_deref().unwrap_or(name),
                    spec.user.as_deref().unwrap_or(DEFAULT_USER),
                    spec.port.unwrap_or(DEFAULT_PORT),
                    spec.path.as_deref().unwrap_or(DEFAULT_PATH),
                    spec.params.as_deref().unwrap_or(&default_params),
                )
            }
        };
        let group = spec.group.as_deref().unwrap_or(default_group);
        Self::new(name, uri, group)
    }

    /// Host name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hypervisor connection URI
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Group name
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.uri == other.uri
    }
}

impl Eq for Host {}

/// Build a `qemu+ssh` URI from its parts
///
/// The port is omitted when it is 22 and the query string when `params`
/// is empty. Parameters are joined verbatim, without encoding.
#[must_use]
pub fn derive_uri(address: &str, user: &str, port: u16, path: &str, params: &[String]) -> String {
    let port = if port == DEFAULT_PORT {
        String::new()
    } else {
        format!(":{port}")
    };
    let query = if params.is_empty() {
        String::new()
    } else {
        format!("?{}", params.join("&"))
    };
    format!("qemu+ssh://{user}@{address}{port}/{path}{query}")
}

/// Named migration policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    name: String,
    same_group_flags: MigrateFlags,
    different_group_flags: MigrateFlags,
}

impl Group {
    /// Create a group with resolved policies
    pub fn new(
        name: impl Into<String>,
        same_group_flags: MigrateFlags,
        different_group_flags: MigrateFlags,
    ) -> Self {
        Self {
            name: name.into(),
            same_group_flags,
            different_group_flags,
        }
    }

    /// Create a group from its config entry, resolving flag names
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidFlags` for an unknown flag name
    pub fn from_spec(
        name: &str,
        spec: &GroupSpec,
        defaults: &RegistryDefaults,
    ) -> Result<Self, ConfigError> {
        let resolve = |names: &Option<Vec<String>>, default: MigrateFlags| match names {
            Some(names) => MigrateFlags::resolve(names).map_err(|source| ConfigError::InvalidFlags {
                group: name.to_string(),
                source,
            }),
            None => Ok(default),
        };

        Ok(Self::new(
            name,
            resolve(&spec.same_group_flags, defaults.same_group_flags)?,
            resolve(&spec.different_group_flags, defaults.different_group_flags)?,
        ))
    }

    /// Group name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Flags for migrations between two hosts of this group
    #[must_use]
    pub fn same_group_flags(&self) -> MigrateFlags {
        self.same_group_flags
    }

    /// Flags for migrations from this group to another one
    #[must_use]
    pub fn different_group_flags(&self) -> MigrateFlags {
        self.different_group_flags
    }
}

/// Whether two hosts share a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupRelation {
    Same,
    Different,
}

/// Validated set of hosts and groups
#[derive(Debug, Clone)]
pub struct Registry {
    hosts: BTreeMap<String, Host>,
    groups: BTreeMap<String, Group>,
    /// Set when `localhost` was synthesized rather than configured
    implicit_localhost: bool,
}

impl Registry {
    /// Build the registry: groups first, then hosts validated against them
    ///
    /// # Errors
    /// Returns `ConfigError` for unknown flags, undefined groups, or an
    /// empty (or localhost-only) host table
    pub fn build(
        host_specs: &BTreeMap<String, HostSpec>,
        group_specs: &BTreeMap<String, GroupSpec>,
        defaults: &RegistryDefaults,
    ) -> Result<Self, ConfigError> {
        let mut groups = BTreeMap::new();
        groups.insert(
            defaults.group.clone(),
            Group::new(
                defaults.group.clone(),
                defaults.same_group_flags,
                defaults.different_group_flags,
            ),
        );
        for (name, spec) in group_specs {
            let group = Group::from_spec(name, spec, defaults)?;
            debug!(
                group = %name,
                same_group_flags = %group.same_group_flags,
                different_group_flags = %group.different_group_flags,
                "registered group"
            );
            groups.insert(name.clone(), group);
        }

        let mut hosts = BTreeMap::new();
        for (name, spec) in host_specs {
            if let Some(group) = &spec.group
                && !groups.contains_key(group)
            {
                return Err(ConfigError::UndefinedGroup {
                    host: name.clone(),
                    group: group.clone(),
                });
            }
            let host = Host::from_spec(name, spec, &defaults.group);
            debug!(host = %name, uri = %host.uri, group = %host.group, "registered host");
            hosts.insert(name.clone(), host);
        }

        if hosts.is_empty() || (hosts.len() == 1 && hosts.contains_key(LOCALHOST)) {
            return Err(ConfigError::NoHosts);
        }

        let implicit_localhost = !hosts.contains_key(LOCALHOST);
        if implicit_localhost {
            hosts.insert(
                LOCALHOST.to_string(),
                Host::new(LOCALHOST, defaults.localhost_uri.clone(), defaults.group.clone()),
            );
        }

        Ok(Self {
            hosts,
            groups,
            implicit_localhost,
        })
    }

    /// Look up a host by name
    #[must_use]
    pub fn host(&self, name: &str) -> Option<&Host> {
        self.hosts.get(name)
    }

    /// Look up a group by name
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    /// All hosts, ordered by name
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    /// All groups, ordered by name
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Whether `host` is the synthesized `localhost` entry
    #[must_use]
    pub fn is_implicit(&self, host: &Host) -> bool {
        self.implicit_localhost && host.name == LOCALHOST
    }

    /// Pick the flag policy for migrating from `source` to `destination`
    ///
    /// Only the source host's group is consulted: a cross-group migration
    /// uses the source group's `different_group_flags`.
    ///
    /// # Errors
    /// Returns `MigrateError::GroupNotFound` if the source group is unknown
    pub fn resolve_group_for(
        &self,
        source: &Host,
        destination: &Host,
    ) -> Result<(GroupRelation, MigrateFlags), MigrateError> {
        let group = self
            .groups
            .get(&source.group)
            .ok_or_else(|| MigrateError::GroupNotFound(source.group.clone()))?;

        if source.group == destination.group {
            Ok((GroupRelation::Same, group.same_group_flags))
        } else {
            Ok((GroupRelation::Different, group.different_group_flags))
        }
    }

    /// Pick a destination host from `group`, skipping names in `exclude`
    ///
    /// Candidates are taken in host-name order and the first eligible one
    /// wins. The synthesized `localhost` is never picked.
    ///
    /// # Errors
    /// Returns `MigrateError::GroupNotFound` for an unknown group and
    /// `MigrateError::NoEligibleHost` when every member is excluded
    pub fn pick_host_from_group(&self, group: &str, exclude: &[&str]) -> Result<&Host, MigrateError> {
        if !self.groups.contains_key(group) {
            return Err(MigrateError::GroupNotFound(group.to_string()));
        }

        self.hosts
            .values()
            .filter(|host| host.group == group)
            .filter(|host| !self.is_implicit(host))
            .find(|host| !exclude.contains(&host.name.as_str()))
            .ok_or_else(|| MigrateError::NoEligibleHost(group.to_string()))
    }
}
