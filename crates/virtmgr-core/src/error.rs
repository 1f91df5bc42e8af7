//! Core error types for virtmgr-core

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use virtmgr_virt::{FlagError, VirtError};

/// Errors raised while loading configuration or building the registry
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    /// Host table empty or only holding `localhost`
    #[error("No hosts in configuration")]
    NoHosts,

    /// Host references a group that is not declared
    #[error("Host \"{host}\" cannot be assigned undefined group \"{group}\"")]
    UndefinedGroup {
        /// Host name
        host: String,
        /// Referenced group
        group: String,
    },

    /// Group flag list contains an unknown name
    #[error("Group \"{group}\" has invalid migration flags: {source}")]
    InvalidFlags {
        /// Group name
        group: String,
        /// Resolver failure
        source: FlagError,
    },

    /// Entry has a value of the wrong type or out of range
    #[error("{kind} \"{name}\" is invalid: {reason}")]
    InvalidEntry {
        /// Entry kind (Host, Group, Section)
        kind: &'static str,
        /// Entry name
        name: String,
        /// Parser message
        reason: String,
    },

    /// Config file does not exist
    #[error("Could not find config file: {}", .0.display())]
    NotFound(PathBuf),

    /// Config file exists but cannot be read
    #[error("cannot read config file {}: {reason}", path.display())]
    Read {
        /// File path
        path: PathBuf,
        /// I/O error message
        reason: String,
    },

    /// Document is not valid TOML
    #[error("invalid config: {0}")]
    Parse(String),
}

/// Which end of a migration a host plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostRole {
    Source,
    Destination,
}

impl fmt::Display for HostRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostRole::Source => write!(f, "source"),
            HostRole::Destination => write!(f, "destination"),
        }
    }
}

/// Errors that abort a whole migrate invocation
///
/// Per-domain failures never surface here; they are reported as
/// [`crate::Outcome`] values.
#[derive(Error, Debug, Clone)]
pub enum MigrateError {
    /// Source host missing from the registry
    #[error("Source host \"{0}\" not found in configuration")]
    SourceHostNotFound(String),

    /// Destination host missing from the registry
    #[error("Destination host \"{0}\" not found in configuration")]
    DestinationHostNotFound(String),

    /// Source and destination resolve to the same host
    #[error("Source and destination host cannot be the same")]
    SameHost,

    /// Group missing from the registry
    #[error("Group \"{0}\" not found in configuration")]
    GroupNotFound(String),

    /// Group has no host left after exclusions
    #[error("No eligible destination host in group \"{0}\"")]
    NoEligibleHost(String),

    /// Hypervisor connection could not be opened
    #[error("Cannot connect to {role} hypervisor \"{host}\": {source}")]
    Connection {
        /// Source or destination
        role: HostRole,
        /// Host name
        host: String,
        /// Underlying failure
        source: VirtError,
    },

    /// Active domains could not be listed on the source
    #[error("Cannot list domains on host \"{host}\": {source}")]
    ListDomains {
        /// Host name
        host: String,
        /// Underlying failure
        source: VirtError,
    },

    /// Named selection without any domain name
    #[error("No domain name given")]
    NoDomainsNamed,

    /// An explicitly named domain does not exist on the source
    #[error("Cannot find domain with name \"{domain}\" on host \"{host}\"")]
    DomainNotFound {
        /// Domain name
        domain: String,
        /// Host name
        host: String,
    },
}
