//! virtmgr-core: Host registry and migration orchestration
//!
//! Builds the host/group registry from configuration, decides how each
//! domain is migrated, and drives the migrate sequence against the
//! hypervisor traits from `virtmgr-virt`.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod outcome;
pub mod registry;
pub mod state;

pub use config::{Config, ConfigDocument, GroupSpec, HostSpec, MigrationSettings};
pub use error::{ConfigError, HostRole, MigrateError};
pub use orchestrator::{DestinationRef, DomainSelector, MigrationRequest, Orchestrator};
pub use outcome::{DomainOutcome, MigrationReport, Outcome, Recovery, SkipReason};
pub use registry::{Group, GroupRelation, Host, Registry, RegistryDefaults};
pub use state::{Decision, DomainPhase, decide};
