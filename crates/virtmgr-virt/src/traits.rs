//! Hypervisor control traits
//!
//! The orchestrator only ever sees these traits; `VirshHypervisor` is the
//! production implementation and tests plug in in-memory fakes.

use async_trait::async_trait;

use crate::error::VirtError;
use crate::flags::MigrateFlags;

/// Opens sessions to hypervisor endpoints
#[async_trait]
pub trait Hypervisor: Send + Sync {
    /// Open a connection to `uri`
    ///
    /// # Errors
    /// Returns `VirtError::ConnectionFailed` when the endpoint is unreachable
    async fn open(&self, uri: &str) -> Result<Box<dyn Connection>, VirtError>;
}

/// An open session to one hypervisor
#[async_trait]
pub trait Connection: Send + Sync {
    /// URI this connection was opened with
    fn uri(&self) -> &str;

    /// Ids of all active domains, in hypervisor order
    async fn list_active_domain_ids(&self) -> Result<Vec<u32>, VirtError>;

    /// Look up an active domain by numeric id
    async fn lookup_by_id(&self, id: u32) -> Result<Box<dyn Domain>, VirtError>;

    /// Look up a domain (active or defined) by name
    async fn lookup_by_name(&self, name: &str) -> Result<Box<dyn Domain>, VirtError>;

    /// Release the session
    async fn close(&self) -> Result<(), VirtError>;
}

/// Handle on a domain living on one connection
#[async_trait]
pub trait Domain: Send + Sync {
    /// Domain name
    fn name(&self) -> &str;

    /// Whether the domain is currently running
    async fn is_active(&self) -> Result<bool, VirtError>;

    /// Request a graceful guest shutdown
    async fn shutdown(&self) -> Result<(), VirtError>;

    /// Start (create) the defined domain
    async fn create(&self) -> Result<(), VirtError>;

    /// Migrate to `destination`, returning the handle on the destination
    async fn migrate(
        &self,
        destination: &dyn Connection,
        flags: MigrateFlags,
    ) -> Result<Box<dyn Domain>, VirtError>;
}
