//! virtmgr-virt: Hypervisor control abstraction
//!
//! Provides migration flag resolution, the connection/domain traits the
//! orchestrator drives, and a `virsh` backed implementation of them.

pub mod error;
pub mod flags;
pub mod traits;
pub mod virsh;

pub use error::{FlagError, VirtError};
pub use flags::MigrateFlags;
pub use traits::{Connection, Domain, Hypervisor};
pub use virsh::{DomainState, VirshHypervisor, VirshTimeouts};
