//! virtmgr-exec: Command execution abstraction
//!
//! Runs external programs (the `virsh` client, in practice) with optional
//! timeouts, behind a trait so callers can substitute fakes in tests.

pub mod error;
pub mod local;
pub mod result;
pub mod traits;

pub use error::ExecError;
pub use local::LocalExecutor;
pub use result::CommandResult;
pub use traits::CommandExecutor;
