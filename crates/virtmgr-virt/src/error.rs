//! Error types for virtmgr-virt

use thiserror::Error;
use virtmgr_exec::ExecError;

/// Errors raised while resolving migration flag names
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlagError {
    /// Name does not match any `VIR_MIGRATE_*` constant (stored upper-cased)
    #[error("No flag \"{0}\" exists")]
    Unknown(String),
}

/// Errors that can occur while talking to a hypervisor
#[derive(Error, Debug, Clone)]
pub enum VirtError {
    /// Hypervisor endpoint could not be reached
    #[error("cannot connect to \"{uri}\": {reason}")]
    ConnectionFailed {
        /// Connection URI
        uri: String,
        /// Underlying failure
        reason: String,
    },

    /// Domain lookup by id or name failed
    #[error("domain not found: {0}")]
    DomainNotFound(String),

    /// A domain operation was rejected by the hypervisor
    #[error("{operation} of domain \"{domain}\" failed: {reason}")]
    OperationFailed {
        /// Operation name (shutdown, start, migrate, ...)
        operation: &'static str,
        /// Domain name
        domain: String,
        /// Error reported by the hypervisor
        reason: String,
    },

    /// Client produced output we could not interpret
    #[error("unexpected output from {command}: {output:?}")]
    UnexpectedOutput {
        /// Client subcommand
        command: &'static str,
        /// Offending output
        output: String,
    },

    /// Flag bits the backend cannot express
    #[error("migration flags {0:#b} are not supported by this backend")]
    UnsupportedFlags(u32),

    /// Failure running the client program
    #[error(transparent)]
    Exec(#[from] ExecError),
}
