//! `virsh` backed hypervisor implementation
//!
//! Every call spawns `virsh -c <uri> ...` through a [`CommandExecutor`]. The
//! client opens its own libvirt session per invocation, so a
//! [`VirshConnection`] holds no live socket and closing it is a no-op.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};
use virtmgr_exec::{CommandExecutor, CommandResult, ExecError};

use crate::error::VirtError;
use crate::flags::MigrateFlags;
use crate::traits::{Connection, Domain, Hypervisor};

/// `virsh migrate` option for each flag bit
const MIGRATE_OPTIONS: &[(MigrateFlags, &str)] = &[
    (MigrateFlags::LIVE, "--live"),
    (MigrateFlags::PEER2PEER, "--p2p"),
    (MigrateFlags::TUNNELLED, "--tunnelled"),
    (MigrateFlags::PERSIST_DEST, "--persistent"),
    (MigrateFlags::UNDEFINE_SOURCE, "--undefinesource"),
    (MigrateFlags::PAUSED, "--suspend"),
    (MigrateFlags::NON_SHARED_DISK, "--copy-storage-all"),
    (MigrateFlags::NON_SHARED_INC, "--copy-storage-inc"),
    (MigrateFlags::CHANGE_PROTECTION, "--change-protection"),
    (MigrateFlags::UNSAFE, "--unsafe"),
    (MigrateFlags::OFFLINE, "--offline"),
    (MigrateFlags::COMPRESSED, "--compressed"),
    (MigrateFlags::ABORT_ON_ERROR, "--abort-on-error"),
    (MigrateFlags::AUTO_CONVERGE, "--auto-converge"),
    (MigrateFlags::RDMA_PIN_ALL, "--rdma-pin-all"),
    (MigrateFlags::POSTCOPY, "--postcopy"),
    (MigrateFlags::TLS, "--tls"),
    (MigrateFlags::PARALLEL, "--parallel"),
    (
        MigrateFlags::NON_SHARED_SYNCHRONOUS_WRITES,
        "--copy-storage-synchronous-writes",
    ),
    (MigrateFlags::POSTCOPY_RESUME, "--postcopy-resume"),
    (MigrateFlags::ZEROCOPY, "--zerocopy"),
];

/// Translate a flag bitset into `virsh migrate` options
///
/// # Errors
/// Returns `VirtError::UnsupportedFlags` for bits with no option
pub fn migrate_options(flags: MigrateFlags) -> Result<Vec<&'static str>, VirtError> {
    let unknown = flags.unknown_bits();
    if unknown != 0 {
        return Err(VirtError::UnsupportedFlags(unknown));
    }
    Ok(MIGRATE_OPTIONS
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .map(|(_, option)| *option)
        .collect())
}

/// Environment for every `virsh` call; `domstate` output is translated
/// under other locales
pub const VIRSH_ENV: &[(&str, &str)] = &[("LC_ALL", "C")];

/// Domain state as printed by `virsh domstate`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainState {
    Running,
    Blocked,
    Paused,
    InShutdown,
    ShutOff,
    Crashed,
    Suspended,
    NoState,
}

impl DomainState {
    /// Parse one line of `virsh domstate` output
    #[must_use]
    pub fn parse(output: &str) -> Option<Self> {
        match output.trim() {
            "running" => Some(Self::Running),
            "idle" | "blocked" => Some(Self::Blocked),
            "paused" => Some(Self::Paused),
            "in shutdown" => Some(Self::InShutdown),
            "shut off" => Some(Self::ShutOff),
            "crashed" => Some(Self::Crashed),
            "pmsuspended" => Some(Self::Suspended),
            "no state" => Some(Self::NoState),
            _ => None,
        }
    }

    /// Whether libvirt considers the domain active
    ///
    /// `NoState` is reported for a domain that exists but has no known state
    /// yet; it is never treated as stopped.
    #[must_use]
    pub fn is_active(self) -> bool {
        !matches!(self, Self::ShutOff | Self::Crashed)
    }
}

/// Per-command time limits for `virsh` invocations
#[derive(Debug, Clone, Copy)]
pub struct VirshTimeouts {
    /// Limit for quick queries and lifecycle commands
    pub command: Duration,
    /// Limit for `virsh migrate`
    pub migrate: Duration,
}

impl Default for VirshTimeouts {
    fn default() -> Self {
        Self {
            command: Duration::from_secs(60),
            migrate: Duration::from_secs(60 * 60),
        }
    }
}

/// Settings shared by every handle derived from one `VirshHypervisor`
struct VirshClient {
    executor: Arc<dyn CommandExecutor>,
    program: String,
    timeouts: VirshTimeouts,
}

impl VirshClient {
    /// Run `virsh -q -c <uri> <args...>` in the C locale
    async fn run(
        &self,
        uri: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        let mut argv = Vec::with_capacity(args.len() + 3);
        argv.push("-q".to_string());
        argv.push("-c".to_string());
        argv.push(uri.to_string());
        argv.extend(args.iter().map(ToString::to_string));

        self.executor
            .run_with_timeout(&self.program, &argv, VIRSH_ENV, timeout)
            .await
    }

    /// Run a quick command and return its stdout when it exits zero
    async fn query(&self, uri: &str, args: &[&str]) -> Result<String, ExecError> {
        let result = self.run(uri, args, self.timeouts.command).await?;
        Ok(result.into_success()?.stdout)
    }
}

/// Map a failed lifecycle command to `VirtError::OperationFailed`
fn operation_error(operation: &'static str, domain: &str, err: ExecError) -> VirtError {
    match err {
        ExecError::CommandFailed { stderr, .. } => VirtError::OperationFailed {
            operation,
            domain: domain.to_string(),
            reason: stderr,
        },
        other => VirtError::Exec(other),
    }
}

/// Map a failed lookup to `VirtError::DomainNotFound`
fn lookup_error(key: String, err: ExecError) -> VirtError {
    match err {
        ExecError::CommandFailed { .. } => VirtError::DomainNotFound(key),
        other => VirtError::Exec(other),
    }
}

/// Hypervisor reached through the `virsh` command line client
pub struct VirshHypervisor {
    client: Arc<VirshClient>,
}

impl VirshHypervisor {
    /// Create a hypervisor that runs `virsh` through `executor`
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self::with_program(executor, "virsh", VirshTimeouts::default())
    }

    /// Create a hypervisor with a custom client binary and time limits
    pub fn with_program(
        executor: Arc<dyn CommandExecutor>,
        program: impl Into<String>,
        timeouts: VirshTimeouts,
    ) -> Self {
        Self {
            client: Arc::new(VirshClient {
                executor,
                program: program.into(),
                timeouts,
            }),
        }
    }
}

#[async_trait]
impl Hypervisor for VirshHypervisor {
    #[instrument(skip(self))]
    async fn open(&self, uri: &str) -> Result<Box<dyn Connection>, VirtError> {
        let canonical =
            self.client
                .query(uri, &["uri"])
                .await
                .map_err(|e| VirtError::ConnectionFailed {
                    uri: uri.to_string(),
                    reason: match e {
                        ExecError::CommandFailed { stderr, .. } => stderr,
                        other => other.to_string(),
                    },
                })?;

        debug!(uri = %uri, canonical = %canonical.trim(), "opened hypervisor connection");

        Ok(Box::new(VirshConnection {
            client: self.client.clone(),
            uri: uri.to_string(),
        }))
    }
}

/// Connection to one hypervisor URI
pub struct VirshConnection {
    client: Arc<VirshClient>,
    uri: String,
}

impl VirshConnection {
    fn domain(&self, name: impl Into<String>) -> Box<dyn Domain> {
        Box::new(VirshDomain {
            client: self.client.clone(),
            uri: self.uri.clone(),
            name: name.into(),
        })
    }
}

#[async_trait]
impl Connection for VirshConnection {
    fn uri(&self) -> &str {
        &self.uri
    }

    #[instrument(skip(self), fields(uri = %self.uri))]
    async fn list_active_domain_ids(&self) -> Result<Vec<u32>, VirtError> {
        let stdout = self.client.query(&self.uri, &["list", "--id"]).await?;

        stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                line.parse::<u32>().map_err(|_| VirtError::UnexpectedOutput {
                    command: "list",
                    output: line.to_string(),
                })
            })
            .collect()
    }

    #[instrument(skip(self), fields(uri = %self.uri))]
    async fn lookup_by_id(&self, id: u32) -> Result<Box<dyn Domain>, VirtError> {
        let id_arg = id.to_string();
        let stdout = self
            .client
            .query(&self.uri, &["domname", &id_arg])
            .await
            .map_err(|e| lookup_error(id_arg.clone(), e))?;

        let name = stdout.trim();
        if name.is_empty() {
            return Err(VirtError::DomainNotFound(id_arg));
        }
        Ok(self.domain(name))
    }

    #[instrument(skip(self), fields(uri = %self.uri))]
    async fn lookup_by_name(&self, name: &str) -> Result<Box<dyn Domain>, VirtError> {
        self.client
            .query(&self.uri, &["domuuid", name])
            .await
            .map_err(|e| lookup_error(name.to_string(), e))?;
        Ok(self.domain(name))
    }

    async fn close(&self) -> Result<(), VirtError> {
        debug!(uri = %self.uri, "closed hypervisor connection");
        Ok(())
    }
}

/// Domain handle bound to a connection URI
pub struct VirshDomain {
    client: Arc<VirshClient>,
    uri: String,
    name: String,
}

impl VirshDomain {
    /// Current state as reported by `virsh domstate`
    ///
    /// # Errors
    /// Returns `VirtError` when the query fails or prints an unknown state
    pub async fn state(&self) -> Result<DomainState, VirtError> {
        let stdout = self
            .client
            .query(&self.uri, &["domstate", &self.name])
            .await
            .map_err(|e| lookup_error(self.name.clone(), e))?;

        DomainState::parse(&stdout).ok_or_else(|| VirtError::UnexpectedOutput {
            command: "domstate",
            output: stdout.trim().to_string(),
        })
    }
}

#[async_trait]
impl Domain for VirshDomain {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_active(&self) -> Result<bool, VirtError> {
        Ok(self.state().await?.is_active())
    }

    #[instrument(skip(self), fields(domain = %self.name, uri = %self.uri))]
    async fn shutdown(&self) -> Result<(), VirtError> {
        self.client
            .query(&self.uri, &["shutdown", &self.name])
            .await
            .map_err(|e| operation_error("shutdown", &self.name, e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(domain = %self.name, uri = %self.uri))]
    async fn create(&self) -> Result<(), VirtError> {
        self.client
            .query(&self.uri, &["start", &self.name])
            .await
            .map_err(|e| operation_error("start", &self.name, e))?;
        Ok(())
    }

    #[instrument(
        skip(self, destination, flags),
        fields(domain = %self.name, uri = %self.uri, flags = %flags)
    )]
    async fn migrate(
        &self,
        destination: &dyn Connection,
        flags: MigrateFlags,
    ) -> Result<Box<dyn Domain>, VirtError> {
        let mut args = vec!["migrate"];
        args.extend(migrate_options(flags)?);
        args.push(&self.name);
        args.push(destination.uri());

        let result = self
            .client
            .run(&self.uri, &args, self.client.timeouts.migrate)
            .await?;
        result
            .into_success()
            .map_err(|e| operation_error("migrate", &self.name, e))?;

        Ok(Box::new(VirshDomain {
            client: self.client.clone(),
            uri: destination.uri().to_string(),
            name: self.name.clone(),
        }))
    }
}
