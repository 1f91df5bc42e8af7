//! Migration orchestrator
//!
//! Resolves hosts, enumerates domains on the source and drives each one
//! through shutdown, migrate, start and failure recovery. Domains are
//! processed strictly one after another; a failing domain never stops the
//! batch, while host resolution, connection and named-domain lookup
//! failures abort the whole invocation.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};
use virtmgr_virt::{Connection, Domain, Hypervisor, MigrateFlags};

use crate::config::MigrationSettings;
use crate::error::{HostRole, MigrateError};
use crate::outcome::{DomainOutcome, MigrationReport, Outcome, Recovery, SkipReason};
use crate::registry::{GroupRelation, Host, Registry};
use crate::state::{Decision, DomainPhase, decide};

/// Where domains are migrated to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationRef {
    /// A named host
    Host(String),
    /// Any host of the named group other than the source
    Group(String),
}

/// Which domains on the source are migrated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainSelector {
    /// Every active domain
    All,
    /// Domains by name; each one must exist
    Named(Vec<String>),
}

/// One migrate invocation
#[derive(Debug, Clone)]
pub struct MigrationRequest {
    /// Source host name
    pub source: String,
    pub destination: DestinationRef,
    pub selector: DomainSelector,
    /// Shut running domains down for offline migrations
    pub auto_stop: bool,
    /// Start domains on the destination after offline migrations
    pub auto_start: bool,
}

/// Drives migrations between registry hosts
pub struct Orchestrator {
    registry: Arc<Registry>,
    hypervisor: Arc<dyn Hypervisor>,
    settings: MigrationSettings,
}

impl Orchestrator {
    /// Create an orchestrator over `registry` using `hypervisor` for connections
    pub fn new(
        registry: Arc<Registry>,
        hypervisor: Arc<dyn Hypervisor>,
        settings: MigrationSettings,
    ) -> Self {
        Self {
            registry,
            hypervisor,
            settings,
        }
    }

    /// Run a migrate invocation
    ///
    /// # Errors
    /// Returns `MigrateError` for failures that abort the whole invocation;
    /// per-domain failures are reported in the returned `MigrationReport`
    pub async fn migrate(&self, request: &MigrationRequest) -> Result<MigrationReport, MigrateError> {
        let started_at = Utc::now();

        if let DomainSelector::Named(names) = &request.selector
            && names.is_empty()
        {
            return Err(MigrateError::NoDomainsNamed);
        }

        let (src_host, dst_host) = self.resolve_hosts(request)?;
        let (relation, flags) = self.registry.resolve_group_for(src_host, dst_host)?;

        let src_conn = self.open(HostRole::Source, src_host).await?;

        let domains = match self
            .collect_domains(src_conn.as_ref(), src_host, &request.selector)
            .await
        {
            Ok(domains) => domains,
            Err(e) => {
                close(src_conn.as_ref(), HostRole::Source).await;
                return Err(e);
            }
        };

        let mut report = MigrationReport {
            source: src_host.name().to_string(),
            destination: dst_host.name().to_string(),
            flags,
            started_at,
            finished_at: started_at,
            domains: Vec::with_capacity(domains.len()),
        };

        if domains.is_empty() {
            info!(host = %src_host.name(), "Source host has no active domains");
            close(src_conn.as_ref(), HostRole::Source).await;
            report.finished_at = Utc::now();
            return Ok(report);
        }

        let dst_conn = match self.open(HostRole::Destination, dst_host).await {
            Ok(conn) => conn,
            Err(e) => {
                close(src_conn.as_ref(), HostRole::Source).await;
                return Err(e);
            }
        };

        match relation {
            GroupRelation::Same => info!(
                group = %src_host.group(),
                "Using flags for migration within the same group"
            ),
            GroupRelation::Different => info!(
                source_group = %src_host.group(),
                destination_group = %dst_host.group(),
                "Using flags for migration between different groups"
            ),
        }
        debug!(flags = %format!("{flags:b}"), names = %flags, "Migration flags");

        for dom in &domains {
            let outcome = self
                .migrate_domain(dom.as_ref(), src_conn.as_ref(), dst_conn.as_ref(), flags, request)
                .await;
            report.domains.push(outcome);
        }

        close(src_conn.as_ref(), HostRole::Source).await;
        close(dst_conn.as_ref(), HostRole::Destination).await;

        report.finished_at = Utc::now();
        info!(
            source = %report.source,
            destination = %report.destination,
            migrated = report.migrated_count(),
            skipped = report.skipped_count(),
            failed = report.failed_count(),
            "Migration finished"
        );
        Ok(report)
    }

    /// Look up source and destination, before any connection is opened
    fn resolve_hosts(&self, request: &MigrationRequest) -> Result<(&Host, &Host), MigrateError> {
        let src_host = self
            .registry
            .host(&request.source)
            .ok_or_else(|| MigrateError::SourceHostNotFound(request.source.clone()))?;

        let dst_host = match &request.destination {
            DestinationRef::Group(group) => {
                let picked = self
                    .registry
                    .pick_host_from_group(group, &[src_host.name()])?;
                info!(group = %group, host = %picked.name(), "Picked destination host from group");
                picked
            }
            DestinationRef::Host(name) => {
                let host = self
                    .registry
                    .host(name)
                    .ok_or_else(|| MigrateError::DestinationHostNotFound(name.clone()))?;
                if host == src_host {
                    return Err(MigrateError::SameHost);
                }
                host
            }
        };

        Ok((src_host, dst_host))
    }

    async fn open(&self, role: HostRole, host: &Host) -> Result<Box<dyn Connection>, MigrateError> {
        match self.hypervisor.open(host.uri()).await {
            Ok(conn) => {
                debug!(role = %role, host = %host.name(), uri = %host.uri(), "Opened connection");
                Ok(conn)
            }
            Err(source) => {
                error!(
                    role = %role,
                    host = %host.name(),
                    uri = %host.uri(),
                    error = %source,
                    "Cannot connect to hypervisor"
                );
                Err(MigrateError::Connection {
                    role,
                    host: host.name().to_string(),
                    source,
                })
            }
        }
    }

    async fn collect_domains(
        &self,
        conn: &dyn Connection,
        host: &Host,
        selector: &DomainSelector,
    ) -> Result<Vec<Box<dyn Domain>>, MigrateError> {
        let mut domains = Vec::new();

        match selector {
            DomainSelector::All => {
                let ids = conn
                    .list_active_domain_ids()
                    .await
                    .map_err(|source| MigrateError::ListDomains {
                        host: host.name().to_string(),
                        source,
                    })?;

                for id in ids {
                    match conn.lookup_by_id(id).await {
                        Ok(dom) => domains.push(dom),
                        Err(e) => {
                            warn!(id, host = %host.name(), error = %e, "Cannot find domain with ID, skipping");
                        }
                    }
                }
            }
            DomainSelector::Named(names) => {
                for name in names {
                    match conn.lookup_by_name(name).await {
                        Ok(dom) => domains.push(dom),
                        Err(e) => {
                            debug!(error = %e, "domain lookup failed");
                            error!(domain = %name, host = %host.name(), "Cannot find domain with name");
                            return Err(MigrateError::DomainNotFound {
                                domain: name.clone(),
                                host: host.name().to_string(),
                            });
                        }
                    }
                }
            }
        }

        Ok(domains)
    }

    /// Run the full sequence for one domain; never fails the batch
    async fn migrate_domain(
        &self,
        dom: &dyn Domain,
        src_conn: &dyn Connection,
        dst_conn: &dyn Connection,
        flags: MigrateFlags,
        request: &MigrationRequest,
    ) -> DomainOutcome {
        let name = dom.name().to_string();
        let mut phase = DomainPhase::Pending;
        info!(domain = %name, "Migrating domain");

        let active = match dom.is_active().await {
            Ok(active) => active,
            Err(e) => {
                error!(domain = %name, error = %e, "Cannot query domain state, skipping");
                advance(&name, &mut phase, DomainPhase::Skipped);
                return skipped(name, SkipReason::StateUnavailable(e.to_string()));
            }
        };

        match decide(active, flags, request.auto_stop) {
            Decision::Skip(reason) => {
                match reason {
                    SkipReason::ActiveWithoutStop => {
                        error!(domain = %name, "Domain is running, cannot perform offline migration");
                    }
                    _ => warn!(domain = %name, reason = %reason, "Skipping domain"),
                }
                advance(&name, &mut phase, DomainPhase::Skipped);
                return skipped(name, reason);
            }
            Decision::ShutdownThenMigrate => {
                advance(&name, &mut phase, DomainPhase::ShuttingDown);
                if let Err(reason) = self.shut_down(dom).await {
                    advance(&name, &mut phase, DomainPhase::Skipped);
                    return skipped(name, reason);
                }
            }
            Decision::Migrate => {}
        }

        let offline = flags.contains(MigrateFlags::OFFLINE);
        advance(&name, &mut phase, DomainPhase::Migrating);

        match dom.migrate(dst_conn, flags).await {
            Ok(new_dom) => {
                advance(&name, &mut phase, DomainPhase::Migrated);
                let (started, start_error) = if offline && request.auto_start {
                    start_after_offline(new_dom.as_ref()).await
                } else {
                    (false, None)
                };
                info!(domain = %name, destination = %dst_conn.uri(), "Domain migrated");
                DomainOutcome::new(
                    name,
                    Outcome::Migrated {
                        offline,
                        started,
                        start_error,
                    },
                )
            }
            Err(e) => {
                advance(&name, &mut phase, DomainPhase::MigrationFailed);
                error!(
                    domain = %name,
                    source = %src_conn.uri(),
                    destination = %dst_conn.uri(),
                    error = %e,
                    "Migration failed"
                );

                advance(&name, &mut phase, DomainPhase::Recovering);
                let recovery = self.recover(dom, dst_conn).await;
                let next = if recovery == Recovery::Restarted {
                    DomainPhase::Restarted
                } else {
                    DomainPhase::LeftAsIs
                };
                advance(&name, &mut phase, next);

                DomainOutcome::new(name, Outcome::failed(e.to_string(), recovery))
            }
        }
    }

    /// Shut `dom` down and wait until it reports inactive
    async fn shut_down(&self, dom: &dyn Domain) -> Result<(), SkipReason> {
        let name = dom.name();
        warn!(domain = %name, "Domain is running, shutting down before offline migration");

        if let Err(e) = dom.shutdown().await {
            error!(domain = %name, error = %e, "Shutdown request failed");
            return Err(SkipReason::ShutdownFailed(e.to_string()));
        }

        info!(domain = %name, "Waiting for domain to shut down");
        let started = Instant::now();
        loop {
            match dom.is_active().await {
                Ok(false) => break,
                Ok(true) => {}
                Err(e) => {
                    error!(domain = %name, error = %e, "Cannot query domain state during shutdown");
                    return Err(SkipReason::StateUnavailable(e.to_string()));
                }
            }

            if let Some(limit) = self.settings.shutdown_timeout
                && started.elapsed() >= limit
            {
                error!(domain = %name, timeout = ?limit, "Domain did not shut down in time, skipping");
                return Err(SkipReason::ShutdownTimeout {
                    waited_secs: limit.as_secs(),
                });
            }

            sleep(self.settings.poll_interval).await;
        }

        info!(domain = %name, "Domain has shut down");
        Ok(())
    }

    /// Best-effort recovery after a failed migrate call
    ///
    /// The destination is checked once; then the source handle is polled and
    /// the domain restarted on the source if it is seen stopped. This does
    /// not prove where the guest ended up.
    async fn recover(&self, dom: &dyn Domain, dst_conn: &dyn Connection) -> Recovery {
        let name = dom.name();

        if let Ok(remote) = dst_conn.lookup_by_name(name).await
            && let Ok(true) = remote.is_active().await
        {
            warn!(
                domain = %name,
                destination = %dst_conn.uri(),
                "Domain is running on destination after failed migration, not restarting on source"
            );
            return Recovery::RunningOnDestination;
        }

        let attempts = self.settings.recovery_attempts;
        if attempts == 0 {
            return Recovery::Unknown("recovery disabled".to_string());
        }

        for attempt in 1..=attempts {
            match dom.is_active().await {
                Ok(false) => {
                    warn!(domain = %name, "Starting domain after migration failure");
                    return match dom.create().await {
                        Ok(()) => Recovery::Restarted,
                        Err(e) => {
                            error!(domain = %name, error = %e, "Cannot restart domain on source");
                            Recovery::RestartFailed(e.to_string())
                        }
                    };
                }
                Ok(true) => {}
                Err(e) => {
                    error!(domain = %name, error = %e, "Cannot query domain state after migration failure");
                    return Recovery::Unknown(e.to_string());
                }
            }
            if attempt < attempts {
                sleep(self.settings.poll_interval).await;
            }
        }

        info!(domain = %name, "Domain still running on source, no restart needed");
        Recovery::StillRunning
    }
}

/// Start a freshly migrated domain unless it already runs
async fn start_after_offline(dom: &dyn Domain) -> (bool, Option<String>) {
    match dom.is_active().await {
        Ok(true) => (false, None),
        Ok(false) => {
            info!(domain = %dom.name(), "Starting domain after offline migration");
            match dom.create().await {
                Ok(()) => (true, None),
                Err(e) => {
                    error!(domain = %dom.name(), error = %e, "Cannot start domain on destination");
                    (false, Some(e.to_string()))
                }
            }
        }
        Err(e) => {
            error!(domain = %dom.name(), error = %e, "Cannot query migrated domain state");
            (false, Some(e.to_string()))
        }
    }
}

fn skipped(domain: String, reason: SkipReason) -> DomainOutcome {
    DomainOutcome::new(domain, Outcome::Skipped { reason })
}

fn advance(domain: &str, phase: &mut DomainPhase, next: DomainPhase) {
    debug_assert!(
        phase.can_transition_to(next),
        "invalid domain phase transition {phase} -> {next}"
    );
    debug!(domain = %domain, from = %phase, to = %next, "domain phase");
    *phase = next;
}

async fn close(conn: &dyn Connection, role: HostRole) {
    match conn.close().await {
        Ok(()) => debug!(role = %role, uri = %conn.uri(), "Closed connection"),
        Err(e) => warn!(role = %role, uri = %conn.uri(), error = %e, "Failed to close connection"),
    }
}
