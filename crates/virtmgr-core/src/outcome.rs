//! Per-domain outcomes and the batch report

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use virtmgr_virt::MigrateFlags;

/// Why a domain was left untouched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// Live migration requested for a stopped domain
    InactiveForLive,
    /// Offline migration requested for a running domain without stop permission
    ActiveWithoutStop,
    /// Domain did not power off within the shutdown timeout
    ShutdownTimeout { waited_secs: u64 },
    /// Shutdown request was rejected
    ShutdownFailed(String),
    /// Domain state could not be queried
    StateUnavailable(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InactiveForLive => write!(f, "offline, cannot live migrate"),
            Self::ActiveWithoutStop => write!(f, "running, cannot perform offline migration"),
            Self::ShutdownTimeout { waited_secs } => {
                write!(f, "did not shut down within {waited_secs}s")
            }
            Self::ShutdownFailed(e) => write!(f, "shutdown failed: {e}"),
            Self::StateUnavailable(e) => write!(f, "state unavailable: {e}"),
        }
    }
}

/// What the recovery step found or did after a failed migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Recovery {
    /// Domain was found stopped on the source and started again
    Restarted,
    /// Domain stayed active on the source for the whole window
    StillRunning,
    /// Domain is active on the destination, source left alone
    RunningOnDestination,
    /// Restart on the source was attempted and failed
    RestartFailed(String),
    /// Domain state could not be determined
    Unknown(String),
}

impl Recovery {
    /// Whether the domain is known to be running somewhere
    #[must_use]
    pub fn is_recovered(&self) -> bool {
        matches!(
            self,
            Self::Restarted | Self::StillRunning | Self::RunningOnDestination
        )
    }
}

impl fmt::Display for Recovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Restarted => write!(f, "restarted on source"),
            Self::StillRunning => write!(f, "still running on source"),
            Self::RunningOnDestination => write!(f, "running on destination"),
            Self::RestartFailed(e) => write!(f, "restart on source failed: {e}"),
            Self::Unknown(e) => write!(f, "state unknown: {e}"),
        }
    }
}

/// Result of one domain's migrate sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Migrated {
        offline: bool,
        started: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        start_error: Option<String>,
    },
    Skipped {
        reason: SkipReason,
    },
    FailedRecovered {
        error: String,
        recovery: Recovery,
    },
    FailedUnrecovered {
        error: String,
        recovery: Recovery,
    },
}

impl Outcome {
    /// Classify a failed migration by its recovery result
    #[must_use]
    pub fn failed(error: String, recovery: Recovery) -> Self {
        if recovery.is_recovered() {
            Self::FailedRecovered { error, recovery }
        } else {
            Self::FailedUnrecovered { error, recovery }
        }
    }
}

/// Outcome tagged with the domain name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainOutcome {
    pub domain: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl DomainOutcome {
    pub fn new(domain: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            domain: domain.into(),
            outcome,
        }
    }

    #[must_use]
    pub fn is_migrated(&self) -> bool {
        matches!(self.outcome, Outcome::Migrated { .. })
    }

    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, Outcome::Skipped { .. })
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self.outcome,
            Outcome::FailedRecovered { .. } | Outcome::FailedUnrecovered { .. }
        )
    }
}

/// Everything one migrate invocation did
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub source: String,
    pub destination: String,
    pub flags: MigrateFlags,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub domains: Vec<DomainOutcome>,
}

impl MigrationReport {
    #[must_use]
    pub fn migrated_count(&self) -> usize {
        self.domains.iter().filter(|d| d.is_migrated()).count()
    }

    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.domains.iter().filter(|d| d.is_skipped()).count()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.domains.iter().filter(|d| d.is_failure()).count()
    }

    /// Whether any domain failed to migrate
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.domains.iter().any(DomainOutcome::is_failure)
    }
}
