//! Per-domain migration state machine types

use std::fmt;

use virtmgr_virt::MigrateFlags;

use crate::outcome::SkipReason;

/// What to do with a domain before issuing the migrate call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Migrate in the domain's current state
    Migrate,
    /// Shut the domain down, wait until it is off, then migrate
    ShutdownThenMigrate,
    /// Leave the domain untouched
    Skip(SkipReason),
}

/// Decide how a domain is handled given its state and the flag policy
///
/// LIVE and OFFLINE may both be set; an inactive domain is then skipped
/// because of LIVE and an active one is treated as offline.
#[must_use]
pub fn decide(active: bool, flags: MigrateFlags, auto_stop: bool) -> Decision {
    let live = flags.contains(MigrateFlags::LIVE);
    let offline = flags.contains(MigrateFlags::OFFLINE);

    if !active && live {
        return Decision::Skip(SkipReason::InactiveForLive);
    }
    if active && offline {
        return if auto_stop {
            Decision::ShutdownThenMigrate
        } else {
            Decision::Skip(SkipReason::ActiveWithoutStop)
        };
    }
    Decision::Migrate
}

/// Phases a domain goes through during one migrate invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainPhase {
    Pending,
    ShuttingDown,
    Migrating,
    Migrated,
    MigrationFailed,
    Recovering,
    Restarted,
    LeftAsIs,
    Skipped,
}

impl DomainPhase {
    /// Check whether moving to `next` is a legal transition
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use DomainPhase::{
            LeftAsIs, Migrated, Migrating, MigrationFailed, Pending, Recovering, Restarted,
            ShuttingDown, Skipped,
        };

        matches!(
            (self, next),
            (Pending, ShuttingDown | Migrating | Skipped)
                | (ShuttingDown, Migrating | Skipped)
                | (Migrating, Migrated | MigrationFailed)
                | (MigrationFailed, Recovering)
                | (Recovering, Restarted | LeftAsIs)
        )
    }
}

impl fmt::Display for DomainPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::ShuttingDown => "shutting_down",
            Self::Migrating => "migrating",
            Self::Migrated => "migrated",
            Self::MigrationFailed => "migration_failed",
            Self::Recovering => "recovering",
            Self::Restarted => "restarted",
            Self::LeftAsIs => "left_as_is",
            Self::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}
