//! Plain text rendering for reports and the host listing

use std::fmt::Write;

use virtmgr_core::{MigrationReport, Outcome, Registry};

/// Render the host and group tables
#[must_use]
pub fn render_hosts(registry: &Registry) -> String {
    let mut out = String::new();
    let width = registry
        .hosts()
        .map(|h| h.name().len())
        .max()
        .unwrap_or(0)
        .max("HOST".len());

    let _ = writeln!(out, "{:<width$}  {:<10}  URI", "HOST", "GROUP");
    for host in registry.hosts() {
        let implicit = if registry.is_implicit(host) {
            " (implicit)"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "{:<width$}  {:<10}  {}{implicit}",
            host.name(),
            host.group(),
            host.uri()
        );
    }

    let _ = writeln!(out);
    for group in registry.groups() {
        let _ = writeln!(out, "group {}", group.name());
        let _ = writeln!(out, "  same group:      {}", group.same_group_flags());
        let _ = writeln!(out, "  different group: {}", group.different_group_flags());
    }
    out
}

/// Render a migration report, one line per domain plus a summary
#[must_use]
pub fn render_report(report: &MigrationReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} -> {} [{}]",
        report.source, report.destination, report.flags
    );

    for entry in &report.domains {
        let detail = match &entry.outcome {
            Outcome::Migrated {
                offline,
                started,
                start_error,
            } => {
                let mode = if *offline { "offline" } else { "live" };
                match (started, start_error) {
                    (_, Some(e)) => format!("migrated ({mode}), start failed: {e}"),
                    (true, None) => format!("migrated ({mode}), started"),
                    (false, None) => format!("migrated ({mode})"),
                }
            }
            Outcome::Skipped { reason } => format!("skipped: {reason}"),
            Outcome::FailedRecovered { error, recovery }
            | Outcome::FailedUnrecovered { error, recovery } => {
                format!("failed: {error} ({recovery})")
            }
        };
        let _ = writeln!(out, "  {}: {detail}", entry.domain);
    }

    let _ = writeln!(
        out,
        "{} migrated, {} skipped, {} failed",
        report.migrated_count(),
        report.skipped_count(),
        report.failed_count()
    );
    out
}
