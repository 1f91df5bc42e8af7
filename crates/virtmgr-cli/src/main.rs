//! virtmgr CLI
//!
//! Command-line interface for migrating libvirt domains between hosts

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::builder::NonEmptyStringValueParser;
use clap::{ArgGroup, Args, Parser, Subcommand};
use color_eyre::Result;
use tracing::{debug, error};
use virtmgr_core::{
    Config, DestinationRef, DomainSelector, MigrationRequest, Orchestrator, registry::LOCALHOST,
};
use virtmgr_exec::LocalExecutor;
use virtmgr_virt::VirshHypervisor;

mod config;
mod logging;
mod output;

use logging::LogLevel;

/// Exit code for configuration and fatal errors
const EXIT_FATAL: u8 = 1;
/// Exit code when at least one domain failed to migrate
const EXIT_DOMAIN_FAILURES: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "virtmgr", version)]
#[command(about = "Libvirt domain migration manager", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "VIRTMGR_CONFIG")]
    config: Option<PathBuf>,

    /// Logging level
    #[arg(
        long,
        global = true,
        value_enum,
        env = "LOG_LEVEL",
        default_value = "info",
        ignore_case = true
    )]
    log_level: LogLevel,

    /// Log timestamps to console
    #[arg(long, global = true)]
    log_timestamp: bool,

    /// Path to log file, disables console logging
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Migrate domains
    Migrate(MigrateArgs),
    /// List configured hosts and groups
    Hosts,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("domains").required(true).args(["name", "all"])))]
#[command(group(ArgGroup::new("target").required(true).args(["dst_host", "dst_group"])))]
struct MigrateArgs {
    /// Host to migrate from
    #[arg(short, long, default_value = LOCALHOST)]
    src_host: String,

    /// Comma separated list of domains to migrate
    #[arg(
        short,
        long,
        value_delimiter = ',',
        value_parser = NonEmptyStringValueParser::new()
    )]
    name: Vec<String>,

    /// Migrate all active domains on source host
    #[arg(short, long)]
    all: bool,

    /// Host to migrate to
    #[arg(short = 't', long)]
    dst_host: Option<String>,

    /// Group to migrate to, automatically picks a host
    #[arg(short = 'g', long)]
    dst_group: Option<String>,

    /// Do not automatically start domains after offline migrations
    #[arg(long)]
    no_start: bool,

    /// Do not automatically shut down running domains for offline migrations
    #[arg(long)]
    no_stop: bool,

    /// Seconds to wait for a domain to shut down, 0 waits forever
    #[arg(long, value_name = "SECS")]
    shutdown_timeout: Option<u64>,

    /// Print the migration report as JSON
    #[arg(long)]
    json: bool,
}

impl MigrateArgs {
    fn request(&self) -> MigrationRequest {
        let destination = match (&self.dst_host, &self.dst_group) {
            (_, Some(group)) => DestinationRef::Group(group.clone()),
            (Some(host), None) => DestinationRef::Host(host.clone()),
            (None, None) => DestinationRef::Host(String::new()),
        };
        let selector = if self.all {
            DomainSelector::All
        } else {
            let mut names: Vec<String> = Vec::with_capacity(self.name.len());
            for name in self.name.iter().map(|n| n.trim()) {
                if !name.is_empty() && !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
            DomainSelector::Named(names)
        };

        MigrationRequest {
            source: self.src_host.clone(),
            destination,
            selector,
            auto_stop: !self.no_stop,
            auto_start: !self.no_start,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::init(cli.log_level, cli.log_timestamp, cli.log_file.as_deref())?;

    let path = config::resolve_path(cli.config);
    debug!(path = %path.display(), "Reading config file");
    let config = match Config::load(&path) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return Ok(ExitCode::from(EXIT_FATAL));
        }
    };

    match cli.command {
        Commands::Hosts => {
            print!("{}", output::render_hosts(&config.registry));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Migrate(args) => migrate(config, &args).await,
    }
}

async fn migrate(config: Config, args: &MigrateArgs) -> Result<ExitCode> {
    let mut settings = config.migration;
    if let Some(secs) = args.shutdown_timeout {
        settings.shutdown_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }

    let hypervisor = VirshHypervisor::new(Arc::new(LocalExecutor::new()));
    let orchestrator = Orchestrator::new(Arc::new(config.registry), Arc::new(hypervisor), settings);

    let report = match orchestrator.migrate(&args.request()).await {
        Ok(report) => report,
        Err(e) => {
            error!("{e}");
            return Ok(ExitCode::from(EXIT_FATAL));
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", output::render_report(&report));
    }

    if report.has_failures() {
        Ok(ExitCode::from(EXIT_DOMAIN_FAILURES))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
