//! Binary entry point for tagreaper.
//!
//! This binary provides the CLI interface for retention-driven registry
//! garbage collection.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tagreaper::cli::{self, OutputFormat};
use tagreaper::cluster::WorkloadSource;
use tagreaper::config::{CONFIG_PATH_ENV, ReaperConfig};
use tagreaper::observability::{self, ObservabilityConfig};
use tagreaper::registry::RegistryBackend;
use tagreaper::services::{CollectionService, RunReport};
use tagreaper::{Error, InUseIndex, Result};

/// Tagreaper - retention-driven garbage collection for container registries.
#[derive(Parser)]
#[command(name = "tagreaper")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Evaluate every repository and delete evicted digests.
    Run {
        /// Report what would be deleted without deleting.
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Show per-digest retention decisions without deleting anything.
    Plan {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Show the tags referenced by cluster workloads.
    InUse {
        /// Read workloads from a `kubectl get pods,replicasets -A -o json` export.
        #[arg(long)]
        workloads_file: Option<PathBuf>,
    },

    /// Show the resolved configuration.
    Config,
}

/// Settings that override the config file and environment.
#[derive(Args, Default)]
struct Overrides {
    /// Project prefix whose repositories are collected.
    #[arg(long)]
    project: Option<String>,

    /// Number of most recent digests always kept per repository.
    #[arg(long, allow_negative_numbers = true)]
    keep_count: Option<i64>,

    /// Digests younger than this many days are kept.
    #[arg(long, allow_negative_numbers = true)]
    max_age_days: Option<i64>,

    /// Only digests with a tag matching this pattern (or no tags) are eligible.
    #[arg(long)]
    tag_pattern: Option<String>,

    /// Repositories processed in parallel.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Read workloads from a `kubectl get pods,replicasets -A -o json` export.
    #[arg(long)]
    workloads_file: Option<PathBuf>,
}

impl Overrides {
    fn apply(self, config: &mut ReaperConfig) {
        if let Some(project) = self.project {
            config.project = Some(project);
        }
        if let Some(keep_count) = self.keep_count {
            config.keep_count = keep_count;
        }
        if let Some(max_age_days) = self.max_age_days {
            config.max_age_days = max_age_days;
        }
        if let Some(tag_pattern) = self.tag_pattern {
            config.tag_pattern = tag_pattern;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(path) = self.workloads_file {
            config.cluster.workloads_file = Some(path);
        }
    }
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut config = match ReaperConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::from(e.exit_code());
        },
    };

    let command = match cli.command {
        Commands::Run { dry_run, overrides } => {
            overrides.apply(&mut config);
            config.dry_run |= dry_run;
            Command::Run
        },
        Commands::Plan { overrides } => {
            overrides.apply(&mut config);
            Command::Plan
        },
        Commands::InUse { workloads_file } => {
            if workloads_file.is_some() {
                config.cluster.workloads_file = workloads_file;
            }
            Command::InUse
        },
        Commands::Config => Command::Config,
    };

    let mut observability =
        match observability::init(&ObservabilityConfig::from_reaper_config(&config, cli.verbose)) {
            Ok(handle) => handle,
            Err(e) => {
                eprintln!("Failed to initialize observability: {e}");
                return ExitCode::from(e.exit_code());
            },
        };

    let result = run_command(command, &config, cli.output);
    observability.shutdown();

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        },
    }
}

/// Command selected after overrides are applied.
enum Command {
    Run,
    Plan,
    InUse,
    Config,
}

/// Runs the selected command, returning the process exit code.
fn run_command(command: Command, config: &ReaperConfig, output: OutputFormat) -> Result<u8> {
    match command {
        Command::Run => {
            let service = cli::build_service(config)?;
            let report = collect(&service, false)?;
            println!("{}", cli::render_run_report(&report, output)?);
            Ok(report.exit_code())
        },
        Command::Plan => {
            let service = cli::build_service(config)?;
            let report = collect(&service, true)?;
            println!("{}", cli::render_plan(&report, output)?);
            Ok(report.exit_code())
        },
        Command::InUse => {
            let index = in_use_index(config)?;
            print!("{}", cli::render_in_use(&index, output)?);
            Ok(0)
        },
        Command::Config => {
            print!("{}", cli::render_config(config));
            Ok(0)
        },
    }
}

/// Drives a collection run on a multi-threaded runtime.
///
/// The service (and its blocking HTTP clients) is built before the runtime
/// and dropped after it.
fn collect(service: &CollectionService, plan: bool) -> Result<RunReport> {
    let cancel = service.cancel_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        if cancel.swap(true, Ordering::SeqCst) {
            eprintln!("Second interrupt, exiting");
            std::process::exit(130);
        }
        eprintln!("Interrupted; finishing in-flight repositories");
    }) {
        tracing::warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("tagreaper-worker")
        .build()
        .map_err(|e| Error::OperationFailed {
            operation: "runtime_init".to_string(),
            cause: e.to_string(),
        })?;

    runtime.block_on(async {
        if plan {
            service.plan().await
        } else {
            service.run().await
        }
    })
}

/// Builds the in-use index without touching the registry.
fn in_use_index(config: &ReaperConfig) -> Result<InUseIndex> {
    let registry = cli::registry_backend(config)?;
    let source = cli::workload_source(config)?;
    let references = source.list_image_references()?;
    Ok(InUseIndex::build(&references, registry.registry_host()))
}
