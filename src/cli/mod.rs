//! CLI command implementations.
//!
//! Each submodule renders the output of one `tagreaper` subcommand. Rendering
//! is kept apart from printing so the binary decides where output goes.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `run` | Evaluate every repository and delete evicted digests |
//! | `plan` | Evaluate every repository and show per-digest decisions |
//! | `in-use` | Show the tags referenced by cluster workloads |
//! | `config` | Show the resolved configuration |
//!
//! # Example Usage
//!
//! ```bash
//! # Preview what a run would delete
//! tagreaper plan --keep-count 5 --max-age-days 90
//!
//! # Collect, reading workloads from a kubectl export
//! kubectl get pods,replicasets -A -o json > workloads.json
//! tagreaper run --workloads-file workloads.json
//! ```

mod config;
mod in_use;
mod plan;
mod run;

pub use config::render_config;
pub use in_use::render_in_use;
pub use plan::render_plan;
pub use run::render_run_report;

use crate::cluster::{KubeApiSource, WorkloadFileSource, WorkloadSource};
use crate::config::ReaperConfig;
use crate::registry::{HttpRegistry, RegistryBackend};
use crate::services::CollectionService;
use crate::{Error, Result};
use serde::Serialize;
use std::sync::Arc;

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Builds the registry backend from configuration.
///
/// Must be called outside of an async context.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the registry URL is missing or bad.
pub fn registry_backend(config: &ReaperConfig) -> Result<Arc<dyn RegistryBackend>> {
    Ok(Arc::new(HttpRegistry::new(config.registry_config()?)?))
}

/// Builds the workload source from configuration.
///
/// A workloads file takes precedence over the cluster API.
///
/// # Errors
///
/// Returns an error if the cluster API client cannot be built.
pub fn workload_source(config: &ReaperConfig) -> Result<Arc<dyn WorkloadSource>> {
    match &config.cluster.workloads_file {
        Some(path) => Ok(Arc::new(WorkloadFileSource::new(path))),
        None => Ok(Arc::new(KubeApiSource::new(&config.kube_config())?)),
    }
}

/// Builds a collection service from validated configuration.
///
/// # Errors
///
/// Returns [`Error::Policy`] or [`Error::InvalidInput`] if the configuration
/// does not validate, before any network access.
pub fn build_service(config: &ReaperConfig) -> Result<CollectionService> {
    let policy = config.validate()?;
    let registry = registry_backend(config)?;
    let workloads = workload_source(config)?;

    Ok(CollectionService::new(registry, workloads, policy)
        .with_project(config.project()?)
        .with_concurrency(config.concurrency)
        .with_dry_run(config.dry_run))
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| Error::OperationFailed {
        operation: "render_json".to_string(),
        cause: e.to_string(),
    })
}

/// Shortens a digest for tabular output.
fn short_digest(digest: &str) -> &str {
    let (algorithm, hex) = digest.split_once(':').unwrap_or(("", digest));
    let keep = algorithm.len() + usize::from(!algorithm.is_empty()) + hex.len().min(12);
    digest.get(..keep).unwrap_or(digest)
}
