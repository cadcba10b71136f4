//! Collection service.
//!
//! Orchestrates one garbage-collection run:
//!
//! 1. Build the in-use index once from the workload source.
//! 2. List the project's repositories once.
//! 3. Fetch, build, evaluate and delete each repository on a bounded pool
//!    of blocking workers.
//!
//! A failure in step 1 or 2 aborts the run before any deletion. A failure
//! while collecting one repository is recorded in that repository's report
//! and the rest of the run continues.

use super::report::{RepositoryReport, RunReport};
use crate::cluster::WorkloadSource;
use crate::gc::{DeletionExecutor, DeletionResult, EvictionDecision, RetentionPolicy, evaluate};
use crate::inventory::{InUseIndex, build_inventory};
use crate::registry::RegistryBackend;
use crate::{Error, Result, current_timestamp_ms};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// Default number of repositories processed in parallel.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Runs retention-driven garbage collection over a registry project.
pub struct CollectionService {
    registry: Arc<dyn RegistryBackend>,
    workloads: Arc<dyn WorkloadSource>,
    policy: Arc<RetentionPolicy>,
    project: String,
    concurrency: usize,
    dry_run: bool,
    cancel: Arc<AtomicBool>,
    now_ms: Option<i64>,
}

impl CollectionService {
    /// Creates a new collection service.
    #[must_use]
    pub fn new(
        registry: Arc<dyn RegistryBackend>,
        workloads: Arc<dyn WorkloadSource>,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            registry,
            workloads,
            policy: Arc::new(policy),
            project: String::new(),
            concurrency: DEFAULT_CONCURRENCY,
            dry_run: false,
            cancel: Arc::new(AtomicBool::new(false)),
            now_ms: None,
        }
    }

    /// Restricts collection to repositories under `project/`.
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    /// Sets the number of repositories processed in parallel (minimum 1).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Suppresses deletions.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Uses an externally owned cancellation flag.
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Evaluates every repository against a fixed clock.
    #[must_use]
    pub const fn with_now_ms(mut self, now_ms: i64) -> Self {
        self.now_ms = Some(now_ms);
        self
    }

    /// Returns the flag that cancels the run when set.
    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Runs collection, deleting evicted digests unless in dry-run mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Collection`] if the in-use index or the repository
    /// catalog cannot be collected. Per-repository failures are reported in
    /// the returned [`RunReport`] instead.
    pub async fn run(&self) -> Result<RunReport> {
        self.collect(self.dry_run).await
    }

    /// Evaluates every repository without deleting anything.
    ///
    /// # Errors
    ///
    /// Same as [`CollectionService::run`].
    pub async fn plan(&self) -> Result<RunReport> {
        self.collect(true).await
    }

    /// Runs one collection pass. The cancel flag is cleared when the pass
    /// ends, so a cancelled service can run again.
    async fn collect(&self, dry_run: bool) -> Result<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!(
            "tagreaper.run",
            run_id = %run_id,
            project = %self.project,
            dry_run
        );
        let result = self.collect_inner(run_id, dry_run).instrument(span).await;
        self.cancel.store(false, Ordering::SeqCst);
        result
    }

    async fn collect_inner(&self, run_id: String, dry_run: bool) -> Result<RunReport> {
        let start = Instant::now();
        let now_ms = self.now_ms.unwrap_or_else(current_timestamp_ms);
        let executor = if dry_run {
            DeletionExecutor::dry_run()
        } else {
            DeletionExecutor::new()
        };

        let index = Arc::new(self.spawn_index_build().await?);
        let repositories = self.list_repositories().await?;
        info!(repositories = repositories.len(), "Listed repositories");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut names = HashMap::new();
        let mut not_started = 0;

        for (position, repository) in repositories.iter().enumerate() {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| Error::OperationFailed {
                    operation: "acquire_worker".to_string(),
                    cause: e.to_string(),
                })?;

            if self.cancel.load(Ordering::SeqCst) {
                not_started = repositories.len() - position;
                warn!(not_started, "Cancellation requested; not starting remaining repositories");
                break;
            }

            let worker = RepositoryWorker {
                registry: Arc::clone(&self.registry),
                index: Arc::clone(&index),
                policy: Arc::clone(&self.policy),
                executor,
                now_ms,
            };
            let name = repository.clone();
            let span = info_span!("tagreaper.repository", repository = %name);

            let handle = tasks.spawn_blocking(move || {
                let _permit = permit;
                let _span = span.enter();
                worker.process(&name)
            });
            names.insert(handle.id(), repository.clone());
        }

        let mut reports = Vec::with_capacity(names.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, report)) => reports.push(report),
                Err(e) => {
                    let repository = names.get(&e.id()).cloned().unwrap_or_default();
                    error!(repository = %repository, error = %e, "Repository worker panicked");
                    reports.push(RepositoryReport::failed(
                        repository,
                        format!("worker failed: {e}"),
                        0,
                    ));
                },
            }
        }
        reports.sort_by(|a, b| a.repository.cmp(&b.repository));

        let report = RunReport {
            run_id,
            dry_run,
            cancelled: not_started > 0 || self.cancel.load(Ordering::SeqCst),
            not_started,
            duration_ms: duration_to_millis(start.elapsed()),
            repositories: reports,
        };

        metrics::counter!(
            "tagreaper_runs_total",
            "status" => if report.has_failures() { "failure" } else { "success" }
        )
        .increment(1);
        metrics::histogram!("tagreaper_run_duration_ms").record(millis_to_f64(report.duration_ms));

        info!(
            repositories = report.repositories.len(),
            digests_checked = report.digests_checked(),
            evicted = report.evicted(),
            deleted = report.deleted(),
            deletion_failures = report.deletion_failures(),
            cancelled = report.cancelled,
            duration_ms = report.duration_ms,
            "Collection run finished: {}",
            report.summary()
        );

        Ok(report)
    }

    async fn spawn_index_build(&self) -> Result<InUseIndex> {
        let registry = Arc::clone(&self.registry);
        let workloads = Arc::clone(&self.workloads);
        let span = info_span!("tagreaper.in_use_index", source = %workloads.name());
        tokio::task::spawn_blocking(move || {
            let _span = span.enter();
            index_from_workloads(workloads.as_ref(), registry.registry_host())
        })
        .await
        .map_err(|e| Error::OperationFailed {
            operation: "build_in_use_index".to_string(),
            cause: e.to_string(),
        })?
    }

    async fn list_repositories(&self) -> Result<Vec<String>> {
        let registry = Arc::clone(&self.registry);
        let project = self.project.clone();
        tokio::task::spawn_blocking(move || registry.list_repositories(&project))
            .await
            .map_err(|e| Error::OperationFailed {
                operation: "list_repositories".to_string(),
                cause: e.to_string(),
            })?
    }
}

fn index_from_workloads(workloads: &dyn WorkloadSource, registry_host: &str) -> Result<InUseIndex> {
    let references = workloads.list_image_references()?;
    let index = InUseIndex::build(&references, registry_host);
    info!(
        source = %workloads.name(),
        references = references.len(),
        repositories = index.repository_count(),
        tags = index.tag_count(),
        "Built in-use index"
    );
    Ok(index)
}

/// Everything a blocking worker needs to collect one repository.
struct RepositoryWorker {
    registry: Arc<dyn RegistryBackend>,
    index: Arc<InUseIndex>,
    policy: Arc<RetentionPolicy>,
    executor: DeletionExecutor,
    now_ms: i64,
}

impl RepositoryWorker {
    fn process(&self, repository: &str) -> RepositoryReport {
        let start = Instant::now();
        let result = self.collect(repository);
        let duration_ms = duration_to_millis(start.elapsed());

        metrics::histogram!("tagreaper_repository_duration_ms").record(millis_to_f64(duration_ms));

        match result {
            Ok((decisions, results)) => {
                let report =
                    RepositoryReport::completed(repository, decisions, &results, duration_ms);
                metrics::counter!("tagreaper_repositories_total", "status" => "success")
                    .increment(1);
                info!(
                    digests_checked = report.digests_checked,
                    protected = report.protected,
                    excluded = report.excluded,
                    evicted = report.evicted,
                    deleted = report.deleted,
                    failures = report.failures.len(),
                    duration_ms,
                    "Repository collected"
                );
                report
            },
            Err(e) => {
                metrics::counter!("tagreaper_repositories_total", "status" => "error")
                    .increment(1);
                warn!(error = %e, duration_ms, "Repository collection failed");
                RepositoryReport::failed(repository, &e, duration_ms)
            },
        }
    }

    fn collect(
        &self,
        repository: &str,
    ) -> Result<(Vec<EvictionDecision>, Vec<DeletionResult>)> {
        let listing = self.registry.list_manifests(repository)?;
        let inventory = build_inventory(&listing)?;
        debug!(digests = inventory.len(), "Built repository inventory");

        let decisions = evaluate(
            &inventory.digests,
            self.index.tags_for(repository),
            &self.policy,
            self.now_ms,
        );
        metrics::counter!("tagreaper_digests_evaluated_total").increment(decisions.len() as u64);

        let results = self
            .executor
            .execute(repository, &decisions, self.registry.as_ref());
        Ok((decisions, results))
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[allow(clippy::cast_precision_loss)]
const fn millis_to_f64(millis: u64) -> f64 {
    millis as f64
}
