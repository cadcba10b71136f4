//! Collection run reports.

use crate::gc::{DeletionOutcome, DeletionResult, EvictionDecision};
use serde::Serialize;

/// A digest whose deletion failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestFailure {
    /// The digest.
    pub digest: String,
    /// Why the delete failed.
    pub reason: String,
}

/// Outcome of collecting one repository.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepositoryReport {
    /// Repository name.
    pub repository: String,
    /// Number of digests evaluated.
    pub digests_checked: usize,
    /// Digests kept by the recency, in-use or age gate.
    pub protected: usize,
    /// Digests left alone because no tag matched the tag pattern.
    pub excluded: usize,
    /// Digests selected for eviction.
    pub evicted: usize,
    /// Digests actually deleted.
    pub deleted: usize,
    /// Per-digest deletion failures.
    pub failures: Vec<DigestFailure>,
    /// Collection error that aborted this repository.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Per-digest retention decisions.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub decisions: Vec<EvictionDecision>,
    /// Time spent on this repository in milliseconds.
    pub duration_ms: u64,
}

impl RepositoryReport {
    /// Builds a report from retention decisions and deletion results.
    #[must_use]
    pub fn completed(
        repository: impl Into<String>,
        decisions: Vec<EvictionDecision>,
        results: &[DeletionResult],
        duration_ms: u64,
    ) -> Self {
        let protected = decisions
            .iter()
            .filter(|d| d.predicates.is_protected())
            .count();
        let evicted = decisions.iter().filter(|d| d.evict).count();
        let deleted = results
            .iter()
            .filter(|r| r.outcome == DeletionOutcome::Deleted)
            .count();
        let failures = results
            .iter()
            .filter_map(|r| match &r.outcome {
                DeletionOutcome::Failed { reason } => Some(DigestFailure {
                    digest: r.digest.clone(),
                    reason: reason.clone(),
                }),
                DeletionOutcome::Deleted | DeletionOutcome::Skipped => None,
            })
            .collect();

        Self {
            repository: repository.into(),
            digests_checked: decisions.len(),
            protected,
            excluded: decisions.len() - protected - evicted,
            evicted,
            deleted,
            failures,
            error: None,
            decisions,
            duration_ms,
        }
    }

    /// Builds a report for a repository whose collection failed.
    #[must_use]
    pub fn failed(repository: impl Into<String>, error: impl ToString, duration_ms: u64) -> Self {
        Self {
            repository: repository.into(),
            error: Some(error.to_string()),
            duration_ms,
            ..Self::default()
        }
    }

    /// Returns `true` if collection or any deletion failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.error.is_some() || !self.failures.is_empty()
    }

    /// Returns the digests selected for eviction, in decision order.
    #[must_use]
    pub fn evicted_digests(&self) -> Vec<&str> {
        crate::gc::eviction_set(&self.decisions)
    }
}

/// Outcome of a whole collection run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Correlation id of the run.
    pub run_id: String,
    /// Whether deletions were suppressed.
    pub dry_run: bool,
    /// Whether the run was interrupted before every repository started.
    pub cancelled: bool,
    /// Repositories never started because of cancellation.
    pub not_started: usize,
    /// Total run time in milliseconds.
    pub duration_ms: u64,
    /// Per-repository reports, sorted by repository.
    pub repositories: Vec<RepositoryReport>,
}

impl RunReport {
    /// Returns `true` if any repository failed to collect or any deletion
    /// failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.repositories.iter().any(RepositoryReport::has_failures)
    }

    /// Returns the process exit code for this run.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        u8::from(self.has_failures())
    }

    /// Total digests evaluated.
    #[must_use]
    pub fn digests_checked(&self) -> usize {
        self.repositories.iter().map(|r| r.digests_checked).sum()
    }

    /// Total digests selected for eviction.
    #[must_use]
    pub fn evicted(&self) -> usize {
        self.repositories.iter().map(|r| r.evicted).sum()
    }

    /// Total digests deleted.
    #[must_use]
    pub fn deleted(&self) -> usize {
        self.repositories.iter().map(|r| r.deleted).sum()
    }

    /// Total deletion failures.
    #[must_use]
    pub fn deletion_failures(&self) -> usize {
        self.repositories.iter().map(|r| r.failures.len()).sum()
    }

    /// Repositories whose collection failed.
    #[must_use]
    pub fn failed_repositories(&self) -> Vec<&RepositoryReport> {
        self.repositories
            .iter()
            .filter(|r| r.error.is_some())
            .collect()
    }

    /// Finds the report for `repository`.
    #[must_use]
    pub fn repository(&self, repository: &str) -> Option<&RepositoryReport> {
        self.repositories.iter().find(|r| r.repository == repository)
    }

    /// Returns a one-line summary of the run.
    #[must_use]
    pub fn summary(&self) -> String {
        let verb = if self.dry_run { "would delete" } else { "deleted" };
        let deleted = if self.dry_run {
            self.evicted()
        } else {
            self.deleted()
        };

        let mut summary = format!(
            "{} repositories, {} digests checked, {} evicted, {verb} {deleted}",
            self.repositories.len(),
            self.digests_checked(),
            self.evicted(),
        );

        let failed = self.failed_repositories().len();
        if failed > 0 {
            summary.push_str(&format!(", {failed} repositories failed"));
        }
        let failures = self.deletion_failures();
        if failures > 0 {
            summary.push_str(&format!(", {failures} deletions failed"));
        }
        if self.cancelled {
            summary.push_str(&format!(", cancelled with {} not started", self.not_started));
        }
        summary
    }
}
