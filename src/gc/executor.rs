//! Deletion executor.
//!
//! Applies an eviction set by calling a [`DigestDeleter`] once per evicted
//! digest. Failures are recorded per digest and the batch continues.

use super::retention::EvictionDecision;
use crate::Result;
use serde::Serialize;
use tracing::{debug, warn};

/// Deletes a digest (and every tag pointing at it) from a repository.
///
/// Implementations should treat an already-absent digest as success.
pub trait DigestDeleter: Send + Sync {
    /// Deletes `digest` from `repository`.
    ///
    /// `tags` lists the tags currently naming the digest, for registries
    /// that require tags to be removed before the manifest.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Deletion`] if the registry rejects the delete.
    fn delete_digest(&self, repository: &str, digest: &str, tags: &[String]) -> Result<()>;
}

/// Outcome of one digest deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeletionOutcome {
    /// The digest was deleted.
    Deleted,
    /// The delete call failed.
    Failed {
        /// Why the delete failed.
        reason: String,
    },
    /// Dry run; nothing was deleted.
    Skipped,
}

/// Per-digest deletion result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionResult {
    /// The digest the delete was issued for.
    pub digest: String,
    /// What happened.
    pub outcome: DeletionOutcome,
}

impl DeletionResult {
    /// Returns `true` if the delete failed.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self.outcome, DeletionOutcome::Failed { .. })
    }
}

/// Executes deletions for a repository's eviction set.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeletionExecutor {
    dry_run: bool,
}

impl DeletionExecutor {
    /// Creates an executor that deletes for real.
    #[must_use]
    pub const fn new() -> Self {
        Self { dry_run: false }
    }

    /// Creates an executor that only reports what it would delete.
    #[must_use]
    pub const fn dry_run() -> Self {
        Self { dry_run: true }
    }

    /// Returns `true` if this executor never deletes.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Deletes every digest in `decisions` marked for eviction.
    ///
    /// Digests not marked `evict` are ignored. Each evicted digest yields
    /// exactly one result, in decision order.
    pub fn execute(
        &self,
        repository: &str,
        decisions: &[EvictionDecision],
        deleter: &dyn DigestDeleter,
    ) -> Vec<DeletionResult> {
        decisions
            .iter()
            .filter(|decision| decision.evict)
            .map(|decision| {
                let outcome = self.delete_one(repository, decision, deleter);
                DeletionResult {
                    digest: decision.digest.clone(),
                    outcome,
                }
            })
            .collect()
    }

    fn delete_one(
        &self,
        repository: &str,
        decision: &EvictionDecision,
        deleter: &dyn DigestDeleter,
    ) -> DeletionOutcome {
        if self.dry_run {
            debug!(
                repository,
                digest = %decision.digest,
                "Dry run: would delete digest"
            );
            return DeletionOutcome::Skipped;
        }

        match deleter.delete_digest(repository, &decision.digest, &decision.tags) {
            Ok(()) => {
                metrics::counter!("tagreaper_digests_deleted_total").increment(1);
                debug!(repository, digest = %decision.digest, "Deleted digest");
                DeletionOutcome::Deleted
            },
            Err(e) => {
                metrics::counter!("tagreaper_deletion_failures_total").increment(1);
                warn!(
                    repository,
                    digest = %decision.digest,
                    error = %e,
                    "Failed to delete digest"
                );
                DeletionOutcome::Failed {
                    reason: e.to_string(),
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::gc::Predicates;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingDeleter {
        calls: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl DigestDeleter for RecordingDeleter {
        fn delete_digest(&self, _repository: &str, digest: &str, _tags: &[String]) -> Result<()> {
            self.calls
                .lock()
                .map_err(|e| Error::collection("test", e))?
                .push(digest.to_string());
            if self.fail_on == Some(digest) {
                return Err(Error::Deletion {
                    digest: digest.to_string(),
                    cause: "HTTP 500".to_string(),
                });
            }
            Ok(())
        }
    }

    fn decision(digest: &str, evict: bool) -> EvictionDecision {
        EvictionDecision {
            digest: digest.to_string(),
            tags: Vec::new(),
            created_at_ms: 0,
            predicates: Predicates {
                regex_match: true,
                recency: !evict,
                ..Predicates::default()
            },
            evict,
        }
    }

    #[test]
    fn test_execute_only_evicted() {
        let deleter = RecordingDeleter::default();
        let decisions = vec![decision("a", true), decision("b", false), decision("c", true)];

        let results = DeletionExecutor::new().execute("acme/api", &decisions, &deleter);

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.outcome == DeletionOutcome::Deleted));
        assert_eq!(*deleter.calls.lock().unwrap(), vec!["a", "c"]);
    }

    #[test]
    fn test_execute_continues_after_failure() {
        let deleter = RecordingDeleter {
            fail_on: Some("a"),
            ..RecordingDeleter::default()
        };
        let decisions = vec![decision("a", true), decision("b", true)];

        let results = DeletionExecutor::new().execute("acme/api", &decisions, &deleter);

        assert!(results[0].is_failure());
        match &results[0].outcome {
            DeletionOutcome::Failed { reason } => assert!(reason.contains("HTTP 500")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(results[1].outcome, DeletionOutcome::Deleted);
        assert_eq!(deleter.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_dry_run_never_calls_deleter() {
        let deleter = RecordingDeleter::default();
        let decisions = vec![decision("a", true)];

        let executor = DeletionExecutor::dry_run();
        let results = executor.execute("acme/api", &decisions, &deleter);

        assert!(executor.is_dry_run());
        assert_eq!(results[0].outcome, DeletionOutcome::Skipped);
        assert!(deleter.calls.lock().unwrap().is_empty());
    }
}
