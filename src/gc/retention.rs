//! Retention evaluator.
//!
//! Computes the four retention predicates for every digest of a repository
//! and derives the eviction decision from them:
//!
//! ```text
//! evict = !recency && !in_use && !age && regex_match
//! ```
//!
//! The evaluator is a pure function of its inputs. It performs no I/O and
//! holds no state, so repositories can be evaluated concurrently.

use super::policy::RetentionPolicy;
use crate::models::DigestRecord;
use serde::Serialize;
use std::collections::HashSet;

/// Predicate values computed for one digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Predicates {
    /// The digest is among the `keep_count` most recently created.
    pub recency: bool,
    /// At least one tag is referenced by a cluster workload.
    pub in_use: bool,
    /// The digest was created on or after the age cutoff.
    pub age: bool,
    /// The digest is untagged or has a tag matching the tag pattern.
    pub regex_match: bool,
}

impl Predicates {
    /// Returns `true` if the predicates mark the digest for eviction.
    #[must_use]
    pub const fn evict(&self) -> bool {
        !self.recency && !self.in_use && !self.age && self.regex_match
    }

    /// Returns `true` if any protection gate holds.
    #[must_use]
    pub const fn is_protected(&self) -> bool {
        self.recency || self.in_use || self.age
    }

    /// Returns a short label describing why the digest is kept or evicted.
    ///
    /// Protection gates are reported in order recency, in-use, age.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        if self.recency {
            "recent"
        } else if self.in_use {
            "in-use"
        } else if self.age {
            "young"
        } else if !self.regex_match {
            "pattern-excluded"
        } else {
            "evict"
        }
    }
}

/// Retention decision for one digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvictionDecision {
    /// The digest this decision applies to.
    pub digest: String,
    /// Tags naming the digest at evaluation time.
    pub tags: Vec<String>,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at_ms: i64,
    /// The four predicate values.
    pub predicates: Predicates,
    /// Whether the digest should be deleted.
    pub evict: bool,
}

/// Returns the age cutoff for `now_ms`.
///
/// Digests with `created_at_ms >= cutoff` are protected by the age gate.
#[must_use]
pub fn cutoff_ms(policy: &RetentionPolicy, now_ms: i64) -> i64 {
    now_ms.saturating_sub(policy.max_age_ms())
}

/// Evaluates the retention policy for one repository.
///
/// Decisions are returned in the order of `records`. Recency ranks records
/// by `created_at_ms` descending with a stable sort, so equal timestamps
/// keep their input order.
#[must_use]
pub fn evaluate(
    records: &[DigestRecord],
    used_tags: &HashSet<String>,
    policy: &RetentionPolicy,
    now_ms: i64,
) -> Vec<EvictionDecision> {
    let cutoff = cutoff_ms(policy, now_ms);

    let mut by_recency: Vec<usize> = (0..records.len()).collect();
    by_recency.sort_by(|&a, &b| records[b].created_at_ms.cmp(&records[a].created_at_ms));

    let mut recent = vec![false; records.len()];
    for &index in by_recency.iter().take(policy.keep_count) {
        recent[index] = true;
    }

    records
        .iter()
        .zip(recent)
        .map(|(record, recency)| {
            let predicates = Predicates {
                recency,
                in_use: record.tags.iter().any(|tag| used_tags.contains(tag)),
                age: record.created_at_ms >= cutoff,
                regex_match: record.is_untagged()
                    || record.tags.iter().any(|tag| policy.matches_tag(tag)),
            };
            EvictionDecision {
                digest: record.digest.clone(),
                tags: record.tags.clone(),
                created_at_ms: record.created_at_ms,
                predicates,
                evict: predicates.evict(),
            }
        })
        .collect()
}

/// Returns the digests marked for eviction, in decision order.
#[must_use]
pub fn eviction_set(decisions: &[EvictionDecision]) -> Vec<&str> {
    decisions
        .iter()
        .filter(|decision| decision.evict)
        .map(|decision| decision.digest.as_str())
        .collect()
}
