//! Property-based tests for the retention evaluator.
//!
//! Uses proptest to verify invariants across random repositories:
//! - The eviction flag is exactly the conjunction of the four predicates
//! - A keep count covering every digest evicts nothing
//! - Digests with an in-use tag are never evicted
//! - Digests created on or after the cutoff are never evicted
//! - Evaluation is deterministic

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;
use std::collections::HashSet;
use tagreaper::gc::{MILLIS_PER_DAY, RetentionPolicy, cutoff_ms, evaluate, eviction_set};
use tagreaper::models::{DigestRecord, ImageReference};

const NOW: i64 = 30_000 * MILLIS_PER_DAY;

/// Repositories of up to 40 digests with unique digests and unique tags.
fn repository() -> impl Strategy<Value = Vec<DigestRecord>> {
    prop::collection::vec(
        (0i64..2_000, prop::collection::vec(0u8..4, 0..3)),
        0..40,
    )
    .prop_map(|entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (days_old, kinds))| {
                let tags = kinds
                    .iter()
                    .enumerate()
                    .map(|(j, kind)| {
                        let prefix = ["release", "snapshot", "v", "latest"][usize::from(*kind)];
                        format!("{prefix}-{i}-{j}")
                    })
                    .collect();
                DigestRecord::new(format!("sha256:{i:04}"), tags, NOW - days_old * MILLIS_PER_DAY)
            })
            .collect()
    })
}

fn pattern() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![".*", "^release-", "^v-", "snapshot", "^$"])
}

/// Picks roughly a third of all tags as in use.
fn used_tags(records: &[DigestRecord], seed: u64) -> HashSet<String> {
    records
        .iter()
        .flat_map(|r| r.tags.iter())
        .enumerate()
        .filter(|(i, _)| (seed.wrapping_add(*i as u64)) % 3 == 0)
        .map(|(_, tag)| tag.clone())
        .collect()
}

proptest! {
    /// Property: evict is exactly `!recency && !in_use && !age && regex_match`.
    #[test]
    fn prop_evict_is_predicate_conjunction(
        records in repository(),
        keep in 0i64..10,
        days in 0i64..500,
        pattern in pattern(),
        seed in any::<u64>(),
    ) {
        let policy = RetentionPolicy::new(keep, days, pattern).unwrap();
        let used = used_tags(&records, seed);

        for decision in evaluate(&records, &used, &policy, NOW) {
            let p = decision.predicates;
            prop_assert_eq!(decision.evict, !p.recency && !p.in_use && !p.age && p.regex_match);
        }
    }

    /// Property: keep_count >= digest count evicts nothing.
    #[test]
    fn prop_large_keep_count_evicts_nothing(
        records in repository(),
        extra in 0usize..5,
        pattern in pattern(),
    ) {
        let keep = i64::try_from(records.len() + extra).unwrap();
        let policy = RetentionPolicy::new(keep, 0, pattern).unwrap();

        let decisions = evaluate(&records, &HashSet::new(), &policy, NOW);

        prop_assert!(eviction_set(&decisions).is_empty());
        prop_assert!(decisions.iter().all(|d| d.predicates.recency));
    }

    /// Property: exactly min(keep_count, len) digests hold the recency gate.
    #[test]
    fn prop_recency_covers_keep_count(records in repository(), keep in 0usize..50) {
        let policy = RetentionPolicy::default().with_keep_count(keep);
        let decisions = evaluate(&records, &HashSet::new(), &policy, NOW);

        let recent = decisions.iter().filter(|d| d.predicates.recency).count();
        prop_assert_eq!(recent, keep.min(records.len()));

        let newest_evicted = decisions
            .iter()
            .filter(|d| !d.predicates.recency)
            .map(|d| d.created_at_ms)
            .max();
        let oldest_kept = decisions
            .iter()
            .filter(|d| d.predicates.recency)
            .map(|d| d.created_at_ms)
            .min();
        if let (Some(newest_evicted), Some(oldest_kept)) = (newest_evicted, oldest_kept) {
            prop_assert!(oldest_kept >= newest_evicted);
        }
    }

    /// Property: a digest with an in-use tag is never evicted.
    #[test]
    fn prop_in_use_never_evicted(records in repository(), seed in any::<u64>()) {
        let policy = RetentionPolicy::new(0, 0, ".*").unwrap();
        let used = used_tags(&records, seed);

        for decision in evaluate(&records, &used, &policy, NOW) {
            if decision.tags.iter().any(|t| used.contains(t)) {
                prop_assert!(!decision.evict, "{} is in use", decision.digest);
            }
        }
    }

    /// Property: digests created on or after the cutoff are never evicted.
    #[test]
    fn prop_young_never_evicted(records in repository(), days in 0i64..2_500) {
        let policy = RetentionPolicy::new(0, days, ".*").unwrap();
        let cutoff = cutoff_ms(&policy, NOW);

        for decision in evaluate(&records, &HashSet::new(), &policy, NOW) {
            if decision.created_at_ms >= cutoff {
                prop_assert!(!decision.evict);
            }
        }
    }

    /// Property: untagged digests always pass the regex gate.
    #[test]
    fn prop_untagged_is_eligible(records in repository(), pattern in pattern()) {
        let policy = RetentionPolicy::new(0, 0, pattern).unwrap();

        for decision in evaluate(&records, &HashSet::new(), &policy, NOW) {
            if decision.tags.is_empty() {
                prop_assert!(decision.predicates.regex_match);
            }
        }
    }

    /// Property: identical inputs give identical decisions.
    #[test]
    fn prop_evaluation_is_deterministic(records in repository(), seed in any::<u64>()) {
        let policy = RetentionPolicy::new(3, 90, "^release-").unwrap();
        let used = used_tags(&records, seed);

        prop_assert_eq!(
            evaluate(&records, &used, &policy, NOW),
            evaluate(&records, &used, &policy, NOW)
        );
    }

    /// Property: a hosted reference parses back to its repository and tag.
    #[test]
    fn prop_image_reference_parts(
        repository in "[a-z][a-z0-9-]{0,10}(/[a-z][a-z0-9-]{0,10}){0,2}",
        tag in "[A-Za-z0-9_][A-Za-z0-9_.-]{0,20}",
    ) {
        let reference = ImageReference::parse(&format!("gcr.io/{repository}:{tag}")).unwrap();
        prop_assert!(reference.is_hosted_on("gcr.io"));
        prop_assert_eq!(reference.repository(), repository.as_str());
        prop_assert_eq!(reference.tag(), Some(tag.as_str()));
    }
}
