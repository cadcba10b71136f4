//! Garbage collection module.
//!
//! This module holds the retention-decision engine and the deletion side of
//! a collection run.
//!
//! # Overview
//!
//! A digest is evicted only when every protection gate fails at once:
//!
//! | Predicate | Protects when |
//! |-----------|---------------|
//! | Recency | the digest is among the `keep_count` most recently created |
//! | In use | any of its tags is referenced by a cluster workload |
//! | Age | it was created after the `max_age_days` cutoff |
//!
//! The fourth predicate, regex match, scopes eligibility instead of
//! protecting: untagged digests and digests with a tag matching
//! `tag_pattern` are eligible, everything else is left alone.
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashSet;
//! use tagreaper::gc::{RetentionPolicy, evaluate};
//! use tagreaper::models::DigestRecord;
//!
//! let day = 86_400_000;
//! let now = 400 * day;
//! let records = vec![DigestRecord::new("sha256:old", vec![], 0)];
//! let policy = RetentionPolicy::new(0, 30, ".*")?;
//!
//! let decisions = evaluate(&records, &HashSet::new(), &policy, now);
//! assert!(decisions[0].evict);
//! # Ok::<(), tagreaper::Error>(())
//! ```
//!
//! # Deletion
//!
//! [`DeletionExecutor`] applies an eviction set through a [`DigestDeleter`],
//! recording a per-digest outcome and never stopping at the first failure.

mod executor;
mod policy;
mod retention;

pub use executor::{DeletionExecutor, DeletionOutcome, DeletionResult, DigestDeleter};
pub use policy::{
    DEFAULT_KEEP_COUNT, DEFAULT_MAX_AGE_DAYS, DEFAULT_TAG_PATTERN, MILLIS_PER_DAY,
    RetentionPolicy,
};
pub use retention::{EvictionDecision, Predicates, cutoff_ms, evaluate, eviction_set};
