//! # Tagreaper
//!
//! Retention-driven garbage collection for container registry digests.
//!
//! Tagreaper inventories every digest in a registry project, cross-checks the
//! tags against the images declared by cluster workloads (including replica
//! sets scaled to zero, so rollback targets survive), and deletes only the
//! digests that fail every retention gate.
//!
//! ## Features
//!
//! - Pure, typed retention evaluator with four independent predicates
//! - Cluster-wide in-use index built from pods and replica-set templates
//! - Bounded worker pool with per-repository failure isolation
//! - Dry-run planning with per-digest decision output
//! - Structured logging and Prometheus metrics
//!
//! ## Example
//!
//! ```rust
//! use std::collections::HashSet;
//! use tagreaper::gc::{RetentionPolicy, evaluate, eviction_set};
//! use tagreaper::models::DigestRecord;
//!
//! let day = 86_400_000;
//! let now = 100 * day;
//! let records = vec![
//!     DigestRecord::new("sha256:aaa", vec!["v2".to_string()], now - day),
//!     DigestRecord::new("sha256:bbb", vec!["v1".to_string()], now - 90 * day),
//! ];
//! let policy = RetentionPolicy::new(1, 30, ".*").unwrap();
//!
//! let decisions = evaluate(&records, &HashSet::new(), &policy, now);
//! assert_eq!(eviction_set(&decisions), vec!["sha256:bbb"]);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod cli;
pub mod cluster;
pub mod config;
pub mod gc;
pub mod inventory;
pub mod models;
pub mod observability;
pub mod registry;
pub mod services;

pub use config::ReaperConfig;
pub use gc::{EvictionDecision, Predicates, RetentionPolicy, evaluate};
pub use inventory::{InUseIndex, RawListing, RawManifest, build_inventory};
pub use models::{DigestRecord, ImageReference, Repository};
pub use services::{CollectionService, RepositoryReport, RunReport};

/// Error type for tagreaper operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Collection` | Registry or cluster query fails, returns malformed data, or is truncated |
/// | `Policy` | Negative keep-count or max-age, unparsable tag pattern |
/// | `Deletion` | A single digest delete call fails |
/// | `InvalidInput` | Configuration values are missing or malformed |
/// | `OperationFailed` | Local I/O, observability or runtime setup fails |
#[derive(Debug, ThisError)]
pub enum Error {
    /// A data-collection step failed.
    ///
    /// Raised when:
    /// - The registry catalog or manifest listing request fails
    /// - A manifest is missing its creation timestamp
    /// - The registry signals a truncated (paginated) listing
    /// - The cluster workload listing fails or cannot be parsed
    #[error("collection from '{source_name}' failed: {cause}")]
    Collection {
        /// The repository or cluster endpoint being queried.
        source_name: String,
        /// The underlying cause.
        cause: String,
    },

    /// The retention policy is invalid.
    #[error("invalid retention policy: {0}")]
    Policy(String),

    /// A digest deletion failed.
    #[error("failed to delete digest '{digest}': {cause}")]
    Deletion {
        /// The digest that could not be deleted.
        digest: String,
        /// The underlying cause.
        cause: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A local operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Builds a [`Error::Collection`] for the given source.
    pub fn collection(source_name: impl Into<String>, cause: impl ToString) -> Self {
        Self::Collection {
            source_name: source_name.into(),
            cause: cause.to_string(),
        }
    }

    /// Returns the process exit code for this error.
    ///
    /// Policy errors exit with 2 so schedulers can tell misconfiguration
    /// apart from transient collection failures.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Policy(_) | Self::InvalidInput(_) => 2,
            _ => 1,
        }
    }
}

/// Result type alias for tagreaper operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in milliseconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn current_timestamp_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::collection("team/api", "listing truncated");
        assert_eq!(
            err.to_string(),
            "collection from 'team/api' failed: listing truncated"
        );

        let err = Error::Policy("keep_count must not be negative".to_string());
        assert_eq!(
            err.to_string(),
            "invalid retention policy: keep_count must not be negative"
        );

        let err = Error::Deletion {
            digest: "sha256:abc".to_string(),
            cause: "HTTP 500".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to delete digest 'sha256:abc': HTTP 500"
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::Policy("bad".to_string()).exit_code(), 2);
        assert_eq!(Error::InvalidInput("bad".to_string()).exit_code(), 2);
        assert_eq!(Error::collection("x", "y").exit_code(), 1);
    }

    #[test]
    fn test_current_timestamp_is_positive() {
        assert!(current_timestamp_ms() > 1_600_000_000_000);
    }
}
