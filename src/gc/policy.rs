//! Retention policy.
//!
//! The policy is validated once at startup and then shared read-only by
//! every repository evaluation in the run.

use crate::{Error, Result};
use regex::Regex;

/// Default number of most recent digests always retained per repository.
pub const DEFAULT_KEEP_COUNT: usize = 10;

/// Default age cutoff in days (1 year).
pub const DEFAULT_MAX_AGE_DAYS: u32 = 365;

/// Default tag pattern (matches every tag).
pub const DEFAULT_TAG_PATTERN: &str = ".*";

/// Milliseconds in one day.
pub const MILLIS_PER_DAY: i64 = 24 * 3600 * 1000;

/// Retention policy configuration.
///
/// A `tag_pattern` of `None` matches every tag, identical to `.*`.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Minimum number of most recently created digests kept per repository.
    pub keep_count: usize,

    /// Digests younger than this many days are always kept.
    pub max_age_days: u32,

    /// Restricts eviction to digests with a matching tag (or no tags).
    tag_pattern: Option<Regex>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_count: DEFAULT_KEEP_COUNT,
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            tag_pattern: None,
        }
    }
}

impl RetentionPolicy {
    /// Creates a validated retention policy.
    ///
    /// Accepts signed values so that negative configuration input is
    /// reported instead of silently wrapping.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Policy`] if `keep_count` or `max_age_days` is
    /// negative or out of range, or if `tag_pattern` is not a valid regex.
    pub fn new(keep_count: i64, max_age_days: i64, tag_pattern: &str) -> Result<Self> {
        let keep_count = usize::try_from(keep_count).map_err(|_| {
            Error::Policy(format!("keep_count must be non-negative, got {keep_count}"))
        })?;
        let max_age_days = u32::try_from(max_age_days).map_err(|_| {
            Error::Policy(format!(
                "max_age_days must be between 0 and {}, got {max_age_days}",
                u32::MAX
            ))
        })?;

        Self::default()
            .with_keep_count(keep_count)
            .with_max_age_days(max_age_days)
            .with_tag_pattern(tag_pattern)
    }

    /// Sets the keep count.
    #[must_use]
    pub const fn with_keep_count(mut self, keep_count: usize) -> Self {
        self.keep_count = keep_count;
        self
    }

    /// Sets the age cutoff in days.
    #[must_use]
    pub const fn with_max_age_days(mut self, days: u32) -> Self {
        self.max_age_days = days;
        self
    }

    /// Sets the tag pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Policy`] if the pattern does not compile.
    pub fn with_tag_pattern(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::Policy(format!("invalid tag_pattern '{pattern}': {e}")))?;
        self.tag_pattern = Some(regex);
        Ok(self)
    }

    /// Returns the tag pattern source.
    #[must_use]
    pub fn tag_pattern(&self) -> &str {
        self.tag_pattern
            .as_ref()
            .map_or(DEFAULT_TAG_PATTERN, Regex::as_str)
    }

    /// Returns `true` if `tag` matches the tag pattern.
    ///
    /// Matching is unanchored; use `^`/`$` in the pattern to anchor.
    #[must_use]
    pub fn matches_tag(&self, tag: &str) -> bool {
        self.tag_pattern.as_ref().is_none_or(|re| re.is_match(tag))
    }

    /// Returns the age cutoff as a duration in milliseconds.
    #[must_use]
    pub fn max_age_ms(&self) -> i64 {
        i64::from(self.max_age_days) * MILLIS_PER_DAY
    }
}
