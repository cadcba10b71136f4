//! In-use index.
//!
//! Maps each repository on the managed registry to the set of tags that
//! cluster workloads currently reference. Pods and replica-set templates
//! both feed the index, including replica sets scaled to zero, so rollback
//! targets stay protected.

use crate::models::ImageReference;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Tags referenced by cluster workloads, grouped by repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InUseIndex {
    tags: HashMap<String, HashSet<String>>,
    empty: HashSet<String>,
}

impl InUseIndex {
    /// Builds the index from workload image references.
    ///
    /// References hosted elsewhere than `registry_host`, references that do
    /// not parse, and references without an explicit tag contribute
    /// nothing.
    pub fn build<I, S>(references: I, registry_host: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = Self::default();

        for reference in references {
            let reference = reference.as_ref();
            let image = match ImageReference::parse(reference) {
                Ok(image) => image,
                Err(e) => {
                    debug!(reference, error = %e, "Skipping unparsable image reference");
                    continue;
                },
            };

            if !image.is_hosted_on(registry_host) {
                continue;
            }

            let Some(tag) = image.tag() else {
                debug!(reference, "Image reference has no tag; not protecting");
                continue;
            };

            index.insert(image.repository(), tag);
        }

        index
    }

    /// Records `tag` as in use for `repository`.
    pub fn insert(&mut self, repository: &str, tag: &str) {
        self.tags
            .entry(repository.to_string())
            .or_default()
            .insert(tag.to_string());
    }

    /// Returns the in-use tags for `repository`.
    ///
    /// Unknown repositories yield an empty set.
    #[must_use]
    pub fn tags_for(&self, repository: &str) -> &HashSet<String> {
        self.tags.get(repository).unwrap_or(&self.empty)
    }

    /// Returns `true` if `tag` is in use in `repository`.
    #[must_use]
    pub fn contains(&self, repository: &str, tag: &str) -> bool {
        self.tags_for(repository).contains(tag)
    }

    /// Returns the number of repositories with at least one tag in use.
    #[must_use]
    pub fn repository_count(&self) -> usize {
        self.tags.len()
    }

    /// Returns the total number of distinct (repository, tag) pairs.
    #[must_use]
    pub fn tag_count(&self) -> usize {
        self.tags.values().map(HashSet::len).sum()
    }

    /// Returns `true` if no tag is in use.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Iterates over repositories and their tags, sorted by repository.
    pub fn iter_sorted(&self) -> impl Iterator<Item = (&str, Vec<&str>)> {
        let mut repositories: Vec<&String> = self.tags.keys().collect();
        repositories.sort();
        repositories.into_iter().map(|repository| {
            let mut tags: Vec<&str> = self.tags[repository].iter().map(String::as_str).collect();
            tags.sort_unstable();
            (repository.as_str(), tags)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "gcr.io";

    #[test]
    fn test_groups_tags_by_repository() {
        let index = InUseIndex::build(
            [
                "gcr.io/acme/api:v1",
                "gcr.io/acme/api:v2",
                "gcr.io/acme/api:v1",
                "gcr.io/acme/worker:2024.05",
            ],
            HOST,
        );

        assert_eq!(index.repository_count(), 2);
        assert_eq!(index.tag_count(), 3);
        assert!(index.contains("acme/api", "v1"));
        assert!(index.contains("acme/api", "v2"));
        assert!(index.contains("acme/worker", "2024.05"));
    }

    #[test]
    fn test_discards_foreign_registries() {
        let index = InUseIndex::build(
            [
                "docker.io/library/nginx:1.27",
                "nginx:1.27",
                "eu.gcr.io/acme/api:v1",
                "quay.io/acme/api:v1",
            ],
            HOST,
        );

        assert!(index.is_empty());
    }

    #[test]
    fn test_untagged_and_digest_pins_contribute_nothing() {
        let index = InUseIndex::build(
            ["gcr.io/acme/api", "gcr.io/acme/api@sha256:abc"],
            HOST,
        );

        assert!(index.is_empty());
        assert!(index.tags_for("acme/api").is_empty());
    }

    #[test]
    fn test_tag_with_digest_is_protected() {
        let index = InUseIndex::build(["gcr.io/acme/api:v3@sha256:abc"], HOST);
        assert!(index.contains("acme/api", "v3"));
    }

    #[test]
    fn test_skips_unparsable_references() {
        let index = InUseIndex::build(["", "gcr.io/", "gcr.io/acme/api:ok"], HOST);
        assert_eq!(index.tag_count(), 1);
    }

    #[test]
    fn test_host_match_is_case_insensitive() {
        let index = InUseIndex::build(["GCR.io/acme/api:v1"], HOST);
        assert!(index.contains("acme/api", "v1"));
    }

    #[test]
    fn test_iter_sorted() {
        let index = InUseIndex::build(
            ["gcr.io/b/x:2", "gcr.io/a/y:9", "gcr.io/b/x:1"],
            HOST,
        );
        let listed: Vec<(&str, Vec<&str>)> = index.iter_sorted().collect();
        assert_eq!(listed, vec![("a/y", vec!["9"]), ("b/x", vec!["1", "2"])]);
    }
}
