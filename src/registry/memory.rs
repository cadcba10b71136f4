//! In-memory registry backend.
//!
//! Holds repository listings in process memory. Used for plan rehearsals
//! against exported listings and throughout the test suite, where listing
//! and deletion failures can be injected per repository or per digest.

use super::{RegistryBackend, in_project};
use crate::gc::DigestDeleter;
use crate::inventory::{RawListing, RawManifest};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct State {
    listings: BTreeMap<String, RawListing>,
    deleted: Vec<(String, String)>,
}

/// Registry backend backed by a map of listings.
#[derive(Debug)]
pub struct InMemoryRegistry {
    host: String,
    state: Mutex<State>,
    failing_listings: HashSet<String>,
    failing_digests: HashSet<String>,
    catalog_failure: Option<String>,
}

impl InMemoryRegistry {
    /// Creates an empty registry answering for `host`.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            state: Mutex::new(State::default()),
            failing_listings: HashSet::new(),
            failing_digests: HashSet::new(),
            catalog_failure: None,
        }
    }

    /// Adds (or replaces) a repository listing.
    #[must_use]
    pub fn with_listing(self, listing: RawListing) -> Self {
        self.insert_listing(listing);
        self
    }

    /// Adds one manifest to `repository`, creating the repository if needed.
    #[must_use]
    pub fn with_manifest(
        self,
        repository: &str,
        digest: &str,
        tags: &[&str],
        created_at_ms: i64,
    ) -> Self {
        {
            let mut state = self.lock();
            state
                .listings
                .entry(repository.to_string())
                .or_insert_with(|| RawListing::new(repository))
                .manifests
                .insert(
                    digest.to_string(),
                    RawManifest::new(tags, Some(&created_at_ms.to_string())),
                );
        }
        self
    }

    /// Makes manifest listing fail for `repository`.
    #[must_use]
    pub fn with_failing_listing(mut self, repository: impl Into<String>) -> Self {
        self.failing_listings.insert(repository.into());
        self
    }

    /// Makes deletion of `digest` fail in every repository.
    #[must_use]
    pub fn with_failing_digest(mut self, digest: impl Into<String>) -> Self {
        self.failing_digests.insert(digest.into());
        self
    }

    /// Makes the catalog call fail with `cause`.
    #[must_use]
    pub fn with_catalog_failure(mut self, cause: impl Into<String>) -> Self {
        self.catalog_failure = Some(cause.into());
        self
    }

    /// Adds (or replaces) a repository listing.
    pub fn insert_listing(&self, listing: RawListing) {
        self.lock()
            .listings
            .insert(listing.repository.clone(), listing);
    }

    /// Returns every `(repository, digest)` pair deleted so far, in order.
    #[must_use]
    pub fn deleted(&self) -> Vec<(String, String)> {
        self.lock().deleted.clone()
    }

    /// Returns the digests currently stored in `repository`, sorted.
    #[must_use]
    pub fn digests(&self, repository: &str) -> Vec<String> {
        self.lock()
            .listings
            .get(repository)
            .map(|listing| listing.manifests.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RegistryBackend for InMemoryRegistry {
    fn registry_host(&self) -> &str {
        &self.host
    }

    fn list_repositories(&self, project: &str) -> Result<Vec<String>> {
        if let Some(cause) = &self.catalog_failure {
            return Err(Error::collection(format!("{}/v2/_catalog", self.host), cause));
        }

        Ok(self
            .lock()
            .listings
            .keys()
            .filter(|repository| in_project(repository, project))
            .cloned()
            .collect())
    }

    fn list_manifests(&self, repository: &str) -> Result<RawListing> {
        if self.failing_listings.contains(repository) {
            return Err(Error::collection(repository, "injected listing failure"));
        }

        self.lock()
            .listings
            .get(repository)
            .cloned()
            .ok_or_else(|| Error::collection(repository, "HTTP 404 Not Found"))
    }
}

impl DigestDeleter for InMemoryRegistry {
    fn delete_digest(&self, repository: &str, digest: &str, _tags: &[String]) -> Result<()> {
        if self.failing_digests.contains(digest) {
            return Err(Error::Deletion {
                digest: digest.to_string(),
                cause: "injected deletion failure".to_string(),
            });
        }

        let mut state = self.lock();
        if let Some(listing) = state.listings.get_mut(repository) {
            listing.manifests.remove(digest);
        }
        state
            .deleted
            .push((repository.to_string(), digest.to_string()));
        Ok(())
    }
}
