//! Registry backends.
//!
//! A [`RegistryBackend`] answers the two inventory queries of a collection
//! run (repository catalog and per-repository manifest listing) and, through
//! its [`DigestDeleter`] supertrait, performs the deletions.
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`HttpRegistry`] | Docker Registry v2 API with manifest metadata extensions |
//! | [`InMemoryRegistry`] | Tests and dry-run fixtures |

mod http;
mod memory;

pub use http::{HttpRegistry, HttpRegistryConfig};
pub use memory::InMemoryRegistry;

use crate::Result;
use crate::gc::DigestDeleter;
use crate::inventory::RawListing;

/// Trait for registry backends.
pub trait RegistryBackend: DigestDeleter {
    /// Returns the registry host (`host[:port]`) used in image references.
    fn registry_host(&self) -> &str;

    /// Lists repositories under `project`, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Collection`] if the catalog cannot be read or
    /// is truncated.
    fn list_repositories(&self, project: &str) -> Result<Vec<String>>;

    /// Lists every manifest of `repository` with its tags and creation time.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Collection`] if the listing cannot be read.
    fn list_manifests(&self, repository: &str) -> Result<RawListing>;
}

/// Returns `true` if `repository` lives under `project`.
///
/// An empty project matches every repository.
#[must_use]
pub fn in_project(repository: &str, project: &str) -> bool {
    let project = project.trim_matches('/');
    project.is_empty()
        || repository == project
        || repository
            .strip_prefix(project)
            .is_some_and(|rest| rest.starts_with('/'))
}
