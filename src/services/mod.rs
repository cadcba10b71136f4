//! Collection services.
//!
//! The [`CollectionService`] drives a full run over a registry project and
//! returns a [`RunReport`] with one [`RepositoryReport`] per repository.

mod collector;
mod report;

pub use collector::{CollectionService, DEFAULT_CONCURRENCY};
pub use report::{DigestFailure, RepositoryReport, RunReport};
