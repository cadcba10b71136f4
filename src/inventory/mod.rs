//! Inventory builders.
//!
//! Normalizes the raw output of the registry and cluster collaborators into
//! the typed inputs of the retention evaluator:
//!
//! - [`build_inventory`] turns a repository manifest listing into a
//!   [`crate::models::Repository`].
//! - [`InUseIndex`] maps repository names to the tags referenced by any
//!   workload in the cluster.

mod in_use;
mod repository;

pub use in_use::InUseIndex;
pub use repository::{RawListing, RawManifest, RawTimestamp, build_inventory};
