//! Data models for tagreaper.
//!
//! Digest records and repositories are built fresh each run from registry
//! data and discarded once the run completes.

mod digest;
mod image_ref;

pub use digest::{DigestRecord, Repository};
pub use image_ref::{ImageReference, canonical_host};
