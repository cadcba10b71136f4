//! Workload file source.
//!
//! Reads a JSON document produced by
//! `kubectl get pods,replicasets --all-namespaces -o json`. Useful for
//! planning against a cluster snapshot without API access.

use super::{WorkloadList, WorkloadSource};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads workload images from a `kubectl` JSON export.
#[derive(Debug, Clone)]
pub struct WorkloadFileSource {
    path: PathBuf,
    name: String,
}

impl WorkloadFileSource {
    /// Creates a source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self { path, name }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WorkloadSource for WorkloadFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_image_references(&self) -> Result<Vec<String>> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::collection(&self.name, format!("cannot read file: {e}")))?;
        let list: WorkloadList = serde_json::from_str(&content)
            .map_err(|e| Error::collection(&self.name, format!("malformed workload list: {e}")))?;

        debug!(path = %self.name, objects = list.items.len(), "Loaded workload file");
        Ok(list.images())
    }
}
