//! Cluster workload sources.
//!
//! A [`WorkloadSource`] yields every image reference declared by cluster
//! workloads. Pods and replica sets are both listed; a replica set scaled to
//! zero still declares its pod template, which is what keeps rollback
//! targets protected.
//!
//! | Source | Reads |
//! |--------|-------|
//! | [`KubeApiSource`] | `GET /api/v1/pods` and `GET /apis/apps/v1/replicasets` |
//! | [`WorkloadFileSource`] | `kubectl get pods,replicasets -A -o json` output |
//! | [`StaticWorkloadSource`] | A fixed list of references |

mod file;
mod kube;
mod objects;

pub use file::WorkloadFileSource;
pub use kube::{
    DEFAULT_API_URL, KubeApiConfig, KubeApiSource, SERVICE_ACCOUNT_CA_PATH, SERVICE_ACCOUNT_TOKEN_PATH,
};
pub use objects::{WorkloadList, WorkloadObject};

use crate::Result;

/// Lists the image references declared by cluster workloads.
pub trait WorkloadSource: Send + Sync {
    /// Returns a human-readable name for log lines and error messages.
    fn name(&self) -> &str;

    /// Returns every declared image reference.
    ///
    /// Duplicates are allowed; callers apply set semantics.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Collection`] if the workloads cannot be
    /// listed or parsed.
    fn list_image_references(&self) -> Result<Vec<String>>;
}

/// Workload source returning a fixed list of references.
#[derive(Debug, Clone, Default)]
pub struct StaticWorkloadSource {
    references: Vec<String>,
}

impl StaticWorkloadSource {
    /// Creates a source yielding `references`.
    pub fn new<I, S>(references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            references: references.into_iter().map(Into::into).collect(),
        }
    }
}

impl WorkloadSource for StaticWorkloadSource {
    fn name(&self) -> &str {
        "static"
    }

    fn list_image_references(&self) -> Result<Vec<String>> {
        Ok(self.references.clone())
    }
}
