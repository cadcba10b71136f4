//! Repository inventory builder.
//!
//! # Known limitation
//!
//! Registry pagination is not supported. A listing the registry marks as
//! truncated is rejected rather than evaluated on partial data, since a
//! missing page could hold the most recent digests.

use crate::models::{DigestRecord, Repository};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// Creation timestamp as encoded by the registry.
///
/// Registries encode millisecond timestamps as decimal strings; plain JSON
/// integers are accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    /// Integer milliseconds.
    Millis(i64),
    /// Decimal string milliseconds.
    Text(String),
}

impl RawTimestamp {
    fn to_millis(&self) -> std::result::Result<i64, String> {
        let millis = match self {
            Self::Millis(ms) => *ms,
            Self::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err("empty timeCreatedMs".to_string());
                }
                text.parse::<i64>()
                    .map_err(|e| format!("unparsable timeCreatedMs '{text}': {e}"))?
            },
        };
        if millis < 0 {
            return Err(format!("negative timeCreatedMs {millis}"));
        }
        Ok(millis)
    }
}

/// Raw manifest metadata for one digest.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct RawManifest {
    /// Tags naming the digest.
    #[serde(rename = "tag", default)]
    pub tags: Vec<String>,
    /// Creation time in milliseconds since the Unix epoch.
    #[serde(rename = "timeCreatedMs", default)]
    pub time_created_ms: Option<RawTimestamp>,
}

impl RawManifest {
    /// Creates a manifest entry with a string timestamp.
    #[must_use]
    pub fn new(tags: &[&str], time_created_ms: Option<&str>) -> Self {
        Self {
            tags: tags.iter().map(ToString::to_string).collect(),
            time_created_ms: time_created_ms.map(|t| RawTimestamp::Text(t.to_string())),
        }
    }
}

/// Raw manifest listing for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawListing {
    /// Repository name.
    pub repository: String,
    /// Manifests keyed by digest.
    pub manifests: BTreeMap<String, RawManifest>,
    /// Whether the registry signalled that more results exist.
    pub truncated: bool,
}

impl RawListing {
    /// Creates an empty, complete listing.
    #[must_use]
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            ..Self::default()
        }
    }

    /// Adds a manifest entry.
    #[must_use]
    pub fn with_manifest(mut self, digest: impl Into<String>, manifest: RawManifest) -> Self {
        self.manifests.insert(digest.into(), manifest);
        self
    }

    /// Marks the listing as truncated.
    #[must_use]
    pub const fn with_truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }
}

/// Builds the digest inventory for one repository.
///
/// Records come out sorted by digest. An empty listing yields an empty
/// repository.
///
/// # Errors
///
/// Returns [`Error::Collection`] if the listing is truncated, if any digest
/// has a missing or malformed creation timestamp, or if a tag names more
/// than one digest.
pub fn build_inventory(listing: &RawListing) -> Result<Repository> {
    let repository = listing.repository.as_str();
    if listing.truncated {
        return Err(Error::collection(
            repository,
            "listing truncated; pagination is not supported",
        ));
    }

    let mut tag_owner: HashMap<&str, &str> = HashMap::new();
    let mut digests = Vec::with_capacity(listing.manifests.len());

    for (digest, manifest) in &listing.manifests {
        let created_at_ms = manifest
            .time_created_ms
            .as_ref()
            .ok_or_else(|| "missing timeCreatedMs".to_string())
            .and_then(RawTimestamp::to_millis)
            .map_err(|cause| Error::collection(repository, format!("digest {digest}: {cause}")))?;

        for tag in &manifest.tags {
            if let Some(other) = tag_owner.insert(tag.as_str(), digest.as_str()) {
                return Err(Error::collection(
                    repository,
                    format!("tag '{tag}' names both {other} and {digest}"),
                ));
            }
        }

        digests.push(DigestRecord::new(
            digest.clone(),
            manifest.tags.clone(),
            created_at_ms,
        ));
    }

    Ok(Repository::new(repository, digests))
}
