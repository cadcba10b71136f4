//! Digest records and repositories.

use serde::{Deserialize, Serialize};

/// One image digest within a repository.
///
/// Tags keep the order reported by the registry. The retention predicates
/// derived from a record are never stored on it; they are recomputed on
/// every evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestRecord {
    /// Content-addressed identifier, unique within the repository.
    pub digest: String,
    /// Tags naming this digest. May be empty.
    pub tags: Vec<String>,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at_ms: i64,
}

impl DigestRecord {
    /// Creates a new digest record.
    #[must_use]
    pub fn new(digest: impl Into<String>, tags: Vec<String>, created_at_ms: i64) -> Self {
        Self {
            digest: digest.into(),
            tags,
            created_at_ms,
        }
    }

    /// Returns `true` if the digest has no tags.
    #[must_use]
    pub fn is_untagged(&self) -> bool {
        self.tags.is_empty()
    }
}

/// A registry repository and its digests.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Repository {
    /// Repository path relative to the registry host (e.g. `acme/api`).
    pub name: String,
    /// Digests stored in the repository.
    pub digests: Vec<DigestRecord>,
}

impl Repository {
    /// Creates a repository from its name and digests.
    #[must_use]
    pub fn new(name: impl Into<String>, digests: Vec<DigestRecord>) -> Self {
        Self {
            name: name.into(),
            digests,
        }
    }

    /// Returns `true` if the repository holds no digests.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Returns the number of digests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.digests.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_record() {
        let record = DigestRecord::new("sha256:abc", Vec::new(), 0);
        assert!(record.is_untagged());

        let record = DigestRecord::new("sha256:abc", vec!["latest".to_string()], 0);
        assert!(!record.is_untagged());
    }

    #[test]
    fn test_repository_len() {
        let repo = Repository::new(
            "acme/api",
            vec![
                DigestRecord::new("sha256:a", vec!["v1".to_string()], 1),
                DigestRecord::new("sha256:b", vec!["v2".to_string(), "latest".to_string()], 2),
            ],
        );

        assert_eq!(repo.len(), 2);
        assert!(!repo.is_empty());
        assert!(Repository::new("acme/empty", Vec::new()).is_empty());
    }
}
