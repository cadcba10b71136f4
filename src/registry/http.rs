//! HTTP registry backend.
//!
//! Speaks the Docker Registry v2 API with the manifest metadata extension
//! used by Google Container Registry and Artifact Registry, where
//! `GET /v2/<name>/tags/list` returns a `manifest` map keyed by digest:
//!
//! ```json
//! {
//!   "name": "acme/api",
//!   "manifest": {
//!     "sha256:…": { "tag": ["v1"], "timeCreatedMs": "1700000000000" }
//!   }
//! }
//! ```
//!
//! A `Link` header on a catalog or listing response means the registry
//! paginated the result. Pagination is not followed; the listing is reported
//! as truncated instead.

use super::{RegistryBackend, in_project};
use crate::gc::DigestDeleter;
use crate::inventory::{RawListing, RawManifest};
use crate::models::canonical_host;
use crate::{Error, Result};
use reqwest::StatusCode;
use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, HeaderMap, LINK};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, instrument};

/// Manifest media types accepted on delete requests.
const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.v2+json, \
    application/vnd.docker.distribution.manifest.list.v2+json, \
    application/vnd.oci.image.manifest.v1+json, \
    application/vnd.oci.image.index.v1+json";

/// Configuration for [`HttpRegistry`].
#[derive(Debug, Clone)]
pub struct HttpRegistryConfig {
    /// Registry base URL (e.g. `https://gcr.io`).
    pub url: String,
    /// Pre-issued bearer token.
    pub token: Option<SecretString>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl HttpRegistryConfig {
    /// Creates a configuration for `url` with a 30 second timeout.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    repositories: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TagsListResponse {
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    manifest: Option<BTreeMap<String, RawManifest>>,
}

impl TagsListResponse {
    /// Returns the manifest map, failing when the registry does not serve
    /// manifest metadata for a repository that has tags.
    fn into_manifests(self, repository: &str) -> Result<BTreeMap<String, RawManifest>> {
        match self.manifest {
            Some(manifests) if !manifests.is_empty() || self.tags.is_empty() => Ok(manifests),
            _ => Err(Error::collection(
                repository,
                "registry did not return manifest metadata",
            )),
        }
    }
}

/// Registry backend over HTTP.
pub struct HttpRegistry {
    base: Url,
    host: String,
    token: Option<SecretString>,
    client: Client,
}

impl HttpRegistry {
    /// Creates a new HTTP registry backend.
    ///
    /// Must be called outside of an async context; the blocking client
    /// owns its own runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the URL is invalid, or
    /// [`Error::OperationFailed`] if the HTTP client cannot be built.
    pub fn new(config: HttpRegistryConfig) -> Result<Self> {
        let (base, host) = parse_base_url(&config.url)?;
        let client = Client::builder()
            .user_agent(format!("tagreaper/{}", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| Error::OperationFailed {
                operation: "registry_client_build".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self {
            base,
            host,
            token: config.token,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| Error::InvalidInput(format!("invalid registry path '{path}': {e}")))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    fn get(&self, source: &str, path: &str) -> Result<Response> {
        let url = self.endpoint(path)?;
        let response = self
            .authorize(self.client.get(url))
            .send()
            .map_err(|e| Error::collection(source, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::collection(source, format!("HTTP {status}")));
        }
        Ok(response)
    }

    fn delete_reference(&self, repository: &str, digest: &str, reference: &str) -> Result<()> {
        let url = self.endpoint(&format!("v2/{repository}/manifests/{reference}"))?;
        let response = self
            .authorize(self.client.delete(url).header(ACCEPT, MANIFEST_ACCEPT))
            .send()
            .map_err(|e| Error::Deletion {
                digest: digest.to_string(),
                cause: format!("DELETE {reference} failed: {e}"),
            })?;

        let status = response.status();
        if delete_succeeded(status) {
            debug!(repository, reference, status = status.as_u16(), "Deleted manifest reference");
            return Ok(());
        }

        let body = response.text().unwrap_or_default();
        Err(Error::Deletion {
            digest: digest.to_string(),
            cause: format!("DELETE {reference} returned HTTP {status}: {}", body.trim()),
        })
    }
}

impl RegistryBackend for HttpRegistry {
    fn registry_host(&self) -> &str {
        &self.host
    }

    #[instrument(name = "tagreaper.registry.catalog", skip(self), fields(host = %self.host))]
    fn list_repositories(&self, project: &str) -> Result<Vec<String>> {
        let source = format!("{}/v2/_catalog", self.host);
        let response = self.get(&source, "v2/_catalog")?;
        if is_truncated(response.headers()) {
            return Err(Error::collection(
                source,
                "catalog truncated; pagination is not supported",
            ));
        }

        let catalog: CatalogResponse = response
            .json()
            .map_err(|e| Error::collection(&source, format!("malformed catalog: {e}")))?;

        Ok(filter_repositories(catalog.repositories, project))
    }

    #[instrument(name = "tagreaper.registry.list_manifests", skip(self))]
    fn list_manifests(&self, repository: &str) -> Result<RawListing> {
        let response = self.get(repository, &format!("v2/{repository}/tags/list"))?;
        let truncated = is_truncated(response.headers());

        let listing: TagsListResponse = response
            .json()
            .map_err(|e| Error::collection(repository, format!("malformed tags list: {e}")))?;

        Ok(RawListing {
            repository: repository.to_string(),
            manifests: listing.into_manifests(repository)?,
            truncated,
        })
    }
}

impl DigestDeleter for HttpRegistry {
    /// Removes every tag, then the manifest itself.
    ///
    /// On failure the cause lists the tags already removed.
    fn delete_digest(&self, repository: &str, digest: &str, tags: &[String]) -> Result<()> {
        let mut removed = Vec::with_capacity(tags.len());
        for tag in tags {
            self.delete_reference(repository, digest, tag)
                .map_err(|e| with_removed_tags(e, &removed))?;
            removed.push(tag.as_str());
        }
        self.delete_reference(repository, digest, digest)
            .map_err(|e| with_removed_tags(e, &removed))
    }
}

/// Parses the registry base URL into a join-ready base and its host.
fn parse_base_url(raw: &str) -> Result<(Url, String)> {
    let mut normalized = raw.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }

    let url = Url::parse(&normalized)
        .map_err(|e| Error::InvalidInput(format!("invalid registry URL '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::InvalidInput(format!(
            "registry URL must use http or https: {raw}"
        )));
    }
    let Some(host) = url.host_str() else {
        return Err(Error::InvalidInput(format!("registry URL has no host: {raw}")));
    };

    // `Url` already drops a scheme-default port; `canonical_host` keeps the
    // same rule as workload references.
    let host = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let host = canonical_host(&host).to_string();
    Ok((url, host))
}

fn with_removed_tags(error: Error, removed: &[&str]) -> Error {
    match error {
        Error::Deletion { digest, cause } if !removed.is_empty() => Error::Deletion {
            digest,
            cause: format!("{cause} (tags already removed: {})", removed.join(", ")),
        },
        other => other,
    }
}

fn is_truncated(headers: &HeaderMap) -> bool {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains("rel=\"next\"") || value.contains("rel=next"))
}

fn filter_repositories(repositories: Vec<String>, project: &str) -> Vec<String> {
    let mut filtered: Vec<String> = repositories
        .into_iter()
        .filter(|repository| in_project(repository, project))
        .collect();
    filtered.sort();
    filtered.dedup();
    filtered
}

/// Accepted, OK and No Content mean deleted; Not Found means already gone.
fn delete_succeeded(status: StatusCode) -> bool {
    status.is_success() || status == StatusCode::NOT_FOUND
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::{MILLIS_PER_DAY, RetentionPolicy, evaluate, eviction_set};
    use crate::inventory::InUseIndex;
    use crate::models::DigestRecord;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_parse_base_url() {
        let (base, host) = parse_base_url("https://gcr.io").unwrap();
        assert_eq!(host, "gcr.io");
        assert_eq!(base.join("v2/_catalog").unwrap().as_str(), "https://gcr.io/v2/_catalog");

        let (_, host) = parse_base_url("http://localhost:5000/").unwrap();
        assert_eq!(host, "localhost:5000");

        let (_, host) = parse_base_url("https://registry.example.com:443").unwrap();
        assert_eq!(host, "registry.example.com");

        let (_, host) = parse_base_url("https://registry.example.com:8443").unwrap();
        assert_eq!(host, "registry.example.com:8443");
    }

    #[test]
    fn test_default_port_references_stay_in_use() {
        let (_, host) = parse_base_url("https://registry.example.com:443").unwrap();
        let index = InUseIndex::build(
            [
                "registry.example.com:443/acme/api:v1",
                "registry.example.com/acme/api:v2",
            ],
            &host,
        );
        assert!(index.contains("acme/api", "v1"));
        assert!(index.contains("acme/api", "v2"));

        let records = vec![
            DigestRecord::new("sha256:a", vec!["v1".to_string()], 0),
            DigestRecord::new("sha256:b", vec!["v2".to_string()], 0),
        ];
        let policy = RetentionPolicy::new(0, 0, ".*").unwrap();
        let decisions = evaluate(&records, index.tags_for("acme/api"), &policy, MILLIS_PER_DAY);
        assert!(eviction_set(&decisions).is_empty());
    }

    #[test]
    fn test_parse_base_url_rejects_invalid() {
        assert!(matches!(parse_base_url("gcr.io"), Err(Error::InvalidInput(_))));
        assert!(matches!(parse_base_url("ftp://gcr.io"), Err(Error::InvalidInput(_))));
        assert!(parse_base_url("").is_err());
    }

    #[test]
    fn test_is_truncated() {
        let mut headers = HeaderMap::new();
        assert!(!is_truncated(&headers));

        headers.insert(
            LINK,
            HeaderValue::from_static("</v2/_catalog?last=b&n=100>; rel=\"next\""),
        );
        assert!(is_truncated(&headers));
    }

    #[test]
    fn test_filter_repositories() {
        let repositories = vec![
            "acme/worker".to_string(),
            "other/api".to_string(),
            "acme/api".to_string(),
            "acme-labs/api".to_string(),
        ];
        assert_eq!(
            filter_repositories(repositories, "acme"),
            vec!["acme/api", "acme/worker"]
        );
    }

    #[test]
    fn test_delete_succeeded() {
        assert!(delete_succeeded(StatusCode::ACCEPTED));
        assert!(delete_succeeded(StatusCode::OK));
        assert!(delete_succeeded(StatusCode::NOT_FOUND));
        assert!(!delete_succeeded(StatusCode::FORBIDDEN));
        assert!(!delete_succeeded(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn test_tags_list_response() {
        let body = r#"{
            "child": [],
            "manifest": {
                "sha256:aaa": {"tag": ["v1"], "timeCreatedMs": "1000", "timeUploadedMs": "1001"},
                "sha256:bbb": {"tag": [], "timeCreatedMs": "2000"}
            },
            "name": "acme/api",
            "tags": ["v1"]
        }"#;
        let response: TagsListResponse = serde_json::from_str(body).unwrap();
        let manifests = response.into_manifests("acme/api").unwrap();
        assert_eq!(manifests.len(), 2);
        assert_eq!(manifests["sha256:aaa"].tags, vec!["v1"]);
    }

    #[test]
    fn test_plain_v2_tags_list_is_a_collection_error() {
        let body = r#"{"name": "acme/api", "tags": ["v1", "v2"]}"#;
        let response: TagsListResponse = serde_json::from_str(body).unwrap();
        let err = response.into_manifests("acme/api").unwrap_err();
        assert!(matches!(err, Error::Collection { .. }));
        assert!(err.to_string().contains("did not return manifest metadata"));
    }

    #[test]
    fn test_empty_manifest_map_with_tags_is_a_collection_error() {
        let body = r#"{"name": "acme/api", "tags": ["v1"], "manifest": {}}"#;
        let response: TagsListResponse = serde_json::from_str(body).unwrap();
        assert!(response.into_manifests("acme/api").is_err());
    }

    #[test]
    fn test_empty_repository_has_no_manifests() {
        let body = r#"{"name": "acme/api", "tags": [], "manifest": {}}"#;
        let response: TagsListResponse = serde_json::from_str(body).unwrap();
        assert!(response.into_manifests("acme/api").unwrap().is_empty());
    }

    #[test]
    fn test_deletion_cause_lists_removed_tags() {
        let err = Error::Deletion {
            digest: "sha256:aaa".to_string(),
            cause: "DELETE v2 returned HTTP 500".to_string(),
        };
        let err = with_removed_tags(err, &["v1", "latest"]);
        assert_eq!(
            err.to_string(),
            "failed to delete digest 'sha256:aaa': DELETE v2 returned HTTP 500 \
             (tags already removed: v1, latest)"
        );

        let err = Error::Deletion {
            digest: "sha256:aaa".to_string(),
            cause: "HTTP 500".to_string(),
        };
        assert_eq!(
            with_removed_tags(err, &[]).to_string(),
            "failed to delete digest 'sha256:aaa': HTTP 500"
        );
    }
}
