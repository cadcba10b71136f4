//! Kubernetes REST API workload source.

use super::{WorkloadList, WorkloadSource};
use crate::{Error, Result};
use reqwest::Url;
use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};

/// In-cluster API server address.
pub const DEFAULT_API_URL: &str = "https://kubernetes.default.svc";

/// Service-account token mounted into every pod.
pub const SERVICE_ACCOUNT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Service-account CA bundle mounted into every pod.
pub const SERVICE_ACCOUNT_CA_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Cluster-wide list endpoints that declare images.
const WORKLOAD_ENDPOINTS: [&str; 2] = ["api/v1/pods", "apis/apps/v1/replicasets"];

/// Configuration for [`KubeApiSource`].
#[derive(Debug, Clone)]
pub struct KubeApiConfig {
    /// API server base URL.
    pub api_url: String,
    /// Bearer token. Read from `token_file` when unset.
    pub token: Option<SecretString>,
    /// Token file path.
    pub token_file: PathBuf,
    /// Extra CA bundle (PEM) to trust.
    pub ca_file: Option<PathBuf>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for KubeApiConfig {
    fn default() -> Self {
        let ca = Path::new(SERVICE_ACCOUNT_CA_PATH);
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            token_file: PathBuf::from(SERVICE_ACCOUNT_TOKEN_PATH),
            ca_file: ca.exists().then(|| ca.to_path_buf()),
            timeout: Duration::from_secs(30),
        }
    }
}

impl KubeApiConfig {
    /// Resolves the bearer token.
    ///
    /// An explicit token wins. Otherwise the token file is read if it
    /// exists; a missing file means anonymous access.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the token file exists but
    /// cannot be read.
    pub fn resolve_token(&self) -> Result<Option<SecretString>> {
        if let Some(token) = &self.token {
            return Ok(Some(token.clone()));
        }
        if !self.token_file.exists() {
            return Ok(None);
        }

        let token = std::fs::read_to_string(&self.token_file).map_err(|e| Error::OperationFailed {
            operation: "read_kube_token".to_string(),
            cause: format!("{}: {e}", self.token_file.display()),
        })?;
        let token = token.trim();
        Ok((!token.is_empty()).then(|| SecretString::from(token.to_string())))
    }
}

/// Lists pods and replica sets across all namespaces.
pub struct KubeApiSource {
    base: Url,
    token: Option<SecretString>,
    client: Client,
}

impl KubeApiSource {
    /// Creates a new API source.
    ///
    /// Must be called outside of an async context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a bad URL or CA bundle, or
    /// [`Error::OperationFailed`] if the client cannot be built.
    pub fn new(config: &KubeApiConfig) -> Result<Self> {
        let mut normalized = config.api_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base = Url::parse(&normalized).map_err(|e| {
            Error::InvalidInput(format!("invalid cluster API URL '{}': {e}", config.api_url))
        })?;

        let mut builder = Client::builder()
            .user_agent(format!("tagreaper/{}", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout);

        if let Some(ca_file) = &config.ca_file {
            let pem = std::fs::read(ca_file).map_err(|e| Error::OperationFailed {
                operation: "read_kube_ca".to_string(),
                cause: format!("{}: {e}", ca_file.display()),
            })?;
            let certificate = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                Error::InvalidInput(format!("invalid CA bundle {}: {e}", ca_file.display()))
            })?;
            builder = builder.add_root_certificate(certificate);
        }

        let client = builder.build().map_err(|e| Error::OperationFailed {
            operation: "kube_client_build".to_string(),
            cause: e.to_string(),
        })?;

        Ok(Self {
            base,
            token: config.resolve_token()?,
            client,
        })
    }

    fn fetch(&self, endpoint: &str) -> Result<WorkloadList> {
        let source = format!("{}{endpoint}", self.base);
        let url = self
            .base
            .join(endpoint)
            .map_err(|e| Error::collection(&source, e))?;

        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .map_err(|e| Error::collection(&source, format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::collection(&source, format!("HTTP {status}")));
        }

        response
            .json::<WorkloadList>()
            .map_err(|e| Error::collection(&source, format!("malformed list: {e}")))
    }
}

impl WorkloadSource for KubeApiSource {
    fn name(&self) -> &str {
        self.base.as_str()
    }

    #[instrument(name = "tagreaper.cluster.list_images", skip(self), fields(api = %self.base))]
    fn list_image_references(&self) -> Result<Vec<String>> {
        let mut images = Vec::new();
        for endpoint in WORKLOAD_ENDPOINTS {
            let list = self.fetch(endpoint)?;
            debug!(endpoint, objects = list.items.len(), "Listed workloads");
            images.extend(list.images());
        }
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_without_files() -> KubeApiConfig {
        KubeApiConfig {
            token_file: PathBuf::from("/nonexistent/token"),
            ca_file: None,
            ..KubeApiConfig::default()
        }
    }

    #[test]
    fn test_explicit_token_wins() {
        let config = KubeApiConfig {
            token: Some(SecretString::from("explicit".to_string())),
            ..config_without_files()
        };
        let token = config.resolve_token().unwrap().unwrap();
        assert_eq!(token.expose_secret(), "explicit");
    }

    #[test]
    fn test_missing_token_file_is_anonymous() {
        assert!(config_without_files().resolve_token().unwrap().is_none());
    }

    #[test]
    fn test_token_file_is_trimmed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  sa-token  ").unwrap();

        let config = KubeApiConfig {
            token_file: file.path().to_path_buf(),
            ..config_without_files()
        };
        let token = config.resolve_token().unwrap().unwrap();
        assert_eq!(token.expose_secret(), "sa-token");
    }

    #[test]
    fn test_invalid_api_url() {
        let config = KubeApiConfig {
            api_url: "not a url".to_string(),
            ..config_without_files()
        };
        assert!(matches!(
            KubeApiSource::new(&config),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_source_name_is_api_url() {
        let config = KubeApiConfig {
            api_url: "https://10.0.0.1:6443".to_string(),
            ..config_without_files()
        };
        let source = KubeApiSource::new(&config).unwrap();
        assert_eq!(source.name(), "https://10.0.0.1:6443/");
    }
}
