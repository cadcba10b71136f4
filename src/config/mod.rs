//! Configuration management.
//!
//! Settings are resolved with the precedence CLI flag, environment, config
//! file, default. The config file is TOML:
//!
//! ```toml
//! concurrency = 4
//! dry_run = false
//!
//! [registry]
//! url = "https://gcr.io"
//! project = "acme"
//!
//! [policy]
//! keep_count = 10
//! max_age_days = 365
//! tag_pattern = "^release-"
//!
//! [cluster]
//! api_url = "https://kubernetes.default.svc"
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [metrics]
//! enabled = true
//! push_gateway = { endpoint = "http://pushgateway:9091/metrics/job/tagreaper" }
//! ```

use crate::cluster::{DEFAULT_API_URL, KubeApiConfig, SERVICE_ACCOUNT_TOKEN_PATH};
use crate::gc::{DEFAULT_KEEP_COUNT, DEFAULT_MAX_AGE_DAYS, DEFAULT_TAG_PATTERN, RetentionPolicy};
use crate::registry::HttpRegistryConfig;
use crate::services::DEFAULT_CONCURRENCY;
use crate::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the config file path.
pub const CONFIG_PATH_ENV: &str = "TAGREAPER_CONFIG_PATH";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Registry section.
    pub registry: Option<RegistrySection>,
    /// Retention policy section.
    pub policy: Option<PolicySection>,
    /// Cluster section.
    pub cluster: Option<ClusterSection>,
    /// Repositories processed in parallel.
    pub concurrency: Option<usize>,
    /// Suppress deletions.
    pub dry_run: Option<bool>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
    /// Metrics section.
    pub metrics: Option<MetricsSettings>,
}

/// Registry section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RegistrySection {
    /// Registry base URL.
    pub url: Option<String>,
    /// Project prefix.
    pub project: Option<String>,
    /// Bearer token.
    pub token: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
}

/// Policy section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PolicySection {
    /// Number of most recent digests always kept.
    pub keep_count: Option<i64>,
    /// Digests younger than this many days are kept.
    pub max_age_days: Option<i64>,
    /// Pattern a tag must match for its digest to be eligible.
    pub tag_pattern: Option<String>,
}

/// Cluster section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ClusterSection {
    /// API server URL.
    pub api_url: Option<String>,
    /// Bearer token.
    pub token: Option<String>,
    /// Token file.
    pub token_file: Option<PathBuf>,
    /// CA bundle.
    pub ca_file: Option<PathBuf>,
    /// Read workloads from a `kubectl` JSON export instead of the API.
    pub workloads_file: Option<PathBuf>,
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// Filter directive (e.g. `info`, `tagreaper=debug`).
    pub level: Option<String>,
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Metrics settings.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsSettings {
    /// Whether metrics are recorded.
    pub enabled: Option<bool>,
    /// Push gateway flushed at exit.
    pub push_gateway: Option<PushGatewaySettings>,
}

/// Push gateway settings.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PushGatewaySettings {
    /// Push gateway endpoint URI.
    pub endpoint: Option<String>,
    /// Basic auth username.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Use HTTP POST instead of PUT.
    pub use_http_post: Option<bool>,
}

/// Cluster workload source configuration.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// API server URL.
    pub api_url: String,
    /// Explicit bearer token.
    pub token: Option<SecretString>,
    /// Token file read when no explicit token is set.
    pub token_file: PathBuf,
    /// CA bundle.
    pub ca_file: Option<PathBuf>,
    /// Workload export file; takes precedence over the API.
    pub workloads_file: Option<PathBuf>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            token_file: PathBuf::from(SERVICE_ACCOUNT_TOKEN_PATH),
            ca_file: None,
            workloads_file: None,
        }
    }
}

/// Resolved tagreaper configuration.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Registry base URL.
    pub registry_url: Option<String>,
    /// Project prefix.
    pub project: Option<String>,
    /// Registry bearer token.
    pub registry_token: Option<SecretString>,
    /// Registry request timeout.
    pub registry_timeout: Duration,
    /// Keep count, unvalidated.
    pub keep_count: i64,
    /// Max age in days, unvalidated.
    pub max_age_days: i64,
    /// Tag pattern, unvalidated.
    pub tag_pattern: String,
    /// Cluster workload source.
    pub cluster: ClusterConfig,
    /// Repositories processed in parallel.
    pub concurrency: usize,
    /// Suppress deletions.
    pub dry_run: bool,
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Metrics settings.
    pub metrics: MetricsSettings,
    /// Config file the settings were loaded from.
    pub source: Option<PathBuf>,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            registry_url: None,
            project: None,
            registry_token: None,
            registry_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            keep_count: i64::try_from(DEFAULT_KEEP_COUNT).unwrap_or(i64::MAX),
            max_age_days: i64::from(DEFAULT_MAX_AGE_DAYS),
            tag_pattern: DEFAULT_TAG_PATTERN.to_string(),
            cluster: ClusterConfig::default(),
            concurrency: DEFAULT_CONCURRENCY,
            dry_run: false,
            logging: LoggingSettings::default(),
            metrics: MetricsSettings::default(),
            source: None,
        }
    }
}

impl ReaperConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        let file: ConfigFile = toml::from_str(&contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        let mut config = Self::from_config_file(file);
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Loads configuration and applies environment overrides.
    ///
    /// The file is `explicit` if given, else `TAGREAPER_CONFIG_PATH`, else
    /// the platform config dir (`~/.config/tagreaper/config.toml` on Linux)
    /// when it exists. Without any file the defaults apply.
    ///
    /// # Errors
    ///
    /// Returns an error if a named file cannot be loaded or an environment
    /// value is malformed.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| env_string(CONFIG_PATH_ENV).map(PathBuf::from));

        let config = match named {
            Some(path) => Self::load_from_file(&path)?,
            None => match default_config_path().filter(|path| path.exists()) {
                Some(path) => Self::load_from_file(&path)?,
                None => Self::default(),
            },
        };

        config.with_env_overrides()
    }

    /// Converts a `ConfigFile` to `ReaperConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(registry) = file.registry {
            config.registry_url = registry.url.or(config.registry_url);
            config.project = registry.project.or(config.project);
            if let Some(token) = registry.token {
                config.registry_token = Some(SecretString::from(token));
            }
            if let Some(secs) = registry.timeout_secs {
                config.registry_timeout = Duration::from_secs(secs);
            }
        }
        if let Some(policy) = file.policy {
            if let Some(v) = policy.keep_count {
                config.keep_count = v;
            }
            if let Some(v) = policy.max_age_days {
                config.max_age_days = v;
            }
            if let Some(v) = policy.tag_pattern {
                config.tag_pattern = v;
            }
        }
        if let Some(cluster) = file.cluster {
            if let Some(v) = cluster.api_url {
                config.cluster.api_url = v;
            }
            if let Some(token) = cluster.token {
                config.cluster.token = Some(SecretString::from(token));
            }
            if let Some(v) = cluster.token_file {
                config.cluster.token_file = v;
            }
            config.cluster.ca_file = cluster.ca_file;
            config.cluster.workloads_file = cluster.workloads_file;
        }
        if let Some(v) = file.concurrency {
            config.concurrency = v;
        }
        if let Some(v) = file.dry_run {
            config.dry_run = v;
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }
        if let Some(metrics) = file.metrics {
            config.metrics = metrics;
        }

        config
    }

    /// Applies `TAGREAPER_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a numeric or boolean variable
    /// cannot be parsed.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a numeric or boolean value cannot
    /// be parsed.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(v) = get("TAGREAPER_REGISTRY_URL") {
            self.registry_url = Some(v);
        }
        if let Some(v) = get("TAGREAPER_REGISTRY_PROJECT") {
            self.project = Some(v);
        }
        if let Some(v) = get("TAGREAPER_REGISTRY_TOKEN") {
            self.registry_token = Some(SecretString::from(v));
        }
        if let Some(v) = get("TAGREAPER_REGISTRY_TIMEOUT_SECS") {
            let secs = parse_value("TAGREAPER_REGISTRY_TIMEOUT_SECS", &v)?;
            self.registry_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = get("TAGREAPER_KEEP_COUNT") {
            self.keep_count = parse_value("TAGREAPER_KEEP_COUNT", &v)?;
        }
        if let Some(v) = get("TAGREAPER_MAX_AGE_DAYS") {
            self.max_age_days = parse_value("TAGREAPER_MAX_AGE_DAYS", &v)?;
        }
        if let Some(v) = lookup("TAGREAPER_TAG_PATTERN") {
            self.tag_pattern = v;
        }
        if let Some(v) = get("TAGREAPER_KUBE_API_URL") {
            self.cluster.api_url = v;
        }
        if let Some(v) = get("TAGREAPER_KUBE_TOKEN") {
            self.cluster.token = Some(SecretString::from(v));
        }
        if let Some(v) = get("TAGREAPER_KUBE_TOKEN_FILE") {
            self.cluster.token_file = PathBuf::from(v);
        }
        if let Some(v) = get("TAGREAPER_KUBE_CA_FILE") {
            self.cluster.ca_file = Some(PathBuf::from(v));
        }
        if let Some(v) = get("TAGREAPER_WORKLOADS_FILE") {
            self.cluster.workloads_file = Some(PathBuf::from(v));
        }
        if let Some(v) = get("TAGREAPER_CONCURRENCY") {
            self.concurrency = parse_value("TAGREAPER_CONCURRENCY", &v)?;
        }
        if let Some(v) = get("TAGREAPER_DRY_RUN") {
            self.dry_run = parse_bool("TAGREAPER_DRY_RUN", &v)?;
        }
        if let Some(v) = get("TAGREAPER_LOG_LEVEL") {
            self.logging.level = Some(v);
        }
        if let Some(v) = get("TAGREAPER_LOG_FORMAT") {
            self.logging.format = Some(v);
        }
        if let Some(v) = get("TAGREAPER_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(v));
        }
        if let Some(v) = get("TAGREAPER_METRICS_ENABLED") {
            self.metrics.enabled = Some(parse_bool("TAGREAPER_METRICS_ENABLED", &v)?);
        }

        let gateway_endpoint = get("TAGREAPER_METRICS_PUSH_GATEWAY_ENDPOINT");
        let gateway_username = get("TAGREAPER_METRICS_PUSH_GATEWAY_USERNAME");
        let gateway_password = get("TAGREAPER_METRICS_PUSH_GATEWAY_PASSWORD");
        if gateway_endpoint.is_some() || gateway_username.is_some() || gateway_password.is_some() {
            let gateway = self
                .metrics
                .push_gateway
                .get_or_insert_with(PushGatewaySettings::default);
            if gateway_endpoint.is_some() {
                gateway.endpoint = gateway_endpoint;
            }
            if gateway_username.is_some() {
                gateway.username = gateway_username;
            }
            if gateway_password.is_some() {
                gateway.password = gateway_password;
            }
        }

        Ok(self)
    }

    /// Builds the validated retention policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Policy`] for negative values or an invalid pattern.
    pub fn retention_policy(&self) -> Result<RetentionPolicy> {
        RetentionPolicy::new(self.keep_count, self.max_age_days, &self.tag_pattern)
    }

    /// Returns the project prefix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if no project is configured.
    pub fn project(&self) -> Result<&str> {
        self.project
            .as_deref()
            .map(|project| project.trim_matches('/'))
            .filter(|project| !project.is_empty())
            .ok_or_else(|| {
                Error::InvalidInput(
                    "registry project is required (registry.project or TAGREAPER_REGISTRY_PROJECT)"
                        .to_string(),
                )
            })
    }

    /// Builds the registry client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if no registry URL is configured.
    pub fn registry_config(&self) -> Result<HttpRegistryConfig> {
        let url = self
            .registry_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                Error::InvalidInput(
                    "registry URL is required (registry.url or TAGREAPER_REGISTRY_URL)".to_string(),
                )
            })?;

        let mut config = HttpRegistryConfig::new(url).with_timeout(self.registry_timeout);
        if let Some(token) = &self.registry_token {
            config = config.with_token(token.clone());
        }
        Ok(config)
    }

    /// Builds the Kubernetes API source configuration.
    #[must_use]
    pub fn kube_config(&self) -> KubeApiConfig {
        let defaults = KubeApiConfig::default();
        KubeApiConfig {
            api_url: self.cluster.api_url.clone(),
            token: self.cluster.token.clone(),
            token_file: self.cluster.token_file.clone(),
            ca_file: self.cluster.ca_file.clone().or(defaults.ca_file),
            timeout: self.registry_timeout,
        }
    }

    /// Validates everything a collection run needs.
    ///
    /// # Errors
    ///
    /// Returns the first policy or input error found.
    pub fn validate(&self) -> Result<RetentionPolicy> {
        let policy = self.retention_policy()?;
        self.project()?;
        self.registry_config()?;
        if self.concurrency == 0 {
            return Err(Error::InvalidInput("concurrency must be at least 1".to_string()));
        }
        Ok(policy)
    }
}

/// Returns the platform default config file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "tagreaper")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| Error::InvalidInput(format!("{key}={value}: {e}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidInput(format!("{key}={value}: expected a boolean"))),
    }
}
