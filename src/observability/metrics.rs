//! Prometheus metrics.
//!
//! A collection run is a short-lived batch job, so the recorder is installed
//! without an HTTP listener. When a push gateway is configured the rendered
//! metrics are pushed once at shutdown.

use crate::config::MetricsSettings;
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use std::thread;
use std::time::Duration;

/// Push gateway configuration.
#[derive(Debug, Clone)]
pub struct PushGatewayConfig {
    /// Push gateway endpoint URI (`.../metrics/job/<job>`).
    pub endpoint: String,
    /// Optional username for basic auth.
    pub username: Option<String>,
    /// Optional password for basic auth.
    pub password: Option<SecretString>,
    /// Whether to use HTTP POST instead of PUT.
    pub use_http_post: bool,
}

impl PushGatewayConfig {
    /// Returns the push URL, grouped by project when one is set.
    #[must_use]
    pub fn push_url(&self, project: Option<&str>) -> String {
        match project.filter(|project| !project.is_empty()) {
            Some(project) => format!(
                "{}/project/{}",
                self.endpoint.trim_end_matches('/'),
                project.replace('/', "_")
            ),
            None => self.endpoint.clone(),
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Default)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,
    /// Optional push gateway configuration.
    pub push_gateway: Option<PushGatewayConfig>,
    /// Project used as the push gateway grouping key.
    pub project: Option<String>,
}

impl MetricsConfig {
    /// Builds metrics configuration from resolved settings.
    ///
    /// Configuring a push gateway implies `enabled` unless it is explicitly
    /// turned off.
    #[must_use]
    pub fn from_settings(settings: &MetricsSettings, project: Option<&str>) -> Self {
        let push_gateway = settings.push_gateway.as_ref().and_then(|gateway| {
            let endpoint = gateway
                .endpoint
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())?;
            Some(PushGatewayConfig {
                endpoint: endpoint.to_string(),
                username: gateway.username.clone().filter(|v| !v.is_empty()),
                password: gateway
                    .password
                    .clone()
                    .filter(|v| !v.is_empty())
                    .map(SecretString::from),
                // POST merges with the existing group instead of replacing it.
                use_http_post: gateway.use_http_post.unwrap_or(true),
            })
        });

        Self {
            enabled: settings.enabled.unwrap_or(push_gateway.is_some()),
            push_gateway,
            project: project.map(ToString::to_string),
        }
    }
}

/// Metrics handle for flushing on shutdown.
#[derive(Debug)]
pub struct MetricsHandle {
    prometheus: PrometheusHandle,
    push_url: Option<String>,
    push_gateway: Option<PushGatewayConfig>,
}

impl MetricsHandle {
    /// Renders the current metrics in the Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus.render()
    }
}

/// Installs the Prometheus recorder as the global metrics recorder.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if a recorder is already installed.
pub fn install_prometheus(config: &MetricsConfig) -> Result<Option<MetricsHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_recorder_install".to_string(),
            cause: e.to_string(),
        })?;

    describe_metrics();

    Ok(Some(MetricsHandle {
        prometheus,
        push_url: config
            .push_gateway
            .as_ref()
            .map(|gateway| gateway.push_url(config.project.as_deref())),
        push_gateway: config.push_gateway.clone(),
    }))
}

fn describe_metrics() {
    metrics::describe_counter!(
        "tagreaper_digests_evaluated_total",
        "Digests evaluated against the retention policy"
    );
    metrics::describe_counter!("tagreaper_digests_deleted_total", "Digests deleted");
    metrics::describe_counter!(
        "tagreaper_deletion_failures_total",
        "Digest deletions rejected by the registry"
    );
    metrics::describe_counter!(
        "tagreaper_repositories_total",
        "Repositories processed, by status"
    );
    metrics::describe_counter!("tagreaper_runs_total", "Collection runs, by status");
    metrics::describe_histogram!(
        "tagreaper_repository_duration_ms",
        metrics::Unit::Milliseconds,
        "Time spent collecting one repository"
    );
    metrics::describe_histogram!(
        "tagreaper_run_duration_ms",
        metrics::Unit::Milliseconds,
        "Time spent on a whole collection run"
    );
}

/// Flushes metrics to the push gateway if configured.
///
/// When called from within a tokio runtime, this spawns a separate thread
/// to avoid runtime nesting issues with `reqwest::blocking::Client`.
pub fn flush(handle: &MetricsHandle) {
    let (Some(push_gateway), Some(endpoint)) = (&handle.push_gateway, &handle.push_url) else {
        tracing::debug!("No push gateway configured, skipping flush");
        return;
    };

    let mut payload = handle.render();
    // The push gateway rejects payloads without a trailing newline.
    if !payload.ends_with('\n') {
        payload.push('\n');
    }

    tracing::debug!(bytes = payload.len(), endpoint = %endpoint, "Pushing metrics to push gateway");

    let gateway = push_gateway.clone();
    let endpoint = endpoint.clone();
    if tokio::runtime::Handle::try_current().is_ok() {
        let pusher = thread::spawn(move || push(&gateway, &endpoint, payload));
        let _ = pusher.join();
    } else {
        push(&gateway, &endpoint, payload);
    }
}

fn push(gateway: &PushGatewayConfig, endpoint: &str, payload: String) {
    let client = Client::new();
    let request = if gateway.use_http_post {
        client.post(endpoint)
    } else {
        client.put(endpoint)
    };

    let request = match &gateway.username {
        Some(username) => request.basic_auth(
            username,
            gateway
                .password
                .as_ref()
                .map(|password| password.expose_secret().to_string()),
        ),
        None => request,
    };

    let response = request
        .header(CONTENT_TYPE, "text/plain; version=0.0.4")
        .timeout(Duration::from_secs(5))
        .body(payload)
        .send();

    match response {
        Ok(resp) if resp.status().is_success() => {
            tracing::debug!(status = %resp.status(), "Metrics pushed successfully");
        },
        Ok(resp) => {
            tracing::warn!(status = %resp.status(), "Metrics push failed");
        },
        Err(err) => {
            tracing::warn!("Failed to push metrics: {err}");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PushGatewaySettings;

    #[test]
    fn test_disabled_by_default() {
        let config = MetricsConfig::from_settings(&MetricsSettings::default(), None);
        assert!(!config.enabled);
        assert!(config.push_gateway.is_none());
        assert!(install_prometheus(&config).unwrap().is_none());
    }

    #[test]
    fn test_push_gateway_enables_metrics() {
        let settings = MetricsSettings {
            enabled: None,
            push_gateway: Some(PushGatewaySettings {
                endpoint: Some(" http://gw:9091/metrics/job/tagreaper ".to_string()),
                ..PushGatewaySettings::default()
            }),
        };
        let config = MetricsConfig::from_settings(&settings, Some("acme/team"));
        assert!(config.enabled);

        let gateway = config.push_gateway.unwrap();
        assert!(gateway.use_http_post);
        assert_eq!(
            gateway.push_url(Some("acme/team")),
            "http://gw:9091/metrics/job/tagreaper/project/acme_team"
        );
        assert_eq!(gateway.push_url(None), "http://gw:9091/metrics/job/tagreaper");
    }

    #[test]
    fn test_blank_endpoint_is_ignored() {
        let settings = MetricsSettings {
            enabled: Some(true),
            push_gateway: Some(PushGatewaySettings {
                endpoint: Some("  ".to_string()),
                ..PushGatewaySettings::default()
            }),
        };
        let config = MetricsConfig::from_settings(&settings, None);
        assert!(config.enabled);
        assert!(config.push_gateway.is_none());
    }

    #[test]
    fn test_recorder_smoke() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("tagreaper_digests_deleted_total").increment(2);
        });
        assert!(handle.render().contains("tagreaper_digests_deleted_total 2"));
    }
}
