//! Config CLI command.
//!
//! Renders the resolved configuration with secrets redacted.

use crate::config::ReaperConfig;
use crate::observability::MetricsConfig;
use std::fmt::Write;

const REDACTED: &str = "<redacted>";
const UNSET: &str = "(not set)";

/// Renders the resolved configuration.
#[must_use]
pub fn render_config(config: &ReaperConfig) -> String {
    let mut out = String::new();
    let secret = |value: bool| if value { REDACTED } else { UNSET };
    let or_unset = |value: Option<&str>| value.unwrap_or(UNSET).to_string();

    let _ = writeln!(out, "Current Configuration");
    let _ = writeln!(out, "=====================");
    let _ = writeln!(
        out,
        "Config File: {}",
        config
            .source
            .as_ref()
            .map_or_else(|| "(defaults)".to_string(), |p| p.display().to_string())
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "Registry:");
    let _ = writeln!(out, "  URL: {}", or_unset(config.registry_url.as_deref()));
    let _ = writeln!(out, "  Project: {}", or_unset(config.project.as_deref()));
    let _ = writeln!(out, "  Token: {}", secret(config.registry_token.is_some()));
    let _ = writeln!(out, "  Timeout: {}s", config.registry_timeout.as_secs());
    let _ = writeln!(out);
    let _ = writeln!(out, "Policy:");
    let _ = writeln!(out, "  Keep Count: {}", config.keep_count);
    let _ = writeln!(out, "  Max Age Days: {}", config.max_age_days);
    let _ = writeln!(out, "  Tag Pattern: {}", config.tag_pattern);
    let _ = writeln!(out);
    let _ = writeln!(out, "Cluster:");
    match &config.cluster.workloads_file {
        Some(path) => {
            let _ = writeln!(out, "  Workloads File: {}", path.display());
        },
        None => {
            let _ = writeln!(out, "  API URL: {}", config.cluster.api_url);
            let _ = writeln!(out, "  Token: {}", secret(config.cluster.token.is_some()));
            let _ = writeln!(out, "  Token File: {}", config.cluster.token_file.display());
        },
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Concurrency: {}", config.concurrency);
    let _ = writeln!(out, "Dry Run: {}", config.dry_run);
    let _ = writeln!(
        out,
        "Log Level: {}",
        or_unset(config.logging.level.as_deref())
    );
    let metrics = MetricsConfig::from_settings(&config.metrics, config.project.as_deref());
    let _ = writeln!(
        out,
        "Metrics: {}",
        if metrics.enabled { "enabled" } else { "disabled" }
    );
    if let Some(gateway) = &metrics.push_gateway {
        let _ = writeln!(out, "  Push Gateway: {}", gateway.endpoint);
    }
    out
}
