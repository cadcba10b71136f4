//! Run report rendering.

use super::{OutputFormat, short_digest, to_json};
use crate::Result;
use crate::services::RunReport;
use std::fmt::Write;

/// Renders a run report.
///
/// JSON output omits per-digest decisions; use `plan` for those.
pub fn render_run_report(report: &RunReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let mut report = report.clone();
            for repository in &mut report.repositories {
                repository.decisions.clear();
            }
            to_json(&report)
        },
        OutputFormat::Text => Ok(render_text(report)),
    }
}

fn render_text(report: &RunReport) -> String {
    let mut out = String::new();
    let mode = if report.dry_run { " (dry run)" } else { "" };
    let _ = writeln!(out, "Collection run {}{mode}", report.run_id);
    let _ = writeln!(out);

    for repository in &report.repositories {
        if let Some(error) = &repository.error {
            let _ = writeln!(out, "  {:<40} FAILED: {error}", repository.repository);
            continue;
        }

        let _ = writeln!(
            out,
            "  {:<40} checked {:>4}  protected {:>4}  excluded {:>4}  evicted {:>4}  deleted {:>4}",
            repository.repository,
            repository.digests_checked,
            repository.protected,
            repository.excluded,
            repository.evicted,
            repository.deleted,
        );
        for failure in &repository.failures {
            let _ = writeln!(
                out,
                "    delete {} failed: {}",
                short_digest(&failure.digest),
                failure.reason
            );
        }
    }

    if !report.repositories.is_empty() {
        let _ = writeln!(out);
    }
    let _ = writeln!(out, "{} in {} ms", report.summary(), report.duration_ms);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{DigestFailure, RepositoryReport};

    fn report() -> RunReport {
        RunReport {
            run_id: "run-1".to_string(),
            duration_ms: 42,
            repositories: vec![
                RepositoryReport {
                    repository: "acme/api".to_string(),
                    digests_checked: 5,
                    protected: 3,
                    evicted: 2,
                    deleted: 1,
                    failures: vec![DigestFailure {
                        digest: "sha256:0123456789abcdef".to_string(),
                        reason: "HTTP 500".to_string(),
                    }],
                    ..RepositoryReport::default()
                },
                RepositoryReport::failed("acme/broken", "listing truncated", 1),
            ],
            ..RunReport::default()
        }
    }

    #[test]
    fn test_text_report() {
        let text = render_run_report(&report(), OutputFormat::Text).unwrap();
        assert!(text.starts_with("Collection run run-1\n"));
        assert!(text.contains("acme/broken"));
        assert!(text.contains("FAILED: listing truncated"));
        assert!(text.contains("delete sha256:0123456789ab failed: HTTP 500"));
        assert!(text.trim_end().ends_with("in 42 ms"));
    }

    #[test]
    fn test_json_report() {
        let json = render_run_report(&report(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["run_id"], "run-1");
        assert_eq!(value["repositories"][0]["deleted"], 1);
        assert_eq!(value["repositories"][1]["error"], "listing truncated");
        assert!(value["repositories"][0].get("decisions").is_none());
    }
}
