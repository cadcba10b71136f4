//! Plan rendering.
//!
//! Shows every digest with its predicates and the resulting decision.

use super::{OutputFormat, short_digest, to_json};
use crate::Result;
use crate::gc::EvictionDecision;
use crate::services::RunReport;
use chrono::{DateTime, Utc};
use std::fmt::Write;

/// Renders a plan.
pub fn render_plan(report: &RunReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(report),
        OutputFormat::Text => Ok(render_text(report)),
    }
}

fn render_text(report: &RunReport) -> String {
    let mut out = String::new();

    for repository in &report.repositories {
        if let Some(error) = &repository.error {
            let _ = writeln!(out, "{}: FAILED: {error}", repository.repository);
            let _ = writeln!(out);
            continue;
        }

        let _ = writeln!(
            out,
            "{} ({} digests, {} would be deleted)",
            repository.repository, repository.digests_checked, repository.evicted
        );
        if repository.decisions.is_empty() {
            let _ = writeln!(out);
            continue;
        }

        let _ = writeln!(
            out,
            "  {:<19}  {:<17}  {:<7}  {:<24}  TAGS",
            "DIGEST", "CREATED", "GATES", "DECISION"
        );
        let mut decisions: Vec<&EvictionDecision> = repository.decisions.iter().collect();
        decisions.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
        for decision in decisions {
            let _ = writeln!(
                out,
                "  {:<19}  {:<17}  {:<7}  {:<24}  {}",
                short_digest(&decision.digest),
                format_created(decision.created_at_ms),
                gates(decision),
                describe(decision),
                if decision.tags.is_empty() {
                    "<untagged>".to_string()
                } else {
                    decision.tags.join(",")
                }
            );
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "{}", report.summary());
    out
}

fn format_created(created_at_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(created_at_ms).map_or_else(
        || created_at_ms.to_string(),
        |created| created.format("%Y-%m-%d %H:%M").to_string(),
    )
}

/// Compact `R U A M` flags, one letter per holding predicate.
fn gates(decision: &EvictionDecision) -> String {
    let p = decision.predicates;
    [
        (p.recency, 'R'),
        (p.in_use, 'U'),
        (p.age, 'A'),
        (p.regex_match, 'M'),
    ]
    .iter()
    .map(|&(set, flag)| if set { flag } else { '-' })
    .collect()
}

fn describe(decision: &EvictionDecision) -> String {
    if decision.evict {
        "delete".to_string()
    } else {
        format!("keep ({})", decision.predicates.reason())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::Predicates;
    use crate::services::RepositoryReport;

    fn decision(digest: &str, tags: &[&str], created_at_ms: i64, p: Predicates) -> EvictionDecision {
        EvictionDecision {
            digest: digest.to_string(),
            tags: tags.iter().map(ToString::to_string).collect(),
            created_at_ms,
            predicates: p,
            evict: p.evict(),
        }
    }

    #[test]
    fn test_plan_text() {
        let decisions = vec![
            decision(
                "sha256:aaaaaaaaaaaaaaaa",
                &["v1"],
                0,
                Predicates {
                    regex_match: true,
                    ..Predicates::default()
                },
            ),
            decision(
                "sha256:bbbbbbbbbbbbbbbb",
                &[],
                1_700_000_000_000,
                Predicates {
                    recency: true,
                    age: true,
                    regex_match: true,
                    ..Predicates::default()
                },
            ),
        ];
        let report = RunReport {
            dry_run: true,
            repositories: vec![RepositoryReport::completed("acme/api", decisions, &[], 1)],
            ..RunReport::default()
        };

        let text = render_plan(&report, OutputFormat::Text).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "acme/api (2 digests, 1 would be deleted)");
        assert!(lines[2].contains("sha256:bbbbbbbbbbbb"));
        assert!(lines[2].contains("2023-11-14 22:13"));
        assert!(lines[2].contains("R-AM"));
        assert!(lines[2].contains("keep (recent)"));
        assert!(lines[2].ends_with("<untagged>"));
        assert!(lines[3].contains("1970-01-01 00:00"));
        assert!(lines[3].contains("---M"));
        assert!(lines[3].contains("delete"));
        assert!(text.trim_end().ends_with("would delete 1"));
    }

    #[test]
    fn test_plan_json_includes_decisions() {
        let decisions = vec![decision("sha256:a", &["v1"], 5, Predicates::default())];
        let report = RunReport {
            repositories: vec![RepositoryReport::completed("acme/api", decisions, &[], 1)],
            ..RunReport::default()
        };
        let json = render_plan(&report, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let decision = &value["repositories"][0]["decisions"][0];
        assert_eq!(decision["digest"], "sha256:a");
        assert_eq!(decision["predicates"]["regex_match"], false);
        assert_eq!(decision["evict"], false);
    }
}
