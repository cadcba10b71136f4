//! In-use index rendering.

use super::{OutputFormat, to_json};
use crate::Result;
use crate::inventory::InUseIndex;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Renders the tags cluster workloads reference, grouped by repository.
pub fn render_in_use(index: &InUseIndex, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let grouped: BTreeMap<&str, Vec<&str>> = index.iter_sorted().collect();
            to_json(&grouped)
        },
        OutputFormat::Text => {
            let mut out = String::new();
            for (repository, tags) in index.iter_sorted() {
                let _ = writeln!(out, "{repository}: {}", tags.join(", "));
            }
            let _ = writeln!(
                out,
                "{} tags in use across {} repositories",
                index.tag_count(),
                index.repository_count()
            );
            Ok(out)
        },
    }
}
