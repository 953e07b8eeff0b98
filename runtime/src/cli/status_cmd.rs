//! CLI handler for `tagharvest status`: summarize the checkpoint file.

use crate::checkpoint::CheckpointStore;
use crate::cli::output;
use crate::config::HarvestConfig;
use crate::model::ContentUnit;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Aggregate view of a checkpoint.
#[derive(Debug, Serialize, PartialEq)]
pub struct CheckpointSummary {
    pub rows: usize,
    pub authors: usize,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
    /// Most frequent tags, highest count first, ties by name.
    pub top_tags: Vec<(String, usize)>,
}

impl CheckpointSummary {
    pub fn of(units: &[ContentUnit], top: usize) -> Self {
        let mut tags: BTreeMap<&str, usize> = BTreeMap::new();
        let mut authors = BTreeSet::new();
        for unit in units {
            for tag in &unit.tags {
                *tags.entry(tag.as_str()).or_default() += 1;
            }
            if !unit.author.is_empty() {
                authors.insert(unit.author.as_str());
            }
        }
        let mut top_tags: Vec<(String, usize)> =
            tags.into_iter().map(|(t, n)| (t.to_string(), n)).collect();
        top_tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_tags.truncate(top);

        let times = units.iter().filter_map(|u| u.published_at);
        Self {
            rows: units.len(),
            authors: authors.len(),
            earliest: times.clone().min(),
            latest: times.max(),
            top_tags,
        }
    }
}

pub async fn run(config_path: Option<&Path>, checkpoint: Option<PathBuf>, top: usize) -> Result<()> {
    let config = HarvestConfig::load(config_path)?;
    let path = checkpoint.unwrap_or(config.checkpoint.path);
    let store = CheckpointStore::new(&path);
    let units = store
        .load()
        .with_context(|| format!("failed to read checkpoint {}", path.display()))?;
    let summary = CheckpointSummary::of(&units, top);

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "checkpoint": path.display().to_string(),
            "summary": summary,
        }));
        return Ok(());
    }

    println!("  Checkpoint: {}", path.display());
    println!("  Rows:       {}", summary.rows);
    println!("  Authors:    {}", summary.authors);
    if let (Some(earliest), Some(latest)) = (summary.earliest, summary.latest) {
        println!("  Span:       {earliest} .. {latest}");
    }
    if !summary.top_tags.is_empty() {
        println!();
        println!("  Top tags:");
        for (tag, count) in &summary.top_tags {
            println!("    {tag:<24} {count:>6}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EngagementCounts;

    fn unit(author: &str, tags: &[&str], at: Option<&str>) -> ContentUnit {
        ContentUnit {
            author: author.into(),
            published_at: at.and_then(crate::harvest::extract::parse_timestamp),
            body: tags.join(" "),
            engagement: EngagementCounts::default(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            mentions: BTreeSet::new(),
        }
    }

    #[test]
    fn test_summary_counts_tags_and_authors() {
        let units = vec![
            unit("a", &["#nifty50", "#sensex"], Some("2026-03-01T10:00:00Z")),
            unit("b", &["#nifty50"], None),
            unit("a", &["#banknifty", "#nifty50"], Some("2026-03-03T10:00:00Z")),
            unit("", &["#sensex"], None),
        ];
        let summary = CheckpointSummary::of(&units, 2);
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.authors, 2);
        assert_eq!(
            summary.top_tags,
            [("#nifty50".to_string(), 3), ("#sensex".to_string(), 2)]
        );
        assert_eq!(summary.earliest.unwrap().to_rfc3339(), "2026-03-01T10:00:00+00:00");
        assert_eq!(summary.latest.unwrap().to_rfc3339(), "2026-03-03T10:00:00+00:00");
    }

    #[test]
    fn test_empty_checkpoint_summary() {
        let summary = CheckpointSummary::of(&[], 10);
        assert_eq!(summary.rows, 0);
        assert!(summary.earliest.is_none());
        assert!(summary.top_tags.is_empty());
    }
}
