//! Neighbor report produced by a digest run.

use std::fmt::Write as _;

use newsmorph_embeddings::{CacheStats, ItemId};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Nearest distinct neighbor of one corpus item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborRecord {
    pub item_id: ItemId,
    pub title: String,
    pub url: Option<String>,
    pub neighbor_id: ItemId,
    pub neighbor_title: String,
    /// Cosine similarity between the two items.
    pub score: f32,
}

/// An item that could not be embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub item_id: ItemId,
    pub title: String,
    pub error: String,
}

/// A source that could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Sources fetched successfully.
    pub sources_ok: usize,

    /// Sources that failed to fetch or parse.
    pub sources_failed: usize,

    /// Entries reported by all sources.
    pub entries_seen: usize,

    /// Entries dropped because their exact title was already in the corpus.
    pub duplicates: usize,

    /// New titles dropped by the corpus size cap. Repeated titles count as
    /// duplicates even past the cap.
    pub capped: usize,

    /// Items in the corpus.
    pub items: usize,

    /// Items with a usable vector.
    pub embedded: usize,
}

/// Ordered neighbor records plus everything that went wrong on the way.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NeighborReport {
    /// One record per embedded item that has a neighbor, in item order.
    pub records: Vec<NeighborRecord>,

    pub item_failures: Vec<ItemFailure>,

    pub source_failures: Vec<SourceFailure>,

    pub stats: RunStats,

    pub cache: CacheStats,
}

impl NeighborReport {
    /// Record for `item_id`, if it was ranked.
    pub fn record(&self, item_id: ItemId) -> Option<&NeighborRecord> {
        self.records.iter().find(|r| r.item_id == item_id)
    }

    /// Serialize the report as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Plain text: each item followed by its nearest neighbor.
    pub fn render_text(&self) -> String {
        let mut out = String::new();

        for record in &self.records {
            let _ = writeln!(out, "Q: {}", record.title);
            let _ = writeln!(
                out,
                "\t{} {} ({:.3})",
                record.neighbor_id, record.neighbor_title, record.score
            );
            out.push('\n');
        }

        if !self.item_failures.is_empty() || !self.source_failures.is_empty() {
            let _ = writeln!(
                out,
                "# {} item(s) not embedded, {} source(s) failed",
                self.item_failures.len(),
                self.source_failures.len()
            );
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> NeighborReport {
        NeighborReport {
            records: vec![NeighborRecord {
                item_id: 0,
                title: "Storm hits coast".to_string(),
                url: None,
                neighbor_id: 1,
                neighbor_title: "Coastal storm causes damage".to_string(),
                score: 0.99,
            }],
            ..NeighborReport::default()
        }
    }

    #[test]
    fn test_render_text() {
        assert_eq!(
            sample().render_text(),
            "Q: Storm hits coast\n\t1 Coastal storm causes damage (0.990)\n\n"
        );
    }

    #[test]
    fn test_render_text_mentions_failures() {
        let mut report = sample();
        report.item_failures.push(ItemFailure {
            item_id: 2,
            title: "x".to_string(),
            error: "timeout".to_string(),
        });

        assert!(
            report
                .render_text()
                .ends_with("# 1 item(s) not embedded, 0 source(s) failed\n")
        );
    }

    #[test]
    fn test_json_shape() {
        let json: serde_json::Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();

        assert_eq!(json["records"][0]["neighbor_id"], 1);
        assert_eq!(json["records"][0]["title"], "Storm hits coast");
        assert_eq!(json["cache"]["hits"], 0);
        assert!(sample().record(0).is_some());
        assert!(sample().record(1).is_none());
    }
}
