//! Insertion-ordered corpus of text items and their normalized vectors.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::similarity::{UNIT_NORM_TOLERANCE, l2_norm};

/// Position of an item in the corpus. Assigned in insertion order.
pub type ItemId = usize;

/// One corpus entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextItem {
    /// Insertion index.
    pub id: ItemId,

    /// Display title; also the dedup key.
    pub title: String,

    /// Text that gets embedded.
    pub body: String,

    /// Link to the original article, if the feed had one.
    pub url: Option<String>,

    /// Name of the source that contributed the item.
    pub source: Option<String>,
}

/// Deduplicated, insertion-ordered corpus.
///
/// Items are deduplicated on their exact title. Near-duplicate titles are
/// kept; telling those apart is the similarity matrix's job.
#[derive(Debug, Default)]
pub struct CorpusIndex {
    items: Vec<TextItem>,
    vectors: Vec<Option<Embedding>>,
    seen_titles: HashSet<String>,
    dimension: Option<usize>,
}

impl CorpusIndex {
    /// Create an empty corpus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item. Returns `None` if an item with the same title exists.
    pub fn add(&mut self, title: impl Into<String>, body: impl Into<String>) -> Option<ItemId> {
        self.insert(title.into(), body.into(), None, None)
    }

    /// Add an item carrying its link and source name.
    pub fn add_with_origin(
        &mut self,
        title: impl Into<String>,
        body: impl Into<String>,
        url: Option<String>,
        source: Option<String>,
    ) -> Option<ItemId> {
        self.insert(title.into(), body.into(), url, source)
    }

    fn insert(
        &mut self,
        title: String,
        body: String,
        url: Option<String>,
        source: Option<String>,
    ) -> Option<ItemId> {
        if self.seen_titles.contains(&title) {
            debug!("Skipping duplicate title: {title}");
            return None;
        }

        let id = self.items.len();
        self.seen_titles.insert(title.clone());
        self.items.push(TextItem {
            id,
            title,
            body,
            url,
            source,
        });
        self.vectors.push(None);

        Some(id)
    }

    /// Store the normalized vector for `id`.
    ///
    /// Every vector must share the first vector's dimension and be unit length.
    pub fn set_vector(&mut self, id: ItemId, vector: Embedding) -> Result<()> {
        if id >= self.items.len() {
            return Err(EmbeddingError::UnknownItem(id));
        }

        if let Some(expected) = self.dimension {
            if vector.len() != expected {
                return Err(EmbeddingError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let norm = l2_norm(&vector);
        if (norm - 1.0).abs() > UNIT_NORM_TOLERANCE {
            return Err(EmbeddingError::NotNormalized { norm });
        }

        self.dimension.get_or_insert(vector.len());
        self.vectors[id] = Some(vector);
        Ok(())
    }

    /// Get an item by id.
    pub fn get(&self, id: ItemId) -> Option<&TextItem> {
        self.items.get(id)
    }

    /// Vector stored for `id`, if any.
    pub fn vector(&self, id: ItemId) -> Option<&[f32]> {
        self.vectors.get(id).and_then(|v| v.as_deref())
    }

    /// All items in insertion order.
    pub fn items(&self) -> &[TextItem] {
        &self.items
    }

    /// Items that have a vector, with that vector, in insertion order.
    pub fn vectors(&self) -> Vec<(ItemId, &[f32])> {
        self.vectors
            .iter()
            .enumerate()
            .filter_map(|(id, v)| v.as_deref().map(|v| (id, v)))
            .collect()
    }

    /// Whether an item with exactly this title was added.
    pub fn contains_title(&self, title: &str) -> bool {
        self.seen_titles.contains(title)
    }

    /// Dimension shared by the stored vectors.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the corpus is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of items with a vector.
    pub fn embedded_len(&self) -> usize {
        self.vectors.iter().filter(|v| v.is_some()).count()
    }
}
