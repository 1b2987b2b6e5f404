//! Declared input-schema mapping for article sources
//!
//! Each canonical field lists the source column names that may carry it, in
//! priority order. Per row, the first listed column holding a non-empty
//! value wins. The topic field resolves to exactly one column.

use super::loader::RawTable;
use crate::{Error, Result};
use serde::Deserialize;
use tracing::info;

/// Upper bound on distinct values for a column to look like a topic column
const MAX_TOPIC_VALUES: usize = 50;

/// Source column → canonical field mapping
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArticleSchema {
    pub topic: Vec<String>,
    pub title: Vec<String>,
    pub content: Vec<String>,
    pub image_url: Vec<String>,
    pub author: Vec<String>,
    /// Multi-author columns (JSON lists are joined with ", ")
    pub authors: Vec<String>,
    pub publish_date: Vec<String>,
    pub stable_id: Vec<String>,
    /// Fall back to the distinct-count heuristic when no declared topic column exists
    pub detect_topic_column: bool,
    /// Refuse to load a source without a stable id column
    pub require_stable_id: bool,
}

impl Default for ArticleSchema {
    fn default() -> Self {
        fn names(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| s.to_string()).collect()
        }

        Self {
            topic: names(&["field20", "topic", "Category", "_cached_topics"]),
            title: names(&["Title", "title", "headline"]),
            content: names(&["Content", "content"]),
            image_url: names(&["Image URL", "image", "media", "image_url"]),
            author: names(&["Author", "author"]),
            authors: names(&["authors", "journalists"]),
            publish_date: names(&["Date", "published_date", "updated_date"]),
            stable_id: names(&["internal_id", "Internal ID", "field1"]),
            detect_topic_column: true,
            require_stable_id: false,
        }
    }
}

/// Column positions resolved against one source's header row
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedColumns {
    pub topic: usize,
    pub title: Vec<usize>,
    pub content: Vec<usize>,
    pub image_url: Vec<usize>,
    pub author: Vec<usize>,
    pub authors: Vec<usize>,
    pub publish_date: Vec<usize>,
    pub stable_id: Vec<usize>,
}

impl ArticleSchema {
    /// Resolve declared names to column positions
    ///
    /// Fails when no title column or no topic column can be found.
    pub fn resolve(&self, raw: &RawTable) -> Result<ResolvedColumns> {
        let positions = |names: &[String]| -> Vec<usize> {
            names.iter().filter_map(|name| raw.column_index(name)).collect()
        };

        let title = positions(&self.title);
        if title.is_empty() {
            return Err(Error::ArticleSource(format!(
                "No title column found (looked for {:?}, have {:?})",
                self.title, raw.columns
            )));
        }

        Ok(ResolvedColumns {
            topic: self.resolve_topic_column(raw)?,
            title,
            content: positions(&self.content),
            image_url: positions(&self.image_url),
            author: positions(&self.author),
            authors: positions(&self.authors),
            publish_date: positions(&self.publish_date),
            stable_id: positions(&self.stable_id),
        })
    }

    fn resolve_topic_column(&self, raw: &RawTable) -> Result<usize> {
        if let Some(idx) = self.topic.iter().find_map(|name| raw.column_index(name)) {
            return Ok(idx);
        }

        if self.detect_topic_column {
            let detected = (0..raw.columns.len()).find(|&idx| {
                let distinct = raw.distinct_count(idx);
                distinct > 1 && distinct <= MAX_TOPIC_VALUES
            });
            if let Some(idx) = detected {
                info!(
                    "No declared topic column present; detected '{}' by distinct-value count",
                    raw.columns[idx]
                );
                return Ok(idx);
            }
        }

        Err(Error::ArticleSource(format!(
            "No topic column found (declared {:?}, detection {})",
            self.topic,
            if self.detect_topic_column { "found nothing" } else { "disabled" }
        )))
    }
}
