//! In-memory article table
//!
//! Loaded once at startup from a CSV file or a SQLite export and shared
//! read-only across all requests. Supports lookup by id and filtering by
//! topic; topic comparison is case-insensitive and whitespace-trimmed.

mod loader;
mod schema;

pub use loader::{load_article_table, load_csv, load_sqlite, ArticleSourceKind, RawTable};
pub use schema::{ArticleSchema, ResolvedColumns};

use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

/// Row-position identifier assigned at load time
///
/// Only stable across reloads of the same source file; see
/// [`Article::stable_id`] for the cross-reload identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ArticleId(pub i64);

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One article of the corpus (immutable after load)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Article {
    pub id: ArticleId,
    /// Identifier from the source data, if the source has one
    pub stable_id: Option<String>,
    pub title: String,
    pub content: String,
    pub image_url: String,
    pub author: Option<String>,
    pub publish_date: Option<String>,
    /// Topic as it appears in the source
    pub topic: String,
}

impl Article {
    /// Normalized topic used for comparisons
    pub fn topic_key(&self) -> String {
        normalize_topic(&self.topic)
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.topic_key() == normalize_topic(topic)
    }
}

/// Trim and lowercase a topic value
pub fn normalize_topic(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Queryable article table
#[derive(Debug, Clone)]
pub struct ArticleTable {
    articles: Vec<Article>,
    by_id: HashMap<ArticleId, usize>,
    by_topic: HashMap<String, Vec<usize>>,
    columns: Vec<String>,
    topic_column: String,
    has_stable_ids: bool,
}

impl ArticleTable {
    /// Build from already-constructed articles (tests, fixtures)
    pub fn from_articles(articles: Vec<Article>, topic_column: impl Into<String>) -> Self {
        let has_stable_ids = !articles.is_empty() && articles.iter().all(|a| a.stable_id.is_some());
        let mut by_id = HashMap::with_capacity(articles.len());
        let mut by_topic: HashMap<String, Vec<usize>> = HashMap::new();
        for (pos, article) in articles.iter().enumerate() {
            by_id.insert(article.id, pos);
            by_topic.entry(article.topic_key()).or_default().push(pos);
        }

        Self {
            articles,
            by_id,
            by_topic,
            columns: Vec::new(),
            topic_column: topic_column.into(),
            has_stable_ids,
        }
    }

    /// Map a raw tabular export onto articles using the declared schema
    ///
    /// Rows without a title are skipped; ids keep their source row position.
    pub fn from_raw(raw: &RawTable, schema: &ArticleSchema) -> Result<Self> {
        let resolved = schema.resolve(raw)?;
        info!("Using topic column: {}", raw.columns[resolved.topic]);

        if resolved.stable_id.is_empty() {
            if schema.require_stable_id {
                return Err(Error::ArticleSource(format!(
                    "No stable id column found (looked for {:?})",
                    schema.stable_id
                )));
            }
            warn!("No stable id column in article source; ids follow row order and change if the source is reordered");
        }

        let mut articles = Vec::with_capacity(raw.rows.len());
        let mut skipped = 0usize;
        for (pos, row) in raw.rows.iter().enumerate() {
            let title = match RawTable::first_value(row, &resolved.title) {
                Some(title) => title,
                None => {
                    skipped += 1;
                    continue;
                }
            };

            let author = RawTable::first_value(row, &resolved.author)
                .or_else(|| RawTable::first_value(row, &resolved.authors).map(|a| join_author_list(&a)))
                .filter(|a| !a.is_empty());

            articles.push(Article {
                id: ArticleId(pos as i64),
                stable_id: RawTable::first_value(row, &resolved.stable_id),
                title,
                content: RawTable::first_value(row, &resolved.content).unwrap_or_default(),
                image_url: RawTable::first_value(row, &resolved.image_url).unwrap_or_default(),
                author,
                publish_date: RawTable::first_value(row, &resolved.publish_date),
                topic: row
                    .get(resolved.topic)
                    .cloned()
                    .flatten()
                    .map(|t| t.trim().to_string())
                    .unwrap_or_default(),
            });
        }

        if skipped > 0 {
            warn!("Skipped {} article rows without a title", skipped);
        }
        if articles.is_empty() {
            return Err(Error::ArticleSource("Article source contains no usable rows".to_string()));
        }

        let mut table = Self::from_articles(articles, raw.columns[resolved.topic].clone());
        table.columns = raw.columns.clone();
        Ok(table)
    }

    pub fn get(&self, id: ArticleId) -> Option<&Article> {
        self.by_id.get(&id).map(|&pos| &self.articles[pos])
    }

    pub fn contains(&self, id: ArticleId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// All articles whose topic matches (case/whitespace-insensitive)
    pub fn by_topic(&self, topic: &str) -> Vec<&Article> {
        self.by_topic
            .get(&normalize_topic(topic))
            .map(|positions| positions.iter().map(|&pos| &self.articles[pos]).collect())
            .unwrap_or_default()
    }

    pub fn all(&self) -> &[Article] {
        &self.articles
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    /// Source column names (empty for tables built from fixtures)
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn topic_column(&self) -> &str {
        &self.topic_column
    }

    pub fn has_stable_ids(&self) -> bool {
        self.has_stable_ids
    }

    /// Distinct topics with their article counts
    pub fn topic_counts(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = self
            .by_topic
            .values()
            .map(|positions| (self.articles[positions[0]].topic.clone(), positions.len()))
            .collect();
        counts.sort();
        counts
    }
}

/// `["A", "B"]` → `A, B`; anything that is not a JSON list passes through
fn join_author_list(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(serde_json::Value::Array(items)) => {
                return items
                    .iter()
                    .map(|item| match item {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
            }
            Ok(other) => return other.to_string(),
            Err(_) => {}
        }
    }
    trimmed.to_string()
}
