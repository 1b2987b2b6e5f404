//! Article source loading
//!
//! Reads a whole tabular export (CSV with header row, or one table of a
//! SQLite database) into a [`RawTable`] of optional strings, then maps it
//! onto [`ArticleTable`] through the declared [`ArticleSchema`].

use super::{ArticleSchema, ArticleTable};
use crate::{Error, Result};
use serde::Deserialize;
use serde_json::json;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Column, ConnectOptions, Row, ValueRef};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Untyped tabular data: header names plus rows of nullable cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Number of distinct non-null values in a column
    pub fn distinct_count(&self, idx: usize) -> usize {
        self.rows
            .iter()
            .filter_map(|row| row.get(idx).and_then(|v| v.as_deref()))
            .collect::<HashSet<_>>()
            .len()
    }

    /// First non-empty cell among the given positions
    pub fn first_value(row: &[Option<String>], positions: &[usize]) -> Option<String> {
        positions.iter().find_map(|&idx| {
            row.get(idx)
                .and_then(|v| v.as_deref())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })
    }

    /// Promote the first data row to the header row
    ///
    /// Some exports store generic column names (field1, field2, ...) and
    /// carry the real headers in the first row.
    pub fn promote_first_row_to_header(&mut self) -> Result<()> {
        if self.rows.is_empty() {
            return Err(Error::ArticleSource(
                "Cannot take headers from the first row of an empty table".to_string(),
            ));
        }
        let header = self.rows.remove(0);
        self.columns = header
            .into_iter()
            .enumerate()
            .map(|(idx, cell)| {
                cell.map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| format!("column_{}", idx))
            })
            .collect();
        Ok(())
    }
}

/// Source file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleSourceKind {
    Csv,
    Sqlite,
}

impl ArticleSourceKind {
    /// Guess from the file extension (.csv / .db, .sqlite, .sqlite3)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "tsv" | "txt" => Some(Self::Csv),
            "db" | "sqlite" | "sqlite3" => Some(Self::Sqlite),
            _ => None,
        }
    }
}

/// Read a delimited text file with a header row
pub fn load_csv(path: &Path) -> Result<RawTable> {
    let delimiter = if path.extension().and_then(|e| e.to_str()) == Some("tsv") {
        b'\t'
    } else {
        b','
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)?;

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row = (0..columns.len())
            .map(|idx| {
                record
                    .get(idx)
                    .filter(|cell| !cell.trim().is_empty())
                    .map(str::to_string)
            })
            .collect();
        rows.push(row);
    }

    Ok(RawTable { columns, rows })
}

/// Read one table of a SQLite database (opened read-only)
pub async fn load_sqlite(path: &Path, table: &str) -> Result<RawTable> {
    if !is_valid_table_name(table) {
        return Err(Error::ArticleSource(format!("Invalid table name: {}", table)));
    }
    if !path.exists() {
        return Err(Error::ArticleSource(format!(
            "Article database not found: {}",
            path.display()
        )));
    }

    let mut conn = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))?
        .read_only(true)
        .connect()
        .await?;

    let rows = sqlx::query(&format!("SELECT * FROM \"{}\"", table))
        .fetch_all(&mut conn)
        .await?;

    let columns: Vec<String> = match rows.first() {
        Some(first) => first.columns().iter().map(|c| c.name().to_string()).collect(),
        None => {
            // Empty table - get columns from schema
            sqlx::query(&format!("PRAGMA table_info(\"{}\")", table))
                .fetch_all(&mut conn)
                .await?
                .iter()
                .map(|row| row.get::<String, _>(1))
                .collect()
        }
    };

    let rows = rows
        .iter()
        .map(|row| {
            (0..row.len())
                .map(|i| {
                    let raw = row.try_get_raw(i).ok()?;
                    if raw.is_null() {
                        return None;
                    }
                    row.try_get::<String, _>(i)
                        .ok()
                        .or_else(|| row.try_get::<i64, _>(i).ok().map(|v| v.to_string()))
                        .or_else(|| row.try_get::<f64, _>(i).ok().map(|v| json!(v).to_string()))
                        .filter(|v| !v.trim().is_empty())
                })
                .collect()
        })
        .collect();

    Ok(RawTable { columns, rows })
}

/// Load the configured article source into an [`ArticleTable`]
pub async fn load_article_table(
    path: &Path,
    kind: Option<ArticleSourceKind>,
    sqlite_table: &str,
    header_in_first_row: bool,
    schema: &ArticleSchema,
) -> Result<ArticleTable> {
    let kind = kind
        .or_else(|| ArticleSourceKind::from_path(path))
        .ok_or_else(|| {
            Error::ArticleSource(format!(
                "Cannot infer article source format from {}; set articles.kind",
                path.display()
            ))
        })?;

    let mut raw = match kind {
        ArticleSourceKind::Csv => load_csv(path)?,
        ArticleSourceKind::Sqlite => load_sqlite(path, sqlite_table).await?,
    };
    if header_in_first_row {
        raw.promote_first_row_to_header()?;
    }

    info!(
        "Loaded {} article rows from {} ({:?}). Columns: {:?}",
        raw.rows.len(),
        path.display(),
        kind,
        raw.columns
    );

    ArticleTable::from_raw(&raw, schema)
}

/// Validate table name to prevent SQL injection
fn is_valid_table_name(name: &str) -> bool {
    name.chars().all(|c| c.is_alphanumeric() || c == '_') && !name.is_empty() && name.len() < 100
}
