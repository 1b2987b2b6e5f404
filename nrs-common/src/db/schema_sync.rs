//! Declarative column synchronization
//!
//! Startup runs in three phases:
//! 1. `CREATE TABLE IF NOT EXISTS` for every table
//! 2. Column sync (this module): columns declared in code but missing from
//!    an existing table are added with `ALTER TABLE ... ADD COLUMN`
//! 3. Versioned migrations for anything column sync cannot express
//!
//! Response databases written by earlier deployments lack the flat rating
//! columns; phase 2 brings them up to the current shape without touching
//! stored rows.

use crate::Result;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

/// Expected column with the constraints SQLite can report back
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    /// Declared type (TEXT, INTEGER, REAL, TIMESTAMP)
    pub sql_type: String,
    pub not_null: bool,
    pub primary_key: bool,
    pub default_value: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            not_null: false,
            primary_key: false,
            default_value: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// SQL default expression, inserted verbatim
    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// One row of `PRAGMA table_info`
#[derive(Debug, Clone)]
pub struct ActualColumn {
    pub cid: i32,
    pub name: String,
    pub type_name: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    pub pk: bool,
}

/// Difference between declared and actual schema
#[derive(Debug, Clone)]
pub enum SchemaDrift {
    /// Fixed automatically
    MissingColumn {
        table: String,
        column: ColumnDefinition,
    },
    /// Reported only
    TypeMismatch {
        table: String,
        column: String,
        expected: String,
        actual: String,
    },
    /// Reported only
    ConstraintMismatch {
        table: String,
        column: String,
        constraint: String,
    },
}

/// Declared shape of one table
pub trait TableSchema {
    fn table_name() -> &'static str;

    /// Columns in creation order
    fn expected_columns() -> Vec<ColumnDefinition>;
}

pub struct SchemaIntrospector;

impl SchemaIntrospector {
    /// Columns of `table_name` ordered by position
    pub async fn introspect_table(pool: &SqlitePool, table_name: &str) -> Result<Vec<ActualColumn>> {
        let rows = sqlx::query(&format!("PRAGMA table_info(\"{}\")", table_name))
            .fetch_all(pool)
            .await?;

        let mut columns: Vec<ActualColumn> = rows
            .iter()
            .map(|row| ActualColumn {
                cid: row.get("cid"),
                name: row.get("name"),
                type_name: row.get("type"),
                not_null: row.get::<i32, _>("notnull") != 0,
                default_value: row.get("dflt_value"),
                pk: row.get::<i32, _>("pk") != 0,
            })
            .collect();
        columns.sort_by_key(|c| c.cid);

        Ok(columns)
    }

    pub async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
        )
        .bind(table_name)
        .fetch_one(pool)
        .await?;

        Ok(exists)
    }

    /// User tables, alphabetical
    pub async fn list_tables(pool: &SqlitePool) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(pool)
        .await?;

        Ok(names)
    }
}

pub struct SchemaDiff;

impl SchemaDiff {
    /// Drift items for every declared column that is missing or differs
    pub fn compare(table_name: &str, expected: &[ColumnDefinition], actual: &[ActualColumn]) -> Vec<SchemaDrift> {
        let mut drift = Vec::new();

        for column in expected {
            let Some(found) = actual.iter().find(|c| c.name == column.name) else {
                drift.push(SchemaDrift::MissingColumn {
                    table: table_name.to_string(),
                    column: column.clone(),
                });
                continue;
            };

            if !Self::types_compatible(&column.sql_type, &found.type_name) {
                drift.push(SchemaDrift::TypeMismatch {
                    table: table_name.to_string(),
                    column: column.name.clone(),
                    expected: column.sql_type.clone(),
                    actual: found.type_name.clone(),
                });
            }
            if column.not_null && !found.not_null && !found.pk {
                drift.push(SchemaDrift::ConstraintMismatch {
                    table: table_name.to_string(),
                    column: column.name.clone(),
                    constraint: "NOT NULL".to_string(),
                });
            }
            if column.primary_key && !found.pk {
                drift.push(SchemaDrift::ConstraintMismatch {
                    table: table_name.to_string(),
                    column: column.name.clone(),
                    constraint: "PRIMARY KEY".to_string(),
                });
            }
        }

        drift
    }

    /// SQLite type affinity comparison
    ///
    /// Older databases declared text columns as VARCHAR(64) and JSON
    /// columns as JSON; both have text/numeric affinity compatible with
    /// the current declarations.
    fn types_compatible(expected: &str, actual: &str) -> bool {
        let exp = expected.to_uppercase();
        let act = actual.to_uppercase();
        if exp == act {
            return true;
        }

        let is_int = |t: &str| t.contains("INT");
        let is_text = |t: &str| t.contains("TEXT") || t.contains("CHAR") || t.contains("CLOB") || t == "JSON";
        let is_real = |t: &str| t.contains("REAL") || t.contains("FLOA") || t.contains("DOUB");
        let is_time = |t: &str| t == "TIMESTAMP" || t == "DATETIME";

        (is_int(&exp) && is_int(&act))
            || (is_text(&exp) && is_text(&act))
            || (is_real(&exp) && is_real(&act))
            || (is_time(&exp) && is_time(&act))
    }
}

pub struct SchemaSync;

impl SchemaSync {
    /// Add missing columns to `T`'s table; report what cannot be fixed
    ///
    /// Type and constraint changes need a table rebuild and are left to a
    /// versioned migration.
    pub async fn sync_table<T: TableSchema>(pool: &SqlitePool) -> Result<usize> {
        let table_name = T::table_name();
        if !SchemaIntrospector::table_exists(pool, table_name).await? {
            warn!("Schema sync: table '{}' does not exist, skipping", table_name);
            return Ok(0);
        }

        let actual = SchemaIntrospector::introspect_table(pool, table_name).await?;
        let drift = SchemaDiff::compare(table_name, &T::expected_columns(), &actual);
        if drift.is_empty() {
            debug!("Schema sync: '{}' up to date", table_name);
            return Ok(0);
        }

        let mut added = 0;
        for change in drift {
            match change {
                SchemaDrift::MissingColumn { table, column } => {
                    Self::add_column(pool, &table, &column).await?;
                    added += 1;
                }
                SchemaDrift::TypeMismatch { table, column, expected, actual } => {
                    warn!(
                        "Schema sync: {}.{} is '{}', expected '{}' (needs a migration)",
                        table, column, actual, expected
                    );
                }
                SchemaDrift::ConstraintMismatch { table, column, constraint } => {
                    warn!(
                        "Schema sync: {}.{} lacks {} (needs a migration)",
                        table, column, constraint
                    );
                }
            }
        }

        Ok(added)
    }

    async fn add_column(pool: &SqlitePool, table: &str, column: &ColumnDefinition) -> Result<()> {
        let mut sql = format!(
            "ALTER TABLE \"{}\" ADD COLUMN {} {}",
            table, column.name, column.sql_type
        );

        if column.primary_key {
            warn!(
                "Schema sync: cannot add PRIMARY KEY column {}.{}; adding it as a plain column",
                table, column.name
            );
        }
        match (&column.default_value, column.not_null) {
            (Some(default), true) => sql.push_str(&format!(" NOT NULL DEFAULT {}", default)),
            (Some(default), false) => sql.push_str(&format!(" DEFAULT {}", default)),
            (None, true) => warn!(
                "Schema sync: NOT NULL column {}.{} has no default; adding it as nullable",
                table, column.name
            ),
            (None, false) => {}
        }

        info!("Schema sync: adding column {}.{} ({})", table, column.name, column.sql_type);

        match sqlx::query(&sql).execute(pool).await {
            Ok(_) => Ok(()),
            // Another process initialized the same file first
            Err(sqlx::Error::Database(e)) if e.message().contains("duplicate column") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    struct NotesSchema;

    impl TableSchema for NotesSchema {
        fn table_name() -> &'static str {
            "notes"
        }

        fn expected_columns() -> Vec<ColumnDefinition> {
            vec![
                ColumnDefinition::new("id", "INTEGER").primary_key(),
                ColumnDefinition::new("body", "TEXT").not_null(),
                ColumnDefinition::new("score", "INTEGER"),
                ColumnDefinition::new("state", "TEXT").not_null().default("'open'"),
            ]
        }
    }

    #[test]
    fn test_types_compatible() {
        assert!(SchemaDiff::types_compatible("TEXT", "text"));
        assert!(SchemaDiff::types_compatible("TEXT", "VARCHAR(64)"));
        assert!(SchemaDiff::types_compatible("TEXT", "JSON"));
        assert!(SchemaDiff::types_compatible("INTEGER", "INT"));
        assert!(SchemaDiff::types_compatible("TIMESTAMP", "DATETIME"));
        assert!(SchemaDiff::types_compatible("REAL", "FLOAT"));
        assert!(!SchemaDiff::types_compatible("TEXT", "INTEGER"));
        assert!(!SchemaDiff::types_compatible("INTEGER", "REAL"));
    }

    #[tokio::test]
    async fn test_detects_missing_and_mismatched_columns() {
        let pool = memory_pool().await;
        sqlx::query("CREATE TABLE notes (id INTEGER PRIMARY KEY, body REAL)")
            .execute(&pool)
            .await
            .unwrap();

        let actual = SchemaIntrospector::introspect_table(&pool, "notes").await.unwrap();
        let drift = SchemaDiff::compare("notes", &NotesSchema::expected_columns(), &actual);

        let missing: Vec<&str> = drift
            .iter()
            .filter_map(|d| match d {
                SchemaDrift::MissingColumn { column, .. } => Some(column.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(missing, vec!["score", "state"]);
        assert!(drift.iter().any(|d| matches!(d, SchemaDrift::TypeMismatch { column, .. } if column == "body")));
        assert!(drift
            .iter()
            .any(|d| matches!(d, SchemaDrift::ConstraintMismatch { constraint, .. } if constraint == "NOT NULL")));
    }

    #[tokio::test]
    async fn test_sync_adds_missing_columns_once() {
        let pool = memory_pool().await;
        sqlx::query("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO notes (body) VALUES ('kept')")
            .execute(&pool)
            .await
            .unwrap();

        assert_eq!(SchemaSync::sync_table::<NotesSchema>(&pool).await.unwrap(), 2);
        assert_eq!(SchemaSync::sync_table::<NotesSchema>(&pool).await.unwrap(), 0);

        let (body, state): (String, String) = sqlx::query_as("SELECT body, state FROM notes")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(body, "kept");
        assert_eq!(state, "open");
    }

    #[tokio::test]
    async fn test_sync_skips_missing_table() {
        let pool = memory_pool().await;
        assert!(!SchemaIntrospector::table_exists(&pool, "notes").await.unwrap());
        assert_eq!(SchemaSync::sync_table::<NotesSchema>(&pool).await.unwrap(), 0);
    }
}
