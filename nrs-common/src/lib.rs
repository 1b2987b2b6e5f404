//! # NRS Common Library
//!
//! Shared code for the news recommendation study service:
//! - Error type and result alias
//! - Bootstrap configuration and study profiles
//! - Database initialization, schema sync, migrations
//! - Participant / Round models and queries
//! - Typed response records and the flat rating projection
//! - Article table loading (CSV and SQLite exports)
//! - Timestamp helpers

pub mod articles;
pub mod config;
pub mod db;
pub mod error;
pub mod ratings;
pub mod responses;
pub mod study;
pub mod time;

pub use articles::{Article, ArticleId, ArticleTable};
pub use error::{Error, Result};
