//! Bootstrap configuration
//!
//! Configuration sources, highest priority first:
//! 1. Command-line arguments / environment variables (applied by the binary)
//! 2. TOML config file (`--config`, else `~/.config/nrs/nrs-study.toml`)
//! 3. Compiled defaults
//!
//! A missing default config file is not an error: the service starts on
//! compiled defaults and logs a warning. An explicitly requested file that
//! cannot be read or parsed is an error.

use crate::articles::{ArticleSchema, ArticleSourceKind};
use crate::study::{AssignmentPolicy, StudyProfile};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Config file name under the user config directory
pub const CONFIG_FILE_NAME: &str = "nrs-study.toml";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub host: String,
    pub port: u16,
    /// Responses database (created if missing)
    pub database_path: PathBuf,
    pub logging: LoggingConfig,
    pub session: SessionConfig,
    pub admin: AdminConfig,
    pub articles: ArticleSourceConfig,
    pub study: StudyConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5001,
            database_path: PathBuf::from("responses.db"),
            logging: LoggingConfig::default(),
            session: SessionConfig::default(),
            admin: AdminConfig::default(),
            articles: ArticleSourceConfig::default(),
            study: StudyConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Participant session settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    /// Query parameter carrying the external panel identifier
    pub participant_param: String,
    /// Idle time after which a session is discarded
    pub ttl_minutes: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "nrs_session".to_string(),
            participant_param: "PROLIFIC_PID".to_string(),
            ttl_minutes: 240,
        }
    }
}

/// Administrative route protection
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AdminConfig {
    /// Token required by /admin routes; None leaves them open
    pub token: Option<String>,
}

/// Article corpus source
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArticleSourceConfig {
    pub path: PathBuf,
    /// Inferred from the file extension when absent
    pub kind: Option<ArticleSourceKind>,
    /// Table to read from a SQLite export
    pub table: String,
    /// Export stores generic column names and real headers in the first row
    pub header_in_first_row: bool,
    pub fields: ArticleSchema,
}

impl Default for ArticleSourceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("articles_cleaned_new.db"),
            kind: None,
            table: "new_articles".to_string(),
            header_in_first_row: true,
            fields: ArticleSchema::default(),
        }
    }
}

/// Study profile selection plus per-field overrides
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    pub profile: String,
    pub total_rounds: Option<u32>,
    pub enforce_favourite_main_topic: Option<bool>,
    pub mid_questionnaire: Option<bool>,
    pub post_questionnaire: Option<bool>,
    pub assignment: Option<AssignmentPolicy>,
    pub topic_map_a: Option<BTreeMap<String, String>>,
    pub topic_map_b: Option<BTreeMap<String, String>>,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            profile: crate::study::PROFILE_SIX_ROUND.to_string(),
            total_rounds: None,
            enforce_favourite_main_topic: None,
            mid_questionnaire: None,
            post_questionnaire: None,
            assignment: None,
            topic_map_a: None,
            topic_map_b: None,
        }
    }
}

impl StudyConfig {
    /// Built-in profile with overrides applied
    pub fn resolve(&self) -> Result<StudyProfile> {
        let mut profile = StudyProfile::named(&self.profile)?;

        if let Some(rounds) = self.total_rounds {
            if rounds == 0 {
                return Err(Error::Config("study.total_rounds must be at least 1".to_string()));
            }
            profile.total_rounds = rounds;
        }
        if let Some(v) = self.enforce_favourite_main_topic {
            profile.enforce_favourite_main_topic = v;
        }
        if let Some(v) = self.mid_questionnaire {
            profile.mid_questionnaire = v;
        }
        if let Some(v) = self.post_questionnaire {
            profile.post_questionnaire = v;
        }
        if let Some(v) = self.assignment {
            profile.assignment = v;
        }
        if let Some(map) = &self.topic_map_a {
            profile.topic_map_a = map.clone();
        }
        if let Some(map) = &self.topic_map_b {
            profile.topic_map_b = map.clone();
        }

        Ok(profile)
    }
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load configuration
    ///
    /// `explicit` must exist; otherwise the user config file is used when
    /// present, else compiled defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let content = std::fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("Read config {} failed: {}", path.display(), e))
            })?;
            info!("Configuration loaded from {}", path.display());
            return Self::from_toml_str(&content);
        }

        match default_config_path() {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path)?;
                info!("Configuration loaded from {}", path.display());
                Self::from_toml_str(&content)
            }
            _ => {
                warn!("No config file found; using compiled defaults");
                Ok(Self::default())
            }
        }
    }
}

/// `~/.config/nrs/nrs-study.toml` (platform config dir)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("nrs").join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config.port, 5001);
        assert_eq!(config.session.participant_param, "PROLIFIC_PID");
        assert_eq!(config.study.profile, "six-round");
        assert!(config.articles.header_in_first_row);
    }

    #[test]
    fn test_study_overrides_apply_on_top_of_profile() {
        let config = TomlConfig::from_toml_str(
            r#"
            [study]
            profile = "three-round"
            total_rounds = 4
            assignment = "least-count"

            [study.topic_map_a]
            "Politics" = "politics"
            "#,
        )
        .unwrap();

        let profile = config.study.resolve().unwrap();
        assert_eq!(profile.name, "three-round");
        assert_eq!(profile.total_rounds, 4);
        assert_eq!(profile.assignment, AssignmentPolicy::LeastCount);
        assert!(profile.mid_questionnaire);
        assert_eq!(profile.topic_map_a.len(), 1);
        assert_eq!(profile.topic_map_b.len(), 6);
    }

    #[test]
    fn test_zero_rounds_rejected() {
        let config = TomlConfig::from_toml_str("[study]\ntotal_rounds = 0\n").unwrap();
        assert!(config.study.resolve().is_err());
    }

    #[test]
    fn test_article_field_mapping_override() {
        let config = TomlConfig::from_toml_str(
            r#"
            [articles]
            path = "corpus.csv"
            kind = "csv"
            header_in_first_row = false

            [articles.fields]
            topic = ["section"]
            detect_topic_column = false
            "#,
        )
        .unwrap();

        assert_eq!(config.articles.kind, Some(ArticleSourceKind::Csv));
        assert_eq!(config.articles.fields.topic, vec!["section"]);
        assert!(!config.articles.fields.detect_topic_column);
        // Unlisted fields keep their defaults
        assert_eq!(config.articles.fields.title, ArticleSchema::default().title);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        assert!(matches!(
            TomlConfig::from_toml_str("port = \"not a number\""),
            Err(Error::Config(_))
        ));
    }
}
