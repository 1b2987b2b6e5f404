//! Typed response records stored as JSON blobs
//!
//! Every blob written to the database is wrapped in [`Versioned`], which adds
//! a `schema_version` field next to the record's own fields. Readers use it
//! to tell study variants' shapes apart.

use crate::study::TopicList;
use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Current version of every blob shape below
pub const RESPONSE_SCHEMA_VERSION: u32 = 1;

/// Record plus its schema version, serialized flat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub schema_version: u32,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> Versioned<T> {
    pub fn new(data: T) -> Self {
        Self {
            schema_version: RESPONSE_SCHEMA_VERSION,
            data,
        }
    }

    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Wrap and serialize a record in one step
pub fn versioned_json<T: Serialize>(data: T) -> Result<Value> {
    Versioned::new(data).to_json()
}

/// Merge `incoming` into `existing`
///
/// When both are JSON objects the incoming keys overwrite (shallow update);
/// otherwise `incoming` replaces the stored value. Applying the same
/// incoming value twice yields the same result as applying it once.
pub fn merge_blob(existing: Option<Value>, incoming: Value) -> Value {
    match (existing, incoming) {
        (Some(Value::Object(mut stored)), Value::Object(update)) if !stored.is_empty() => {
            for (key, value) in update {
                stored.insert(key, value);
            }
            Value::Object(stored)
        }
        (_, incoming) => incoming,
    }
}

/// Parse a stored JSON text column
pub fn parse_blob(text: Option<&str>) -> Result<Option<Value>> {
    text.filter(|t| !t.trim().is_empty())
        .map(|t| serde_json::from_str(t).map_err(Error::from))
        .transpose()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Demographics {
    pub gender: Option<String>,
    pub age_group: Option<String>,
    pub country: Option<String>,
    pub education: Option<String>,
    pub political_leaning: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreQuestionnaire {
    pub news_frequency: Option<String>,
    pub platform: Option<String>,
    /// List A preferences
    pub favourite_topic_1: Option<String>,
    pub least_favourite_topic_1: Option<String>,
    /// List B preferences
    pub favourite_topic_2: Option<String>,
    pub least_favourite_topic_2: Option<String>,
    pub enjoy_topic_1: Option<String>,
    pub enjoy_topic_2: Option<String>,
    pub avoid_topic_1: Option<String>,
    pub avoid_topic_2: Option<String>,
    pub attention_check: Option<String>,
    pub avoid_news: Option<String>,
    pub avoid_reasons: Vec<String>,
    pub avoid_other: Option<String>,
}

impl PreQuestionnaire {
    /// Raw favourite-topic label for a list
    pub fn favourite_for(&self, list: TopicList) -> Option<&str> {
        match list {
            TopicList::A => self.favourite_topic_1.as_deref(),
            TopicList::B => self.favourite_topic_2.as_deref(),
        }
    }

    /// Raw least-favourite-topic label for a list
    pub fn least_favourite_for(&self, list: TopicList) -> Option<&str> {
        match list {
            TopicList::A => self.least_favourite_topic_1.as_deref(),
            TopicList::B => self.least_favourite_topic_2.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidQuestionnaire {
    pub selected_elements: Vec<String>,
    pub trust_article: Option<String>,
    pub trust_image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostQuestionnaire {
    pub confidence: Option<String>,
    pub feedback: Option<String>,
    pub familiar_trust_levels: Option<String>,
    pub familiar_nutriscore: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_meaning: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_expectation: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade_basis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub likert_responses: Option<BTreeMap<String, i64>>,
    pub label_present: bool,
}

/// Which preferences governed a round's article selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeSelection {
    pub topic_list: TopicList,
    pub topic_start_list: TopicList,
    pub favourite_selection: Option<String>,
    pub least_favourite_selection: Option<String>,
    pub favourite_topic: Option<String>,
    pub least_favourite_topic: Option<String>,
}

/// Main article identity plus the two rated recommendations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArticleRatings {
    pub main_article_id: Option<i64>,
    pub main_article_stable_id: Option<String>,
    pub main_article_title: Option<String>,
    /// Row ids of the recommendations, in display order
    pub recommendations: Vec<i64>,
    pub recommendations_stable_ids: Vec<Option<String>>,
    pub recommendations_titles: Vec<Option<String>>,
    /// Submitted rating inputs keyed `<statement>_<rec id>` and `label_*`
    #[serde(deserialize_with = "lenient_string_map")]
    pub ratings: BTreeMap<String, String>,
}

/// Accept numbers and nulls in a string map (older blobs stored raw values)
fn lenient_string_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}
