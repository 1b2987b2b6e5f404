//! Form parsing and validation
//!
//! Submitted forms arrive as ordered name/value pairs so multi-select
//! fields (checkbox groups) keep every value. Validation failures carry
//! the message shown when the step is re-rendered; nothing is saved.

use nrs_common::articles::ArticleId;
use nrs_common::ratings::{positional_key, rating_key, LabelStatement, RecStatement};
use nrs_common::responses::{Demographics, MidQuestionnaire, PostQuestionnaire, PreQuestionnaire};
use nrs_common::study::Condition;
use std::collections::BTreeMap;
use thiserror::Error;

pub const UNDERAGE: &str = "15 or younger";
pub const UNDERAGE_MESSAGE: &str = "Sorry, you do not meet the age criteria for this study.";
pub const DONT_KNOW: &str = "Don't know/None of these";
pub const OTHER: &str = "Other";

/// Likert items of the post-questionnaire for label conditions
pub const POST_LIKERT_ITEMS: [&str; 8] = [
    "understood_label",
    "visual_design",
    "decision_support",
    "info_usefulness",
    "image_trust",
    "evaluate_trustworthiness",
    "more_labels",
    "attention_check",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("Please specify what 'Other' means.")]
    OtherUnspecified,

    #[error("'Don't know' cannot be combined.")]
    ExclusiveCombined,

    #[error("Please answer all questions.")]
    Incomplete,
}

/// Submitted form fields in submission order
#[derive(Debug, Clone, Default)]
pub struct FormFields(Vec<(String, String)>);

impl From<Vec<(String, String)>> for FormFields {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }
}

impl FormFields {
    /// First value for `name`, as submitted
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// First value for `name`, trimmed; `None` when blank
    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// Every value submitted under `name`
    pub fn all(&self, name: &str) -> Vec<String> {
        self.0
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Trimmed value of the first of `names` submitted with a non-blank value
    pub fn first_filled<S: AsRef<str>>(&self, names: &[S]) -> Option<&str> {
        names
            .iter()
            .filter_map(|n| self.get(n.as_ref()))
            .map(str::trim)
            .find(|v| !v.is_empty())
    }
}

/// `choice` replaced by the free text when it is the "other" option
fn substitute(choice: Option<String>, other_option: &str, text: Option<String>) -> Option<String> {
    match (choice, text) {
        (Some(c), Some(t)) if c == other_option => Some(t),
        (choice, _) => choice,
    }
}

/// `Other` entries of a multi-select rewritten as `Other: <text>`
fn tag_other(values: Vec<String>, other_option: &str, prefix: &str, text: Option<&str>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| match text {
            Some(t) if v == other_option => format!("{}: {}", prefix, t),
            _ => v,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum DemographicsForm {
    Eligible(Demographics),
    /// Screened out by age; nothing is stored
    Underage,
}

pub fn parse_demographics(form: &FormFields) -> DemographicsForm {
    let age_group = form.text("age_group");
    if age_group.as_deref() == Some(UNDERAGE) {
        return DemographicsForm::Underage;
    }

    DemographicsForm::Eligible(Demographics {
        gender: substitute(form.text("gender"), "Self-describe", form.text("gender_self_describe")),
        age_group,
        country: substitute(form.text("country"), OTHER, form.text("other_country")),
        education: substitute(form.text("education"), OTHER, form.text("other_education")),
        political_leaning: substitute(
            form.text("political_leaning"),
            OTHER,
            form.text("political_leaning_other"),
        ),
    })
}

pub fn parse_pre_questionnaire(form: &FormFields) -> PreQuestionnaire {
    let platform = match (form.text("platform"), form.text("platform_other")) {
        (Some(p), Some(other)) if p == OTHER => Some(format!("Other: {}", other)),
        (p, _) => p,
    };
    let avoid_other = form.text("avoid_other");
    let avoid_reasons = tag_other(form.all("avoid_reasons"), "other", "other", avoid_other.as_deref());

    PreQuestionnaire {
        news_frequency: form.text("news_frequency"),
        platform,
        favourite_topic_1: form.text("favourite_topic_1"),
        least_favourite_topic_1: form.text("least_favourite_topic_1"),
        favourite_topic_2: form.text("favourite_topic_2"),
        least_favourite_topic_2: form.text("least_favourite_topic_2"),
        enjoy_topic_1: form.text("enjoy_topic_1"),
        enjoy_topic_2: form.text("enjoy_topic_2"),
        avoid_topic_1: form.text("avoid_topic_1"),
        avoid_topic_2: form.text("avoid_topic_2"),
        attention_check: form.text("attention_check"),
        avoid_news: form.text("avoid_news"),
        avoid_reasons,
        avoid_other,
    }
}

pub fn parse_mid_questionnaire(form: &FormFields) -> Result<MidQuestionnaire, FormError> {
    let selected = form.all("choice_elements");
    let other_text = form.text("choice_elements_other");

    let mut selected_elements = Vec::with_capacity(selected.len());
    for element in &selected {
        if element == OTHER {
            let text = other_text.as_deref().ok_or(FormError::OtherUnspecified)?;
            selected_elements.push(format!("Other: {}", text));
        } else {
            selected_elements.push(element.clone());
        }
    }

    if selected.iter().any(|e| e == DONT_KNOW) && selected.len() > 1 {
        return Err(FormError::ExclusiveCombined);
    }

    Ok(MidQuestionnaire {
        selected_elements,
        trust_article: form.text("trust_article"),
        trust_image: form.text("trust_image"),
    })
}

/// Post-questionnaire for `condition`
///
/// Label conditions must answer every Likert item with an integer; the
/// no-label condition saves the reduced set.
pub fn parse_post_questionnaire(
    form: &FormFields,
    condition: Condition,
    label_present: bool,
) -> Result<PostQuestionnaire, FormError> {
    let mut post = PostQuestionnaire {
        confidence: form.text("confidence"),
        feedback: form.text("feedback"),
        familiar_trust_levels: form.text("familiar_trust_levels"),
        familiar_nutriscore: form.text("familiar_nutriscore"),
        label_present,
        ..Default::default()
    };

    if !condition.shows_label() {
        return Ok(post);
    }

    let mut likert = BTreeMap::new();
    for item in POST_LIKERT_ITEMS {
        let value = form
            .text(item)
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or(FormError::Incomplete)?;
        likert.insert(item.to_string(), value);
    }

    let score_meaning_other = form.text("score_meaning_other");
    let label_expectation_other = form.text("label_expectation_other");
    post.score_meaning = Some(tag_other(
        form.all("score_meaning"),
        OTHER,
        OTHER,
        score_meaning_other.as_deref(),
    ));
    post.label_expectation = Some(tag_other(
        form.all("label_expectation"),
        OTHER,
        OTHER,
        label_expectation_other.as_deref(),
    ));
    if condition.shows_grade() {
        post.grade_basis = match (form.text("grade_basis"), form.text("grade_basis_other")) {
            (Some(g), Some(other)) if g == OTHER => Some(format!("Other: {}", other)),
            (g, _) => g,
        };
    }
    post.likert_responses = Some(likert);

    Ok(post)
}

/// Rating inputs for the shown recommendations, keyed by recommendation id
///
/// Each value is taken from the first non-blank of `<stmt>_<id>`,
/// `<stmt>_<pos>`, `<stmt>_<id>_hidden`, `<stmt>_<pos>_hidden`; label items
/// from `<label>` then `<label>_hidden`. Missing values are stored empty.
pub fn collect_ratings(form: &FormFields, recommendations: &[ArticleId]) -> BTreeMap<String, String> {
    let mut ratings = BTreeMap::new();

    for (pos, rec_id) in recommendations.iter().enumerate() {
        for statement in RecStatement::ALL {
            let by_id = rating_key(statement, rec_id.0);
            let by_pos = positional_key(statement, pos);
            let keys = [
                by_id.clone(),
                by_pos.clone(),
                format!("{}_hidden", by_id),
                format!("{}_hidden", by_pos),
            ];
            let value = form.first_filled(&keys).unwrap_or_default().to_string();
            ratings.insert(by_id, value);
        }
    }

    for statement in LabelStatement::ALL {
        let key = statement.key();
        let value = form
            .first_filled(&[key.to_string(), format!("{}_hidden", key)])
            .unwrap_or_default();
        ratings.insert(key.to_string(), value.to_string());
    }

    ratings
}
