//! Study vocabulary shared by storage and the web service
//!
//! Experimental conditions, the counterbalanced topic lists, and the study
//! profiles that capture the differences between study variants (round
//! count, main-topic enforcement, which questionnaires run).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Experimental arm, assigned once per participant
///
/// Declaration order is the tie-break order for least-count balancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Color,
    NoColor,
    C2pa,
    Nolabel,
}

impl Condition {
    /// All conditions in declaration order
    pub const ALL: [Condition; 4] = [
        Condition::Color,
        Condition::NoColor,
        Condition::C2pa,
        Condition::Nolabel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Condition::Color => "color",
            Condition::NoColor => "no_color",
            Condition::C2pa => "c2pa",
            Condition::Nolabel => "nolabel",
        }
    }

    /// Conditions that show a label and therefore ask the label questions
    pub fn shows_label(self) -> bool {
        !matches!(self, Condition::Nolabel)
    }

    /// Conditions whose label carries a grade
    pub fn shows_grade(self) -> bool {
        matches!(self, Condition::Color | Condition::NoColor)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Condition::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown condition: {}", s)))
    }
}

/// One of the two counterbalanced topic-preference lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TopicList {
    A,
    B,
}

impl TopicList {
    pub fn other(self) -> Self {
        match self {
            TopicList::A => TopicList::B,
            TopicList::B => TopicList::A,
        }
    }

    /// Lists alternate by round parity: odd rounds use the start list
    pub fn for_round(start: TopicList, round_number: u32) -> TopicList {
        if round_number % 2 == 1 {
            start
        } else {
            start.other()
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TopicList::A => "A",
            TopicList::B => "B",
        }
    }
}

impl fmt::Display for TopicList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a new participant's condition is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AssignmentPolicy {
    /// Condition with the fewest stored participants, ties by declaration order
    #[default]
    LeastCount,
    /// `total_participants mod number_of_conditions`
    RoundRobin,
}

/// Resolved study variant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudyProfile {
    pub name: String,
    /// Number of rounds (N)
    pub total_rounds: u32,
    /// Main article must belong to the round's favourite topic
    pub enforce_favourite_main_topic: bool,
    /// Mid-questionnaire after every round
    pub mid_questionnaire: bool,
    /// Post-questionnaire after the last round
    pub post_questionnaire: bool,
    pub assignment: AssignmentPolicy,
    /// Survey label → corpus topic, list A
    pub topic_map_a: BTreeMap<String, String>,
    /// Survey label → corpus topic, list B
    pub topic_map_b: BTreeMap<String, String>,
}

pub const PROFILE_SIX_ROUND: &str = "six-round";
pub const PROFILE_THREE_ROUND: &str = "three-round";

impl StudyProfile {
    /// Built-in profile by name
    pub fn named(name: &str) -> Result<Self> {
        match name {
            PROFILE_SIX_ROUND => Ok(Self::six_round()),
            PROFILE_THREE_ROUND => Ok(Self::three_round()),
            other => Err(Error::Config(format!(
                "Unknown study profile '{}' (expected '{}' or '{}')",
                other, PROFILE_SIX_ROUND, PROFILE_THREE_ROUND
            ))),
        }
    }

    /// Six rounds, favourite-topic main articles, no questionnaires between rounds
    pub fn six_round() -> Self {
        Self {
            name: PROFILE_SIX_ROUND.to_string(),
            total_rounds: 6,
            enforce_favourite_main_topic: true,
            mid_questionnaire: false,
            post_questionnaire: false,
            assignment: AssignmentPolicy::LeastCount,
            topic_map_a: default_topic_map_a(),
            topic_map_b: default_topic_map_b(),
        }
    }

    /// Three rounds with mid- and post-questionnaires
    pub fn three_round() -> Self {
        Self {
            name: PROFILE_THREE_ROUND.to_string(),
            total_rounds: 3,
            enforce_favourite_main_topic: false,
            mid_questionnaire: true,
            post_questionnaire: true,
            assignment: AssignmentPolicy::RoundRobin,
            topic_map_a: default_topic_map_a(),
            topic_map_b: default_topic_map_b(),
        }
    }

    /// Map a raw survey label through the list's normalization table
    pub fn map_topic(&self, list: TopicList, selection: Option<&str>) -> Option<String> {
        let selection = selection.map(str::trim).filter(|s| !s.is_empty())?;
        let table = match list {
            TopicList::A => &self.topic_map_a,
            TopicList::B => &self.topic_map_b,
        };
        table.get(selection).cloned()
    }
}

impl Default for StudyProfile {
    fn default() -> Self {
        Self::six_round()
    }
}

fn default_topic_map_a() -> BTreeMap<String, String> {
    [
        ("Business & Economics", "Economics"),
        ("International News", "International"),
        ("Crime", "Crime"),
        ("Finance", "Finance"),
        ("Politics", "Politics"),
        ("Public Health & Health Policy", "Health"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_topic_map_b() -> BTreeMap<String, String> {
    [
        ("Lifestyle", "Lifestyle"),
        ("Entertainment", "Entertainment"),
        ("Science", "Science"),
        ("Tech", "Tech"),
        ("Sports", "Sports"),
        ("Personal Health & Wellbeing", "Health"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_round_trip_names() {
        for c in Condition::ALL {
            assert_eq!(c.as_str().parse::<Condition>().unwrap(), c);
        }
        assert!("purple".parse::<Condition>().is_err());
    }

    #[test]
    fn test_condition_label_flags() {
        assert!(Condition::Color.shows_grade());
        assert!(Condition::NoColor.shows_grade());
        assert!(!Condition::C2pa.shows_grade());
        assert!(Condition::C2pa.shows_label());
        assert!(!Condition::Nolabel.shows_label());
    }

    #[test]
    fn test_topic_list_alternates_by_round() {
        assert_eq!(TopicList::for_round(TopicList::A, 1), TopicList::A);
        assert_eq!(TopicList::for_round(TopicList::A, 2), TopicList::B);
        assert_eq!(TopicList::for_round(TopicList::A, 3), TopicList::A);
        assert_eq!(TopicList::for_round(TopicList::B, 1), TopicList::B);
        assert_eq!(TopicList::for_round(TopicList::B, 6), TopicList::A);
    }

    #[test]
    fn test_builtin_profiles() {
        let six = StudyProfile::named("six-round").unwrap();
        assert_eq!(six.total_rounds, 6);
        assert!(six.enforce_favourite_main_topic);
        assert!(!six.mid_questionnaire);

        let three = StudyProfile::named("three-round").unwrap();
        assert_eq!(three.total_rounds, 3);
        assert!(!three.enforce_favourite_main_topic);
        assert!(three.mid_questionnaire && three.post_questionnaire);

        assert!(StudyProfile::named("ten-round").is_err());
    }

    #[test]
    fn test_map_topic_uses_list_table() {
        let profile = StudyProfile::default();
        assert_eq!(
            profile.map_topic(TopicList::A, Some("Business & Economics")),
            Some("Economics".to_string())
        );
        assert_eq!(
            profile.map_topic(TopicList::B, Some("Personal Health & Wellbeing")),
            Some("Health".to_string())
        );
        // Label from the other list does not map
        assert_eq!(profile.map_topic(TopicList::B, Some("Politics")), None);
        assert_eq!(profile.map_topic(TopicList::A, Some("  ")), None);
        assert_eq!(profile.map_topic(TopicList::A, None), None);
    }
}
