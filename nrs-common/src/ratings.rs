//! Rating statements and flat per-recommendation score columns
//!
//! Submitted ratings arrive keyed by recommendation id (`likelihood_17`) or,
//! from older forms, by display position (`likelihood_0`). A rating is
//! resolved id-first and falls back to the position only when no non-empty
//! id-keyed value exists. The resolved values are stored twice: inside the
//! round's article blob and as flat integer columns for analysis.

use crate::responses::ArticleRatings;
use std::collections::BTreeMap;

/// Recommendations shown and rated per round
pub const RECOMMENDATION_SLOTS: usize = 2;

/// Statements rated for each recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecStatement {
    Likelihood,
    Constructive,
    Understandable,
    Trustworthy,
    Relevant,
}

impl RecStatement {
    pub const ALL: [RecStatement; 5] = [
        RecStatement::Likelihood,
        RecStatement::Constructive,
        RecStatement::Understandable,
        RecStatement::Trustworthy,
        RecStatement::Relevant,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecStatement::Likelihood => "likelihood",
            RecStatement::Constructive => "constructive",
            RecStatement::Understandable => "understandable",
            RecStatement::Trustworthy => "trustworthy",
            RecStatement::Relevant => "relevant",
        }
    }

    /// Prompt shown next to the rating input
    pub fn prompt(self) -> &'static str {
        match self {
            RecStatement::Likelihood => "How likely are you to read this article?",
            RecStatement::Constructive => "This article seems constructive.",
            RecStatement::Understandable => "This article seems easy to understand.",
            RecStatement::Trustworthy => "This article seems trustworthy.",
            RecStatement::Relevant => "This article seems relevant to me.",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Statements about the label, answered once per round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelStatement {
    Understandable,
    Useful,
    Influenced,
    Attention,
    More,
}

impl LabelStatement {
    pub const ALL: [LabelStatement; 5] = [
        LabelStatement::Understandable,
        LabelStatement::Useful,
        LabelStatement::Influenced,
        LabelStatement::Attention,
        LabelStatement::More,
    ];

    /// Form key, e.g. `label_useful`
    pub fn key(self) -> &'static str {
        match self {
            LabelStatement::Understandable => "label_understandable",
            LabelStatement::Useful => "label_useful",
            LabelStatement::Influenced => "label_influenced",
            LabelStatement::Attention => "label_attention",
            LabelStatement::More => "label_more",
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            LabelStatement::Understandable => "The label was easy to understand.",
            LabelStatement::Useful => "The label was useful.",
            LabelStatement::Influenced => "The label influenced my choice.",
            LabelStatement::Attention => "I paid attention to the label.",
            LabelStatement::More => "I would like to see such labels more often.",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Scores for one recommendation, indexed by statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecScores([Option<i64>; 5]);

impl RecScores {
    pub fn get(&self, statement: RecStatement) -> Option<i64> {
        self.0[statement.index()]
    }

    pub fn set(&mut self, statement: RecStatement, value: Option<i64>) {
        self.0[statement.index()] = value;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelScores([Option<i64>; 5]);

impl LabelScores {
    pub fn get(&self, statement: LabelStatement) -> Option<i64> {
        self.0[statement.index()]
    }

    pub fn set(&mut self, statement: LabelStatement, value: Option<i64>) {
        self.0[statement.index()] = value;
    }
}

/// One recommendation slot as stored in the flat columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecSlot {
    pub stable_id: Option<String>,
    pub title: Option<String>,
    pub scores: RecScores,
}

/// Flat projection of a round's article blob
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatRatings {
    pub main_article_id: Option<i64>,
    pub main_article_stable_id: Option<String>,
    pub main_article_title: Option<String>,
    pub recs: [RecSlot; RECOMMENDATION_SLOTS],
    pub labels: LabelScores,
}

/// Form key for an id-keyed rating
pub fn rating_key(statement: RecStatement, rec_id: i64) -> String {
    format!("{}_{}", statement.as_str(), rec_id)
}

/// Form key for a position-keyed rating
pub fn positional_key(statement: RecStatement, position: usize) -> String {
    format!("{}_{}", statement.as_str(), position)
}

/// Look up a rating: id-keyed value when non-empty, else the positional value
pub fn resolve_rating<'a>(
    ratings: &'a BTreeMap<String, String>,
    statement: RecStatement,
    rec_id: Option<i64>,
    position: usize,
) -> Option<&'a str> {
    let non_empty = |key: String| {
        ratings
            .get(&key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };

    rec_id
        .and_then(|id| non_empty(rating_key(statement, id)))
        .or_else(|| non_empty(positional_key(statement, position)))
}

/// Integer score, `None` when absent or unparseable
///
/// Accepts integral floats ("4.0") from spreadsheet-sourced values.
pub fn parse_score(value: Option<&str>) -> Option<i64> {
    let value = value?.trim();
    value.parse::<i64>().ok().or_else(|| {
        value
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && f.fract() == 0.0)
            .map(|f| f as i64)
    })
}

impl FlatRatings {
    /// Project an article blob onto the flat columns
    pub fn from_article(article: &ArticleRatings) -> Self {
        let mut flat = FlatRatings {
            main_article_id: article.main_article_id,
            main_article_stable_id: article.main_article_stable_id.clone(),
            main_article_title: article.main_article_title.clone(),
            ..Default::default()
        };

        for (position, slot) in flat.recs.iter_mut().enumerate() {
            let rec_id = article.recommendations.get(position).copied();
            slot.stable_id = article
                .recommendations_stable_ids
                .get(position)
                .cloned()
                .flatten();
            slot.title = article.recommendations_titles.get(position).cloned().flatten();
            for statement in RecStatement::ALL {
                let raw = resolve_rating(&article.ratings, statement, rec_id, position);
                slot.scores.set(statement, parse_score(raw));
            }
        }

        for statement in LabelStatement::ALL {
            let raw = article.ratings.get(statement.key()).map(String::as_str);
            flat.labels.set(statement, parse_score(raw));
        }

        flat
    }

    /// Rebuild an id-keyed rating map for the given recommendation ids
    pub fn to_ratings(&self, rec_ids: &[i64]) -> BTreeMap<String, String> {
        let mut ratings = BTreeMap::new();
        for (slot, rec_id) in self.recs.iter().zip(rec_ids) {
            for statement in RecStatement::ALL {
                if let Some(score) = slot.scores.get(statement) {
                    ratings.insert(rating_key(statement, *rec_id), score.to_string());
                }
            }
        }
        for statement in LabelStatement::ALL {
            if let Some(score) = self.labels.get(statement) {
                ratings.insert(statement.key().to_string(), score.to_string());
            }
        }
        ratings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratings(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_id_keyed_rating_wins_over_positional() {
        let map = ratings(&[("likelihood_17", "5"), ("likelihood_0", "2")]);
        assert_eq!(resolve_rating(&map, RecStatement::Likelihood, Some(17), 0), Some("5"));
    }

    #[test]
    fn test_empty_id_keyed_rating_falls_back_to_position() {
        let map = ratings(&[("likelihood_17", " "), ("likelihood_1", "3")]);
        assert_eq!(resolve_rating(&map, RecStatement::Likelihood, Some(17), 1), Some("3"));
        assert_eq!(resolve_rating(&map, RecStatement::Relevant, Some(17), 1), None);
    }

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score(Some("4")), Some(4));
        assert_eq!(parse_score(Some(" 4.0 ")), Some(4));
        assert_eq!(parse_score(Some("4.5")), None);
        assert_eq!(parse_score(Some("n/a")), None);
        assert_eq!(parse_score(None), None);
    }

    #[test]
    fn test_flatten_and_rebuild_preserves_scores() {
        let article = ArticleRatings {
            main_article_id: Some(3),
            main_article_stable_id: Some("S3".into()),
            main_article_title: Some("Main".into()),
            recommendations: vec![8, 11],
            recommendations_stable_ids: vec![Some("S8".into()), None],
            recommendations_titles: vec![Some("Eight".into()), Some("Eleven".into())],
            ratings: ratings(&[
                ("likelihood_8", "5"),
                ("constructive_8", "4"),
                ("trustworthy_1", "2"),
                ("relevant_11", "1"),
                ("label_useful", "3"),
            ]),
        };

        let flat = FlatRatings::from_article(&article);
        assert_eq!(flat.main_article_id, Some(3));
        assert_eq!(flat.recs[0].stable_id.as_deref(), Some("S8"));
        assert_eq!(flat.recs[1].stable_id, None);
        assert_eq!(flat.recs[0].scores.get(RecStatement::Likelihood), Some(5));
        assert_eq!(flat.recs[1].scores.get(RecStatement::Trustworthy), Some(2));
        assert_eq!(flat.recs[1].scores.get(RecStatement::Relevant), Some(1));
        assert_eq!(flat.labels.get(LabelStatement::Useful), Some(3));
        assert_eq!(flat.labels.get(LabelStatement::More), None);

        let rebuilt = flat.to_ratings(&article.recommendations);
        assert_eq!(rebuilt.get("likelihood_8").map(String::as_str), Some("5"));
        assert_eq!(rebuilt.get("trustworthy_11").map(String::as_str), Some("2"));
        assert_eq!(rebuilt.get("label_useful").map(String::as_str), Some("3"));

        let again = FlatRatings::from_article(&ArticleRatings {
            ratings: rebuilt,
            ..article
        });
        assert_eq!(again, flat);
    }
}
