//! Article and recommendation selection
//!
//! Each round shows one main article and exactly two recommendations: one
//! from the round's favourite topic and one from its least-favourite topic.
//! Selection is uniform within a topic pool and never falls back to an
//! unrelated topic.
//!
//! Per-pool fallback order for a recommendation:
//! 1. unseen and not the main article
//! 2. seen, still not the main article
//! 3. anything in the pool, the main article included
//!
//! A missing pool is covered by duplicating the other recommendation; with
//! both pools missing the main article fills both slots.

use nrs_common::articles::{Article, ArticleId, ArticleTable};
use nrs_common::responses::{PreQuestionnaire, ThemeSelection};
use nrs_common::study::{StudyProfile, TopicList};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("article table is empty")]
    EmptyTable,

    #[error("main article {0} is not in the article table")]
    UnknownMain(ArticleId),
}

/// Topic preferences in force for one round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundTopics {
    pub round: u32,
    pub list: TopicList,
    pub start: TopicList,
    /// Raw survey labels
    pub favourite_selection: Option<String>,
    pub least_favourite_selection: Option<String>,
    /// Corpus topics after normalization
    pub favourite: Option<String>,
    pub least_favourite: Option<String>,
}

impl RoundTopics {
    pub fn resolve(profile: &StudyProfile, pre: Option<&PreQuestionnaire>, start: TopicList, round: u32) -> Self {
        let list = TopicList::for_round(start, round);
        let favourite_selection = pre.and_then(|p| p.favourite_for(list)).map(str::to_string);
        let least_favourite_selection = pre.and_then(|p| p.least_favourite_for(list)).map(str::to_string);

        Self {
            round,
            list,
            start,
            favourite: profile.map_topic(list, favourite_selection.as_deref()),
            least_favourite: profile.map_topic(list, least_favourite_selection.as_deref()),
            favourite_selection,
            least_favourite_selection,
        }
    }

    pub fn to_theme_selection(&self) -> ThemeSelection {
        ThemeSelection {
            topic_list: self.list,
            topic_start_list: self.start,
            favourite_selection: self.favourite_selection.clone(),
            least_favourite_selection: self.least_favourite_selection.clone(),
            favourite_topic: self.favourite.clone(),
            least_favourite_topic: self.least_favourite.clone(),
        }
    }
}

/// Result of checking a requested main article against the favourite topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainCheck {
    Keep,
    Redirect(ArticleId),
}

pub struct Selector<'a> {
    articles: &'a ArticleTable,
}

impl<'a> Selector<'a> {
    pub fn new(articles: &'a ArticleTable) -> Self {
        Self { articles }
    }

    fn topic_pool(&self, topic: Option<&str>) -> Vec<&'a Article> {
        match topic.map(str::trim).filter(|t| !t.is_empty()) {
            Some(topic) => self.articles.by_topic(topic),
            None => Vec::new(),
        }
    }

    /// Main article from a topic pool, unseen first, repeats allowed
    ///
    /// `None` only when the pool is empty.
    pub fn pick_main<R: Rng + ?Sized>(&self, rng: &mut R, topic: &str, seen: &BTreeSet<ArticleId>) -> Option<ArticleId> {
        let pool = self.topic_pool(Some(topic));
        choose_preferring(rng, &pool, |a| !seen.contains(&a.id))
    }

    /// Any article, unseen first
    pub fn pick_any<R: Rng + ?Sized>(&self, rng: &mut R, seen: &BTreeSet<ArticleId>) -> Option<ArticleId> {
        let pool: Vec<&Article> = self.articles.all().iter().collect();
        choose_preferring(rng, &pool, |a| !seen.contains(&a.id))
    }

    /// First main article: the favourite topic of round 1 when resolvable
    pub fn first_main<R: Rng + ?Sized>(&self, rng: &mut R, topics: &RoundTopics, seen: &BTreeSet<ArticleId>) -> Option<ArticleId> {
        topics
            .favourite
            .as_deref()
            .and_then(|fav| self.pick_main(rng, fav, seen))
            .or_else(|| self.pick_any(rng, seen))
    }

    /// Main article for a following round
    pub fn next_main<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        topics: &RoundTopics,
        enforce_favourite: bool,
        seen: &BTreeSet<ArticleId>,
    ) -> Option<ArticleId> {
        if enforce_favourite {
            self.first_main(rng, topics, seen)
        } else {
            self.pick_any(rng, seen)
        }
    }

    /// Check that `main` belongs to the favourite topic
    ///
    /// Keeps the article when no favourite topic is resolved or the
    /// favourite pool is empty.
    pub fn check_main<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        main: ArticleId,
        favourite: Option<&str>,
        seen: &BTreeSet<ArticleId>,
    ) -> MainCheck {
        let Some(favourite) = favourite.filter(|f| !f.trim().is_empty()) else {
            return MainCheck::Keep;
        };
        match self.articles.get(main) {
            Some(article) if article.has_topic(favourite) => MainCheck::Keep,
            _ => match self.pick_main(rng, favourite, seen) {
                Some(id) => MainCheck::Redirect(id),
                None => MainCheck::Keep,
            },
        }
    }

    /// One recommendation from a topic pool using the three-tier fallback
    pub fn pick_recommendation<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        topic: Option<&str>,
        main: ArticleId,
        seen: &BTreeSet<ArticleId>,
    ) -> Option<ArticleId> {
        let pool = self.topic_pool(topic);
        let tiers: [&dyn Fn(&Article) -> bool; 3] = [
            &|a: &Article| a.id != main && !seen.contains(&a.id),
            &|a: &Article| a.id != main,
            &|_: &Article| true,
        ];
        tiers.iter().find_map(|tier| {
            let candidates: Vec<&Article> = pool.iter().copied().filter(|a| tier(*a)).collect();
            candidates.choose(&mut *rng).map(|a| a.id)
        })
    }

    /// Two recommendations for `main`, in random order
    pub fn recommend<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        main: ArticleId,
        favourite: Option<&str>,
        least_favourite: Option<&str>,
        seen: &BTreeSet<ArticleId>,
    ) -> Result<Vec<ArticleId>, SelectionError> {
        if self.articles.is_empty() {
            return Err(SelectionError::EmptyTable);
        }
        if !self.articles.contains(main) {
            return Err(SelectionError::UnknownMain(main));
        }

        let from_favourite = self.pick_recommendation(rng, favourite, main, seen);
        let from_least = self.pick_recommendation(rng, least_favourite, main, seen);

        let mut picks = match (from_favourite, from_least) {
            (Some(fav), Some(least)) => vec![fav, least],
            (Some(only), None) | (None, Some(only)) => vec![only, only],
            (None, None) => vec![main, main],
        };
        picks.shuffle(rng);
        Ok(picks)
    }
}

/// Uniform choice among `pool` items matching `prefer`, else among all
fn choose_preferring<R, F>(rng: &mut R, pool: &[&Article], prefer: F) -> Option<ArticleId>
where
    R: Rng + ?Sized,
    F: Fn(&Article) -> bool,
{
    let preferred: Vec<&&Article> = pool.iter().filter(|a| prefer(**a)).collect();
    match preferred.choose(&mut *rng) {
        Some(article) => Some(article.id),
        None => pool.choose(rng).map(|a| a.id),
    }
}
