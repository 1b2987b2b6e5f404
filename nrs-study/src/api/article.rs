//! Article rounds
//!
//! GET shows the main article with two recommendations and caches the
//! recommendation ids in the session; POST records the ratings against
//! exactly those ids and moves the participant on.

use crate::api::{after_last_round, no_articles, record_context, render};
use crate::flow::gate::{self, article_path, Step};
use crate::flow::{persist, MainCheck, RoundUpdate, SectionData, Selector};
use crate::forms::{collect_ratings, FormFields};
use crate::render::{ArticleDebug, ArticleView, Page};
use crate::session::Session;
use crate::AppState;
use axum::extract::{Form, Path, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Extension;
use nrs_common::articles::{Article, ArticleId};
use nrs_common::responses::ArticleRatings;
use nrs_common::time::recent_display_date;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

/// Shown when the corpus has no author for an article
const PLACEHOLDER_AUTHORS: [&str; 8] = [
    "Olivia Hansen",
    "Jonas Berg",
    "Elena Novak",
    "Anders Dahl",
    "Nora Larsen",
    "Mateo Sæther",
    "Sofie Zhang",
    "Henrik Müller",
];

/// Synthetic publish dates fall within this many days
const RECENT_DAYS: i64 = 5;

#[derive(Debug, Default, Deserialize)]
pub struct ArticleQuery {
    #[serde(default)]
    pub debug: Option<String>,
}

impl ArticleQuery {
    fn debug(&self) -> bool {
        matches!(self.debug.as_deref(), Some("1") | Some("true"))
    }
}

/// GET /article
///
/// Sends the participant to the article of the current round.
pub async fn article_entry(State(state): State<AppState>, Extension(session): Extension<Session>) -> Response {
    if let Some(redirect) = gate::guard(Step::Article, &session, &state.profile) {
        return redirect.into_response();
    }

    let target = session
        .current_article
        .or(session.next_article)
        .or(session.first_article_id)
        .or_else(|| {
            let mut rng = StdRng::from_entropy();
            Selector::new(&state.articles).pick_any(&mut rng, session.seen())
        });
    match target {
        Some(id) => Redirect::to(&article_path(id)).into_response(),
        None => no_articles(&state),
    }
}

/// GET /article/:id
pub async fn article_page(
    State(state): State<AppState>,
    Extension(mut session): Extension<Session>,
    Path(raw_id): Path<String>,
    Query(query): Query<ArticleQuery>,
) -> Response {
    if let Some(redirect) = gate::guard(Step::Article, &session, &state.profile) {
        return redirect.into_response();
    }

    let selector = Selector::new(&state.articles);
    let mut rng = StdRng::from_entropy();

    let id = match parse_article_id(&raw_id).filter(|id| state.articles.contains(*id)) {
        Some(id) => id,
        None => {
            warn!("Unknown article id '{}' requested; sampling another", raw_id);
            return match selector.pick_any(&mut rng, session.seen()) {
                Some(fresh) => Redirect::to(&article_path(fresh)).into_response(),
                None => no_articles(&state),
            };
        }
    };

    let round = session.round;
    let topics = session.topics_for(&mut rng, &state.profile, round);

    if state.profile.enforce_favourite_main_topic {
        if let MainCheck::Redirect(other) = selector.check_main(&mut rng, id, topics.favourite.as_deref(), session.seen()) {
            info!(
                "Article {} is outside favourite topic {:?}; redirecting to {}",
                id, topics.favourite, other
            );
            return Redirect::to(&article_path(other)).into_response();
        }
    }

    session.mark_seen(id);

    let recommendations = if session.current_article == Some(id) && !session.current_recommendations.is_empty() {
        session.current_recommendations.clone()
    } else {
        match selector.recommend(
            &mut rng,
            id,
            topics.favourite.as_deref(),
            topics.least_favourite.as_deref(),
            session.seen(),
        ) {
            Ok(recs) => recs,
            Err(e) => {
                error!("Recommendation selection failed for article {}: {}", id, e);
                Vec::new()
            }
        }
    };
    debug!("Round {} article {} recommendations {:?}", round, id, recommendations);

    session.current_article = Some(id);
    session.current_recommendations = recommendations.clone();
    session.last_article_had_label = session.condition.map(|c| c.shows_label()).unwrap_or(false);
    session.save().await;

    let Some(article) = state.articles.get(id) else {
        return no_articles(&state);
    };
    let author = article
        .author
        .clone()
        .filter(|a| !a.trim().is_empty())
        .or_else(|| PLACEHOLDER_AUTHORS.choose(&mut rng).map(|a| a.to_string()))
        .unwrap_or_default();
    let date = article
        .publish_date
        .clone()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| recent_display_date(&mut rng, RECENT_DAYS));

    let view = ArticleView {
        article,
        author,
        date,
        recommendations: recommendations.iter().filter_map(|r| state.articles.get(*r)).collect(),
        round,
        total_rounds: state.profile.total_rounds,
        condition: session.condition,
        debug: query.debug().then_some(ArticleDebug {
            topic_column: state.articles.topic_column(),
            topics: &topics,
        }),
    };
    render(&state, Page::Article(view))
}

/// POST /article/:id
///
/// Ratings are collected for the recommendations cached at GET time. A
/// submission for an article other than the one shown sends the
/// participant back to that article's page.
pub async fn submit_article(
    State(state): State<AppState>,
    Extension(mut session): Extension<Session>,
    Path(raw_id): Path<String>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Response {
    if let Some(redirect) = gate::guard(Step::Article, &session, &state.profile) {
        return redirect.into_response();
    }

    let id = parse_article_id(&raw_id);
    let main = match id.and_then(|id| state.articles.get(id)) {
        Some(article) if session.current_article == Some(article.id) => article,
        _ => {
            debug!("Ratings posted for article '{}' which is not on screen", raw_id);
            let back = id.map(article_path).unwrap_or_else(|| gate::article_entry(&session));
            return Redirect::to(&back).into_response();
        }
    };

    let form = FormFields::from(pairs);
    let recommendations = session.current_recommendations.clone();
    let ratings = article_ratings(main, &recommendations, &state, &form);

    let mut rng = StdRng::from_entropy();
    let round = session.round;
    let topics = session.topics_for(&mut rng, &state.profile, round);
    let update = RoundUpdate {
        theme_selection: Some(topics.to_theme_selection()),
        article: Some(ratings),
        mid_questionnaire: None,
    };
    persist(&state.db, &record_context(&session), &SectionData::Round(update)).await;

    session.rounds_completed = session.rounds_completed.max(round);
    session.complete(Step::Article);

    let profile = &state.profile;
    let next_path = if round < profile.total_rounds {
        let next_topics = session.topics_for(&mut rng, profile, round + 1);
        let next = Selector::new(&state.articles).next_main(
            &mut rng,
            &next_topics,
            profile.enforce_favourite_main_topic,
            session.seen(),
        );
        if let Some(next) = next {
            session.mark_seen(next);
        }
        session.next_article = next;

        if profile.mid_questionnaire {
            Step::MidQuestionnaire.path().to_string()
        } else {
            session.advance_round();
            gate::article_entry(&session)
        }
    } else {
        session.next_article = None;
        if profile.mid_questionnaire {
            Step::MidQuestionnaire.path().to_string()
        } else {
            after_last_round(&mut session, profile).to_string()
        }
    };
    session.save().await;

    Redirect::to(&next_path).into_response()
}

fn parse_article_id(raw: &str) -> Option<ArticleId> {
    raw.trim().parse::<i64>().ok().map(ArticleId)
}

fn article_ratings(main: &Article, recommendations: &[ArticleId], state: &AppState, form: &FormFields) -> ArticleRatings {
    let shown: Vec<Option<&Article>> = recommendations.iter().map(|r| state.articles.get(*r)).collect();
    ArticleRatings {
        main_article_id: Some(main.id.0),
        main_article_stable_id: main.stable_id.clone(),
        main_article_title: Some(main.title.clone()),
        recommendations: recommendations.iter().map(|r| r.0).collect(),
        recommendations_stable_ids: shown.iter().map(|a| a.and_then(|a| a.stable_id.clone())).collect(),
        recommendations_titles: shown.iter().map(|a| a.map(|a| a.title.clone())).collect(),
        ratings: collect_ratings(form, recommendations),
    }
}
