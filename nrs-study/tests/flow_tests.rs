//! Participant flow through the HTTP router
//!
//! Drives the wizard the way a browser would (session cookie carried
//! between requests) against an in-memory database and a small corpus.

mod common;

use axum::http::StatusCode;
use common::*;
use nrs_common::db::{participants, rounds};
use nrs_common::ratings::{LabelStatement, RecStatement};
use nrs_common::study::{Condition, StudyProfile};
use serde_json::Value;
use std::collections::BTreeSet;

fn article_id(location: &str) -> i64 {
    location
        .trim_start_matches("/article/")
        .parse()
        .expect("article location")
}

/// Favourite and least favourite topics of the list a main article's topic belongs to
fn list_topics(main_topic: &str) -> [&'static str; 2] {
    match main_topic {
        "Politics" | "Crime" => ["Politics", "Crime"],
        _ => ["Tech", "Sports"],
    }
}

// =============================================================================
// Participant identification and gating
// =============================================================================

#[tokio::test]
async fn test_landing_without_identifier_explains_entry() {
    let t = setup_app(StudyProfile::six_round(), None).await;
    let mut client = Client::new(&t.app);

    let response = client.get("/").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("recruitment platform"));
}

#[tokio::test]
async fn test_step_without_identifier_redirects_to_landing() {
    let t = setup_app(StudyProfile::six_round(), None).await;
    let mut client = Client::new(&t.app);

    let response = client.get("/demographics").await;
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_article_before_instructions_redirects_to_instructions() {
    let t = setup_app(StudyProfile::six_round(), None).await;
    let mut client = Client::new(&t.app);
    client.enter("P1").await;
    client.post("/demographics", &DEMOGRAPHICS).await;

    let response = client.get("/article/5").await;
    assert_eq!(location(&response), "/instructions");

    // Instructions in turn need the pre-questionnaire
    let response = client.get("/instructions").await;
    assert_eq!(location(&response), "/pre-questionnaire");
}

#[tokio::test]
async fn test_thank_you_is_gated_until_rounds_done() {
    let t = setup_app(StudyProfile::six_round(), None).await;
    let mut client = Client::new(&t.app);
    client.enter("P1").await;
    let first = complete_intro(&mut client).await;

    let response = client.get("/thank-you").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), first);
}

#[tokio::test]
async fn test_underage_participant_is_screened_out_without_storage() {
    let t = setup_app(StudyProfile::six_round(), None).await;
    let mut client = Client::new(&t.app);
    client.enter("P1").await;

    let response = client
        .post("/demographics", &[("age_group", "15 or younger"), ("gender", "Man")])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("do not meet the age criteria"));
    assert_eq!(participants::count(&t.db).await.unwrap(), 0);

    let response = client.get("/pre-questionnaire").await;
    assert_eq!(location(&response), "/demographics");
}

#[tokio::test]
async fn test_participants_arriving_together_get_balanced_conditions() {
    let t = setup_app(StudyProfile::six_round(), None).await;

    // Everyone lands before anyone has saved an answer
    let mut clients = Vec::new();
    for pid in ["P1", "P2", "P3", "P4"] {
        let mut client = Client::new(&t.app);
        client.enter(pid).await;
        clients.push(client);
    }
    assert_eq!(participants::count(&t.db).await.unwrap(), 0);

    for client in &mut clients {
        let response = client.post("/demographics", &DEMOGRAPHICS).await;
        assert_eq!(location(&response), "/pre-questionnaire");
    }

    let stored: Vec<Option<Condition>> = participants::list(&t.db)
        .await
        .unwrap()
        .iter()
        .map(|p| p.condition())
        .collect();
    let expected: Vec<Option<Condition>> = Condition::ALL.iter().copied().map(Some).collect();
    assert_eq!(stored, expected);
}

// =============================================================================
// Article rounds
// =============================================================================

#[tokio::test]
async fn test_six_round_flow_records_every_round() {
    let t = setup_app(StudyProfile::six_round(), None).await;
    let mut client = Client::new(&t.app);
    client.enter("P1").await;
    let mut next = complete_intro(&mut client).await;

    let mut mains = Vec::new();
    for round in 1..=6 {
        let (at, html) = open_page(&mut client, next).await;
        assert!(html.contains(&format!("Article {} of 6", round)), "round {}", round);

        let main = article_id(&at);
        let topics = list_topics(topic_of(main));
        assert!(
            ["Politics", "Tech"].contains(&topic_of(main)),
            "main article {} is not from a favourite topic",
            main
        );
        let recs = recommendation_ids(&html);
        assert_eq!(recs.len(), 2);
        for rec in &recs {
            assert!(topics.contains(&topic_of(*rec)), "recommendation {} outside {:?}", rec, topics);
        }
        mains.push(main);

        let response = client
            .post(
                &at,
                &[("likelihood_0", "4"), ("likelihood_1", "2"), ("label_useful", "5")],
            )
            .await;
        next = location(&response);
    }
    assert_eq!(next, "/thank-you");

    let distinct: BTreeSet<i64> = mains.iter().copied().collect();
    assert_eq!(distinct.len(), 6, "main articles repeated: {:?}", mains);

    let response = client.get("/thank-you").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Your answers have been recorded"));

    let participant = participants::find_by_prolific_id(&t.db, "P1").await.unwrap().unwrap();
    assert_eq!(participant.condition(), Some(Condition::Color));
    let demographics: Value = serde_json::from_str(participant.demographics.as_deref().unwrap()).unwrap();
    assert_eq!(demographics["age_group"], "25-34");

    let rows = rounds::list_for_participant(&t.db, participant.id).await.unwrap();
    assert_eq!(rows.len(), 6);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row.round_number, Some(i as i64 + 1));
        assert_eq!(row.flat.main_article_id, Some(mains[i]));
        assert_eq!(row.flat.main_article_stable_id, Some(format!("S{}", mains[i])));
        assert_eq!(row.flat.recs[0].scores.get(RecStatement::Likelihood), Some(4));
        assert_eq!(row.flat.recs[1].scores.get(RecStatement::Likelihood), Some(2));
        assert_eq!(row.flat.labels.get(LabelStatement::Useful), Some(5));

        let theme: Value = serde_json::from_str(row.theme_selection.as_deref().unwrap()).unwrap();
        assert_eq!(theme["favourite_topic"], topic_of(mains[i]));
    }
}

#[tokio::test]
async fn test_recorded_recommendations_match_displayed() {
    let t = setup_app(StudyProfile::six_round(), None).await;
    let mut client = Client::new(&t.app);
    client.enter("P1").await;
    let first = complete_intro(&mut client).await;

    let (at, html) = open_page(&mut client, first).await;
    let shown = recommendation_ids(&html);

    // A reload shows the same recommendations
    let (_, reloaded) = open_page(&mut client, at.clone()).await;
    assert_eq!(recommendation_ids(&reloaded), shown);

    let fields: Vec<(String, String)> = shown
        .iter()
        .map(|id| (format!("relevant_{}", id), "3".to_string()))
        .collect();
    let fields: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    let response = client.post(&at, &fields).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let rows = rounds::list(&t.db).await.unwrap();
    assert_eq!(rows.len(), 1);
    let article: Value = serde_json::from_str(rows[0].article.as_deref().unwrap()).unwrap();
    let recorded: Vec<i64> = article["recommendations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_i64().unwrap())
        .collect();
    assert_eq!(recorded, shown);
    for id in &shown {
        assert_eq!(article["ratings"][format!("relevant_{}", id)], "3");
    }
}

#[tokio::test]
async fn test_unknown_article_redirects_to_valid_one() {
    let t = setup_app(StudyProfile::six_round(), None).await;
    let mut client = Client::new(&t.app);
    client.enter("P1").await;
    complete_intro(&mut client).await;

    for bad in ["/article/999", "/article/not-a-number"] {
        let response = client.get(bad).await;
        let to = article_id(&location(&response));
        assert!((1..=16).contains(&to), "{} redirected to {}", bad, to);
    }
}

#[tokio::test]
async fn test_off_topic_main_article_redirects_within_favourite_topic() {
    let t = setup_app(StudyProfile::six_round(), None).await;
    let mut client = Client::new(&t.app);
    client.enter("P1").await;
    let first = complete_intro(&mut client).await;
    let favourite = topic_of(article_id(&first));

    // Crime (5..=8) is never a favourite topic here
    let response = client.get("/article/6").await;
    let to = article_id(&location(&response));
    assert_eq!(topic_of(to), favourite);
}

#[tokio::test]
async fn test_ratings_for_article_not_on_screen_are_not_recorded() {
    let t = setup_app(StudyProfile::six_round(), None).await;
    let mut client = Client::new(&t.app);
    client.enter("P1").await;
    let first = complete_intro(&mut client).await;
    let (at, _) = open_page(&mut client, first).await;

    let other = if article_id(&at) == 1 { 2 } else { 1 };
    let response = client.post(&format!("/article/{}", other), &[("likelihood_0", "5")]).await;
    assert_eq!(location(&response), format!("/article/{}", other));
    assert!(rounds::list(&t.db).await.unwrap().is_empty());
}

// =============================================================================
// Three-round profile: mid- and post-questionnaires
// =============================================================================

fn likert_answers() -> Vec<(&'static str, &'static str)> {
    nrs_study::forms::POST_LIKERT_ITEMS.iter().map(|item| (*item, "4")).collect()
}

#[tokio::test]
async fn test_three_round_flow_with_questionnaires() {
    let t = setup_app(StudyProfile::three_round(), None).await;
    let mut client = Client::new(&t.app);
    client.enter("P1").await;
    let mut next = complete_intro(&mut client).await;

    for round in 1..=3 {
        let (at, html) = open_page(&mut client, next).await;
        assert!(html.contains(&format!("Article {} of 3", round)));

        let response = client.post(&at, &[("trustworthy_0", "5")]).await;
        assert_eq!(location(&response), "/mid-questionnaire");

        let response = client.get("/mid-questionnaire").await;
        assert_eq!(response.status(), StatusCode::OK);

        if round == 1 {
            let response = client
                .post(
                    "/mid-questionnaire",
                    &[("choice_elements", "Don't know/None of these"), ("choice_elements", "Image")],
                )
                .await;
            assert_eq!(response.status(), StatusCode::OK);
            assert!(body_text(response).await.contains("cannot be combined"));

            let response = client.post("/mid-questionnaire", &[("choice_elements", "Other")]).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert!(body_text(response).await.contains("Please specify"));
        }

        let response = client
            .post(
                "/mid-questionnaire",
                &[("choice_elements", "Image"), ("trust_article", "4"), ("trust_image", "2")],
            )
            .await;
        next = location(&response);

        if round < 3 {
            assert!(next.starts_with("/article/"));
            // Next round's questionnaire waits for its article
            let response = client.get("/mid-questionnaire").await;
            assert_eq!(location(&response), next);
        }
    }
    assert_eq!(next, "/post-questionnaire");

    // First participant under round-robin gets the first condition
    let response = client.get("/post-questionnaire").await;
    let html = body_text(response).await;
    assert!(html.contains("name=\"grade_basis\""));

    let response = client.post("/post-questionnaire", &[("confidence", "High")]).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Please answer all questions."));

    let mut answers = likert_answers();
    answers.extend([("confidence", "High"), ("grade_basis", "The publisher")]);
    let response = client.post("/post-questionnaire", &answers).await;
    assert_eq!(location(&response), "/thank-you");

    let response = client.get("/thank-you").await;
    assert_eq!(response.status(), StatusCode::OK);

    let participant = participants::find_by_prolific_id(&t.db, "P1").await.unwrap().unwrap();
    let post: Value = serde_json::from_str(participant.post_questionnaire.as_deref().unwrap()).unwrap();
    assert_eq!(post["confidence"], "High");
    assert_eq!(post["label_present"], true);
    assert_eq!(post["likert_responses"]["attention_check"], 4);

    let rows = rounds::list_for_participant(&t.db, participant.id).await.unwrap();
    assert_eq!(rows.len(), 3);
    for row in &rows {
        let mid: Value = serde_json::from_str(row.mid_questionnaire.as_deref().unwrap()).unwrap();
        assert_eq!(mid["selected_elements"][0], "Image");
        assert_eq!(row.flat.recs[0].scores.get(RecStatement::Trustworthy), Some(5));
    }
}

#[tokio::test]
async fn test_mid_questionnaire_disabled_in_six_round_profile() {
    let t = setup_app(StudyProfile::six_round(), None).await;
    let mut client = Client::new(&t.app);
    client.enter("P1").await;
    let first = complete_intro(&mut client).await;

    let response = client.get("/mid-questionnaire").await;
    assert_eq!(location(&response), first);
}

#[tokio::test]
async fn test_new_identifier_starts_a_fresh_session() {
    let t = setup_app(StudyProfile::six_round(), None).await;
    let mut client = Client::new(&t.app);
    client.enter("P1").await;
    complete_intro(&mut client).await;

    client.enter("P2").await;
    let response = client.get("/instructions").await;
    assert_eq!(location(&response), "/pre-questionnaire");
}

// =============================================================================
// Renderer collaborator
// =============================================================================

struct TitleOnly;

impl nrs_study::render::Renderer for TitleOnly {
    fn render(&self, page: &nrs_study::render::Page<'_>) -> String {
        format!("page:{}", page.title())
    }
}

#[tokio::test]
async fn test_custom_renderer_receives_page_context() {
    let db = nrs_common::db::init_memory_database().await.unwrap();
    let config = nrs_common::config::TomlConfig::default();
    let state = nrs_study::AppState::new(db, article_table(), StudyProfile::six_round(), &config)
        .with_renderer(std::sync::Arc::new(TitleOnly));
    let app = nrs_study::build_router(state);
    let mut client = Client::new(&app);

    let response = client.get("/?PROLIFIC_PID=P1").await;
    assert_eq!(body_text(response).await, "page:News Study");

    let response = client.get("/demographics").await;
    assert_eq!(body_text(response).await, "page:About You");
}
