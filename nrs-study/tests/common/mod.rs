//! Shared helpers for nrs-study integration tests

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use nrs_common::articles::{Article, ArticleId, ArticleTable};
use nrs_common::config::TomlConfig;
use nrs_common::db::init_memory_database;
use nrs_common::study::StudyProfile;
use sqlx::SqlitePool;
use tower::util::ServiceExt; // for `oneshot`
use nrs_study::{build_router, AppState};

pub const TOPICS: [&str; 4] = ["Politics", "Crime", "Tech", "Sports"];

/// Four articles per topic, ids 1..=16, topics in [`TOPICS`] order
pub fn article_table() -> ArticleTable {
    let articles = (0..16)
        .map(|i| {
            let id = i as i64 + 1;
            Article {
                id: ArticleId(id),
                stable_id: Some(format!("S{}", id)),
                title: format!("Article {}", id),
                content: format!("Body of article {}.", id),
                image_url: String::new(),
                author: None,
                publish_date: None,
                topic: TOPICS[i / 4].to_string(),
            }
        })
        .collect();
    ArticleTable::from_articles(articles, "topic")
}

pub fn topic_of(id: i64) -> &'static str {
    TOPICS[((id - 1) / 4) as usize]
}

pub struct TestApp {
    pub app: Router,
    pub db: SqlitePool,
}

pub async fn setup_app(profile: StudyProfile, admin_token: Option<&str>) -> TestApp {
    let db = init_memory_database().await.expect("Should create in-memory database");
    let mut config = TomlConfig::default();
    config.admin.token = admin_token.map(str::to_string);

    let state = AppState::new(db.clone(), article_table(), profile, &config);
    TestApp {
        app: build_router(state),
        db,
    }
}

/// Browser stand-in that carries the session cookie between requests
pub struct Client {
    app: Router,
    cookie: Option<String>,
}

impl Client {
    pub fn new(app: &Router) -> Self {
        Self {
            app: app.clone(),
            cookie: None,
        }
    }

    pub async fn send(&mut self, mut request: Request<Body>) -> Response<Body> {
        if let Some(cookie) = &self.cookie {
            request
                .headers_mut()
                .insert(header::COOKIE, cookie.parse().expect("Valid cookie header"));
        }
        let response = self.app.clone().oneshot(request).await.expect("Router should respond");
        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let value = set_cookie.to_str().expect("ASCII cookie");
            self.cookie = value.split(';').next().map(str::to_string);
        }
        response
    }

    pub async fn get(&mut self, uri: &str) -> Response<Body> {
        let request = Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    pub async fn post(&mut self, uri: &str, fields: &[(&str, &str)]) -> Response<Body> {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(encode_form(fields)))
            .unwrap();
        self.send(request).await
    }

    /// Enter the study as `pid` through the landing page
    pub async fn enter(&mut self, pid: &str) {
        let response = self.get(&format!("/?PROLIFIC_PID={}", pid)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

pub fn encode_form(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn percent_encode(value: &str) -> String {
    let mut out = String::new();
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

pub fn location(response: &Response<Body>) -> String {
    assert_eq!(
        response.status(),
        StatusCode::SEE_OTHER,
        "expected a redirect, got {}",
        response.status()
    );
    response
        .headers()
        .get(header::LOCATION)
        .expect("Redirect should carry a location")
        .to_str()
        .unwrap()
        .to_string()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.expect("Should read body").to_bytes();
    String::from_utf8(bytes.to_vec()).expect("UTF-8 body")
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

/// Recommendation ids rendered on an article page
pub fn recommendation_ids(html: &str) -> Vec<i64> {
    html.match_indices("name=\"likelihood_")
        .filter_map(|(pos, marker)| {
            let rest = &html[pos + marker.len()..];
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().ok()
        })
        .collect()
}

pub const DEMOGRAPHICS: [(&str, &str); 5] = [
    ("gender", "Woman"),
    ("age_group", "25-34"),
    ("country", "Norway"),
    ("education", "Master's"),
    ("political_leaning", "Centre"),
];

/// Favourite and least favourite topics for both lists
pub const PRE_QUESTIONNAIRE: [(&str, &str); 5] = [
    ("news_frequency", "Daily"),
    ("favourite_topic_1", "Politics"),
    ("least_favourite_topic_1", "Crime"),
    ("favourite_topic_2", "Tech"),
    ("least_favourite_topic_2", "Sports"),
];

/// Demographics, pre-questionnaire and instructions; returns the first
/// article location
pub async fn complete_intro(client: &mut Client) -> String {
    let response = client.post("/demographics", &DEMOGRAPHICS).await;
    assert_eq!(location(&response), "/pre-questionnaire");

    let response = client.post("/pre-questionnaire", &PRE_QUESTIONNAIRE).await;
    assert_eq!(location(&response), "/instructions");

    let response = client.post("/instructions", &[]).await;
    let first = location(&response);
    assert!(first.starts_with("/article/"), "unexpected first article location {}", first);
    first
}

/// Follow redirects from `location` until a page is served
pub async fn open_page(client: &mut Client, mut location: String) -> (String, String) {
    for _ in 0..5 {
        let response = client.get(&location).await;
        if response.status() == StatusCode::SEE_OTHER {
            location = self::location(&response);
            continue;
        }
        assert_eq!(response.status(), StatusCode::OK, "GET {}", location);
        return (location, body_text(response).await);
    }
    panic!("Too many redirects starting at {}", location);
}
