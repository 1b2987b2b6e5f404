//! Participant sessions
//!
//! Server-side, in-memory state for one participant's browsing session,
//! keyed by a random id carried in an HTTP-only cookie. Nothing here is
//! persisted; the stored Participant and Round rows are the durable record.
//!
//! # Lifecycle
//! - created on the first request without a (live) session cookie
//! - the external participant identifier is captured from the query string
//!   on first contact; a different identifier starts a fresh session state
//! - discarded once idle for longer than the configured TTL

use crate::flow::gate::Step;
use crate::flow::selector::RoundTopics;
use crate::AppState;
use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use chrono::{DateTime, Duration, Utc};
use nrs_common::articles::ArticleId;
use nrs_common::config::SessionConfig;
use nrs_common::responses::PreQuestionnaire;
use nrs_common::study::{Condition, StudyProfile, TopicList};
use rand::Rng;
use std::collections::{BTreeSet, HashMap};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-participant study context
#[derive(Debug, Clone, PartialEq)]
pub struct StudySession {
    pub prolific_id: Option<String>,
    /// Assigned once on first contact
    pub condition: Option<Condition>,
    completed: BTreeSet<Step>,
    /// Round being worked on (1-based)
    pub round: u32,
    /// Highest round whose article ratings were submitted
    pub rounds_completed: u32,
    /// Highest round whose mid-questionnaire was submitted
    pub mid_rounds_completed: u32,
    seen_article_ids: BTreeSet<ArticleId>,
    /// Recommendations shown for `current_article`
    pub current_recommendations: Vec<ArticleId>,
    /// Main article whose recommendations were selected and not yet rated
    pub current_article: Option<ArticleId>,
    topic_start_list: Option<TopicList>,
    pub pre_questionnaire: Option<PreQuestionnaire>,
    pub first_article_id: Option<ArticleId>,
    pub next_article: Option<ArticleId>,
    pub last_article_had_label: bool,
}

impl Default for StudySession {
    fn default() -> Self {
        Self::new()
    }
}

impl StudySession {
    pub fn new() -> Self {
        Self {
            prolific_id: None,
            condition: None,
            completed: BTreeSet::new(),
            round: 1,
            rounds_completed: 0,
            mid_rounds_completed: 0,
            seen_article_ids: BTreeSet::new(),
            current_recommendations: Vec::new(),
            current_article: None,
            topic_start_list: None,
            pre_questionnaire: None,
            first_article_id: None,
            next_article: None,
            last_article_had_label: false,
        }
    }

    pub fn is_completed(&self, step: Step) -> bool {
        self.completed.contains(&step)
    }

    pub fn complete(&mut self, step: Step) {
        self.completed.insert(step);
    }

    /// Articles shown in this session; only ever grows
    pub fn seen(&self) -> &BTreeSet<ArticleId> {
        &self.seen_article_ids
    }

    pub fn mark_seen(&mut self, id: ArticleId) {
        self.seen_article_ids.insert(id);
    }

    /// List that governs round 1, drawn on first use
    pub fn topic_start_list<R: Rng + ?Sized>(&mut self, rng: &mut R) -> TopicList {
        *self.topic_start_list.get_or_insert_with(|| {
            if rng.gen_bool(0.5) {
                TopicList::A
            } else {
                TopicList::B
            }
        })
    }

    /// Topics governing `round`
    pub fn topics_for<R: Rng + ?Sized>(&mut self, rng: &mut R, profile: &StudyProfile, round: u32) -> RoundTopics {
        let start = self.topic_start_list(rng);
        RoundTopics::resolve(profile, self.pre_questionnaire.as_ref(), start, round)
    }

    /// Move to the next round; the new round starts with no selection
    pub fn advance_round(&mut self) {
        self.round += 1;
        self.current_article = None;
        self.current_recommendations.clear();
    }
}

struct SessionEntry {
    session: StudySession,
    last_seen: DateTime<Utc>,
}

/// In-memory session store shared by all handlers
#[derive(Clone)]
pub struct SessionStore {
    entries: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
    ttl: Duration,
    cookie_name: String,
    participant_param: String,
}

impl SessionStore {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::minutes(config.ttl_minutes.max(1)),
            cookie_name: config.cookie_name.clone(),
            participant_param: config.participant_param.clone(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn participant_param(&self) -> &str {
        &self.participant_param
    }

    /// Live session by id (refreshes its idle timer)
    pub async fn load(&self, id: Uuid) -> Option<StudySession> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(&id) {
            Some(entry) if now - entry.last_seen <= self.ttl => {
                entry.last_seen = now;
                Some(entry.session.clone())
            }
            Some(_) => {
                entries.remove(&id);
                debug!("Session {} expired", id);
                None
            }
            None => None,
        }
    }

    /// Start a new session, dropping expired ones
    pub async fn create(&self) -> (Uuid, StudySession) {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let session = StudySession::new();

        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| now - e.last_seen <= self.ttl);
        if entries.len() < before {
            debug!("Discarded {} expired session(s)", before - entries.len());
        }
        entries.insert(
            id,
            SessionEntry {
                session: session.clone(),
                last_seen: now,
            },
        );
        (id, session)
    }

    pub async fn save(&self, id: Uuid, session: StudySession) {
        self.entries.write().await.insert(
            id,
            SessionEntry {
                session,
                last_seen: Utc::now(),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Session id from the request's Cookie header(s)
    pub fn session_id(&self, headers: &HeaderMap) -> Option<Uuid> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
    }

    pub fn set_cookie(&self, id: Uuid) -> Option<HeaderValue> {
        HeaderValue::from_str(&format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            self.cookie_name, id
        ))
        .ok()
    }
}

/// The request's session, inserted by [`identify_participant`]
///
/// Handlers mutate it through `Deref` and call [`Session::save`]; unsaved
/// changes are dropped.
#[derive(Clone)]
pub struct Session {
    id: Uuid,
    store: SessionStore,
    data: StudySession,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn save(&self) {
        self.store.save(self.id, self.data.clone()).await;
    }
}

impl Deref for Session {
    type Target = StudySession;

    fn deref(&self) -> &StudySession {
        &self.data
    }
}

impl DerefMut for Session {
    fn deref_mut(&mut self) -> &mut StudySession {
        &mut self.data
    }
}

/// Session and participant middleware
///
/// Ensures a session, captures the participant identifier, assigns the
/// condition on first contact, and sends requests without an identifier
/// back to the landing page.
pub async fn identify_participant(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let store = state.sessions.clone();

    let existing = match store.session_id(request.headers()) {
        Some(id) => store.load(id).await.map(|s| (id, s)),
        None => None,
    };
    let (id, mut data, is_new) = match existing {
        Some((id, data)) => (id, data, false),
        None => {
            let (id, data) = store.create().await;
            (id, data, true)
        }
    };

    let pid = Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(params)| params.get(store.participant_param()).cloned())
        .map(|pid| pid.trim().to_string())
        .filter(|pid| !pid.is_empty());

    let mut changed = is_new;
    if let Some(pid) = pid {
        if data.prolific_id.as_deref() != Some(pid.as_str()) {
            if data.prolific_id.is_some() {
                info!("Participant identifier changed in session {}; starting over", id);
                data = StudySession::new();
            }
            info!("Participant {} entered the study", pid);
            data.prolific_id = Some(pid);
            changed = true;
        }
    }

    if data.condition.is_none() {
        if let Some(pid) = data.prolific_id.clone() {
            let condition = state.assigner.assign(&state.db, &pid).await;
            info!("Participant {} assigned condition {}", pid, condition);
            data.condition = Some(condition);
            changed = true;
        }
    }

    if changed {
        store.save(id, data.clone()).await;
    }

    let mut response = if data.prolific_id.is_none() && request.uri().path() != "/" {
        debug!("No participant identifier; redirecting {} to landing", request.uri().path());
        Redirect::to("/").into_response()
    } else {
        request.extensions_mut().insert(Session {
            id,
            store: store.clone(),
            data,
        });
        next.run(request).await
    };

    if is_new {
        match store.set_cookie(id) {
            Some(cookie) => {
                response.headers_mut().append(header::SET_COOKIE, cookie);
            }
            None => warn!("Session cookie name is not a valid header value"),
        }
    }
    response
}
