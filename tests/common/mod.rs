// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared test fixtures: a mock XRPC server and wiring helpers.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use macroblog::config::Config;
use macroblog::routes::create_router;
use macroblog::services::{AuthNotifier, SessionManager, XrpcClient};
use macroblog::store::{MemoryStore, TokenStore};
use macroblog::time_utils::{Clock, ManualClock};
use macroblog::AppState;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const POST_COLLECTION: &str = "com.macroblog.blog.post";
pub const ACCESS_TTL_SECS: i64 = 3600;

const MOCK_SIGNING_KEY: &[u8] = b"mock-pds-signing-key";

#[derive(Debug, Clone)]
pub struct MockAccount {
    pub did: String,
    pub handle: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

/// State of the mock server. Counters are public so tests can assert on
/// how many remote calls were made.
pub struct MockState {
    pub clock: Arc<ManualClock>,
    accounts: Mutex<Vec<MockAccount>>,
    records: Mutex<HashMap<String, Vec<(String, Value)>>>,
    refresh_tokens: Mutex<HashMap<String, String>>,
    next_refresh: AtomicUsize,

    pub create_session_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub get_profile_calls: AtomicUsize,
    pub get_record_calls: AtomicUsize,
    pub list_records_calls: AtomicUsize,

    /// Answer createSession with this status and XRPC error name.
    pub force_create_status: Mutex<Option<(u16, String)>>,
    /// Delay before answering refreshSession.
    pub refresh_delay: Mutex<Duration>,
    pub reject_refresh: AtomicBool,
    pub get_record_disabled: AtomicBool,
    /// Send back a cursor even after the last page.
    pub repeat_last_cursor: AtomicBool,
}

impl MockState {
    fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            accounts: Mutex::new(Vec::new()),
            records: Mutex::new(HashMap::new()),
            refresh_tokens: Mutex::new(HashMap::new()),
            next_refresh: AtomicUsize::new(1),
            create_session_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            get_profile_calls: AtomicUsize::new(0),
            get_record_calls: AtomicUsize::new(0),
            list_records_calls: AtomicUsize::new(0),
            force_create_status: Mutex::new(None),
            refresh_delay: Mutex::new(Duration::ZERO),
            reject_refresh: AtomicBool::new(false),
            get_record_disabled: AtomicBool::new(false),
            repeat_last_cursor: AtomicBool::new(false),
        }
    }

    fn find_account(&self, actor: &str) -> Option<MockAccount> {
        self.accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.did == actor || a.handle == actor || a.email == actor)
            .cloned()
    }

    fn issue_session(&self, account: &MockAccount) -> Value {
        let n = self.next_refresh.fetch_add(1, Ordering::SeqCst);
        let refresh_jwt = format!("r{n}");
        self.refresh_tokens
            .lock()
            .unwrap()
            .insert(refresh_jwt.clone(), account.did.clone());

        let exp = self.clock.now() + ChronoDuration::seconds(ACCESS_TTL_SECS);
        json!({
            "did": account.did,
            "handle": account.handle,
            "email": account.email,
            "accessJwt": mint_access_jwt(&account.did, exp),
            "refreshJwt": refresh_jwt,
        })
    }
}

/// Mock XRPC server on an ephemeral local port.
pub struct MockPds {
    pub url: String,
    pub state: Arc<MockState>,
    task: JoinHandle<()>,
}

impl Drop for MockPds {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl MockPds {
    /// Start a server with alice and bob registered.
    pub async fn start() -> Self {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let pds = Self::start_empty(clock).await;
        pds.add_account("did:plc:abc", "alice.test", "app-pw-1", Some("Alice"));
        pds.add_account("did:plc:bob", "bob.test", "app-pw-2", None);
        pds
    }

    pub async fn start_empty(clock: Arc<ManualClock>) -> Self {
        let state = Arc::new(MockState::new(clock));

        let app = Router::new()
            .route(
                "/xrpc/com.atproto.server.createSession",
                post(create_session),
            )
            .route(
                "/xrpc/com.atproto.server.refreshSession",
                post(refresh_session),
            )
            .route("/xrpc/app.bsky.actor.getProfile", get(get_profile))
            .route("/xrpc/com.atproto.repo.getRecord", get(get_record))
            .route("/xrpc/com.atproto.repo.listRecords", get(list_records))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}"),
            state,
            task,
        }
    }

    pub fn clock(&self) -> Arc<ManualClock> {
        self.state.clock.clone()
    }

    pub fn add_account(&self, did: &str, handle: &str, password: &str, display_name: Option<&str>) {
        self.state.accounts.lock().unwrap().push(MockAccount {
            did: did.to_string(),
            handle: handle.to_string(),
            email: format!("{}@example.com", handle.split('.').next().unwrap_or(handle)),
            password: password.to_string(),
            display_name: display_name.map(str::to_string),
        });
    }

    /// Add `count` well-formed posts to `did`'s collection, rkeys `post01..`.
    pub fn seed_posts(&self, did: &str, count: usize) {
        for i in 1..=count {
            self.add_record(
                did,
                &format!("post{i:02}"),
                json!({
                    "$type": POST_COLLECTION,
                    "title": format!("Post {i}"),
                    "text": format!("Body of post {i}"),
                    "tags": ["test"],
                    "createdAt": created_at(i),
                }),
            );
        }
    }

    pub fn add_record(&self, did: &str, rkey: &str, value: Value) {
        self.state
            .records
            .lock()
            .unwrap()
            .entry(did.to_string())
            .or_default()
            .push((rkey.to_string(), value));
    }

    pub fn record_uri(did: &str, rkey: &str) -> String {
        format!("at://{did}/{POST_COLLECTION}/{rkey}")
    }

    pub fn force_create_status(&self, status: u16, error: &str) {
        *self.state.force_create_status.lock().unwrap() = Some((status, error.to_string()));
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.state.refresh_delay.lock().unwrap() = delay;
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn create_session_calls(&self) -> usize {
        self.state.create_session_calls.load(Ordering::SeqCst)
    }

    pub fn list_records_calls(&self) -> usize {
        self.state.list_records_calls.load(Ordering::SeqCst)
    }
}

/// A distinct, valid timestamp per seeded post.
fn created_at(i: usize) -> String {
    let base = DateTime::from_timestamp(1_767_225_600, 0).unwrap();
    (base + ChronoDuration::minutes(i as i64)).to_rfc3339()
}

fn xrpc_error(status: StatusCode, error: &str, message: &str) -> Response {
    (status, Json(json!({ "error": error, "message": message }))).into_response()
}

async fn create_session(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.create_session_calls.fetch_add(1, Ordering::SeqCst);

    let forced = state.force_create_status.lock().unwrap().clone();
    if let Some((status, error)) = forced {
        let status = StatusCode::from_u16(status).unwrap();
        return xrpc_error(status, &error, "Forced failure");
    }

    let identifier = body["identifier"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();

    match state.find_account(identifier) {
        Some(account) if account.password == password => {
            Json(state.issue_session(&account)).into_response()
        }
        _ => xrpc_error(
            StatusCode::UNAUTHORIZED,
            "AuthenticationRequired",
            "Invalid identifier or password",
        ),
    }
}

async fn refresh_session(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let delay = *state.refresh_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string();

    if state.reject_refresh.load(Ordering::SeqCst) {
        return xrpc_error(StatusCode::BAD_REQUEST, "ExpiredToken", "Token has expired");
    }

    // Refresh tokens are single use.
    let did = state.refresh_tokens.lock().unwrap().remove(&token);
    match did.and_then(|did| state.find_account(&did)) {
        Some(account) => Json(state.issue_session(&account)).into_response(),
        None => xrpc_error(
            StatusCode::BAD_REQUEST,
            "InvalidToken",
            "Token could not be verified",
        ),
    }
}

async fn get_profile(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.get_profile_calls.fetch_add(1, Ordering::SeqCst);

    let actor = params.get("actor").map(String::as_str).unwrap_or_default();
    let Some(account) = state.find_account(actor) else {
        return xrpc_error(StatusCode::BAD_REQUEST, "InvalidRequest", "Profile not found");
    };
    let posts = state
        .records
        .lock()
        .unwrap()
        .get(&account.did)
        .map_or(0, Vec::len);

    Json(json!({
        "did": account.did,
        "handle": account.handle,
        "displayName": account.display_name,
        "avatar": format!("https://cdn.example/{}.jpg", account.handle),
        "description": "Writes things",
        "followersCount": 10,
        "followsCount": 5,
        "postsCount": posts,
    }))
    .into_response()
}

async fn get_record(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.get_record_calls.fetch_add(1, Ordering::SeqCst);

    if state.get_record_disabled.load(Ordering::SeqCst) {
        return xrpc_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "InternalServerError",
            "getRecord unavailable",
        );
    }

    let repo = params.get("repo").cloned().unwrap_or_default();
    let rkey = params.get("rkey").cloned().unwrap_or_default();
    let Some(account) = state.find_account(&repo) else {
        return xrpc_error(StatusCode::BAD_REQUEST, "InvalidRequest", "Could not find repo");
    };

    let records = state.records.lock().unwrap();
    let found = records
        .get(&account.did)
        .and_then(|list| list.iter().find(|(k, _)| *k == rkey));

    match found {
        Some((rkey, value)) => Json(json!({
            "uri": MockPds::record_uri(&account.did, rkey),
            "cid": format!("bafy{rkey}"),
            "value": value,
        }))
        .into_response(),
        None => xrpc_error(
            StatusCode::BAD_REQUEST,
            "RecordNotFound",
            "Could not locate record",
        ),
    }
}

async fn list_records(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.list_records_calls.fetch_add(1, Ordering::SeqCst);

    let repo = params.get("repo").cloned().unwrap_or_default();
    let limit: usize = params
        .get("limit")
        .and_then(|l| l.parse().ok())
        .unwrap_or(50);
    let start: usize = params
        .get("cursor")
        .and_then(|c| c.parse().ok())
        .unwrap_or(0);

    let Some(account) = state.find_account(&repo) else {
        return xrpc_error(StatusCode::BAD_REQUEST, "InvalidRequest", "Could not find repo");
    };

    let records = state.records.lock().unwrap();
    let all = records.get(&account.did).cloned().unwrap_or_default();
    let end = (start + limit).min(all.len());
    let page: Vec<Value> = all
        .get(start..end)
        .unwrap_or_default()
        .iter()
        .map(|(rkey, value)| {
            json!({
                "uri": MockPds::record_uri(&account.did, rkey),
                "cid": format!("bafy{rkey}"),
                "value": value,
            })
        })
        .collect();

    let cursor = if end < all.len() {
        Some(end.to_string())
    } else if state.repeat_last_cursor.load(Ordering::SeqCst) {
        Some(start.to_string())
    } else {
        None
    };

    Json(json!({ "records": page, "cursor": cursor })).into_response()
}

/// Mint an access JWT for `did` expiring at `exp`.
#[allow(dead_code)]
pub fn mint_access_jwt(did: &str, exp: DateTime<Utc>) -> String {
    let claims = json!({
        "scope": "com.atproto.access",
        "sub": did,
        "iat": (exp - ChronoDuration::seconds(ACCESS_TTL_SECS)).timestamp(),
        "exp": exp.timestamp(),
    });
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(MOCK_SIGNING_KEY),
    )
    .unwrap()
}

/// Config pointing at the mock server.
#[allow(dead_code)]
pub fn test_config(pds: &MockPds) -> Config {
    Config {
        service_url: pds.url.clone(),
        http_timeout: Duration::from_secs(5),
        ..Config::default()
    }
}

#[allow(dead_code)]
pub fn test_xrpc(pds: &MockPds) -> XrpcClient {
    XrpcClient::new(&pds.url, Duration::from_secs(5)).unwrap()
}

/// Session manager on `notifier`'s store, driven by the mock's clock.
#[allow(dead_code)]
pub fn test_manager(pds: &MockPds, notifier: &AuthNotifier) -> Arc<SessionManager> {
    let clock: Arc<dyn Clock> = pds.clock();
    Arc::new(SessionManager::new(test_xrpc(pds), notifier.clone()).with_clock(clock))
}

/// A fresh memory store with a notifier over it.
#[allow(dead_code)]
pub fn test_notifier() -> (Arc<MemoryStore>, AuthNotifier) {
    let store = Arc::new(MemoryStore::new());
    let notifier = AuthNotifier::new(store.clone());
    (store, notifier)
}

/// Create a test app against the mock server.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app(pds: &MockPds) -> (Router, Arc<AppState>) {
    create_test_app_with(test_config(pds))
}

#[allow(dead_code)]
pub fn create_test_app_with(config: Config) -> (Router, Arc<AppState>) {
    let store: Arc<dyn TokenStore> = Arc::new(MemoryStore::new());
    let state = Arc::new(AppState::new(config, store).unwrap());
    (create_router(state.clone()), state)
}

/// Poll `condition` until it holds or two seconds pass.
#[allow(dead_code)]
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
