//! In-process account API used by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};

use sidita_core::auth::{CookieJar, MemoryCookieJar, Navigator, SessionOptions, SessionState};
use sidita_core::{ApiClient, SessionManager};

pub const PASSWORD: &str = "correct horse";

/// Build a three-part token whose payload carries `exp` and a marker
pub fn jwt(exp: i64, marker: &str) -> String {
    let payload = json!({ "exp": exp, "jti": marker }).to_string();
    format!("header.{}.signature", URL_SAFE_NO_PAD.encode(payload))
}

pub fn in_seconds(secs: i64) -> i64 {
    chrono::Utc::now().timestamp() + secs
}

#[derive(Debug)]
pub struct Recorded {
    /// `exp` of tokens issued by /auth/authenticate
    pub login_exp: i64,
    /// `exp` of tokens issued by /auth/account/refresh
    pub refresh_exp: i64,
    /// Issue this exact token from /auth/authenticate instead of a JWT
    pub login_token: Option<String>,
    pub logins: usize,
    pub refreshes: usize,
    pub revokes: usize,
    pub fail_revoke: bool,
    /// Answer every user-resource request with this status
    pub reject_with: Option<StatusCode>,
    /// Answer /auth/authenticate with this status
    pub reject_login_with: Option<StatusCode>,
    /// Hold the response of these paths for a while
    pub delays: HashMap<&'static str, Duration>,
    /// (path, body) of every POST/PUT to an account flow or the user resource
    pub bodies: Vec<(String, Value)>,
    /// (path, bearer) of every request
    pub bearers: Vec<(String, Option<String>)>,
}

impl Default for Recorded {
    fn default() -> Self {
        Self {
            login_exp: in_seconds(3600),
            refresh_exp: in_seconds(3600),
            login_token: None,
            logins: 0,
            refreshes: 0,
            revokes: 0,
            fail_revoke: false,
            reject_with: None,
            reject_login_with: None,
            delays: HashMap::new(),
            bodies: Vec::new(),
            bearers: Vec::new(),
        }
    }
}

type Shared = Arc<Mutex<Recorded>>;

pub struct TestServer {
    pub base_url: String,
    recorded: Shared,
}

impl TestServer {
    pub async fn start() -> Self {
        let recorded: Shared = Arc::new(Mutex::new(Recorded::default()));

        let app = Router::new()
            .route("/auth/authenticate", post(authenticate))
            .route("/auth/account/logout", get(revoke))
            .route("/auth/account/refresh", post(refresh))
            .route("/register", post(account_flow))
            .route("/verify-email", post(account_flow))
            .route("/forgot-password", post(account_flow))
            .route("/validate-reset-token", post(account_flow))
            .route("/reset-password", post(account_flow))
            .route("/", get(list_users).post(create_user))
            .route("/{id}", get(get_user).put(update_user).delete(delete_user))
            .with_state(Arc::clone(&recorded));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("test server");
        });

        Self {
            base_url: format!("http://{}", addr),
            recorded,
        }
    }

    pub fn recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().expect("recorded state")
    }

    pub fn bearer_for(&self, path: &str) -> Option<String> {
        self.recorded()
            .bearers
            .iter()
            .rev()
            .find(|(p, _)| p == path)
            .and_then(|(_, b)| b.clone())
    }

    /// Wait until the server has seen `count` revoke requests
    pub async fn wait_for_revokes(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.recorded().revokes < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("revoke request should have arrived");
    }

    pub fn body_for(&self, path: &str) -> Option<Value> {
        self.recorded()
            .bodies
            .iter()
            .rev()
            .find(|(p, _)| p == path)
            .map(|(_, b)| b.clone())
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<String> {
        self.routes.lock().expect("routes").clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: &str) {
        self.routes.lock().expect("routes").push(route.to_string());
    }
}

pub struct Harness {
    pub server: TestServer,
    pub manager: SessionManager,
    pub cookies: Arc<MemoryCookieJar>,
    pub navigator: Arc<RecordingNavigator>,
}

impl Harness {
    pub async fn start() -> Self {
        Self::with_cookies(Arc::new(MemoryCookieJar::new())).await
    }

    pub async fn with_cookies(cookies: Arc<MemoryCookieJar>) -> Self {
        let server = TestServer::start().await;
        let api = ApiClient::new(&server.base_url).expect("api client");
        let navigator = Arc::new(RecordingNavigator::default());
        let jar: Arc<dyn CookieJar> = cookies.clone();
        let nav: Arc<dyn Navigator> = navigator.clone();

        let manager = SessionManager::new(
            api,
            Arc::new(SessionState::new()),
            jar,
            nav,
            SessionOptions::default(),
        );

        Self {
            server,
            manager,
            cookies,
            navigator,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn record_bearer(state: &Shared, path: &str, headers: &HeaderMap) -> Option<String> {
    let token = bearer(headers);
    state
        .lock()
        .expect("recorded state")
        .bearers
        .push((path.to_string(), token.clone()));
    token
}

fn profile(id: i64, token: &str) -> Value {
    json!({
        "id": id,
        "token": token,
        "title": "Ms",
        "firstName": "Ada",
        "lastName": "Lovelace",
        "email": "ada@example.com",
        "role": "Admin"
    })
}

fn message(status: StatusCode, text: &str) -> Response {
    (status, Json(json!({ "message": text }))).into_response()
}

/// Sleep if a delay is configured for `path`. The state lock is not held.
async fn pause(state: &Shared, path: &str) {
    let delay = state.lock().expect("recorded state").delays.get(path).copied();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

fn rejection(status: StatusCode) -> Response {
    message(status, status.canonical_reason().unwrap_or("Rejected"))
}

async fn authenticate(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    record_bearer(&state, "/auth/authenticate", &headers);
    pause(&state, "/auth/authenticate").await;
    let mut recorded = state.lock().expect("recorded state");
    if let Some(status) = recorded.reject_login_with {
        return rejection(status);
    }
    if body["email"] != "ada@example.com" || body["password"] != PASSWORD {
        return message(StatusCode::BAD_REQUEST, "Email or password is incorrect");
    }
    recorded.logins += 1;
    let token = match recorded.login_token {
        Some(ref token) => token.clone(),
        None => jwt(recorded.login_exp, &format!("login-{}", recorded.logins)),
    };
    (
        [(header::SET_COOKIE, "refreshToken=rt; Path=/; HttpOnly")],
        Json(profile(1, &token)),
    )
        .into_response()
}

async fn revoke(State(state): State<Shared>, headers: HeaderMap) -> Response {
    record_bearer(&state, "/auth/account/logout", &headers);
    let fail = {
        let mut recorded = state.lock().expect("recorded state");
        recorded.revokes += 1;
        recorded.fail_revoke
    };
    pause(&state, "/auth/account/logout").await;
    if fail {
        return message(StatusCode::INTERNAL_SERVER_ERROR, "revoke failed");
    }
    StatusCode::OK.into_response()
}

async fn refresh(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let token = record_bearer(&state, "/auth/account/refresh", &headers);
    let has_cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("refreshToken="))
        .unwrap_or(false);
    if token.is_none() && !has_cookie {
        return message(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    pause(&state, "/auth/account/refresh").await;
    let mut recorded = state.lock().expect("recorded state");
    recorded.refreshes += 1;
    let token = jwt(recorded.refresh_exp, &format!("refresh-{}", recorded.refreshes));
    Json(profile(1, &token)).into_response()
}

async fn account_flow(
    State(state): State<Shared>,
    uri: axum::http::Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let path = uri.path().to_string();
    record_bearer(&state, &path, &headers);
    state
        .lock()
        .expect("recorded state")
        .bodies
        .push((path.clone(), body));
    message(StatusCode::OK, &format!("{} ok", path))
}

fn rejected(state: &Shared) -> Option<Response> {
    state
        .lock()
        .expect("recorded state")
        .reject_with
        .map(rejection)
}

async fn list_users(State(state): State<Shared>, headers: HeaderMap) -> Response {
    record_bearer(&state, "/", &headers);
    if let Some(response) = rejected(&state) {
        return response;
    }
    Json(json!([
        { "id": 1, "email": "ada@example.com", "role": "Admin" },
        { "id": 2, "email": "grace@example.com", "role": "User" }
    ]))
    .into_response()
}

async fn create_user(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    record_bearer(&state, "/", &headers);
    if let Some(response) = rejected(&state) {
        return response;
    }
    state
        .lock()
        .expect("recorded state")
        .bodies
        .push(("/".to_string(), body));
    message(StatusCode::OK, "User created")
}

async fn get_user(
    State(state): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    record_bearer(&state, &format!("/{}", id), &headers);
    if let Some(response) = rejected(&state) {
        return response;
    }
    match id.as_str() {
        "1" => Json(json!({ "id": 1, "email": "ada@example.com" })).into_response(),
        "2" => Json(json!({ "id": 2, "email": "grace@example.com" })).into_response(),
        "3" => Json(json!({ "email": "legacy@example.com" })).into_response(),
        _ => message(StatusCode::NOT_FOUND, "User not found"),
    }
}

async fn update_user(
    State(state): State<Shared>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    record_bearer(&state, &format!("/{}", id), &headers);
    if let Some(response) = rejected(&state) {
        return response;
    }
    state
        .lock()
        .expect("recorded state")
        .bodies
        .push((format!("/{}", id), body.clone()));

    let mut account = json!({ "id": id, "email": "someone@example.com", "role": "User" });
    if let (Some(target), Some(fields)) = (account.as_object_mut(), body.as_object()) {
        target.extend(fields.clone());
    }
    Json(account).into_response()
}

async fn delete_user(
    State(state): State<Shared>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    record_bearer(&state, &format!("/{}", id), &headers);
    if let Some(response) = rejected(&state) {
        return response;
    }
    message(StatusCode::OK, "Account deleted successfully")
}
