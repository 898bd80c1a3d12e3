//! In-process mock of the wallet API for engine tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use kobra_core::{
    ActionKind, ActionWeight, AmountRange, OutcomeReporter, RequestOutcome, VirtualUserIdentity,
    VirtualUserState,
};
use kobra_engine::session::build_http_client;
use kobra_engine::{ActionRegistry, SessionClient, UserBehavior, VirtualUser};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// One request as seen by the mock.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
    pub body: Option<Value>,
    pub at: Instant,
}

struct MockState {
    requests: Mutex<Vec<RecordedRequest>>,
    login_status: StatusCode,
    login_body: Value,
    delays: Mutex<HashMap<String, VecDeque<Duration>>>,
    failing_paths: Vec<String>,
    rejected_emails: Vec<String>,
    per_user_tokens: bool,
}

pub struct MockWalletBuilder {
    login_status: StatusCode,
    login_body: Value,
    delays: HashMap<String, VecDeque<Duration>>,
    failing_paths: Vec<String>,
    rejected_emails: Vec<String>,
    per_user_tokens: bool,
}

impl MockWalletBuilder {
    pub fn login(mut self, status: StatusCode, body: Value) -> Self {
        self.login_status = status;
        self.login_body = body;
        self
    }

    /// Delays the next call to `path` by `delay`; queued per call.
    pub fn delay(mut self, path: &str, delay: Duration) -> Self {
        self.delays
            .entry(path.to_string())
            .or_default()
            .push_back(delay);
        self
    }

    /// Answers every call to `path` with 500.
    pub fn fail(mut self, path: &str) -> Self {
        self.failing_paths.push(path.to_string());
        self
    }

    /// Answers logins for `email` with 401.
    pub fn reject_login(mut self, email: &str) -> Self {
        self.rejected_emails.push(email.to_string());
        self
    }

    /// Issues each user its own email as access token, so requests can be
    /// attributed through the bearer header.
    pub fn per_user_tokens(mut self) -> Self {
        self.per_user_tokens = true;
        self
    }

    pub async fn start(self) -> MockWallet {
        let state = Arc::new(MockState {
            requests: Mutex::new(Vec::new()),
            login_status: self.login_status,
            login_body: self.login_body,
            delays: Mutex::new(self.delays),
            failing_paths: self.failing_paths,
            rejected_emails: self.rejected_emails,
            per_user_tokens: self.per_user_tokens,
        });

        let app = Router::new().fallback(handle).with_state(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockWallet { addr, state }
    }
}

pub struct MockWallet {
    addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockWallet {
    pub fn builder() -> MockWalletBuilder {
        MockWalletBuilder {
            login_status: StatusCode::OK,
            login_body: login_body("t1", "u1", "w1"),
            delays: HashMap::new(),
            failing_paths: Vec::new(),
            rejected_emails: Vec::new(),
            per_user_tokens: false,
        }
    }

    pub async fn start() -> MockWallet {
        Self::builder().start().await
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

pub fn login_body(token: &str, user_id: &str, wallet_id: &str) -> Value {
    json!({
        "access_token": token,
        "user": { "id": user_id, "wallet": { "id": wallet_id } }
    })
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let body: Option<Value> = serde_json::from_slice(&body).ok();
    state.requests.lock().push(RecordedRequest {
        method: method.clone(),
        path: path.clone(),
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.clone(),
        at: Instant::now(),
    });

    let delay = state.delays.lock().get_mut(&path).and_then(VecDeque::pop_front);
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    if state.failing_paths.contains(&path) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "boom" })))
            .into_response();
    }

    match path.as_str() {
        "/auth/login" => login(&state, body.as_ref()),
        "/wallet/balance" => Json(json!({ "balance": 100 })).into_response(),
        "/transactions" if method == Method::GET => Json(json!([])).into_response(),
        "/transactions" | "/wallet/deposit" | "/wallet/debin" => {
            (StatusCode::CREATED, Json(json!({ "ok": true }))).into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

fn login(state: &MockState, body: Option<&Value>) -> Response {
    let email = body
        .and_then(|b| b["email"].as_str())
        .unwrap_or_default()
        .to_string();

    if state.rejected_emails.contains(&email) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "rejected" })))
            .into_response();
    }
    if state.per_user_tokens {
        return Json(login_body(&email, &email, &email)).into_response();
    }
    (state.login_status, Json(state.login_body.clone())).into_response()
}

/// Reporter keeping every outcome in arrival order.
#[derive(Default)]
pub struct RecordingReporter {
    outcomes: Mutex<Vec<RequestOutcome>>,
}

impl RecordingReporter {
    pub fn outcomes(&self) -> Vec<RequestOutcome> {
        self.outcomes.lock().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.outcomes()
            .into_iter()
            .map(|o| o.action_name)
            .collect()
    }
}

impl OutcomeReporter for RecordingReporter {
    fn emit(&self, outcome: RequestOutcome) {
        self.outcomes.lock().push(outcome);
    }
}

pub fn behavior(pool_ceiling: u64, max_cycles: Option<u64>) -> UserBehavior {
    UserBehavior {
        min_wait: Duration::ZERO,
        max_wait: Duration::ZERO,
        transfer_amount: AmountRange::new(1, 2),
        deposit_amount: AmountRange::new(10, 1_000),
        seed_deposit: false,
        max_cycles,
        password: "password123".to_string(),
        email_domain: "example.com".to_string(),
        pool_ceiling,
    }
}

pub fn registry(kinds: &[ActionKind]) -> Arc<ActionRegistry> {
    let mix: Vec<ActionWeight> = kinds.iter().map(|&k| ActionWeight::new(k, 1)).collect();
    Arc::new(ActionRegistry::new(&mix).unwrap())
}

pub struct TestUser {
    pub user: VirtualUser,
    pub state: watch::Receiver<VirtualUserState>,
    pub cancel: CancellationToken,
}

pub fn virtual_user(
    wallet: &MockWallet,
    reporter: Arc<dyn OutcomeReporter>,
    registry: Arc<ActionRegistry>,
    behavior: UserBehavior,
    timeout: Duration,
) -> TestUser {
    let http = build_http_client(timeout).unwrap();
    let session = SessionClient::new(http, wallet.base_url(), reporter);
    let cancel = CancellationToken::new();
    let (user, state) = VirtualUser::new(
        0,
        VirtualUserIdentity::from_sequence(1),
        session,
        registry,
        Arc::new(behavior),
        Some(7),
        cancel.clone(),
    );

    TestUser {
        user,
        state,
        cancel,
    }
}
