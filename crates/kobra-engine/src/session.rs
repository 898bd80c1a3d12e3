//! HTTP session for one virtual user
//!
//! [`SessionClient`] can only log in. A successful login yields an
//! [`AuthenticatedSession`], the only type able to issue bearer-authenticated
//! requests, so no action can run before authentication.
//!
//! Steady-state calls never return errors: status codes and transport faults
//! become failed [`RequestOutcome`]s, and every outcome is forwarded to the
//! session's reporter. Each request is attempted exactly once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kobra_core::{OutcomeReporter, RequestOutcome, SessionCredentials};
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::actions::ActionPlan;

/// Name used for login outcomes.
pub const LOGIN_ACTION: &str = "login";

const MAX_ERROR_BODY_CHARS: usize = 512;

/// Failures while establishing a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Login answered with a non-success status.
    #[error("authentication rejected with status {status}: {body}")]
    Authentication { status: u16, body: String },

    /// Login succeeded but the body lacks an expected field.
    #[error("login response is missing `{field}`")]
    MalformedResponse { field: &'static str },

    /// Timeout, refused connection, DNS failure and the like.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// One HTTP request of an action.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRequest {
    pub method: Method,
    pub path: &'static str,
    pub body: Option<Value>,
}

impl PlannedRequest {
    pub fn get(path: &'static str) -> Self {
        Self {
            method: Method::GET,
            path,
            body: None,
        }
    }

    pub fn post(path: &'static str, body: Value) -> Self {
        Self {
            method: Method::POST,
            path,
            body: Some(body),
        }
    }
}

/// Builds the HTTP client shared by every session of a run.
pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("kobra-load/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Unauthenticated session.
pub struct SessionClient {
    http: Client,
    base_url: String,
    reporter: Arc<dyn OutcomeReporter>,
}

impl SessionClient {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        reporter: Arc<dyn OutcomeReporter>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            reporter,
        }
    }

    /// Performs `POST /auth/login` and captures the session credentials.
    ///
    /// The login attempt is reported as a `login` outcome either way.
    pub async fn login(
        self,
        email: &str,
        password: &str,
    ) -> Result<AuthenticatedSession, SessionError> {
        let started = Instant::now();
        let result = self.request_credentials(email, password).await;
        let latency = started.elapsed();

        match result {
            Ok((status, credentials)) => {
                self.reporter
                    .emit(RequestOutcome::success(LOGIN_ACTION, status, latency));
                debug!(email, user_id = %credentials.user_id, "login succeeded");
                Ok(AuthenticatedSession {
                    http: self.http,
                    base_url: self.base_url,
                    reporter: self.reporter,
                    credentials,
                })
            }
            Err(err) => {
                let status = match &err {
                    SessionError::Authentication { status, .. } => Some(*status),
                    SessionError::Transport(e) => e.status().map(|s| s.as_u16()),
                    SessionError::MalformedResponse { .. } => Some(StatusCode::OK.as_u16()),
                };
                self.reporter.emit(RequestOutcome::failure(
                    LOGIN_ACTION,
                    status,
                    latency,
                    err.to_string(),
                ));
                Err(err)
            }
        }
    }

    async fn request_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(u16, SessionCredentials), SessionError> {
        let response = self
            .http
            .post(format!("{}/auth/login", self.base_url))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SessionError::Authentication {
                status: status.as_u16(),
                body: truncate(body),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|_| SessionError::MalformedResponse { field: "body" })?;

        Ok((status.as_u16(), parse_credentials(&body)?))
    }
}

/// Extracts token, user id and wallet id from a login body.
///
/// Ids may be strings or numbers.
pub fn parse_credentials(body: &Value) -> Result<SessionCredentials, SessionError> {
    let access_token = field(body, "/access_token", "access_token")?;
    let user_id = field(body, "/user/id", "user.id")?;
    let wallet_id = field(body, "/user/wallet/id", "user.wallet.id")?;

    Ok(SessionCredentials::new(access_token, user_id, wallet_id))
}

fn field(body: &Value, pointer: &str, name: &'static str) -> Result<String, SessionError> {
    match body.pointer(pointer) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(SessionError::MalformedResponse { field: name }),
    }
}

fn truncate(mut body: String) -> String {
    if let Some((cut, _)) = body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        body.truncate(cut);
    }
    body
}

/// Session holding credentials; issues authenticated requests.
pub struct AuthenticatedSession {
    http: Client,
    base_url: String,
    reporter: Arc<dyn OutcomeReporter>,
    credentials: SessionCredentials,
}

impl AuthenticatedSession {
    pub fn credentials(&self) -> &SessionCredentials {
        &self.credentials
    }

    /// Executes every request of `plan` in order, stopping at the first
    /// failure, and reports a single outcome for the whole action.
    pub async fn call(&self, plan: &ActionPlan) -> RequestOutcome {
        let started = Instant::now();
        let mut last_status = None;

        for request in &plan.requests {
            match self.send(request).await {
                Ok(status) => last_status = Some(status),
                Err((status, detail)) => {
                    let outcome = RequestOutcome::failure(
                        plan.name,
                        status,
                        started.elapsed(),
                        detail,
                    );
                    warn!(
                        action = plan.name,
                        path = request.path,
                        status = ?outcome.http_status,
                        error = outcome.error_detail.as_deref().unwrap_or_default(),
                        "action failed"
                    );
                    self.reporter.emit(outcome.clone());
                    return outcome;
                }
            }
        }

        let outcome = RequestOutcome {
            action_name: plan.name.to_string(),
            success: true,
            http_status: last_status,
            latency: started.elapsed(),
            error_detail: None,
        };
        self.reporter.emit(outcome.clone());
        outcome
    }

    async fn send(&self, request: &PlannedRequest) -> Result<u16, (Option<u16>, String)> {
        let mut builder = self
            .http
            .request(request.method.clone(), format!("{}{}", self.base_url, request.path))
            .header(reqwest::header::AUTHORIZATION, self.credentials.bearer());

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| (e.status().map(|s| s.as_u16()), describe_transport(&e)))?;

        let status = response.status();

        // Drain the body so the connection goes back to the pool.
        response
            .bytes()
            .await
            .map_err(|e| (Some(status.as_u16()), describe_transport(&e)))?;

        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err((
                Some(status.as_u16()),
                format!("unexpected status {status} from {}", request.path),
            ))
        }
    }
}

fn describe_transport(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}
