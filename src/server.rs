//! HTTP server: the three pages plus a small JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Landing page |
//! | `GET`  | `/chat` | Docs chat page with the session transcript |
//! | `POST` | `/chat` | Submit a question (form field `question`) |
//! | `GET`  | `/debugger` | Contract debugger page |
//! | `POST` | `/debugger` | Submit code (form fields `mode`, `code`) |
//! | `GET`  | `/api/examples` | Example prompts |
//! | `GET`  | `/api/session` | Session transcript and pending flag |
//! | `POST` | `/api/chat` | `{ "question": ... }` → chat flow |
//! | `POST` | `/api/contract` | `{ "mode": ..., "code": ... }` → contract flow |
//! | `POST` | `/api/session/cancel` | Cancel the session's outstanding request |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Sessions
//!
//! A browser gets an `arbgpt_session` cookie holding a server-generated
//! UUID on its first submission. The cookie selects the [`Session`] handed
//! to the flows. Page views and `GET /api/session` only look sessions up,
//! so plain visits never allocate one.
//!
//! # Error Contract
//!
//! JSON errors use one shape:
//!
//! ```json
//! { "error": { "code": "upstream", "message": "Chat completion API error 401: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `busy` (409), `cancelled` (409),
//! `timeout` (504), `upstream` (502), `internal` (500).
//! Pages render a generic failure panel with the same status codes.

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::flows::{Failure, FailureReason, Flows, Outcome};
use crate::models::{ContractMode, Turn};
use crate::pages::{ChatView, ContractResult, DebuggerView, Pages};
use crate::prompts::EXAMPLE_PROMPTS;
use crate::session::{Session, SessionStore};

pub const SESSION_COOKIE: &str = "arbgpt_session";

const BUSY_NOTICE: &str = "Still working on your previous request. Please wait for it to finish.";

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    flows: Arc<Flows>,
    sessions: Arc<SessionStore>,
    pages: Arc<Pages>,
}

impl AppState {
    pub fn new(config: &Config, flows: Arc<Flows>) -> anyhow::Result<Self> {
        Ok(Self {
            flows,
            sessions: Arc::new(SessionStore::new(Duration::from_secs(
                config.server.session_ttl_secs,
            ))),
            pages: Arc::new(Pages::new(&config.ui)?),
        })
    }
}

/// How often idle sessions are swept when no requests arrive.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Build the router with all routes and layers.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_home))
        .route("/chat", get(handle_chat_page).post(handle_chat_submit))
        .route("/debugger", get(handle_debugger_page).post(handle_debugger_submit))
        .route("/api/examples", get(handle_examples))
        .route("/api/session", get(handle_session))
        .route("/api/session/cancel", post(handle_cancel))
        .route("/api/chat", post(handle_api_chat))
        .route("/api/contract", post(handle_api_contract))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server.
///
/// Binds to `[server].bind` and serves until Ctrl-C. Idle sessions are swept
/// in the background. On shutdown the flows' cancellation token is fired so
/// outstanding upstream calls stop promptly.
pub async fn run_server(config: &Config, flows: Arc<Flows>) -> anyhow::Result<()> {
    let shutdown = flows.shutdown_token().clone();
    let state = AppState::new(config, flows)?;

    let sessions = state.sessions.clone();
    let sweeper_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = sweeper_shutdown.cancelled() => break,
                _ = interval.tick() => {
                    sessions.purge_expired();
                }
            }
        }
    });

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!("ArbGPT listening on http://{}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutting down");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body, matching the error contract in the module docs.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Machine-readable code plus a human-readable message.
#[derive(Serialize)]
struct ErrorDetail {
    /// Error code (`"bad_request"`, `"busy"`, `"timeout"`, ...).
    code: String,
    /// Human-readable error message; for upstream failures, the error chain.
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    /// HTTP status sent with the body.
    status: StatusCode,
    /// Value of `error.code`.
    code: String,
    /// Value of `error.message`.
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %format!("{:#}", err), "internal error");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal".to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn busy() -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: "busy".to_string(),
        message: BUSY_NOTICE.to_string(),
    }
}

fn failure_status(reason: FailureReason) -> StatusCode {
    match reason {
        FailureReason::Timeout => StatusCode::GATEWAY_TIMEOUT,
        FailureReason::Cancelled => StatusCode::CONFLICT,
        FailureReason::Upstream => StatusCode::BAD_GATEWAY,
    }
}

impl From<Failure> for AppError {
    fn from(failure: Failure) -> Self {
        AppError {
            status: failure_status(failure.reason),
            code: failure.reason.as_str().to_string(),
            message: failure.message,
        }
    }
}

// ============ Sessions ============

/// Extract the session id from the `Cookie` header, if present.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

/// Look up the caller's existing session without creating one.
fn find_session(state: &AppState, headers: &HeaderMap) -> Option<Arc<Session>> {
    session_id_from_headers(headers).and_then(|id| state.sessions.get(&id))
}

/// Look up or create the caller's session. Only submissions create sessions.
fn resolve_session(state: &AppState, headers: &HeaderMap) -> (Arc<Session>, bool) {
    state
        .sessions
        .get_or_create(session_id_from_headers(headers).as_deref())
}

/// Attach a `Set-Cookie` header when the session was just created.
fn with_session(response: impl IntoResponse, session: &Session, created: bool) -> Response {
    let mut response = response.into_response();
    if created {
        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            SESSION_COOKIE,
            session.id()
        );
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    response
}

// ============ Pages ============

async fn handle_home(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    Ok(Html(state.pages.home()?))
}

async fn handle_chat_page(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Html<String>, AppError> {
    let transcript = find_session(&state, &headers)
        .map(|session| session.transcript())
        .unwrap_or_default();
    let html = state.pages.chat(&ChatView {
        turns: transcript.turns(),
        ..ChatView::default()
    })?;
    Ok(Html(html))
}

#[derive(Deserialize)]
struct ChatForm {
    #[serde(default)]
    question: String,
}

async fn handle_chat_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ChatForm>,
) -> Result<Response, AppError> {
    let (session, created) = resolve_session(&state, &headers);

    let outcome = state.flows.ask(&session, &form.question).await;
    let (status, notice, error) = match outcome {
        Outcome::Resolved(_) | Outcome::Ignored => (StatusCode::OK, None, None),
        Outcome::Pending => (StatusCode::CONFLICT, Some(BUSY_NOTICE.to_string()), None),
        Outcome::Failed(f) => (failure_status(f.reason), None, Some(f.message)),
    };

    let transcript = session.transcript();
    let html = state.pages.chat(&ChatView {
        turns: transcript.turns(),
        notice,
        error,
    })?;
    Ok(with_session((status, Html(html)), &session, created))
}

async fn handle_debugger_page(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    Ok(Html(state.pages.debugger(&DebuggerView::default())?))
}

#[derive(Deserialize)]
struct ContractForm {
    #[serde(default = "default_mode")]
    mode: String,
    #[serde(default)]
    code: String,
}

fn default_mode() -> String {
    ContractMode::Debug.as_str().to_string()
}

async fn handle_debugger_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ContractForm>,
) -> Result<Response, AppError> {
    let mode: ContractMode = form.mode.parse().map_err(|e| bad_request(format!("{}", e)))?;
    let (session, created) = resolve_session(&state, &headers);

    let mut view = DebuggerView {
        mode,
        ..DebuggerView::default()
    };
    let status = match state.flows.submit_contract(&session, mode, &form.code).await {
        Outcome::Resolved(output) => {
            view.result = Some(ContractResult {
                heading: mode.results_heading(),
                output,
            });
            StatusCode::OK
        }
        Outcome::Ignored => StatusCode::OK,
        Outcome::Pending => {
            view.notice = Some(BUSY_NOTICE.to_string());
            StatusCode::CONFLICT
        }
        Outcome::Failed(f) => {
            view.error = Some(f.message);
            failure_status(f.reason)
        }
    };
    view.code = form.code;

    let html = state.pages.debugger(&view)?;
    Ok(with_session((status, Html(html)), &session, created))
}

// ============ JSON API ============

#[derive(Serialize)]
struct ExamplesResponse {
    examples: Vec<&'static str>,
}

async fn handle_examples() -> Json<ExamplesResponse> {
    Json(ExamplesResponse {
        examples: EXAMPLE_PROMPTS.to_vec(),
    })
}

/// Transcript view returned by `/api/session` and `/api/chat`.
#[derive(Serialize)]
struct SessionResponse {
    /// `null` when the caller has no session yet.
    session_id: Option<String>,
    /// True while a request is in flight for this session.
    pending: bool,
    /// Chronological (user, assistant) turns.
    turns: Vec<Turn>,
}

fn session_response(session: &Session) -> SessionResponse {
    SessionResponse {
        session_id: Some(session.id().to_string()),
        pending: session.is_pending(),
        turns: session.transcript().turns().to_vec(),
    }
}

async fn handle_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<SessionResponse> {
    let body = match find_session(&state, &headers) {
        Some(session) => session_response(&session),
        None => SessionResponse {
            session_id: None,
            pending: false,
            turns: Vec::new(),
        },
    };
    Json(body)
}

#[derive(Serialize)]
struct CancelResponse {
    cancelled: bool,
}

async fn handle_cancel(State(state): State<AppState>, headers: HeaderMap) -> Json<CancelResponse> {
    let cancelled = find_session(&state, &headers)
        .map(|session| session.cancel())
        .unwrap_or(false);
    Json(CancelResponse { cancelled })
}

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    question: String,
}

async fn handle_api_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Response, AppError> {
    let (session, created) = resolve_session(&state, &headers);

    let body = match state.flows.ask(&session, &req.question).await {
        Outcome::Resolved(answer) => serde_json::json!({
            "status": "resolved",
            "response": answer.response,
            "sources": answer.sources,
            "session": session_response(&session),
        }),
        Outcome::Ignored => serde_json::json!({
            "status": "ignored",
            "session": session_response(&session),
        }),
        Outcome::Pending => return Ok(with_session(busy(), &session, created)),
        Outcome::Failed(f) => return Ok(with_session(AppError::from(f), &session, created)),
    };

    Ok(with_session(Json(body), &session, created))
}

#[derive(Deserialize)]
struct ContractRequest {
    mode: String,
    #[serde(default)]
    code: String,
}

async fn handle_api_contract(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ContractRequest>,
) -> Result<Response, AppError> {
    let mode: ContractMode = req.mode.parse().map_err(|e| bad_request(format!("{}", e)))?;
    let (session, created) = resolve_session(&state, &headers);

    let body = match state.flows.submit_contract(&session, mode, &req.code).await {
        Outcome::Resolved(output) => serde_json::json!({
            "status": "resolved",
            "mode": mode,
            "heading": mode.results_heading(),
            "output": output,
        }),
        Outcome::Ignored => serde_json::json!({ "status": "ignored", "mode": mode }),
        Outcome::Pending => return Ok(with_session(busy(), &session, created)),
        Outcome::Failed(f) => return Ok(with_session(AppError::from(f), &session, created)),
    };

    Ok(with_session(Json(body), &session, created))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
