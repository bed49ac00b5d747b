//! JSON HTTP chat server.
//!
//! Serves the same chat engine as `ragchat chat` to web and widget clients.
//! Each client conversation is a server-side [`Session`] keyed by an opaque
//! id; the first `POST /chat` without an id creates one and returns it.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/chat` | Send a message, get the reply and its sources |
//! | `POST` | `/sessions/{id}/clear` | Forget a conversation |
//! | `GET`  | `/stats` | Index summary |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `generation_failed` (502), `index_unavailable` (503), `internal` (500).
//!
//! # Concurrency
//!
//! Every session sits behind its own async mutex, so two requests for the
//! same session are answered one after the other while different sessions
//! proceed in parallel.
//!
//! # Session lifetime
//!
//! Sessions idle longer than `[server].session_ttl_secs` are dropped when a
//! new session is created. At `[server].max_sessions` the least recently
//! used session is evicted to make room.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ragchat_core::chat::Citation;
use ragchat_core::store::VectorIndex;
use ragchat_core::{ChatEngine, RagError, ReplyKind, Session};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Config, ServerConfig};
use crate::engine;
use crate::sqlite_index::{OriginCount, SqliteIndex};

struct SessionEntry {
    session: Arc<Mutex<Session>>,
    last_used: Instant,
}

type SessionMap = HashMap<String, SessionEntry>;

/// How long idle sessions live and how many are kept.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub idle_ttl: Duration,
    pub max_sessions: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

impl SessionLimits {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            idle_ttl: Duration::from_secs(config.session_ttl_secs),
            max_sessions: config.max_sessions.max(1),
        }
    }
}

/// Shared state behind every route handler.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<ChatEngine>,
    index: Arc<SqliteIndex>,
    sessions: Arc<RwLock<SessionMap>>,
    limits: SessionLimits,
}

impl AppState {
    pub fn new(engine: ChatEngine, index: Arc<SqliteIndex>, limits: SessionLimits) -> Self {
        Self {
            engine: Arc::new(engine),
            index,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            limits,
        }
    }

    /// Look up `id`, creating the session if it does not exist yet.
    /// Without an id a fresh one is generated.
    async fn session(&self, id: Option<String>) -> (String, Arc<Mutex<Session>>) {
        let id = id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(&id) {
            entry.last_used = now;
            return (id, entry.session.clone());
        }

        let before = sessions.len();
        let ttl = self.limits.idle_ttl;
        sessions.retain(|_, entry| now.duration_since(entry.last_used) <= ttl);
        while sessions.len() >= self.limits.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    sessions.remove(&key);
                }
                None => break,
            }
        }
        if sessions.len() < before {
            debug!(evicted = before - sessions.len(), "dropped sessions");
        }

        let session = Arc::new(Mutex::new(Session::default()));
        sessions.insert(
            id.clone(),
            SessionEntry {
                session: session.clone(),
                last_used: now,
            },
        );
        (id, session)
    }
}

/// Build the router. Exposed separately from [`run_server`] for tests.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/chat", post(handle_chat))
        .route("/sessions/{id}/clear", post(handle_clear))
        .route("/stats", get(handle_stats))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let index = engine::open_index(config).await?;
    if !index.reload_ready().await? {
        warn!(
            index = %index.path().display(),
            "index not initialized; /chat returns index_unavailable until `ragchat init` runs"
        );
    }
    let chat = engine::build_engine(config, index.clone())?;
    let limits = SessionLimits::from_config(&config.server);
    let app = router(AppState::new(chat, index, limits));

    let bind_addr = &config.server.bind;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(bind = %bind_addr, "server started");
    println!("ragchat listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that converts into a JSON error response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: format!("{:#}", err),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let (status, code) = match &err {
            RagError::IndexUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "index_unavailable"),
            RagError::GenerationFailure(_) => (StatusCode::BAD_GATEWAY, "generation_failed"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
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

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    session_id: Option<String>,
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    session_id: String,
    reply: String,
    sources: Vec<Citation>,
    kind: ReplyKind,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let (session_id, session) = state.session(req.session_id).await;
    let mut session = session.lock().await;
    let reply = state.engine.respond(&mut session, message).await?;

    Ok(Json(ChatResponse {
        session_id,
        reply: reply.answer,
        sources: reply.citations,
        kind: reply.kind,
    }))
}

// ============ POST /sessions/{id}/clear ============

#[derive(Serialize)]
struct ClearResponse {
    session_id: String,
    cleared: bool,
}

async fn handle_clear(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ClearResponse>, AppError> {
    let session = state
        .sessions
        .read()
        .await
        .get(&id)
        .map(|entry| entry.session.clone())
        .ok_or_else(|| not_found(format!("no session with id: {}", id)))?;

    state.engine.clear(&mut *session.lock().await);
    Ok(Json(ClearResponse {
        session_id: id,
        cleared: true,
    }))
}

// ============ GET /stats ============

#[derive(Serialize)]
struct StatsResponse {
    ready: bool,
    passages: usize,
    sources: Vec<OriginCount>,
    last_indexed: Option<i64>,
    sessions: usize,
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let sessions = state.sessions.read().await.len();
    let index = &state.index;
    if !index.reload_ready().await.map_err(internal)? {
        return Ok(Json(StatsResponse {
            ready: false,
            passages: 0,
            sources: Vec::new(),
            last_indexed: None,
            sessions,
        }));
    }

    Ok(Json(StatsResponse {
        ready: true,
        passages: index.count().await.map_err(internal)?,
        sources: index.origin_counts().await.map_err(internal)?,
        last_indexed: index.last_indexed().await.map_err(internal)?,
        sessions,
    }))
}
