// crates/freefall-server/src/server.rs
// ============================================================================
// Module: Freefall HTTP Server
// Description: Axum routes for upload, health, and service index.
// Purpose: Run the ingestion pipeline behind a size-limited HTTP surface.
// Dependencies: freefall-core, freefall-config, axum, tokio
// ============================================================================

//! ## Overview
//! `POST /freefall` takes a raw delimited body, runs it through the
//! [`IngestPipeline`] on the blocking pool, and answers with the batch
//! summary. If the caller disconnects, the handler future is dropped and a
//! guard raises the pipeline's [`CancellationFlag`] so the worker stops at
//! the next record. `GET /health` probes storage reachability and `GET /`
//! lists the endpoints.
//!
//! Store construction may block on network I/O; call
//! [`FreefallServer::from_config`] off the async executor.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::extract::DefaultBodyLimit;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use freefall_config::AuditConfig;
use freefall_config::AuditSinkKind;
use freefall_config::FreefallConfig;
use freefall_config::StorageBackend;
use freefall_config::StorageConfig;
use freefall_core::BatchOutcome;
use freefall_core::CancellationFlag;
use freefall_core::InMemoryReadingStore;
use freefall_core::IngestError;
use freefall_core::IngestErrorClass;
use freefall_core::IngestPipeline;
use freefall_core::ReadingStore;
use freefall_core::SharedReadingStore;
use freefall_store_postgres::PostgresReadingStore;
use freefall_store_sqlite::SqliteReadingStore;
use serde::Serialize;
use tokio::net::TcpListener;

use crate::audit::AuditSink;
use crate::audit::FileAuditSink;
use crate::audit::HealthAuditEvent;
use crate::audit::IngestAuditEvent;
use crate::audit::IngestAuditEventParams;
use crate::audit::NoopAuditSink;
use crate::audit::StartupAuditEvent;
use crate::audit::StderrAuditSink;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Service name reported by the index route.
const SERVICE_NAME: &str = "freefall";
/// Endpoints listed by the index route.
const ENDPOINTS: [&str; 3] = ["GET /", "GET /health", "POST /freefall"];

// ============================================================================
// SECTION: Server
// ============================================================================

/// Freefall HTTP server instance.
pub struct FreefallServer {
    /// Validated configuration.
    config: FreefallConfig,
    /// Shared handler state.
    state: Arc<ServerState>,
}

impl FreefallServer {
    /// Builds a server from configuration, connecting storage and preparing
    /// the schema.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the config is invalid, storage cannot be
    /// reached, or the schema cannot be created.
    pub fn from_config(config: FreefallConfig) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let store = build_store(&config.storage)?;
        let audit = build_audit_sink(&config.audit)?;
        Self::with_parts(config, store, audit)
    }

    /// Builds a server around an existing store and audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the config is invalid or the schema
    /// cannot be created.
    pub fn with_parts(
        config: FreefallConfig,
        store: SharedReadingStore,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        store.ensure_schema().map_err(|err| ServerError::Init(err.to_string()))?;
        let state = Arc::new(ServerState {
            pipeline: IngestPipeline::new(store, config.storage.commit_policy),
            audit,
            max_body_bytes: config.server.max_body_bytes,
        });
        Ok(Self {
            config,
            state,
        })
    }

    /// Returns the axum router for this server.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(handle_index))
            .route("/health", get(handle_health))
            .route("/freefall", post(handle_ingest))
            .layer(DefaultBodyLimit::max(self.state.max_body_bytes))
            .with_state(Arc::clone(&self.state))
    }

    /// Binds the configured address and serves until the process exits.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let addr =
            self.config.server.bind_addr().map_err(|err| ServerError::Config(err.to_string()))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| ServerError::Transport(format!("http bind failed: {err}")))?;
        self.serve_on(listener, std::future::pending()).await
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when serving fails.
    pub async fn serve_on(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let local = listener
            .local_addr()
            .map_err(|err| ServerError::Transport(format!("http local addr failed: {err}")))?;
        self.state.audit.record_startup(&StartupAuditEvent::new(
            local.to_string(),
            self.config.storage.backend.as_str(),
            self.config.storage.commit_policy.as_str(),
            self.config.server.max_body_bytes,
        ));
        let app = self.router();
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|err| ServerError::Transport(format!("http server failed: {err}")))
    }
}

/// Builds the reading store selected by configuration.
///
/// # Errors
///
/// Returns [`ServerError`] when the backend cannot be initialized.
pub fn build_store(config: &StorageConfig) -> Result<SharedReadingStore, ServerError> {
    let store = match config.backend {
        StorageBackend::Postgres => {
            let store = PostgresReadingStore::new(&config.postgres)
                .map_err(|err| ServerError::Init(err.to_string()))?;
            SharedReadingStore::from_store(store)
        }
        StorageBackend::Sqlite => {
            let sqlite = config.sqlite.clone().ok_or_else(|| {
                ServerError::Config("sqlite backend requires storage.sqlite".to_string())
            })?;
            let store =
                SqliteReadingStore::new(sqlite).map_err(|err| ServerError::Init(err.to_string()))?;
            SharedReadingStore::from_store(store)
        }
        StorageBackend::Memory => SharedReadingStore::from_store(InMemoryReadingStore::new()),
    };
    Ok(store)
}

/// Builds the audit sink selected by configuration.
///
/// # Errors
///
/// Returns [`ServerError`] when the audit file cannot be opened.
pub fn build_audit_sink(config: &AuditConfig) -> Result<Arc<dyn AuditSink>, ServerError> {
    let sink: Arc<dyn AuditSink> = match config.sink {
        AuditSinkKind::Stderr => Arc::new(StderrAuditSink),
        AuditSinkKind::None => Arc::new(NoopAuditSink),
        AuditSinkKind::File => {
            let path = config.path.as_deref().ok_or_else(|| {
                ServerError::Config("file audit sink requires audit.path".to_string())
            })?;
            let sink = FileAuditSink::new(Path::new(path))
                .map_err(|err| ServerError::Init(format!("audit log open failed: {err}")))?;
            Arc::new(sink)
        }
    };
    Ok(sink)
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Shared server state for HTTP handlers.
struct ServerState {
    /// Ingestion pipeline bound to the configured store.
    pipeline: IngestPipeline,
    /// Audit sink for request events.
    audit: Arc<dyn AuditSink>,
    /// Maximum allowed request body size.
    max_body_bytes: usize,
}

/// Service index body.
#[derive(Serialize)]
struct IndexBody {
    /// Service name.
    name: &'static str,
    /// Crate version.
    version: &'static str,
    /// Available endpoints.
    endpoints: [&'static str; 3],
}

/// Successful upload body.
#[derive(Serialize)]
struct IngestSuccessBody {
    /// Always `success`.
    status: &'static str,
    /// Rows persisted.
    rows_inserted: usize,
    /// Lines rejected before storage.
    rows_skipped: usize,
    /// Rows that failed at insert time.
    rows_with_errors: usize,
    /// Line numbers that failed at insert time.
    failed_lines: Vec<usize>,
}

/// Request-fatal error body.
#[derive(Serialize)]
struct ErrorBody {
    /// Always `error`.
    status: &'static str,
    /// Error message.
    error: String,
}

/// Health report body.
#[derive(Serialize)]
struct HealthBody {
    /// `ok` or `degraded`.
    status: &'static str,
    /// Present when storage answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'static str>,
    /// Present when storage did not answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    database_error: Option<String>,
}

/// Raises a cancellation flag when dropped with the handler future.
struct CancelOnDrop(CancellationFlag);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Handles `GET /`.
async fn handle_index() -> Json<IndexBody> {
    Json(IndexBody {
        name: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        endpoints: ENDPOINTS,
    })
}

/// Handles `GET /health`.
async fn handle_health(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    let store = state.pipeline.store().clone();
    let probe = tokio::task::spawn_blocking(move || store.reachable())
        .await
        .map_err(|err| format!("health probe failed: {err}"))
        .and_then(|result| result.map_err(|err| err.to_string()));
    let error = probe.err();
    state.audit.record_health(&HealthAuditEvent::new(Some(peer.ip().to_string()), error.clone()));
    match error {
        None => (
            StatusCode::OK,
            Json(HealthBody {
                status: "ok",
                database: Some("connected"),
                database_error: None,
            }),
        )
            .into_response(),
        Some(message) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthBody {
                status: "degraded",
                database: None,
                database_error: Some(message),
            }),
        )
            .into_response(),
    }
}

/// Handles `POST /freefall`.
async fn handle_ingest(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let started = Instant::now();
    let peer_ip = Some(peer.ip().to_string());
    let bytes = match body {
        Ok(bytes) if bytes.len() <= state.max_body_bytes => bytes,
        Ok(_) => {
            return reject_body(&state, peer_ip, started, StatusCode::PAYLOAD_TOO_LARGE);
        }
        Err(rejection) => return reject_body(&state, peer_ip, started, rejection.status()),
    };

    let cancel = CancellationFlag::new();
    let _guard = CancelOnDrop(cancel.clone());
    let worker_state = Arc::clone(&state);
    let worker_peer = peer_ip.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let result = worker_state.pipeline.ingest(&bytes, &cancel);
        let reply = IngestReply::from_result(&result);
        worker_state.audit.record_ingest(&IngestAuditEvent::new(IngestAuditEventParams {
            peer_ip: worker_peer,
            status: reply.status.as_u16(),
            outcome: reply.outcome,
            error: reply.error.clone(),
            request_bytes: bytes.len(),
            duration_ms: started.elapsed().as_millis(),
            batch: result.as_ref().ok(),
        }));
        reply
    })
    .await;

    match joined {
        Ok(reply) => reply.into_response(),
        Err(err) => {
            let reply = IngestReply::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                format!("ingestion worker failed: {err}"),
            );
            state.audit.record_ingest(&IngestAuditEvent::new(IngestAuditEventParams {
                peer_ip,
                status: reply.status.as_u16(),
                outcome: reply.outcome,
                error: reply.error.clone(),
                request_bytes: 0,
                duration_ms: started.elapsed().as_millis(),
                batch: None,
            }));
            reply.into_response()
        }
    }
}

/// Answers and audits a body that was refused before ingestion.
fn reject_body(
    state: &ServerState,
    peer_ip: Option<String>,
    started: Instant,
    status: StatusCode,
) -> Response {
    let reply = if status == StatusCode::PAYLOAD_TOO_LARGE {
        IngestReply::error(
            status,
            "too_large",
            format!("request body exceeds {} bytes", state.max_body_bytes),
        )
    } else {
        IngestReply::error(status, "client_error", "request body could not be read".to_string())
    };
    state.audit.record_ingest(&IngestAuditEvent::new(IngestAuditEventParams {
        peer_ip,
        status: reply.status.as_u16(),
        outcome: reply.outcome,
        error: reply.error.clone(),
        request_bytes: 0,
        duration_ms: started.elapsed().as_millis(),
        batch: None,
    }));
    reply.into_response()
}

// ============================================================================
// SECTION: Replies
// ============================================================================

/// Upload reply computed on the worker.
struct IngestReply {
    /// Response status.
    status: StatusCode,
    /// Audit outcome label.
    outcome: &'static str,
    /// Error message for request-fatal failures.
    error: Option<String>,
    /// Success body when the batch completed.
    success: Option<IngestSuccessBody>,
}

impl IngestReply {
    /// Maps a pipeline result to a reply.
    fn from_result(result: &Result<BatchOutcome, IngestError>) -> Self {
        match result {
            Ok(outcome) => Self {
                status: StatusCode::OK,
                outcome: "success",
                error: None,
                success: Some(IngestSuccessBody {
                    status: "success",
                    rows_inserted: outcome.rows_inserted,
                    rows_skipped: outcome.rows_skipped(),
                    rows_with_errors: outcome.rows_with_errors,
                    failed_lines: outcome.failed_lines.clone(),
                }),
            },
            Err(err) => match err.class() {
                IngestErrorClass::Client => {
                    Self::error(StatusCode::BAD_REQUEST, "client_error", err.to_string())
                }
                IngestErrorClass::Server => {
                    Self::error(StatusCode::INTERNAL_SERVER_ERROR, "server_error", err.to_string())
                }
                IngestErrorClass::Cancelled => {
                    Self::error(StatusCode::INTERNAL_SERVER_ERROR, "cancelled", err.to_string())
                }
            },
        }
    }

    /// Builds an error reply.
    const fn error(status: StatusCode, outcome: &'static str, message: String) -> Self {
        Self {
            status,
            outcome,
            error: Some(message),
            success: None,
        }
    }
}

impl IntoResponse for IngestReply {
    fn into_response(self) -> Response {
        match self.success {
            Some(body) => (self.status, Json(body)).into_response(),
            None => (
                self.status,
                Json(ErrorBody {
                    status: "error",
                    error: self.error.unwrap_or_default(),
                }),
            )
                .into_response(),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Freefall server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================
