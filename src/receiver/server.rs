//! HTTP receiver for HSI exports from the companion app.
//!
//! `POST /v1/hsi/import` validates a static bearer token, the schema
//! headers, and the payload, then writes the export through the
//! configured output writer. Duplicate submissions (same idempotency
//! key) still succeed and are flagged in the receipt.

use std::collections::HashMap;
use std::future::IntoFuture;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use rand::RngCore;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::MockError;
use crate::transport::SHUTDOWN_GRACE;

use super::export::{ExportReceipt, HsiExport, EXPORT_SCHEMA};
use super::writer::{ExportWriter, OutputFormat};

/// Maximum accepted request body (raw or decompressed)
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
/// Per-request handling deadline
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Receiver server configuration
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub host: String,
    pub port: u16,
    pub token: String,
    pub format: OutputFormat,
    pub accept_gzip: bool,
}

/// Session counters
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Stats {
    pub received: u64,
    pub duplicates: u64,
    pub errors: u64,
}

struct ReceiverState {
    config: ReceiverConfig,
    writer: Box<dyn ExportWriter>,
    seen: RwLock<HashMap<String, DateTime<Utc>>>,
    stats: Mutex<Stats>,
}

impl ReceiverState {
    fn authorized(&self, headers: &HeaderMap) -> bool {
        let Some(value) = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
        else {
            return false;
        };

        let mut parts = value.splitn(2, ' ');
        let scheme = parts.next().unwrap_or_default();
        let token = parts.next().unwrap_or_default();
        scheme.eq_ignore_ascii_case("bearer") && token == self.config.token
    }

    fn count_error(&self) {
        self.stats.lock().unwrap().errors += 1;
    }

    fn key_seen(&self, key: &str) -> bool {
        self.seen.read().unwrap().contains_key(key)
    }

    fn mark_key(&self, key: &str) {
        // No eviction: the set lives for the process lifetime.
        self.seen
            .write()
            .unwrap()
            .insert(key.to_string(), Utc::now());
    }

    fn read_body(&self, headers: &HeaderMap, body: &Bytes) -> Result<Vec<u8>, String> {
        let is_gzip = headers
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("gzip"))
            .unwrap_or(false);

        if self.config.accept_gzip && is_gzip {
            let mut decompressed = Vec::new();
            let mut limited = GzDecoder::new(body.as_ref()).take(MAX_BODY_BYTES as u64 + 1);
            limited
                .read_to_end(&mut decompressed)
                .map_err(|e| format!("failed to decompress gzip: {e}"))?;
            if decompressed.len() > MAX_BODY_BYTES {
                return Err("request body too large".to_string());
            }
            Ok(decompressed)
        } else {
            Ok(body.to_vec())
        }
    }
}

/// Blocking HTTP server for HSI export ingestion
pub struct ReceiverServer {
    state: Arc<ReceiverState>,
    bound_addr: RwLock<Option<SocketAddr>>,
}

impl ReceiverServer {
    pub fn new(config: ReceiverConfig, writer: Box<dyn ExportWriter>) -> Self {
        ReceiverServer {
            state: Arc::new(ReceiverState {
                config,
                writer,
                seen: RwLock::new(HashMap::new()),
                stats: Mutex::new(Stats::default()),
            }),
            bound_addr: RwLock::new(None),
        }
    }

    /// The axum application serving all receiver routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route(
                "/v1/hsi/import",
                post(handle_import).fallback(handle_method_not_allowed),
            )
            .route("/health", get(handle_health))
            .route("/", get(handle_root))
            .layer(axum::middleware::from_fn(request_timeout))
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .with_state(self.state.clone())
    }

    /// Bind the listener and serve in the background until cancelled.
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), MockError> {
        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| MockError::Bind {
                addr: addr.clone(),
                source,
            })?;
        *self.bound_addr.write().unwrap() = listener.local_addr().ok();

        let app = self.router();
        info!(endpoint = %self.address(), "receiver listening");

        tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(cancel.clone().cancelled_owned())
                .into_future();
            tokio::select! {
                result = serve => {
                    if let Err(error) = result {
                        warn!(%error, "receiver terminated");
                    }
                }
                _ = async {
                    cancel.cancelled().await;
                    tokio::time::sleep(SHUTDOWN_GRACE).await;
                } => {
                    debug!("receiver shutdown grace expired");
                }
            }
        });

        Ok(())
    }

    pub fn stats(&self) -> Stats {
        *self.state.stats.lock().unwrap()
    }

    pub fn address(&self) -> String {
        match *self.bound_addr.read().unwrap() {
            Some(addr) => format!("http://{addr}"),
            None => format!(
                "http://{}:{}",
                self.state.config.host, self.state.config.port
            ),
        }
    }
}

/// Generate a bearer token: `sh_` + 32 hex chars from the OS RNG.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("sh_{hex}")
}

async fn request_timeout(request: Request, next: Next) -> Response {
    match tokio::time::timeout(REQUEST_TIMEOUT, next.run(request)).await {
        Ok(response) => response,
        Err(_) => error_response(StatusCode::REQUEST_TIMEOUT, "request timed out"),
    }
}

async fn handle_root() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "synheart-receiver",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoint": "/v1/hsi/import",
    }))
}

async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn handle_method_not_allowed() -> Response {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}

async fn handle_import(
    State(state): State<Arc<ReceiverState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !state.authorized(&headers) {
        state.count_error();
        return error_response(
            StatusCode::UNAUTHORIZED,
            "invalid or missing authorization token",
        );
    }

    if let Err(message) = validate_headers(&headers) {
        state.count_error();
        return error_response(StatusCode::BAD_REQUEST, &message);
    }

    let idempotency_key = headers
        .get("idempotency-key")
        .or_else(|| headers.get("x-synheart-export-id"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let duplicate = state.key_seen(&idempotency_key);

    let raw = match state.read_body(&headers, &body) {
        Ok(raw) => raw,
        Err(message) => {
            state.count_error();
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("failed to read request body: {message}"),
            );
        }
    };

    let export: HsiExport = match serde_json::from_slice(&raw) {
        Ok(export) => export,
        Err(e) => {
            state.count_error();
            return error_response(StatusCode::BAD_REQUEST, &format!("invalid JSON: {e}"));
        }
    };

    if let Err(violation) = export.validate() {
        state.count_error();
        return error_response(
            StatusCode::BAD_REQUEST,
            &format!("schema validation failed: {violation}"),
        );
    }

    state.mark_key(&idempotency_key);

    if let Err(error) = state.writer.write(&export) {
        state.count_error();
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("failed to write export: {error}"),
        );
    }

    {
        let mut stats = state.stats.lock().unwrap();
        stats.received += 1;
        if duplicate {
            stats.duplicates += 1;
        }
    }

    let receipt = ExportReceipt::new(&export, duplicate);
    debug!(
        export_id = %receipt.export_id,
        duplicate,
        summaries = receipt.summary_count,
        "export received"
    );

    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "ok", "receipt": receipt })),
    )
        .into_response()
}

fn validate_headers(headers: &HeaderMap) -> Result<(), String> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with("application/json") {
        return Err("Content-Type must be application/json".to_string());
    }

    if let Some(schema) = headers
        .get("x-synheart-schema")
        .and_then(|v| v.to_str().ok())
    {
        if !schema.is_empty() && schema != EXPORT_SCHEMA {
            return Err(format!("unsupported schema version: {schema}"));
        }
    }

    let export_id = headers
        .get("x-synheart-export-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if export_id.is_empty() {
        return Err("X-Synheart-Export-Id header is required".to_string());
    }

    Ok(())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
