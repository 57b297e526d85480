//! HTTP webhook endpoint for SCM hook pings.
//!
//! Hooks call `POST /api/scm-ping` with parameters in the query string
//! and/or an `application/x-www-form-urlencoded` body (older CVS loginfo
//! scripts use GET; both are accepted). The response body carries the
//! per-issue status lines for the hook to relay back to the committer.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{RawQuery, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use scmbridge_ingest::RawParams;
use scmbridge_store::SqliteStore;
use scmbridge_types::ScmBridgeError;

pub fn router(store: Arc<SqliteStore>) -> Router {
    Router::new()
        .route("/healthz", get(handle_health))
        .route("/api/scm-ping", post(handle_scm_ping).get(handle_scm_ping))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

/// Serve the webhook endpoint, blocking until the listener fails.
pub async fn run_server(store: Arc<SqliteStore>, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, "scmbridge listening");
    axum::serve(listener, router(store)).await?;
    Ok(())
}

async fn handle_health() -> &'static str {
    "ok\n"
}

async fn handle_scm_ping(
    State(store): State<Arc<SqliteStore>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut params = RawParams::parse(query.as_deref().unwrap_or(""));
    if is_form_urlencoded(&headers) && !body.is_empty() {
        params.extend_from(&String::from_utf8_lossy(&body));
    }

    let result = scmbridge_ingest::ingest_params(
        &params,
        store.as_ref(),
        store.as_ref(),
        store.as_ref(),
        store.as_ref(),
    );

    match result {
        Ok(outcome) => {
            info!(
                changeset = %outcome.changeset,
                created = outcome.created,
                files = outcome.files_added,
                issues = outcome.issues_linked,
                "scm ping ingested"
            );
            let mut text = outcome.status_lines.join("\n");
            if !text.is_empty() {
                text.push('\n');
            }
            (StatusCode::OK, text).into_response()
        }
        Err(e) => error_response(e),
    }
}

fn error_response(e: ScmBridgeError) -> Response {
    let status = match &e {
        ScmBridgeError::Validation(_) | ScmBridgeError::BranchRejected(_) => {
            StatusCode::BAD_REQUEST
        }
        ScmBridgeError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(%status, error = %e, "scm ping failed");
    (status, format!("{e}\n")).into_response()
}

fn is_form_urlencoded(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

// ── Tests ─────────────────────────────────────────────────────────────────
