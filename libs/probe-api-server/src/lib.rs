//! Operator HTTP API for the flow probe.
//!
//! Every handler calls straight into the synchronous staging engine; each
//! call is short and in-memory, so nothing is offloaded to a blocking pool.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use tokio_util::sync::CancellationToken;

use probe_engine::{StagePorts, StageRegistry};

mod http;
pub mod models;

/// Shared state of the API: the stage registry and the in-process ports of
/// each stage, keyed by stage id.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<StageRegistry>,
    pub ports: Arc<HashMap<String, StagePorts>>,
}

impl AppState {
    pub fn new(registry: Arc<StageRegistry>, ports: HashMap<String, StagePorts>) -> Self {
        Self {
            registry,
            ports: Arc::new(ports),
        }
    }
}

/// Router with every operator endpoint mounted.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/api/stages", get(http::handle_list_stages))
        .route("/api/stages/{stage}", get(http::handle_get_stage))
        .route("/api/stages/{stage}/records", get(http::handle_list_records))
        .route("/api/stages/{stage}/records/{record}", get(http::handle_get_record))
        .route(
            "/api/stages/{stage}/records/{record}/content",
            get(http::handle_record_content),
        )
        .route("/api/stages/{stage}/accept", post(http::handle_accept))
        .route("/api/stages/{stage}/route", post(http::handle_route))
        .route("/api/stages/{stage}/action", post(http::handle_action))
        .route(
            "/api/stages/{stage}/snapshot",
            get(http::handle_export_snapshot).post(http::handle_import_snapshot),
        )
        .route("/api/stages/{stage}/editor", get(http::handle_get_editor))
        .route("/api/stages/{stage}/editor/attribute", post(http::handle_editor_attribute))
        .route("/api/stages/{stage}/editor/text", post(http::handle_editor_text))
        .route("/api/stages/{stage}/editor/text-base64", post(http::handle_editor_text_base64))
        .route("/api/stages/{stage}/editor/content", put(http::handle_editor_content))
        .route("/api/stages/{stage}/editor/reset", post(http::handle_editor_reset))
        .route("/api/stages/{stage}/editor/commit", post(http::handle_editor_commit))
        .route("/api/stages/{stage}/upstream", post(http::handle_upstream_push))
        .route(
            "/api/stages/{stage}/delivered/{relationship}",
            get(http::handle_delivered),
        )
        .route(
            "/api/alerts",
            get(http::handle_list_alerts).delete(http::handle_clear_alerts),
        )
        .with_state(state)
}

/// Serve the operator API until `shutdown` is cancelled.
pub async fn run(port: u16, state: AppState, shutdown: CancellationToken) -> Result<(), String> {
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .map_err(|e| format!("bind api :{port}: {e}"))?;
    tracing::info!(port, "api server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| format!("axum serve: {e}"))?;

    Ok(())
}
