use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use base64::Engine;

use probe_api::Alert;
use probe_engine::{Navigation, StageError, StagePorts, StageSummary, StagingQueue};

use super::AppState;
use crate::models::{
    AcceptRequest, ActionResponse, AttributeRequest, EditorView, ErrorResponse, ImportResponse,
    InstructionRequest, PullCounterResponse, RecordDetail, RecordSummary, RouteResponse,
    TextRequest, UpstreamRequest, UpstreamResponse,
};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: message.into() }))
}

fn stage(state: &AppState, id: &str) -> Result<Arc<StagingQueue>, ApiError> {
    state
        .registry
        .require(id)
        .map_err(|e| api_error(StatusCode::NOT_FOUND, e.to_string()))
}

fn ports<'a>(state: &'a AppState, id: &str) -> Result<&'a StagePorts, ApiError> {
    state.ports.get(id).ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            StageError::StageNotFound(id.to_string()).to_string(),
        )
    })
}

fn record_not_found(record: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, format!("record '{record}' not found"))
}

// ═══════════════════════════════════════════════════════════════
//  Stages and records
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_list_stages(State(state): State<AppState>) -> Json<Vec<StageSummary>> {
    Json(state.registry.stages().iter().map(|s| s.summary()).collect())
}

pub(crate) async fn handle_get_stage(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StageSummary>, ApiError> {
    Ok(Json(stage(&state, &id)?.summary()))
}

pub(crate) async fn handle_list_records(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<RecordSummary>>, ApiError> {
    let stage = stage(&state, &id)?;
    Ok(Json(stage.records().iter().map(RecordSummary::from).collect()))
}

pub(crate) async fn handle_get_record(
    State(state): State<AppState>,
    Path((id, record)): Path<(String, String)>,
) -> Result<Json<RecordDetail>, ApiError> {
    let stage = stage(&state, &id)?;
    let found = stage.lookup_str(&record).ok_or_else(|| record_not_found(&record))?;
    Ok(Json(RecordDetail::from(&found)))
}

/// Raw payload, typed by the record's `mime.type` attribute.
pub(crate) async fn handle_record_content(
    State(state): State<AppState>,
    Path((id, record)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let stage = stage(&state, &id)?;
    let found = stage.lookup_str(&record).ok_or_else(|| record_not_found(&record))?;
    let content_type = found
        .mime_type()
        .and_then(|m| HeaderValue::from_str(m).ok())
        .unwrap_or(HeaderValue::from_static("text/plain"));
    let body = found.payload().map(<[u8]>::to_vec).unwrap_or_default();
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

// ═══════════════════════════════════════════════════════════════
//  Operator instructions
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_accept(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AcceptRequest>,
) -> Result<Json<PullCounterResponse>, ApiError> {
    let stage = stage(&state, &id)?;
    Ok(Json(PullCounterResponse {
        pull_counter: stage.accept(req.count),
    }))
}

pub(crate) async fn handle_route(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<InstructionRequest>,
) -> Result<Json<RouteResponse>, ApiError> {
    let stage = stage(&state, &id)?;
    Ok(Json(RouteResponse {
        routed: stage.route_command(&req.value),
    }))
}

pub(crate) async fn handle_action(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<InstructionRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    let stage = stage(&state, &id)?;
    let location = stage.dispatch_command(&req.value).map(|nav| match nav {
        Navigation::Editor { stage } => format!("/api/stages/{stage}/editor"),
    });
    Ok(Json(ActionResponse { location }))
}

// ═══════════════════════════════════════════════════════════════
//  Snapshots
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_export_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let stage = stage(&state, &id)?;
    let bytes = stage
        .export_snapshot()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{id}-snapshot.json\""))
        .unwrap_or(HeaderValue::from_static("attachment"));
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// An empty body is ignored. A document that does not decode admits
/// nothing and answers 400.
pub(crate) async fn handle_import_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ImportResponse>, ApiError> {
    let stage = stage(&state, &id)?;
    if body.is_empty() {
        return Ok(Json(ImportResponse { admitted: 0 }));
    }
    match stage.import_snapshot(&body) {
        Ok(admitted) => Ok(Json(ImportResponse { admitted })),
        Err(e @ StageError::Snapshot(_)) => {
            tracing::warn!(stage = %id, error = %e, "snapshot import rejected");
            Err(api_error(StatusCode::BAD_REQUEST, e.to_string()))
        }
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Draft editor
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_get_editor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EditorView>, ApiError> {
    let stage = stage(&state, &id)?;
    Ok(Json(EditorView::from(&stage.editor())))
}

pub(crate) async fn handle_editor_attribute(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AttributeRequest>,
) -> Result<Json<EditorView>, ApiError> {
    let stage = stage(&state, &id)?;
    if req.name.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "attribute name is empty"));
    }
    Ok(Json(stage.with_editor(|draft| {
        draft.set_attribute(req.name, req.value);
        EditorView::from(&*draft)
    })))
}

pub(crate) async fn handle_editor_text(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TextRequest>,
) -> Result<Json<EditorView>, ApiError> {
    let stage = stage(&state, &id)?;
    Ok(Json(stage.with_editor(|draft| {
        draft.set_text(&req.text);
        EditorView::from(&*draft)
    })))
}

pub(crate) async fn handle_editor_text_base64(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TextRequest>,
) -> Result<Json<EditorView>, ApiError> {
    let stage = stage(&state, &id)?;
    stage
        .with_editor(|draft| {
            draft
                .set_text_base64(&req.text)
                .map(|()| EditorView::from(&*draft))
        })
        .map(Json)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))
}

pub(crate) async fn handle_editor_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<EditorView>, ApiError> {
    let stage = stage(&state, &id)?;
    Ok(Json(stage.with_editor(|draft| {
        draft.set_content(body.to_vec());
        EditorView::from(&*draft)
    })))
}

pub(crate) async fn handle_editor_reset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EditorView>, ApiError> {
    let stage = stage(&state, &id)?;
    Ok(Json(stage.with_editor(|draft| {
        draft.reset();
        EditorView::from(&*draft)
    })))
}

pub(crate) async fn handle_editor_commit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<RecordDetail>), ApiError> {
    let stage = stage(&state, &id)?;
    match stage.commit_draft() {
        Ok(record) => Ok((StatusCode::CREATED, Json(RecordDetail::from(&record)))),
        Err(e) if e.is_admission_rejected() => Err(api_error(StatusCode::CONFLICT, e.to_string())),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

// ═══════════════════════════════════════════════════════════════
//  In-process ports
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_upstream_push(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpstreamRequest>,
) -> Result<Json<UpstreamResponse>, ApiError> {
    let ports = ports(&state, &id)?;
    let payload = req
        .content
        .map(|text| base64::engine::general_purpose::STANDARD.decode(text.trim()))
        .transpose()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("content is not valid base64: {e}")))?;
    let upstream_id = ports.upstream.push(req.attributes, payload);
    tracing::debug!(stage = %id, upstream_id, "queued upstream record");
    Ok(Json(UpstreamResponse {
        upstream_id,
        queued: ports.upstream.len(),
    }))
}

pub(crate) async fn handle_delivered(
    State(state): State<AppState>,
    Path((id, relationship)): Path<(String, String)>,
) -> Result<Json<Vec<RecordDetail>>, ApiError> {
    let ports = ports(&state, &id)?;
    let delivered = ports.downstream.delivered(&relationship).ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            StageError::UnknownRelationship(relationship.clone()).to_string(),
        )
    })?;
    Ok(Json(delivered.iter().map(RecordDetail::from).collect()))
}

// ═══════════════════════════════════════════════════════════════
//  Alerts
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_list_alerts(State(state): State<AppState>) -> Json<Vec<Alert>> {
    Json(state.registry.alerts().list())
}

pub(crate) async fn handle_clear_alerts(State(state): State<AppState>) -> StatusCode {
    state.registry.alerts().clear();
    StatusCode::NO_CONTENT
}
