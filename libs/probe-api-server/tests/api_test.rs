//! Integration tests for the operator API.
//!
//! Requests go through the router in-process via tower's `oneshot`, no
//! TCP listener involved.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use tower::ServiceExt; // for oneshot()

use probe_api::Attributes;
use probe_api_server::models::{
    ActionResponse, EditorView, ImportResponse, PullCounterResponse, RecordDetail, RecordSummary,
    RouteResponse, UpstreamResponse,
};
use probe_api_server::{AppState, build_app};
use probe_engine::{StageConfig, StagePorts, StageRegistry, StagingQueue, trigger};

struct Fixture {
    state: AppState,
    stage: Arc<StagingQueue>,
}

impl Fixture {
    fn new(budget: u64) -> Self {
        let registry = Arc::new(StageRegistry::default());
        let stage = registry.register(
            StageConfig::new("probe-1", budget).with_relationships(["Outgoing", "Failure"]),
        );
        let mut ports = HashMap::new();
        ports.insert(stage.id().to_string(), StagePorts::for_stage(&stage, 10));
        Self {
            state: AppState::new(registry, ports),
            stage,
        }
    }

    fn app(&self) -> Router {
        build_app(self.state.clone())
    }

    fn ports(&self) -> &StagePorts {
        &self.state.ports["probe-1"]
    }

    fn hold(&self, attributes: &[(&str, &str)], payload: &[u8]) -> u64 {
        let attributes: Attributes = attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let record = self.stage.ingest(0, attributes, Some(payload.to_vec()));
        let id = record.id().get();
        self.stage.admit(record).unwrap();
        id
    }
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

fn raw(method: &str, uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn lists_stages() {
    let fx = Fixture::new(1024);
    let (status, body) = send(fx.app(), get("/api/stages")).await;
    assert_eq!(status, StatusCode::OK);

    let stages: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(stages[0]["id"], "probe-1");
    assert_eq!(stages[0]["memory_budget"], 1024);
    assert_eq!(stages[0]["relationships"], serde_json::json!(["Failure", "Outgoing"]));
}

#[tokio::test]
async fn unknown_stage_is_404() {
    let fx = Fixture::new(1024);
    let (status, _) = send(fx.app(), get("/api/stages/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(fx.app(), post_json("/api/stages/nope/accept", r#"{"count": 1}"#)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn record_list_and_detail() {
    let fx = Fixture::new(1024);
    let id = fx.hold(&[("filename", "a.txt")], b"hello");

    let (status, body) = send(fx.app(), get("/api/stages/probe-1/records")).await;
    assert_eq!(status, StatusCode::OK);
    let records: Vec<RecordSummary> = serde_json::from_slice(&body).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, id);
    assert_eq!(records[0].size, "5");
    assert_eq!(records[0].attribute_count, 1);

    let (status, body) = send(fx.app(), get(&format!("/api/stages/probe-1/records/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    let detail: RecordDetail = serde_json::from_slice(&body).unwrap();
    assert_eq!(detail.attributes["filename"], "a.txt");

    let (status, _) = send(fx.app(), get("/api/stages/probe-1/records/999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(fx.app(), get("/api/stages/probe-1/records/abc")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn content_uses_mime_type() {
    let fx = Fixture::new(1024);
    let typed = fx.hold(&[("mime.type", "application/json")], b"{}");
    let plain = fx.hold(&[], b"text");

    let response = fx
        .app()
        .oneshot(get(&format!("/api/stages/probe-1/records/{typed}/content")))
        .await
        .unwrap();
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

    let response = fx
        .app()
        .oneshot(get(&format!("/api/stages/probe-1/records/{plain}/content")))
        .await
        .unwrap();
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"text");
}

#[tokio::test]
async fn accept_raises_pull_counter() {
    let fx = Fixture::new(1024);
    let (status, body) = send(fx.app(), post_json("/api/stages/probe-1/accept", r#"{"count": 3}"#)).await;
    assert_eq!(status, StatusCode::OK);
    let resp: PullCounterResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(resp.pull_counter, 3);
    assert_eq!(fx.stage.pull_counter_peek(), 3);
}

#[tokio::test]
async fn route_and_action_instructions() {
    let fx = Fixture::new(1024);
    let id = fx.hold(&[], b"abc");

    let (_, body) = send(
        fx.app(),
        post_json("/api/stages/probe-1/route", r#"{"value": "[7][Outgoing]"}"#),
    )
    .await;
    let resp: RouteResponse = serde_json::from_slice(&body).unwrap();
    assert!(!resp.routed);

    let (_, body) = send(
        fx.app(),
        post_json("/api/stages/probe-1/action", &format!(r#"{{"value": "[{id}][CLONE]"}}"#)),
    )
    .await;
    let resp: ActionResponse = serde_json::from_slice(&body).unwrap();
    assert!(resp.location.is_none());
    assert_eq!(fx.stage.held_count(), 2);

    let (_, body) = send(
        fx.app(),
        post_json("/api/stages/probe-1/action", &format!(r#"{{"value": "[{id}][EDIT]"}}"#)),
    )
    .await;
    let resp: ActionResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(resp.location.as_deref(), Some("/api/stages/probe-1/editor"));
    assert_eq!(fx.stage.editor().content(), b"abc");

    let (_, body) = send(
        fx.app(),
        post_json("/api/stages/probe-1/route", &format!(r#"{{"value": "[{id}][Outgoing]"}}"#)),
    )
    .await;
    let resp: RouteResponse = serde_json::from_slice(&body).unwrap();
    assert!(resp.routed);
    assert_eq!(fx.stage.routed_count(), 1);
}

#[tokio::test]
async fn snapshot_export_then_import() {
    let fx = Fixture::new(1024);
    fx.hold(&[("k", "v")], b"payload");

    let response = fx.app().oneshot(get("/api/stages/probe-1/snapshot")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    let document = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let (status, body) = send(fx.app(), raw("POST", "/api/stages/probe-1/snapshot", document.to_vec())).await;
    assert_eq!(status, StatusCode::OK);
    let resp: ImportResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(resp.admitted, 1);
    assert_eq!(fx.stage.held_count(), 2);
}

#[tokio::test]
async fn snapshot_import_edge_cases() {
    let fx = Fixture::new(1024);

    let (status, body) = send(fx.app(), raw("POST", "/api/stages/probe-1/snapshot", Vec::new())).await;
    assert_eq!(status, StatusCode::OK);
    let resp: ImportResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(resp.admitted, 0);

    let (status, _) = send(
        fx.app(),
        raw("POST", "/api/stages/probe-1/snapshot", b"not a document".to_vec()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(fx.stage.held_count(), 0);
}

#[tokio::test]
async fn editor_compose_and_commit() {
    let fx = Fixture::new(1024);

    let (status, _) = send(
        fx.app(),
        post_json("/api/stages/probe-1/editor/attribute", r#"{"name": "filename", "value": "x.txt"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(
        fx.app(),
        post_json("/api/stages/probe-1/editor/text", r#"{"text": "a\r\nb"}"#),
    )
    .await;
    let view: EditorView = serde_json::from_slice(&body).unwrap();
    assert_eq!(view.size, 3);
    assert_eq!(view.attributes["filename"], "x.txt");

    let (status, body) = send(fx.app(), post_json("/api/stages/probe-1/editor/commit", "")).await;
    assert_eq!(status, StatusCode::CREATED);
    let created: RecordDetail = serde_json::from_slice(&body).unwrap();
    assert_eq!(created.summary.size, "3");
    assert_eq!(fx.stage.lookup_str(&created.summary.id.to_string()).unwrap().payload(), Some(&b"a\nb"[..]));
}

#[tokio::test]
async fn editor_base64_upload_and_reset() {
    let fx = Fixture::new(1024);

    let (status, _) = send(
        fx.app(),
        post_json("/api/stages/probe-1/editor/text-base64", r#"{"text": "%%%"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(
        fx.app(),
        post_json("/api/stages/probe-1/editor/text-base64", r#"{"text": "aGVs\nbG8="}"#),
    )
    .await;
    let view: EditorView = serde_json::from_slice(&body).unwrap();
    assert_eq!(view.content, "aGVsbG8=");

    let (_, body) = send(
        fx.app(),
        raw("PUT", "/api/stages/probe-1/editor/content", vec![0, 1, 2, 3]),
    )
    .await;
    let view: EditorView = serde_json::from_slice(&body).unwrap();
    assert_eq!(view.size, 4);

    let (_, body) = send(fx.app(), post_json("/api/stages/probe-1/editor/reset", "")).await;
    let view: EditorView = serde_json::from_slice(&body).unwrap();
    assert_eq!(view.size, 0);
    assert!(view.attributes.is_empty());
}

#[tokio::test]
async fn commit_over_budget_is_conflict() {
    let fx = Fixture::new(4);
    send(
        fx.app(),
        post_json("/api/stages/probe-1/editor/text", r#"{"text": "too long"}"#),
    )
    .await;

    let (status, _) = send(fx.app(), post_json("/api/stages/probe-1/editor/commit", "")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(fx.stage.held_count(), 0);

    let (_, body) = send(fx.app(), get("/api/alerts")).await;
    let alerts: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(alerts.as_array().unwrap().len(), 1);
    assert_eq!(alerts[0]["severity"], "err");

    let (status, _) = send(fx.app(), raw("DELETE", "/api/alerts", Vec::new())).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(fx.state.registry.alerts().is_empty());
}

#[tokio::test]
async fn upstream_to_delivered_round() {
    let fx = Fixture::new(1024);

    let (status, body) = send(
        fx.app(),
        post_json(
            "/api/stages/probe-1/upstream",
            r#"{"attributes": {"filename": "in.txt"}, "content": "aGk="}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let resp: UpstreamResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(resp.upstream_id, 1);
    assert_eq!(resp.queued, 1);

    send(fx.app(), post_json("/api/stages/probe-1/accept", r#"{"count": 1}"#)).await;
    let ports = fx.ports();
    trigger(&fx.stage, ports.upstream.as_ref(), ports.downstream.as_ref()).unwrap();
    let pulled = fx.stage.records()[0].id().get();

    send(
        fx.app(),
        post_json("/api/stages/probe-1/route", &format!(r#"{{"value": "[{pulled}][Failure]"}}"#)),
    )
    .await;
    trigger(&fx.stage, ports.upstream.as_ref(), ports.downstream.as_ref()).unwrap();

    let (status, body) = send(fx.app(), get("/api/stages/probe-1/delivered/Failure")).await;
    assert_eq!(status, StatusCode::OK);
    let delivered: Vec<RecordDetail> = serde_json::from_slice(&body).unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].attributes["flowfileIdIn"], "1");
    assert_eq!(delivered[0].summary.route.as_deref(), Some("Failure"));

    let (status, _) = send(fx.app(), get("/api/stages/probe-1/delivered/Nowhere")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upstream_rejects_bad_base64() {
    let fx = Fixture::new(1024);
    let (status, _) = send(
        fx.app(),
        post_json("/api/stages/probe-1/upstream", r#"{"content": "!!"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(fx.ports().upstream.is_empty());
}
