//! Request and response bodies of the operator API.

use base64::Engine;
use serde::{Deserialize, Serialize};

use probe_api::{Attributes, FlowRecord};
use probe_engine::DraftEditor;

/// One row of a stage's record list.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: u64,
    pub entry_ms: i64,
    /// `"-"` for a record without content, otherwise the byte count.
    pub size: String,
    pub route: Option<String>,
    pub attribute_count: usize,
}

impl From<&FlowRecord> for RecordSummary {
    fn from(record: &FlowRecord) -> Self {
        Self {
            id: record.id().get(),
            entry_ms: record.entry_ms(),
            size: record.size_label(),
            route: record.route().map(str::to_string),
            attribute_count: record.attributes().len(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordDetail {
    #[serde(flatten)]
    pub summary: RecordSummary,
    pub attributes: Attributes,
}

impl From<&FlowRecord> for RecordDetail {
    fn from(record: &FlowRecord) -> Self {
        Self {
            summary: RecordSummary::from(record),
            attributes: record.attributes().clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptRequest {
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PullCounterResponse {
    pub pull_counter: i64,
}

/// Body of the route and action endpoints: `"[<id>][<token>]"`.
#[derive(Debug, Serialize, Deserialize)]
pub struct InstructionRequest {
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RouteResponse {
    pub routed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    /// Where the operator should go next; set after an edit.
    pub location: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportResponse {
    pub admitted: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EditorView {
    pub attributes: Attributes,
    /// Base64 (standard alphabet).
    pub content: String,
    pub size: usize,
}

impl From<&DraftEditor> for EditorView {
    fn from(draft: &DraftEditor) -> Self {
        Self {
            attributes: draft.attributes().clone(),
            content: base64::engine::general_purpose::STANDARD.encode(draft.content()),
            size: draft.content().len(),
        }
    }
}

/// Upsert an attribute, or delete it when `value` is missing.
#[derive(Debug, Serialize, Deserialize)]
pub struct AttributeRequest {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpstreamRequest {
    #[serde(default)]
    pub attributes: Attributes,
    /// Base64 payload; omit for a record without content.
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpstreamResponse {
    pub upstream_id: u64,
    pub queued: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
