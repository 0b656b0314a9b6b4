use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════
//  Wire document
// ═══════════════════════════════════════════════════════════════
//
//  {
//    "records": [
//      { "attributes": [ { "name": "filename", "value": "a.txt" } ],
//        "content": "aGVsbG8=" }
//    ]
//  }
//
//  `content` is null when the record has no payload at all.

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StateDocument {
    #[serde(default)]
    pub records: Vec<RecordEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RecordEntry {
    #[serde(default)]
    pub attributes: Vec<AttributeEntry>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AttributeEntry {
    pub name: String,
    pub value: String,
}
