use base64::Engine;

use probe_api::Attributes;

use crate::document::StateDocument;
use crate::error::SnapshotError;

/// A record read back from a snapshot. It has no id, route or timestamp;
/// the importing stage assigns those.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub attributes: Attributes,
    pub payload: Option<Vec<u8>>,
}

/// Decode a whole snapshot document.
///
/// Either every record decodes or an error is returned; callers never see
/// a partially decoded document. Repeated attribute names keep the last
/// value.
pub fn deserialize(bytes: &[u8]) -> Result<Vec<SnapshotRecord>, SnapshotError> {
    let engine = base64::engine::general_purpose::STANDARD;
    let document: StateDocument = serde_json::from_slice(bytes)?;

    let mut out = Vec::with_capacity(document.records.len());
    for (index, entry) in document.records.into_iter().enumerate() {
        let attributes: Attributes = entry
            .attributes
            .into_iter()
            .map(|a| (a.name, a.value))
            .collect();
        let payload = match entry.content {
            Some(text) => Some(
                engine
                    .decode(text.trim())
                    .map_err(|source| SnapshotError::Content { index, source })?,
            ),
            None => None,
        };
        out.push(SnapshotRecord { attributes, payload });
    }
    Ok(out)
}
