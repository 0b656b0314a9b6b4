use base64::Engine;

use probe_api::FlowRecord;

use crate::document::{AttributeEntry, RecordEntry, StateDocument};
use crate::error::SnapshotError;

/// Encode records, in the given order, as a snapshot document.
///
/// Only attributes and payload are written. Ids, routes and entry
/// timestamps belong to the exporting stage and are left out.
pub fn serialize<'a, I>(records: I) -> Result<Vec<u8>, SnapshotError>
where
    I: IntoIterator<Item = &'a FlowRecord>,
{
    let engine = base64::engine::general_purpose::STANDARD;
    let records = records
        .into_iter()
        .map(|record| RecordEntry {
            attributes: record
                .attributes()
                .iter()
                .map(|(name, value)| AttributeEntry {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
            content: record.payload().map(|bytes| engine.encode(bytes)),
        })
        .collect();

    let mut out = serde_json::to_vec_pretty(&StateDocument { records })?;
    out.push(b'\n');
    Ok(out)
}
