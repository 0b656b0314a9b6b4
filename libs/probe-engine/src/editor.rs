use base64::Engine;

use probe_api::{Attributes, FlowRecord, normalize_newlines};

use crate::error::StageError;

/// Single-slot draft used to compose a new record before committing it
/// into the stage (see [`StagingQueue::commit_draft`]).
///
/// [`StagingQueue::commit_draft`]: crate::StagingQueue::commit_draft
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftEditor {
    attributes: Attributes,
    content: Vec<u8>,
}

impl DraftEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Upsert `name`, or delete it when `value` is `None`.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: Option<String>) {
        let name = name.into();
        match value {
            Some(value) => {
                self.attributes.insert(name, value);
            }
            None => {
                self.attributes.remove(&name);
            }
        }
    }

    /// Replace the content buffer wholesale (e.g. a file upload).
    pub fn set_content(&mut self, content: Vec<u8>) {
        self.content = content;
    }

    /// Replace content from form text, normalizing CRLF to LF.
    pub fn set_text(&mut self, text: &str) {
        self.content = normalize_newlines(text).into_bytes();
    }

    /// Replace content from Base64 text. Content is left unchanged when the
    /// text does not decode.
    pub fn set_text_base64(&mut self, text: &str) -> Result<(), StageError> {
        let compact: String = text.split_whitespace().collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| StageError::Editor(format!("content is not valid base64: {e}")))?;
        self.content = bytes;
        Ok(())
    }

    /// Overwrite the draft with a held record's attributes and payload.
    pub fn load(&mut self, record: &FlowRecord) {
        self.attributes = record.attributes().clone();
        self.content = record.payload().map(<[u8]>::to_vec).unwrap_or_default();
    }

    pub fn reset(&mut self) {
        self.attributes.clear();
        self.content.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.content.is_empty()
    }
}
