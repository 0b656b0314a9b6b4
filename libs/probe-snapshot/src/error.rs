#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot document: {0}")]
    Document(#[from] serde_json::Error),

    #[error("snapshot record {index}: content is not valid base64: {source}")]
    Content {
        index: usize,
        source: base64::DecodeError,
    },
}
