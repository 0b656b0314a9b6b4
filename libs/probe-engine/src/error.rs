use probe_api::RecordId;
use probe_snapshot::SnapshotError;

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(
        "stage memory limit exceeded: record {record} ({size} bytes) does not fit, \
         {held_bytes} of {budget} bytes held"
    )]
    AdmissionRejected {
        record: RecordId,
        size: u64,
        held_bytes: u64,
        budget: u64,
    },

    #[error("snapshot: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("editor: {0}")]
    Editor(String),

    #[error("relationship '{0}' is not configured")]
    UnknownRelationship(String),

    #[error("stage '{0}' not found")]
    StageNotFound(String),
}

impl StageError {
    /// `true` for budget rejections, the only error an admission can raise.
    pub fn is_admission_rejected(&self) -> bool {
        matches!(self, StageError::AdmissionRejected { .. })
    }
}
