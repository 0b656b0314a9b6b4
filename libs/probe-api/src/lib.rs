//! Shared value types for the flow probe: held records, the operator
//! instruction grammar and user-visible alerts.

pub mod alert;
pub mod command;
pub mod record;
pub mod util;

pub use alert::{Alert, Severity};
pub use command::{Action, Command};
pub use record::{ATTR_MIME_TYPE, ATTR_UPSTREAM_ID, Attributes, FlowRecord, ParseRecordIdError, RecordId};
pub use util::{normalize_newlines, now_ms};
