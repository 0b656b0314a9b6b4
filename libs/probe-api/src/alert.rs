use serde::{Deserialize, Serialize};

/// Alert severity as shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    Err,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => f.write_str("info"),
            Severity::Warn => f.write_str("warn"),
            Severity::Err => f.write_str("err"),
        }
    }
}

/// A user-visible message raised by a stage (e.g. a rejected admission).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: Severity,
    /// Unix milliseconds.
    pub ts_ms: i64,
    pub message: String,
}

impl Alert {
    pub fn new(severity: Severity, ts_ms: i64, message: impl Into<String>) -> Self {
        Self {
            severity,
            ts_ms,
            message: message.into(),
        }
    }
}
