use std::collections::VecDeque;
use std::sync::Mutex;

use probe_api::{Alert, Severity, now_ms};

use crate::sync::lock;

pub const DEFAULT_MAX_ALERTS: usize = 100;

/// Bounded list of operator-facing messages. The oldest alert is evicted
/// once `capacity` is reached.
#[derive(Debug)]
pub struct Alerts {
    entries: Mutex<VecDeque<Alert>>,
    capacity: usize,
}

impl Default for Alerts {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ALERTS)
    }
}

impl Alerts {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn add(&self, severity: Severity, message: impl Into<String>) {
        self.push(Alert::new(severity, now_ms(), message));
    }

    pub fn push(&self, alert: Alert) {
        let mut entries = lock(&self.entries, "alerts");
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(alert);
    }

    /// Oldest first.
    pub fn list(&self) -> Vec<Alert> {
        lock(&self.entries, "alerts").iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries, "alerts").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.entries, "alerts").clear();
    }
}
