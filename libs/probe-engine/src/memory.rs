use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};

use probe_api::{Attributes, FlowRecord, now_ms};

use crate::driver::{Downstream, InboundRecord, Upstream};
use crate::error::StageError;
use crate::queue::StagingQueue;
use crate::sync::lock;

// ═══════════════════════════════════════════════════════════════
//  MemoryUpstream
// ═══════════════════════════════════════════════════════════════

/// In-process inbox feeding a stage. Records wait here until the operator
/// accepts them and the trigger loop pulls them.
#[derive(Debug, Default)]
pub struct MemoryUpstream {
    queue: Mutex<VecDeque<InboundRecord>>,
    next_id: AtomicU64,
}

impl MemoryUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a record, returning its upstream id.
    pub fn push(&self, attributes: Attributes, payload: Option<Vec<u8>>) -> u64 {
        let upstream_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        lock(&self.queue, "upstream").push_back(InboundRecord {
            upstream_id,
            entry_ms: now_ms(),
            attributes,
            payload,
        });
        upstream_id
    }

    pub fn len(&self) -> usize {
        lock(&self.queue, "upstream").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Upstream for MemoryUpstream {
    fn fetch(&self, max: usize) -> Vec<InboundRecord> {
        let mut queue = lock(&self.queue, "upstream");
        let n = max.min(queue.len());
        queue.drain(..n).collect()
    }

    fn restore(&self, batch: Vec<InboundRecord>) {
        let mut queue = lock(&self.queue, "upstream");
        for record in batch.into_iter().rev() {
            queue.push_front(record);
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryDownstream
// ═══════════════════════════════════════════════════════════════

/// Per-relationship ring buffers of delivered records. Each buffer keeps
/// the newest `max_records`.
#[derive(Debug)]
pub struct MemoryDownstream {
    outboxes: Mutex<BTreeMap<String, VecDeque<FlowRecord>>>,
    max_records: usize,
}

impl MemoryDownstream {
    pub fn new<I>(relationships: I, max_records: usize) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let outboxes = relationships.into_iter().map(|r| (r, VecDeque::new())).collect();
        Self {
            outboxes: Mutex::new(outboxes),
            max_records: max_records.max(1),
        }
    }

    /// Delivered records for `relationship`, oldest first. `None` when the
    /// relationship is not configured.
    pub fn delivered(&self, relationship: &str) -> Option<Vec<FlowRecord>> {
        lock(&self.outboxes, "downstream")
            .get(relationship)
            .map(|buf| buf.iter().cloned().collect())
    }

    pub fn relationships(&self) -> Vec<String> {
        lock(&self.outboxes, "downstream").keys().cloned().collect()
    }
}

impl Downstream for MemoryDownstream {
    fn transfer(&self, relationship: &str, record: FlowRecord) -> Result<(), StageError> {
        let mut outboxes = lock(&self.outboxes, "downstream");
        let buf = outboxes
            .get_mut(relationship)
            .ok_or_else(|| StageError::UnknownRelationship(relationship.to_string()))?;
        if buf.len() >= self.max_records {
            buf.pop_front();
        }
        tracing::info!(record = %record.id(), relationship, size = record.size(), "delivered");
        buf.push_back(record);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
//  StagePorts
// ═══════════════════════════════════════════════════════════════

/// The in-process connections of one stage, shared by its trigger loop
/// and the operator API.
#[derive(Debug, Clone)]
pub struct StagePorts {
    pub upstream: Arc<MemoryUpstream>,
    pub downstream: Arc<MemoryDownstream>,
}

impl StagePorts {
    /// Fresh ports with one downstream buffer per relationship of `stage`.
    pub fn for_stage(stage: &StagingQueue, delivered_buffer: usize) -> Self {
        Self {
            upstream: Arc::new(MemoryUpstream::new()),
            downstream: Arc::new(MemoryDownstream::new(
                stage.relationships().iter().cloned(),
                delivered_buffer,
            )),
        }
    }
}
