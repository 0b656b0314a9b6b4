use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use probe_api::{Action, Attributes, Command, FlowRecord, RecordId, Severity, now_ms};

use crate::alerts::Alerts;
use crate::config::{DEFAULT_RELATIONSHIP, StageConfig};
use crate::editor::DraftEditor;
use crate::error::StageError;
use crate::sync::{lock, sha256_hex};

// ═══════════════════════════════════════════════════════════════
//  Views
// ═══════════════════════════════════════════════════════════════

/// Where the operator surface should go after an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum Navigation {
    /// The draft editor of the given stage now holds the record.
    Editor { stage: String },
}

/// Point-in-time counters of one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    pub id: String,
    pub name: String,
    pub start_ms: i64,
    pub last_pull_ms: Option<i64>,
    pub pull_counter: i64,
    pub held: usize,
    pub routed: usize,
    pub held_bytes: u64,
    pub memory_budget: u64,
    pub relationships: Vec<String>,
}

// ═══════════════════════════════════════════════════════════════
//  StagingQueue
// ═══════════════════════════════════════════════════════════════

/// Mutable state shared by the trigger loop and operator requests.
/// Guarded by a single mutex so budget checks, inserts, drains and
/// pull-counter updates never interleave.
#[derive(Debug, Default)]
struct QueueState {
    held: Vec<FlowRecord>,
    pull_counter: i64,
    last_pull_ms: Option<i64>,
}

impl QueueState {
    fn held_bytes(&self) -> u64 {
        self.held.iter().map(FlowRecord::size).sum()
    }

    fn position(&self, id: RecordId) -> Option<usize> {
        self.held.iter().position(|r| r.id() == id)
    }

    fn insert_within_budget(&mut self, record: FlowRecord, budget: u64) -> Result<(), StageError> {
        let held_bytes = self.held_bytes();
        let size = record.size();
        if held_bytes.saturating_add(size) > budget {
            return Err(StageError::AdmissionRejected {
                record: record.id(),
                size,
                held_bytes,
                budget,
            });
        }
        self.held.push(record);
        Ok(())
    }
}

/// Holds in-flight records of one pipeline stage under a byte budget.
///
/// Records enter through [`ingest`](Self::ingest) + [`admit`](Self::admit)
/// (or [`admit_from_pull`](Self::admit_from_pull) on the driver path),
/// stay held until an operator routes or discards them, and leave through
/// [`drain_routed`](Self::drain_routed). Every method is a short in-memory
/// computation; none of them wait for budget to free up.
#[derive(Debug)]
pub struct StagingQueue {
    id: String,
    name: String,
    start_ms: i64,
    memory_budget: u64,
    relationships: BTreeSet<String>,
    next_id: AtomicU64,
    state: Mutex<QueueState>,
    editor: Mutex<DraftEditor>,
    alerts: Arc<Alerts>,
}

impl StagingQueue {
    pub fn new(config: StageConfig, alerts: Arc<Alerts>) -> Self {
        let mut relationships: BTreeSet<String> = config
            .relationships
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect();
        if relationships.is_empty() {
            relationships.insert(DEFAULT_RELATIONSHIP.to_string());
        }
        Self {
            name: config.display_name().to_string(),
            id: config.id,
            start_ms: now_ms(),
            memory_budget: config.memory_budget,
            relationships,
            next_id: AtomicU64::new(0),
            state: Mutex::new(QueueState::default()),
            editor: Mutex::new(DraftEditor::new()),
            alerts,
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        lock(&self.state, "stage state")
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_ms(&self) -> i64 {
        self.start_ms
    }

    pub fn memory_budget(&self) -> u64 {
        self.memory_budget
    }

    pub fn relationships(&self) -> &BTreeSet<String> {
        &self.relationships
    }

    pub fn has_relationship(&self, name: &str) -> bool {
        self.relationships.contains(name)
    }

    pub fn alerts(&self) -> &Arc<Alerts> {
        &self.alerts
    }

    // ── pull bookkeeping ────────────────────────────────────────

    /// Add `count` to the pull counter and return the new value. Called by
    /// the driver before fetching upstream records (`count = 0` to read),
    /// so it also refreshes the last-pull timestamp. Negative counts are
    /// accepted and reduce future pulls.
    pub fn request_pull(&self, count: i64) -> i64 {
        let mut state = self.state();
        state.pull_counter = state.pull_counter.saturating_add(count);
        state.last_pull_ms = Some(now_ms());
        state.pull_counter
    }

    /// Current pull counter, without touching the pull timestamp.
    pub fn pull_counter_peek(&self) -> i64 {
        self.state().pull_counter
    }

    /// Operator "accept N": raise the number of upstream records the
    /// driver should pull. Unlike [`request_pull`](Self::request_pull)
    /// this is not a driver pull and leaves the timestamp alone.
    pub fn accept(&self, count: i64) -> i64 {
        let mut state = self.state();
        state.pull_counter = state.pull_counter.saturating_add(count);
        tracing::debug!(stage = %self.id, count, pull_counter = state.pull_counter, "accept");
        state.pull_counter
    }

    /// Time of the most recent [`request_pull`](Self::request_pull).
    pub fn last_pull_ms(&self) -> Option<i64> {
        self.state().last_pull_ms
    }

    // ── admission ───────────────────────────────────────────────

    /// Build a record with the next stage-unique id. The record is not
    /// inserted; pass it to [`admit`](Self::admit).
    pub fn ingest(&self, entry_ms: i64, attributes: Attributes, payload: Option<Vec<u8>>) -> FlowRecord {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        FlowRecord::new(RecordId(id), entry_ms, attributes, payload)
    }

    /// Insert `record` if the held payload total stays within the memory
    /// budget. On rejection the held set is unchanged and an alert is
    /// raised.
    pub fn admit(&self, record: FlowRecord) -> Result<(), StageError> {
        let result = self.state().insert_within_budget(record, self.memory_budget);
        self.note_admission(result)
    }

    /// Driver path: count one pulled record against the pull counter, then
    /// admit it. The decrement stands even when admission fails; the error
    /// is returned so the driver can roll back its upstream batch.
    pub fn admit_from_pull(&self, record: FlowRecord) -> Result<(), StageError> {
        let result = {
            let mut state = self.state();
            state.pull_counter = state.pull_counter.saturating_sub(1);
            state.insert_within_budget(record, self.memory_budget)
        };
        self.note_admission(result)
    }

    fn note_admission(&self, result: Result<(), StageError>) -> Result<(), StageError> {
        if let Err(e) = &result {
            tracing::warn!(stage = %self.id, error = %e, "admission rejected");
            self.alerts.add(Severity::Err, format!("{}: {e}", self.name));
        }
        result
    }

    // ── queries ─────────────────────────────────────────────────

    pub fn lookup(&self, id: RecordId) -> Option<FlowRecord> {
        self.state().held.iter().find(|r| r.id() == id).cloned()
    }

    /// Look up by textual id; unparseable ids are simply not found.
    pub fn lookup_str(&self, id: &str) -> Option<FlowRecord> {
        id.parse::<RecordId>().ok().and_then(|id| self.lookup(id))
    }

    /// All records currently held (routed or not), in held order.
    pub fn records(&self) -> Vec<FlowRecord> {
        self.state().held.clone()
    }

    /// Held records not yet routed.
    pub fn held_count(&self) -> usize {
        self.state().held.iter().filter(|r| !r.is_routed()).count()
    }

    /// Routed records waiting for the next drain.
    pub fn routed_count(&self) -> usize {
        self.state().held.iter().filter(|r| r.is_routed()).count()
    }

    pub fn total_count(&self) -> usize {
        self.state().held.len()
    }

    pub fn held_bytes(&self) -> u64 {
        self.state().held_bytes()
    }

    pub fn summary(&self) -> StageSummary {
        let state = self.state();
        StageSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            start_ms: self.start_ms,
            last_pull_ms: state.last_pull_ms,
            pull_counter: state.pull_counter,
            held: state.held.iter().filter(|r| !r.is_routed()).count(),
            routed: state.held.iter().filter(|r| r.is_routed()).count(),
            held_bytes: state.held_bytes(),
            memory_budget: self.memory_budget,
            relationships: self.relationships.iter().cloned().collect(),
        }
    }

    // ── operator instructions ───────────────────────────────────

    /// Mark a held record for delivery to `label`. Returns `false` (and
    /// changes nothing) when no such record is held. The label is not
    /// checked against the configured relationships.
    pub fn route(&self, id: RecordId, label: &str) -> bool {
        let mut state = self.state();
        match state.held.iter_mut().find(|r| r.id() == id) {
            Some(record) => {
                record.set_route(label);
                tracing::debug!(stage = %self.id, record = %id, route = label, "routed");
                true
            }
            None => false,
        }
    }

    /// [`route`](Self::route) from a `[id][label]` instruction. Malformed
    /// instructions are ignored.
    pub fn route_command(&self, value: &str) -> bool {
        match Command::parse(value) {
            Some(cmd) => self.route(cmd.id, &cmd.token),
            None => false,
        }
    }

    /// Apply an action to a held record. Unknown ids are a no-op. `Edit`
    /// returns where the operator surface should navigate next.
    pub fn dispatch_action(&self, id: RecordId, action: Action) -> Option<Navigation> {
        match action {
            Action::Duplicate => {
                self.duplicate(id);
                None
            }
            Action::Discard => {
                self.discard(id);
                None
            }
            Action::Edit => self.edit(id),
        }
    }

    /// [`dispatch_action`](Self::dispatch_action) from a `[id][ACTION]`
    /// instruction. Malformed instructions and unknown action tokens are
    /// ignored.
    pub fn dispatch_command(&self, value: &str) -> Option<Navigation> {
        let cmd = Command::parse(value)?;
        let action = cmd.action()?;
        self.dispatch_action(cmd.id, action)
    }

    fn duplicate(&self, id: RecordId) {
        let Some(source) = self.lookup(id) else {
            return;
        };
        let (attributes, payload) = source.into_parts();
        let copy = self.ingest(now_ms(), attributes, payload);
        let copy_id = copy.id();
        // A rejected copy is already alerted by `admit`.
        if self.admit(copy).is_ok() {
            tracing::debug!(stage = %self.id, record = %id, copy = %copy_id, "duplicated");
        }
    }

    fn discard(&self, id: RecordId) {
        let mut state = self.state();
        if let Some(pos) = state.position(id) {
            state.held.remove(pos);
            tracing::debug!(stage = %self.id, record = %id, "discarded");
        }
    }

    fn edit(&self, id: RecordId) -> Option<Navigation> {
        let record = self.lookup(id)?;
        lock(&self.editor, "draft editor").load(&record);
        tracing::debug!(stage = %self.id, record = %id, "loaded into editor");
        Some(Navigation::Editor {
            stage: self.id.clone(),
        })
    }

    // ── delivery ────────────────────────────────────────────────

    /// Remove and return every routed record, in held order, in one step.
    pub fn drain_routed(&self) -> Vec<FlowRecord> {
        let mut state = self.state();
        let (routed, held): (Vec<_>, Vec<_>) = std::mem::take(&mut state.held)
            .into_iter()
            .partition(FlowRecord::is_routed);
        state.held = held;
        routed
    }

    // ── snapshots ───────────────────────────────────────────────

    /// Serialize every held record, routed ones included.
    pub fn export_snapshot(&self) -> Result<Vec<u8>, StageError> {
        let records = self.records();
        let bytes = probe_snapshot::serialize(records.iter())?;
        tracing::info!(stage = %self.id, records = records.len(), size = bytes.len(), "exported snapshot");
        Ok(bytes)
    }

    /// Import a snapshot document. The whole document is decoded before
    /// anything is admitted; a decode failure admits nothing. Records are
    /// then admitted in document order with fresh ids and the import time
    /// as entry time, stopping at the first budget rejection. Returns the
    /// number of records admitted.
    pub fn import_snapshot(&self, bytes: &[u8]) -> Result<usize, StageError> {
        let decoded = probe_snapshot::deserialize(bytes)?;
        let total = decoded.len();
        let mut admitted = 0;
        for entry in decoded {
            let record = self.ingest(now_ms(), entry.attributes, entry.payload);
            if self.admit(record).is_err() {
                break;
            }
            admitted += 1;
        }
        tracing::info!(
            stage = %self.id,
            size = bytes.len(),
            sha256 = %sha256_hex(bytes),
            records = total,
            admitted,
            "imported snapshot"
        );
        Ok(admitted)
    }

    // ── draft editor ────────────────────────────────────────────

    /// Copy of the current draft.
    pub fn editor(&self) -> DraftEditor {
        lock(&self.editor, "draft editor").clone()
    }

    /// Mutate the draft in place.
    pub fn with_editor<R>(&self, f: impl FnOnce(&mut DraftEditor) -> R) -> R {
        f(&mut lock(&self.editor, "draft editor"))
    }

    /// Create a record from the draft as it is now and admit it. The draft
    /// is left as is, so the same draft can be committed repeatedly.
    pub fn commit_draft(&self) -> Result<FlowRecord, StageError> {
        let draft = self.editor();
        let record = self.ingest(now_ms(), draft.attributes().clone(), Some(draft.content().to_vec()));
        self.admit(record.clone())?;
        tracing::debug!(stage = %self.id, record = %record.id(), size = record.size(), "committed draft");
        Ok(record)
    }
}
