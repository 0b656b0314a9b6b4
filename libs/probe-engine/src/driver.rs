//! One trigger pass of a stage: pull what the operator accepted, then
//! deliver what the operator routed.

use probe_api::{ATTR_UPSTREAM_ID, Attributes, FlowRecord, Severity};

use crate::error::StageError;
use crate::queue::StagingQueue;

/// A record as delivered by the upstream connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRecord {
    /// Identifier assigned by the upstream side.
    pub upstream_id: u64,
    pub entry_ms: i64,
    pub attributes: Attributes,
    pub payload: Option<Vec<u8>>,
}

/// Source of records for a stage.
pub trait Upstream: Send + Sync {
    /// Take up to `max` records, oldest first.
    fn fetch(&self, max: usize) -> Vec<InboundRecord>;

    /// Give back a fetched batch after a failed pull, so it is offered
    /// again on the next trigger in the same order.
    fn restore(&self, batch: Vec<InboundRecord>);
}

/// Destination of routed records.
pub trait Downstream: Send + Sync {
    fn transfer(&self, relationship: &str, record: FlowRecord) -> Result<(), StageError>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TriggerOutcome {
    /// Records pulled from upstream and admitted.
    pub consumed: usize,
    /// Records transferred downstream.
    pub produced: usize,
}

impl TriggerOutcome {
    /// Nothing moved; the caller should back off before the next pass.
    pub fn is_idle(&self) -> bool {
        self.consumed == 0 && self.produced == 0
    }
}

/// Run one pass for `stage`.
///
/// Pulls at most the stage's pull counter worth of upstream records. If
/// any of them is rejected by admission control, the whole fetched batch
/// is restored upstream and the error is returned without delivering.
/// Records admitted earlier in that batch stay held and are also back
/// upstream, so a later pull ingests them a second time under new ids.
///
/// Routed records are then drained and transferred to the relationship
/// named by their route. A failed transfer loses that record; it is
/// logged and alerted.
pub fn trigger(
    stage: &StagingQueue,
    upstream: &dyn Upstream,
    downstream: &dyn Downstream,
) -> Result<TriggerOutcome, StageError> {
    let mut outcome = TriggerOutcome::default();

    let count = stage.request_pull(0);
    if count > 0 {
        let batch = upstream.fetch(usize::try_from(count).unwrap_or(usize::MAX));
        let mut failure = None;
        for inbound in &batch {
            let mut attributes = inbound.attributes.clone();
            attributes.insert(ATTR_UPSTREAM_ID.to_string(), inbound.upstream_id.to_string());
            let record = stage.ingest(inbound.entry_ms, attributes, inbound.payload.clone());
            if let Err(e) = stage.admit_from_pull(record) {
                failure = Some(e);
                break;
            }
            outcome.consumed += 1;
        }
        if let Some(e) = failure {
            tracing::error!(stage = %stage.id(), batch = batch.len(), error = %e, "pull failed, restoring batch upstream");
            upstream.restore(batch);
            return Err(e);
        }
    }

    for record in stage.drain_routed() {
        let Some(relationship) = record.route().map(str::to_string) else {
            continue;
        };
        let id = record.id();
        match downstream.transfer(&relationship, record) {
            Ok(()) => outcome.produced += 1,
            Err(e) => {
                tracing::error!(stage = %stage.id(), record = %id, relationship = %relationship, error = %e, "transfer failed");
                stage
                    .alerts()
                    .add(Severity::Err, format!("{}: record {id} not delivered: {e}", stage.name()));
            }
        }
    }

    if !outcome.is_idle() {
        tracing::debug!(stage = %stage.id(), consumed = outcome.consumed, produced = outcome.produced, "trigger");
    }
    Ok(outcome)
}
