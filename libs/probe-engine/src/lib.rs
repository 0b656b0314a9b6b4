//! Staging engine of the flow probe.
//!
//! A [`StagingQueue`] holds the in-flight records of one pipeline stage
//! under a byte budget. The driver asks it how many upstream records to
//! pull, feeds them in and drains what the operator routed; the operator
//! surface duplicates, discards, edits and routes records in between.
//! Stages live in a [`StageRegistry`] owned by the surrounding service.

pub mod alerts;
pub mod config;
pub mod driver;
pub mod editor;
pub mod error;
pub mod memory;
pub mod queue;
pub mod registry;
mod sync;

pub use alerts::Alerts;
pub use config::{DEFAULT_RELATIONSHIP, StageConfig};
pub use driver::{Downstream, InboundRecord, TriggerOutcome, Upstream, trigger};
pub use editor::DraftEditor;
pub use error::StageError;
pub use memory::{MemoryDownstream, MemoryUpstream, StagePorts};
pub use queue::{Navigation, StageSummary, StagingQueue};
pub use registry::StageRegistry;
