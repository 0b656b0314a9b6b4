//! Snapshot codec: export/import of a stage's held records as a
//! self-contained JSON document with Base64 payloads.

mod document;
pub mod error;
mod parser;
mod serializer;

pub use error::SnapshotError;
pub use parser::{SnapshotRecord, deserialize};
pub use serializer::serialize;
