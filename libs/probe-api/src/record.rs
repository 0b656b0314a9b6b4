use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Attribute set of a record. Ordered by name so listings and snapshots
/// are stable; key order carries no meaning.
pub type Attributes = BTreeMap<String, String>;

/// Attribute holding the payload media type, used when serving content.
pub const ATTR_MIME_TYPE: &str = "mime.type";

/// Attribute stamped on pulled records with the upstream record id.
pub const ATTR_UPSTREAM_ID: &str = "flowfileIdIn";

// ════════════════════════════════════════════════════════════════
//  RecordId
// ════════════════════════════════════════════════════════════════

/// Stage-scoped record identifier. Allocated by the stage before the
/// record is inserted and never reused for the lifetime of that stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl RecordId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returned when a string is not a base-10 record id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRecordIdError(String);

impl std::fmt::Display for ParseRecordIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid record id '{}'", self.0)
    }
}

impl std::error::Error for ParseRecordIdError {}

impl FromStr for RecordId {
    type Err = ParseRecordIdError;

    /// Base-10 digits only; signs and whitespace are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseRecordIdError(s.to_string()));
        }
        s.parse::<u64>()
            .map(RecordId)
            .map_err(|_| ParseRecordIdError(s.to_string()))
    }
}

// ════════════════════════════════════════════════════════════════
//  FlowRecord
// ════════════════════════════════════════════════════════════════

/// One unit of data held by a stage.
///
/// Identity is the `id` alone: equality, hashing and ordering ignore
/// every other field. The payload is fixed at construction; the route
/// is the only field that changes while the record is held.
#[derive(Clone, Debug)]
pub struct FlowRecord {
    id: RecordId,
    entry_ms: i64,
    attributes: Attributes,
    payload: Option<Vec<u8>>,
    route: Option<String>,
}

impl FlowRecord {
    /// Build a record. `attributes` is taken by value, so later changes to
    /// the caller's map cannot reach the record.
    pub fn new(id: RecordId, entry_ms: i64, attributes: Attributes, payload: Option<Vec<u8>>) -> Self {
        Self {
            id,
            entry_ms,
            attributes,
            payload,
            route: None,
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Creation time in Unix milliseconds.
    pub fn entry_ms(&self) -> i64 {
        self.entry_ms
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Value of the `mime.type` attribute, if any.
    pub fn mime_type(&self) -> Option<&str> {
        self.attribute(ATTR_MIME_TYPE)
    }

    /// Payload bytes; `None` when the record carries no payload at all.
    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    /// `true` when there is no payload (as opposed to an empty one).
    pub fn is_absent(&self) -> bool {
        self.payload.is_none()
    }

    /// Payload length in bytes. Absent payloads count as zero.
    pub fn size(&self) -> u64 {
        self.payload.as_ref().map_or(0, |p| p.len() as u64)
    }

    /// Size for display: `"-"` for an absent payload, otherwise the byte count.
    pub fn size_label(&self) -> String {
        match &self.payload {
            None => "-".to_string(),
            Some(p) => p.len().to_string(),
        }
    }

    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    pub fn is_routed(&self) -> bool {
        self.route.is_some()
    }

    pub fn set_route(&mut self, route: impl Into<String>) {
        self.route = Some(route.into());
    }

    /// Split into attributes and payload, dropping identity and route.
    pub fn into_parts(self) -> (Attributes, Option<Vec<u8>>) {
        (self.attributes, self.payload)
    }
}

impl PartialEq for FlowRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FlowRecord {}

impl Hash for FlowRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for FlowRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FlowRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn equality_and_order_follow_id_only() {
        let a = FlowRecord::new(RecordId(1), 10, attrs(&[("a", "1")]), Some(b"x".to_vec()));
        let mut b = FlowRecord::new(RecordId(1), 99, Attributes::new(), None);
        b.set_route("Outgoing");
        let c = FlowRecord::new(RecordId(2), 0, attrs(&[("a", "1")]), Some(b"x".to_vec()));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a < c);
    }

    #[test]
    fn absent_payload_differs_from_empty() {
        let absent = FlowRecord::new(RecordId(1), 0, Attributes::new(), None);
        let empty = FlowRecord::new(RecordId(2), 0, Attributes::new(), Some(Vec::new()));

        assert!(absent.is_absent());
        assert!(!empty.is_absent());
        assert_eq!(absent.size(), 0);
        assert_eq!(empty.size(), 0);
        assert_eq!(absent.size_label(), "-");
        assert_eq!(empty.size_label(), "0");
    }

    #[test]
    fn attributes_are_owned_copies() {
        let mut source = attrs(&[("k", "v")]);
        let record = FlowRecord::new(RecordId(3), 0, source.clone(), None);
        source.insert("k".into(), "changed".into());
        assert_eq!(record.attribute("k"), Some("v"));
    }

    #[test]
    fn record_id_parses_plain_digits_only() {
        assert_eq!("42".parse::<RecordId>().ok(), Some(RecordId(42)));
        assert!("-1".parse::<RecordId>().is_err());
        assert!("+1".parse::<RecordId>().is_err());
        assert!(" 1".parse::<RecordId>().is_err());
        assert!("".parse::<RecordId>().is_err());
        assert!("abc".parse::<RecordId>().is_err());
        assert!("99999999999999999999999".parse::<RecordId>().is_err());
    }

    #[test]
    fn mime_type_reads_attribute() {
        let record = FlowRecord::new(RecordId(1), 0, attrs(&[(ATTR_MIME_TYPE, "application/json")]), None);
        assert_eq!(record.mime_type(), Some("application/json"));
    }
}
