use serde::Deserialize;

/// Relationship configured when a stage lists none.
pub const DEFAULT_RELATIONSHIP: &str = "Outgoing";

/// Per-stage settings, fixed for the lifetime of the stage.
#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    /// Stage identifier, unique within a registry.
    pub id: String,
    /// Display name; the id is shown when unset.
    #[serde(default)]
    pub name: Option<String>,
    /// Upper bound on the summed payload size of held records, in bytes.
    #[serde(default = "default_memory_budget")]
    pub memory_budget: u64,
    /// Valid route labels for held records.
    #[serde(default = "default_relationships")]
    pub relationships: Vec<String>,
}

fn default_memory_budget() -> u64 {
    1024 * 1024
}

fn default_relationships() -> Vec<String> {
    vec![DEFAULT_RELATIONSHIP.to_string()]
}

impl StageConfig {
    pub fn new(id: impl Into<String>, memory_budget: u64) -> Self {
        Self {
            id: id.into(),
            name: None,
            memory_budget,
            relationships: default_relationships(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_relationships<I, S>(mut self, relationships: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relationships = relationships.into_iter().map(Into::into).collect();
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}
