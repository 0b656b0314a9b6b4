use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::alerts::Alerts;
use crate::config::StageConfig;
use crate::error::StageError;
use crate::queue::StagingQueue;

/// Stages of one service, keyed by stage id.
///
/// Owned by the service and handed to the driver loops and the operator
/// API by reference; nothing about a stage is process-global. Stages share
/// the registry's alert list.
#[derive(Debug)]
pub struct StageRegistry {
    stages: RwLock<BTreeMap<String, Arc<StagingQueue>>>,
    alerts: Arc<Alerts>,
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new(Arc::new(Alerts::default()))
    }
}

impl StageRegistry {
    pub fn new(alerts: Arc<Alerts>) -> Self {
        Self {
            stages: RwLock::new(BTreeMap::new()),
            alerts,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<StagingQueue>>> {
        match self.stages.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("stage registry read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<StagingQueue>>> {
        match self.stages.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("stage registry write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Create a stage and register it, replacing any stage with the same id.
    pub fn register(&self, config: StageConfig) -> Arc<StagingQueue> {
        let stage = Arc::new(StagingQueue::new(config, self.alerts.clone()));
        tracing::info!(
            stage = %stage.id(),
            name = %stage.name(),
            memory_budget = stage.memory_budget(),
            relationships = ?stage.relationships(),
            "registered stage"
        );
        if let Some(previous) = self.write().insert(stage.id().to_string(), stage.clone()) {
            tracing::warn!(stage = %previous.id(), held = previous.total_count(), "replaced stage");
        }
        stage
    }

    /// Remove a stage. Its held records are discarded once the last
    /// reference to it is gone.
    pub fn unregister(&self, id: &str) -> Option<Arc<StagingQueue>> {
        let removed = self.write().remove(id);
        if let Some(stage) = &removed {
            tracing::info!(stage = %id, discarded = stage.total_count(), "unregistered stage");
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<Arc<StagingQueue>> {
        self.read().get(id).cloned()
    }

    pub fn require(&self, id: &str) -> Result<Arc<StagingQueue>, StageError> {
        self.get(id).ok_or_else(|| StageError::StageNotFound(id.to_string()))
    }

    /// All stages ordered by id.
    pub fn stages(&self) -> Vec<Arc<StagingQueue>> {
        self.read().values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    pub fn alerts(&self) -> &Arc<Alerts> {
        &self.alerts
    }
}
