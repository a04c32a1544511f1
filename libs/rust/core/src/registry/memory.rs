//! In-process registry. All versions of all models sit behind one lock, so a
//! promotion and the archival it triggers are observed together.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use super::{ModelStage, ModelVersion, Registry};
use crate::error::RegistryError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageTransition {
    pub model_name: String,
    pub version: u64,
    pub from: ModelStage,
    pub to: ModelStage,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    models: HashMap<String, Vec<ModelVersion>>, // kept sorted by version
    history: Vec<StageTransition>,
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self { Self::default() }

    /// Register a new version in stage `None` with the next version number.
    pub fn register_version(&self, name: &str, artifact_location: &str) -> ModelVersion {
        let mut inner = self.inner.lock();
        let versions = inner.models.entry(name.to_string()).or_default();
        let version = versions.last().map_or(1, |v| v.version + 1);
        let mv = ModelVersion { name: name.to_string(), version, stage: ModelStage::None, artifact_location: artifact_location.to_string() };
        versions.push(mv.clone());
        debug!(model = name, version, "registered model version");
        mv
    }

    pub fn versions(&self, name: &str) -> Vec<ModelVersion> {
        self.inner.lock().models.get(name).cloned().unwrap_or_default()
    }

    pub fn version(&self, name: &str, version: u64) -> Option<ModelVersion> {
        self.inner.lock().models.get(name)?.iter().find(|v| v.version == version).cloned()
    }

    pub fn transition_history(&self, name: &str) -> Vec<StageTransition> {
        self.inner.lock().history.iter().filter(|t| t.model_name == name).cloned().collect()
    }

    fn apply(&self, name: &str, version: u64, to: ModelStage, archive_existing: bool) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        let Inner { models, history } = &mut *inner;
        let not_found = || RegistryError::VersionNotFound { name: name.to_string(), version };
        let versions = models.get_mut(name).ok_or_else(not_found)?;
        let idx = versions.iter().position(|v| v.version == version).ok_or_else(not_found)?;

        let from = versions[idx].stage;
        if !from.can_transition_to(to) {
            return Err(RegistryError::InvalidTransition { from, to });
        }

        let now = Utc::now();
        if archive_existing {
            for other in versions.iter_mut().filter(|v| v.version != version && v.stage == to && v.stage.can_transition_to(ModelStage::Archived)) {
                history.push(StageTransition { model_name: name.to_string(), version: other.version, from: other.stage, to: ModelStage::Archived, at: now });
                other.stage = ModelStage::Archived;
            }
        }
        versions[idx].stage = to;
        history.push(StageTransition { model_name: name.to_string(), version, from, to, at: now });
        Ok(())
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn get_latest_version(&self, model_name: &str, stage: ModelStage) -> Result<Option<ModelVersion>, RegistryError> {
        Ok(self
            .inner
            .lock()
            .models
            .get(model_name)
            .and_then(|vs| vs.iter().filter(|v| v.stage == stage).max_by_key(|v| v.version).cloned()))
    }

    async fn transition_stage(&self, model_name: &str, version: u64, new_stage: ModelStage, archive_existing: bool) -> Result<(), RegistryError> {
        self.apply(model_name, version, new_stage, archive_existing)
    }
}
