//! Versioned model registry contract.
//!
//! Versions move through `None -> Staging -> {Production, Archived}` and
//! `Production -> Archived`. Nothing leaves `Archived`.

mod memory;
mod mlflow;

pub use memory::{InMemoryRegistry, StageTransition};
pub use mlflow::MlflowRegistry;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelStage { None, Staging, Production, Archived }

impl ModelStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStage::None => "None",
            ModelStage::Staging => "Staging",
            ModelStage::Production => "Production",
            ModelStage::Archived => "Archived",
        }
    }

    /// Whether the lifecycle allows moving from `self` to `target`.
    pub fn can_transition_to(&self, target: ModelStage) -> bool {
        matches!(
            (self, target),
            (ModelStage::None, ModelStage::Staging)
                | (ModelStage::None, ModelStage::Archived)
                | (ModelStage::Staging, ModelStage::Production)
                | (ModelStage::Staging, ModelStage::Archived)
                | (ModelStage::Production, ModelStage::Archived)
        )
    }
}

impl fmt::Display for ModelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ModelStage {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(ModelStage::None),
            "staging" => Ok(ModelStage::Staging),
            "production" => Ok(ModelStage::Production),
            "archived" => Ok(ModelStage::Archived),
            other => Err(RegistryError::rejected(format!("unknown stage '{other}'"))),
        }
    }
}

/// One registered artifact of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    pub version: u64,
    pub stage: ModelStage,
    pub artifact_location: String,
}

/// Capability consumed by the promotion engine.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn get_latest_version(&self, model_name: &str, stage: ModelStage) -> Result<Option<ModelVersion>, RegistryError>;

    /// Move `version` to `new_stage`. With `archive_existing`, every other
    /// version currently in `new_stage` is archived in the same operation.
    async fn transition_stage(
        &self,
        model_name: &str,
        version: u64,
        new_stage: ModelStage,
        archive_existing: bool,
    ) -> Result<(), RegistryError>;
}
