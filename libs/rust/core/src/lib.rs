//! Core of the delivery-ETA model promotion workflow.

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Install the global subscriber once. `RUST_LOG` wins over `default_level`;
/// `json` switches to flattened JSON lines.
pub fn init_tracing(service: &str, default_level: &str, json: bool) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
        let json_layer = json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
        });
        let text_layer = (!json).then(|| {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(true)
        });
        tracing_subscriber::registry().with(env_filter).with(json_layer).with(text_layer).try_init()?;
        Ok(())
    })?;
    info!(target: "eta_core", service, "tracing initialized");
    Ok(())
}

pub mod artifacts;
pub mod config;
pub mod dataset;
pub mod error;
pub mod promotion;
pub mod registry;
pub mod scoring;
pub mod smoke;
pub mod telemetry;

pub use artifacts::{ArtifactStore, LinearModel, LocalArtifactStore, RoutingArtifactStore, ScorableModel, ServedArtifactStore};
pub use config::{load_config, PromotionConfig};
pub use dataset::{EvaluationDataset, FeatureMatrix, FeatureRow, FEATURE_COLUMNS, TARGET_COLUMN};
pub use error::{PromotionError, PromotionResult, RegistryError};
pub use promotion::{EngineConfig, Outcome, PromotionDecision, PromotionEngine};
pub use registry::{InMemoryRegistry, MlflowRegistry, ModelStage, ModelVersion, Registry, StageTransition};
pub use scoring::{EvaluationResult, ModelVersionRef};
pub use smoke::{smoke_test, SmokeTestError, SAMPLE_ROW};
