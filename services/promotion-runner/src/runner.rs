//! Wiring of the engine from configuration and the caller-side retry policy.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use eta_core::{
    EvaluationDataset, LocalArtifactStore, MlflowRegistry, PromotionConfig, PromotionDecision, PromotionEngine, PromotionError,
    RoutingArtifactStore, ServedArtifactStore,
};
use eta_resilience::{retry_async, RetryConfig};

pub fn build_engine(cfg: &PromotionConfig) -> Result<PromotionEngine> {
    let registry = MlflowRegistry::new(&cfg.tracking_uri, cfg.registry_timeout()).context("building registry client")?;
    let artifacts = RoutingArtifactStore::new(
        LocalArtifactStore::new(&cfg.artifact_root),
        ServedArtifactStore::new(cfg.artifact_timeout()).context("building scoring client")?,
    );
    info!(tracking_uri = %cfg.tracking_uri, artifact_root = %cfg.artifact_root.display(), "promotion engine configured");
    Ok(PromotionEngine::new(Arc::new(registry), Arc::new(artifacts), cfg.engine_config()))
}

/// Load the dataset once, then run the evaluation, retrying whole evaluations
/// that failed for transient reasons.
pub async fn evaluate_with_retry(engine: &PromotionEngine, cfg: &PromotionConfig) -> Result<PromotionDecision> {
    let dataset = EvaluationDataset::load(&cfg.dataset)
        .await
        .with_context(|| format!("loading evaluation dataset {}", cfg.dataset))?;
    let decision = evaluate(engine, &cfg.model_name, &dataset, &cfg.retry_config())
        .await
        .with_context(|| format!("evaluating {}", cfg.model_name))?;
    Ok(decision)
}

pub async fn evaluate(
    engine: &PromotionEngine,
    model_name: &str,
    dataset: &EvaluationDataset,
    retry: &RetryConfig,
) -> Result<PromotionDecision, PromotionError> {
    retry_async(retry, PromotionError::is_retryable, move |attempt| {
        if attempt > 0 {
            info!(attempt = attempt + 1, model = model_name, "re-running promotion evaluation");
        }
        engine.evaluate_and_promote(model_name, dataset)
    })
    .await
}
