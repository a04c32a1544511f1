//! Candidate-vs-incumbent promotion decision.
//!
//! The latest `Staging` version (candidate) and the latest `Production`
//! version (incumbent) are scored on the same held-out dataset. The candidate
//! replaces the incumbent only when its RMSE is strictly lower; with no
//! incumbent it is promoted outright. The only side effect is at most one
//! stage-transition call on the registry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

use eta_resilience::with_timeout;

use crate::artifacts::ArtifactStore;
use crate::dataset::EvaluationDataset;
use crate::error::{PromotionError, PromotionResult, RegistryError};
use crate::registry::{ModelStage, ModelVersion, Registry};
use crate::scoring::{mean_absolute_error, root_mean_squared_error, round_metric, EvaluationResult, ModelVersionRef};
use crate::telemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Promote,
    KeepIncumbent,
    PromoteNoIncumbent,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Promote => "promote",
            Outcome::KeepIncumbent => "keep_incumbent",
            Outcome::PromoteNoIncumbent => "promote_no_incumbent",
        }
    }

    pub fn promotes(&self) -> bool { !matches!(self, Outcome::KeepIncumbent) }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromotionDecision {
    pub model_name: String,
    pub candidate_version: u64,
    pub incumbent_version: Option<u64>,
    pub candidate_metric: f64,
    pub incumbent_metric: Option<f64>,
    pub dataset_fingerprint: String,
    pub outcome: Outcome,
}

impl PromotionDecision {
    /// Apply the strict-improvement rule. Ties keep the incumbent.
    pub fn decide(candidate: &EvaluationResult, incumbent: Option<&EvaluationResult>) -> Self {
        let outcome = match incumbent {
            None => Outcome::PromoteNoIncumbent,
            Some(inc) if candidate.metric_value < inc.metric_value => Outcome::Promote,
            Some(_) => Outcome::KeepIncumbent,
        };
        Self {
            model_name: candidate.model_version_ref.name.clone(),
            candidate_version: candidate.model_version_ref.version,
            incumbent_version: incumbent.map(|i| i.model_version_ref.version),
            candidate_metric: candidate.metric_value,
            incumbent_metric: incumbent.map(|i| i.metric_value),
            dataset_fingerprint: candidate.dataset_fingerprint.clone(),
            outcome,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Decimal places kept on RMSE before comparing.
    pub metric_precision: u32,
    pub registry_timeout: Duration,
    /// Bound on loading one artifact and on one predict call.
    pub artifact_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { metric_precision: 6, registry_timeout: Duration::from_secs(10), artifact_timeout: Duration::from_secs(60) }
    }
}

pub struct PromotionEngine {
    registry: Arc<dyn Registry>,
    artifacts: Arc<dyn ArtifactStore>,
    cfg: EngineConfig,
}

impl PromotionEngine {
    pub fn new(registry: Arc<dyn Registry>, artifacts: Arc<dyn ArtifactStore>, cfg: EngineConfig) -> Self {
        Self { registry, artifacts, cfg }
    }

    pub async fn evaluate_and_promote(&self, model_name: &str, dataset: &EvaluationDataset) -> PromotionResult<PromotionDecision> {
        let span = info_span!("evaluate_and_promote", model = model_name, rows = dataset.len(), fingerprint = dataset.fingerprint());
        let started = Instant::now();
        let res = self.run(model_name, dataset).instrument(span.clone()).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        span.in_scope(|| match &res {
            Ok(d) => {
                telemetry::record_decision(d.outcome, d.candidate_metric, latency_ms);
                info!(
                    outcome = d.outcome.as_str(),
                    candidate_version = d.candidate_version,
                    candidate_rmse = d.candidate_metric,
                    incumbent_version = ?d.incumbent_version,
                    incumbent_rmse = ?d.incumbent_metric,
                    latency_ms,
                    "promotion decision made"
                );
            }
            Err(e) => {
                telemetry::record_failure(e, latency_ms);
                warn!(error = %e, kind = e.kind(), retryable = e.is_retryable(), "promotion evaluation failed");
            }
        });
        res
    }

    async fn run(&self, model_name: &str, dataset: &EvaluationDataset) -> PromotionResult<PromotionDecision> {
        let candidate = self
            .latest(model_name, ModelStage::Staging)
            .await?
            .ok_or_else(|| PromotionError::NoCandidate { model_name: model_name.to_string() })?;
        let incumbent = self.latest(model_name, ModelStage::Production).await?;
        if incumbent.is_none() {
            info!(candidate_version = candidate.version, "no Production version, first deployment");
        }

        let candidate_eval = self.evaluate(&candidate, dataset).await?;
        let incumbent_eval = match &incumbent {
            Some(inc) => Some(self.evaluate(inc, dataset).await?),
            None => None,
        };

        let decision = PromotionDecision::decide(&candidate_eval, incumbent_eval.as_ref());
        if decision.outcome.promotes() {
            self.promote(&candidate).await?;
        }
        Ok(decision)
    }

    async fn latest(&self, model_name: &str, stage: ModelStage) -> PromotionResult<Option<ModelVersion>> {
        let limit = self.cfg.registry_timeout;
        let found = with_timeout(limit, self.registry.get_latest_version(model_name, stage))
            .await
            .map_err(|_| RegistryError::Timeout(limit))??;
        Ok(found)
    }

    /// Candidate to `Production`, archiving whatever held it, in one registry write.
    async fn promote(&self, candidate: &ModelVersion) -> PromotionResult<()> {
        let limit = self.cfg.registry_timeout;
        with_timeout(limit, self.registry.transition_stage(&candidate.name, candidate.version, ModelStage::Production, true))
            .await
            .map_err(|_| RegistryError::Timeout(limit))??;
        Ok(())
    }

    async fn evaluate(&self, mv: &ModelVersion, dataset: &EvaluationDataset) -> PromotionResult<EvaluationResult> {
        let limit = self.cfg.artifact_timeout;
        let location = mv.artifact_location.as_str();
        let model = with_timeout(limit, self.artifacts.load_model(location))
            .await
            .map_err(|e| PromotionError::artifact_load(location, e))??;
        let predictions = with_timeout(limit, model.predict(dataset.features()))
            .await
            .map_err(|e| PromotionError::artifact_load(location, e))??;

        let rmse = root_mean_squared_error(&predictions, dataset.targets())?;
        let mae = mean_absolute_error(&predictions, dataset.targets())?;
        let precision = self.cfg.metric_precision;
        Ok(EvaluationResult {
            model_version_ref: ModelVersionRef { name: mv.name.clone(), version: mv.version },
            metric_value: round_metric(rmse, precision),
            mean_absolute_error: round_metric(mae, precision),
            dataset_fingerprint: dataset.fingerprint().to_string(),
            sample_count: dataset.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(version: u64, rmse: f64) -> EvaluationResult {
        EvaluationResult {
            model_version_ref: ModelVersionRef { name: "delivery-eta-model".into(), version },
            metric_value: rmse,
            mean_absolute_error: rmse,
            dataset_fingerprint: "fp".into(),
            sample_count: 10,
        }
    }

    #[test]
    fn strictly_better_candidate_is_promoted() {
        let d = PromotionDecision::decide(&eval(2, 2.10), Some(&eval(1, 2.50)));
        assert_eq!(d.outcome, Outcome::Promote);
        assert_eq!(d.incumbent_version, Some(1));
        assert_eq!(d.incumbent_metric, Some(2.50));
    }

    #[test]
    fn worse_or_equal_candidate_keeps_incumbent() {
        assert_eq!(PromotionDecision::decide(&eval(2, 2.50), Some(&eval(1, 2.10))).outcome, Outcome::KeepIncumbent);
        assert_eq!(PromotionDecision::decide(&eval(2, 2.50), Some(&eval(1, 2.50))).outcome, Outcome::KeepIncumbent);
    }

    #[test]
    fn missing_incumbent_promotes_without_comparison() {
        let d = PromotionDecision::decide(&eval(1, 9.0), None);
        assert_eq!(d.outcome, Outcome::PromoteNoIncumbent);
        assert!(d.incumbent_metric.is_none() && d.incumbent_version.is_none());
    }

    #[test]
    fn decision_serializes_with_snake_case_outcome() {
        let d = PromotionDecision::decide(&eval(2, 2.5), Some(&eval(1, 2.5)));
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["outcome"], "keep_incumbent");
        assert_eq!(v["candidate_version"], 2);
    }
}
