//! Model artifact resolution and scorable model handles.
//!
//! Two kinds of artifact are understood:
//! - local JSON linear models (`{"intercept": .., "coefficients": [..]}`)
//! - served models behind an MLflow-style scoring server (`/ping`, `/invocations`)

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::dataset::{FeatureMatrix, FEATURE_COUNT};
use crate::error::{PromotionError, PromotionResult};

/// A loaded model that can produce one prediction per feature row.
#[async_trait]
pub trait ScorableModel: Send + Sync {
    async fn predict(&self, features: &FeatureMatrix) -> PromotionResult<Vec<f64>>;
}

/// Resolves an artifact location into a scorable handle.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn load_model(&self, artifact_location: &str) -> PromotionResult<Box<dyn ScorableModel>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl LinearModel {
    fn validate(&self) -> Result<(), String> {
        if self.coefficients.len() != FEATURE_COUNT {
            return Err(format!("expected {FEATURE_COUNT} coefficients, found {}", self.coefficients.len()));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err("non-finite model parameter".to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl ScorableModel for LinearModel {
    async fn predict(&self, features: &FeatureMatrix) -> PromotionResult<Vec<f64>> {
        if self.coefficients.len() != FEATURE_COUNT {
            return Err(PromotionError::scoring(format!(
                "model expects {} features, dataset has {FEATURE_COUNT}",
                self.coefficients.len()
            )));
        }
        Ok(features
            .rows()
            .iter()
            .map(|row| self.intercept + row.iter().zip(&self.coefficients).map(|(x, w)| x * w).sum::<f64>())
            .collect())
    }
}

/// Local filesystem store for JSON linear models.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    fn resolve(&self, artifact_location: &str) -> PathBuf {
        let raw = artifact_location.strip_prefix("file://").unwrap_or(artifact_location);
        let path = Path::new(raw);
        if path.is_absolute() { path.to_path_buf() } else { self.root.join(path) }
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn load_model(&self, artifact_location: &str) -> PromotionResult<Box<dyn ScorableModel>> {
        let mut path = self.resolve(artifact_location);
        if tokio::fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
            path.push("model.json");
        }
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| PromotionError::artifact_load(artifact_location, format!("{}: {e}", path.display())))?;
        let model: LinearModel = serde_json::from_str(&text).map_err(|e| PromotionError::artifact_load(artifact_location, e))?;
        model.validate().map_err(|e| PromotionError::artifact_load(artifact_location, e))?;
        debug!(location = artifact_location, path = %path.display(), "loaded linear model");
        Ok(Box::new(model))
    }
}

/// Store for models served over HTTP by a scoring server.
#[derive(Debug, Clone)]
pub struct ServedArtifactStore {
    http: reqwest::Client,
}

impl ServedArtifactStore {
    pub fn new(request_timeout: Duration) -> PromotionResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| PromotionError::artifact_load("<http client>", e))?;
        Ok(Self::with_client(http))
    }

    pub fn with_client(http: reqwest::Client) -> Self { Self { http } }
}

#[async_trait]
impl ArtifactStore for ServedArtifactStore {
    async fn load_model(&self, artifact_location: &str) -> PromotionResult<Box<dyn ScorableModel>> {
        let base = artifact_location.trim_end_matches('/').to_string();
        let resp = self
            .http
            .get(format!("{base}/ping"))
            .send()
            .await
            .map_err(|e| PromotionError::artifact_load(artifact_location, e))?;
        if !resp.status().is_success() {
            return Err(PromotionError::artifact_load(artifact_location, format!("health check returned {}", resp.status())));
        }
        Ok(Box::new(ServedModel { base, http: self.http.clone() }))
    }
}

#[derive(Debug)]
struct ServedModel {
    base: String,
    http: reqwest::Client,
}

fn parse_predictions(body: &Value) -> Option<Vec<f64>> {
    let arr = match body {
        Value::Array(a) => a,
        Value::Object(o) => o.get("predictions")?.as_array()?,
        _ => return None,
    };
    arr.iter()
        .map(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::Array(inner) if inner.len() == 1 => inner[0].as_f64(),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl ScorableModel for ServedModel {
    async fn predict(&self, features: &FeatureMatrix) -> PromotionResult<Vec<f64>> {
        let payload = json!({
            "dataframe_split": {
                "columns": features.columns(),
                "data": features.rows(),
            }
        });
        let resp = self
            .http
            .post(format!("{}/invocations", self.base))
            .json(&payload)
            .send()
            .await
            .map_err(|e| PromotionError::artifact_load(&self.base, e))?;
        let status = resp.status();
        if status.is_server_error() {
            return Err(PromotionError::artifact_load(&self.base, format!("scoring server returned {status}")));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(PromotionError::scoring(format!("scoring server rejected input ({status}): {text}")));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| PromotionError::scoring(format!("unreadable scoring response: {e}")))?;
        parse_predictions(&body).ok_or_else(|| PromotionError::scoring("scoring response has no numeric predictions"))
    }
}

/// Dispatches `http(s)://` locations to the served store and plain paths or
/// `file://` locations to the local store. Any other scheme (`s3://`,
/// `runs:/`, `models:/`, ...) is refused.
pub struct RoutingArtifactStore {
    local: LocalArtifactStore,
    served: ServedArtifactStore,
}

impl RoutingArtifactStore {
    pub fn new(local: LocalArtifactStore, served: ServedArtifactStore) -> Self { Self { local, served } }
}

#[async_trait]
impl ArtifactStore for RoutingArtifactStore {
    async fn load_model(&self, artifact_location: &str) -> PromotionResult<Box<dyn ScorableModel>> {
        match location_scheme(artifact_location) {
            Some("http" | "https") => self.served.load_model(artifact_location).await,
            None | Some("file") => self.local.load_model(artifact_location).await,
            Some(scheme) => Err(PromotionError::UnsupportedArtifact {
                location: artifact_location.to_string(),
                scheme: scheme.to_string(),
            }),
        }
    }
}

/// URI scheme of an artifact location, if it has one. Single letters are
/// treated as drive prefixes, not schemes.
fn location_scheme(location: &str) -> Option<&str> {
    let (scheme, _) = location.split_once(':')?;
    let valid = scheme.len() > 1
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::EvaluationDataset;

    fn dataset() -> EvaluationDataset {
        EvaluationDataset::new(vec![[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0], [0.0; FEATURE_COUNT]], vec![10.0, 1.0]).unwrap()
    }

    #[tokio::test]
    async fn linear_model_predicts_dot_product() {
        let m = LinearModel { intercept: 1.0, coefficients: vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0] };
        let preds = m.predict(dataset().features()).await.unwrap();
        assert_eq!(preds, vec![9.0, 1.0]);
    }

    #[tokio::test]
    async fn local_store_resolves_directories_and_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().join("models/3");
        std::fs::create_dir_all(&model_dir).unwrap();
        let m = LinearModel { intercept: 0.5, coefficients: vec![0.0; FEATURE_COUNT] };
        std::fs::write(model_dir.join("model.json"), serde_json::to_string(&m).unwrap()).unwrap();

        let store = LocalArtifactStore::new(dir.path());
        let by_relative = store.load_model("models/3").await.unwrap();
        assert_eq!(by_relative.predict(dataset().features()).await.unwrap(), vec![0.5, 0.5]);

        let url = format!("file://{}", model_dir.join("model.json").display());
        assert!(store.load_model(&url).await.is_ok());
    }

    #[tokio::test]
    async fn local_store_reports_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("short.json"), r#"{"intercept":0.0,"coefficients":[1.0,2.0]}"#).unwrap();
        std::fs::write(dir.path().join("garbage.json"), "not json").unwrap();
        let store = LocalArtifactStore::new(dir.path());
        for loc in ["short.json", "garbage.json", "missing.json"] {
            let err = store.load_model(loc).await.err().unwrap();
            assert!(matches!(err, PromotionError::ArtifactLoad { ref location, .. } if location == loc), "{loc}: {err}");
        }
    }

    #[test]
    fn prediction_payload_shapes() {
        assert_eq!(parse_predictions(&json!({"predictions": [1.5, 2.0]})), Some(vec![1.5, 2.0]));
        assert_eq!(parse_predictions(&json!([[3.0], [4.0]])), Some(vec![3.0, 4.0]));
        assert_eq!(parse_predictions(&json!({"predictions": ["x"]})), None);
        assert_eq!(parse_predictions(&json!("oops")), None);
    }

    #[test]
    fn location_schemes() {
        assert_eq!(location_scheme("https://models/ping"), Some("https"));
        assert_eq!(location_scheme("s3://bucket/1/model"), Some("s3"));
        assert_eq!(location_scheme("runs:/abc123/model"), Some("runs"));
        assert_eq!(location_scheme("models/3"), None);
        assert_eq!(location_scheme("/abs/model.json"), None);
        assert_eq!(location_scheme("C:/models/model.json"), None);
    }

    #[tokio::test]
    async fn routing_refuses_unsupported_schemes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model.json"), r#"{"intercept":1.0,"coefficients":[0,0,0,0,0,0,0]}"#).unwrap();
        let store = RoutingArtifactStore::new(
            LocalArtifactStore::new(dir.path()),
            ServedArtifactStore::new(Duration::from_secs(1)).unwrap(),
        );

        for loc in ["s3://artifacts/3/model", "models:/delivery-eta-model/3", "runs:/abc/model"] {
            let err = store.load_model(loc).await.err().unwrap();
            assert!(matches!(err, PromotionError::UnsupportedArtifact { ref location, .. } if location == loc), "{err}");
            assert!(!err.is_retryable());
        }
        assert!(store.load_model("model.json").await.is_ok());
    }
}
