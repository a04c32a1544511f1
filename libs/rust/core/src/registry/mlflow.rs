//! REST client for an MLflow tracking server's model registry.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::{ModelStage, ModelVersion, Registry};
use crate::error::RegistryError;

const LATEST_VERSIONS_PATH: &str = "api/2.0/mlflow/registered-models/get-latest-versions";
const TRANSITION_STAGE_PATH: &str = "api/2.0/mlflow/model-versions/transition-stage";
const RESOURCE_DOES_NOT_EXIST: &str = "RESOURCE_DOES_NOT_EXIST";

#[derive(Debug, Clone)]
pub struct MlflowRegistry {
    base: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct LatestVersionsResponse {
    #[serde(default)]
    model_versions: Vec<MlflowModelVersion>,
}

#[derive(Debug, Deserialize)]
struct MlflowModelVersion {
    name: String,
    version: String,
    #[serde(default)]
    current_stage: String,
    #[serde(default)]
    source: String,
}

#[derive(Debug, Default, Deserialize)]
struct MlflowErrorBody {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct TransitionRequest<'a> {
    name: &'a str,
    version: String,
    stage: &'a str,
    archive_existing_versions: bool,
}

impl MlflowRegistry {
    /// `tracking_uri` is the server root, e.g. `http://mlflow:5000/`.
    pub fn new(tracking_uri: &str, request_timeout: Duration) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RegistryError::unavailable(format!("http client: {e}")))?;
        Ok(Self::with_client(tracking_uri, http))
    }

    pub fn with_client(tracking_uri: &str, http: reqwest::Client) -> Self {
        Self { base: tracking_uri.trim_end_matches('/').to_string(), http }
    }

    fn url(&self, path: &str) -> String { format!("{}/{}", self.base, path) }

    fn transport_error(e: reqwest::Error) -> RegistryError {
        if e.is_timeout() {
            RegistryError::unavailable(format!("request timed out: {e}"))
        } else {
            RegistryError::unavailable(e.to_string())
        }
    }

    async fn error_from_response(resp: reqwest::Response) -> RegistryError {
        let status = resp.status();
        let body: MlflowErrorBody = resp.json().await.unwrap_or_default();
        Self::classify(status, &body)
    }

    fn classify(status: StatusCode, body: &MlflowErrorBody) -> RegistryError {
        let msg = if body.message.is_empty() { status.to_string() } else { format!("{} ({})", body.message, body.error_code) };
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            RegistryError::unavailable(format!("{status}: {msg}"))
        } else {
            RegistryError::rejected(format!("{status}: {msg}"))
        }
    }
}

#[async_trait]
impl Registry for MlflowRegistry {
    async fn get_latest_version(&self, model_name: &str, stage: ModelStage) -> Result<Option<ModelVersion>, RegistryError> {
        let resp = self
            .http
            .post(self.url(LATEST_VERSIONS_PATH))
            .json(&json!({ "name": model_name, "stages": [stage.as_str()] }))
            .send()
            .await
            .map_err(Self::transport_error)?;

        if resp.status() == StatusCode::NOT_FOUND {
            let status = resp.status();
            let body: MlflowErrorBody = resp.json().await.unwrap_or_default();
            if body.error_code == RESOURCE_DOES_NOT_EXIST {
                debug!(model = model_name, "model not registered");
                return Ok(None);
            }
            return Err(Self::classify(status, &body));
        }
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }

        let body: LatestVersionsResponse = resp
            .json()
            .await
            .map_err(|e| RegistryError::unavailable(format!("malformed registry response: {e}")))?;

        let mut latest: Option<ModelVersion> = None;
        for mv in body.model_versions {
            let version: u64 = mv
                .version
                .parse()
                .map_err(|_| RegistryError::rejected(format!("non-numeric version '{}'", mv.version)))?;
            let current: ModelStage = mv.current_stage.parse()?;
            if current != stage { continue; }
            if latest.as_ref().map_or(true, |l| version > l.version) {
                latest = Some(ModelVersion { name: mv.name, version, stage: current, artifact_location: mv.source });
            }
        }
        Ok(latest)
    }

    async fn transition_stage(&self, model_name: &str, version: u64, new_stage: ModelStage, archive_existing: bool) -> Result<(), RegistryError> {
        let req = TransitionRequest { name: model_name, version: version.to_string(), stage: new_stage.as_str(), archive_existing_versions: archive_existing };
        let resp = self
            .http
            .post(self.url(TRANSITION_STAGE_PATH))
            .json(&req)
            .send()
            .await
            .map_err(Self::transport_error)?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }
        info!(model = model_name, version, stage = %new_stage, archive_existing, "stage transition applied");
        Ok(())
    }
}
