//! Post-deployment smoke test: one CSV row in, one finite prediction out.

use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::dataset::FeatureRow;

/// Sample order used by the deployment pipeline's endpoint check.
pub const SAMPLE_ROW: FeatureRow = [500.0, 1000.0, 29.99, 8.50, 14.0, 2.0, 6.0];

#[derive(Debug, Error)]
pub enum SmokeTestError {
    #[error("endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected endpoint response: {0}")]
    BadResponse(String),
}

pub fn csv_line(row: &FeatureRow) -> String {
    row.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",")
}

fn parse_prediction(body: &str) -> Option<f64> {
    let trimmed = body.trim();
    if let Ok(v) = trimmed.parse::<f64>() {
        return Some(v);
    }
    let json: Value = serde_json::from_str(trimmed).ok()?;
    let first = match &json {
        Value::Array(a) => a.first()?,
        Value::Object(o) => o.get("predictions")?.as_array()?.first()?,
        other => other,
    };
    first.as_f64().or_else(|| first.as_array()?.first()?.as_f64())
}

/// Invoke `endpoint_url` with `row` as `text/csv` and return the prediction.
pub async fn smoke_test(client: &reqwest::Client, endpoint_url: &str, row: &FeatureRow) -> Result<f64, SmokeTestError> {
    let body = csv_line(row);
    info!(endpoint = endpoint_url, input = %body, "invoking endpoint");
    let resp = client
        .post(endpoint_url)
        .header(reqwest::header::CONTENT_TYPE, "text/csv")
        .body(body)
        .send()
        .await?;
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        return Err(SmokeTestError::Status { status: status.as_u16(), body: text });
    }
    let prediction = parse_prediction(&text).ok_or_else(|| SmokeTestError::BadResponse(text.clone()))?;
    if !prediction.is_finite() {
        return Err(SmokeTestError::BadResponse(text));
    }
    info!(endpoint = endpoint_url, prediction, "endpoint answered");
    Ok(prediction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_row_is_rendered_in_feature_order() {
        assert_eq!(csv_line(&SAMPLE_ROW), "500,1000,29.99,8.5,14,2,6");
    }

    #[test]
    fn accepts_plain_and_json_bodies() {
        assert_eq!(parse_prediction("7.25\n"), Some(7.25));
        assert_eq!(parse_prediction(r#"{"predictions":[3.5]}"#), Some(3.5));
        assert_eq!(parse_prediction("[[4.0]]"), Some(4.0));
        assert_eq!(parse_prediction("<html>"), None);
    }
}
