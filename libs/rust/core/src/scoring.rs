//! Regression error metrics and the per-version evaluation record.

use serde::Serialize;

use crate::error::{PromotionError, PromotionResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ModelVersionRef {
    pub name: String,
    pub version: u64,
}

/// Outcome of scoring one model version on the evaluation dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub model_version_ref: ModelVersionRef,
    /// Root-mean-squared error after rounding; lower is better.
    pub metric_value: f64,
    pub mean_absolute_error: f64,
    pub dataset_fingerprint: String,
    pub sample_count: usize,
}

fn check_shapes(predictions: &[f64], targets: &[f64]) -> PromotionResult<()> {
    if targets.is_empty() {
        return Err(PromotionError::scoring("no targets to score against"));
    }
    if predictions.len() != targets.len() {
        return Err(PromotionError::scoring(format!(
            "model returned {} predictions for {} rows",
            predictions.len(),
            targets.len()
        )));
    }
    if let Some(i) = predictions.iter().position(|p| !p.is_finite()) {
        return Err(PromotionError::scoring(format!("non-finite prediction at row {i}")));
    }
    Ok(())
}

pub fn root_mean_squared_error(predictions: &[f64], targets: &[f64]) -> PromotionResult<f64> {
    check_shapes(predictions, targets)?;
    let sse: f64 = predictions.iter().zip(targets).map(|(p, t)| (p - t).powi(2)).sum();
    let rmse = (sse / targets.len() as f64).sqrt();
    if !rmse.is_finite() {
        return Err(PromotionError::scoring("squared error overflowed"));
    }
    Ok(rmse)
}

pub fn mean_absolute_error(predictions: &[f64], targets: &[f64]) -> PromotionResult<f64> {
    check_shapes(predictions, targets)?;
    let sae: f64 = predictions.iter().zip(targets).map(|(p, t)| (p - t).abs()).sum();
    Ok(sae / targets.len() as f64)
}

/// Round half away from zero to `decimals` places. Both sides of a comparison
/// must go through the same call so float noise cannot decide a promotion.
/// Values too large to scale are returned as-is; they carry no fractional
/// digits at that magnitude anyway.
pub fn round_metric(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals.min(15) as i32);
    let scaled = value * scale;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rmse_matches_hand_computation() {
        let rmse = root_mean_squared_error(&[1.0, 2.0, 4.0], &[1.0, 4.0, 1.0]).unwrap();
        assert!((rmse - (13.0f64 / 3.0).sqrt()).abs() < 1e-12);
        let mae = mean_absolute_error(&[1.0, 2.0, 4.0], &[1.0, 4.0, 1.0]).unwrap();
        assert!((mae - 5.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn shape_mismatch_and_nan_are_rejected() {
        assert!(matches!(root_mean_squared_error(&[1.0], &[1.0, 2.0]), Err(PromotionError::Scoring(_))));
        assert!(matches!(root_mean_squared_error(&[f64::NAN], &[1.0]), Err(PromotionError::Scoring(_))));
        assert!(matches!(root_mean_squared_error(&[], &[]), Err(PromotionError::Scoring(_))));
    }

    #[test]
    fn rounding_absorbs_float_noise() {
        let a = round_metric(0.1 + 0.2, 6);
        let b = round_metric(0.3, 6);
        assert_eq!(a, b);
        assert_eq!(round_metric(2.1234565, 3), 2.123);
        assert_eq!(round_metric(2.5, 0), 3.0);
    }

    #[test]
    fn huge_metrics_keep_their_order() {
        let (a, b) = (1e303, 2e303);
        assert_eq!(round_metric(a, 6), a);
        assert!(round_metric(a, 6) < round_metric(b, 6));
        assert!(round_metric(f64::MAX, 15).is_finite());
        assert!(matches!(root_mean_squared_error(&[1e200, -1e200], &[-1e200, 1e200]), Err(PromotionError::Scoring(_))));
    }
}
