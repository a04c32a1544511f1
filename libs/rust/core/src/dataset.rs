//! Held-out evaluation dataset with the fixed delivery-ETA schema.

use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{PromotionError, PromotionResult};

pub const FEATURE_COUNT: usize = 7;

/// Feature columns in the order models expect them.
pub const FEATURE_COLUMNS: [&str; FEATURE_COUNT] = [
    "product_weight_g",
    "product_volume_cm3",
    "price",
    "freight_value",
    "purchase_hour",
    "purchase_day_of_week",
    "purchase_month",
];

pub const TARGET_COLUMN: &str = "delivery_duration_days";

pub type FeatureRow = [f64; FEATURE_COUNT];

/// Row-major feature matrix in [`FEATURE_COLUMNS`] order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureMatrix {
    rows: Vec<FeatureRow>,
}

impl FeatureMatrix {
    pub fn rows(&self) -> &[FeatureRow] { &self.rows }
    pub fn len(&self) -> usize { self.rows.len() }
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }
    pub fn columns(&self) -> &'static [&'static str] { &FEATURE_COLUMNS }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationDataset {
    features: FeatureMatrix,
    targets: Vec<f64>,
    fingerprint: String,
}

impl EvaluationDataset {
    pub fn new(rows: Vec<FeatureRow>, targets: Vec<f64>) -> PromotionResult<Self> {
        if rows.is_empty() {
            return Err(PromotionError::scoring("evaluation dataset is empty"));
        }
        if rows.len() != targets.len() {
            return Err(PromotionError::scoring(format!("{} feature rows but {} targets", rows.len(), targets.len())));
        }
        if let Some(i) = rows.iter().position(|r| r.iter().any(|v| !v.is_finite())) {
            return Err(PromotionError::scoring(format!("non-finite feature value in row {i}")));
        }
        if let Some(i) = targets.iter().position(|v| !v.is_finite()) {
            return Err(PromotionError::scoring(format!("non-finite target value in row {i}")));
        }
        let fingerprint = fingerprint(&rows, &targets);
        Ok(Self { features: FeatureMatrix { rows }, targets, fingerprint })
    }

    /// Parse a headed CSV. Columns are located by name; extra columns are ignored.
    /// Quoted fields may contain commas; every record must have as many fields
    /// as the header.
    pub fn from_csv_str(text: &str) -> PromotionResult<Self> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(text.as_bytes());
        let header = reader
            .headers()
            .map_err(|e| PromotionError::scoring(format!("unreadable header: {e}")))?
            .clone();

        let index_of = |col: &str| {
            header
                .iter()
                .position(|h| h == col)
                .ok_or_else(|| PromotionError::scoring(format!("missing column '{col}'")))
        };
        let mut feature_idx = [0usize; FEATURE_COUNT];
        for (slot, col) in feature_idx.iter_mut().zip(FEATURE_COLUMNS) {
            *slot = index_of(col)?;
        }
        let target_idx = index_of(TARGET_COLUMN)?;

        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for (n, record) in reader.records().enumerate() {
            let record = record.map_err(|e| PromotionError::scoring(format!("row {}: {e}", n + 1)))?;
            let cell = |idx: usize, col: &str| -> PromotionResult<f64> {
                let raw = record
                    .get(idx)
                    .ok_or_else(|| PromotionError::scoring(format!("row {}: missing value for '{col}'", n + 1)))?;
                raw.parse::<f64>()
                    .map_err(|_| PromotionError::scoring(format!("row {}: '{raw}' is not numeric ({col})", n + 1)))
            };
            let mut row = [0.0; FEATURE_COUNT];
            for ((value, idx), col) in row.iter_mut().zip(feature_idx).zip(FEATURE_COLUMNS) {
                *value = cell(idx, col)?;
            }
            rows.push(row);
            targets.push(cell(target_idx, TARGET_COLUMN)?);
        }
        Self::new(rows, targets)
    }

    /// Load from a local path or an `http(s)://` URL.
    pub async fn load(source: &str) -> PromotionResult<Self> {
        let text = if source.starts_with("http://") || source.starts_with("https://") {
            let resp = reqwest::get(source).await.map_err(|e| PromotionError::scoring(format!("fetch {source}: {e}")))?;
            if !resp.status().is_success() {
                return Err(PromotionError::scoring(format!("fetch {source}: {}", resp.status())));
            }
            resp.text().await.map_err(|e| PromotionError::scoring(format!("read {source}: {e}")))?
        } else {
            tokio::fs::read_to_string(Path::new(source))
                .await
                .map_err(|e| PromotionError::scoring(format!("read {source}: {e}")))?
        };
        let ds = Self::from_csv_str(&text)?;
        debug!(source, rows = ds.len(), fingerprint = %ds.fingerprint, "evaluation dataset loaded");
        Ok(ds)
    }

    pub fn features(&self) -> &FeatureMatrix { &self.features }
    pub fn targets(&self) -> &[f64] { &self.targets }
    pub fn fingerprint(&self) -> &str { &self.fingerprint }
    pub fn len(&self) -> usize { self.targets.len() }
    pub fn is_empty(&self) -> bool { self.targets.is_empty() }
}

fn fingerprint(rows: &[FeatureRow], targets: &[f64]) -> String {
    let mut h = Sha256::new();
    for col in FEATURE_COLUMNS.iter().chain(std::iter::once(&TARGET_COLUMN)) {
        h.update(col.as_bytes());
        h.update([0u8]);
    }
    for (row, target) in rows.iter().zip(targets) {
        for v in row {
            h.update(v.to_bits().to_le_bytes());
        }
        h.update(target.to_bits().to_le_bytes());
    }
    hex::encode(h.finalize())
}
