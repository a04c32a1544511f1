//! Promotion metrics registered on the global OpenTelemetry meter.
//!
//! Without an installed meter provider the instruments are no-ops, so library
//! users and tests pay nothing for them.

use once_cell::sync::Lazy;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

use crate::error::PromotionError;
use crate::promotion::Outcome;

#[derive(Clone)]
pub struct PromotionMetrics {
    pub decisions_total: Counter<u64>,
    pub failures_total: Counter<u64>,
    pub evaluation_latency_ms: Histogram<f64>,
    pub candidate_rmse: Histogram<f64>,
}

static PROMOTION_METER: Lazy<Meter> = Lazy::new(|| opentelemetry::global::meter("eta_promotion"));

pub static PROMOTION_METRICS: Lazy<PromotionMetrics> = Lazy::new(|| PromotionMetrics {
    decisions_total: PROMOTION_METER
        .u64_counter("eta_promotion_decisions_total")
        .with_description("Promotion decisions by outcome")
        .build(),
    failures_total: PROMOTION_METER
        .u64_counter("eta_promotion_failures_total")
        .with_description("Evaluations that ended in an error, by kind")
        .build(),
    evaluation_latency_ms: PROMOTION_METER
        .f64_histogram("eta_promotion_evaluation_latency_ms")
        .with_description("Wall time of one evaluate-and-promote call (ms)")
        .with_unit("ms")
        .build(),
    candidate_rmse: PROMOTION_METER
        .f64_histogram("eta_promotion_candidate_rmse")
        .with_description("RMSE of evaluated candidates on the held-out set")
        .build(),
});

pub fn record_decision(outcome: Outcome, candidate_rmse: f64, latency_ms: f64) {
    let attrs = [KeyValue::new("outcome", outcome.as_str())];
    PROMOTION_METRICS.decisions_total.add(1, &attrs);
    PROMOTION_METRICS.evaluation_latency_ms.record(latency_ms, &attrs);
    PROMOTION_METRICS.candidate_rmse.record(candidate_rmse, &[]);
}

pub fn record_failure(err: &PromotionError, latency_ms: f64) {
    let attrs = [KeyValue::new("kind", err.kind())];
    PROMOTION_METRICS.failures_total.add(1, &attrs);
    PROMOTION_METRICS.evaluation_latency_ms.record(latency_ms, &attrs);
}
