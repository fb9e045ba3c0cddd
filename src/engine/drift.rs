//! Drift detector
//!
//! Compares a baseline window of predictions (the earliest records) against a
//! recent window per feature, producing one PSI + KS measurement per numeric
//! feature. Bins are equal-frequency on the baseline so every bucket starts
//! with comparable mass.

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::models::{DriftMetric, NewDriftMetric, PredictionRecord};

/// Smoothing substituted for zero-percent buckets to avoid ln(0) and /0
const PSI_EPSILON: f64 = 1e-6;

/// Pseudo-feature tracking the prediction output distribution itself
const PREDICTION_FEATURE: &str = "prediction";

/// Result of a drift calculation run.
///
/// Too few records is an explicit outcome, not an error: callers can tell
/// "no drift" apart from "couldn't measure drift".
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DriftOutcome {
    InsufficientData {
        available: i64,
        required: i64,
    },
    Completed {
        metrics: Vec<DriftMetric>,
        /// Features skipped because their values were not numeric
        skipped_features: Vec<String>,
    },
}

/// Run drift detection for a model and persist the metric batch atomically.
pub(crate) async fn run(
    pool: &SqlitePool,
    config: &EngineConfig,
    model_id: i64,
    features: Option<Vec<String>>,
) -> EngineResult<DriftOutcome> {
    let required = config.drift_window_size * 2;
    let available = PredictionRecord::count_for_model(pool, model_id).await?;
    if available < required {
        tracing::debug!(
            "Model {}: {} of {} records needed for drift windows",
            model_id,
            available,
            required
        );
        return Ok(DriftOutcome::InsufficientData {
            available,
            required,
        });
    }

    let baseline = PredictionRecord::baseline_window(pool, model_id, config.drift_window_size).await?;
    let recent = PredictionRecord::recent_window(pool, model_id, config.drift_window_size).await?;

    let monitored = match features {
        Some(list) => list,
        None => discover_features(pool, model_id).await?,
    };

    let mut metrics = Vec::new();
    let mut skipped = Vec::new();

    for feature in &monitored {
        let baseline_values = numeric_values(&baseline, feature);
        let recent_values = numeric_values(&recent, feature);

        if baseline_values.len() < 2 || recent_values.len() < 2 {
            tracing::warn!(
                "Model {}: feature '{}' skipped, values not numeric or too sparse",
                model_id,
                feature
            );
            skipped.push(feature.clone());
            continue;
        }

        let psi = population_stability_index(&baseline_values, &recent_values, config.drift_bins);
        let ks = ks_statistic(&baseline_values, &recent_values);
        let drift_flag = psi >= config.psi_threshold || ks >= config.ks_threshold;

        if drift_flag {
            tracing::info!(
                "Model {}: drift on '{}' (psi={:.4}, ks={:.4})",
                model_id,
                feature,
                psi,
                ks
            );
        }

        metrics.push(NewDriftMetric {
            feature_name: feature.clone(),
            psi_value: psi,
            ks_statistic: ks,
            drift_flag,
        });
    }

    let stored = DriftMetric::insert_batch(pool, model_id, &metrics, Utc::now()).await?;

    Ok(DriftOutcome::Completed {
        metrics: stored,
        skipped_features: skipped,
    })
}

/// Feature names seen in the stored payloads, plus the prediction itself.
async fn discover_features(pool: &SqlitePool, model_id: i64) -> Result<Vec<String>, sqlx::Error> {
    let mut features: Vec<String> = match PredictionRecord::sample(pool, model_id).await? {
        Some(record) => record
            .input_features
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default(),
        None => Vec::new(),
    };
    features.push(PREDICTION_FEATURE.to_string());
    Ok(features)
}

/// Extract a feature's numeric values from a window, skipping anything that
/// does not parse as a number.
fn numeric_values(records: &[PredictionRecord], feature: &str) -> Vec<f64> {
    let mut values = Vec::with_capacity(records.len());
    for record in records {
        if feature == PREDICTION_FEATURE {
            values.push(record.prediction);
            continue;
        }
        let Some(raw) = record.input_features.get(feature) else {
            continue;
        };
        match raw {
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_f64() {
                    values.push(v);
                }
            }
            serde_json::Value::String(s) => {
                if let Ok(v) = s.parse::<f64>() {
                    values.push(v);
                }
            }
            _ => {}
        }
    }
    values
}

/// Population Stability Index over equal-frequency buckets derived from the
/// baseline window.
///
/// PSI = Σ (recent_pct − baseline_pct) · ln(recent_pct / baseline_pct)
pub fn population_stability_index(baseline: &[f64], recent: &[f64], bins: usize) -> f64 {
    if baseline.is_empty() || recent.is_empty() || bins == 0 {
        return 0.0;
    }

    let edges = equal_frequency_edges(baseline, bins);
    let baseline_counts = bucket_counts(baseline, &edges, bins);
    let recent_counts = bucket_counts(recent, &edges, bins);

    let baseline_total = baseline.len() as f64;
    let recent_total = recent.len() as f64;
    let smoothing = bins as f64 * PSI_EPSILON;

    let mut psi = 0.0;
    for bucket in 0..bins {
        let b_pct = (baseline_counts[bucket] as f64 + PSI_EPSILON) / (baseline_total + smoothing);
        let r_pct = (recent_counts[bucket] as f64 + PSI_EPSILON) / (recent_total + smoothing);
        psi += (r_pct - b_pct) * (r_pct / b_pct).ln();
    }
    psi
}

/// Two-sample Kolmogorov-Smirnov statistic: the maximum gap between the two
/// empirical cumulative distribution functions.
pub fn ks_statistic(baseline: &[f64], recent: &[f64]) -> f64 {
    if baseline.is_empty() || recent.is_empty() {
        return 0.0;
    }

    let mut a = baseline.to_vec();
    let mut b = recent.to_vec();
    a.sort_by(|x, y| x.total_cmp(y));
    b.sort_by(|x, y| x.total_cmp(y));

    let (na, nb) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0usize, 0usize);
    let mut max_gap: f64 = 0.0;

    while i < a.len() && j < b.len() {
        let x = a[i].min(b[j]);
        while i < a.len() && a[i] <= x {
            i += 1;
        }
        while j < b.len() && b[j] <= x {
            j += 1;
        }
        let gap = (i as f64 / na - j as f64 / nb).abs();
        max_gap = max_gap.max(gap);
    }
    max_gap
}

/// Interior bucket boundaries at baseline quantiles (`bins - 1` edges).
fn equal_frequency_edges(baseline: &[f64], bins: usize) -> Vec<f64> {
    let mut sorted = baseline.to_vec();
    sorted.sort_by(|x, y| x.total_cmp(y));

    (1..bins)
        .map(|i| {
            let idx = (i * sorted.len()) / bins;
            sorted[idx.min(sorted.len() - 1)]
        })
        .collect()
}

/// Count values per bucket. A value lands in the bucket whose lower edge it
/// exceeds; everything above the last edge falls in the final bucket.
fn bucket_counts(values: &[f64], edges: &[f64], bins: usize) -> Vec<usize> {
    let mut counts = vec![0usize; bins];
    for &v in values {
        let bucket = edges.partition_point(|&e| e < v).min(bins - 1);
        counts[bucket] += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| lo + (hi - lo) * i as f64 / (n - 1) as f64)
            .collect()
    }

    #[test]
    fn identical_windows_have_near_zero_psi_and_ks() {
        let sample = linspace(0.0, 100.0, 200);
        let psi = population_stability_index(&sample, &sample, 10);
        let ks = ks_statistic(&sample, &sample);
        assert!(psi.abs() < 1e-9, "psi = {psi}");
        assert!(ks.abs() < 1e-9, "ks = {ks}");
    }

    #[test]
    fn shifted_transaction_amounts_trip_the_psi_threshold() {
        // Baseline mean ~$200, recent mean ~$900 (4.5x shift)
        let baseline = linspace(100.0, 300.0, 100);
        let recent = linspace(700.0, 1100.0, 100);

        let psi = population_stability_index(&baseline, &recent, 10);
        assert!(psi > 0.25, "psi = {psi}");
    }

    #[test]
    fn disjoint_samples_have_ks_of_one() {
        let a = linspace(0.0, 1.0, 50);
        let b = linspace(10.0, 11.0, 50);
        let ks = ks_statistic(&a, &b);
        assert!((ks - 1.0).abs() < 1e-9, "ks = {ks}");
    }

    #[test]
    fn moderate_shift_gives_intermediate_ks() {
        let a = linspace(0.0, 10.0, 100);
        let b = linspace(5.0, 15.0, 100);
        let ks = ks_statistic(&a, &b);
        assert!(ks > 0.2 && ks < 1.0, "ks = {ks}");
    }

    #[test]
    fn equal_frequency_edges_split_baseline_evenly() {
        let baseline = linspace(0.0, 100.0, 100);
        let edges = equal_frequency_edges(&baseline, 10);
        assert_eq!(edges.len(), 9);
        let counts = bucket_counts(&baseline, &edges, 10);
        for &c in &counts {
            assert!(c >= 9 && c <= 11, "counts = {counts:?}");
        }
    }

    #[test]
    fn non_numeric_values_are_ignored() {
        let records = vec![PredictionRecord {
            id: 1,
            model_id: 1,
            input_features: serde_json::json!({"amount": "not-a-number", "age": 42}),
            prediction: 0.5,
            actual_label: None,
            timestamp: Utc::now(),
        }];

        assert!(numeric_values(&records, "amount").is_empty());
        assert_eq!(numeric_values(&records, "age"), vec![42.0]);
        assert_eq!(numeric_values(&records, "prediction"), vec![0.5]);
    }
}
