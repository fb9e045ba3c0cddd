//! Fairness evaluator
//!
//! Groups a model's predictions by a protected attribute and measures the
//! spread of approval rates across groups. This module only *computes*
//! metrics; threshold enforcement belongs to the governance engine.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::models::{FairnessMetric, GovernancePolicy, NewFairnessMetric, PredictionRecord};

/// Predictions above this are counted as positive (approval) outcomes
const POSITIVE_THRESHOLD: f64 = 0.5;

/// Result of a fairness evaluation run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FairnessOutcome {
    /// The protected attribute does not appear in any stored payload; the
    /// evaluator reports this rather than fabricating zero values.
    AttributeUnavailable { attribute: String },
    /// Fewer than two groups with at least one member each.
    InsufficientGroups { groups_found: usize },
    Completed {
        disparity_score: f64,
        fairness_flag: bool,
        metrics: Vec<FairnessMetric>,
    },
}

#[derive(Debug, Default)]
struct GroupStats {
    total: i64,
    positive: i64,
}

/// Run fairness evaluation for a model and persist the per-group batch.
pub(crate) async fn run(
    pool: &SqlitePool,
    config: &EngineConfig,
    model_id: i64,
    protected_attribute: &str,
) -> EngineResult<FairnessOutcome> {
    let predictions = PredictionRecord::all_for_model(pool, model_id).await?;
    if predictions.is_empty() {
        return Ok(FairnessOutcome::InsufficientGroups { groups_found: 0 });
    }

    // BTreeMap keeps group enumeration deterministic
    let mut groups: BTreeMap<String, GroupStats> = BTreeMap::new();
    let mut attribute_seen = false;

    for record in &predictions {
        let Some(raw) = record.input_features.get(protected_attribute) else {
            continue;
        };
        attribute_seen = true;

        let group_name = match raw {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let stats = groups.entry(group_name).or_default();
        stats.total += 1;
        if record.prediction > POSITIVE_THRESHOLD {
            stats.positive += 1;
        }
    }

    if !attribute_seen {
        tracing::warn!(
            "Model {}: protected attribute '{}' absent from all payloads, fairness evaluation unavailable",
            model_id,
            protected_attribute
        );
        return Ok(FairnessOutcome::AttributeUnavailable {
            attribute: protected_attribute.to_string(),
        });
    }

    if groups.len() < 2 {
        return Ok(FairnessOutcome::InsufficientGroups {
            groups_found: groups.len(),
        });
    }

    let rates: Vec<f64> = groups
        .values()
        .map(|s| s.positive as f64 / s.total as f64)
        .collect();
    let disparity_score = disparity(&rates);

    // Flag against the active policy's threshold; fall back to the configured
    // default with a warning when no policy is active (the governance engine
    // still refuses to evaluate in that case).
    let threshold = match GovernancePolicy::get_active(pool).await? {
        Some(policy) => policy.max_allowed_disparity,
        None => {
            tracing::warn!(
                "No active policy for fairness threshold, using default {}",
                config.default_disparity_threshold
            );
            config.default_disparity_threshold
        }
    };
    let fairness_flag = disparity_score > threshold;

    tracing::info!(
        "Model {}: fairness on '{}' disparity={:.4} threshold={:.4} flag={}",
        model_id,
        protected_attribute,
        disparity_score,
        threshold,
        fairness_flag
    );

    let batch: Vec<NewFairnessMetric> = groups
        .iter()
        .map(|(group_name, stats)| NewFairnessMetric {
            protected_attribute: protected_attribute.to_string(),
            group_name: group_name.clone(),
            total_predictions: stats.total,
            positive_predictions: stats.positive,
            approval_rate: stats.positive as f64 / stats.total as f64,
            disparity_score,
            fairness_flag,
        })
        .collect();

    let stored = FairnessMetric::insert_batch(pool, model_id, &batch, Utc::now()).await?;

    Ok(FairnessOutcome::Completed {
        disparity_score,
        fairness_flag,
        metrics: stored,
    })
}

/// Spread between the highest and lowest approval rates.
pub fn disparity(approval_rates: &[f64]) -> f64 {
    let mut max = f64::MIN;
    let mut min = f64::MAX;
    for &rate in approval_rates {
        max = max.max(rate);
        min = min.min(rate);
    }
    if approval_rates.is_empty() {
        0.0
    } else {
        max - min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disparity_is_max_minus_min() {
        let score = disparity(&[0.7, 0.45]);
        assert!((score - 0.25).abs() < 1e-12);
    }

    #[test]
    fn disparity_is_symmetric_in_group_order() {
        assert_eq!(disparity(&[0.7, 0.45]), disparity(&[0.45, 0.7]));
        assert_eq!(disparity(&[0.45, 0.6, 0.7]), disparity(&[0.7, 0.45, 0.6]));
    }

    #[test]
    fn single_group_disparity_is_zero() {
        assert_eq!(disparity(&[0.5]), 0.0);
        assert_eq!(disparity(&[]), 0.0);
    }
}
