//! Risk scorer
//!
//! Blends the latest drift and fairness summaries into the composite Model
//! Risk Index (0-100) and appends one history entry per run. Absent inputs
//! default their component to zero but the assessment is tagged partial and
//! the gap is logged; callers never see a silent zero.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::models::{DriftMetric, FairnessMetric, RiskHistoryEntry};

/// A scored risk entry plus provenance about what fed it.
#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    pub entry: RiskHistoryEntry,
    /// True when one or both components had no underlying metrics
    pub partial: bool,
    /// Which metric sources were missing ("drift", "fairness")
    pub missing: Vec<&'static str>,
}

/// Compute and persist a new risk history entry for a model.
pub(crate) async fn score(
    pool: &SqlitePool,
    config: &EngineConfig,
    model_id: i64,
) -> EngineResult<RiskAssessment> {
    let mut missing = Vec::new();

    let drift_batch = DriftMetric::latest_batch(pool, model_id).await?;
    let drift_comp = if drift_batch.is_empty() {
        missing.push("drift");
        0.0
    } else {
        let n = drift_batch.len() as f64;
        let avg_psi = drift_batch.iter().map(|m| m.psi_value).sum::<f64>() / n;
        let avg_ks = drift_batch.iter().map(|m| m.ks_statistic).sum::<f64>() / n;
        drift_component(avg_psi, avg_ks, config)
    };

    let fairness_comp = match FairnessMetric::latest(pool, model_id).await? {
        Some(metric) => fairness_component(metric.disparity_score),
        None => {
            missing.push("fairness");
            0.0
        }
    };

    let risk_score = composite_score(drift_comp, fairness_comp, config);

    let partial = !missing.is_empty();
    if partial {
        tracing::warn!(
            "Model {}: risk score {:.2} based on partial information (missing: {:?})",
            model_id,
            risk_score,
            missing
        );
    }

    let entry =
        RiskHistoryEntry::insert(pool, model_id, risk_score, drift_comp, fairness_comp).await?;

    Ok(RiskAssessment {
        entry,
        partial,
        missing,
    })
}

/// Blend of mean PSI and mean KS, normalized against the calibration ceiling
/// so typical safe drift scores near 0 and severe drift approaches 100.
pub fn drift_component(avg_psi: f64, avg_ks: f64, config: &EngineConfig) -> f64 {
    let blended = avg_psi * config.psi_weight + avg_ks * (1.0 - config.psi_weight);
    (blended * 100.0 / config.drift_ceiling).clamp(0.0, 100.0)
}

/// Disparity is already a 0-1 fraction; rescale to 0-100.
pub fn fairness_component(disparity_score: f64) -> f64 {
    (disparity_score * 100.0).clamp(0.0, 100.0)
}

/// risk = drift_weight · drift + (1 − drift_weight) · fairness, clamped.
pub fn composite_score(drift_comp: f64, fairness_comp: f64, config: &EngineConfig) -> f64 {
    let w = config.drift_risk_weight;
    (drift_comp * w + fairness_comp * (1.0 - w)).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_and_score_stay_in_bounds() {
        let config = EngineConfig::default();

        for &(psi, ks) in &[(0.0, 0.0), (0.1, 0.05), (5.0, 1.0), (100.0, 1.0)] {
            let d = drift_component(psi, ks, &config);
            assert!((0.0..=100.0).contains(&d), "drift = {d}");
        }
        for &disp in &[0.0, 0.25, 1.0, 2.0] {
            let f = fairness_component(disp);
            assert!((0.0..=100.0).contains(&f), "fairness = {f}");
        }
        let score = composite_score(100.0, 100.0, &config);
        assert!((score - 100.0).abs() < 1e-12);
    }

    #[test]
    fn default_weights_favor_drift() {
        let config = EngineConfig::default();
        let drift_heavy = composite_score(80.0, 0.0, &config);
        let fairness_heavy = composite_score(0.0, 80.0, &config);
        assert!(drift_heavy > fairness_heavy);
        assert!((drift_heavy - 48.0).abs() < 1e-9);
        assert!((fairness_heavy - 32.0).abs() < 1e-9);
    }

    #[test]
    fn safe_drift_scores_near_zero() {
        let config = EngineConfig::default();
        let d = drift_component(0.02, 0.01, &config);
        assert!(d < 1.0, "drift = {d}");
    }
}
