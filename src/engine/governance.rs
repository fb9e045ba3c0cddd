//! Governance engine
//!
//! Evaluates a model against the single active policy with a strictly
//! ordered three-rule procedure. Always re-reads the freshest risk and
//! fairness rows; decisions are never cached because model risk can change
//! between requests. Every call appends one audit entry.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::engine::audit;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    AuditAction, AuditOutcome, FairnessMetric, GovernancePolicy, ModelStatus, NewAuditEntry,
    RegisteredModel, RiskHistoryEntry,
};

#[derive(Debug, Clone, Serialize)]
pub struct GovernanceDecision {
    pub status: ModelStatus,
    pub reason: String,
    pub risk_score: f64,
    pub disparity_score: f64,
    pub policy_id: i64,
    /// True when risk or fairness metrics were absent and defaulted to zero
    pub partial: bool,
}

/// Evaluate a model against the active policy, persist the resulting
/// lifecycle state, and audit the call.
pub(crate) async fn evaluate(
    pool: &SqlitePool,
    actor_id: i64,
    model_id: i64,
) -> EngineResult<GovernanceDecision> {
    RegisteredModel::find_by_id(pool, model_id)
        .await?
        .ok_or(EngineError::ModelNotFound(model_id))?;

    let policy = GovernancePolicy::get_active(pool)
        .await?
        .ok_or(EngineError::NoActivePolicy)?;
    policy.check_consistency()?;

    let mut partial = false;

    let risk_score = match RiskHistoryEntry::latest(pool, model_id).await? {
        Some(entry) => entry.risk_score,
        None => {
            partial = true;
            0.0
        }
    };

    let disparity_score = match FairnessMetric::latest(pool, model_id).await? {
        Some(metric) => metric.disparity_score,
        None => {
            partial = true;
            0.0
        }
    };

    if partial {
        tracing::warn!(
            "Model {}: governance evaluated on partial metrics (risk={:.2}, disparity={:.4})",
            model_id,
            risk_score,
            disparity_score
        );
    }

    let (status, reason) = decide(&policy, risk_score, disparity_score);

    RegisteredModel::set_status(pool, model_id, status)
        .await?
        .ok_or(EngineError::ModelNotFound(model_id))?;

    tracing::info!(
        "Model {}: governance status {} under policy '{}' ({})",
        model_id,
        status,
        policy.name,
        reason
    );

    audit::best_effort(
        pool,
        NewAuditEntry {
            actor_id,
            model_id,
            action: AuditAction::GovernanceEvaluate,
            outcome: outcome_for(status),
            risk_score: Some(risk_score),
            disparity_score: Some(disparity_score),
            governance_status: Some(status),
            override_used: false,
            override_justification: None,
            details: serde_json::json!({
                "reason": reason,
                "policy_id": policy.id,
                "partial": partial,
            }),
        },
    )
    .await;

    Ok(GovernanceDecision {
        status,
        reason,
        risk_score,
        disparity_score,
        policy_id: policy.id,
        partial,
    })
}

/// The ordered three-rule decision procedure.
pub fn decide(policy: &GovernancePolicy, risk_score: f64, disparity_score: f64) -> (ModelStatus, String) {
    if risk_score > policy.max_allowed_risk {
        (
            ModelStatus::Blocked,
            format!(
                "Risk score {:.2} exceeds max allowed {:.2}",
                risk_score, policy.max_allowed_risk
            ),
        )
    } else if disparity_score > policy.max_allowed_disparity {
        (
            ModelStatus::AtRisk,
            format!(
                "Disparity {:.4} exceeds max allowed {:.4}",
                disparity_score, policy.max_allowed_disparity
            ),
        )
    } else if risk_score > policy.approval_required_above_risk {
        (
            ModelStatus::AtRisk,
            format!(
                "Risk score {:.2} requires approval (threshold {:.2})",
                risk_score, policy.approval_required_above_risk
            ),
        )
    } else {
        (
            ModelStatus::Approved,
            "All governance checks passed".to_string(),
        )
    }
}

fn outcome_for(status: ModelStatus) -> AuditOutcome {
    match status {
        ModelStatus::Blocked => AuditOutcome::Blocked,
        ModelStatus::AtRisk => AuditOutcome::AtRisk,
        _ => AuditOutcome::Approved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn policy(max_risk: f64, max_disparity: f64, approval_above: f64) -> GovernancePolicy {
        GovernancePolicy {
            id: 1,
            name: "test".to_string(),
            max_allowed_risk: max_risk,
            max_allowed_disparity: max_disparity,
            approval_required_above_risk: approval_above,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn risk_above_max_is_blocked() {
        let (status, reason) = decide(&policy(75.0, 0.15, 60.0), 85.0, 0.0);
        assert_eq!(status, ModelStatus::Blocked);
        assert!(reason.contains("85.00"));
        assert!(reason.contains("75.00"));
    }

    #[test]
    fn hard_block_takes_precedence_over_fairness() {
        let (status, _) = decide(&policy(75.0, 0.15, 60.0), 90.0, 0.5);
        assert_eq!(status, ModelStatus::Blocked);
    }

    #[test]
    fn disparity_violation_is_at_risk() {
        let (status, reason) = decide(&policy(80.0, 0.15, 60.0), 40.0, 0.25);
        assert_eq!(status, ModelStatus::AtRisk);
        assert!(reason.contains("Disparity"));
    }

    #[test]
    fn risk_above_approval_gate_is_at_risk() {
        let (status, reason) = decide(&policy(80.0, 0.15, 60.0), 65.0, 0.05);
        assert_eq!(status, ModelStatus::AtRisk);
        assert!(reason.contains("requires approval"));
    }

    #[test]
    fn clean_model_is_approved() {
        let (status, reason) = decide(&policy(80.0, 0.15, 60.0), 30.0, 0.05);
        assert_eq!(status, ModelStatus::Approved);
        assert_eq!(reason, "All governance checks passed");
    }

    #[test]
    fn thresholds_are_exclusive_at_the_boundary() {
        // Exactly at a threshold never trips the rule
        let (status, _) = decide(&policy(80.0, 0.15, 60.0), 80.0, 0.15);
        assert_eq!(status, ModelStatus::AtRisk); // 80 > 60 approval gate
        let (status, _) = decide(&policy(80.0, 0.15, 60.0), 60.0, 0.15);
        assert_eq!(status, ModelStatus::Approved);
    }
}
