//! Deployment controller
//!
//! Applies the governance decision to a model's lifecycle. Always re-runs
//! the evaluation first; a cached status is never trusted. Blocked models
//! can never deploy, at-risk models need an explicit justified override,
//! and every attempt (allowed or denied) is audited.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::engine::{audit, governance};
use crate::error::{EngineError, EngineResult};
use crate::models::{AuditAction, AuditOutcome, ModelStatus, NewAuditEntry, RegisteredModel};

/// Minimum characters (after trimming) for an override justification
pub const MIN_JUSTIFICATION_LEN: usize = 20;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeployRequest {
    #[serde(default)]
    pub override_requested: bool,
    pub justification: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentOutcome {
    pub accepted: bool,
    pub new_state: ModelStatus,
    pub reason: String,
    pub override_used: bool,
}

/// Execute a deployment attempt. Caller holds the per-model lock.
pub(crate) async fn execute(
    pool: &SqlitePool,
    actor_id: i64,
    model_id: i64,
    request: DeployRequest,
) -> EngineResult<DeploymentOutcome> {
    let decision = governance::evaluate(pool, actor_id, model_id).await?;

    let justification = request
        .justification
        .as_deref()
        .map(str::trim)
        .filter(|j| !j.is_empty())
        .map(str::to_string);

    let verdict = match decision.status {
        ModelStatus::Blocked => Verdict::Denied {
            outcome: AuditOutcome::Blocked,
            reason: format!(
                "Deployment blocked: {} (override not permitted for hard blocks)",
                decision.reason
            ),
            override_used: false,
        },
        ModelStatus::AtRisk if !request.override_requested => Verdict::Denied {
            outcome: AuditOutcome::AtRisk,
            reason: format!(
                "Model at risk: {}. Supply an override with a written justification to proceed",
                decision.reason
            ),
            override_used: false,
        },
        ModelStatus::AtRisk => {
            match &justification {
                Some(j) if j.chars().count() >= MIN_JUSTIFICATION_LEN => Verdict::Allowed {
                    override_used: true,
                    reason: format!("Deployed with override: {}", decision.reason),
                },
                _ => Verdict::Denied {
                    outcome: AuditOutcome::Failure,
                    reason: format!(
                        "Override justification must be at least {MIN_JUSTIFICATION_LEN} characters"
                    ),
                    override_used: false,
                },
            }
        }
        // Approved: the override flag has no effect and is not recorded
        _ => Verdict::Allowed {
            override_used: false,
            reason: "Deployment approved by governance policy".to_string(),
        },
    };

    let outcome = match verdict {
        Verdict::Allowed {
            override_used,
            reason,
        } => {
            RegisteredModel::set_status(pool, model_id, ModelStatus::Deployed)
                .await?
                .ok_or(EngineError::ModelNotFound(model_id))?;
            tracing::info!(
                "Model {} deployed by actor {} (override={})",
                model_id,
                actor_id,
                override_used
            );

            // Override deployments are recorded under their own action so the
            // trail distinguishes them from plain deployments.
            let action = if override_used {
                AuditAction::Override
            } else {
                AuditAction::Deployment
            };
            audit::best_effort(
                pool,
                NewAuditEntry {
                    actor_id,
                    model_id,
                    action,
                    outcome: AuditOutcome::Success,
                    risk_score: Some(decision.risk_score),
                    disparity_score: Some(decision.disparity_score),
                    governance_status: Some(decision.status),
                    override_used,
                    override_justification: if override_used { justification } else { None },
                    details: serde_json::json!({
                        "reason": reason,
                        "policy_id": decision.policy_id,
                    }),
                },
            )
            .await;

            DeploymentOutcome {
                accepted: true,
                new_state: ModelStatus::Deployed,
                reason,
                override_used,
            }
        }
        Verdict::Denied {
            outcome,
            reason,
            override_used,
        } => {
            // No state mutation on denial; the attempt stays forensically
            // visible through the audit trail.
            tracing::warn!(
                "Deployment denied for model {} (actor {}): {}",
                model_id,
                actor_id,
                reason
            );

            audit::best_effort(
                pool,
                NewAuditEntry {
                    actor_id,
                    model_id,
                    action: AuditAction::Deployment,
                    outcome,
                    risk_score: Some(decision.risk_score),
                    disparity_score: Some(decision.disparity_score),
                    governance_status: Some(decision.status),
                    override_used,
                    override_justification: justification,
                    details: serde_json::json!({
                        "reason": reason,
                        "policy_id": decision.policy_id,
                        "override_requested": request.override_requested,
                    }),
                },
            )
            .await;

            DeploymentOutcome {
                accepted: false,
                new_state: decision.status,
                reason,
                override_used,
            }
        }
    };

    Ok(outcome)
}

enum Verdict {
    Allowed {
        override_used: bool,
        reason: String,
    },
    Denied {
        outcome: AuditOutcome,
        reason: String,
        override_used: bool,
    },
}
