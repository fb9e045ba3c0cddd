//! Audit log model - immutable, append-only
//!
//! There is deliberately no update or delete path for audit entries; every
//! row is the permanent record of what was known when a decision was made.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

use crate::models::ModelStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AuditAction {
    GovernanceEvaluate,
    Deployment,
    Override,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::GovernanceEvaluate => "governance_evaluate",
            AuditAction::Deployment => "deployment",
            AuditAction::Override => "override",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AuditOutcome {
    Approved,
    AtRisk,
    Blocked,
    Success,
    Failure,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Approved => "approved",
            AuditOutcome::AtRisk => "at_risk",
            AuditOutcome::Blocked => "blocked",
            AuditOutcome::Success => "success",
            AuditOutcome::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditEntry {
    pub id: i64,
    pub actor_id: i64,
    pub model_id: i64,
    pub action: AuditAction,
    pub outcome: AuditOutcome,
    pub risk_score: Option<f64>,
    pub disparity_score: Option<f64>,
    pub governance_status: Option<ModelStatus>,
    pub override_used: bool,
    pub override_justification: Option<String>,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor_id: i64,
    pub model_id: i64,
    pub action: AuditAction,
    pub outcome: AuditOutcome,
    pub risk_score: Option<f64>,
    pub disparity_score: Option<f64>,
    pub governance_status: Option<ModelStatus>,
    pub override_used: bool,
    pub override_justification: Option<String>,
    pub details: serde_json::Value,
}

/// Filter for the paginated audit query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub model_id: Option<i64>,
    pub actor_id: Option<i64>,
    pub action: Option<AuditAction>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl AuditEntry {
    pub async fn append(pool: &SqlitePool, entry: NewAuditEntry) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, AuditEntry>(
            r#"
            INSERT INTO audit_logs
                (actor_id, model_id, action, outcome, risk_score, disparity_score,
                 governance_status, override_used, override_justification, details, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(entry.actor_id)
        .bind(entry.model_id)
        .bind(entry.action)
        .bind(entry.outcome)
        .bind(entry.risk_score)
        .bind(entry.disparity_score)
        .bind(entry.governance_status)
        .bind(entry.override_used)
        .bind(&entry.override_justification)
        .bind(&entry.details)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    /// Full trail for a model, newest first.
    pub async fn trail_for_model(
        pool: &SqlitePool,
        model_id: i64,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT * FROM audit_logs
            WHERE model_id = $1
            ORDER BY timestamp DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(model_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Deployment attempts for a model (includes denials).
    pub async fn deployment_history(
        pool: &SqlitePool,
        model_id: i64,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT * FROM audit_logs
            WHERE model_id = $1 AND action IN ('deployment', 'override')
            ORDER BY timestamp DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(model_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Overrides issued by one actor.
    pub async fn overrides_by_actor(
        pool: &SqlitePool,
        actor_id: i64,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT * FROM audit_logs
            WHERE actor_id = $1 AND override_used = 1
            ORDER BY timestamp DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(actor_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// All blocked attempts system-wide.
    pub async fn blocked_attempts(
        pool: &SqlitePool,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT * FROM audit_logs
            WHERE outcome = 'blocked'
            ORDER BY timestamp DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// General paginated query over the trail.
    pub async fn query(pool: &SqlitePool, filter: AuditFilter) -> Result<Vec<Self>, sqlx::Error> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM audit_logs WHERE 1 = 1");

        if let Some(model_id) = filter.model_id {
            builder.push(" AND model_id = ").push_bind(model_id);
        }
        if let Some(actor_id) = filter.actor_id {
            builder.push(" AND actor_id = ").push_bind(actor_id);
        }
        if let Some(action) = filter.action {
            builder.push(" AND action = ").push_bind(action);
        }
        if let Some(from) = filter.from {
            builder.push(" AND timestamp >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            builder.push(" AND timestamp <= ").push_bind(to);
        }

        builder
            .push(" ORDER BY timestamp DESC, id DESC LIMIT ")
            .push_bind(filter.limit.unwrap_or(50))
            .push(" OFFSET ")
            .push_bind(filter.offset.unwrap_or(0));

        builder.build_query_as::<AuditEntry>().fetch_all(pool).await
    }
}
