//! Risk history model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RiskHistoryEntry {
    pub id: i64,
    pub model_id: i64,
    /// Composite Model Risk Index, 0-100
    pub risk_score: f64,
    pub drift_component: f64,
    pub fairness_component: f64,
    pub timestamp: DateTime<Utc>,
}

impl RiskHistoryEntry {
    /// Append one entry; prior history is never overwritten.
    pub async fn insert(
        pool: &SqlitePool,
        model_id: i64,
        risk_score: f64,
        drift_component: f64,
        fairness_component: f64,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, RiskHistoryEntry>(
            r#"
            INSERT INTO risk_history (model_id, risk_score, drift_component, fairness_component, timestamp)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(model_id)
        .bind(risk_score)
        .bind(drift_component)
        .bind(fairness_component)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    /// Most recent entry; authoritative for governance decisions.
    pub async fn latest(
        pool: &SqlitePool,
        model_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, RiskHistoryEntry>(
            r#"
            SELECT * FROM risk_history
            WHERE model_id = $1
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(model_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn history(
        pool: &SqlitePool,
        model_id: i64,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, RiskHistoryEntry>(
            r#"
            SELECT * FROM risk_history
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
}
