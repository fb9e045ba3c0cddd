//! Fairness metric model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FairnessMetric {
    pub id: i64,
    pub model_id: i64,
    pub protected_attribute: String,
    pub group_name: String,
    pub total_predictions: i64,
    pub positive_predictions: i64,
    pub approval_rate: f64,
    /// max − min approval rate across groups; identical on every row of a run
    pub disparity_score: f64,
    pub fairness_flag: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFairnessMetric {
    pub protected_attribute: String,
    pub group_name: String,
    pub total_predictions: i64,
    pub positive_predictions: i64,
    pub approval_rate: f64,
    pub disparity_score: f64,
    pub fairness_flag: bool,
}

impl FairnessMetric {
    /// Persist one evaluation run as a single atomic batch, all rows sharing
    /// `run_at` as their batch identifier.
    pub async fn insert_batch(
        pool: &SqlitePool,
        model_id: i64,
        metrics: &[NewFairnessMetric],
        run_at: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let mut stored = Vec::with_capacity(metrics.len());

        for metric in metrics {
            let row = sqlx::query_as::<_, FairnessMetric>(
                r#"
                INSERT INTO fairness_metrics
                    (model_id, protected_attribute, group_name, total_predictions,
                     positive_predictions, approval_rate, disparity_score, fairness_flag, timestamp)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING *
                "#,
            )
            .bind(model_id)
            .bind(&metric.protected_attribute)
            .bind(&metric.group_name)
            .bind(metric.total_predictions)
            .bind(metric.positive_predictions)
            .bind(metric.approval_rate)
            .bind(metric.disparity_score)
            .bind(metric.fairness_flag)
            .bind(run_at)
            .fetch_one(&mut *tx)
            .await?;
            stored.push(row);
        }

        tx.commit().await?;
        Ok(stored)
    }

    /// Most recent single row for a model; carries the run's disparity score.
    pub async fn latest(
        pool: &SqlitePool,
        model_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, FairnessMetric>(
            r#"
            SELECT * FROM fairness_metrics
            WHERE model_id = $1
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(model_id)
        .fetch_optional(pool)
        .await
    }

    /// All rows of the most recent evaluation run for a model.
    pub async fn latest_batch(
        pool: &SqlitePool,
        model_id: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, FairnessMetric>(
            r#"
            SELECT * FROM fairness_metrics
            WHERE model_id = $1
              AND timestamp = (SELECT MAX(timestamp) FROM fairness_metrics WHERE model_id = $1)
            ORDER BY group_name ASC
            "#,
        )
        .bind(model_id)
        .fetch_all(pool)
        .await
    }

    pub async fn history(
        pool: &SqlitePool,
        model_id: i64,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, FairnessMetric>(
            r#"
            SELECT * FROM fairness_metrics
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
