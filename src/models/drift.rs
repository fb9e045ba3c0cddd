//! Drift metric model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DriftMetric {
    pub id: i64,
    pub model_id: i64,
    pub feature_name: String,
    pub psi_value: f64,
    pub ks_statistic: f64,
    pub drift_flag: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDriftMetric {
    pub feature_name: String,
    pub psi_value: f64,
    pub ks_statistic: f64,
    pub drift_flag: bool,
}

impl DriftMetric {
    /// Persist one calculation run as a single atomic batch.
    ///
    /// Every row of the run shares the same timestamp; that shared value is
    /// what identifies the batch in `latest_batch`.
    pub async fn insert_batch(
        pool: &SqlitePool,
        model_id: i64,
        metrics: &[NewDriftMetric],
        run_at: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let mut stored = Vec::with_capacity(metrics.len());

        for metric in metrics {
            let row = sqlx::query_as::<_, DriftMetric>(
                r#"
                INSERT INTO drift_metrics (model_id, feature_name, psi_value, ks_statistic, drift_flag, timestamp)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *
                "#,
            )
            .bind(model_id)
            .bind(&metric.feature_name)
            .bind(metric.psi_value)
            .bind(metric.ks_statistic)
            .bind(metric.drift_flag)
            .bind(run_at)
            .fetch_one(&mut *tx)
            .await?;
            stored.push(row);
        }

        tx.commit().await?;
        Ok(stored)
    }

    /// All rows of the most recent calculation run for a model.
    pub async fn latest_batch(
        pool: &SqlitePool,
        model_id: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, DriftMetric>(
            r#"
            SELECT * FROM drift_metrics
            WHERE model_id = $1
              AND timestamp = (SELECT MAX(timestamp) FROM drift_metrics WHERE model_id = $1)
            ORDER BY feature_name ASC
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
        sqlx::query_as::<_, DriftMetric>(
            r#"
            SELECT * FROM drift_metrics
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
