//! Prediction log model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PredictionRecord {
    pub id: i64,
    pub model_id: i64,
    pub input_features: serde_json::Value,
    pub prediction: f64,
    pub actual_label: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestPrediction {
    pub input_features: serde_json::Value,
    pub prediction: f64,
    pub actual_label: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl PredictionRecord {
    /// Append a batch of predictions for a model in one transaction.
    ///
    /// Validates every record before any row is written, so a malformed
    /// payload never leaves a partial batch behind.
    pub async fn ingest_batch(
        pool: &SqlitePool,
        model_id: i64,
        batch: &[IngestPrediction],
    ) -> EngineResult<usize> {
        for (i, record) in batch.iter().enumerate() {
            if !record.input_features.is_object() {
                return Err(EngineError::Input(format!(
                    "record {i}: input_features must be a JSON object"
                )));
            }
            if !(0.0..=1.0).contains(&record.prediction) {
                return Err(EngineError::Input(format!(
                    "record {i}: prediction {} outside [0, 1]",
                    record.prediction
                )));
            }
        }

        let mut tx = pool.begin().await?;
        for record in batch {
            sqlx::query(
                r#"
                INSERT INTO prediction_logs (model_id, input_features, prediction, actual_label, timestamp)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(model_id)
            .bind(&record.input_features)
            .bind(record.prediction)
            .bind(record.actual_label)
            .bind(record.timestamp.unwrap_or_else(Utc::now))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::debug!("Ingested {} predictions for model {}", batch.len(), model_id);
        Ok(batch.len())
    }

    pub async fn count_for_model(pool: &SqlitePool, model_id: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM prediction_logs WHERE model_id = $1")
            .bind(model_id)
            .fetch_one(pool)
            .await
    }

    /// Earliest `limit` records, oldest first.
    pub async fn baseline_window(
        pool: &SqlitePool,
        model_id: i64,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, PredictionRecord>(
            r#"
            SELECT * FROM prediction_logs
            WHERE model_id = $1
            ORDER BY timestamp ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(model_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Latest `limit` records, newest first.
    pub async fn recent_window(
        pool: &SqlitePool,
        model_id: i64,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, PredictionRecord>(
            r#"
            SELECT * FROM prediction_logs
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

    pub async fn all_for_model(
        pool: &SqlitePool,
        model_id: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, PredictionRecord>(
            "SELECT * FROM prediction_logs WHERE model_id = $1 ORDER BY timestamp ASC, id ASC",
        )
        .bind(model_id)
        .fetch_all(pool)
        .await
    }

    /// One sample record for feature discovery.
    pub async fn sample(
        pool: &SqlitePool,
        model_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PredictionRecord>(
            "SELECT * FROM prediction_logs WHERE model_id = $1 LIMIT 1",
        )
        .bind(model_id)
        .fetch_optional(pool)
        .await
    }
}
