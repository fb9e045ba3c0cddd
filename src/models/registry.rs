//! Model registry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// Lifecycle state of a registered model.
///
/// Mutated only by the governance engine and the deployment controller;
/// everything else reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ModelStatus {
    Draft,
    Approved,
    AtRisk,
    Blocked,
    Deployed,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Draft => "draft",
            ModelStatus::Approved => "approved",
            ModelStatus::AtRisk => "at_risk",
            ModelStatus::Blocked => "blocked",
            ModelStatus::Deployed => "deployed",
        }
    }
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RegisteredModel {
    pub id: i64,
    pub model_name: String,
    pub version: String,
    pub description: Option<String>,
    pub status: ModelStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterModel {
    pub model_name: String,
    pub version: String,
    pub description: Option<String>,
}

impl RegisteredModel {
    pub async fn create(pool: &SqlitePool, data: RegisterModel) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, RegisteredModel>(
            r#"
            INSERT INTO model_registry (model_name, version, description, status, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&data.model_name)
        .bind(&data.version)
        .bind(&data.description)
        .bind(ModelStatus::Draft)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, RegisteredModel>("SELECT * FROM model_registry WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(
        pool: &SqlitePool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, RegisteredModel>(
            "SELECT * FROM model_registry ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    /// Set the lifecycle state. Crate-private: state transitions are driven
    /// only by governance evaluation and deployment.
    pub(crate) async fn set_status(
        pool: &SqlitePool,
        id: i64,
        status: ModelStatus,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, RegisteredModel>(
            "UPDATE model_registry SET status = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(pool)
        .await
    }
}
