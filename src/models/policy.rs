//! Governance policy model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use validator::Validate;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GovernancePolicy {
    pub id: i64,
    pub name: String,
    /// Risk score above which deployment is hard-blocked (0-100)
    pub max_allowed_risk: f64,
    /// Fairness disparity above which a model is at risk (0-1)
    pub max_allowed_disparity: f64,
    /// Risk score above which deployment requires explicit approval (0-100)
    pub approval_required_above_risk: f64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePolicy {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(range(min = 0.0, max = 100.0))]
    pub max_allowed_risk: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub max_allowed_disparity: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub approval_required_above_risk: f64,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdatePolicy {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub max_allowed_risk: Option<f64>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub max_allowed_disparity: Option<f64>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub approval_required_above_risk: Option<f64>,
}

impl GovernancePolicy {
    /// Thresholds must be mutually consistent: a policy whose approval gate
    /// sits above its hard block can never require approval.
    pub fn check_consistency(&self) -> EngineResult<()> {
        if self.approval_required_above_risk > self.max_allowed_risk {
            return Err(EngineError::InvalidPolicy(format!(
                "approval_required_above_risk ({}) exceeds max_allowed_risk ({})",
                self.approval_required_above_risk, self.max_allowed_risk
            )));
        }
        Ok(())
    }

    pub async fn create(pool: &SqlitePool, data: CreatePolicy) -> EngineResult<Self> {
        data.validate()?;
        if data.approval_required_above_risk > data.max_allowed_risk {
            return Err(EngineError::InvalidPolicy(format!(
                "approval_required_above_risk ({}) exceeds max_allowed_risk ({})",
                data.approval_required_above_risk, data.max_allowed_risk
            )));
        }
        if Self::find_by_name(pool, &data.name).await?.is_some() {
            return Err(EngineError::AlreadyExists(format!(
                "Policy '{}'",
                data.name
            )));
        }

        let now = Utc::now();
        let policy = sqlx::query_as::<_, GovernancePolicy>(
            r#"
            INSERT INTO governance_policies
                (name, max_allowed_risk, max_allowed_disparity, approval_required_above_risk,
                 active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 0, $5, $5)
            RETURNING *
            "#,
        )
        .bind(&data.name)
        .bind(data.max_allowed_risk)
        .bind(data.max_allowed_disparity)
        .bind(data.approval_required_above_risk)
        .bind(now)
        .fetch_one(pool)
        .await?;

        Ok(policy)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, GovernancePolicy>("SELECT * FROM governance_policies WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_name(
        pool: &SqlitePool,
        name: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, GovernancePolicy>("SELECT * FROM governance_policies WHERE name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, GovernancePolicy>(
            "SELECT * FROM governance_policies ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(pool)
        .await
    }

    /// The single active policy, if any.
    pub async fn get_active(pool: &SqlitePool) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, GovernancePolicy>(
            "SELECT * FROM governance_policies WHERE active = 1 LIMIT 1",
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn update(pool: &SqlitePool, id: i64, data: UpdatePolicy) -> EngineResult<Self> {
        data.validate()?;

        let current = Self::find_by_id(pool, id)
            .await?
            .ok_or_else(|| EngineError::Input(format!("Policy {id} not found")))?;

        let max_risk = data.max_allowed_risk.unwrap_or(current.max_allowed_risk);
        let approval_above = data
            .approval_required_above_risk
            .unwrap_or(current.approval_required_above_risk);
        if approval_above > max_risk {
            return Err(EngineError::InvalidPolicy(format!(
                "approval_required_above_risk ({approval_above}) exceeds max_allowed_risk ({max_risk})"
            )));
        }

        let policy = sqlx::query_as::<_, GovernancePolicy>(
            r#"
            UPDATE governance_policies
            SET name = COALESCE($2, name),
                max_allowed_risk = $3,
                max_allowed_disparity = COALESCE($4, max_allowed_disparity),
                approval_required_above_risk = $5,
                updated_at = $6
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&data.name)
        .bind(max_risk)
        .bind(data.max_allowed_disparity)
        .bind(approval_above)
        .bind(Utc::now())
        .fetch_one(pool)
        .await?;

        Ok(policy)
    }

    /// Activate one policy, deactivating all others in the same transaction.
    ///
    /// Concurrent readers never observe zero or multiple active policies:
    /// both updates commit atomically.
    pub async fn activate(pool: &SqlitePool, id: i64) -> EngineResult<Self> {
        let mut tx = pool.begin().await?;

        sqlx::query("UPDATE governance_policies SET active = 0, updated_at = $1 WHERE active = 1")
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        let activated = sqlx::query_as::<_, GovernancePolicy>(
            r#"
            UPDATE governance_policies
            SET active = 1, updated_at = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?;

        // Unknown id: roll back so the previously active policy survives
        let Some(policy) = activated else {
            tx.rollback().await?;
            return Err(EngineError::Input(format!("Policy {id} not found")));
        };

        tx.commit().await?;
        tracing::info!("Activated governance policy '{}' (id {})", policy.name, policy.id);
        Ok(policy)
    }
}
