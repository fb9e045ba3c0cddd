//! The evaluation engine
//!
//! [`Engine`] is the integration surface for the (out-of-scope) HTTP layer:
//! ingest, recalculation, governance evaluation, deployment, policy
//! administration and audit queries. Recalculations and deployments are
//! serialized per model through a keyed async mutex so concurrent requests
//! can never tear a metric batch or race two conflicting deploy decisions.

pub(crate) mod audit;
pub mod deployment;
pub mod drift;
pub mod fairness;
pub mod governance;
pub mod risk;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::db;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    AuditEntry, AuditFilter, CreatePolicy, GovernancePolicy, IngestPrediction, PredictionRecord,
    RegisterModel, RegisteredModel, UpdatePolicy,
};

pub use deployment::{DeployRequest, DeploymentOutcome, MIN_JUSTIFICATION_LEN};
pub use drift::DriftOutcome;
pub use fairness::FairnessOutcome;
pub use governance::GovernanceDecision;
pub use risk::RiskAssessment;

/// Result of a full per-model recalculation (drift, fairness, risk).
#[derive(Debug, Clone, Serialize)]
pub struct RecalculationSummary {
    pub drift: DriftOutcome,
    pub fairness: Option<FairnessOutcome>,
    pub risk: RiskAssessment,
}

#[derive(Clone)]
pub struct Engine {
    pool: SqlitePool,
    config: EngineConfig,
    model_locks: Arc<Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>>,
}

impl Engine {
    pub fn new(pool: SqlitePool, config: EngineConfig) -> Self {
        Self {
            pool,
            config,
            model_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Connect to the configured database, apply the schema, and build the
    /// engine.
    pub async fn connect(config: EngineConfig) -> EngineResult<Self> {
        let pool = db::create_pool(&config.database_url).await?;
        db::run_migrations(&pool).await?;
        Ok(Self::new(pool, config))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Mutual exclusion scoped to one model id.
    ///
    /// Entries live for the lifetime of the engine; the map stays bounded by
    /// the number of registered models (there is no unregister path).
    fn lock_for(&self, model_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.model_locks.lock().expect("model lock map poisoned");
        locks.entry(model_id).or_default().clone()
    }

    async fn require_model(&self, model_id: i64) -> EngineResult<RegisteredModel> {
        RegisteredModel::find_by_id(&self.pool, model_id)
            .await?
            .ok_or(EngineError::ModelNotFound(model_id))
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    pub async fn register_model(&self, data: RegisterModel) -> EngineResult<RegisteredModel> {
        Ok(RegisteredModel::create(&self.pool, data).await?)
    }

    pub async fn get_model(&self, model_id: i64) -> EngineResult<RegisteredModel> {
        self.require_model(model_id).await
    }

    pub async fn list_models(&self, limit: i64, offset: i64) -> EngineResult<Vec<RegisteredModel>> {
        Ok(RegisteredModel::list(&self.pool, limit, offset).await?)
    }

    // ------------------------------------------------------------------
    // Ingest
    // ------------------------------------------------------------------

    /// Append a prediction batch for a model. Append-only, atomic.
    pub async fn ingest_predictions(
        &self,
        model_id: i64,
        batch: &[IngestPrediction],
    ) -> EngineResult<usize> {
        self.require_model(model_id).await?;
        PredictionRecord::ingest_batch(&self.pool, model_id, batch).await
    }

    // ------------------------------------------------------------------
    // Recalculation
    // ------------------------------------------------------------------

    pub async fn recalculate_drift(
        &self,
        model_id: i64,
        features: Option<Vec<String>>,
    ) -> EngineResult<DriftOutcome> {
        self.require_model(model_id).await?;
        let lock = self.lock_for(model_id);
        let _guard = lock.lock().await;
        drift::run(&self.pool, &self.config, model_id, features).await
    }

    pub async fn recalculate_fairness(
        &self,
        model_id: i64,
        protected_attribute: &str,
    ) -> EngineResult<FairnessOutcome> {
        self.require_model(model_id).await?;
        let lock = self.lock_for(model_id);
        let _guard = lock.lock().await;
        fairness::run(&self.pool, &self.config, model_id, protected_attribute).await
    }

    pub async fn recalculate_risk(&self, model_id: i64) -> EngineResult<RiskAssessment> {
        self.require_model(model_id).await?;
        let lock = self.lock_for(model_id);
        let _guard = lock.lock().await;
        risk::score(&self.pool, &self.config, model_id).await
    }

    /// Full recalculation pipeline for one model under a single lock hold:
    /// drift, optional fairness, then the composite risk entry.
    pub async fn recalculate(
        &self,
        model_id: i64,
        protected_attribute: Option<&str>,
    ) -> EngineResult<RecalculationSummary> {
        self.require_model(model_id).await?;
        let lock = self.lock_for(model_id);
        let _guard = lock.lock().await;

        let drift = drift::run(&self.pool, &self.config, model_id, None).await?;
        let fairness = match protected_attribute {
            Some(attr) => Some(fairness::run(&self.pool, &self.config, model_id, attr).await?),
            None => None,
        };
        let risk = risk::score(&self.pool, &self.config, model_id).await?;

        Ok(RecalculationSummary {
            drift,
            fairness,
            risk,
        })
    }

    /// Offload a full recalculation to the background so the triggering
    /// request can return immediately; callers await or poll the handle.
    /// Decision paths never consume in-flight results: governance and
    /// deployment always re-read committed rows.
    pub fn spawn_recalculation(
        &self,
        model_id: i64,
        protected_attribute: Option<String>,
    ) -> JoinHandle<EngineResult<RecalculationSummary>> {
        let engine = self.clone();
        tokio::spawn(async move {
            engine
                .recalculate(model_id, protected_attribute.as_deref())
                .await
        })
    }

    // ------------------------------------------------------------------
    // Governance & deployment
    // ------------------------------------------------------------------

    /// Evaluate the model against the active policy. Blocks until a fresh
    /// result is available and writes exactly one audit entry.
    pub async fn evaluate_governance(
        &self,
        actor_id: i64,
        model_id: i64,
    ) -> EngineResult<GovernanceDecision> {
        governance::evaluate(&self.pool, actor_id, model_id).await
    }

    /// Attempt a deployment. Serialized per model; re-evaluates governance
    /// inside the critical section so two concurrent attempts cannot both
    /// act on conflicting outcomes.
    pub async fn deploy(
        &self,
        actor_id: i64,
        model_id: i64,
        request: DeployRequest,
    ) -> EngineResult<DeploymentOutcome> {
        self.require_model(model_id).await?;
        let lock = self.lock_for(model_id);
        let _guard = lock.lock().await;
        deployment::execute(&self.pool, actor_id, model_id, request).await
    }

    // ------------------------------------------------------------------
    // Policy administration
    // ------------------------------------------------------------------

    pub async fn create_policy(&self, data: CreatePolicy) -> EngineResult<GovernancePolicy> {
        GovernancePolicy::create(&self.pool, data).await
    }

    pub async fn update_policy(&self, id: i64, data: UpdatePolicy) -> EngineResult<GovernancePolicy> {
        GovernancePolicy::update(&self.pool, id, data).await
    }

    /// Atomic swap: deactivates all policies and activates the given one in
    /// a single transaction.
    pub async fn activate_policy(&self, id: i64) -> EngineResult<GovernancePolicy> {
        GovernancePolicy::activate(&self.pool, id).await
    }

    pub async fn active_policy(&self) -> EngineResult<Option<GovernancePolicy>> {
        Ok(GovernancePolicy::get_active(&self.pool).await?)
    }

    pub async fn list_policies(&self) -> EngineResult<Vec<GovernancePolicy>> {
        Ok(GovernancePolicy::list(&self.pool).await?)
    }

    // ------------------------------------------------------------------
    // Audit queries
    // ------------------------------------------------------------------

    pub async fn audit_trail(&self, filter: AuditFilter) -> EngineResult<Vec<AuditEntry>> {
        Ok(AuditEntry::query(&self.pool, filter).await?)
    }

    pub async fn model_audit_trail(
        &self,
        model_id: i64,
        limit: i64,
    ) -> EngineResult<Vec<AuditEntry>> {
        Ok(AuditEntry::trail_for_model(&self.pool, model_id, limit).await?)
    }

    pub async fn deployment_history(
        &self,
        model_id: i64,
        limit: i64,
    ) -> EngineResult<Vec<AuditEntry>> {
        Ok(AuditEntry::deployment_history(&self.pool, model_id, limit).await?)
    }

    pub async fn overrides_by_actor(
        &self,
        actor_id: i64,
        limit: i64,
    ) -> EngineResult<Vec<AuditEntry>> {
        Ok(AuditEntry::overrides_by_actor(&self.pool, actor_id, limit).await?)
    }

    pub async fn blocked_attempts(&self, limit: i64) -> EngineResult<Vec<AuditEntry>> {
        Ok(AuditEntry::blocked_attempts(&self.pool, limit).await?)
    }
}
