//! Database module - SQLite connection and migrations

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

/// Create database connection pool
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

/// Create a single-connection in-memory pool.
///
/// SQLite gives every connection its own `:memory:` database, so anything
/// that must share state across queries (tests, embedded use) needs exactly
/// one connection.
pub async fn create_memory_pool() -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;

    tracing::info!("Database schema applied successfully");
    Ok(())
}

/// Database schema SQL
const SCHEMA_SQL: &str = r#"
-- Registered models
CREATE TABLE IF NOT EXISTS model_registry (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    model_name TEXT NOT NULL,
    version TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'draft',
    created_at TEXT NOT NULL
);

-- Prediction logs (append-only, fed by the external serving system)
CREATE TABLE IF NOT EXISTS prediction_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    model_id INTEGER NOT NULL REFERENCES model_registry(id),
    input_features TEXT NOT NULL,
    prediction REAL NOT NULL,
    actual_label REAL,
    timestamp TEXT NOT NULL
);

-- Drift metrics (one row per feature per calculation run)
CREATE TABLE IF NOT EXISTS drift_metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    model_id INTEGER NOT NULL REFERENCES model_registry(id),
    feature_name TEXT NOT NULL,
    psi_value REAL NOT NULL,
    ks_statistic REAL NOT NULL,
    drift_flag INTEGER NOT NULL DEFAULT 0,
    timestamp TEXT NOT NULL
);

-- Fairness metrics (one row per protected-attribute group per run)
CREATE TABLE IF NOT EXISTS fairness_metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    model_id INTEGER NOT NULL REFERENCES model_registry(id),
    protected_attribute TEXT NOT NULL,
    group_name TEXT NOT NULL,
    total_predictions INTEGER NOT NULL DEFAULT 0,
    positive_predictions INTEGER NOT NULL DEFAULT 0,
    approval_rate REAL NOT NULL DEFAULT 0.0,
    disparity_score REAL NOT NULL DEFAULT 0.0,
    fairness_flag INTEGER NOT NULL DEFAULT 0,
    timestamp TEXT NOT NULL
);

-- Risk history (append-only, latest entry is authoritative)
CREATE TABLE IF NOT EXISTS risk_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    model_id INTEGER NOT NULL REFERENCES model_registry(id),
    risk_score REAL NOT NULL,
    drift_component REAL NOT NULL,
    fairness_component REAL NOT NULL DEFAULT 0.0,
    timestamp TEXT NOT NULL
);

-- Governance policies (at most one row active at a time)
CREATE TABLE IF NOT EXISTS governance_policies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    max_allowed_risk REAL NOT NULL,
    max_allowed_disparity REAL NOT NULL,
    approval_required_above_risk REAL NOT NULL,
    active INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Audit log (immutable, append-only)
CREATE TABLE IF NOT EXISTS audit_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    actor_id INTEGER NOT NULL,
    model_id INTEGER NOT NULL REFERENCES model_registry(id),
    action TEXT NOT NULL,
    outcome TEXT NOT NULL,
    risk_score REAL,
    disparity_score REAL,
    governance_status TEXT,
    override_used INTEGER NOT NULL DEFAULT 0,
    override_justification TEXT,
    details TEXT NOT NULL,
    timestamp TEXT NOT NULL
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_predictions_model_ts ON prediction_logs(model_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_drift_model_ts ON drift_metrics(model_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_fairness_model_ts ON fairness_metrics(model_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_risk_model_ts ON risk_history(model_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_audit_model_ts ON audit_logs(model_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_audit_actor ON audit_logs(actor_id, timestamp);
"#;
