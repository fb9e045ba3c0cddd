//! Configuration module

use std::env;

/// Engine configuration
///
/// All statistical thresholds carry the observed production defaults but are
/// environment-overridable; policy thresholds (block/approval/disparity) live
/// on `GovernancePolicy` rows, not here.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Database connection URL
    pub database_url: String,

    /// Records per drift window (baseline and recent each use this many)
    pub drift_window_size: i64,

    /// Number of equal-frequency buckets for PSI binning
    pub drift_bins: usize,

    /// PSI value at or above which a feature is flagged as drifting
    pub psi_threshold: f64,

    /// KS statistic at or above which a feature is flagged as drifting
    pub ks_threshold: f64,

    /// PSI weight in the drift component blend (KS gets the remainder)
    pub psi_weight: f64,

    /// Calibration ceiling the blended drift score is normalized against
    pub drift_ceiling: f64,

    /// Drift share of the composite risk score (fairness gets the remainder)
    pub drift_risk_weight: f64,

    /// Disparity fallback used by the fairness evaluator when no policy is
    /// active (flag computation only; governance still fails fast)
    pub default_disparity_threshold: f64,
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://modelgate.db".to_string()),

            drift_window_size: env_parse("DRIFT_WINDOW_SIZE", 100),
            drift_bins: env_parse("DRIFT_BINS", 10),
            psi_threshold: env_parse("PSI_THRESHOLD", 0.25),
            ks_threshold: env_parse("KS_THRESHOLD", 0.2),
            psi_weight: env_parse("PSI_WEIGHT", 0.6),
            drift_ceiling: env_parse("DRIFT_CEILING", 1.6),
            drift_risk_weight: env_parse("DRIFT_RISK_WEIGHT", 0.6),
            default_disparity_threshold: env_parse("DEFAULT_DISPARITY_THRESHOLD", 0.25),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            drift_window_size: 100,
            drift_bins: 10,
            psi_threshold: 0.25,
            ks_threshold: 0.2,
            psi_weight: 0.6,
            drift_ceiling: 1.6,
            drift_risk_weight: 0.6,
            default_disparity_threshold: 0.25,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
