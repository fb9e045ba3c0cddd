//! Modelgate - Model Risk & Governance Evaluation Engine
//!
//! Turns raw prediction logs into drift metrics, fairness metrics, a
//! composite Model Risk Index and a governance decision, and gates
//! deployment on the result. Every decision leaves an immutable audit entry.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         MODELGATE                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌──────────┐ │
//! │  │  Drift   │   │ Fairness  │   │   Risk   │   │Governance│ │
//! │  │ Detector │──▶│ Evaluator │──▶│  Scorer  │──▶│  Engine  │ │
//! │  └────┬─────┘   └─────┬─────┘   └────┬─────┘   └────┬─────┘ │
//! │       │               │              │              ▼        │
//! │       │               │              │       ┌──────────┐   │
//! │       │               │              │       │Deployment│   │
//! │       │               │              │       │Controller│   │
//! │       │               │              │       └────┬─────┘   │
//! │       └───────────────┴──────┬───────┴────────────┘         │
//! │                              ▼                              │
//! │                      ┌──────────────┐                       │
//! │                      │ SQLite (sqlx)│  + audit trail        │
//! │                      └──────────────┘                       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The crate is consumed by an HTTP layer that is out of scope here; the
//! [`Engine`] facade is the integration surface.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod logging;
pub mod models;

pub use config::EngineConfig;
pub use engine::{
    DeploymentOutcome, DriftOutcome, Engine, FairnessOutcome, GovernanceDecision,
    RecalculationSummary, RiskAssessment,
};
pub use error::{EngineError, EngineResult};
