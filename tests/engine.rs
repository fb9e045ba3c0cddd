//! End-to-end engine tests on an in-memory database.

use chrono::{Duration, Utc};
use serde_json::json;

use modelgate::engine::{DeployRequest, DriftOutcome, FairnessOutcome};
use modelgate::models::{
    AuditAction, AuditFilter, CreatePolicy, DriftMetric, FairnessMetric, IngestPrediction,
    ModelStatus, NewDriftMetric, NewFairnessMetric, RegisterModel,
};
use modelgate::{db, Engine, EngineConfig, EngineError};

async fn engine() -> Engine {
    let pool = db::create_memory_pool().await.expect("pool");
    db::run_migrations(&pool).await.expect("migrations");
    Engine::new(pool, EngineConfig::default())
}

async fn register(engine: &Engine, name: &str) -> i64 {
    engine
        .register_model(RegisterModel {
            model_name: name.to_string(),
            version: "1.0".to_string(),
            description: None,
        })
        .await
        .expect("register model")
        .id
}

async fn active_policy(
    engine: &Engine,
    name: &str,
    max_risk: f64,
    max_disparity: f64,
    approval_above: f64,
) -> i64 {
    let policy = engine
        .create_policy(CreatePolicy {
            name: name.to_string(),
            max_allowed_risk: max_risk,
            max_allowed_disparity: max_disparity,
            approval_required_above_risk: approval_above,
        })
        .await
        .expect("create policy");
    engine.activate_policy(policy.id).await.expect("activate");
    policy.id
}

/// 200 predictions: baseline half with amounts near $200, recent half near
/// $900, gender split Male/Female with approval rates of exactly 0.70/0.45.
fn shifted_batch() -> Vec<IngestPrediction> {
    let start = Utc::now() - Duration::days(1);
    (0..200)
        .map(|i| {
            let amount = if i < 100 {
                100.0 + 2.0 * i as f64 // baseline window, mean ~$200
            } else {
                700.0 + 4.0 * (i - 100) as f64 // recent window, mean ~$900
            };
            let gender = if i % 2 == 0 { "Male" } else { "Female" };
            let positive = if i % 2 == 0 {
                (i / 2) % 10 < 7 // 70% approval for Male
            } else {
                (i / 2) % 20 < 9 // 45% approval for Female
            };
            IngestPrediction {
                input_features: json!({ "amount": amount, "gender": gender }),
                prediction: if positive { 0.9 } else { 0.1 },
                actual_label: None,
                timestamp: Some(start + Duration::seconds(i)),
            }
        })
        .collect()
}

// ----------------------------------------------------------------------
// Ingest
// ----------------------------------------------------------------------

#[tokio::test]
async fn ingest_rejects_out_of_range_predictions_without_partial_writes() {
    let engine = engine().await;
    let model_id = register(&engine, "credit").await;

    let batch = vec![
        IngestPrediction {
            input_features: json!({ "amount": 10.0 }),
            prediction: 0.4,
            actual_label: None,
            timestamp: None,
        },
        IngestPrediction {
            input_features: json!({ "amount": 20.0 }),
            prediction: 1.7,
            actual_label: None,
            timestamp: None,
        },
    ];

    let err = engine.ingest_predictions(model_id, &batch).await.unwrap_err();
    assert!(matches!(err, EngineError::Input(_)));

    let count =
        modelgate::models::PredictionRecord::count_for_model(engine.pool(), model_id).await.unwrap();
    assert_eq!(count, 0, "no partial batch may survive a validation failure");
}

#[tokio::test]
async fn ingest_unknown_model_is_an_input_error() {
    let engine = engine().await;
    let err = engine.ingest_predictions(999, &[]).await.unwrap_err();
    assert!(matches!(err, EngineError::ModelNotFound(999)));
}

// ----------------------------------------------------------------------
// Drift
// ----------------------------------------------------------------------

#[tokio::test]
async fn drift_with_too_few_records_is_an_explicit_outcome() {
    let engine = engine().await;
    let model_id = register(&engine, "sparse").await;

    let batch: Vec<IngestPrediction> = (0..10)
        .map(|i| IngestPrediction {
            input_features: json!({ "amount": i as f64 }),
            prediction: 0.5,
            actual_label: None,
            timestamp: None,
        })
        .collect();
    engine.ingest_predictions(model_id, &batch).await.unwrap();

    match engine.recalculate_drift(model_id, None).await.unwrap() {
        DriftOutcome::InsufficientData {
            available,
            required,
        } => {
            assert_eq!(available, 10);
            assert_eq!(required, 200);
        }
        other => panic!("expected insufficient data, got {other:?}"),
    }
}

#[tokio::test]
async fn shifted_amounts_flag_drift_and_skip_categorical_features() {
    let engine = engine().await;
    let model_id = register(&engine, "credit").await;
    engine
        .ingest_predictions(model_id, &shifted_batch())
        .await
        .unwrap();

    let outcome = engine.recalculate_drift(model_id, None).await.unwrap();
    let DriftOutcome::Completed {
        metrics,
        skipped_features,
    } = outcome
    else {
        panic!("expected a completed run");
    };

    let amount = metrics
        .iter()
        .find(|m| m.feature_name == "amount")
        .expect("amount metric");
    assert!(amount.psi_value > 0.25, "psi = {}", amount.psi_value);
    assert!(amount.drift_flag);

    // Categorical features are skipped, not fatal
    assert!(skipped_features.contains(&"gender".to_string()));
    assert!(metrics.iter().all(|m| m.feature_name != "gender"));

    // The whole run shares one batch timestamp
    let batch = DriftMetric::latest_batch(engine.pool(), model_id).await.unwrap();
    assert_eq!(batch.len(), metrics.len());
    assert!(batch.windows(2).all(|w| w[0].timestamp == w[1].timestamp));
}

// ----------------------------------------------------------------------
// Fairness
// ----------------------------------------------------------------------

#[tokio::test]
async fn fairness_measures_male_female_disparity() {
    let engine = engine().await;
    let model_id = register(&engine, "credit").await;
    active_policy(&engine, "default", 80.0, 0.15, 60.0).await;
    engine
        .ingest_predictions(model_id, &shifted_batch())
        .await
        .unwrap();

    let outcome = engine
        .recalculate_fairness(model_id, "gender")
        .await
        .unwrap();
    let FairnessOutcome::Completed {
        disparity_score,
        fairness_flag,
        metrics,
    } = outcome
    else {
        panic!("expected a completed run");
    };

    assert!((disparity_score - 0.25).abs() < 1e-9, "disparity = {disparity_score}");
    assert!(fairness_flag, "0.25 exceeds the 0.15 policy threshold");

    assert_eq!(metrics.len(), 2);
    let male = metrics.iter().find(|m| m.group_name == "Male").unwrap();
    let female = metrics.iter().find(|m| m.group_name == "Female").unwrap();
    assert!((male.approval_rate - 0.70).abs() < 1e-9);
    assert!((female.approval_rate - 0.45).abs() < 1e-9);
    // Disparity is stored identically on every row of the run
    assert_eq!(male.disparity_score, female.disparity_score);
}

#[tokio::test]
async fn missing_protected_attribute_is_reported_not_fabricated() {
    let engine = engine().await;
    let model_id = register(&engine, "credit").await;
    engine
        .ingest_predictions(model_id, &shifted_batch())
        .await
        .unwrap();

    let outcome = engine
        .recalculate_fairness(model_id, "nationality")
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        FairnessOutcome::AttributeUnavailable { .. }
    ));
    assert!(FairnessMetric::latest(engine.pool(), model_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn single_group_population_is_insufficient_for_fairness() {
    let engine = engine().await;
    let model_id = register(&engine, "credit").await;

    // Every record carries the same protected attribute value
    let batch: Vec<IngestPrediction> = (0..20)
        .map(|i| IngestPrediction {
            input_features: json!({ "amount": 100.0 + i as f64, "gender": "Male" }),
            prediction: if i % 2 == 0 { 0.9 } else { 0.1 },
            actual_label: None,
            timestamp: None,
        })
        .collect();
    engine.ingest_predictions(model_id, &batch).await.unwrap();

    let outcome = engine
        .recalculate_fairness(model_id, "gender")
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        FairnessOutcome::InsufficientGroups { groups_found: 1 }
    ));

    // A run that cannot compare groups persists nothing
    assert!(FairnessMetric::latest(engine.pool(), model_id)
        .await
        .unwrap()
        .is_none());
}

// ----------------------------------------------------------------------
// Risk
// ----------------------------------------------------------------------

#[tokio::test]
async fn risk_without_metrics_is_zero_but_flagged_partial() {
    let engine = engine().await;
    let model_id = register(&engine, "fresh").await;

    let assessment = engine.recalculate_risk(model_id).await.unwrap();
    assert_eq!(assessment.entry.risk_score, 0.0);
    assert!(assessment.partial);
    assert_eq!(assessment.missing, vec!["drift", "fairness"]);
}

#[tokio::test]
async fn risk_blends_drift_and_fairness_components() {
    let engine = engine().await;
    let model_id = register(&engine, "credit").await;

    // avg_psi=2.0, avg_ks=1.0 saturates the drift component at 100
    DriftMetric::insert_batch(
        engine.pool(),
        model_id,
        &[NewDriftMetric {
            feature_name: "amount".to_string(),
            psi_value: 2.0,
            ks_statistic: 1.0,
            drift_flag: true,
        }],
        Utc::now(),
    )
    .await
    .unwrap();

    seed_fairness(&engine, model_id, 0.125).await;

    let assessment = engine.recalculate_risk(model_id).await.unwrap();
    assert!(!assessment.partial);
    assert!((assessment.entry.drift_component - 100.0).abs() < 1e-9);
    assert!((assessment.entry.fairness_component - 12.5).abs() < 1e-9);
    // 0.6 * 100 + 0.4 * 12.5
    assert!((assessment.entry.risk_score - 65.0).abs() < 1e-9);

    // History is cumulative
    engine.recalculate_risk(model_id).await.unwrap();
    let history = modelgate::models::RiskHistoryEntry::history(engine.pool(), model_id, 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
}

async fn seed_fairness(engine: &Engine, model_id: i64, disparity: f64) {
    let low_positives = 100_i64; // 0.1 approval over 1000
    let high_positives = low_positives + (disparity * 1000.0).round() as i64;
    FairnessMetric::insert_batch(
        engine.pool(),
        model_id,
        &[
            NewFairnessMetric {
                protected_attribute: "gender".to_string(),
                group_name: "A".to_string(),
                total_predictions: 1000,
                positive_predictions: low_positives,
                approval_rate: low_positives as f64 / 1000.0,
                disparity_score: disparity,
                fairness_flag: false,
            },
            NewFairnessMetric {
                protected_attribute: "gender".to_string(),
                group_name: "B".to_string(),
                total_predictions: 1000,
                positive_predictions: high_positives,
                approval_rate: high_positives as f64 / 1000.0,
                disparity_score: disparity,
                fairness_flag: false,
            },
        ],
        Utc::now(),
    )
    .await
    .unwrap();
}

/// Drive a model to an exact risk score through directly seeded metrics.
async fn seed_risk(engine: &Engine, model_id: i64, disparity: f64) -> f64 {
    DriftMetric::insert_batch(
        engine.pool(),
        model_id,
        &[NewDriftMetric {
            feature_name: "amount".to_string(),
            psi_value: 2.0,
            ks_statistic: 1.0,
            drift_flag: true,
        }],
        Utc::now(),
    )
    .await
    .unwrap();
    seed_fairness(engine, model_id, disparity).await;
    engine
        .recalculate_risk(model_id)
        .await
        .unwrap()
        .entry
        .risk_score
}

// ----------------------------------------------------------------------
// Governance
// ----------------------------------------------------------------------

#[tokio::test]
async fn governance_without_active_policy_fails_fast() {
    let engine = engine().await;
    let model_id = register(&engine, "credit").await;

    let err = engine.evaluate_governance(1, model_id).await.unwrap_err();
    assert!(matches!(err, EngineError::NoActivePolicy));
}

#[tokio::test]
async fn every_evaluation_writes_exactly_one_audit_entry() {
    let engine = engine().await;
    let model_id = register(&engine, "credit").await;
    active_policy(&engine, "default", 80.0, 0.15, 60.0).await;

    for _ in 0..3 {
        engine.evaluate_governance(7, model_id).await.unwrap();
    }

    let evaluations = engine
        .audit_trail(AuditFilter {
            model_id: Some(model_id),
            action: Some(AuditAction::GovernanceEvaluate),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(evaluations.len(), 3);
}

#[tokio::test]
async fn high_risk_is_blocked_idempotently() {
    let engine = engine().await;
    let model_id = register(&engine, "credit").await;
    active_policy(&engine, "strict", 75.0, 0.7, 60.0).await;

    // drift 100, fairness 62.5 -> risk 85
    let risk = seed_risk(&engine, model_id, 0.625).await;
    assert!((risk - 85.0).abs() < 1e-9);

    for _ in 0..3 {
        let decision = engine.evaluate_governance(1, model_id).await.unwrap();
        assert_eq!(decision.status, ModelStatus::Blocked);
        assert!(decision.reason.contains("exceeds max allowed"));
    }
    assert_eq!(
        engine.get_model(model_id).await.unwrap().status,
        ModelStatus::Blocked
    );
}

#[tokio::test]
async fn inconsistent_policy_refuses_evaluation() {
    let engine = engine().await;
    let err = engine
        .create_policy(CreatePolicy {
            name: "upside-down".to_string(),
            max_allowed_risk: 50.0,
            max_allowed_disparity: 0.2,
            approval_required_above_risk: 80.0,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidPolicy(_)));
}

// ----------------------------------------------------------------------
// Policy activation invariant
// ----------------------------------------------------------------------

#[tokio::test]
async fn exactly_one_policy_is_active_after_any_activation_sequence() {
    let engine = engine().await;

    let mut ids = Vec::new();
    for name in ["a", "b", "c"] {
        let policy = engine
            .create_policy(CreatePolicy {
                name: name.to_string(),
                max_allowed_risk: 80.0,
                max_allowed_disparity: 0.15,
                approval_required_above_risk: 60.0,
            })
            .await
            .unwrap();
        ids.push(policy.id);
    }

    for &id in &[ids[0], ids[2], ids[1], ids[2]] {
        engine.activate_policy(id).await.unwrap();
        let active: Vec<_> = engine
            .list_policies()
            .await
            .unwrap()
            .into_iter()
            .filter(|p| p.active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, id);
    }

    // Activating an unknown id rolls back and keeps the previous policy
    let err = engine.activate_policy(9999).await.unwrap_err();
    assert!(matches!(err, EngineError::Input(_)));
    assert_eq!(engine.active_policy().await.unwrap().unwrap().id, ids[2]);
}

#[tokio::test]
async fn duplicate_policy_names_are_rejected() {
    let engine = engine().await;
    let create = CreatePolicy {
        name: "default".to_string(),
        max_allowed_risk: 80.0,
        max_allowed_disparity: 0.15,
        approval_required_above_risk: 60.0,
    };
    engine.create_policy(create.clone()).await.unwrap();
    let err = engine.create_policy(create).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyExists(_)));
}

// ----------------------------------------------------------------------
// Deployment
// ----------------------------------------------------------------------

#[tokio::test]
async fn hard_block_is_override_proof() {
    let engine = engine().await;
    let model_id = register(&engine, "credit").await;
    active_policy(&engine, "strict", 75.0, 0.7, 60.0).await;
    let risk = seed_risk(&engine, model_id, 0.625).await; // 85
    assert!(risk > 75.0);

    let outcome = engine
        .deploy(
            1,
            model_id,
            DeployRequest {
                override_requested: true,
                justification: Some("valid reason text, long enough to count".to_string()),
            },
        )
        .await
        .unwrap();

    assert!(!outcome.accepted);
    assert_eq!(outcome.new_state, ModelStatus::Blocked);
    assert!(!outcome.override_used);
    assert!(outcome.reason.contains("override not permitted"));
    assert_eq!(
        engine.get_model(model_id).await.unwrap().status,
        ModelStatus::Blocked
    );

    // The denied attempt is forensically visible
    let blocked = engine.blocked_attempts(10).await.unwrap();
    assert!(blocked
        .iter()
        .any(|e| e.action == AuditAction::Deployment && e.model_id == model_id));
}

#[tokio::test]
async fn at_risk_deploy_walkthrough() {
    let engine = engine().await;
    let model_id = register(&engine, "credit").await;
    // risk 65, approval gate 60, hard block 80, disparity below threshold
    active_policy(&engine, "default", 80.0, 0.15, 60.0).await;
    let risk = seed_risk(&engine, model_id, 0.125).await;
    assert!((risk - 65.0).abs() < 1e-9);

    // Without override: denied, caller told to supply one
    let denied = engine
        .deploy(1, model_id, DeployRequest::default())
        .await
        .unwrap();
    assert!(!denied.accepted);
    assert_eq!(denied.new_state, ModelStatus::AtRisk);
    assert!(denied.reason.contains("override"));

    // Override with a short justification: denied
    let short = engine
        .deploy(
            1,
            model_id,
            DeployRequest {
                override_requested: true,
                justification: Some("too short".to_string()),
            },
        )
        .await
        .unwrap();
    assert!(!short.accepted);
    assert!(short.reason.contains("at least 20 characters"));
    assert_eq!(
        engine.get_model(model_id).await.unwrap().status,
        ModelStatus::AtRisk
    );

    // Override with a 25-character justification: accepted
    let justification = "approved by risk committee".to_string();
    assert!(justification.chars().count() >= 20);
    let accepted = engine
        .deploy(
            42,
            model_id,
            DeployRequest {
                override_requested: true,
                justification: Some(justification.clone()),
            },
        )
        .await
        .unwrap();
    assert!(accepted.accepted);
    assert!(accepted.override_used);
    assert_eq!(accepted.new_state, ModelStatus::Deployed);
    assert_eq!(
        engine.get_model(model_id).await.unwrap().status,
        ModelStatus::Deployed
    );

    // Exactly one audit entry carries the override, with the justification verbatim
    let overrides = engine.overrides_by_actor(42, 10).await.unwrap();
    assert_eq!(overrides.len(), 1);
    assert_eq!(overrides[0].action, AuditAction::Override);
    assert_eq!(
        overrides[0].override_justification.as_deref(),
        Some(justification.as_str())
    );
    assert_eq!(overrides[0].outcome.as_str(), "success");

    // Deployment history spans both plain attempts and the override
    let deployments = engine.deployment_history(model_id, 10).await.unwrap();
    assert_eq!(deployments.len(), 3);
    assert!(deployments.iter().any(|e| e.action == AuditAction::Override));
    assert!(deployments
        .iter()
        .any(|e| e.action == AuditAction::Deployment));
}

#[tokio::test]
async fn approved_deploy_ignores_the_override_flag() {
    let engine = engine().await;
    let model_id = register(&engine, "credit").await;
    active_policy(&engine, "lenient", 95.0, 0.99, 90.0).await;
    seed_risk(&engine, model_id, 0.1).await;

    let outcome = engine
        .deploy(
            1,
            model_id,
            DeployRequest {
                override_requested: true,
                justification: Some("unnecessary but supplied anyway".to_string()),
            },
        )
        .await
        .unwrap();

    assert!(outcome.accepted);
    assert!(!outcome.override_used, "approved models record no override");
    assert!(engine.overrides_by_actor(1, 10).await.unwrap().is_empty());
}

// ----------------------------------------------------------------------
// Background recalculation + end-to-end pipeline
// ----------------------------------------------------------------------

#[tokio::test]
async fn full_pipeline_from_ingest_to_deployment() {
    let engine = engine().await;
    let model_id = register(&engine, "credit").await;
    active_policy(&engine, "default", 80.0, 0.15, 60.0).await;
    engine
        .ingest_predictions(model_id, &shifted_batch())
        .await
        .unwrap();

    let summary = engine
        .spawn_recalculation(model_id, Some("gender".to_string()))
        .await
        .expect("join")
        .expect("recalculation");

    assert!(matches!(summary.drift, DriftOutcome::Completed { .. }));
    assert!(matches!(
        summary.fairness,
        Some(FairnessOutcome::Completed { .. })
    ));
    assert!(!summary.risk.partial);

    // Disparity 0.25 > 0.15: at risk, override path required
    let decision = engine.evaluate_governance(1, model_id).await.unwrap();
    assert_eq!(decision.status, ModelStatus::AtRisk);
    assert!(decision.reason.contains("Disparity"));

    let denied = engine
        .deploy(1, model_id, DeployRequest::default())
        .await
        .unwrap();
    assert!(!denied.accepted);

    let accepted = engine
        .deploy(
            1,
            model_id,
            DeployRequest {
                override_requested: true,
                justification: Some("shadow-tested for two weeks, fairness fix scheduled".to_string()),
            },
        )
        .await
        .unwrap();
    assert!(accepted.accepted);
    assert_eq!(
        engine.get_model(model_id).await.unwrap().status,
        ModelStatus::Deployed
    );

    // Trail covers evaluations and deployment attempts
    let trail = engine.model_audit_trail(model_id, 50).await.unwrap();
    assert!(trail.len() >= 4);
    let deployments = engine.deployment_history(model_id, 50).await.unwrap();
    assert_eq!(deployments.len(), 2);
}
