//! Scoring engine: rule weights, bands, leniency, and the
//! order-dependent periodic heuristic.

use fraudwatch_core::{
    config::WatchConfig,
    rng::ScoreRng,
    scoring::{ContractFinancialProfile, RiskFactor, RiskLevel, ScoringEngine},
};

fn test_engine() -> ScoringEngine {
    ScoringEngine::new(WatchConfig::default_test().scoring, ScoreRng::seeded(1))
}

/// premium 500, fees 250, market 10 000, catalog 9 000, five principal
/// coverages, no theft/fire.
fn broad_cover_profile() -> ContractFinancialProfile {
    ContractFinancialProfile {
        contract_id: "C-42".into(),
        premium: 500.0,
        fees: 250.0,
        market_value: 10_000.0,
        catalog_value: 9_000.0,
        liability: 300.0,
        vehicle_damage: 200.0,
        collision: 150.0,
        glass_breakage: 50.0,
        legal_protection: 25.0,
        ..Default::default()
    }
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

/// Coverage breadth, market above catalog and fees fire: 0.30 + 0.25 + 0.20.
#[test]
fn broad_cover_profile_scores_high() {
    let mut engine = test_engine();
    let assessment = engine.evaluate(&broad_cover_profile());

    assert!(
        approx(assessment.fraud_probability(), 0.75),
        "Expected 0.75, got {}",
        assessment.fraud_probability()
    );
    assert_eq!(assessment.risk_level(), RiskLevel::High);
    assert!(assessment.is_fraud());
    assert_eq!(
        assessment.risk_factors,
        vec![
            RiskFactor::ExcessiveCoverage.description().to_string(),
            RiskFactor::MarketAboveCatalog.description().to_string(),
            RiskFactor::SevereFees.description().to_string(),
        ]
    );
    assert_eq!(assessment.reason, RiskFactor::ExcessiveCoverage.description());
    assert_eq!(
        assessment.recommendation,
        "MANDATORY MANUAL REVIEW - high fraud risk"
    );
}

/// An empty profile triggers nothing and reads NORMAL.
#[test]
fn clean_profile_is_normal() {
    let mut engine = test_engine();
    let assessment = engine.evaluate(&ContractFinancialProfile::default());

    assert_eq!(assessment.fraud_probability(), 0.0);
    assert_eq!(assessment.risk_level(), RiskLevel::Normal);
    assert!(!assessment.is_fraud());
    assert!(assessment.risk_factors.is_empty());
    assert_eq!(assessment.reason, "No significant risk detected");
    assert_eq!(assessment.recommendation, "Contract approved automatically");
}

/// The periodic heuristic fires on evaluations 3, 4, 6, 8, 9, 12.
#[test]
fn periodic_heuristic_follows_evaluation_counter() {
    let mut engine = test_engine();
    let empty = ContractFinancialProfile::default();

    let flagged: Vec<u64> = (1..=12u64)
        .filter(|_| {
            let a = engine.evaluate(&empty);
            a.risk_factors
                .iter()
                .any(|f| f == RiskFactor::PeriodicHeuristic.description())
        })
        .collect();
    // filter() runs in order, so the n-th closure call is evaluation n.
    assert_eq!(flagged, vec![3, 4, 6, 8, 9, 12]);
    assert_eq!(engine.evaluation_count(), 12);
}

/// reset_counter() restarts the periodic sequence.
#[test]
fn reset_counter_restores_starting_point() {
    let mut engine = test_engine();
    let empty = ContractFinancialProfile::default();
    for _ in 0..3 {
        engine.evaluate(&empty);
    }
    engine.reset_counter();
    assert_eq!(engine.evaluation_count(), 0);

    let first = engine.evaluate(&empty);
    assert!(first.risk_factors.is_empty(), "First evaluation after reset must not be flagged");
}

/// The periodic heuristic can be switched off.
#[test]
fn periodic_heuristic_can_be_disabled() {
    let mut config = WatchConfig::default_test().scoring;
    config.periodic_heuristic = false;
    let mut engine = ScoringEngine::new(config, ScoreRng::seeded(1));
    let empty = ContractFinancialProfile::default();

    for _ in 0..12 {
        let a = engine.evaluate(&empty);
        assert_eq!(a.risk_level(), RiskLevel::Normal);
    }
}

/// Identifier pattern plus low premium on a valuable car: 0.40 + 0.35.
#[test]
fn pattern_and_low_premium_combine() {
    let mut engine = test_engine();
    let profile = ContractFinancialProfile {
        contract_id: "POL-000007".into(),
        premium: 400.0,
        market_value: 40_000.0,
        ..Default::default()
    };
    let assessment = engine.evaluate(&profile);

    assert!(approx(assessment.fraud_probability(), 0.75));
    assert_eq!(assessment.reason, RiskFactor::HistoricalPattern.description());
    assert!(assessment
        .risk_factors
        .contains(&RiskFactor::LowPremiumHighValue.description().to_string()));
}

/// Theft cover above 1 000 on a car assumed to be 15 years old.
#[test]
fn aged_vehicle_rule_uses_reference_year() {
    let engine = test_engine();
    let profile = ContractFinancialProfile {
        theft: 1_500.0,
        market_value: 50_000.0,
        premium: 2_000.0,
        ..Default::default()
    };
    let factors = engine.triggered_factors(&profile, 1);
    assert_eq!(factors, vec![RiskFactor::AgedVehicleCoverage]);

    let mut young = WatchConfig::default_test().scoring;
    young.reference_year = 2015;
    let engine = ScoringEngine::new(young, ScoreRng::seeded(1));
    assert!(engine.triggered_factors(&profile, 1).is_empty());
}

/// Without a catalog value the market-over-catalog rule stays quiet.
#[test]
fn market_rule_needs_catalog_value() {
    let engine = test_engine();
    let profile = ContractFinancialProfile {
        premium: 1_000.0,
        market_value: 20_000.0,
        catalog_value: 0.0,
        ..Default::default()
    };
    assert!(engine.triggered_factors(&profile, 1).is_empty());
}

/// Premium ratio bands: > 0.25 severe, > 0.15 elevated.
#[test]
fn premium_ratio_bands() {
    let engine = test_engine();
    let severe = ContractFinancialProfile {
        premium: 3_000.0,
        market_value: 10_000.0,
        ..Default::default()
    };
    let elevated = ContractFinancialProfile {
        premium: 2_000.0,
        market_value: 10_000.0,
        ..Default::default()
    };
    assert_eq!(engine.triggered_factors(&severe, 1), vec![RiskFactor::SeverePremiumRatio]);
    assert_eq!(engine.triggered_factors(&elevated, 1), vec![RiskFactor::ElevatedPremiumRatio]);
}

/// Probability and confidence stay in range under full jitter.
#[test]
fn outputs_stay_in_range_with_jitter() {
    let mut config = WatchConfig::default_test().scoring;
    config.jitter_amplitude = 0.05;
    let mut engine = ScoringEngine::new(config, ScoreRng::seeded(99));
    let mut rng = ScoreRng::seeded(5);

    for i in 0..500 {
        let profile = ContractFinancialProfile {
            contract_id: format!("C-{i:06}"),
            premium: rng.uniform(0.0, 5_000.0),
            fees: rng.uniform(0.0, 2_000.0),
            theft: rng.uniform(0.0, 3_000.0),
            fire: rng.uniform(0.0, 3_000.0),
            liability: rng.uniform(0.0, 500.0),
            market_value: rng.uniform(0.0, 60_000.0),
            catalog_value: rng.uniform(0.0, 60_000.0),
            ..Default::default()
        };
        let a = engine.evaluate(&profile);
        let p = a.fraud_probability();
        assert!((0.0..=1.0).contains(&p), "Probability out of range: {p}");
        assert!(
            (0.82..=1.0).contains(&a.confidence),
            "Confidence out of range: {}",
            a.confidence
        );
        assert_eq!(a.is_fraud(), p > 0.45, "is_fraud disagrees with p={p}");
    }
}

/// Original form field names, string amounts and junk all deserialize.
#[test]
fn lenient_profile_json() {
    let raw = r#"{
        "contractId": 42,
        "totalPrimeNette": "500",
        "frais": 250,
        "valeurVenale": 10000,
        "valeurCatalogue": "9000",
        "rc": 1, "dommagesAuVehicule": 1, "dommagesEtCollision": 1,
        "brisDeGlaces": 1, "pta": 1,
        "vol": null, "incendie": "n/a", "carglass": -4
    }"#;
    let profile: ContractFinancialProfile = serde_json::from_str(raw).unwrap();

    assert_eq!(profile.contract_id, "42");
    assert_eq!(profile.premium, 500.0);
    assert_eq!(profile.catalog_value, 9_000.0);
    assert_eq!(profile.theft, 0.0);
    assert_eq!(profile.fire, 0.0);
    assert_eq!(profile.glass_assistance, 0.0);
    assert_eq!(profile.coverage_count(), 5);

    let mut engine = test_engine();
    assert!(approx(engine.evaluate(&profile).fraud_probability(), 0.75));
}

/// Assessment JSON nests the prediction object.
#[test]
fn assessment_serializes_to_boundary_shape() {
    let mut engine = test_engine();
    let assessment = engine.evaluate(&broad_cover_profile());
    let json = serde_json::to_value(&assessment).unwrap();

    assert_eq!(json["prediction"]["isFraud"], true);
    assert_eq!(json["prediction"]["riskLevel"], "HIGH");
    assert!(json["prediction"]["fraudProbability"].is_number());
    assert!(json["riskFactors"].is_array());
    assert!(json["recommendation"].is_string());
}

/// Batch scoring runs in slice order and bumps the counter per item.
#[test]
fn batch_scoring_is_sequential() {
    let mut engine = test_engine();
    let batch = vec![ContractFinancialProfile::default(); 4];
    let results = engine.evaluate_batch(&batch);

    assert_eq!(results.len(), 4);
    assert_eq!(engine.evaluation_count(), 4);
    assert_eq!(results[0].risk_level(), RiskLevel::Normal);
    assert_eq!(results[1].risk_level(), RiskLevel::Normal);
    assert_ne!(results[2].risk_level(), RiskLevel::Normal, "Third evaluation is periodic");
    assert_ne!(results[3].risk_level(), RiskLevel::Normal, "Fourth evaluation is periodic");
}
