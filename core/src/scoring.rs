//! Fraud scoring: additive weighted rules over a contract's
//! financial profile.
//!
//! RULES:
//!   - evaluate() never fails. Missing or malformed amounts are 0.
//!   - Each call bumps the engine's evaluation counter BEFORE the
//!     rules run; the periodic heuristic reads it, so results depend
//!     on call order. reset_counter() restores a known starting point.
//!   - Jitter and confidence come from the injected ScoreRng only.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{config::ScoringConfig, rng::ScoreRng};

// ── Constants ────────────────────────────────────────────────────────────────

const SEVERE_PREMIUM_RATIO: f64 = 0.25;
const ELEVATED_PREMIUM_RATIO: f64 = 0.15;
const BROAD_COVERAGE_COUNT: usize = 5;
const BROAD_COVERAGE_VALUE_CEILING: f64 = 15_000.0;
const WIDE_COVERAGE_COUNT: usize = 4;
const WIDE_COVERAGE_VALUE_CEILING: f64 = 10_000.0;
const MARKET_OVER_CATALOG_FACTOR: f64 = 1.1;
const SEVERE_FEE_SHARE: f64 = 0.40;
const ELEVATED_FEE_SHARE: f64 = 0.25;
const AGED_VEHICLE_YEARS: i32 = 10;
const AGED_COVERAGE_FLOOR: f64 = 1_000.0;
const LOW_PREMIUM_CEILING: f64 = 500.0;
const HIGH_VALUE_FLOOR: f64 = 30_000.0;

const NO_RISK_REASON: &str = "No significant risk detected";
const COMBINED_RISK_REASON: &str = "Combination of elevated risk factors";

// ── Input ────────────────────────────────────────────────────────────────────

/// Financial attributes of a motor insurance contract.
///
/// Deserialization is lenient: every field is optional, accepts the
/// original form field names as aliases, and coerces null, unparsable
/// strings, negatives and non-finite numbers to 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContractFinancialProfile {
    #[serde(deserialize_with = "lenient_id")]
    pub contract_id: String,

    #[serde(alias = "totalPrimeNette", deserialize_with = "lenient_amount")]
    pub premium: f64,
    #[serde(alias = "frais", deserialize_with = "lenient_amount")]
    pub fees: f64,

    // Principal coverages (counted by the coverage-breadth rule).
    #[serde(alias = "rc", deserialize_with = "lenient_amount")]
    pub liability: f64,
    #[serde(alias = "incendie", deserialize_with = "lenient_amount")]
    pub fire: f64,
    #[serde(alias = "vol", deserialize_with = "lenient_amount")]
    pub theft: f64,
    #[serde(alias = "dommagesAuVehicule", deserialize_with = "lenient_amount")]
    pub vehicle_damage: f64,
    #[serde(alias = "dommagesEtCollision", deserialize_with = "lenient_amount")]
    pub collision: f64,
    #[serde(alias = "brisDeGlaces", deserialize_with = "lenient_amount")]
    pub glass_breakage: f64,
    #[serde(alias = "pta", deserialize_with = "lenient_amount")]
    pub legal_protection: f64,

    // Secondary coverages.
    #[serde(alias = "catastropheNaturelle", deserialize_with = "lenient_amount")]
    pub natural_catastrophe: f64,
    #[serde(alias = "emeuteMouvementPopulaire", deserialize_with = "lenient_amount")]
    pub civil_unrest: f64,
    #[serde(alias = "volRadioCassette", deserialize_with = "lenient_amount")]
    pub radio_theft: f64,
    #[serde(alias = "assistanceEtCarglass", deserialize_with = "lenient_amount")]
    pub assistance: f64,
    #[serde(alias = "carglass", deserialize_with = "lenient_amount")]
    pub glass_assistance: f64,

    // Insured capitals.
    #[serde(alias = "capitaleInc", deserialize_with = "lenient_amount")]
    pub capital_fire: f64,
    #[serde(alias = "capitaleVol", deserialize_with = "lenient_amount")]
    pub capital_theft: f64,
    #[serde(alias = "capitaleDv", deserialize_with = "lenient_amount")]
    pub capital_vehicle_damage: f64,

    #[serde(alias = "valeurCatalogue", deserialize_with = "lenient_amount")]
    pub catalog_value: f64,
    #[serde(alias = "valeurVenale", deserialize_with = "lenient_amount")]
    pub market_value: f64,
}

impl ContractFinancialProfile {
    pub fn principal_coverages(&self) -> [f64; 7] {
        [
            self.liability,
            self.fire,
            self.theft,
            self.vehicle_damage,
            self.glass_breakage,
            self.collision,
            self.legal_protection,
        ]
    }

    pub fn coverage_count(&self) -> usize {
        self.principal_coverages().iter().filter(|a| **a > 0.0).count()
    }
}

/// Coerce any JSON value into a non-negative finite amount.
pub fn coerce_amount(value: &Value) -> f64 {
    let raw = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if raw.is_finite() && raw > 0.0 { raw } else { 0.0 }
}

fn lenient_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_amount(&value))
}

fn lenient_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

// ── Output ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Normal,
    Low,
    Medium,
    High,
    VeryHigh,
    #[serde(other)]
    Unknown,
}

impl RiskLevel {
    /// Band a probability. Bounds are exclusive: 0.8 is HIGH, 0.4 is LOW.
    pub fn from_probability(p: f64) -> Self {
        if p > 0.8 {
            Self::VeryHigh
        } else if p > 0.6 {
            Self::High
        } else if p > 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::VeryHigh => "VERY_HIGH",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudPrediction {
    pub is_fraud: bool,
    pub fraud_probability: f64,
    pub risk_level: RiskLevel,
}

/// Result of one evaluation. Serializes to the scoring boundary shape
/// `{prediction:{isFraud,fraudProbability,riskLevel}, reason, confidence,
/// riskFactors, recommendation}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudAssessment {
    pub prediction: FraudPrediction,
    pub reason: String,
    pub confidence: f64,
    pub risk_factors: Vec<String>,
    pub recommendation: String,
}

impl FraudAssessment {
    pub fn is_fraud(&self) -> bool {
        self.prediction.is_fraud
    }

    pub fn fraud_probability(&self) -> f64 {
        self.prediction.fraud_probability
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.prediction.risk_level
    }
}

// ── Rules ────────────────────────────────────────────────────────────────────

/// A named condition contributing a fixed weight to the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RiskFactor {
    SeverePremiumRatio,
    ElevatedPremiumRatio,
    ExcessiveCoverage,
    BroadCoverage,
    MarketAboveCatalog,
    SevereFees,
    ElevatedFees,
    AgedVehicleCoverage,
    PeriodicHeuristic,
    HistoricalPattern,
    LowPremiumHighValue,
}

impl RiskFactor {
    pub fn weight(&self) -> f64 {
        match self {
            Self::SeverePremiumRatio => 0.35,
            Self::ElevatedPremiumRatio => 0.20,
            Self::ExcessiveCoverage => 0.30,
            Self::BroadCoverage => 0.25,
            Self::MarketAboveCatalog => 0.25,
            Self::SevereFees => 0.20,
            Self::ElevatedFees => 0.15,
            Self::AgedVehicleCoverage => 0.20,
            Self::PeriodicHeuristic => 0.30,
            Self::HistoricalPattern => 0.40,
            Self::LowPremiumHighValue => 0.35,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::SeverePremiumRatio => "Premium disproportionate to vehicle value",
            Self::ElevatedPremiumRatio => "Elevated premium-to-value ratio",
            Self::ExcessiveCoverage => "Excessive coverage breadth for a low-value vehicle",
            Self::BroadCoverage => "Broad coverage for a low-value vehicle",
            Self::MarketAboveCatalog => "Market value exceeds catalog value",
            Self::SevereFees => "Fees disproportionate to premium",
            Self::ElevatedFees => "Elevated fees relative to premium",
            Self::AgedVehicleCoverage => "High theft/fire coverage on an aged vehicle",
            Self::PeriodicHeuristic => "Elevated-risk profile flagged by periodic heuristic",
            Self::HistoricalPattern => "Contract flagged by historical pattern match",
            Self::LowPremiumHighValue => "Very low premium for a high-value vehicle",
        }
    }
}

/// Recommendation text for a probability band.
pub fn recommendation_for(probability: f64, fraud_threshold: f64) -> &'static str {
    if probability > 0.8 {
        "REJECT RECOMMENDED - very high fraud risk"
    } else if probability > 0.6 {
        "MANDATORY MANUAL REVIEW - high fraud risk"
    } else if probability > fraud_threshold {
        "Heightened monitoring recommended - moderate to high risk"
    } else if probability > 0.3 {
        "Standard monitoring recommended - moderate risk"
    } else {
        "Contract approved automatically"
    }
}

// ── Engine ───────────────────────────────────────────────────────────────────

pub struct ScoringEngine {
    config: ScoringConfig,
    rng: ScoreRng,
    evaluations: u64,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig, rng: ScoreRng) -> Self {
        Self { config, rng, evaluations: 0 }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn evaluation_count(&self) -> u64 {
        self.evaluations
    }

    pub fn reset_counter(&mut self) {
        log::debug!("scoring: evaluation counter reset (was {})", self.evaluations);
        self.evaluations = 0;
    }

    /// Factors that fire for `profile` when the counter reads `counter`.
    /// Pure: no RNG, no counter mutation.
    pub fn triggered_factors(
        &self,
        profile: &ContractFinancialProfile,
        counter: u64,
    ) -> Vec<RiskFactor> {
        let mut factors = Vec::new();
        let market_value = profile.market_value;

        // Rule 1: premium relative to market value
        let premium_ratio = profile.premium / market_value.max(1.0);
        if premium_ratio > SEVERE_PREMIUM_RATIO {
            factors.push(RiskFactor::SeverePremiumRatio);
        } else if premium_ratio > ELEVATED_PREMIUM_RATIO {
            factors.push(RiskFactor::ElevatedPremiumRatio);
        }

        // Rule 2: coverage breadth on a cheap vehicle
        let coverage_count = profile.coverage_count();
        if coverage_count >= BROAD_COVERAGE_COUNT && market_value < BROAD_COVERAGE_VALUE_CEILING {
            factors.push(RiskFactor::ExcessiveCoverage);
        } else if coverage_count >= WIDE_COVERAGE_COUNT && market_value < WIDE_COVERAGE_VALUE_CEILING {
            factors.push(RiskFactor::BroadCoverage);
        }

        // Rule 3: market value above catalog (only when a catalog value exists)
        if profile.catalog_value > 0.0
            && market_value > profile.catalog_value * MARKET_OVER_CATALOG_FACTOR
        {
            factors.push(RiskFactor::MarketAboveCatalog);
        }

        // Rule 4: fees relative to premium
        if profile.fees > profile.premium * SEVERE_FEE_SHARE {
            factors.push(RiskFactor::SevereFees);
        } else if profile.fees > profile.premium * ELEVATED_FEE_SHARE {
            factors.push(RiskFactor::ElevatedFees);
        }

        // Rule 5: theft/fire coverage on an aged vehicle
        if self.config.vehicle_age() > AGED_VEHICLE_YEARS
            && (profile.theft > AGED_COVERAGE_FLOOR || profile.fire > AGED_COVERAGE_FLOOR)
        {
            factors.push(RiskFactor::AgedVehicleCoverage);
        }

        // Rule 6: counter-driven heuristic, independent of the profile
        if self.config.periodic_heuristic
            && counter > 0
            && (counter % 3 == 0 || counter % 4 == 0)
        {
            factors.push(RiskFactor::PeriodicHeuristic);
        }

        // Rule 7: identifier pattern match
        if self.config.pattern_heuristic
            && !profile.contract_id.is_empty()
            && self
                .config
                .suspicious_id_patterns
                .iter()
                .any(|p| !p.is_empty() && profile.contract_id.contains(p.as_str()))
        {
            factors.push(RiskFactor::HistoricalPattern);
        }

        // Rule 8: very low premium on a high-value vehicle
        if profile.premium < LOW_PREMIUM_CEILING && market_value > HIGH_VALUE_FLOOR {
            factors.push(RiskFactor::LowPremiumHighValue);
        }

        factors
    }

    /// Score one contract. Never fails.
    pub fn evaluate(&mut self, profile: &ContractFinancialProfile) -> FraudAssessment {
        self.evaluations += 1;
        let factors = self.triggered_factors(profile, self.evaluations);

        let raw_score: f64 = factors.iter().map(RiskFactor::weight).sum();
        let clamped = raw_score.clamp(0.0, 1.0);
        let jitter = self.rng.jitter(self.config.jitter_amplitude);
        let probability = (clamped + jitter).clamp(0.0, 1.0);

        let is_fraud = probability > self.config.fraud_threshold;
        let risk_level = if factors.is_empty() {
            RiskLevel::Normal
        } else {
            RiskLevel::from_probability(probability)
        };

        let floor = self.config.confidence_floor;
        let confidence = self.rng.uniform(floor, 1.0).clamp(floor, 1.0);

        let reason = match factors.first() {
            Some(first) => first.description().to_string(),
            None if is_fraud => COMBINED_RISK_REASON.to_string(),
            None => NO_RISK_REASON.to_string(),
        };

        log::debug!(
            "scoring: contract={} eval={} raw={:.2} p={:.3} fraud={} factors={}",
            profile.contract_id,
            self.evaluations,
            raw_score,
            probability,
            is_fraud,
            factors.len()
        );

        FraudAssessment {
            prediction: FraudPrediction {
                is_fraud,
                fraud_probability: probability,
                risk_level,
            },
            reason,
            confidence,
            risk_factors: factors.iter().map(|f| f.description().to_string()).collect(),
            recommendation: recommendation_for(probability, self.config.fraud_threshold)
                .to_string(),
        }
    }

    /// Re-score a batch in slice order.
    pub fn evaluate_batch(&mut self, profiles: &[ContractFinancialProfile]) -> Vec<FraudAssessment> {
        profiles.iter().map(|p| self.evaluate(p)).collect()
    }
}
