//! Verdict assembly.
//!
//! Maps a [`ScoreResult`] onto the public response contract. The numeric part
//! ([`VerdictAssembler::assess`]) is a pure function of the score and the
//! configured thresholds; the provenance reference is requested from the
//! configured [`ProvenanceAnchor`] and never derived locally.

use crate::config::VerdictConfig;
use crate::error::Result;
use crate::health::{CollaboratorStats, CollaboratorTracker};
use crate::provenance::{AnchorRecord, ProvenanceAnchor};
use crate::scoring::ScoreResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Risk tier reported with a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "LOW",
            RiskTier::Medium => "MEDIUM",
            RiskTier::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Threshold-derived figures of a verdict, without provenance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Assessment {
    pub authentic: bool,
    /// Confidence percentage, one decimal place.
    pub confidence: f64,
    pub risk_level: RiskTier,
    /// Anomaly score, three decimal places.
    pub anomaly_score: f64,
}

/// Public verdict returned by `POST /verify`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub authentic: bool,
    pub confidence: f64,
    pub risk_level: RiskTier,
    pub anomaly_score: f64,
    /// Provenance reference issued by the anchoring collaborator.
    pub blockchain_hash: String,
}

/// Round to `decimals` places, ties to even.
fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

/// Turns scores into verdicts.
#[derive(Clone)]
pub struct VerdictAssembler {
    authentic_threshold: f64,
    medium_floor: Option<f64>,
    anchor: Arc<dyn ProvenanceAnchor>,
    anchor_health: Arc<CollaboratorTracker>,
}

impl VerdictAssembler {
    pub fn new(config: &VerdictConfig, anchor: Arc<dyn ProvenanceAnchor>) -> Self {
        Self {
            authentic_threshold: config.authentic_threshold,
            medium_floor: config.medium_floor,
            anchor,
            anchor_health: Arc::new(CollaboratorTracker::new()),
        }
    }

    /// Name of the anchoring collaborator.
    pub fn anchor_name(&self) -> &str {
        self.anchor.name()
    }

    /// Outcome counters of recent anchoring calls.
    pub fn anchor_health(&self) -> CollaboratorStats {
        self.anchor_health.stats()
    }

    /// Derive the numeric part of a verdict. Pure.
    pub fn assess(&self, score: &ScoreResult) -> Assessment {
        let confidence = round_to(score.confidence() * 100.0, 1);
        let authentic = confidence > self.authentic_threshold;

        let risk_level = if authentic {
            RiskTier::Low
        } else {
            match self.medium_floor {
                Some(floor) if confidence >= floor => RiskTier::Medium,
                _ => RiskTier::High,
            }
        };

        Assessment {
            authentic,
            confidence,
            risk_level,
            anomaly_score: round_to(score.anomaly_score(), 3),
        }
    }

    /// Assess a score and anchor it, producing the public verdict.
    pub async fn assemble(&self, score: &ScoreResult) -> Result<Verdict> {
        let assessment = self.assess(score);
        let record = AnchorRecord::new(score, assessment.confidence, assessment.anomaly_score);
        let reference = self.anchor.anchor(&record).await;
        self.anchor_health.record(&reference);
        let reference = reference?;

        info!(
            digest = %score.artifact_digest(),
            authentic = assessment.authentic,
            confidence = assessment.confidence,
            risk = %assessment.risk_level,
            reference = %reference,
            "Verdict assembled"
        );

        Ok(Verdict {
            authentic: assessment.authentic,
            confidence: assessment.confidence,
            risk_level: assessment.risk_level,
            anomaly_score: assessment.anomaly_score,
            blockchain_hash: reference.into_string(),
        })
    }
}

impl fmt::Debug for VerdictAssembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerdictAssembler")
            .field("authentic_threshold", &self.authentic_threshold)
            .field("medium_floor", &self.medium_floor)
            .field("anchor", &self.anchor.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OracleError;
    use crate::provenance::{LedgerStandIn, ProvenanceRef};
    use crate::receiver::ArtifactDigest;
    use crate::scoring::BackendScore;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    struct DownAnchor;

    #[async_trait]
    impl ProvenanceAnchor for DownAnchor {
        async fn anchor(&self, _record: &AnchorRecord) -> Result<ProvenanceRef> {
            Err(OracleError::Provenance("ledger offline".into()))
        }

        fn name(&self) -> &str {
            "down"
        }
    }

    fn score(confidence: f64, anomaly_score: f64) -> ScoreResult {
        ScoreResult::new(
            ArtifactDigest::of(b"artifact"),
            BackendScore {
                confidence,
                anomaly_score,
                backend_version: "test-v1".into(),
                details: BTreeMap::new(),
            },
        )
        .unwrap()
    }

    fn assembler() -> VerdictAssembler {
        VerdictAssembler::new(&VerdictConfig::default(), Arc::new(LedgerStandIn::new()))
    }

    #[test]
    fn test_rounding() {
        let a = assembler().assess(&score(0.87654, 0.123456));
        assert_eq!(a.confidence, 87.7);
        assert_eq!(a.anomaly_score, 0.123);
    }

    #[test]
    fn test_rounding_ties_to_even() {
        let assembler = assembler();

        let a = assembler.assess(&score(0.8125, 0.0625));
        assert_eq!(a.confidence, 81.2);
        assert_eq!(a.anomaly_score, 0.062);

        let b = assembler.assess(&score(0.5625, 0.1875));
        assert_eq!(b.confidence, 56.2);
        assert_eq!(b.anomaly_score, 0.188);

        let c = assembler.assess(&score(0.8175, 0.4375));
        assert_eq!(c.confidence, 81.8);
        assert_eq!(c.anomaly_score, 0.438);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let assembler = assembler();

        let at = assembler.assess(&score(0.5, 0.2));
        assert_eq!(at.confidence, 50.0);
        assert!(!at.authentic);
        assert_eq!(at.risk_level, RiskTier::High);

        let above = assembler.assess(&score(0.501, 0.2));
        assert_eq!(above.confidence, 50.1);
        assert!(above.authentic);
        assert_eq!(above.risk_level, RiskTier::Low);
    }

    #[test]
    fn test_rounding_decides_authenticity() {
        // 0.50049 rounds to 50.0, which does not exceed the threshold.
        let a = assembler().assess(&score(0.50049, 0.2));
        assert_eq!(a.confidence, 50.0);
        assert!(!a.authentic);
    }

    #[test]
    fn test_two_tier_by_default() {
        let assembler = assembler();
        for i in 0..=1000 {
            let a = assembler.assess(&score(i as f64 / 1000.0, 0.0));
            assert_eq!(a.authentic, a.confidence > 50.0);
            assert_ne!(a.risk_level, RiskTier::Medium);
            assert_eq!(a.risk_level == RiskTier::Low, a.authentic);
        }
    }

    #[test]
    fn test_medium_floor_is_monotonic() {
        let config = VerdictConfig {
            authentic_threshold: 50.0,
            medium_floor: Some(30.0),
        };
        let assembler = VerdictAssembler::new(&config, Arc::new(LedgerStandIn::new()));

        assert_eq!(assembler.assess(&score(0.29, 0.0)).risk_level, RiskTier::High);
        assert_eq!(assembler.assess(&score(0.30, 0.0)).risk_level, RiskTier::Medium);
        assert_eq!(assembler.assess(&score(0.50, 0.0)).risk_level, RiskTier::Medium);
        assert_eq!(assembler.assess(&score(0.51, 0.0)).risk_level, RiskTier::Low);

        let mut previous = RiskTier::High;
        for i in 0..=100 {
            let tier = assembler.assess(&score(i as f64 / 100.0, 0.0)).risk_level;
            assert!(tier <= previous, "risk increased at {}", i);
            previous = tier;
        }
    }

    #[test]
    fn test_assess_is_pure() {
        let assembler = assembler();
        let s = score(0.734, 0.4449);
        assert_eq!(assembler.assess(&s), assembler.assess(&s));
    }

    #[tokio::test]
    async fn test_assemble_differs_only_in_provenance() {
        let assembler = assembler();
        let s = score(0.734, 0.4449);

        let first = assembler.assemble(&s).await.unwrap();
        let second = assembler.assemble(&s).await.unwrap();

        assert_eq!(first.authentic, second.authentic);
        assert_eq!(first.confidence, second.confidence);
        assert_eq!(first.risk_level, second.risk_level);
        assert_eq!(first.anomaly_score, second.anomaly_score);
        assert_ne!(first.blockchain_hash, second.blockchain_hash);
    }

    #[tokio::test]
    async fn test_assemble_surfaces_anchor_failure() {
        let assembler = VerdictAssembler::new(&VerdictConfig::default(), Arc::new(DownAnchor));
        let err = assembler.assemble(&score(0.9, 0.1)).await.unwrap_err();
        assert!(matches!(err, OracleError::Provenance(_)));
        assert_eq!(assembler.anchor_health().consecutive_failures, 1);
    }

    #[test]
    fn test_verdict_wire_format() {
        let verdict = Verdict {
            authentic: true,
            confidence: 87.3,
            risk_level: RiskTier::Low,
            anomaly_score: 0.214,
            blockchain_hash: "0xabc".into(),
        };
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "authentic": true,
                "confidence": 87.3,
                "risk_level": "LOW",
                "anomaly_score": 0.214,
                "blockchain_hash": "0xabc"
            })
        );
    }
}
