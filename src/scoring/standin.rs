//! Deterministic stand-in scoring backend.
//!
//! Scores are drawn from a [`ChaCha12Rng`] seeded with
//! `SHA-256(seed_le || artifact_digest)`, so the same seed and the same bytes
//! always produce the same score, across calls and across process restarts.
//! Each value takes one `u64` from the stream: its top 53 bits give a unit
//! fraction in `[0, 1)` that is scaled into the configured range.

use super::{BackendScore, ScoringBackend};
use crate::error::Result;
use crate::receiver::{Artifact, ArtifactDigest};
use async_trait::async_trait;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha12Rng;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;

/// Version string reported by the stand-in.
pub const STANDIN_VERSION: &str = "standin-v1";

/// Seeded, reproducible scoring backend.
#[derive(Debug, Clone)]
pub struct DeterministicBackend {
    seed: u64,
    confidence_range: (f64, f64),
    anomaly_range: (f64, f64),
    latency: Duration,
}

impl DeterministicBackend {
    /// Create a stand-in with the default score ranges.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            confidence_range: (0.55, 0.95),
            anomaly_range: (0.10, 0.50),
            latency: Duration::ZERO,
        }
    }

    /// Set the inclusive range confidence is drawn from.
    pub fn with_confidence_range(mut self, low: f64, high: f64) -> Self {
        self.confidence_range = (low, high);
        self
    }

    /// Set the inclusive range the anomaly score is drawn from.
    pub fn with_anomaly_range(mut self, low: f64, high: f64) -> Self {
        self.anomaly_range = (low, high);
        self
    }

    /// Simulate inference latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Pure scoring function behind [`ScoringBackend::score`].
    pub fn score_digest(&self, digest: &ArtifactDigest) -> BackendScore {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_le_bytes());
        hasher.update(digest.as_bytes());
        let mut rng = ChaCha12Rng::from_seed(hasher.finalize().into());

        let confidence = draw(&mut rng, self.confidence_range);
        let anomaly_score = draw(&mut rng, self.anomaly_range);

        let mut details = BTreeMap::new();
        details.insert("content_sha256".to_string(), digest.to_hex());
        details.insert("seed".to_string(), self.seed.to_string());

        BackendScore {
            confidence,
            anomaly_score,
            backend_version: STANDIN_VERSION.to_string(),
            details,
        }
    }
}

fn draw(rng: &mut ChaCha12Rng, (low, high): (f64, f64)) -> f64 {
    let unit = (rng.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64);
    if high <= low {
        low
    } else {
        low + (high - low) * unit
    }
}

#[async_trait]
impl ScoringBackend for DeterministicBackend {
    async fn score(&self, artifact: &Artifact) -> Result<BackendScore> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut score = self.score_digest(&artifact.digest());
        score
            .details
            .insert("media_type".to_string(), artifact.media_type().to_string());
        Ok(score)
    }

    fn name(&self) -> &str {
        "standin"
    }
}
