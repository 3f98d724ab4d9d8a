//! Scoring client and pluggable backends.
//!
//! A [`ScoringBackend`] turns an [`Artifact`] into raw numbers; the
//! [`ScoringClient`] in front of it validates those numbers into an immutable
//! [`ScoreResult`] bound to the artifact's digest. Callers only ever see the
//! client, so the concrete backend can be swapped without touching them.
//!
//! # Backends
//!
//! - [`DeterministicBackend`]: seeded stand-in for tests and demos. Output is a
//!   pure function of the seed and the artifact digest.
//! - [`HttpScoringBackend`]: delegates to an external inference service.

pub mod remote;
pub mod standin;

pub use remote::HttpScoringBackend;
pub use standin::DeterministicBackend;

use crate::config::ScoringConfig;
use crate::error::{OracleError, Result};
use crate::health::{CollaboratorStats, CollaboratorTracker};
use crate::observability;
use crate::receiver::{Artifact, ArtifactDigest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Raw output of a scoring backend, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendScore {
    /// Probability the artifact is genuine.
    pub confidence: f64,
    /// Backend-assigned anomaly score.
    pub anomaly_score: f64,
    /// Model or backend version that produced the score.
    pub backend_version: String,
    /// Freeform backend details.
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

/// Validated score for one artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    artifact_digest: ArtifactDigest,
    confidence: f64,
    anomaly_score: f64,
    backend_version: String,
    details: BTreeMap<String, String>,
}

impl ScoreResult {
    /// Build a score, rejecting non-finite or out-of-range values.
    pub fn new(artifact_digest: ArtifactDigest, raw: BackendScore) -> Result<Self> {
        for (name, value) in [("confidence", raw.confidence), ("anomaly_score", raw.anomaly_score)] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(OracleError::Scoring(format!(
                    "{} {} outside [0, 1]",
                    name, value
                )));
            }
        }
        if raw.backend_version.trim().is_empty() {
            return Err(OracleError::Scoring("missing backend version".into()));
        }

        Ok(Self {
            artifact_digest,
            confidence: raw.confidence,
            anomaly_score: raw.anomaly_score,
            backend_version: raw.backend_version,
            details: raw.details,
        })
    }

    pub fn artifact_digest(&self) -> ArtifactDigest {
        self.artifact_digest
    }

    /// Raw confidence in [0, 1].
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Anomaly score in [0, 1].
    pub fn anomaly_score(&self) -> f64 {
        self.anomaly_score
    }

    pub fn backend_version(&self) -> &str {
        &self.backend_version
    }

    pub fn details(&self) -> &BTreeMap<String, String> {
        &self.details
    }
}

/// Capability to score an artifact.
///
/// Implementations fail with `BackendUnavailable` when the backend cannot be
/// reached and `Scoring` when it answers with something unusable. Backends
/// must be cancel-safe: the gateway drops in-flight calls on deadline expiry.
#[async_trait]
pub trait ScoringBackend: Send + Sync {
    /// Score one artifact.
    async fn score(&self, artifact: &Artifact) -> Result<BackendScore>;

    /// Short backend name for logs and readiness reports.
    fn name(&self) -> &str;
}

/// Front door to the configured backend.
#[derive(Clone)]
pub struct ScoringClient {
    backend: Arc<dyn ScoringBackend>,
    health: Arc<CollaboratorTracker>,
}

impl ScoringClient {
    /// Wrap a backend.
    pub fn new(backend: Arc<dyn ScoringBackend>) -> Self {
        Self {
            backend,
            health: Arc::new(CollaboratorTracker::new()),
        }
    }

    /// Build the backend named in configuration.
    pub fn from_config(config: &ScoringConfig) -> Result<Self> {
        let backend: Arc<dyn ScoringBackend> = match config {
            ScoringConfig::Standin {
                seed,
                confidence_range,
                anomaly_range,
                latency,
            } => Arc::new(
                DeterministicBackend::new(*seed)
                    .with_confidence_range(confidence_range.0, confidence_range.1)
                    .with_anomaly_range(anomaly_range.0, anomaly_range.1)
                    .with_latency(*latency),
            ),
            ScoringConfig::Remote {
                endpoint,
                connect_timeout,
                request_timeout,
            } => Arc::new(HttpScoringBackend::new(
                endpoint.clone(),
                *connect_timeout,
                *request_timeout,
            )?),
        };
        Ok(Self::new(backend))
    }

    /// Name of the wrapped backend.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Outcome counters of recent backend calls.
    pub fn health(&self) -> CollaboratorStats {
        self.health.stats()
    }

    /// Score an artifact and validate the result.
    pub async fn score(&self, artifact: &Artifact) -> Result<ScoreResult> {
        let started = Instant::now();
        let outcome = self.backend.score(artifact).await;
        observability::record_scoring(self.backend.name(), started.elapsed(), outcome.is_ok());

        let score = outcome.and_then(|raw| ScoreResult::new(artifact.digest(), raw));
        self.health.record(&score);
        let score = score?;
        debug!(
            digest = %artifact.digest(),
            backend = self.backend.name(),
            version = score.backend_version(),
            confidence = score.confidence(),
            "Artifact scored"
        );
        Ok(score)
    }
}

impl std::fmt::Debug for ScoringClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringClient")
            .field("backend", &self.backend.name())
            .finish()
    }
}
