//! HTTP client for an external inference service.
//!
//! The artifact is POSTed as the raw request body with its media type. The
//! service answers with:
//!
//! ```json
//! {"confidence": 0.87, "anomaly_score": 0.21, "model_version": "resnet-2024.06", "details": {}}
//! ```
//!
//! Requests are not retried here; retry policy belongs to the inference service.

use super::{BackendScore, ScoringBackend};
use crate::error::{OracleError, Result};
use crate::receiver::Artifact;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    confidence: f64,
    anomaly_score: f64,
    model_version: String,
    #[serde(default)]
    details: BTreeMap<String, String>,
}

/// Scoring backend backed by a remote inference endpoint.
#[derive(Debug, Clone)]
pub struct HttpScoringBackend {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpScoringBackend {
    /// Create a client for `endpoint`.
    pub fn new(
        endpoint: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| OracleError::Config(format!("Failed to build scoring client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ScoringBackend for HttpScoringBackend {
    async fn score(&self, artifact: &Artifact) -> Result<BackendScore> {
        debug!(endpoint = %self.endpoint, digest = %artifact.digest(), "Requesting remote score");

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, artifact.media_type())
            .header("x-artifact-sha256", artifact.digest().to_hex())
            .body(artifact.bytes().clone())
            .send()
            .await
            .map_err(|e| OracleError::BackendUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(OracleError::BackendUnavailable(format!(
                "inference service returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(OracleError::Scoring(format!(
                "inference service rejected artifact with {}",
                status
            )));
        }

        let body: InferenceResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Scoring(format!("malformed inference response: {}", e)))?;

        Ok(BackendScore {
            confidence: body.confidence,
            anomaly_score: body.anomaly_score,
            backend_version: body.model_version,
            details: body.details,
        })
    }

    fn name(&self) -> &str {
        "remote"
    }
}
