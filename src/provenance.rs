//! Provenance anchoring.
//!
//! Every verdict carries a reference issued by an external system of record.
//! The gateway never mints references itself; it hands an [`AnchorRecord`] to a
//! [`ProvenanceAnchor`] and returns whatever reference that collaborator issues.
//!
//! Two anchors are provided:
//!
//! - [`HttpAnchor`] posts the record to an anchoring service.
//! - [`LedgerStandIn`] is an in-process, append-only, hash-chained ledger used
//!   for development and tests when no anchoring service is configured.

use crate::config::ProvenanceConfig;
use crate::error::{OracleError, Result};
use crate::scoring::ScoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// What gets anchored for one verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorRecord {
    /// Hex SHA-256 of the artifact.
    pub artifact_digest: String,
    /// Backend version that produced the score.
    pub backend_version: String,
    /// Confidence percentage reported to the caller.
    pub confidence_pct: f64,
    /// Anomaly score reported to the caller.
    pub anomaly_score: f64,
    /// When the record was created.
    pub scored_at: DateTime<Utc>,
}

impl AnchorRecord {
    /// Build a record from a score and the figures derived from it.
    pub fn new(score: &ScoreResult, confidence_pct: f64, anomaly_score: f64) -> Self {
        Self {
            artifact_digest: score.artifact_digest().to_hex(),
            backend_version: score.backend_version().to_string(),
            confidence_pct,
            anomaly_score,
            scored_at: Utc::now(),
        }
    }
}

/// Opaque reference issued by the system of record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvenanceRef(String);

impl ProvenanceRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ProvenanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collaborator that records a verdict and returns its reference.
#[async_trait]
pub trait ProvenanceAnchor: Send + Sync {
    /// Anchor a record, returning the system of record's reference.
    async fn anchor(&self, record: &AnchorRecord) -> Result<ProvenanceRef>;

    /// Short anchor name for logs and readiness reports.
    fn name(&self) -> &str;
}

/// Build the anchor selected by configuration.
pub fn from_config(config: &ProvenanceConfig) -> Result<Arc<dyn ProvenanceAnchor>> {
    match &config.endpoint {
        Some(endpoint) => {
            info!(endpoint = %endpoint, "Anchoring verdicts to external service");
            Ok(Arc::new(HttpAnchor::new(endpoint.clone(), config.timeout)?))
        }
        None => {
            warn!("No provenance endpoint configured; using in-process ledger stand-in");
            Ok(Arc::new(LedgerStandIn::with_window(config.ledger_window)))
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnchorResponse {
    reference: String,
}

/// Anchor backed by an HTTP anchoring service.
#[derive(Debug, Clone)]
pub struct HttpAnchor {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpAnchor {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Config(format!("Failed to build anchoring client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

#[async_trait]
impl ProvenanceAnchor for HttpAnchor {
    async fn anchor(&self, record: &AnchorRecord) -> Result<ProvenanceRef> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(record)
            .send()
            .await
            .map_err(|e| OracleError::Provenance(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OracleError::Provenance(format!(
                "anchoring service returned {}",
                response.status()
            )));
        }

        let body: AnchorResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Provenance(format!("malformed anchoring response: {}", e)))?;

        if body.reference.trim().is_empty() {
            return Err(OracleError::Provenance("empty reference".into()));
        }

        debug!(reference = %body.reference, "Verdict anchored");
        Ok(ProvenanceRef(body.reference))
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// One entry of the stand-in ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    /// Position in the chain, starting at zero.
    pub height: u64,
    /// Reference of the previous entry; all zeros for the first entry.
    pub previous: String,
    /// This entry's reference.
    pub reference: ProvenanceRef,
    /// The anchored record.
    pub record: AnchorRecord,
}

const GENESIS: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";

/// Entries the stand-in ledger retains by default.
pub const DEFAULT_LEDGER_WINDOW: usize = 10_000;

/// In-process append-only ledger.
///
/// Entry references are `0x` + hex(SHA-256(previous reference || record JSON)),
/// so every reference commits to the full history before it. Only the most
/// recent `window` entries are retained; the chain tip survives eviction so
/// new entries keep chaining onto the full history.
#[derive(Debug, Clone)]
pub struct LedgerStandIn {
    inner: Arc<RwLock<Ledger>>,
}

#[derive(Debug)]
struct Ledger {
    entries: VecDeque<LedgerEntry>,
    tip: String,
    next_height: u64,
    window: usize,
}

impl LedgerStandIn {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_LEDGER_WINDOW)
    }

    /// Ledger retaining at most `window` entries (at least one).
    pub fn with_window(window: usize) -> Self {
        let window = window.max(1);
        Self {
            inner: Arc::new(RwLock::new(Ledger {
                entries: VecDeque::with_capacity(window.min(1024)),
                tip: GENESIS.to_string(),
                next_height: 0,
                window,
            })),
        }
    }

    /// Number of retained entries.
    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    /// Total entries ever anchored, including evicted ones.
    pub async fn height(&self) -> u64 {
        self.inner.read().await.next_height
    }

    /// Reference of the newest entry, or the genesis reference.
    pub async fn tip(&self) -> ProvenanceRef {
        ProvenanceRef(self.inner.read().await.tip.clone())
    }

    /// Look up a retained entry by reference.
    pub async fn lookup(&self, reference: &ProvenanceRef) -> Option<LedgerEntry> {
        self.inner
            .read()
            .await
            .entries
            .iter()
            .rev()
            .find(|e| &e.reference == reference)
            .cloned()
    }

    /// Recompute every link of the retained window.
    ///
    /// The oldest retained entry's `previous` is trusted once evictions began.
    pub async fn verify_chain(&self) -> bool {
        let ledger = self.inner.read().await;
        let mut previous = match ledger.entries.front() {
            Some(first) if first.height > 0 => first.previous.clone(),
            _ => GENESIS.to_string(),
        };
        for entry in ledger.entries.iter() {
            if entry.previous != previous {
                return false;
            }
            match chain_reference(&previous, &entry.record) {
                Ok(reference) if reference == entry.reference => {}
                _ => return false,
            }
            previous = entry.reference.0.clone();
        }
        previous == ledger.tip
    }
}

impl Default for LedgerStandIn {
    fn default() -> Self {
        Self::new()
    }
}

fn chain_reference(previous: &str, record: &AnchorRecord) -> Result<ProvenanceRef> {
    let mut hasher = Sha256::new();
    hasher.update(previous.as_bytes());
    hasher.update(serde_json::to_vec(record)?);
    Ok(ProvenanceRef(format!("0x{}", hex::encode(hasher.finalize()))))
}

#[async_trait]
impl ProvenanceAnchor for LedgerStandIn {
    async fn anchor(&self, record: &AnchorRecord) -> Result<ProvenanceRef> {
        let mut ledger = self.inner.write().await;
        let previous = ledger.tip.clone();
        let reference = chain_reference(&previous, record)?;
        let height = ledger.next_height;

        if ledger.entries.len() >= ledger.window {
            ledger.entries.pop_front();
        }
        ledger.entries.push_back(LedgerEntry {
            height,
            previous,
            reference: reference.clone(),
            record: record.clone(),
        });
        ledger.tip = reference.0.clone();
        ledger.next_height = height + 1;

        debug!(reference = %reference, height, "Ledger entry appended");
        Ok(reference)
    }

    fn name(&self) -> &str {
        "ledger-standin"
    }
}
