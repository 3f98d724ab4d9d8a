//! Configuration module for the oracle gateway.

use crate::error::{OracleError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Main configuration for a gateway instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Service identity reported by `/` and `/health`.
    #[serde(default)]
    pub service: ServiceConfig,
    /// HTTP listener configuration.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Admission control configuration.
    #[serde(default)]
    pub admission: AdmissionConfig,
    /// Artifact validation limits.
    #[serde(default)]
    pub receiver: ReceiverConfig,
    /// Scoring backend selection.
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Verdict thresholds.
    #[serde(default)]
    pub verdict: VerdictConfig,
    /// Provenance anchoring collaborator.
    #[serde(default)]
    pub provenance: ProvenanceConfig,
    /// Shortage forecasting collaborator.
    #[serde(default)]
    pub shortage: ShortageConfig,
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl OracleConfig {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| OracleError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| OracleError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.admission.capacity == 0 {
            return Err(OracleError::InvalidConfig {
                field: "admission.capacity".to_string(),
                reason: "Capacity must be non-zero".to_string(),
            });
        }

        if self.admission.deadline.is_zero() {
            return Err(OracleError::InvalidConfig {
                field: "admission.deadline".to_string(),
                reason: "Deadline must be non-zero".to_string(),
            });
        }

        if self.receiver.max_artifact_bytes == 0 {
            return Err(OracleError::InvalidConfig {
                field: "receiver.max_artifact_bytes".to_string(),
                reason: "Artifact ceiling must be non-zero".to_string(),
            });
        }

        if self.receiver.allowed_media_types.is_empty() {
            return Err(OracleError::InvalidConfig {
                field: "receiver.allowed_media_types".to_string(),
                reason: "At least one media type must be allowed".to_string(),
            });
        }

        let threshold = self.verdict.authentic_threshold;
        if !(0.0..=100.0).contains(&threshold) {
            return Err(OracleError::InvalidConfig {
                field: "verdict.authentic_threshold".to_string(),
                reason: format!("Threshold {} outside 0..=100", threshold),
            });
        }

        if let Some(floor) = self.verdict.medium_floor {
            if !(0.0..=threshold).contains(&floor) {
                return Err(OracleError::InvalidConfig {
                    field: "verdict.medium_floor".to_string(),
                    reason: format!("Floor {} must lie in 0..={}", floor, threshold),
                });
            }
        }

        if self.provenance.ledger_window == 0 {
            return Err(OracleError::InvalidConfig {
                field: "provenance.ledger_window".to_string(),
                reason: "Ledger window must be non-zero".to_string(),
            });
        }

        if let ScoringConfig::Standin {
            confidence_range,
            anomaly_range,
            ..
        } = &self.scoring
        {
            for (field, range) in [
                ("scoring.confidence_range", confidence_range),
                ("scoring.anomaly_range", anomaly_range),
            ] {
                if !(0.0 <= range.0 && range.0 <= range.1 && range.1 <= 1.0) {
                    return Err(OracleError::InvalidConfig {
                        field: field.to_string(),
                        reason: format!("Range {:?} must be ordered within 0..=1", range),
                    });
                }
            }
        }

        Ok(())
    }

    /// Create a local development configuration.
    pub fn development() -> Self {
        Self {
            gateway: GatewayConfig {
                bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
                ..Default::default()
            },
            scoring: ScoringConfig::Standin {
                seed: 42,
                confidence_range: (0.30, 0.95),
                anomaly_range: (0.10, 0.50),
                latency: Duration::from_millis(25),
            },
            observability: ObservabilityConfig {
                metrics_enabled: false,
                log_level: "debug".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Service identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name reported by `/health`.
    pub name: String,
    /// Status line reported by `/`.
    pub status_line: String,
    /// Version reported by `/`.
    pub version: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "medchain-oracle-api".to_string(),
            status_line: "MedChain Oracle Backend - Live".to_string(),
            version: "1.0.0".to_string(),
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Address to bind the gateway.
    pub bind_addr: SocketAddr,
    /// Cross-origin policy.
    #[serde(default)]
    pub cors: CorsSettings,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            cors: CorsSettings::default(),
        }
    }
}

/// Cross-origin policy settings.
///
/// The default mirrors the permissive policy existing callers depend on. A
/// public deployment should list its origins explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsSettings {
    /// Allowed origins; `"*"` allows any, `"*.example.com"` allows subdomains.
    pub allowed_origins: Vec<String>,
    /// Whether to send `Access-Control-Allow-Credentials`.
    #[serde(default)]
    pub allow_credentials: bool,
    /// Preflight cache lifetime in seconds.
    #[serde(default = "default_max_age")]
    pub max_age_seconds: u32,
}

fn default_max_age() -> u32 {
    3600
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allow_credentials: true,
            max_age_seconds: default_max_age(),
        }
    }
}

/// Admission control configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Maximum concurrent in-flight scoring requests.
    pub capacity: usize,
    /// Per-request deadline covering receive, score and assemble.
    #[serde(with = "humantime_serde")]
    pub deadline: Duration,
    /// Hint returned in `Retry-After` when capacity is exhausted.
    #[serde(with = "humantime_serde")]
    pub retry_after: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            capacity: 16,
            deadline: Duration::from_secs(10),
            retry_after: Duration::from_secs(1),
        }
    }
}

/// Artifact validation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Maximum artifact size in bytes.
    pub max_artifact_bytes: u64,
    /// Allowed media types.
    pub allowed_media_types: Vec<String>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            max_artifact_bytes: 5 * 1024 * 1024, // 5MB
            allowed_media_types: [
                "image/png",
                "image/jpeg",
                "image/webp",
                "image/gif",
                "image/bmp",
                "image/tiff",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Scoring backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum ScoringConfig {
    /// Deterministic stand-in backend.
    Standin {
        /// Explicit seed mixed with the artifact digest.
        seed: u64,
        /// Inclusive range raw confidence is drawn from.
        #[serde(default = "default_confidence_range")]
        confidence_range: (f64, f64),
        /// Inclusive range the anomaly score is drawn from.
        #[serde(default = "default_anomaly_range")]
        anomaly_range: (f64, f64),
        /// Simulated inference latency.
        #[serde(with = "humantime_serde", default)]
        latency: Duration,
    },
    /// External inference service reached over HTTP.
    Remote {
        /// Scoring endpoint URL.
        endpoint: String,
        /// Connection timeout.
        #[serde(with = "humantime_serde")]
        connect_timeout: Duration,
        /// Request timeout.
        #[serde(with = "humantime_serde")]
        request_timeout: Duration,
    },
}

fn default_confidence_range() -> (f64, f64) {
    (0.55, 0.95)
}

fn default_anomaly_range() -> (f64, f64) {
    (0.10, 0.50)
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig::Standin {
            seed: 0,
            confidence_range: default_confidence_range(),
            anomaly_range: default_anomaly_range(),
            latency: Duration::ZERO,
        }
    }
}

/// Verdict thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictConfig {
    /// Confidence percentage an artifact must exceed to be authentic.
    pub authentic_threshold: f64,
    /// When set, non-authentic verdicts at or above this percentage are MEDIUM.
    #[serde(default)]
    pub medium_floor: Option<f64>,
}

impl Default for VerdictConfig {
    fn default() -> Self {
        Self {
            authentic_threshold: 50.0,
            medium_floor: None,
        }
    }
}

/// Provenance anchoring collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceConfig {
    /// Anchoring service URL; `None` uses the in-process ledger.
    pub endpoint: Option<String>,
    /// Request timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Entries the in-process ledger keeps before evicting the oldest.
    #[serde(default = "default_ledger_window")]
    pub ledger_window: usize,
}

fn default_ledger_window() -> usize {
    10_000
}

impl Default for ProvenanceConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout: Duration::from_secs(5),
            ledger_window: default_ledger_window(),
        }
    }
}

/// Shortage forecasting collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortageConfig {
    /// Forecasting service URL; `None` serves the static prediction.
    pub endpoint: Option<String>,
    /// Request timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ShortageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics.
    pub metrics_enabled: bool,
    /// Metrics bind address.
    pub metrics_addr: SocketAddr,
    /// Log level.
    pub log_level: String,
    /// Enable JSON logging.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 9090)),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Serde helper for Duration using humantime format.
pub mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    /// Parse `"250ms"`, `"30s"`, `"5m"` or a bare millisecond count.
    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        } else if let Some(s_val) = s.strip_suffix('s') {
            s_val
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| e.to_string())
        } else if let Some(m) = s.strip_suffix('m') {
            m.parse::<u64>()
                .map(|v| Duration::from_secs(v * 60))
                .map_err(|e| e.to_string())
        } else {
            s.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        }
    }
}
