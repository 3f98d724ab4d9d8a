//! Health and readiness reporting.
//!
//! `GET /health` is a liveness check with a fixed body that never depends on
//! load. `GET /ready` reports per-component status so orchestrators can stop
//! routing to a saturated instance.

use crate::admission::AdmissionStats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Service is healthy.
    Healthy,
    /// Service is degraded but operational.
    Degraded,
    /// Service is unhealthy.
    Unhealthy,
}

impl HealthStatus {
    /// Convert to HTTP status code.
    pub fn to_status_code(&self) -> u16 {
        match self {
            HealthStatus::Healthy => 200,
            HealthStatus::Degraded => 200, // Still operational
            HealthStatus::Unhealthy => 503,
        }
    }

    /// Combine two statuses (worst wins).
    pub fn combine(&self, other: &HealthStatus) -> HealthStatus {
        match (self, other) {
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }
}

/// Liveness body for `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub status: HealthStatus,
    pub service: String,
}

impl LivenessResponse {
    pub fn healthy(service: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            service: service.into(),
        }
    }
}

/// Individual component health check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component name.
    pub name: String,
    /// Health status.
    pub status: HealthStatus,
    /// Optional message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Additional details.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub details: BTreeMap<String, String>,
}

impl ComponentHealth {
    /// Create a healthy component.
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            message: None,
            details: BTreeMap::new(),
        }
    }

    /// Create a degraded component.
    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            details: BTreeMap::new(),
        }
    }

    /// Create an unhealthy component.
    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            details: BTreeMap::new(),
        }
    }

    /// Add detail.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Readiness body for `GET /ready`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
    /// Individual component checks.
    pub components: Vec<ComponentHealth>,
    /// Timestamp.
    pub timestamp: String,
}

impl ReadinessResponse {
    /// Create an empty, healthy report.
    pub fn new(service: impl Into<String>, version: impl Into<String>, start_time: Instant) -> Self {
        Self {
            status: HealthStatus::Healthy,
            service: service.into(),
            version: version.into(),
            uptime_seconds: start_time.elapsed().as_secs(),
            components: Vec::new(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Add a component check.
    pub fn add_component(&mut self, component: ComponentHealth) {
        self.status = self.status.combine(&component.status);
        self.components.push(component);
    }

    /// Build response from components.
    pub fn with_components(mut self, components: Vec<ComponentHealth>) -> Self {
        for component in components {
            self.add_component(component);
        }
        self
    }
}

/// Admission component: degraded while every ticket is held.
pub fn admission_component(stats: &AdmissionStats) -> ComponentHealth {
    let component = if stats.is_saturated() {
        ComponentHealth::degraded("admission", "all scoring slots in use")
    } else {
        ComponentHealth::healthy("admission")
    };

    component
        .with_detail("capacity", stats.capacity.to_string())
        .with_detail("in_flight", stats.in_flight.to_string())
        .with_detail("rejected", stats.rejected.to_string())
        .with_detail("timed_out", stats.timed_out.to_string())
}

/// Consecutive failures after which a collaborator is reported unhealthy.
pub const UNHEALTHY_AFTER: u64 = 3;

/// Outcome counters for one collaborator, fed by the calls the gateway makes.
///
/// One failure degrades the component; [`UNHEALTHY_AFTER`] in a row make it
/// unhealthy. Any success resets the streak.
#[derive(Debug, Default)]
pub struct CollaboratorTracker {
    consecutive_failures: AtomicU64,
    failures: AtomicU64,
    successes: AtomicU64,
}

/// Point-in-time view of a [`CollaboratorTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollaboratorStats {
    pub consecutive_failures: u64,
    pub failures: u64,
    pub successes: u64,
}

impl CollaboratorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of a collaborator call.
    pub fn record<T, E>(&self, outcome: &std::result::Result<T, E>) {
        match outcome {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
    }

    pub fn stats(&self) -> CollaboratorStats {
        CollaboratorStats {
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
        }
    }
}

/// Collaborator component, judged by the outcome of recent calls.
pub fn collaborator_component(
    name: &str,
    backend: &str,
    stats: CollaboratorStats,
) -> ComponentHealth {
    let streak = stats.consecutive_failures;
    let component = if streak >= UNHEALTHY_AFTER {
        ComponentHealth::unhealthy(name, format!("{} consecutive failures", streak))
    } else if streak > 0 {
        ComponentHealth::degraded(name, "last call failed")
    } else {
        ComponentHealth::healthy(name)
    };

    component
        .with_detail("backend", backend)
        .with_detail("consecutive_failures", streak.to_string())
        .with_detail("failures", stats.failures.to_string())
        .with_detail("successes", stats.successes.to_string())
}
