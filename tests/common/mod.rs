//! Common test utilities for integration tests.

pub mod fixtures;

use medchain_oracle::admission::AdmissionController;
use medchain_oracle::config::OracleConfig;
use medchain_oracle::gateway::{Collaborators, Gateway};
use medchain_oracle::provenance::{LedgerStandIn, ProvenanceAnchor};
use medchain_oracle::scoring::{DeterministicBackend, ScoringBackend, ScoringClient};
use medchain_oracle::shortage::{ShortageForecaster, StaticForecaster};
use medchain_oracle::shutdown::ShutdownCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

// Re-export common types
pub use fixtures::*;

/// Seed used by the default stand-in backend in tests.
pub const TEST_SEED: u64 = 42;

/// Configuration with the production limits and a quiet observability stack.
pub fn test_config() -> OracleConfig {
    let mut config = OracleConfig::default();
    config.observability.metrics_enabled = false;
    config
}

/// Builder for a gateway running on an ephemeral port.
pub struct TestGatewayBuilder {
    config: OracleConfig,
    backend: Arc<dyn ScoringBackend>,
    anchor: Arc<dyn ProvenanceAnchor>,
    forecaster: Arc<dyn ShortageForecaster>,
}

impl TestGatewayBuilder {
    pub fn new() -> Self {
        Self {
            config: test_config(),
            backend: Arc::new(DeterministicBackend::new(TEST_SEED)),
            anchor: Arc::new(LedgerStandIn::new()),
            forecaster: Arc::new(StaticForecaster::default()),
        }
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.admission.capacity = capacity;
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.config.admission.deadline = deadline;
        self
    }

    pub fn max_artifact_bytes(mut self, max: u64) -> Self {
        self.config.receiver.max_artifact_bytes = max;
        self
    }

    pub fn allowed_origins(mut self, origins: &[&str]) -> Self {
        self.config.gateway.cors.allowed_origins = origins.iter().map(|o| o.to_string()).collect();
        self
    }

    /// Stand-in backend that sleeps for `latency` before scoring.
    pub fn scoring_latency(mut self, latency: Duration) -> Self {
        self.backend = Arc::new(DeterministicBackend::new(TEST_SEED).with_latency(latency));
        self
    }

    pub fn backend(mut self, backend: Arc<dyn ScoringBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn anchor(mut self, anchor: Arc<dyn ProvenanceAnchor>) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn forecaster(mut self, forecaster: Arc<dyn ShortageForecaster>) -> Self {
        self.forecaster = forecaster;
        self
    }

    pub async fn spawn(self) -> TestGateway {
        let collaborators = Collaborators {
            scoring: ScoringClient::new(self.backend),
            anchor: self.anchor,
            forecaster: self.forecaster,
        };
        let gateway = Gateway::new(&self.config, collaborators);
        let admission = gateway.admission().clone();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to port");
        let addr = listener.local_addr().expect("bound address");

        let shutdown = ShutdownCoordinator::with_timeout(Duration::from_secs(1));
        let signal = shutdown.clone();
        let handle = tokio::spawn(async move {
            gateway
                .serve(listener, async move { signal.wait_for_shutdown().await })
                .await
                .expect("gateway serve");
        });

        TestGateway {
            base_url: format!("http://{}", addr),
            client: reqwest::Client::new(),
            admission,
            shutdown,
            handle,
        }
    }
}

impl Default for TestGatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running gateway plus a client pointed at it.
pub struct TestGateway {
    pub base_url: String,
    pub client: reqwest::Client,
    pub admission: AdmissionController,
    shutdown: ShutdownCoordinator,
    handle: JoinHandle<()>,
}

impl TestGateway {
    pub async fn start() -> Self {
        TestGatewayBuilder::new().spawn().await
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request")
    }

    pub async fn verify(&self, bytes: Vec<u8>, filename: &str, media_type: &str) -> reqwest::Response {
        self.client
            .post(self.url("/verify"))
            .multipart(verify_form(bytes, filename, media_type))
            .send()
            .await
            .expect("POST /verify")
    }

    /// Wait until `in_flight` requests hold admission tickets.
    pub async fn wait_for_in_flight(&self, in_flight: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.admission.in_flight() != in_flight {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("in-flight count not reached");
    }

    pub async fn stop(self) {
        self.shutdown.shutdown();
        let _ = tokio::time::timeout(Duration::from_secs(2), self.handle).await;
    }
}
