//! HTTP surface of the oracle.
//!
//! A [`Gateway`] is an explicit value built from configuration plus injected
//! [`Collaborators`]. It owns no business logic: handlers extract arguments,
//! call into admission, receiver, scoring and verdict assembly, and map
//! errors to status codes.

pub mod cors;
pub mod handlers;

use crate::admission::AdmissionController;
use crate::config::{OracleConfig, ServiceConfig};
use crate::error::{OracleError, Result};
use crate::health::CollaboratorTracker;
use crate::provenance::{self, ProvenanceAnchor};
use crate::receiver::ArtifactReceiver;
use crate::scoring::ScoringClient;
use crate::shortage::{self, ShortageForecaster};
use crate::verdict::VerdictAssembler;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use cors::{cors_middleware, CorsPolicy};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::info;

/// Room for multipart boundaries, part headers and extra fields on top of
/// the artifact ceiling. The receiver enforces the ceiling itself.
const ENVELOPE_SLACK: usize = 1024 * 1024;

/// External services the gateway depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub scoring: ScoringClient,
    pub anchor: Arc<dyn ProvenanceAnchor>,
    pub forecaster: Arc<dyn ShortageForecaster>,
}

impl Collaborators {
    /// Build the collaborators selected by configuration.
    pub fn from_config(config: &OracleConfig) -> Result<Self> {
        Ok(Self {
            scoring: ScoringClient::from_config(&config.scoring)?,
            anchor: provenance::from_config(&config.provenance)?,
            forecaster: shortage::from_config(&config.shortage)?,
        })
    }
}

/// Shared state for gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub service: Arc<ServiceConfig>,
    pub admission: AdmissionController,
    pub receiver: Arc<ArtifactReceiver>,
    pub scoring: ScoringClient,
    pub assembler: Arc<VerdictAssembler>,
    pub forecaster: Arc<dyn ShortageForecaster>,
    pub forecast_health: Arc<CollaboratorTracker>,
    pub started_at: Instant,
}

/// The oracle's HTTP gateway.
pub struct Gateway {
    state: GatewayState,
    cors: CorsPolicy,
    body_limit: usize,
}

impl Gateway {
    pub fn new(config: &OracleConfig, collaborators: Collaborators) -> Self {
        let receiver = ArtifactReceiver::new(&config.receiver);
        let body_limit = usize::try_from(receiver.max_bytes())
            .unwrap_or(usize::MAX)
            .saturating_add(ENVELOPE_SLACK);

        let state = GatewayState {
            service: Arc::new(config.service.clone()),
            admission: AdmissionController::new(&config.admission),
            receiver: Arc::new(receiver),
            scoring: collaborators.scoring,
            assembler: Arc::new(VerdictAssembler::new(&config.verdict, collaborators.anchor)),
            forecaster: collaborators.forecaster,
            forecast_health: Arc::new(CollaboratorTracker::new()),
            started_at: Instant::now(),
        };

        Self {
            state,
            cors: CorsPolicy::new(&config.gateway.cors),
            body_limit,
        }
    }

    pub fn state(&self) -> &GatewayState {
        &self.state
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.state.admission
    }

    /// Build the router.
    // Middleware order (outermost to innermost): CORS -> body limit
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(handlers::root))
            .route("/health", get(handlers::health))
            .route("/ready", get(handlers::ready))
            .route("/verify", post(handlers::verify))
            .route("/shortage-prediction", get(handlers::shortage_prediction))
            .with_state(self.state.clone())
            .layer(DefaultBodyLimit::max(self.body_limit))
            .layer(middleware::from_fn_with_state(self.cors.clone(), cors_middleware))
    }

    /// Serve on `listener` until `shutdown` resolves, then drain in-flight requests.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(
            addr = %addr,
            capacity = self.state.admission.capacity(),
            scoring = self.state.scoring.backend_name(),
            provenance = self.state.assembler.anchor_name(),
            shortage = self.state.forecaster.name(),
            "Oracle gateway listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| OracleError::Network(e.to_string()))?;

        info!("Oracle gateway stopped");
        Ok(())
    }
}
