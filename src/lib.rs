//! MedChain Oracle - an inference-serving gateway for drug packaging
//! authenticity verdicts.
//!
//! Callers upload a packaging image; the gateway admits the request against a
//! concurrency budget, validates the artifact, scores it through a pluggable
//! backend and returns a verdict anchored with an external provenance
//! reference.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Gateway: GET / | /health | /ready | /shortage-prediction   │
//! │           POST /verify (multipart)            CORS layer    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Admission Controller: capacity gate | per-request deadline │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Artifact Receiver -> Scoring Client -> Verdict Assembler   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Collaborators: scoring backend | provenance | forecasting  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use medchain_oracle::config::OracleConfig;
//!
//! #[tokio::main]
//! async fn main() -> medchain_oracle::Result<()> {
//!     // Deterministic stand-in backend, in-process ledger, localhost:8000
//!     let config = OracleConfig::development();
//!     medchain_oracle::run(config).await
//! }
//! ```

pub mod config;
pub mod error;

pub mod admission;
pub mod gateway;
pub mod health;
pub mod observability;
pub mod provenance;
pub mod receiver;
pub mod scoring;
pub mod shortage;
pub mod shutdown;
pub mod verdict;

pub use error::{OracleError, Result};

use config::OracleConfig;
use gateway::{Collaborators, Gateway};
use shutdown::{ShutdownCoordinator, SignalHandler};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Run the oracle with the given configuration until a shutdown signal.
pub async fn run(config: OracleConfig) -> Result<()> {
    config.validate()?;
    observability::init(&config.observability)?;

    info!(
        service = %config.service.name,
        version = %config.service.version,
        "Starting MedChain oracle"
    );

    let coordinator = ShutdownCoordinator::new();

    let metrics = if config.observability.metrics_enabled {
        let obs_config = config.observability.clone();
        let metrics_coordinator = coordinator.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = observability::run_metrics_server(obs_config, metrics_coordinator).await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    let signal_coordinator = coordinator.clone();
    tokio::spawn(async move {
        if let Err(e) = SignalHandler::new(signal_coordinator).run().await {
            error!("Signal handler error: {}", e);
        }
    });

    let collaborators = Collaborators::from_config(&config)?;
    let gateway = Gateway::new(&config, collaborators);
    let listener = TcpListener::bind(config.gateway.bind_addr).await?;

    let shutdown = coordinator.clone();
    let mut server = tokio::spawn(gateway.serve(listener, async move {
        shutdown.wait_for_shutdown().await
    }));

    tokio::select! {
        _ = coordinator.wait_for_shutdown() => {
            info!("Shutting down MedChain oracle gracefully...");

            // In-flight verifications get the drain window, then are abandoned.
            match tokio::time::timeout(coordinator.timeout(), &mut server).await {
                Ok(Ok(result)) => result?,
                Ok(Err(e)) => error!("Gateway task failed: {}", e),
                Err(_) => {
                    warn!(
                        timeout_secs = coordinator.timeout().as_secs(),
                        "Drain window elapsed with requests still in flight"
                    );
                    server.abort();
                }
            }
        }
        joined = &mut server => {
            // The gateway stopped on its own; take the rest of the process down with it.
            coordinator.shutdown();
            match joined {
                Ok(result) => result?,
                Err(e) => error!("Gateway task failed: {}", e),
            }
        }
    }

    if let Some(handle) = metrics {
        if !handle.is_finished() {
            handle.abort();
        }
    }

    info!("MedChain oracle shutdown complete");
    Ok(())
}
