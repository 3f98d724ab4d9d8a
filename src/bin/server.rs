//! MedChain oracle server binary.

use clap::Parser;
use medchain_oracle::config::{humantime_serde, OracleConfig, ScoringConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "medchain-oracle-server")]
#[command(about = "Inference-serving gateway for drug packaging authenticity verdicts")]
struct Args {
    /// Configuration file (JSON)
    #[arg(short, long, env = "MEDCHAIN_CONFIG")]
    config: Option<PathBuf>,

    /// Gateway bind address
    #[arg(long, env = "MEDCHAIN_BIND_ADDR")]
    bind: Option<SocketAddr>,

    /// Maximum concurrent scoring requests
    #[arg(long, env = "MEDCHAIN_CAPACITY")]
    capacity: Option<usize>,

    /// Per-request deadline (e.g. "10s", "750ms")
    #[arg(long, env = "MEDCHAIN_DEADLINE", value_parser = humantime_serde::parse_duration)]
    deadline: Option<Duration>,

    /// Artifact size ceiling in bytes
    #[arg(long, env = "MEDCHAIN_MAX_ARTIFACT_BYTES")]
    max_artifact_bytes: Option<u64>,

    /// Seed for the deterministic stand-in backend
    #[arg(long, env = "MEDCHAIN_SEED")]
    seed: Option<u64>,

    /// Log level
    #[arg(long, env = "MEDCHAIN_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load or create configuration
    let mut config = if let Some(config_path) = args.config {
        OracleConfig::from_file(&config_path)?
    } else {
        OracleConfig::development()
    };

    // Override with CLI args
    if let Some(bind) = args.bind {
        config.gateway.bind_addr = bind;
    }
    if let Some(capacity) = args.capacity {
        config.admission.capacity = capacity;
    }
    if let Some(deadline) = args.deadline {
        config.admission.deadline = deadline;
    }
    if let Some(max) = args.max_artifact_bytes {
        config.receiver.max_artifact_bytes = max;
    }
    if let Some(level) = args.log_level {
        config.observability.log_level = level;
    }
    if let Some(new_seed) = args.seed {
        match &mut config.scoring {
            ScoringConfig::Standin { seed, .. } => *seed = new_seed,
            ScoringConfig::Remote { .. } => {
                anyhow::bail!("--seed only applies to the stand-in scoring backend")
            }
        }
    }

    medchain_oracle::run(config).await?;

    Ok(())
}
