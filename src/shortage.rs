//! Drug shortage prediction passthrough.
//!
//! Forecasting itself lives outside the gateway. This module only fetches a
//! prediction from a [`ShortageForecaster`] and hands it to the HTTP layer.

use crate::config::ShortageConfig;
use crate::error::{OracleError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Shortage prediction payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortagePrediction {
    pub drug: String,
    pub location: String,
    pub risk_score: f64,
    pub recommendation: String,
}

/// Source of shortage predictions.
#[async_trait]
pub trait ShortageForecaster: Send + Sync {
    async fn forecast(&self) -> Result<ShortagePrediction>;

    fn name(&self) -> &str;
}

/// Build the forecaster selected by configuration.
pub fn from_config(config: &ShortageConfig) -> Result<Arc<dyn ShortageForecaster>> {
    match &config.endpoint {
        Some(endpoint) => Ok(Arc::new(HttpForecaster::new(endpoint.clone(), config.timeout)?)),
        None => Ok(Arc::new(StaticForecaster::default())),
    }
}

/// Serves one fixed prediction.
#[derive(Debug, Clone)]
pub struct StaticForecaster {
    prediction: ShortagePrediction,
}

impl StaticForecaster {
    pub fn new(prediction: ShortagePrediction) -> Self {
        Self { prediction }
    }
}

impl Default for StaticForecaster {
    fn default() -> Self {
        Self::new(ShortagePrediction {
            drug: "Insulin Glargine 100U/mL".to_string(),
            location: "Mumbai Central".to_string(),
            risk_score: 85.0,
            recommendation: "URGENT: Order 259 units immediately".to_string(),
        })
    }
}

#[async_trait]
impl ShortageForecaster for StaticForecaster {
    async fn forecast(&self) -> Result<ShortagePrediction> {
        Ok(self.prediction.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Fetches predictions from a forecasting service with `GET {endpoint}`.
#[derive(Debug, Clone)]
pub struct HttpForecaster {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpForecaster {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Config(format!("Failed to build forecast client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

#[async_trait]
impl ShortageForecaster for HttpForecaster {
    async fn forecast(&self) -> Result<ShortagePrediction> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| OracleError::Forecast(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OracleError::Forecast(format!(
                "forecasting service returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| OracleError::Forecast(format!("malformed forecast: {}", e)))
    }

    fn name(&self) -> &str {
        "http"
    }
}
