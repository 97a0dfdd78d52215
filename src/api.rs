//! HTTP client for the remote posture/sensor API.
//!
//! Posture envelopes go to `{api_url}{posture_path}`, sensor envelopes to
//! `{api_url}{sensor_path}`. Any 2xx status acknowledges an envelope; every
//! other status, connection error or timeout is a [`DeliveryError`] that the
//! dispatcher's retry policy handles.

use crate::config::Config;
use crate::report::envelope::{ReportEnvelope, ReportKind, ReportRequest};
use crate::report::transport::{DeliveryError, Transport};
use chrono::Utc;
use std::time::Duration;

/// Remote API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub posture_url: String,
    pub sensor_url: String,
    /// Base URL, used for the connectivity probe
    pub base_url: String,
    pub timeout: Duration,
    pub device_id: String,
    pub timezone: String,
}

impl ApiConfig {
    /// Build the API configuration from the agent configuration.
    pub fn from_config(config: &Config, device_id: impl Into<String>) -> Self {
        Self {
            posture_url: config.device.posture_url(),
            sensor_url: config.device.sensor_url(),
            base_url: config.device.api_url.clone(),
            timeout: config.reporting.http_timeout,
            device_id: device_id.into(),
            timezone: config.device.timezone.clone(),
        }
    }

    /// Endpoint for an envelope kind.
    pub fn url_for(&self, kind: ReportKind) -> &str {
        match kind {
            ReportKind::Posture => &self.posture_url,
            ReportKind::Sensor => &self.sensor_url,
        }
    }
}

/// Errors creating an API client.
#[derive(Debug)]
pub enum ApiError {
    /// The HTTP client or runtime could not be built
    Client(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Client(msg) => write!(f, "API client error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// Async client for the remote API.
pub struct ApiClient {
    config: ApiConfig,
    client: reqwest::Client,
}

impl ApiClient {
    /// Create a new API client with the configured request timeout.
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::Client(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Check whether the API host answers at all.
    pub async fn test_connection(&self) -> Result<bool, DeliveryError> {
        let response = self
            .client
            .get(&self.config.base_url)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        Ok(!response.status().is_server_error())
    }

    /// POST one envelope to its endpoint.
    pub async fn post_report(&self, envelope: &ReportEnvelope) -> Result<(), DeliveryError> {
        let request = ReportRequest::new(
            envelope,
            &self.config.device_id,
            &self.config.timezone,
            Utc::now(),
        );
        let body =
            serde_json::to_vec(&request).map_err(|e| DeliveryError::Serialization(e.to_string()))?;

        let send = self
            .client
            .post(self.config.url_for(envelope.kind()))
            .header("Content-Type", "application/json")
            .body(body)
            .send();

        // Hard cap in case the client timeout does not cover connect stalls.
        let response = tokio::time::timeout(self.config.timeout, send)
            .await
            .map_err(|_| DeliveryError::Timeout)?
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }

    pub fn device_id(&self) -> &str {
        &self.config.device_id
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }
}

fn map_reqwest_error(e: reqwest::Error) -> DeliveryError {
    if e.is_timeout() {
        DeliveryError::Timeout
    } else {
        DeliveryError::Network(e.to_string())
    }
}

/// Blocking API client for the reporting thread.
pub struct BlockingApiClient {
    inner: ApiClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingApiClient {
    /// Create a new blocking API client.
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ApiError::Client(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            inner: ApiClient::new(config)?,
            runtime,
        })
    }

    pub fn test_connection(&self) -> Result<bool, DeliveryError> {
        self.runtime.block_on(self.inner.test_connection())
    }

    pub fn post_report(&self, envelope: &ReportEnvelope) -> Result<(), DeliveryError> {
        self.runtime.block_on(self.inner.post_report(envelope))
    }

    pub fn device_id(&self) -> &str {
        self.inner.device_id()
    }
}

impl Transport for BlockingApiClient {
    fn deliver(&mut self, envelope: &ReportEnvelope) -> Result<(), DeliveryError> {
        self.post_report(envelope)
    }
}
