//! HTTP client for the outbound simulation-mode toggle.
//!
//! # Example
//!
//! ```no_run
//! use dustline_core::control::{ControlClient, SimulationControl};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let control = SimulationControl::new("http://localhost:8000")?;
//! control.set_simulation_mode("DC-01", true).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ControlError;

/// Result type for control operations.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Request body for `POST /simulation-mode/{uuid}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationModeRequest {
    pub enabled: bool,
}

/// Switches simulation mode on the server.
#[async_trait]
pub trait ControlClient: Send + Sync {
    /// Ask the server to switch simulation mode for `device_uuid`.
    ///
    /// Succeeds only on a 2xx response with a JSON body.
    async fn set_simulation_mode(&self, device_uuid: &str, enabled: bool) -> Result<serde_json::Value>;
}

/// HTTP implementation of [`ControlClient`].
#[derive(Debug, Clone)]
pub struct SimulationControl {
    client: Client,
    base_url: String,
}

impl SimulationControl {
    /// Create a client for `base_url` (e.g. `http://localhost:8000`).
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(ControlError::Request)?;
        Self::with_client(base_url, client)
    }

    /// Create a client with a custom reqwest Client.
    pub fn with_client(base_url: &str, client: Client) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ControlError::InvalidUrl(format!(
                "URL must start with http:// or https://, got: {}",
                base_url
            )));
        }
        Ok(Self { client, base_url })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of the toggle endpoint for one device.
    pub fn endpoint(&self, device_uuid: &str) -> String {
        format!("{}/simulation-mode/{}", self.base_url, device_uuid)
    }

    async fn handle_response(&self, response: reqwest::Response) -> Result<serde_json::Value> {
        let status = response.status();
        if status.is_success() {
            response.json().await.map_err(ControlError::Request)
        } else {
            let message = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
                .unwrap_or_else(|| status.to_string());

            Err(ControlError::ApiError {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl ControlClient for SimulationControl {
    async fn set_simulation_mode(&self, device_uuid: &str, enabled: bool) -> Result<serde_json::Value> {
        if device_uuid.is_empty() {
            return Err(ControlError::MissingDevice);
        }
        let url = self.endpoint(device_uuid);
        debug!("POST {} enabled={}", url, enabled);

        let response = self
            .client
            .post(&url)
            .json(&SimulationModeRequest { enabled })
            .send()
            .await
            .map_err(|e| ControlError::NotReachable { url, source: e })?;

        self.handle_response(response).await
    }
}
