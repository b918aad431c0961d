//! HTTP adapter for the LLM-backed compute endpoint.
//!
//! POSTs the compute request as JSON and classifies every outcome into the
//! tagged [`ComputeError`] classes. Timeouts are owned by the HTTP client
//! configured here, not by the sync controller.

use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::compute::{classify_status, ComputeError, ComputeRequest, LayoutCompute};
use crate::config::HttpComputeConfig;
use crate::error::{Result, SyncError};
use crate::layout::InsightLayout;

/// Production [`LayoutCompute`] speaking JSON over HTTPS to the LLM gateway.
pub struct HttpLayoutCompute {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl std::fmt::Debug for HttpLayoutCompute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLayoutCompute")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl HttpLayoutCompute {
    /// Build from a resolved config.
    pub fn from_config(config: &HttpComputeConfig) -> Result<Self> {
        if config.endpoint.is_empty() {
            return Err(SyncError::Config("compute endpoint is empty".into()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    /// Attach bearer authentication when a key is configured.
    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {key}")),
            None => request,
        }
    }

    /// Mine a useful message out of a gateway error body.
    ///
    /// The gateway wraps errors as `{"error": {"message": ...}}`; fall back
    /// to the raw text when the body is not in that shape.
    fn error_message(body: &str) -> String {
        serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(String::from))
            .unwrap_or_else(|| body.to_string())
    }
}

#[async_trait::async_trait]
impl LayoutCompute for HttpLayoutCompute {
    async fn compute(
        &self,
        request: &ComputeRequest,
    ) -> std::result::Result<InsightLayout, ComputeError> {
        debug!(user = %request.user_id, variant = %request.variant, forced = request.forced,
               "requesting layout computation");

        let http = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(request);

        let response = self
            .apply_auth(http)
            .send()
            .await
            .map_err(|e| ComputeError::Network(format!("compute request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let body: Value = response
                .json()
                .await
                .map_err(|e| ComputeError::Malformed(format!("unreadable body: {e}")))?;
            return InsightLayout::from_value(body).map_err(ComputeError::Malformed);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status.as_u16(), &Self::error_message(&body)))
    }
}
