//! REST adapter for the managed profile-row store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RestGatewayConfig;
use crate::error::{Result, SyncError};
use crate::gateway::{LayoutGateway, StoredLayout};
use crate::layout::{InsightLayout, LayoutVariant};

/// Production [`LayoutGateway`] over the profile REST API.
///
/// Row endpoint: `{base_url}/v1/profiles/{user_id}/insight-cache/{variant}`.
pub struct RestLayoutGateway {
    base_url: String,
    service_key: Option<String>,
    client: Client,
}

impl std::fmt::Debug for RestLayoutGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestLayoutGateway")
            .field("base_url", &self.base_url)
            .field("service_key", &self.service_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl RestLayoutGateway {
    /// Build from a resolved config.
    pub fn from_config(config: &RestGatewayConfig) -> Result<Self> {
        if config.base_url.is_empty() {
            return Err(SyncError::Config("profile API base URL is empty".into()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            client,
        })
    }

    fn row_url(&self, user_id: &str, variant: &LayoutVariant) -> String {
        format!(
            "{}/v1/profiles/{}/insight-cache/{}",
            self.base_url,
            user_id,
            variant.slug()
        )
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.service_key {
            Some(key) => request.header("Authorization", format!("Bearer {key}")),
            None => request,
        }
    }
}

#[async_trait]
impl LayoutGateway for RestLayoutGateway {
    async fn load(&self, user_id: &str, variant: &LayoutVariant) -> Option<StoredLayout> {
        let url = self.row_url(user_id, variant);
        let response = match self.apply_auth(self.client.get(&url)).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(user = %user_id, variant = %variant, error = %e,
                      "cache row read failed, treating as cold cache");
                return None;
            }
        };

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!(user = %user_id, variant = %variant, "no cached layout row");
                None
            }
            status if status.is_success() => match response.json::<StoredLayout>().await {
                Ok(row) => Some(row),
                Err(e) => {
                    warn!(user = %user_id, variant = %variant, error = %e,
                          "cache row undecodable, treating as cold cache");
                    None
                }
            },
            status => {
                warn!(user = %user_id, variant = %variant, status = status.as_u16(),
                      "cache row read rejected, treating as cold cache");
                None
            }
        }
    }

    async fn save(
        &self,
        user_id: &str,
        variant: &LayoutVariant,
        layout: &InsightLayout,
        computed_at: DateTime<Utc>,
    ) -> Result<()> {
        let url = self.row_url(user_id, variant);
        let body = json!({
            "layout": layout,
            "cache_updated_at": computed_at,
        });

        let response = self
            .apply_auth(self.client.put(&url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::Gateway(format!("cache row write failed: {e}")))?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(SyncError::Gateway(format!(
            "cache row write rejected: HTTP {status}: {body}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::TimeRange;

    fn gateway() -> RestLayoutGateway {
        RestLayoutGateway::from_config(&RestGatewayConfig {
            base_url: "https://profiles.aria.app/".to_string(),
            service_key: Some("svc-key".to_string()),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_from_config_rejects_empty_base_url() {
        let result = RestLayoutGateway::from_config(&RestGatewayConfig {
            base_url: String::new(),
            service_key: None,
            timeout_secs: 5,
        });
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    fn test_row_url_strips_trailing_slash_and_uses_slug() {
        let gw = gateway();
        assert_eq!(
            gw.row_url("u-9", &LayoutVariant::Dashboard),
            "https://profiles.aria.app/v1/profiles/u-9/insight-cache/dashboard"
        );
        assert_eq!(
            gw.row_url(
                "u-9",
                &LayoutVariant::Analysis {
                    range: TimeRange::Quarter
                }
            ),
            "https://profiles.aria.app/v1/profiles/u-9/insight-cache/analysis-quarter"
        );
    }

    #[test]
    fn test_debug_redacts_service_key() {
        let debug_str = format!("{:?}", gateway());
        assert!(!debug_str.contains("svc-key"), "{debug_str}");
    }
}
