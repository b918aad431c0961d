//! Runtime configuration for the sync engine and its HTTP collaborators.
//!
//! Resolution priority for endpoints and credentials: explicit value → env
//! var. Throttle intervals ship as presets matching the two artifact kinds:
//! the dashboard refreshes at most once a minute, the lighter analysis view
//! twice as often.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Minimum seconds between compute attempts for the dashboard layout.
pub const DASHBOARD_FETCH_INTERVAL_SECS: u64 = 60;

/// Minimum seconds between compute attempts for the analysis layout.
pub const ANALYSIS_FETCH_INTERVAL_SECS: u64 = 30;

const DEFAULT_COMPUTE_TIMEOUT_SECS: u64 = 120;
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 10;

/// Per-controller sync tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Minimum interval between compute attempts for one key, in seconds.
    /// Enforced independently of freshness; `refetch(true)` bypasses it.
    pub min_fetch_interval_secs: u64,
}

impl SyncConfig {
    /// Preset for the dashboard layout (60 s throttle).
    pub fn dashboard() -> Self {
        Self {
            min_fetch_interval_secs: DASHBOARD_FETCH_INTERVAL_SECS,
        }
    }

    /// Preset for the analysis layout (30 s throttle).
    pub fn analysis() -> Self {
        Self {
            min_fetch_interval_secs: ANALYSIS_FETCH_INTERVAL_SECS,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::dashboard()
    }
}

/// Connection settings for the LLM-backed compute endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpComputeConfig {
    /// Full URL of the compute endpoint.
    pub endpoint: String,
    /// Bearer key for the gateway, when required.
    pub api_key: Option<String>,
    /// Request timeout. LLM calls are slow; default is 120 s.
    pub timeout_secs: u64,
}

impl HttpComputeConfig {
    /// Resolve from an explicit endpoint/key, falling back to
    /// `ARIA_COMPUTE_URL` / `ARIA_COMPUTE_API_KEY`.
    pub fn resolve(endpoint: Option<&str>, api_key: Option<&str>) -> Result<Self> {
        let endpoint = pick(endpoint, "ARIA_COMPUTE_URL")
            .ok_or_else(|| SyncError::Config("compute endpoint not set".into()))?;
        Ok(Self {
            endpoint,
            api_key: pick(api_key, "ARIA_COMPUTE_API_KEY"),
            timeout_secs: DEFAULT_COMPUTE_TIMEOUT_SECS,
        })
    }
}

/// Connection settings for the profile-row REST store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestGatewayConfig {
    /// Base URL of the profile API.
    pub base_url: String,
    /// Service key for row reads/writes, when required.
    pub service_key: Option<String>,
    /// Request timeout. Row reads are cheap; default is 10 s.
    pub timeout_secs: u64,
}

impl RestGatewayConfig {
    /// Resolve from an explicit URL/key, falling back to
    /// `ARIA_PROFILE_URL` / `ARIA_PROFILE_KEY`.
    pub fn resolve(base_url: Option<&str>, service_key: Option<&str>) -> Result<Self> {
        let base_url = pick(base_url, "ARIA_PROFILE_URL")
            .ok_or_else(|| SyncError::Config("profile API base URL not set".into()))?;
        Ok(Self {
            base_url,
            service_key: pick(service_key, "ARIA_PROFILE_KEY"),
            timeout_secs: DEFAULT_GATEWAY_TIMEOUT_SECS,
        })
    }
}

/// Explicit non-empty value wins; otherwise a non-empty env var.
fn pick(explicit: Option<&str>, env_key: &str) -> Option<String> {
    if let Some(v) = explicit.filter(|v| !v.is_empty()) {
        return Some(v.to_string());
    }
    std::env::var(env_key).ok().filter(|v| !v.is_empty())
}
