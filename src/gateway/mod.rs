//! Durable per-user layout persistence.
//!
//! The durable store is a managed per-user profile row with three logical
//! columns: the serialized layout, `cache_updated_at`, and (read-only from
//! this crate's perspective) `last_data_change_at`, maintained by unrelated
//! mutation paths — a habit log, a chat message, a check-in.
//!
//! Correctness never depends on this layer: a read failure is a cache miss,
//! and a write failure is logged and swallowed by the controller. Durability
//! is an optimization for future sessions.

pub mod rest;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::layout::{InsightLayout, LayoutVariant};

pub use rest::RestLayoutGateway;

/// A layout row loaded from durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredLayout {
    /// The cached layout artifact.
    pub layout: InsightLayout,
    /// When the layout was computed.
    pub cache_updated_at: DateTime<Utc>,
    /// Most recent mutation to the underlying source data. Absent when the
    /// signal has never been recorded for this user.
    #[serde(default)]
    pub last_data_change_at: Option<DateTime<Utc>>,
}

/// The durable persistence seam.
#[async_trait]
pub trait LayoutGateway: Send + Sync {
    /// Load the stored layout row for a user/variant. Implementations must
    /// degrade every failure (transport, decode, missing row) to `None` —
    /// the caller treats it as a cold cache.
    async fn load(&self, user_id: &str, variant: &LayoutVariant) -> Option<StoredLayout>;

    /// Persist a freshly computed layout. Best-effort: the caller logs the
    /// error and keeps the in-memory result either way.
    async fn save(
        &self,
        user_id: &str,
        variant: &LayoutVariant,
        layout: &InsightLayout,
        computed_at: DateTime<Utc>,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_layout_decodes_without_data_change_column() {
        let row = serde_json::json!({
            "layout": {
                "primary_metrics": [{"id": "mood", "label": "Mood", "value": 6.0}],
                "wellness_score": 71
            },
            "cache_updated_at": "2026-08-05T10:00:00Z"
        });
        let stored: StoredLayout = serde_json::from_value(row).unwrap();
        assert_eq!(stored.last_data_change_at, None);
        assert_eq!(stored.layout.wellness_score, 71.0);
    }

    #[test]
    fn test_stored_layout_round_trip() {
        let stored = StoredLayout {
            layout: InsightLayout::placeholder(),
            cache_updated_at: Utc::now(),
            last_data_change_at: Some(Utc::now()),
        };
        let json = serde_json::to_string(&stored).unwrap();
        let decoded: StoredLayout = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, stored);
    }
}
