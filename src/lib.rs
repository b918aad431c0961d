//! Stale-while-revalidate sync engine for Aria's AI-generated insight layouts.
//!
//! A consuming view asks for the current [`InsightLayout`] for a
//! `(user, variant)` pair. The engine shows whatever it already knows
//! immediately — memory cache first, durable profile row second — then
//! decides whether that value is still valid against the last mutation to the
//! underlying wellness data, and refreshes it in the background from the
//! LLM-backed compute endpoint when it is not. Render never blocks on the
//! network unless there is nothing at all to show.
//!
//! Three collaborating parts:
//! - [`LayoutCache`]: session-scoped in-memory store, shared across every
//!   mounted view via `Arc`. Survives remounts, not restarts.
//! - [`LayoutGateway`]: durable per-user persistence behind an async trait;
//!   read failures degrade to cache misses, writes are best-effort.
//! - [`SyncController`]: the per-mount orchestrator. Publishes [`ViewState`]
//!   over a `tokio::sync::watch` channel and exposes `refetch(force)`.

pub mod cache;
pub mod compute;
pub mod config;
pub mod error;
pub mod gateway;
pub mod layout;
pub mod sync;

pub use cache::{LayoutCache, MountId};
pub use compute::{ComputeError, ComputeRequest, HttpLayoutCompute, LayoutCompute};
pub use config::{HttpComputeConfig, RestGatewayConfig, SyncConfig};
pub use error::{Result, SyncError};
pub use gateway::{LayoutGateway, RestLayoutGateway, StoredLayout};
pub use layout::metrics::{EmotionSample, MetricSummary};
pub use layout::{
    Freshness, InsightLayout, LayoutKey, LayoutVariant, MetricCard, TimeRange, Trend, WidgetSpec,
};
pub use sync::{SyncController, SyncPhase, ViewState};
