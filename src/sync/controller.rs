//! The per-mount sync orchestrator.
//!
//! One [`SyncController`] per mounted consuming view per [`LayoutKey`]. On
//! `sync()` it resolves what to display (memory cache, then durable row, then
//! the placeholder), decides whether a recompute is needed, and publishes
//! every change as a [`ViewState`] over a `tokio::sync::watch` channel. The
//! view re-renders by watching the channel; `refetch(true)` is the only way
//! to bypass cache validity and throttling.
//!
//! Per-key state machine: `Cold → ShowingStale | ShowingValid → Refreshing →
//! ShowingValid` on success, back to the prior showing state on failure.
//!
//! Ordering across concurrent refreshes of one key is settled by the cache's
//! sequence guard: the later-issued call wins no matter which completes
//! first, and a forced refresh cancels the prior in-flight call outright.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{LayoutCache, MountId};
use crate::compute::{ComputeError, ComputeRequest, LayoutCompute};
use crate::config::SyncConfig;
use crate::gateway::LayoutGateway;
use crate::layout::metrics::MetricSummary;
use crate::layout::{Freshness, InsightLayout, LayoutKey};

/// Where the controller currently is in the per-key state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Nothing known yet; the placeholder is showing.
    Cold,
    /// A cached layout is showing but the source data moved past it (or its
    /// freshness is unknown).
    ShowingStale,
    /// A cached layout is showing and no recompute is needed.
    ShowingValid,
    /// A compute call is in flight.
    Refreshing,
}

/// The consuming-view contract, published over the watch channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    /// What to render right now. Never absent: the placeholder stands in
    /// until a real layout exists.
    pub layout: InsightLayout,
    /// True only when there is nothing at all to show yet.
    pub loading: bool,
    /// True while a refresh runs behind an already-displayed layout.
    pub refreshing: bool,
    /// Human-readable failure, set only for a hard compute failure. Rate
    /// limits and billing gates never surface here.
    pub error: Option<String>,
    /// Current state-machine phase.
    pub phase: SyncPhase,
}

impl ViewState {
    fn initial() -> Self {
        Self {
            layout: InsightLayout::placeholder(),
            loading: false,
            refreshing: false,
            error: None,
            phase: SyncPhase::Cold,
        }
    }
}

/// Orchestrates one mounted view of one layout key.
pub struct SyncController {
    key: LayoutKey,
    mount_id: MountId,
    metrics: MetricSummary,
    cache: Arc<LayoutCache>,
    gateway: Arc<dyn LayoutGateway>,
    compute: Arc<dyn LayoutCompute>,
    config: SyncConfig,
    state_tx: watch::Sender<ViewState>,
}

impl SyncController {
    /// Build a controller for a freshly mounted view. Each construction gets
    /// its own mount id, so navigating away and back yields a new sync pass
    /// (bounded by the fetch throttle).
    pub fn new(
        key: LayoutKey,
        cache: Arc<LayoutCache>,
        gateway: Arc<dyn LayoutGateway>,
        compute: Arc<dyn LayoutCompute>,
        config: SyncConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(ViewState::initial());
        Self {
            key,
            mount_id: Uuid::new_v4(),
            metrics: MetricSummary::default(),
            cache,
            gateway,
            compute,
            config,
            state_tx,
        }
    }

    /// Attach the client-side check-in aggregates sent with compute requests.
    pub fn with_metric_summary(mut self, metrics: MetricSummary) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn key(&self) -> &LayoutKey {
        &self.key
    }

    pub fn mount_id(&self) -> MountId {
        self.mount_id
    }

    /// Subscribe to view-state updates.
    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.state_tx.subscribe()
    }

    /// Current view state.
    pub fn state(&self) -> ViewState {
        self.state_tx.borrow().clone()
    }

    /// Mount-time entry point. The first call per mount runs the full
    /// resolution pass; repeated calls from re-render cycles are no-ops, so a
    /// render storm can never fan out into duplicate fetches.
    pub async fn sync(&self) -> ViewState {
        if !self.cache.mark_mount_synced(&self.key, self.mount_id) {
            return self.state();
        }
        self.run(false, true).await
    }

    /// Explicit refresh. `force` bypasses both cache validity and the fetch
    /// throttle, and cancels any in-flight refresh for the key.
    pub async fn refetch(&self, force: bool) -> ViewState {
        let _ = self.cache.mark_mount_synced(&self.key, self.mount_id);
        self.run(force, false).await
    }

    async fn run(&self, force: bool, first_sync: bool) -> ViewState {
        let now = Utc::now();

        // Resolve what to display right now: memory cache first, durable row
        // second. Render blocks on a spinner only when both miss.
        let mut known = self.cache.get(&self.key);
        if known.is_none() {
            if let Some(row) = self.gateway.load(&self.key.user_id, &self.key.variant).await {
                let freshness = Freshness {
                    computed_at: row.cache_updated_at,
                    data_changed_at: row.last_data_change_at,
                };
                self.cache.seed(&self.key, row.layout.clone(), freshness);
                known = Some((row.layout, freshness));
            }
        }
        match &known {
            Some((layout, freshness)) => {
                let phase = if freshness.is_valid() {
                    SyncPhase::ShowingValid
                } else {
                    SyncPhase::ShowingStale
                };
                self.publish(|s| {
                    s.layout = layout.clone();
                    s.loading = false;
                    s.error = None;
                    s.phase = phase;
                });
            }
            None => self.publish(|s| {
                s.layout = InsightLayout::placeholder();
                s.loading = true;
                s.error = None;
                s.phase = SyncPhase::Cold;
            }),
        }

        // A valid cache answers a mount with zero remote calls.
        if !force && first_sync {
            if let Some((_, freshness)) = &known {
                if freshness.is_valid() {
                    debug!(key = %self.key, "cached layout still valid, skipping recompute");
                    return self.state();
                }
            }
        }

        // Throttle: stale is tolerable, hammering the compute endpoint is
        // not. Only applies when there is something on screen.
        if !force && known.is_some() {
            if let Some(last) = self.cache.last_fetch_at(&self.key) {
                let elapsed = (now - last).num_seconds();
                if elapsed < self.config.min_fetch_interval_secs as i64 {
                    debug!(key = %self.key, elapsed, "refresh throttled");
                    return self.state();
                }
            }
        }

        self.fetch(now, force, known).await;
        self.state()
    }

    async fn fetch(
        &self,
        now: DateTime<Utc>,
        force: bool,
        known: Option<(InsightLayout, Freshness)>,
    ) {
        // Stamp the attempt and take a sequence number before awaiting
        // anything, so concurrent mounts observe the throttle while this call
        // is still in flight.
        let seq = self.cache.begin_fetch(&self.key, now);
        let token = self.cache.register_inflight(&self.key, seq, force);

        let has_fallback = known.is_some();
        self.publish(|s| {
            s.refreshing = has_fallback;
            s.phase = SyncPhase::Refreshing;
        });

        let request = ComputeRequest::new(&self.key, self.metrics.clone(), force);
        let outcome = tokio::select! {
            _ = token.cancelled() => None,
            result = self.compute.compute(&request) => Some(result),
        };
        self.cache.clear_inflight(&self.key, seq);

        let Some(result) = outcome else {
            // The superseding call may already have committed; show its
            // result rather than regressing to what this call started with.
            debug!(key = %self.key, seq, "refresh superseded mid-flight, dropping");
            self.settle(self.cache.get(&self.key).or(known), None);
            return;
        };

        // Hold every compute implementation to the layout contract.
        let result = result.and_then(|layout| match layout.validate() {
            Ok(()) => Ok(layout),
            Err(reason) => Err(ComputeError::Malformed(reason)),
        });

        match result {
            Ok(layout) => {
                let freshness = Freshness {
                    computed_at: Utc::now(),
                    data_changed_at: known.as_ref().and_then(|(_, f)| f.data_changed_at),
                };
                if !self.cache.commit(&self.key, seq, layout.clone(), freshness) {
                    // A newer refresh already landed; show its result instead.
                    self.settle(self.cache.get(&self.key), None);
                    return;
                }
                if let Err(e) = self
                    .gateway
                    .save(&self.key.user_id, &self.key.variant, &layout, freshness.computed_at)
                    .await
                {
                    warn!(key = %self.key, error = %e, "failed to persist refreshed layout");
                }
                self.publish(|s| {
                    s.layout = layout;
                    s.loading = false;
                    s.refreshing = false;
                    s.error = None;
                    s.phase = SyncPhase::ShowingValid;
                });
            }
            Err(err) if err.is_transient_expected() => {
                debug!(key = %self.key, cause = %err, "compute backpressure, keeping cached layout");
                self.settle(self.cache.get(&self.key).or(known), None);
            }
            Err(err) => {
                warn!(key = %self.key, cause = %err, "layout refresh failed");
                self.settle(
                    self.cache.get(&self.key).or(known),
                    Some(format!("could not refresh insights: {err}")),
                );
            }
        }
    }

    /// Every exit path clears the progress flags and restores a coherent
    /// showing state.
    fn settle(&self, known: Option<(InsightLayout, Freshness)>, error: Option<String>) {
        self.publish(|s| {
            s.loading = false;
            s.refreshing = false;
            s.error = error;
            match known {
                Some((layout, freshness)) => {
                    s.phase = if freshness.is_valid() {
                        SyncPhase::ShowingValid
                    } else {
                        SyncPhase::ShowingStale
                    };
                    s.layout = layout;
                }
                None => {
                    s.phase = SyncPhase::Cold;
                    s.layout = InsightLayout::placeholder();
                }
            }
        });
    }

    fn publish<F: FnOnce(&mut ViewState)>(&self, f: F) {
        self.state_tx.send_modify(f);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
