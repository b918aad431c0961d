//! Session-scoped in-memory layout cache with fetch bookkeeping.
//!
//! Holds the last-known-good [`InsightLayout`] per [`LayoutKey`] for the
//! lifetime of the process, alongside the per-key fetch state: attempt
//! timestamps for throttling, monotonic request sequence numbers, the
//! in-flight cancellation token, and per-mount sync marks. Constructed once
//! at application start and shared by `Arc` — never a module-level global.
//!
//! No eviction: the key space is bounded by the (user, variant) pairs seen in
//! one session.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::layout::{Freshness, InsightLayout, LayoutKey};

/// Identifies one mounted consuming view. Fresh per mount, so navigating
/// away and back yields a new id and a new sync pass.
pub type MountId = Uuid;

/// Per-key cache slot.
#[derive(Default)]
struct Slot {
    /// Last successfully computed layout and its freshness record.
    value: Option<(InsightLayout, Freshness)>,
    /// Timestamp of the last compute attempt, success or failure.
    last_fetch_at: Option<DateTime<Utc>>,
    /// Highest sequence number handed out by `begin_fetch`.
    next_seq: u64,
    /// Highest sequence number whose result has been committed.
    applied_seq: u64,
    /// Sequence and token of the most recently registered in-flight call.
    inflight: Option<(u64, CancellationToken)>,
}

#[derive(Default)]
struct Inner {
    slots: HashMap<LayoutKey, Slot>,
    /// Mounts that have already run their initial sync for a key.
    synced_mounts: HashSet<(LayoutKey, MountId)>,
}

/// Process-wide layout cache. All writes are full slot replaces under one
/// lock; no read-modify-write escapes it.
#[derive(Default)]
pub struct LayoutCache {
    inner: Mutex<Inner>,
}

impl LayoutCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure lookup, no side effects.
    pub fn get(&self, key: &LayoutKey) -> Option<(InsightLayout, Freshness)> {
        let inner = self.lock();
        inner.slots.get(key).and_then(|s| s.value.clone())
    }

    /// Seed a slot from the durable row. Writes only when the slot is empty,
    /// so a concurrent commit from a finished compute is never clobbered by a
    /// slower gateway read.
    pub fn seed(&self, key: &LayoutKey, layout: InsightLayout, freshness: Freshness) {
        let mut inner = self.lock();
        let slot = inner.slots.entry(key.clone()).or_default();
        if slot.value.is_none() {
            slot.value = Some((layout, freshness));
        }
    }

    /// Commit a compute result under the sequence guard.
    ///
    /// Applies the write only when `seq` is newer than the highest sequence
    /// already applied for the key; a completion arriving out of order is
    /// discarded. Returns whether the write was applied.
    pub fn commit(
        &self,
        key: &LayoutKey,
        seq: u64,
        layout: InsightLayout,
        freshness: Freshness,
    ) -> bool {
        let mut inner = self.lock();
        let slot = inner.slots.entry(key.clone()).or_default();
        if seq <= slot.applied_seq {
            debug!(key = %key, seq, applied = slot.applied_seq, "discarding superseded result");
            return false;
        }
        slot.value = Some((layout, freshness));
        slot.applied_seq = seq;
        true
    }

    /// Stamp a compute attempt and hand out its sequence number.
    ///
    /// Called before the compute future is awaited, so concurrent mounts
    /// observe the throttle while the call is still in flight.
    pub fn begin_fetch(&self, key: &LayoutKey, now: DateTime<Utc>) -> u64 {
        let mut inner = self.lock();
        let slot = inner.slots.entry(key.clone()).or_default();
        slot.last_fetch_at = Some(now);
        slot.next_seq += 1;
        slot.next_seq
    }

    /// Timestamp of the last compute attempt for the key, if any.
    pub fn last_fetch_at(&self, key: &LayoutKey) -> Option<DateTime<Utc>> {
        let inner = self.lock();
        inner.slots.get(key).and_then(|s| s.last_fetch_at)
    }

    /// Register the in-flight call for `seq`, replacing any prior entry.
    ///
    /// With `cancel_prior` (forced refreshes), the previous in-flight token
    /// is cancelled so its eventual result is dropped; otherwise the earlier
    /// call keeps running and the sequence guard arbitrates.
    pub fn register_inflight(
        &self,
        key: &LayoutKey,
        seq: u64,
        cancel_prior: bool,
    ) -> CancellationToken {
        let mut inner = self.lock();
        let slot = inner.slots.entry(key.clone()).or_default();
        if let Some((prev_seq, prev)) = slot.inflight.take() {
            if cancel_prior {
                debug!(key = %key, superseded = prev_seq, by = seq, "cancelling in-flight refresh");
                prev.cancel();
            }
        }
        let token = CancellationToken::new();
        slot.inflight = Some((seq, token.clone()));
        token
    }

    /// Drop the in-flight registration for `seq` once its call has settled.
    /// A newer registration under a different sequence is left untouched.
    pub fn clear_inflight(&self, key: &LayoutKey, seq: u64) {
        let mut inner = self.lock();
        if let Some(slot) = inner.slots.get_mut(key) {
            if matches!(slot.inflight, Some((s, _)) if s == seq) {
                slot.inflight = None;
            }
        }
    }

    /// Mark that `mount` has run its initial sync for `key`. Returns `true`
    /// the first time only, making check-and-mark atomic for concurrent
    /// re-renders.
    pub fn mark_mount_synced(&self, key: &LayoutKey, mount: MountId) -> bool {
        let mut inner = self.lock();
        inner.synced_mounts.insert((key.clone(), mount))
    }

    /// Whether `mount` already ran its initial sync for `key`.
    pub fn mount_synced(&self, key: &LayoutKey, mount: MountId) -> bool {
        let inner = self.lock();
        inner.synced_mounts.contains(&(key.clone(), mount))
    }

    /// Number of keys with cache state.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().slots.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("layout cache lock poisoned")
    }

    /// Rewind the attempt stamp so tests can step past the throttle window
    /// without sleeping.
    #[cfg(test)]
    pub(crate) fn backdate_last_fetch(&self, key: &LayoutKey, to: DateTime<Utc>) {
        let mut inner = self.lock();
        if let Some(slot) = inner.slots.get_mut(key) {
            slot.last_fetch_at = Some(to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key() -> LayoutKey {
        LayoutKey::dashboard("u-1")
    }

    fn layout(score: f64) -> InsightLayout {
        let mut l = InsightLayout::placeholder();
        l.wellness_score = score;
        l
    }

    fn freshness() -> Freshness {
        Freshness {
            computed_at: Utc::now(),
            data_changed_at: None,
        }
    }

    #[test]
    fn test_get_on_cold_cache_is_none() {
        let cache = LayoutCache::new();
        assert!(cache.get(&key()).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_seed_then_get() {
        let cache = LayoutCache::new();
        cache.seed(&key(), layout(62.0), freshness());
        let (got, _) = cache.get(&key()).unwrap();
        assert_eq!(got.wellness_score, 62.0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_seed_does_not_clobber_existing_value() {
        let cache = LayoutCache::new();
        let seq = cache.begin_fetch(&key(), Utc::now());
        assert!(cache.commit(&key(), seq, layout(80.0), freshness()));
        // A slower gateway read arriving afterwards must not regress the slot.
        cache.seed(&key(), layout(10.0), freshness());
        let (got, _) = cache.get(&key()).unwrap();
        assert_eq!(got.wellness_score, 80.0);
    }

    #[test]
    fn test_commit_applies_in_issue_order() {
        let cache = LayoutCache::new();
        let seq_a = cache.begin_fetch(&key(), Utc::now());
        let seq_b = cache.begin_fetch(&key(), Utc::now());
        assert!(seq_b > seq_a);

        assert!(cache.commit(&key(), seq_a, layout(10.0), freshness()));
        assert!(cache.commit(&key(), seq_b, layout(20.0), freshness()));
        let (got, _) = cache.get(&key()).unwrap();
        assert_eq!(got.wellness_score, 20.0);
    }

    #[test]
    fn test_commit_discards_superseded_completion() {
        let cache = LayoutCache::new();
        let seq_a = cache.begin_fetch(&key(), Utc::now());
        let seq_b = cache.begin_fetch(&key(), Utc::now());

        // B resolves first, A limps in afterwards.
        assert!(cache.commit(&key(), seq_b, layout(20.0), freshness()));
        assert!(!cache.commit(&key(), seq_a, layout(10.0), freshness()));

        let (got, _) = cache.get(&key()).unwrap();
        assert_eq!(got.wellness_score, 20.0, "later-issued call must win");
    }

    #[test]
    fn test_begin_fetch_stamps_attempt_time() {
        let cache = LayoutCache::new();
        assert!(cache.last_fetch_at(&key()).is_none());
        let before = Utc::now();
        cache.begin_fetch(&key(), before);
        assert_eq!(cache.last_fetch_at(&key()), Some(before));
    }

    #[test]
    fn test_backdate_last_fetch() {
        let cache = LayoutCache::new();
        let now = Utc::now();
        cache.begin_fetch(&key(), now);
        let past = now - Duration::minutes(5);
        cache.backdate_last_fetch(&key(), past);
        assert_eq!(cache.last_fetch_at(&key()), Some(past));
    }

    #[test]
    fn test_forced_registration_cancels_prior_inflight() {
        let cache = LayoutCache::new();
        let seq_a = cache.begin_fetch(&key(), Utc::now());
        let token_a = cache.register_inflight(&key(), seq_a, false);
        assert!(!token_a.is_cancelled());

        let seq_b = cache.begin_fetch(&key(), Utc::now());
        let token_b = cache.register_inflight(&key(), seq_b, true);
        assert!(token_a.is_cancelled(), "forced refresh must cancel prior call");
        assert!(!token_b.is_cancelled());
    }

    #[test]
    fn test_unforced_registration_leaves_prior_running() {
        let cache = LayoutCache::new();
        let seq_a = cache.begin_fetch(&key(), Utc::now());
        let token_a = cache.register_inflight(&key(), seq_a, false);

        let seq_b = cache.begin_fetch(&key(), Utc::now());
        let _token_b = cache.register_inflight(&key(), seq_b, false);
        assert!(
            !token_a.is_cancelled(),
            "background calls race under the sequence guard, not cancellation"
        );
    }

    #[test]
    fn test_clear_inflight_only_for_matching_seq() {
        let cache = LayoutCache::new();
        let seq_a = cache.begin_fetch(&key(), Utc::now());
        let _token_a = cache.register_inflight(&key(), seq_a, false);
        let seq_b = cache.begin_fetch(&key(), Utc::now());
        let token_b = cache.register_inflight(&key(), seq_b, false);

        // A settles late; B's registration must survive.
        cache.clear_inflight(&key(), seq_a);
        let seq_c = cache.begin_fetch(&key(), Utc::now());
        cache.register_inflight(&key(), seq_c, true);
        assert!(
            token_b.is_cancelled(),
            "B was still registered and must be cancelled by the forced C"
        );
    }

    #[test]
    fn test_mount_marks_are_per_key_and_per_mount() {
        let cache = LayoutCache::new();
        let mount_a = Uuid::new_v4();
        let mount_b = Uuid::new_v4();
        let other = LayoutKey::dashboard("u-2");

        assert!(cache.mark_mount_synced(&key(), mount_a));
        assert!(!cache.mark_mount_synced(&key(), mount_a), "second mark is a no-op");
        assert!(cache.mount_synced(&key(), mount_a));
        assert!(!cache.mount_synced(&key(), mount_b));
        assert!(!cache.mount_synced(&other, mount_a));
    }

    #[test]
    fn test_keys_are_independent() {
        let cache = LayoutCache::new();
        let dash = LayoutKey::dashboard("u-1");
        let analysis = LayoutKey::analysis("u-1", crate::layout::TimeRange::Week);
        cache.seed(&dash, layout(40.0), freshness());
        assert!(cache.get(&analysis).is_none());
        assert_eq!(cache.len(), 1);
    }
}
