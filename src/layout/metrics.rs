//! Time-weighted aggregation of recent check-in samples.
//!
//! Before asking the compute endpoint for a fresh layout, the client
//! condenses the user's recent emotion check-ins into a [`MetricSummary`]
//! using exponential decay: a sample one half-life old counts half as much as
//! one logged right now. The summary travels with the compute request so the
//! endpoint sees the same aggregates every consuming view sees.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Half-life used when the caller does not supply one: three days.
pub const DEFAULT_HALF_LIFE_HOURS: i64 = 72;

/// One mood/emotion check-in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionSample {
    /// When the check-in was logged.
    pub recorded_at: DateTime<Utc>,
    /// Mood score on the 0–10 check-in scale.
    pub score: f64,
}

/// Aggregates sent along with a compute request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MetricSummary {
    /// Number of samples that contributed.
    pub sample_count: u32,
    /// Decay-weighted mean mood, `None` when there are no samples.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weighted_mood: Option<f64>,
    /// Age of the oldest contributing sample, in whole days.
    pub window_days: u32,
}

impl MetricSummary {
    /// Condense `samples` as seen from `now`, using the default half-life.
    pub fn from_samples(samples: &[EmotionSample], now: DateTime<Utc>) -> Self {
        let half_life = Duration::hours(DEFAULT_HALF_LIFE_HOURS);
        let window_days = samples
            .iter()
            .map(|s| (now - s.recorded_at).num_days().max(0) as u32)
            .max()
            .unwrap_or(0);
        Self {
            sample_count: samples.len() as u32,
            weighted_mood: decay_weighted_mean(samples, now, half_life),
            window_days,
        }
    }
}

/// Exponential-decay weighted mean of `samples` as seen from `now`.
///
/// Each sample is weighted `0.5^(age / half_life)`. Samples stamped in the
/// future (clock skew between devices) are clamped to zero age rather than
/// amplified. Returns `None` for an empty slice.
pub fn decay_weighted_mean(
    samples: &[EmotionSample],
    now: DateTime<Utc>,
    half_life: Duration,
) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let half_life_secs = half_life.num_seconds().max(1) as f64;
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for sample in samples {
        let age_secs = (now - sample.recorded_at).num_seconds().max(0) as f64;
        let weight = 0.5_f64.powf(age_secs / half_life_secs);
        weighted_sum += sample.score * weight;
        weight_total += weight;
    }
    Some(weighted_sum / weight_total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(hours_ago: i64, score: f64, now: DateTime<Utc>) -> EmotionSample {
        EmotionSample {
            recorded_at: now - Duration::hours(hours_ago),
            score,
        }
    }

    #[test]
    fn test_empty_samples_yield_none() {
        let now = Utc::now();
        assert_eq!(decay_weighted_mean(&[], now, Duration::hours(72)), None);
        let summary = MetricSummary::from_samples(&[], now);
        assert_eq!(summary.sample_count, 0);
        assert_eq!(summary.weighted_mood, None);
        assert_eq!(summary.window_days, 0);
    }

    #[test]
    fn test_single_sample_is_its_own_mean() {
        let now = Utc::now();
        let mean = decay_weighted_mean(&[sample(5, 7.0, now)], now, Duration::hours(72)).unwrap();
        assert!((mean - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_newer_samples_dominate_older_ones() {
        let now = Utc::now();
        // Recent high mood, old low mood: mean should land above the midpoint.
        let samples = [sample(1, 9.0, now), sample(300, 1.0, now)];
        let mean = decay_weighted_mean(&samples, now, Duration::hours(72)).unwrap();
        assert!(mean > 5.0, "recent sample should dominate, got {mean}");
    }

    #[test]
    fn test_sample_at_one_half_life_weighs_half() {
        let now = Utc::now();
        // s0 at age 0 (weight 1), s1 at one half-life (weight 0.5):
        // mean = (10*1 + 4*0.5) / 1.5 = 8.0
        let samples = [sample(0, 10.0, now), sample(72, 4.0, now)];
        let mean = decay_weighted_mean(&samples, now, Duration::hours(72)).unwrap();
        assert!((mean - 8.0).abs() < 1e-6, "expected 8.0, got {mean}");
    }

    #[test]
    fn test_future_samples_clamped_not_amplified() {
        let now = Utc::now();
        let future = EmotionSample {
            recorded_at: now + Duration::hours(6),
            score: 2.0,
        };
        let samples = [future, sample(0, 2.0, now)];
        let mean = decay_weighted_mean(&samples, now, Duration::hours(72)).unwrap();
        // Both clamp to weight 1.0, so the mean is exact.
        assert!((mean - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_window_spans_oldest_sample() {
        let now = Utc::now();
        let samples = [sample(2, 6.0, now), sample(24 * 9, 5.0, now)];
        let summary = MetricSummary::from_samples(&samples, now);
        assert_eq!(summary.sample_count, 2);
        assert_eq!(summary.window_days, 9);
        assert!(summary.weighted_mood.is_some());
    }
}
