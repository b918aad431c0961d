//! The cached artifact and its freshness bookkeeping.
//!
//! An [`InsightLayout`] is the AI-generated dashboard/analysis structure the
//! engine caches: metric cards, widget descriptors and free-text commentary.
//! The engine is agnostic to its internal shape beyond the two mandatory
//! top-level fields (`primary_metrics`, `wellness_score`); unknown fields
//! produced by the model survive a round-trip untouched via `extra`.

pub mod metrics;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wellness score bounds. The compute endpoint reports 0–100.
const SCORE_MIN: f64 = 0.0;
const SCORE_MAX: f64 = 100.0;

/// Neutral score used by the placeholder layout.
const PLACEHOLDER_SCORE: f64 = 50.0;

// ── Keys ─────────────────────────────────────────────────────────────────────

/// Identifies one independently-cacheable computed artifact per user-context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayoutKey {
    /// Owning user.
    pub user_id: String,
    /// Which computed view of that user's data.
    pub variant: LayoutVariant,
}

impl LayoutKey {
    /// Key for the main dashboard layout.
    pub fn dashboard(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            variant: LayoutVariant::Dashboard,
        }
    }

    /// Key for the deep-analysis layout over a time range.
    pub fn analysis(user_id: impl Into<String>, range: TimeRange) -> Self {
        Self {
            user_id: user_id.into(),
            variant: LayoutVariant::Analysis { range },
        }
    }
}

impl std::fmt::Display for LayoutKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.user_id, self.variant.slug())
    }
}

/// Which computed artifact a key refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LayoutVariant {
    /// The main dashboard layout.
    Dashboard,
    /// The deep-analysis layout for a selected time range.
    Analysis {
        /// Time-range selector chosen in the analysis view.
        range: TimeRange,
    },
}

impl LayoutVariant {
    /// Stable slug used in REST paths and log fields.
    pub fn slug(&self) -> String {
        match self {
            Self::Dashboard => "dashboard".to_string(),
            Self::Analysis { range } => format!("analysis-{}", range.slug()),
        }
    }
}

impl std::fmt::Display for LayoutVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.slug())
    }
}

/// Time range selector for the analysis variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    /// Trailing 7 days (default in the analysis view).
    #[default]
    Week,
    /// Trailing 30 days.
    Month,
    /// Trailing 90 days.
    Quarter,
}

impl TimeRange {
    fn slug(self) -> &'static str {
        match self {
            Self::Week => "week",
            Self::Month => "month",
            Self::Quarter => "quarter",
        }
    }
}

// ── Layout artifact ──────────────────────────────────────────────────────────

/// One metric card on the dashboard (mood, sleep, habit adherence, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricCard {
    /// Stable identifier, e.g. `"mood"` or `"habit_adherence"`.
    pub id: String,
    /// Human-readable label rendered on the card.
    pub label: String,
    /// Current value of the metric.
    pub value: f64,
    /// Direction of change since the previous period, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<Trend>,
}

/// Direction of change for a metric card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

/// An opaque widget descriptor. The engine never interprets `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetSpec {
    /// Widget type understood by the rendering layer, e.g. `"mood_chart"`.
    pub kind: String,
    /// Optional widget title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Renderer-specific configuration.
    #[serde(default)]
    pub payload: Value,
}

/// The AI-generated dashboard/analysis structure being cached.
///
/// `primary_metrics` and `wellness_score` are the mandatory top-level fields;
/// a compute response missing either is treated as malformed. Everything else
/// is optional, and fields this version does not know about are preserved in
/// `extra` so an older client never strips data written by a newer one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightLayout {
    /// Metric cards shown at the top of the view. Never empty in a valid layout.
    pub primary_metrics: Vec<MetricCard>,
    /// Overall wellness score, 0–100.
    pub wellness_score: f64,
    /// Additional widgets below the metric row.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub widgets: Vec<WidgetSpec>,
    /// Free-text AI commentary rendered under the score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commentary: Option<String>,
    /// Fields produced by the compute endpoint that this version does not model.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl InsightLayout {
    /// Hard-coded fallback shown when there is nothing cached and the compute
    /// endpoint failed, and while the very first computation is in flight.
    pub fn placeholder() -> Self {
        Self {
            primary_metrics: vec![MetricCard {
                id: "mood".to_string(),
                label: "Mood".to_string(),
                value: 0.0,
                trend: None,
            }],
            wellness_score: PLACEHOLDER_SCORE,
            widgets: Vec::new(),
            commentary: Some("Your insights are on the way.".to_string()),
            extra: serde_json::Map::new(),
        }
    }

    /// Check the mandatory shape of a layout received from the compute
    /// endpoint. Returns a reason string suitable for a `Malformed` error.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.primary_metrics.is_empty() {
            return Err("primary_metrics is empty".to_string());
        }
        if !self.wellness_score.is_finite() {
            return Err("wellness_score is not a number".to_string());
        }
        if !(SCORE_MIN..=SCORE_MAX).contains(&self.wellness_score) {
            return Err(format!(
                "wellness_score {} outside 0-100",
                self.wellness_score
            ));
        }
        Ok(())
    }

    /// Decode and shape-check a raw compute response body.
    pub fn from_value(value: Value) -> std::result::Result<Self, String> {
        let layout: Self =
            serde_json::from_value(value).map_err(|e| format!("undecodable layout: {e}"))?;
        layout.validate()?;
        Ok(layout)
    }
}

// ── Freshness ────────────────────────────────────────────────────────────────

/// The pair of timestamps used to decide whether a cached artifact is still
/// valid without recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Freshness {
    /// When the layout was produced.
    pub computed_at: DateTime<Utc>,
    /// Most recent mutation to the source data the layout depends on. Owned
    /// by the data-mutation paths elsewhere in the system; `None` means the
    /// signal is unknown.
    pub data_changed_at: Option<DateTime<Utc>>,
}

impl Freshness {
    /// A layout is valid (safe to skip recomputation) iff the data-change
    /// signal is known and the layout was computed at or after it. Unknown
    /// freshness is displayable but always eligible for a background refresh.
    pub fn is_valid(&self) -> bool {
        matches!(self.data_changed_at, Some(changed) if self.computed_at >= changed)
    }
}
