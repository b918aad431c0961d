//! The remote layout computation collaborator.
//!
//! The compute endpoint is an opaque LLM-backed remote function: it accepts a
//! [`ComputeRequest`] and either returns a structured [`InsightLayout`] or
//! fails with a classified [`ComputeError`]. The controller pattern-matches
//! the error exhaustively — there are no ad hoc null checks downstream.

pub mod http;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::layout::metrics::MetricSummary;
use crate::layout::{InsightLayout, LayoutKey, LayoutVariant};

pub use http::HttpLayoutCompute;

/// Classified outcome of a failed compute call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComputeError {
    /// The endpoint asked us to back off. Expected and recoverable: the
    /// cached value keeps being shown and no error is surfaced.
    #[error("compute endpoint rate limited the request")]
    RateLimited,

    /// Quota or billing gate on the LLM gateway. Handled like a rate limit.
    #[error("compute endpoint requires payment or quota")]
    PaymentRequired,

    /// The endpoint answered but the body was not a usable layout.
    #[error("malformed compute response: {0}")]
    Malformed(String),

    /// Transport failure, auth failure, or any other non-2xx response.
    #[error("compute request failed: {0}")]
    Network(String),
}

impl ComputeError {
    /// Whether this failure is an expected, recoverable backpressure signal
    /// rather than something worth surfacing to the user.
    pub fn is_transient_expected(&self) -> bool {
        matches!(self, Self::RateLimited | Self::PaymentRequired)
    }
}

/// Classify an HTTP status + mined error message into a [`ComputeError`].
///
/// Some gateways report billing exhaustion as a 403/429 with a quota message
/// in the body, so the message is consulted for the payment class too.
pub fn classify_status(status: u16, message: &str) -> ComputeError {
    let lowered = message.to_ascii_lowercase();
    if status == 402 || lowered.contains("billing") || lowered.contains("quota") {
        return ComputeError::PaymentRequired;
    }
    if status == 429 {
        return ComputeError::RateLimited;
    }
    ComputeError::Network(format!("HTTP {status}: {message}"))
}

/// Body sent to the compute endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputeRequest {
    /// Owning user.
    pub user_id: String,
    /// Which layout to compute.
    pub variant: LayoutVariant,
    /// Client-side aggregates over recent check-ins.
    pub metrics: MetricSummary,
    /// Whether the user explicitly forced the refresh.
    pub forced: bool,
}

impl ComputeRequest {
    pub fn new(key: &LayoutKey, metrics: MetricSummary, forced: bool) -> Self {
        Self {
            user_id: key.user_id.clone(),
            variant: key.variant.clone(),
            metrics,
            forced,
        }
    }
}

/// The remote compute seam. Implemented by [`HttpLayoutCompute`] in
/// production and by scripted mocks in tests.
#[async_trait]
pub trait LayoutCompute: Send + Sync {
    async fn compute(&self, request: &ComputeRequest)
        -> std::result::Result<InsightLayout, ComputeError>;
}
