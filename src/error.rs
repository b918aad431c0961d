//! Crate-level error types.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised by the sync engine's own plumbing.
///
/// None of these ever reach the consuming view directly — gateway failures
/// are logged and swallowed by the controller, and compute failures are
/// classified into [`crate::compute::ComputeError`] and handled exhaustively.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Durable gateway write failed. Callers log and carry on; durability is
    /// an optimization for future sessions, not a correctness requirement.
    #[error("gateway error: {0}")]
    Gateway(String),

    /// Remote compute failed with a classified cause.
    #[error(transparent)]
    Compute(#[from] crate::compute::ComputeError),

    /// Configuration could not be resolved (missing endpoint or credentials).
    #[error("config error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::ComputeError;

    #[test]
    fn test_gateway_error_display() {
        let err = SyncError::Gateway("profile row write rejected".into());
        assert_eq!(err.to_string(), "gateway error: profile row write rejected");
    }

    #[test]
    fn test_compute_error_is_transparent() {
        let err = SyncError::from(ComputeError::RateLimited);
        assert_eq!(err.to_string(), ComputeError::RateLimited.to_string());
    }

    #[test]
    fn test_config_error_display() {
        let err = SyncError::Config("compute endpoint not set".into());
        assert!(err.to_string().contains("compute endpoint not set"));
    }
}
