// ABOUTME: Defines the admission limiter's error type using thiserror.
// ABOUTME: Task-level failures are not errors of this crate; they go to failure::Errors.

/// Errors from the admission limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LimiterError {
    /// The limiter was closed, explicitly or by cancellation. The task did not run.
    #[error("limiter closed")]
    Closed,

    /// A release happened without a matching admission.
    #[error("negative count")]
    NegativeCount,
}
