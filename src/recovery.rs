//! The error taxonomy and recovery-directive mapping shared by every stage.
//!
//! Each stage defines its own error enum (`CollectorError`, `TransformError`, ...)
//! and implements [`Classify`] to map its variants onto [`ErrorKind`]. The
//! orchestrator is the only place that reads a [`RecoveryDirective`] and decides
//! what to do about it; stages themselves never retry on their own initiative
//! outside the resilience stack they're wrapped in.

use std::time::Duration;

/// The authoritative error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection reset/refused, DNS failure.
    Network,
    /// Operation exceeded its budget.
    Timeout,
    /// HTTP 429.
    RateLimit,
    /// HTTP 401/403.
    Auth,
    /// HTTP 4xx other than 401/403/429, or a schema failure.
    Validation,
    /// A breaker refused the call; no attempt was actually made.
    CircuitOpen,
    /// Allocation/OOM signal.
    Memory,
    /// Anything else.
    Internal,
}

/// What the orchestrator should do in response to an [`ErrorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryDirective {
    /// Retry after at least `delay`.
    Retry { delay: Duration },
    /// Fall back to a degraded/cached result.
    Fallback,
    /// Drop the offending record(s) and continue.
    Skip,
    /// Give up on the stage for this cycle.
    Fail,
}

impl ErrorKind {
    /// The default recovery directive for this kind of error.
    pub fn directive(self) -> RecoveryDirective {
        match self {
            ErrorKind::Network => RecoveryDirective::Retry { delay: Duration::from_millis(500) },
            ErrorKind::Timeout => RecoveryDirective::Retry { delay: Duration::from_secs(1) },
            ErrorKind::RateLimit => RecoveryDirective::Retry { delay: Duration::from_secs(60) },
            ErrorKind::Auth => RecoveryDirective::Fail,
            ErrorKind::Validation => RecoveryDirective::Skip,
            ErrorKind::CircuitOpen => RecoveryDirective::Fail,
            ErrorKind::Memory => RecoveryDirective::Retry { delay: Duration::from_secs(2) },
            ErrorKind::Internal => RecoveryDirective::Retry { delay: Duration::from_millis(500) },
        }
    }

    /// `AUTH` and `VALIDATION` are non-retryable: the retrier should short-circuit
    /// instead of burning attempts on an error that will never succeed.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorKind::Auth | ErrorKind::Validation)
    }
}

/// Maps a stage-specific error onto the shared taxonomy.
pub trait Classify {
    fn classify(&self) -> ErrorKind;
}
