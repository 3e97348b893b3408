//! Convenient re-exports for common `mqobs` types.
pub use crate::{
    backoff::Backoff,
    bulkhead::BulkheadPolicy,
    circuit_breaker::{CircuitBreakerConfig, CircuitBreakerPolicy, CircuitState},
    circuit_breaker_registry::CircuitBreakerRegistry,
    jitter::Jitter,
    retry::{BuildError, RetryPolicy, RetryPolicyBuilder},
    stack::{ResilienceStack, ResilienceStackBuilder},
    telemetry::{
        BulkheadEvent, CircuitBreakerEvent, LogSink, MemorySink, MulticastSink, NullSink,
        PolicyEvent, RequestOutcome, RetryEvent, TelemetrySink, TimeoutEvent,
    },
    timeout::{TimeoutError, TimeoutPolicy, MAX_TIMEOUT},
    ResilienceError,
};

pub use crate::config::PipelineConfig;
pub use crate::cycle_stats::CycleStats;
pub use crate::health::{ComponentHealth, HealthMonitor, HealthStatus};
pub use crate::model::{Entity, EntityType, RawSample, Relationship, TransformedMetrics};
pub use crate::orchestrator::Orchestrator;
pub use crate::recovery::{ErrorKind, RecoveryDirective};
