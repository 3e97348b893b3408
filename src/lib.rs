#![forbid(unsafe_code)]

//! # mqobs
//!
//! A message-queue observability pipeline: collect raw broker/topic/consumer-group
//! samples from an upstream telemetry store, normalize them into a canonical metric
//! schema, roll brokers up into clusters, synthesize a typed entity graph with
//! deterministic identifiers, and stream it to a remote backend over HTTPS.
//!
//! The pipeline is built on resilience primitives — retry with backoff, circuit
//! breakers, bulkheads, and a health monitor — so that a flaky upstream or
//! downstream dependency degrades the cycle instead of crashing the process.
//!
//! ## Cycle
//!
//! ```text
//! Collector -> Transformer -> Aggregator -> Synthesizer -> Streamer
//! ```
//!
//! [`orchestrator::Orchestrator`] drives one cycle per tick; [`health::HealthMonitor`]
//! tracks component liveness and schedules recovery; each stage's fallible calls run
//! through a [`recovery`]-classified [`ResilienceStack`].

mod backoff;
mod bulkhead;
mod circuit_breaker;
mod circuit_breaker_registry;
mod error;
mod jitter;
mod retry;
mod sleeper;
mod stack;
mod timeout;

pub mod aggregator;
pub mod collector;
pub mod config;
pub mod cycle_stats;
pub mod health;
pub mod metric_names;
pub mod model;
pub mod orchestrator;
pub mod recovery;
pub mod streamer;
pub mod synthesizer;
pub mod telemetry;
pub mod transformer;

// Re-exports of the resilience primitives.
pub use backoff::Backoff;
pub use bulkhead::BulkheadPolicy;
pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerPolicy, CircuitBreakerStats, CircuitState, Clock,
    MonotonicClock,
};
pub use circuit_breaker_registry::CircuitBreakerRegistry;
pub use error::ResilienceError;
pub use jitter::Jitter;
pub use retry::{BuildError, RetryPolicy, RetryPolicyBuilder};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use stack::{ResilienceStack, ResilienceStackBuilder};
pub use timeout::{TimeoutError, TimeoutPolicy, MAX_TIMEOUT};

pub mod prelude;
