//! Drives one cycle per tick: collect, transform, aggregate, synthesize,
//! stream.
//!
//! Each fallible stage runs behind its own [`ResilienceStack`], built once at
//! construction from [`PipelineConfig`]; the aggregator runs unwrapped, since
//! it is a pure function with nothing to retry. The orchestrator is
//! the only place a [`RecoveryDirective`] is read: stages classify their own
//! errors, the stack retries or gives up, and the orchestrator decides what a
//! give-up means for the cycle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::interval;

use crate::aggregator;
use crate::circuit_breaker::{CircuitBreakerConfig, CircuitState};
use crate::collector::{Collector, CollectorError, UpstreamClient};
use crate::config::{CircuitBreakerOverrides, PipelineConfig};
use crate::cycle_stats::{CycleEvent, CycleEventBus, CycleStats};
use crate::health::{HealthMonitor, HealthMonitorConfig};
use crate::model::TransformedMetrics;
use crate::recovery::{Classify, RecoveryDirective};
use crate::stack::ResilienceStack;
use crate::streamer::{IngestClient, StreamError, Streamer};
use crate::synthesizer::{SynthesizeError, Synthesizer};
use crate::transformer::{TransformError, Transformer};
use crate::{Backoff, ResilienceError, RetryPolicy};

/// Lifecycle state of the orchestrator (`INIT -> RUNNING <-> DEGRADED ->
/// STOPPED`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum OrchestratorState {
    Init,
    Running,
    Degraded,
    Stopped,
}

/// Why a cycle ended without streaming anything: no input to process, or the
/// streamer stage's breaker was open and the cycle short-circuited before
/// streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed { entities: usize, events_streamed: usize },
    EmptyInput,
    StreamSkipped,
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

/// Build a stage's retry policy. The constant `delay` is the stage's base
/// backoff (§4.8's `withRecovery` delays); `min_delay_by` floors each
/// individual retry at its error kind's own recovery-directive delay (§7), so
/// a `RATE_LIMIT` always waits at least its directive's 60s even when the
/// stage's own base delay is shorter.
fn retry_policy<E>(max_attempts: usize, delay: Duration) -> RetryPolicy<E>
where
    E: Classify + std::error::Error + Send + Sync + 'static,
{
    RetryPolicy::builder()
        .max_attempts(max_attempts)
        .expect("max_attempts is always > 0")
        .backoff(Backoff::constant(delay))
        .should_retry(|e: &E| e.classify().is_retryable())
        .min_delay_by(|e: &E| match e.classify().directive() {
            RecoveryDirective::Retry { delay } => delay,
            _ => Duration::ZERO,
        })
        .build()
}

fn breaker_config(overrides: &CircuitBreakerOverrides) -> CircuitBreakerConfig {
    CircuitBreakerConfig::new(overrides.failure_threshold, overrides.retry_delay)
        .with_success_threshold(overrides.success_threshold)
        .with_volume_threshold(overrides.volume_threshold)
}

/// Wires every stage and drives the collect-transform-aggregate-synthesize-
/// stream cycle.
pub struct Orchestrator<C: UpstreamClient, I: IngestClient> {
    collector: Collector<C>,
    transformer: Transformer,
    synthesizer: Synthesizer,
    streamer: Streamer<I>,

    collector_stack: ResilienceStack<CollectorError>,
    transform_stack: ResilienceStack<TransformError>,
    synthesize_stack: ResilienceStack<SynthesizeError>,
    streamer_stack: ResilienceStack<StreamError>,

    health: Arc<HealthMonitor>,
    stats: Arc<CycleStats>,
    events: CycleEventBus,
    cycle: AtomicU64,
    state: Mutex<OrchestratorState>,
}

impl<C: UpstreamClient, I: IngestClient> Orchestrator<C, I> {
    pub fn new(
        config: &PipelineConfig,
        collector: Collector<C>,
        transformer: Transformer,
        synthesizer: Synthesizer,
        streamer: Streamer<I>,
        health: Arc<HealthMonitor>,
        stats: Arc<CycleStats>,
        events: CycleEventBus,
    ) -> Self {
        let max_concurrent = config.max_concurrent_operations;

        let collector_stack = ResilienceStack::new()
            .retry(retry_policy(3, Duration::from_secs(2)))
            .circuit_breaker_with_config(breaker_config(&config.collector_breaker))
            .bulkhead(max_concurrent)
            .timeout(config.collector_breaker.operation_timeout)
            .build();

        let transform_stack = ResilienceStack::new()
            .retry(retry_policy(2, Duration::from_secs(1)))
            .no_circuit_breaker()
            .unlimited_bulkhead()
            .no_timeout()
            .build();

        let synthesize_stack = ResilienceStack::new()
            .retry(retry_policy(2, Duration::from_secs(1)))
            .no_circuit_breaker()
            .unlimited_bulkhead()
            .no_timeout()
            .build();

        let streamer_stack = ResilienceStack::new()
            .retry(retry_policy(3, Duration::from_secs(5)))
            .circuit_breaker_with_config(breaker_config(&config.streamer_breaker))
            .bulkhead(max_concurrent)
            .timeout(config.streamer_breaker.operation_timeout)
            .build();

        Self {
            collector,
            transformer,
            synthesizer,
            streamer,
            collector_stack,
            transform_stack,
            synthesize_stack,
            streamer_stack,
            health,
            stats,
            events,
            cycle: AtomicU64::new(0),
            state: Mutex::new(OrchestratorState::Init),
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<CycleEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> OrchestratorState {
        *self.state.lock().await
    }

    /// Run cycles on `interval`, until `shutdown` resolves. On shutdown,
    /// waits for any in-flight cycle to finish rather than aborting it
    /// mid-stream.
    pub async fn run(&self, period: Duration, shutdown: impl std::future::Future<Output = ()>) {
        {
            let mut state = self.state.lock().await;
            *state = OrchestratorState::Running;
        }
        tokio::pin!(shutdown);
        let mut ticker = interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = &mut shutdown => {
                    break;
                }
            }
        }
        let mut state = self.state.lock().await;
        *state = OrchestratorState::Stopped;
    }

    /// Run exactly one cycle of the pipeline.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let cycle = self.cycle.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at = Instant::now();
        self.stats.record_cycle_started();
        self.events.publish(CycleEvent::Started { cycle });

        match self.run_cycle_inner(cycle).await {
            Ok(outcome) => {
                let duration = started_at.elapsed();
                self.stats.record_cycle_completed(duration);
                self.advance_state_on_success().await;
                match outcome {
                    CycleOutcome::EmptyInput => {
                        self.events.publish(CycleEvent::Empty { cycle });
                    }
                    CycleOutcome::StreamSkipped => {
                        self.events
                            .publish(CycleEvent::StreamSkipped { cycle, reason: "streamer circuit open" });
                    }
                    CycleOutcome::Completed { entities, events_streamed } => {
                        self.events.publish(CycleEvent::Completed {
                            cycle,
                            duration,
                            entities,
                            events_streamed,
                        });
                    }
                }
                outcome
            }
            Err((stage, message)) => {
                let duration = started_at.elapsed();
                self.stats.record_cycle_failed(duration);
                self.health.record_failure(stage, message.clone()).await;
                self.advance_state_on_failure().await;
                self.events.publish(CycleEvent::Error { cycle, stage, message });
                CycleOutcome::EmptyInput
            }
        }
    }

    async fn run_cycle_inner(&self, _cycle: u64) -> Result<CycleOutcome, (&'static str, String)> {
        // 1. collect
        let samples = self
            .collector_stack
            .execute(|| async { self.collector.collect().await.map_err(ResilienceError::Inner) })
            .await
            .map_err(|e| ("collector", e.to_string()))?;
        self.health.record_success("collector").await;

        if samples.is_empty() {
            return Ok(CycleOutcome::EmptyInput);
        }
        self.stats.add_samples_collected(samples.len() as u64);

        // 2. transform
        let transformed = self
            .transform_stack
            .execute(|| async { self.transformer.transform_all(&samples).map_err(ResilienceError::Inner) })
            .await
            .map_err(|e| ("transformer", e.to_string()))?;
        self.health.record_success("transformer").await;

        if transformed.is_empty() {
            return Ok(CycleOutcome::EmptyInput);
        }

        // 3. aggregate: pure, unwrapped.
        let brokers: Vec<TransformedMetrics> =
            transformed.iter().filter(|m| m.entity_type == crate::model::EntityKind::Broker).cloned().collect();
        let topics: Vec<TransformedMetrics> =
            transformed.iter().filter(|m| m.entity_type == crate::model::EntityKind::Topic).cloned().collect();
        let consumer_groups: Vec<TransformedMetrics> = transformed
            .iter()
            .filter(|m| m.entity_type == crate::model::EntityKind::ConsumerGroup)
            .cloned()
            .collect();
        let clusters = aggregator::aggregate(&brokers, &topics, &consumer_groups);

        let mut all_metrics = transformed;
        all_metrics.extend(clusters.into_values());

        // 4. synthesize
        let synthesis = self
            .synthesize_stack
            .execute(|| async {
                self.synthesizer.synthesize(&all_metrics).map_err(ResilienceError::Inner)
            })
            .await
            .map_err(|e| ("synthesizer", e.to_string()))?;
        self.health.record_success("synthesizer").await;
        self.stats.add_entities_synthesized(synthesis.entities.len() as u64);

        if synthesis.entities.is_empty() {
            return Ok(CycleOutcome::EmptyInput);
        }

        // 5. stream, short-circuiting if the streamer's breaker is already open
        // rather than burning a retry budget on a call that cannot succeed.
        if self.streamer_stack_is_open() {
            return Ok(CycleOutcome::StreamSkipped);
        }

        let outcome = self
            .streamer_stack
            .execute(|| async {
                self.streamer
                    .stream(&synthesis.entities, &synthesis.relationships)
                    .await
                    .map_err(ResilienceError::Inner)
            })
            .await;

        match outcome {
            Ok(stream_outcome) => {
                self.health.record_success("streamer").await;
                self.stats.add_events_streamed(stream_outcome.events_sent as u64);
                Ok(CycleOutcome::Completed {
                    entities: synthesis.entities.len(),
                    events_streamed: stream_outcome.events_sent,
                })
            }
            Err(e) => {
                self.stats.add_stream_errors(1);
                Err(("streamer", e.to_string()))
            }
        }
    }

    fn streamer_stack_is_open(&self) -> bool {
        self.streamer_stack.circuit_breaker.state() == CircuitState::Open
    }

    async fn advance_state_on_success(&self) {
        let mut state = self.state.lock().await;
        if *state == OrchestratorState::Degraded {
            *state = OrchestratorState::Running;
        }
    }

    async fn advance_state_on_failure(&self) {
        let mut state = self.state.lock().await;
        if *state == OrchestratorState::Running {
            *state = OrchestratorState::Degraded;
        }
    }
}
