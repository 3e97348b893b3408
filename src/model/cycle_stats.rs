use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Accumulated counters for the pipeline's cycle-driven execution. Cheap to
/// clone and share: every field is an independent atomic, so readers never block
/// writers. `last_cycle_duration_millis` is the only non-monotonic field.
#[derive(Debug, Default)]
pub struct CycleStats {
    cycles_started: AtomicU64,
    cycles_completed: AtomicU64,
    cycles_failed: AtomicU64,
    samples_collected: AtomicU64,
    entities_synthesized: AtomicU64,
    events_streamed: AtomicU64,
    stream_errors: AtomicU64,
    last_cycle_duration_millis: AtomicU64,
}

/// Point-in-time snapshot of `CycleStats`, safe to serialize and hand to an
/// external health/metrics collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CycleStatsSnapshot {
    pub cycles_started: u64,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub samples_collected: u64,
    pub entities_synthesized: u64,
    pub events_streamed: u64,
    pub stream_errors: u64,
    pub last_cycle_duration_millis: u64,
}

impl CycleStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cycle_started(&self) {
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle_completed(&self, duration: Duration) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.last_cycle_duration_millis
            .store(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_cycle_failed(&self, duration: Duration) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
        self.last_cycle_duration_millis
            .store(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn add_samples_collected(&self, n: u64) {
        self.samples_collected.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_entities_synthesized(&self, n: u64) {
        self.entities_synthesized.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_events_streamed(&self, n: u64) {
        self.events_streamed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_stream_errors(&self, n: u64) {
        self.stream_errors.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CycleStatsSnapshot {
        CycleStatsSnapshot {
            cycles_started: self.cycles_started.load(Ordering::Relaxed),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            samples_collected: self.samples_collected.load(Ordering::Relaxed),
            entities_synthesized: self.entities_synthesized.load(Ordering::Relaxed),
            events_streamed: self.events_streamed.load(Ordering::Relaxed),
            stream_errors: self.stream_errors.load(Ordering::Relaxed),
            last_cycle_duration_millis: self.last_cycle_duration_millis.load(Ordering::Relaxed),
        }
    }
}
