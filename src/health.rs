//! Component health registry and recovery coordinator.
//!
//! The monitor owns no business logic of its own: it polls registered
//! health-check callbacks, tracks per-component [`ComponentHealth`], and
//! schedules bounded-concurrency recovery attempts when a critical component's
//! breaker opens. The orchestrator is the only caller that feeds it outcomes
//! from the cycle stages; the monitor never drives a cycle itself.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{Mutex, Semaphore};
use tokio::time;

use crate::circuit_breaker::{CircuitBreakerPolicy, CircuitState};
pub use crate::model::{ComponentHealth, HealthStatus};

/// Bound on the recovery-history ring buffer: recovery history is bounded to
/// the last 100 events.
pub const MAX_RECOVERY_HISTORY: usize = 100;

/// A component health-check: an async probe returning `Ok` when healthy.
pub type HealthCheck =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>> + Send + Sync>;

fn now_millis() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

struct ComponentEntry {
    health: ComponentHealth,
    check: Option<HealthCheck>,
    breaker: Option<CircuitBreakerPolicy>,
}

/// Aggregate system health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SystemHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Point-in-time, serializable view of the whole registry. Not bound to an HTTP
/// endpoint by this crate; an external collaborator may wire
/// it behind one.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthSnapshot {
    pub system: SystemHealth,
    pub components: Vec<ComponentHealth>,
}

/// One recovery attempt, retained in the bounded history ring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RecoveryEvent {
    pub component: String,
    pub attempted_at_millis: i64,
    pub succeeded: bool,
}

/// Timing knobs for the health loop and recovery coordinator, configurable via
/// `HEALTH_CHECK_INTERVAL_MS`.
#[derive(Debug, Clone, Copy)]
pub struct HealthMonitorConfig {
    pub check_interval: Duration,
    pub check_timeout: Duration,
    pub initial_recovery_delay: Duration,
    pub backoff_recovery_delay: Duration,
    pub max_concurrent_recoveries: usize,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            check_timeout: Duration::from_secs(30),
            initial_recovery_delay: Duration::from_secs(60),
            backoff_recovery_delay: Duration::from_secs(120),
            max_concurrent_recoveries: 3,
        }
    }
}

/// Registry of component health plus the recovery coordinator.
///
/// This is the one long-lived shared state the crate carries across cycles
/// beyond plain counters.
pub struct HealthMonitor {
    components: Mutex<HashMap<String, ComponentEntry>>,
    history: Mutex<VecDeque<RecoveryEvent>>,
    config: HealthMonitorConfig,
    recovery_permits: Semaphore,
    active_recoveries: AtomicUsize,
}

impl HealthMonitor {
    pub fn new(config: HealthMonitorConfig) -> Self {
        let permits = config.max_concurrent_recoveries.max(1);
        Self {
            components: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::with_capacity(MAX_RECOVERY_HISTORY)),
            config,
            recovery_permits: Semaphore::new(permits),
            active_recoveries: AtomicUsize::new(0),
        }
    }

    /// Register a component. `breaker` is the circuit breaker guarding its calls,
    /// if any; `check` is an optional liveness probe invoked by the health loop.
    pub async fn register(
        &self,
        name: impl Into<String>,
        component_type: impl Into<String>,
        critical: bool,
        breaker: Option<CircuitBreakerPolicy>,
        check: Option<HealthCheck>,
    ) {
        let name = name.into();
        let health = ComponentHealth::new(name.clone(), component_type, critical);
        self.components
            .lock()
            .await
            .insert(name, ComponentEntry { health, check, breaker });
    }

    /// Record a successful stage outcome reported by the orchestrator.
    pub async fn record_success(&self, name: &str) {
        let mut components = self.components.lock().await;
        if let Some(entry) = components.get_mut(name) {
            entry.health.status = HealthStatus::Healthy;
            entry.health.last_check_millis = now_millis();
            entry.health.last_error = None;
        }
    }

    /// Record a failed stage outcome reported by the orchestrator. A critical
    /// component whose breaker is now `Open` gets a recovery scheduled.
    pub async fn record_failure(self: &Arc<Self>, name: &str, error: impl Into<String>) {
        let (critical, breaker_open) = {
            let mut components = self.components.lock().await;
            match components.get_mut(name) {
                Some(entry) => {
                    entry.health.last_check_millis = now_millis();
                    entry.health.last_error = Some(error.into());
                    let breaker_open =
                        entry.breaker.as_ref().map(|b| b.state() == CircuitState::Open).unwrap_or(false);
                    entry.health.status =
                        if breaker_open { HealthStatus::CircuitOpen } else { HealthStatus::Unhealthy };
                    (entry.health.critical, breaker_open)
                }
                None => return,
            }
        };
        if critical && breaker_open {
            self.schedule_recovery(name.to_string(), self.config.initial_recovery_delay);
        }
    }

    /// Iterate the registry once, invoking each component's health check, but
    /// skipping any whose breaker is `Open` since a probe there would just fail.
    pub async fn check_all(&self) {
        let entries: Vec<(String, HealthCheck, Duration)> = {
            let components = self.components.lock().await;
            components
                .iter()
                .filter_map(|(name, entry)| {
                    let breaker_open =
                        entry.breaker.as_ref().map(|b| b.state() == CircuitState::Open).unwrap_or(false);
                    if breaker_open {
                        return None;
                    }
                    entry.check.clone().map(|check| (name.clone(), check, self.config.check_timeout))
                })
                .collect()
        };

        for (name, check, timeout) in entries {
            let outcome = time::timeout(timeout, check()).await;
            let mut components = self.components.lock().await;
            if let Some(entry) = components.get_mut(&name) {
                entry.health.last_check_millis = now_millis();
                match outcome {
                    Ok(Ok(())) => {
                        entry.health.status = HealthStatus::Healthy;
                        entry.health.last_error = None;
                    }
                    Ok(Err(msg)) => {
                        entry.health.status = HealthStatus::Unhealthy;
                        entry.health.last_error = Some(msg);
                    }
                    Err(_) => {
                        entry.health.status = HealthStatus::Unhealthy;
                        entry.health.last_error = Some("health check timed out".to_string());
                    }
                }
            }
        }
    }

    /// Spawn the periodic health-check loop; returns a handle callers can abort
    /// on shutdown.
    pub fn spawn_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut interval = time::interval(monitor.config.check_interval);
            loop {
                interval.tick().await;
                monitor.check_all().await;
            }
        })
    }

    fn schedule_recovery(self: &Arc<Self>, component: String, delay: Duration) {
        let monitor = self.clone();
        tokio::spawn(async move {
            time::sleep(delay).await;
            let Ok(_permit) = monitor.recovery_permits.try_acquire() else {
                // At capacity; reschedule further out rather than queueing unboundedly.
                monitor.schedule_recovery(component, monitor.config.backoff_recovery_delay);
                return;
            };
            monitor.active_recoveries.fetch_add(1, Ordering::SeqCst);
            let succeeded = monitor.attempt_recovery(&component).await;
            monitor.active_recoveries.fetch_sub(1, Ordering::SeqCst);
            monitor.push_history(RecoveryEvent {
                component: component.clone(),
                attempted_at_millis: now_millis(),
                succeeded,
            }).await;
            if !succeeded {
                monitor.schedule_recovery(component, monitor.config.backoff_recovery_delay);
            }
        });
    }

    async fn attempt_recovery(&self, component: &str) -> bool {
        let (breaker, check) = {
            let components = self.components.lock().await;
            match components.get(component) {
                Some(entry) => (entry.breaker.clone(), entry.check.clone()),
                None => return false,
            }
        };
        let Some(breaker) = breaker else { return false };
        breaker.force_half_open();

        let succeeded = match check {
            Some(check) => time::timeout(self.config.check_timeout, check()).await.map(|r| r.is_ok()).unwrap_or(false),
            None => true,
        };

        let mut components = self.components.lock().await;
        if let Some(entry) = components.get_mut(component) {
            entry.health.last_check_millis = now_millis();
            if succeeded {
                breaker.reset();
                entry.health.status = HealthStatus::Healthy;
                entry.health.last_error = None;
            } else {
                entry.health.status = HealthStatus::CircuitOpen;
                entry.health.last_error = Some("recovery probe failed".to_string());
            }
        }
        succeeded
    }

    async fn push_history(&self, event: RecoveryEvent) {
        let mut history = self.history.lock().await;
        if history.len() >= MAX_RECOVERY_HISTORY {
            history.pop_front();
        }
        history.push_back(event);
    }

    /// Recent recovery attempts, oldest first, capped at [`MAX_RECOVERY_HISTORY`].
    pub async fn recovery_history(&self) -> Vec<RecoveryEvent> {
        self.history.lock().await.iter().cloned().collect()
    }

    /// Snapshot every registered component plus the aggregate system health.
    pub async fn snapshot(&self) -> HealthSnapshot {
        let components = self.components.lock().await;
        let mut health: Vec<ComponentHealth> = components.values().map(|e| e.health.clone()).collect();
        health.sort_by(|a, b| a.name.cmp(&b.name));

        let any_critical_unhealthy = health.iter().any(|c| {
            c.critical && matches!(c.status, HealthStatus::Unhealthy | HealthStatus::CircuitOpen)
        });
        let any_noncritical_unhealthy = health.iter().any(|c| {
            !c.critical && matches!(c.status, HealthStatus::Unhealthy | HealthStatus::CircuitOpen)
        });
        let system = if any_critical_unhealthy {
            SystemHealth::Unhealthy
        } else if any_noncritical_unhealthy {
            SystemHealth::Degraded
        } else {
            SystemHealth::Healthy
        };

        HealthSnapshot { system, components: health }
    }

    pub fn active_recoveries(&self) -> usize {
        self.active_recoveries.load(Ordering::SeqCst)
    }
}
