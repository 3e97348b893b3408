//! Registry for managing named circuit breakers.
//!
//! Allows global access and control (reset/inspection) of circuit breakers by component id.
//! The health monitor uses this to look up the breaker guarding a given component and force it
//! back to `HalfOpen` when it schedules a recovery probe.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerPolicy, CircuitState};

/// Registry of circuit breakers keyed by component id.
#[derive(Default, Clone)]
pub struct CircuitBreakerRegistry {
    inner: Arc<Mutex<HashMap<String, CircuitBreakerPolicy>>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a breaker under `id`, overwriting any existing entry.
    pub fn register(&self, id: impl Into<String>, policy: CircuitBreakerPolicy) {
        self.inner.lock().unwrap().insert(id.into(), policy);
    }

    /// Retrieve the breaker registered under `id`, if any.
    pub fn get(&self, id: &str) -> Option<CircuitBreakerPolicy> {
        self.inner.lock().unwrap().get(id).cloned()
    }

    /// Fetch the breaker for `id`, creating one from `config` on first use.
    pub fn get_or_insert(&self, id: &str, config: CircuitBreakerConfig) -> CircuitBreakerPolicy {
        let mut map = self.inner.lock().unwrap();
        map.entry(id.to_string())
            .or_insert_with(|| CircuitBreakerPolicy::with_config(config))
            .clone()
    }

    /// Reset a registered breaker to `Closed`. Returns an error if `id` is not registered.
    pub fn reset(&self, id: &str) -> Result<(), String> {
        match self.get(id) {
            Some(policy) => {
                policy.reset();
                Ok(())
            }
            None => Err(format!("breaker id not found: {id}")),
        }
    }

    /// Force a registered breaker into `HalfOpen`, as a recovery probe. Returns an error if `id`
    /// is not registered.
    pub fn force_half_open(&self, id: &str) -> Result<(), String> {
        match self.get(id) {
            Some(policy) => {
                policy.force_half_open();
                Ok(())
            }
            None => Err(format!("breaker id not found: {id}")),
        }
    }

    /// Snapshot of every registered breaker's current state, sorted by id.
    pub fn snapshot(&self) -> Vec<(String, CircuitState)> {
        let map = self.inner.lock().unwrap();
        let mut entries: Vec<(String, CircuitState)> =
            map.iter().map(|(k, v)| (k.clone(), v.state())).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Ids of every registered breaker currently `Open`.
    pub fn open_ids(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter(|(_, state)| *state == CircuitState::Open)
            .map(|(id, _)| id)
            .collect()
    }
}
