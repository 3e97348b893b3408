//! The data model that flows through one cycle: `RawSample` -> `TransformedMetrics` ->
//! `Entity`/`Relationship`, plus the cross-cycle bookkeeping types (`CycleStats`,
//! `ComponentHealth`).
//!
//! Every record here is an immutable value carrying a millisecond UTC timestamp.
//! Ownership: `RawSample` and `TransformedMetrics` belong to the cycle that produced
//! them and are dropped at cycle end; `Entity`/`Relationship` are handed to the
//! streamer as read-only views and discarded after a successful send.

mod component_health;
mod cycle_stats;
mod entity;
mod metric_value;
mod raw_sample;
mod relationship;
mod transformed_metrics;

pub use component_health::{ComponentHealth, HealthStatus};
pub use cycle_stats::{CycleStats, CycleStatsSnapshot};
pub use entity::{is_valid_guid, AlertLevel, Entity, EntityStatus, EntityType};
pub use metric_value::MetricMap;
pub use raw_sample::{EventType, RawSample};
pub use relationship::{Relationship, RelationshipLabel};
pub use transformed_metrics::{EntityKind, TransformedMetrics};
