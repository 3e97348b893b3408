//! Normalizes vendor-specific field names into the canonical metric model.
//!
//! The field-mapping table is data, not code: each canonical metric name
//! lists its candidate source aliases, a validation bound, and whether an
//! out-of-bounds value is clamped or dropped. `transform` is a table-driven
//! loop over that data.

use crate::metric_names as m;
use crate::model::{EntityKind, EventType, RawSample, TransformedMetrics};
use crate::recovery::{Classify, ErrorKind};

/// Stage-specific error for the transformer. `transform`/`transform_all` are
/// total on valid input and never panic; this variant exists so the
/// orchestrator's `with_recovery` wrapper has a uniform shape across stages,
/// not because normal operation produces one.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("internal transformer error: {0}")]
    Internal(String),
}

impl Classify for TransformError {
    fn classify(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

/// How an out-of-bounds value is handled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundsPolicy {
    Clamp,
    Drop,
}

/// One row of the field-mapping table.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub canonical: &'static str,
    pub aliases: &'static [&'static str],
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub required: bool,
    pub policy: BoundsPolicy,
}

const BROKER_FIELDS: &[FieldMapping] = &[
    FieldMapping {
        canonical: m::BYTES_IN_PER_SECOND,
        aliases: &["broker.bytesInPerSecond", "BytesInPerSec"],
        min: Some(0.0),
        max: None,
        required: false,
        policy: BoundsPolicy::Clamp,
    },
    FieldMapping {
        canonical: m::BYTES_OUT_PER_SECOND,
        aliases: &["broker.bytesOutPerSecond", "BytesOutPerSec"],
        min: Some(0.0),
        max: None,
        required: false,
        policy: BoundsPolicy::Clamp,
    },
    FieldMapping {
        canonical: m::PARTITION_COUNT,
        aliases: &["broker.partitionCount", "PartitionCount"],
        min: Some(0.0),
        max: None,
        required: false,
        policy: BoundsPolicy::Clamp,
    },
    FieldMapping {
        canonical: m::LEADER_PARTITIONS,
        aliases: &["broker.leaderPartitions", "LeaderCount"],
        min: Some(0.0),
        max: None,
        required: false,
        policy: BoundsPolicy::Clamp,
    },
    FieldMapping {
        canonical: m::UNDER_REPLICATED_PARTITIONS,
        aliases: &["broker.underReplicatedPartitions", "UnderReplicatedPartitions"],
        min: Some(0.0),
        max: None,
        required: true,
        policy: BoundsPolicy::Clamp,
    },
    FieldMapping {
        canonical: m::OFFLINE_PARTITIONS,
        aliases: &["broker.offlinePartitionsCount", "OfflinePartitionsCount"],
        min: Some(0.0),
        max: None,
        required: false,
        policy: BoundsPolicy::Clamp,
    },
    FieldMapping {
        canonical: m::REQUEST_RATE,
        aliases: &["broker.requestRate", "RequestsPerSec"],
        min: Some(0.0),
        max: None,
        required: false,
        policy: BoundsPolicy::Clamp,
    },
    FieldMapping {
        canonical: m::CPU_PERCENT,
        aliases: &["broker.cpuPercent", "CpuPercent"],
        min: Some(0.0),
        max: Some(100.0),
        required: false,
        policy: BoundsPolicy::Clamp,
    },
    FieldMapping {
        canonical: m::MEMORY_PERCENT,
        aliases: &["broker.memoryPercent", "MemoryPercent"],
        min: Some(0.0),
        max: Some(100.0),
        required: false,
        policy: BoundsPolicy::Clamp,
    },
    FieldMapping {
        canonical: m::REQUEST_HANDLER_IDLE_PERCENT,
        aliases: &["RequestHandlerAvgIdlePercent"],
        min: Some(0.0),
        max: Some(100.0),
        required: false,
        policy: BoundsPolicy::Clamp,
    },
    FieldMapping {
        canonical: m::NETWORK_PROCESSOR_IDLE_PERCENT,
        aliases: &["NetworkProcessorAvgIdlePercent"],
        min: Some(0.0),
        max: Some(100.0),
        required: false,
        policy: BoundsPolicy::Clamp,
    },
    FieldMapping {
        canonical: m::DISK_USAGE_PERCENT,
        aliases: &["broker.diskUsagePercent", "DiskUsagePercent"],
        min: Some(0.0),
        max: Some(100.0),
        required: false,
        policy: BoundsPolicy::Clamp,
    },
    FieldMapping {
        canonical: m::BROKER_ERROR_RATE,
        aliases: &["broker.errorRate", "ErrorsPerSec"],
        min: Some(0.0),
        max: None,
        required: false,
        policy: BoundsPolicy::Drop,
    },
];

const TOPIC_FIELDS: &[FieldMapping] = &[
    FieldMapping {
        canonical: m::MESSAGES_IN_PER_SECOND,
        aliases: &["topic.messagesInPerSecond", "MessagesInPerSec"],
        min: Some(0.0),
        max: None,
        required: false,
        policy: BoundsPolicy::Clamp,
    },
    FieldMapping {
        canonical: m::BYTES_IN_PER_SECOND,
        aliases: &["topic.bytesInPerSecond", "BytesInPerSec"],
        min: Some(0.0),
        max: None,
        required: false,
        policy: BoundsPolicy::Clamp,
    },
    FieldMapping {
        canonical: m::PARTITION_COUNT,
        aliases: &["topic.partitionCount", "PartitionCount"],
        min: Some(0.0),
        max: None,
        required: false,
        policy: BoundsPolicy::Clamp,
    },
];

const CONSUMER_GROUP_FIELDS: &[FieldMapping] = &[FieldMapping {
    canonical: m::LAG,
    aliases: &["consumer.lag", "ConsumerLag"],
    min: Some(0.0),
    max: None,
    required: false,
    policy: BoundsPolicy::Drop,
}];

fn fields_for(event_type: EventType) -> &'static [FieldMapping] {
    match event_type {
        EventType::Broker => BROKER_FIELDS,
        EventType::Topic => TOPIC_FIELDS,
        EventType::ConsumerGroup => CONSUMER_GROUP_FIELDS,
    }
}

/// Validates that no table has two entries sharing a canonical name; checked
/// once at [`Transformer::new`] rather than on every `transform` call.
fn validate_tables() -> Result<(), TransformError> {
    for table in [BROKER_FIELDS, TOPIC_FIELDS, CONSUMER_GROUP_FIELDS] {
        let mut seen = std::collections::HashSet::new();
        for mapping in table {
            if !seen.insert(mapping.canonical) {
                return Err(TransformError::Internal(format!(
                    "duplicate canonical metric name in field-mapping table: {}",
                    mapping.canonical
                )));
            }
        }
    }
    Ok(())
}

/// Maps [`RawSample`] to [`TransformedMetrics`].
pub struct Transformer {
    provider: String,
}

impl Transformer {
    /// Construct a transformer for `provider` (e.g. `"kafka"`), validating the
    /// field-mapping tables. Fails startup rather than the first cycle if the
    /// tables themselves are malformed.
    pub fn new(provider: impl Into<String>) -> Result<Self, TransformError> {
        validate_tables()?;
        Ok(Self { provider: provider.into() })
    }

    /// Deterministic, pure, total on valid input: returns `None` (and
    /// logs) when a required identifier or required metric is missing.
    pub fn transform(&self, sample: &RawSample) -> Option<TransformedMetrics> {
        let identifiers = self.derive_identifiers(sample)?;
        let cluster_name = self.resolve_cluster_name(sample);

        let entity_type = match sample.event_type {
            EventType::Broker => EntityKind::Broker,
            EventType::Topic => EntityKind::Topic,
            EventType::ConsumerGroup => EntityKind::ConsumerGroup,
        };

        let mut metrics = TransformedMetrics::new(
            entity_type,
            cluster_name,
            sample.timestamp_millis,
            self.provider.clone(),
        );
        metrics.identifiers = identifiers;

        for mapping in fields_for(sample.event_type) {
            let value = mapping
                .aliases
                .iter()
                .chain(std::iter::once(&mapping.canonical))
                .find_map(|alias| sample.field_f64(alias));

            let value = match value {
                Some(v) => v,
                None if mapping.required => {
                    tracing::warn!(
                        canonical = mapping.canonical,
                        cluster = %sample.cluster_name,
                        "required metric missing; dropping sample"
                    );
                    return None;
                }
                None => continue,
            };

            match apply_bounds(value, mapping) {
                Some(bounded) => metrics.metrics.insert(mapping.canonical, bounded),
                None => continue,
            }
        }

        Some(metrics)
    }

    /// Transform every sample, skipping (and logging) any that fail per-record
    ///. Always `Ok`
    /// in normal operation; see [`TransformError`].
    pub fn transform_all(
        &self,
        samples: &[RawSample],
    ) -> Result<Vec<TransformedMetrics>, TransformError> {
        Ok(samples.iter().filter_map(|s| self.transform(s)).collect())
    }

    fn derive_identifiers(
        &self,
        sample: &RawSample,
    ) -> Option<std::collections::BTreeMap<String, String>> {
        let mut identifiers = std::collections::BTreeMap::new();
        match sample.event_type {
            EventType::Broker => {
                let broker_id = sample.identity.get("brokerId")?;
                identifiers.insert("brokerId".to_string(), broker_id.clone());
                if let Some(hostname) = sample.identity.get("hostname") {
                    identifiers.insert("hostname".to_string(), hostname.clone());
                }
            }
            EventType::Topic => {
                let topic_name = sample.identity.get("topicName")?;
                identifiers.insert("topicName".to_string(), topic_name.clone());
            }
            EventType::ConsumerGroup => {
                let group_id = sample.identity.get("consumerGroupId")?;
                identifiers.insert("consumerGroupId".to_string(), group_id.clone());
                // One raw row per (group, topic) pair, mirroring the upstream
                // per-partition offset sample; the synthesizer folds rows
                // sharing a `consumerGroupId` back into one entity.
                if let Some(topic_name) = sample.identity.get("topicName") {
                    identifiers.insert("topicName".to_string(), topic_name.clone());
                }
            }
        }
        Some(identifiers)
    }

    /// Preserve `clusterName` when present; otherwise infer from a
    /// `{cluster}-kafka-{n}` hostname pattern, falling back to
    /// `default-cluster` with a warning.
    fn resolve_cluster_name(&self, sample: &RawSample) -> String {
        if !sample.cluster_name.is_empty() {
            return sample.cluster_name.clone();
        }
        if let Some(hostname) = sample.identity.get("hostname") {
            if let Some(prefix) = hostname.split("-kafka-").next() {
                if !prefix.is_empty() && prefix != *hostname {
                    return prefix.to_string();
                }
            }
        }
        tracing::warn!("sample has no clusterName and no inferable hostname prefix; defaulting");
        "default-cluster".to_string()
    }
}

fn apply_bounds(value: f64, mapping: &FieldMapping) -> Option<f64> {
    let below_min = mapping.min.is_some_and(|min| value < min);
    let above_max = mapping.max.is_some_and(|max| value > max);
    if !below_min && !above_max {
        return Some(value);
    }
    match mapping.policy {
        BoundsPolicy::Drop => None,
        BoundsPolicy::Clamp => {
            let mut v = value;
            if let Some(min) = mapping.min {
                v = v.max(min);
            }
            if let Some(max) = mapping.max {
                v = v.min(max);
            }
            Some(v)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawValue;

    #[test]
    fn transform_broker_sample_maps_aliases() {
        let transformer = Transformer::new("kafka").unwrap();
        let sample = RawSample::new(EventType::Broker, "clusterA", 1_000)
            .with_identity("brokerId", "1")
            .with_field("BytesInPerSec", RawValue::from(100.0))
            .with_field("UnderReplicatedPartitions", RawValue::from(0.0));

        let metrics = transformer.transform(&sample).unwrap();
        assert_eq!(metrics.identifier("brokerId"), Some("1"));
        assert_eq!(metrics.metric(m::BYTES_IN_PER_SECOND), Some(100.0));
        assert_eq!(metrics.metric(m::UNDER_REPLICATED_PARTITIONS), Some(0.0));
    }

    #[test]
    fn missing_required_field_drops_sample() {
        let transformer = Transformer::new("kafka").unwrap();
        let sample =
            RawSample::new(EventType::Broker, "clusterA", 1_000).with_identity("brokerId", "1");
        assert!(transformer.transform(&sample).is_none());
    }

    #[test]
    fn out_of_bounds_percent_is_clamped_not_dropped() {
        let transformer = Transformer::new("kafka").unwrap();
        let sample = RawSample::new(EventType::Broker, "clusterA", 1_000)
            .with_identity("brokerId", "1")
            .with_field("UnderReplicatedPartitions", RawValue::from(0.0))
            .with_field("CpuPercent", RawValue::from(150.0));

        let metrics = transformer.transform(&sample).unwrap();
        assert_eq!(metrics.metric(m::CPU_PERCENT), Some(100.0));
    }

    #[test]
    fn missing_identity_returns_none_without_panicking() {
        let transformer = Transformer::new("kafka").unwrap();
        let sample = RawSample::new(EventType::Topic, "clusterA", 1_000);
        assert!(transformer.transform(&sample).is_none());
    }

    #[test]
    fn cluster_name_inferred_from_hostname_when_absent() {
        let transformer = Transformer::new("kafka").unwrap();
        let sample = RawSample::new(EventType::Broker, "", 1_000)
            .with_identity("brokerId", "1")
            .with_identity("hostname", "prod-west-kafka-3")
            .with_field("UnderReplicatedPartitions", RawValue::from(0.0));

        let metrics = transformer.transform(&sample).unwrap();
        assert_eq!(metrics.cluster_name, "prod-west");
    }

    #[test]
    fn cluster_name_defaults_when_uninferable() {
        let transformer = Transformer::new("kafka").unwrap();
        let sample = RawSample::new(EventType::Broker, "", 1_000)
            .with_identity("brokerId", "1")
            .with_field("UnderReplicatedPartitions", RawValue::from(0.0));

        let metrics = transformer.transform(&sample).unwrap();
        assert_eq!(metrics.cluster_name, "default-cluster");
    }

    #[test]
    fn dropped_metric_is_absent_not_zero() {
        let transformer = Transformer::new("kafka").unwrap();
        let sample = RawSample::new(EventType::ConsumerGroup, "clusterA", 1_000)
            .with_identity("consumerGroupId", "grp1")
            .with_field("ConsumerLag", RawValue::from(-5.0));

        let metrics = transformer.transform(&sample).unwrap();
        assert!(metrics.metric(m::LAG).is_none());
    }
}
