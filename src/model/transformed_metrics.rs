use std::collections::BTreeMap;

use super::metric_value::MetricMap;

/// The normalized representation produced by the transformer (and enriched by the
/// aggregator with derived cluster-level entries).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TransformedMetrics {
    pub timestamp_millis: i64,
    pub provider: String,
    pub entity_type: EntityKind,
    pub cluster_name: String,
    /// Minimum set of identifiers that disambiguate the entity within its cluster.
    pub identifiers: BTreeMap<String, String>,
    pub metrics: MetricMap,
    pub metadata: BTreeMap<String, String>,
}

impl TransformedMetrics {
    pub fn new(
        entity_type: EntityKind,
        cluster_name: impl Into<String>,
        timestamp_millis: i64,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            timestamp_millis,
            provider: provider.into(),
            entity_type,
            cluster_name: cluster_name.into(),
            identifiers: BTreeMap::new(),
            metrics: MetricMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn identifier(&self, key: &str) -> Option<&str> {
        self.identifiers.get(key).map(|s| s.as_str())
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name)
    }
}

/// The entity type a `TransformedMetrics` describes. Distinct from `model::EntityType`,
/// which is the wire-facing `MESSAGE_QUEUE_*` GUID-grammar enum the synthesizer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Cluster,
    Broker,
    Topic,
    ConsumerGroup,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Cluster => "cluster",
            EntityKind::Broker => "broker",
            EntityKind::Topic => "topic",
            EntityKind::ConsumerGroup => "consumerGroup",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
