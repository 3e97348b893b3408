use std::collections::BTreeMap;

use super::metric_value::MetricMap;

/// A synthesized record streamed to the backend. GUIDs are deterministic: the same
/// `(accountId, entityType, compositeKey)` always produces the same GUID, across
/// cycles and across restarts.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Entity {
    pub guid: String,
    pub entity_type: EntityType,
    pub name: String,
    pub timestamp_millis: i64,
    pub cluster_name: String,
    pub provider: String,
    pub account_id: String,
    pub environment: Option<String>,
    pub region: Option<String>,
    pub metrics: MetricMap,
    pub status: EntityStatus,
    pub alert_level: AlertLevel,
    pub tags: BTreeMap<String, String>,
}

/// The `MESSAGE_QUEUE_*` entity type embedded in the GUID and wire event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub enum EntityType {
    MessageQueueCluster,
    MessageQueueBroker,
    MessageQueueTopic,
    MessageQueueConsumerGroup,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::MessageQueueCluster => "MESSAGE_QUEUE_CLUSTER",
            EntityType::MessageQueueBroker => "MESSAGE_QUEUE_BROKER",
            EntityType::MessageQueueTopic => "MESSAGE_QUEUE_TOPIC",
            EntityType::MessageQueueConsumerGroup => "MESSAGE_QUEUE_CONSUMER_GROUP",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<super::transformed_metrics::EntityKind> for EntityType {
    fn from(kind: super::transformed_metrics::EntityKind) -> Self {
        use super::transformed_metrics::EntityKind;
        match kind {
            EntityKind::Cluster => EntityType::MessageQueueCluster,
            EntityKind::Broker => EntityType::MessageQueueBroker,
            EntityKind::Topic => EntityType::MessageQueueTopic,
            EntityKind::ConsumerGroup => EntityType::MessageQueueConsumerGroup,
        }
    }
}

/// Overall health of an entity, derived by the synthesizer from its metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum EntityStatus {
    Healthy,
    Warning,
    Degraded,
    Critical,
    Unknown,
}

/// SLO-threshold crossing derived from an entity's metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum AlertLevel {
    None,
    Warning,
    Critical,
}

impl AlertLevel {
    /// The more severe of two alert levels.
    pub fn max(self, other: AlertLevel) -> AlertLevel {
        use AlertLevel::*;
        match (self, other) {
            (Critical, _) | (_, Critical) => Critical,
            (Warning, _) | (_, Warning) => Warning,
            _ => None,
        }
    }
}

/// Regex-equivalent, hand-rolled validator for the GUID grammar:
/// `^\d+\|INFRA\|MESSAGE_QUEUE_(CLUSTER|BROKER|TOPIC|CONSUMER_GROUP)\|[a-f0-9]{32}$`
pub fn is_valid_guid(guid: &str) -> bool {
    let mut parts = guid.split('|');
    let account_id = match parts.next() {
        Some(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s,
        _ => return false,
    };
    let _ = account_id;
    if parts.next() != Some("INFRA") {
        return false;
    }
    let entity_type = match parts.next() {
        Some(s) => s,
        None => return false,
    };
    let valid_type = matches!(
        entity_type,
        "MESSAGE_QUEUE_CLUSTER"
            | "MESSAGE_QUEUE_BROKER"
            | "MESSAGE_QUEUE_TOPIC"
            | "MESSAGE_QUEUE_CONSUMER_GROUP"
    );
    if !valid_type {
        return false;
    }
    let hash = match parts.next() {
        Some(s) => s,
        None => return false,
    };
    if parts.next().is_some() {
        return false;
    }
    hash.len() == 32 && hash.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
