//! Builds the typed entity graph from aggregated metrics: deterministic GUIDs,
//! `CONTAINS`/`MANAGES`/`CONSUMES_FROM` relationships, and SLO-derived status.
//!
//! GUIDs are a hash of a composite key, not a random identifier, so the same
//! broker/topic/cluster/group produces the same GUID cycle after cycle and
//! across restarts. `sha2` is already in this crate's dependency
//! table for that purpose; truncating its digest to 32 hex characters matches
//! the GUID grammar's hash segment.

use std::collections::{BTreeMap, BTreeSet};

use sha2::{Digest, Sha256};

use crate::config::AlertThresholds;
use crate::metric_names as m;
use crate::model::{
    is_valid_guid, AlertLevel, Entity, EntityKind, EntityStatus, EntityType, Relationship,
    RelationshipLabel, TransformedMetrics,
};
use crate::recovery::{Classify, ErrorKind};

/// `synthesize` is total on valid input; this variant
/// exists for the orchestrator's uniform `with_recovery` stage shape.
#[derive(Debug, thiserror::Error)]
pub enum SynthesizeError {
    #[error("internal synthesizer error: {0}")]
    Internal(String),
}

impl Classify for SynthesizeError {
    fn classify(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

/// Entities and relationships produced by one synthesis pass, plus a count of
/// records excluded for failing validation: invalid entities are dropped and
/// logged, not fatal to the cycle.
#[derive(Debug, Clone, Default)]
pub struct SynthesisOutput {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub invalid_count: usize,
}

/// Builds GUIDs, the relationship graph, and SLO status from aggregated
/// metrics for one account.
pub struct Synthesizer {
    account_id: String,
    environment: Option<String>,
    region: Option<String>,
    alert_thresholds: AlertThresholds,
}

impl Synthesizer {
    pub fn new(
        account_id: impl Into<String>,
        environment: Option<String>,
        region: Option<String>,
        alert_thresholds: AlertThresholds,
    ) -> Self {
        Self { account_id: account_id.into(), environment, region, alert_thresholds }
    }

    /// Turn one cycle's metrics (brokers, topics, consumer groups, and the
    /// already-aggregated cluster entries) into an entity graph.
    ///
    /// Consumer-group rows are per `(group, topic)` pair, mirroring the
    /// upstream per-partition offset sample; rows sharing a `consumerGroupId`
    /// within a cluster fold into one `MESSAGE_QUEUE_CONSUMER_GROUP` entity
    /// whose `lag` is their sum, and their topic names become that group's
    /// `CONSUMES_FROM` edges.
    pub fn synthesize(&self, metrics: &[TransformedMetrics]) -> Result<SynthesisOutput, SynthesizeError> {
        let mut output = SynthesisOutput::default();

        let topic_lag = self.accumulate_topic_lag(metrics);
        let merged_groups = self.merge_consumer_groups(metrics);

        let mut topic_guids: BTreeMap<(String, String), String> = BTreeMap::new();
        let mut broker_guids: BTreeMap<(String, String), String> = BTreeMap::new();
        let mut cluster_guids: BTreeMap<String, String> = BTreeMap::new();
        let mut brokers_by_cluster: BTreeMap<String, Vec<&TransformedMetrics>> = BTreeMap::new();

        for record in metrics {
            if record.entity_type == EntityKind::Broker {
                brokers_by_cluster.entry(record.cluster_name.clone()).or_default().push(record);
            }
        }

        for record in metrics {
            match record.entity_type {
                EntityKind::Cluster => {
                    let Some(entity) = self.build_cluster_entity(record) else {
                        output.invalid_count += 1;
                        continue;
                    };
                    cluster_guids.insert(record.cluster_name.clone(), entity.guid.clone());
                    output.entities.push(entity);
                }
                EntityKind::Broker => {
                    let Some(entity) = self.build_broker_entity(record) else {
                        output.invalid_count += 1;
                        continue;
                    };
                    if let Some(broker_id) = record.identifier("brokerId") {
                        broker_guids
                            .insert((record.cluster_name.clone(), broker_id.to_string()), entity.guid.clone());
                    }
                    output.entities.push(entity);
                }
                EntityKind::Topic => {
                    let Some(topic_name) = record.identifier("topicName") else {
                        output.invalid_count += 1;
                        continue;
                    };
                    let lag = topic_lag.get(&(record.cluster_name.clone(), topic_name.to_string())).copied();
                    let Some(entity) = self.build_topic_entity(record, lag) else {
                        output.invalid_count += 1;
                        continue;
                    };
                    topic_guids
                        .insert((record.cluster_name.clone(), topic_name.to_string()), entity.guid.clone());
                    output.entities.push(entity);
                }
                EntityKind::ConsumerGroup => {
                    // handled below, once, from `merged_groups`
                }
            }
        }

        let mut group_guids: Vec<(String, String, BTreeSet<String>)> = Vec::new();
        for ((cluster_name, group_id), merged) in &merged_groups {
            let Some(entity) = self.build_consumer_group_entity(cluster_name, group_id, merged.total_lag) else {
                output.invalid_count += 1;
                continue;
            };
            group_guids.push((cluster_name.clone(), entity.guid.clone(), merged.topics.clone()));
            output.entities.push(entity);
        }

        // CLUSTER CONTAINS BROKER / CLUSTER CONTAINS TOPIC
        for ((cluster_name, _broker_id), broker_guid) in &broker_guids {
            if let Some(cluster_guid) = cluster_guids.get(cluster_name) {
                self.push_with_inverse(
                    &mut output.relationships,
                    Relationship::new(cluster_guid.clone(), RelationshipLabel::Contains, broker_guid.clone()),
                );
            }
        }
        for ((cluster_name, _topic_name), topic_guid) in &topic_guids {
            if let Some(cluster_guid) = cluster_guids.get(cluster_name) {
                self.push_with_inverse(
                    &mut output.relationships,
                    Relationship::new(cluster_guid.clone(), RelationshipLabel::Contains, topic_guid.clone()),
                );
            }
        }

        // TOPIC MANAGED_BY BROKER: the broker with the most leader partitions
        // in the topic's cluster, ties broken by the lowest brokerId.
        for ((cluster_name, _topic_name), topic_guid) in &topic_guids {
            if let Some(broker_guid) = self.managing_broker(cluster_name, &brokers_by_cluster, &broker_guids) {
                self.push_with_inverse(
                    &mut output.relationships,
                    Relationship::new(topic_guid.clone(), RelationshipLabel::ManagedBy, broker_guid),
                );
            }
        }

        // CONSUMER_GROUP CONSUMES_FROM TOPIC, one edge per topic the group reads.
        for (cluster_name, group_guid, topics) in &group_guids {
            for topic_name in topics {
                if let Some(topic_guid) = topic_guids.get(&(cluster_name.clone(), topic_name.clone())) {
                    output.relationships.push(Relationship::new(
                        group_guid.clone(),
                        RelationshipLabel::ConsumesFrom,
                        topic_guid.clone(),
                    ));
                }
            }
        }

        self.reject_invalid(&mut output);

        Ok(output)
    }

    /// Final validation pass: drop any entity whose GUID fails `is_valid_guid`,
    /// or that is missing `name`/`provider`/`clusterName`, counting and logging
    /// each instead of aborting the cycle. Relationships that referenced a
    /// dropped entity are dropped too, since a relationship only ever
    /// references entities by GUID.
    fn reject_invalid(&self, output: &mut SynthesisOutput) {
        let before = output.entities.len();
        output.entities.retain(|entity| {
            let valid = is_valid_guid(&entity.guid)
                && !entity.name.is_empty()
                && !entity.provider.is_empty()
                && !entity.cluster_name.is_empty();
            if !valid {
                tracing::warn!(guid = %entity.guid, name = %entity.name, "dropping entity that failed GUID/field validation");
            }
            valid
        });
        output.invalid_count += before - output.entities.len();

        let live_guids: BTreeSet<&str> =
            output.entities.iter().map(|e| e.guid.as_str()).collect();
        output
            .relationships
            .retain(|r| live_guids.contains(r.source_guid.as_str()) && live_guids.contains(r.target_guid.as_str()));
    }

    fn push_with_inverse(&self, relationships: &mut Vec<Relationship>, rel: Relationship) {
        if let Some(inverse) = rel.inverse() {
            relationships.push(inverse);
        }
        relationships.push(rel);
    }

    /// The broker managing a topic: the cluster's broker with the most
    /// leader partitions, lowest `brokerId` breaking ties. `None` if the
    /// cluster has no brokers with a known `brokerId`.
    fn managing_broker(
        &self,
        cluster_name: &str,
        brokers_by_cluster: &BTreeMap<String, Vec<&TransformedMetrics>>,
        broker_guids: &BTreeMap<(String, String), String>,
    ) -> Option<String> {
        let brokers = brokers_by_cluster.get(cluster_name)?;
        let mut best: Option<(&str, f64)> = None;
        for broker in brokers {
            let Some(broker_id) = broker.identifier("brokerId") else { continue };
            let leader_partitions = broker.metric(m::LEADER_PARTITIONS).unwrap_or(0.0);
            best = match best {
                None => Some((broker_id, leader_partitions)),
                Some((current_id, current_leaders)) => {
                    if leader_partitions > current_leaders
                        || (leader_partitions == current_leaders && broker_id < current_id)
                    {
                        Some((broker_id, leader_partitions))
                    } else {
                        Some((current_id, current_leaders))
                    }
                }
            };
        }
        let (winner_id, _) = best?;
        broker_guids.get(&(cluster_name.to_string(), winner_id.to_string())).cloned()
    }

    fn accumulate_topic_lag(&self, metrics: &[TransformedMetrics]) -> BTreeMap<(String, String), f64> {
        let mut out: BTreeMap<(String, String), f64> = BTreeMap::new();
        for record in metrics {
            if record.entity_type != EntityKind::ConsumerGroup {
                continue;
            }
            let (Some(topic_name), Some(lag)) = (record.identifier("topicName"), record.metric(m::LAG)) else {
                continue;
            };
            *out.entry((record.cluster_name.clone(), topic_name.to_string())).or_insert(0.0) += lag;
        }
        out
    }

    fn merge_consumer_groups(&self, metrics: &[TransformedMetrics]) -> BTreeMap<(String, String), MergedGroup> {
        let mut out: BTreeMap<(String, String), MergedGroup> = BTreeMap::new();
        for record in metrics {
            if record.entity_type != EntityKind::ConsumerGroup {
                continue;
            }
            let Some(group_id) = record.identifier("consumerGroupId") else {
                continue;
            };
            let entry = out
                .entry((record.cluster_name.clone(), group_id.to_string()))
                .or_insert_with(MergedGroup::default);
            if let Some(lag) = record.metric(m::LAG) {
                entry.total_lag += lag;
            }
            if let Some(topic_name) = record.identifier("topicName") {
                entry.topics.insert(topic_name.to_string());
            }
        }
        out
    }

    fn guid(&self, entity_type: EntityType, composite_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(composite_key.as_bytes());
        let digest = hasher.finalize();
        let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
        format!("{}|INFRA|{}|{}", self.account_id, entity_type.as_str(), &hex[..32])
    }

    fn base_entity(
        &self,
        entity_type: EntityType,
        name: String,
        cluster_name: &str,
        timestamp_millis: i64,
        provider: &str,
        composite_key: &str,
        tags: BTreeMap<String, String>,
    ) -> Entity {
        Entity {
            guid: self.guid(entity_type, composite_key),
            entity_type,
            name,
            timestamp_millis,
            cluster_name: cluster_name.to_string(),
            provider: provider.to_string(),
            account_id: self.account_id.clone(),
            environment: self.environment.clone(),
            region: self.region.clone(),
            metrics: Default::default(),
            status: EntityStatus::Unknown,
            alert_level: AlertLevel::None,
            tags,
        }
    }

    fn build_cluster_entity(&self, record: &TransformedMetrics) -> Option<Entity> {
        if record.cluster_name.is_empty() || record.provider.is_empty() {
            return None;
        }
        let composite_key = record.cluster_name.clone();
        let mut entity = self.base_entity(
            EntityType::MessageQueueCluster,
            record.cluster_name.clone(),
            &record.cluster_name,
            record.timestamp_millis,
            &record.provider,
            &composite_key,
            record.identifiers.clone(),
        );
        entity.metrics = record.metrics.clone();
        let health_score = record.metric(m::HEALTH_SCORE);
        entity.alert_level = match health_score {
            Some(score) if score < self.alert_thresholds.cluster_health_critical => AlertLevel::Critical,
            Some(score) if score < self.alert_thresholds.cluster_health_warning => AlertLevel::Warning,
            _ => AlertLevel::None,
        };
        entity.status = match (entity.alert_level, health_score) {
            (AlertLevel::Critical, _) => EntityStatus::Critical,
            (AlertLevel::Warning, _) => EntityStatus::Warning,
            (AlertLevel::None, Some(score)) if score < 90.0 => EntityStatus::Degraded,
            (AlertLevel::None, Some(_)) => EntityStatus::Healthy,
            (AlertLevel::None, None) => EntityStatus::Unknown,
        };
        Some(entity)
    }

    fn build_broker_entity(&self, record: &TransformedMetrics) -> Option<Entity> {
        if record.cluster_name.is_empty() || record.provider.is_empty() {
            return None;
        }
        let broker_id = record.identifier("brokerId")?;
        let hostname = record.identifier("hostname");
        let composite_key = format!(
            "{}:{}:{}",
            record.cluster_name,
            broker_id,
            hostname.unwrap_or_default()
        );
        let name = hostname.unwrap_or(broker_id).to_string();
        let mut entity = self.base_entity(
            EntityType::MessageQueueBroker,
            name,
            &record.cluster_name,
            record.timestamp_millis,
            &record.provider,
            &composite_key,
            record.identifiers.clone(),
        );
        entity.metrics = record.metrics.clone();
        let cpu = record.metric(m::CPU_PERCENT);
        entity.alert_level = match cpu {
            Some(cpu) if cpu > self.alert_thresholds.broker_cpu_critical => AlertLevel::Critical,
            Some(cpu) if cpu > self.alert_thresholds.broker_cpu_warning => AlertLevel::Warning,
            _ => AlertLevel::None,
        };
        entity.status = self.status_from_alert(entity.alert_level, cpu.is_some());
        Some(entity)
    }

    fn build_topic_entity(&self, record: &TransformedMetrics, lag: Option<f64>) -> Option<Entity> {
        if record.cluster_name.is_empty() || record.provider.is_empty() {
            return None;
        }
        let topic_name = record.identifier("topicName")?;
        let composite_key = format!("{}:{}", record.cluster_name, topic_name);
        let mut entity = self.base_entity(
            EntityType::MessageQueueTopic,
            topic_name.to_string(),
            &record.cluster_name,
            record.timestamp_millis,
            &record.provider,
            &composite_key,
            record.identifiers.clone(),
        );
        entity.metrics = record.metrics.clone();
        if let Some(lag) = lag {
            entity.metrics.insert(m::CONSUMER_LAG, lag);
        }
        entity.alert_level = match lag {
            Some(lag) if lag > self.alert_thresholds.topic_lag_critical => AlertLevel::Critical,
            Some(lag) if lag > self.alert_thresholds.topic_lag_warning => AlertLevel::Warning,
            _ => AlertLevel::None,
        };
        entity.status = self.status_from_alert(entity.alert_level, lag.is_some());
        Some(entity)
    }

    fn build_consumer_group_entity(
        &self,
        cluster_name: &str,
        group_id: &str,
        total_lag: f64,
    ) -> Option<Entity> {
        if cluster_name.is_empty() {
            return None;
        }
        let composite_key = format!("{cluster_name}:{group_id}");
        let mut tags = BTreeMap::new();
        tags.insert("consumerGroupId".to_string(), group_id.to_string());
        let mut entity = self.base_entity(
            EntityType::MessageQueueConsumerGroup,
            group_id.to_string(),
            cluster_name,
            0,
            "kafka",
            &composite_key,
            tags,
        );
        entity.metrics.insert(m::LAG, total_lag);
        entity.alert_level = match total_lag {
            lag if lag > self.alert_thresholds.consumer_group_lag_critical => AlertLevel::Critical,
            lag if lag > self.alert_thresholds.consumer_group_lag_warning => AlertLevel::Warning,
            _ => AlertLevel::None,
        };
        entity.status = self.status_from_alert(entity.alert_level, true);
        Some(entity)
    }

    fn status_from_alert(&self, alert_level: AlertLevel, metric_known: bool) -> EntityStatus {
        match (alert_level, metric_known) {
            (AlertLevel::Critical, _) => EntityStatus::Critical,
            (AlertLevel::Warning, _) => EntityStatus::Warning,
            (AlertLevel::None, true) => EntityStatus::Healthy,
            (AlertLevel::None, false) => EntityStatus::Unknown,
        }
    }
}

#[derive(Debug, Default)]
struct MergedGroup {
    total_lag: f64,
    topics: BTreeSet<String>,
}
