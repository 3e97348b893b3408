//! Rolls broker-level [`TransformedMetrics`] up into one cluster-level
//! [`TransformedMetrics`] per cluster, with defined aggregation rules, derived
//! availability, and a derived health score.
//!
//! `aggregate` is a pure function of its inputs: no I/O, no mutation of the
//! slices it's given, safe to call from multiple cycles concurrently.

use std::collections::{BTreeMap, BTreeSet};

use crate::metric_names as m;
use crate::model::{EntityKind, TransformedMetrics};

/// Group `brokers`/`topics`/`consumer_groups` by `clusterName` and compute one
/// aggregated [`TransformedMetrics`] per cluster.
pub fn aggregate(
    brokers: &[TransformedMetrics],
    topics: &[TransformedMetrics],
    consumer_groups: &[TransformedMetrics],
) -> BTreeMap<String, TransformedMetrics> {
    let mut by_cluster: BTreeMap<String, Vec<&TransformedMetrics>> = BTreeMap::new();
    for broker in brokers {
        by_cluster.entry(broker.cluster_name.clone()).or_default().push(broker);
    }

    let mut topic_names_by_cluster: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for topic in topics {
        if let Some(name) = topic.identifier("topicName") {
            topic_names_by_cluster
                .entry(topic.cluster_name.clone())
                .or_default()
                .insert(name.to_string());
        }
    }

    let mut group_ids_by_cluster: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for group in consumer_groups {
        if let Some(id) = group.identifier("consumerGroupId") {
            group_ids_by_cluster
                .entry(group.cluster_name.clone())
                .or_default()
                .insert(id.to_string());
        }
    }

    let mut out = BTreeMap::new();
    for (cluster_name, cluster_brokers) in &by_cluster {
        let topic_count = topic_names_by_cluster.get(cluster_name).map(|s| s.len()).unwrap_or(0);
        let group_count = group_ids_by_cluster.get(cluster_name).map(|s| s.len()).unwrap_or(0);
        let aggregated = aggregate_cluster(cluster_name, cluster_brokers, topic_count, group_count);
        out.insert(cluster_name.clone(), aggregated);
    }
    out
}

fn sum_metric(brokers: &[&TransformedMetrics], name: &str) -> f64 {
    brokers.iter().filter_map(|b| b.metric(name)).sum()
}

fn avg_metric(brokers: &[&TransformedMetrics], name: &str) -> Option<f64> {
    let values: Vec<f64> = brokers.iter().filter_map(|b| b.metric(name)).collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn max_metric(brokers: &[&TransformedMetrics], name: &str) -> Option<f64> {
    brokers
        .iter()
        .filter_map(|b| b.metric(name))
        .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
}

fn aggregate_cluster(
    cluster_name: &str,
    brokers: &[&TransformedMetrics],
    topic_count: usize,
    consumer_group_count: usize,
) -> TransformedMetrics {
    let timestamp_millis = brokers.iter().map(|b| b.timestamp_millis).max().unwrap_or(0);
    let provider = brokers.first().map(|b| b.provider.clone()).unwrap_or_else(|| "kafka".to_string());

    let mut cluster = TransformedMetrics::new(EntityKind::Cluster, cluster_name, timestamp_millis, provider);

    cluster.metrics.insert(m::BYTES_IN_PER_SECOND, sum_metric(brokers, m::BYTES_IN_PER_SECOND));
    cluster.metrics.insert(m::BYTES_OUT_PER_SECOND, sum_metric(brokers, m::BYTES_OUT_PER_SECOND));
    cluster.metrics.insert(m::MESSAGES_IN_PER_SECOND, sum_metric(brokers, m::MESSAGES_IN_PER_SECOND));
    cluster.metrics.insert(m::PARTITION_COUNT, sum_metric(brokers, m::PARTITION_COUNT));
    cluster.metrics.insert(m::LEADER_PARTITIONS, sum_metric(brokers, m::LEADER_PARTITIONS));
    let under_replicated = sum_metric(brokers, m::UNDER_REPLICATED_PARTITIONS);
    cluster.metrics.insert(m::UNDER_REPLICATED_PARTITIONS, under_replicated);
    let offline = sum_metric(brokers, m::OFFLINE_PARTITIONS);
    cluster.metrics.insert(m::OFFLINE_PARTITIONS, offline);
    let total_requests = sum_metric(brokers, m::REQUEST_RATE);
    cluster.metrics.insert(m::REQUEST_RATE, total_requests);

    if let Some(avg) = avg_metric(brokers, m::CPU_PERCENT) {
        cluster.metrics.insert(m::CPU_PERCENT, avg);
    }
    if let Some(avg) = avg_metric(brokers, m::MEMORY_PERCENT) {
        cluster.metrics.insert(m::MEMORY_PERCENT, avg);
    }
    let avg_idle = avg_metric(brokers, m::REQUEST_HANDLER_IDLE_PERCENT);
    if let Some(avg) = avg_idle {
        cluster.metrics.insert(m::REQUEST_HANDLER_IDLE_PERCENT, avg);
    }
    if let Some(avg) = avg_metric(brokers, m::NETWORK_PROCESSOR_IDLE_PERCENT) {
        cluster.metrics.insert(m::NETWORK_PROCESSOR_IDLE_PERCENT, avg);
    }

    let max_disk = max_metric(brokers, m::DISK_USAGE_PERCENT);
    if let Some(max_disk) = max_disk {
        cluster.metrics.insert(m::DISK_USAGE_PERCENT, max_disk);
    }

    cluster.metrics.insert(m::TOPIC_COUNT, topic_count as f64);
    cluster.metrics.insert(m::CONSUMER_GROUP_COUNT, consumer_group_count as f64);

    let total_brokers = brokers.len();
    let online_brokers = total_brokers; // presence in this cycle's input implies reporting/online.
    let total_partitions = sum_metric(brokers, m::PARTITION_COUNT);
    let availability = if total_brokers == 0 {
        0.0
    } else {
        let broker_fraction = online_brokers as f64 / total_brokers as f64;
        let partition_fraction =
            if total_partitions == 0.0 { 1.0 } else { (total_partitions - offline) / total_partitions };
        broker_fraction.min(partition_fraction) * 100.0
    };
    cluster.metrics.insert(m::AVAILABILITY_PERCENTAGE, availability);

    let weighted_errors: f64 = brokers
        .iter()
        .filter_map(|b| {
            let requests = b.metric(m::REQUEST_RATE)?;
            let error_rate = b.metric(m::BROKER_ERROR_RATE)?;
            Some(requests * error_rate / 100.0)
        })
        .sum();
    let error_rate = if total_requests == 0.0 { 0.0 } else { weighted_errors / total_requests * 100.0 };
    cluster.metrics.insert(m::ERROR_RATE, error_rate);

    let health_score = compute_health_score(offline, under_replicated, &cluster, avg_idle, error_rate, max_disk);
    cluster.metrics.insert(m::HEALTH_SCORE, health_score);

    cluster
}

/// Derive `healthScore ∈ [0,100]`, starting at 100 and deducting per the
/// standard penalty table. Monotone non-increasing in
/// `underReplicatedPartitions`, `offlinePartitions`, `maxDiskUsage`, and
/// `errorRate`.
fn compute_health_score(
    offline: f64,
    under_replicated: f64,
    cluster: &TransformedMetrics,
    avg_request_handler_idle: Option<f64>,
    error_rate: f64,
    max_disk: Option<f64>,
) -> f64 {
    let mut score = 100.0;

    if offline > 0.0 {
        score -= 30.0;
    }
    score -= (2.0 * under_replicated).min(20.0);

    if let Some(cpu) = cluster.metric(m::CPU_PERCENT) {
        if cpu > 80.0 {
            score -= (0.75 * (cpu - 80.0)).min(15.0);
        }
    }
    if let Some(memory) = cluster.metric(m::MEMORY_PERCENT) {
        if memory > 85.0 {
            score -= (memory - 85.0).min(15.0);
        }
    }
    if let Some(disk) = max_disk {
        if disk > 90.0 {
            score -= (2.0 * (disk - 90.0)).min(20.0);
        }
    }
    score -= (2.0 * error_rate).min(20.0);

    if let Some(idle) = avg_request_handler_idle {
        if idle < 20.0 {
            score -= 10.0;
        }
    }

    score.clamp(0.0, 100.0).round()
}
