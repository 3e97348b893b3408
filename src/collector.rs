//! Pulls raw samples from the upstream telemetry store.
//!
//! The collector issues one logical, paginated query per [`EventType`] against
//! an [`UpstreamClient`]. It never classifies an upstream error against the
//! resilience stack itself; that happens one layer up, in the orchestrator's
//! `with_recovery` wrapper, so the collector stays a thin, pure mapping from
//! "query pages" to "merged samples".

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::model::{EventType, RawSample, RawValue};
use crate::recovery::{Classify, ErrorKind};
use crate::sleeper::{Sleeper, TokioSleeper};
use std::sync::Arc;

/// Rows returned by a single upstream query page.
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub rows: Vec<Value>,
}

/// Stage-specific error taxonomy for the collector.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("network error reaching upstream: {0}")]
    Network(String),
    #[error("upstream query timed out")]
    Timeout,
    #[error("upstream rejected credentials: {0}")]
    Auth(String),
    #[error("upstream rate limit exceeded")]
    RateLimit,
    #[error("upstream returned a malformed row: {0}")]
    Validation(String),
    #[error("internal collector error: {0}")]
    Internal(String),
}

impl Classify for CollectorError {
    fn classify(&self) -> ErrorKind {
        match self {
            CollectorError::Network(_) => ErrorKind::Network,
            CollectorError::Timeout => ErrorKind::Timeout,
            CollectorError::Auth(_) => ErrorKind::Auth,
            CollectorError::RateLimit => ErrorKind::RateLimit,
            CollectorError::Validation(_) => ErrorKind::Validation,
            CollectorError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// A declarative query template: the query text (an NRQL-like language) plus
/// the event type it produces. Data, not code, so adding a new upstream event
/// type is a table entry, not a new branch of dispatch logic.
#[derive(Debug, Clone, Copy)]
pub struct QueryTemplate {
    pub event_type: EventType,
    pub query_text: &'static str,
}

pub const QUERY_TEMPLATES: &[QueryTemplate] = &[
    QueryTemplate {
        event_type: EventType::Broker,
        query_text: "SELECT * FROM KafkaBrokerSample SINCE {lookback} LIMIT {limit} OFFSET {offset}",
    },
    QueryTemplate {
        event_type: EventType::Topic,
        query_text: "SELECT * FROM KafkaTopicSample SINCE {lookback} LIMIT {limit} OFFSET {offset}",
    },
    QueryTemplate {
        event_type: EventType::ConsumerGroup,
        query_text: "SELECT * FROM KafkaOffsetSample SINCE {lookback} LIMIT {limit} OFFSET {offset}",
    },
];

/// Queries the upstream telemetry store over HTTPS.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn query(
        &self,
        query_text: &str,
        variables: &BTreeMap<String, Value>,
    ) -> Result<QueryResponse, CollectorError>;
}

/// Counters exposed for observability: queries issued, rows returned, errors.
#[derive(Debug, Default)]
pub struct CollectorStats {
    queries_issued: AtomicU64,
    rows_returned: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CollectorStatsSnapshot {
    pub queries_issued: u64,
    pub rows_returned: u64,
    pub errors: u64,
}

impl CollectorStats {
    pub fn snapshot(&self) -> CollectorStatsSnapshot {
        CollectorStatsSnapshot {
            queries_issued: self.queries_issued.load(Ordering::Relaxed),
            rows_returned: self.rows_returned.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Pagination and lookback-window knobs.
#[derive(Debug, Clone, Copy)]
pub struct CollectorConfig {
    pub lookback: Duration,
    /// Rows per page; the upstream API caps this around 2000.
    pub page_size: usize,
    /// Hard ceiling on total rows collected per event type per cycle.
    pub max_results: usize,
    /// Pause this long every `pause_every_rows` rows, for rate-limit friendliness.
    pub pause_every_rows: usize,
    pub pause_duration: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            lookback: Duration::from_secs(5 * 60),
            page_size: 2000,
            max_results: 100_000,
            pause_every_rows: 10_000,
            pause_duration: Duration::from_secs(1),
        }
    }
}

/// Pulls raw samples from the upstream telemetry store for one cycle.
pub struct Collector<C: UpstreamClient> {
    client: C,
    config: CollectorConfig,
    sleeper: Arc<dyn Sleeper>,
    stats: CollectorStats,
}

impl<C: UpstreamClient> Collector<C> {
    pub fn new(client: C, config: CollectorConfig) -> Self {
        Self { client, config, sleeper: Arc::new(TokioSleeper), stats: CollectorStats::default() }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn stats(&self) -> CollectorStatsSnapshot {
        self.stats.snapshot()
    }

    /// Issue the three logical queries (broker, topic, consumer-group) and
    /// merge their rows into one list, tagged with their `eventType`.
    pub async fn collect(&self) -> Result<Vec<RawSample>, CollectorError> {
        let mut samples = Vec::new();
        for template in QUERY_TEMPLATES {
            match self.collect_event_type(*template).await {
                Ok(mut rows) => samples.append(&mut rows),
                Err(e) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    return Err(e);
                }
            }
        }
        Ok(samples)
    }

    async fn collect_event_type(
        &self,
        template: QueryTemplate,
    ) -> Result<Vec<RawSample>, CollectorError> {
        let mut offset = 0usize;
        let mut out = Vec::new();
        loop {
            if out.len() >= self.config.max_results {
                break;
            }
            let mut variables = BTreeMap::new();
            variables.insert("lookback".to_string(), Value::from(self.config.lookback.as_secs()));
            variables.insert("limit".to_string(), Value::from(self.config.page_size));
            variables.insert("offset".to_string(), Value::from(offset));

            self.stats.queries_issued.fetch_add(1, Ordering::Relaxed);
            let response = self.client.query(template.query_text, &variables).await?;
            self.stats.rows_returned.fetch_add(response.rows.len() as u64, Ordering::Relaxed);

            let page_len = response.rows.len();
            for row in response.rows {
                out.push(row_to_raw_sample(template.event_type, row)?);
            }

            if page_len < self.config.page_size {
                break;
            }
            offset += self.config.page_size;
            if offset % self.config.pause_every_rows == 0 {
                self.sleeper.sleep(self.config.pause_duration).await;
            }
        }
        Ok(out)
    }
}

/// Convert one raw JSON row into a [`RawSample`], tagging it with `event_type`.
/// Unknown/extra fields become free-form `fields`; recognized identity keys
/// (`brokerId`, `hostname`, `topicName`, `consumerGroupId`) are split into
/// `identity`. `clusterName` is copied verbatim; the transformer is the stage
/// that infers it when absent, since the collector stays a dumb mapper.
fn row_to_raw_sample(event_type: EventType, row: Value) -> Result<RawSample, CollectorError> {
    let object = row
        .as_object()
        .ok_or_else(|| CollectorError::Validation("row is not a JSON object".to_string()))?;

    let cluster_name = object
        .get("clusterName")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let timestamp_millis = object.get("timestamp").and_then(Value::as_i64).unwrap_or(0);

    let mut sample = RawSample::new(event_type, cluster_name, timestamp_millis);

    const IDENTITY_KEYS: &[&str] =
        &["brokerId", "hostname", "topicName", "consumerGroupId"];

    for (key, value) in object {
        if key == "clusterName" || key == "timestamp" {
            continue;
        }
        if IDENTITY_KEYS.contains(&key.as_str()) {
            if let Some(s) = value.as_str() {
                sample = sample.with_identity(key.clone(), s.to_string());
            } else if let Some(n) = value.as_f64() {
                sample = sample.with_identity(key.clone(), format_number(n));
            }
            continue;
        }
        let raw_value = match value {
            Value::Number(n) => RawValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => RawValue::Text(s.clone()),
            Value::Bool(b) => RawValue::Text(b.to_string()),
            _ => continue,
        };
        sample = sample.with_field(key.clone(), raw_value);
    }

    Ok(sample)
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// `reqwest`-backed [`UpstreamClient`] posting `{query, variables}` to the
/// region's GraphQL endpoint with the tenant's API key. Query text templates
/// carry `{lookback}`/`{limit}`/`{offset}` placeholders that are substituted
/// from `variables` before the request is sent, since the upstream embeds
/// pagination in the query language itself rather than as separate request
/// fields.
pub struct GraphQlUpstreamClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GraphQlUpstreamClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), endpoint: endpoint.into(), api_key: api_key.into() }
    }
}

fn substitute(query_text: &str, variables: &BTreeMap<String, Value>) -> String {
    let mut rendered = query_text.to_string();
    for (key, value) in variables {
        let placeholder = format!("{{{key}}}");
        let substitution = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        rendered = rendered.replace(&placeholder, &substitution);
    }
    rendered
}

#[async_trait]
impl UpstreamClient for GraphQlUpstreamClient {
    async fn query(
        &self,
        query_text: &str,
        variables: &BTreeMap<String, Value>,
    ) -> Result<QueryResponse, CollectorError> {
        let body = serde_json::json!({
            "query": substitute(query_text, variables),
            "variables": variables,
        });

        let response = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("API-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CollectorError::Timeout
                } else {
                    CollectorError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CollectorError::RateLimit);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(CollectorError::Auth(status.to_string()));
        }
        if status.is_client_error() {
            return Err(CollectorError::Validation(status.to_string()));
        }
        if status.is_server_error() {
            return Err(CollectorError::Network(status.to_string()));
        }

        #[derive(serde::Deserialize)]
        struct GraphQlError {
            message: String,
        }
        #[derive(serde::Deserialize)]
        struct GraphQlEnvelope {
            #[serde(default)]
            data: Option<Value>,
            #[serde(default)]
            errors: Vec<GraphQlError>,
        }

        let envelope: GraphQlEnvelope = response
            .json()
            .await
            .map_err(|e| CollectorError::Validation(format!("malformed response body: {e}")))?;

        if let Some(first) = envelope.errors.first() {
            return Err(CollectorError::Validation(first.message.clone()));
        }

        let rows = envelope
            .data
            .as_ref()
            .and_then(|d| d.get("results"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(QueryResponse { rows })
    }
}

/// In-memory [`UpstreamClient`] test double returning canned pages per event
/// type, for unit and integration tests.
pub struct StaticUpstreamClient {
    pages: std::sync::Mutex<BTreeMap<EventType, Vec<Vec<Value>>>>,
}

impl StaticUpstreamClient {
    pub fn new() -> Self {
        Self { pages: std::sync::Mutex::new(BTreeMap::new()) }
    }

    /// Queue pages of rows to be returned, in order, for `event_type`.
    pub fn push_pages(&self, event_type: EventType, pages: Vec<Vec<Value>>) {
        self.pages.lock().unwrap().insert(event_type, pages);
    }
}

impl Default for StaticUpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpstreamClient for StaticUpstreamClient {
    async fn query(
        &self,
        query_text: &str,
        _variables: &BTreeMap<String, Value>,
    ) -> Result<QueryResponse, CollectorError> {
        let event_type = QUERY_TEMPLATES
            .iter()
            .find(|t| t.query_text == query_text)
            .map(|t| t.event_type)
            .ok_or_else(|| CollectorError::Internal("unknown query template".to_string()))?;

        let mut pages = self.pages.lock().unwrap();
        let queue = pages.entry(event_type).or_default();
        if queue.is_empty() {
            return Ok(QueryResponse { rows: Vec::new() });
        }
        Ok(QueryResponse { rows: queue.remove(0) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sleeper::InstantSleeper;
    use serde_json::json;

    #[tokio::test]
    async fn collect_merges_all_three_event_types() {
        let client = StaticUpstreamClient::new();
        client.push_pages(
            EventType::Broker,
            vec![vec![json!({"clusterName": "clusterA", "brokerId": "1", "BytesInPerSec": 100.0})]],
        );
        client.push_pages(
            EventType::Topic,
            vec![vec![json!({"clusterName": "clusterA", "topicName": "events"})]],
        );
        client.push_pages(
            EventType::ConsumerGroup,
            vec![vec![json!({"clusterName": "clusterA", "consumerGroupId": "grp1"})]],
        );

        let collector =
            Collector::new(client, CollectorConfig::default()).with_sleeper(Arc::new(InstantSleeper));
        let samples = collector.collect().await.unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(collector.stats().queries_issued, 3);
    }

    #[tokio::test]
    async fn pagination_stops_on_short_page() {
        let client = StaticUpstreamClient::new();
        let full_page: Vec<Value> = (0..3).map(|i| json!({"clusterName": "c", "brokerId": i.to_string()})).collect();
        client.push_pages(EventType::Broker, vec![full_page.clone(), vec![]]);
        client.push_pages(EventType::Topic, vec![vec![]]);
        client.push_pages(EventType::ConsumerGroup, vec![vec![]]);

        let config = CollectorConfig { page_size: 3, ..CollectorConfig::default() };
        let collector = Collector::new(client, config).with_sleeper(Arc::new(InstantSleeper));
        let samples = collector.collect().await.unwrap();
        assert_eq!(samples.len(), 3);
    }

    #[test]
    fn row_to_raw_sample_splits_identity_from_fields() {
        let row = json!({
            "clusterName": "clusterA",
            "brokerId": "7",
            "BytesInPerSec": 42.0,
        });
        let sample = row_to_raw_sample(EventType::Broker, row).unwrap();
        assert_eq!(sample.cluster_name, "clusterA");
        assert_eq!(sample.identity.get("brokerId"), Some(&"7".to_string()));
        assert_eq!(sample.field_f64("BytesInPerSec"), Some(42.0));
    }

    #[test]
    fn non_object_row_is_rejected_as_validation_error() {
        let err = row_to_raw_sample(EventType::Broker, json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, CollectorError::Validation(_)));
    }
}
