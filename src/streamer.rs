//! Streams entities and relationships to the ingest backend over HTTPS in
//! batches.
//!
//! `reqwest` is already in this crate's dependency table purely for this
//! stage: every earlier stage is in-process. Event construction is a pure
//! function of an [`Entity`]/[`Relationship`]; only `HttpIngestClient::send`
//! touches the network, matching the collector's split between "build the
//! request" and "perform the request".

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::model::{Entity, Relationship};
use crate::recovery::{Classify, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("network error reaching ingest backend: {0}")]
    Network(String),
    #[error("ingest request timed out")]
    Timeout,
    #[error("ingest backend rejected credentials: {0}")]
    Auth(String),
    #[error("ingest backend rate limit exceeded")]
    RateLimit,
    #[error("ingest backend rejected a batch: {0}")]
    Validation(String),
    #[error("internal streamer error: {0}")]
    Internal(String),
}

impl Classify for StreamError {
    fn classify(&self) -> ErrorKind {
        match self {
            StreamError::Network(_) => ErrorKind::Network,
            StreamError::Timeout => ErrorKind::Timeout,
            StreamError::Auth(_) => ErrorKind::Auth,
            StreamError::RateLimit => ErrorKind::RateLimit,
            StreamError::Validation(_) => ErrorKind::Validation,
            StreamError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Sends pre-built batches of wire events to the ingest backend.
#[async_trait]
pub trait IngestClient: Send + Sync {
    async fn post_events(&self, batch: &[Value]) -> Result<(), StreamError>;
    async fn post_relationships(&self, batch: &[Value]) -> Result<(), StreamError>;
}

/// `reqwest`-backed [`IngestClient`] posting to the region's events endpoint
/// with the tenant's API key.
pub struct HttpIngestClient {
    http: reqwest::Client,
    events_endpoint: String,
    api_key: String,
}

impl HttpIngestClient {
    pub fn new(events_endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            events_endpoint: events_endpoint.into(),
            api_key: api_key.into(),
        }
    }

    async fn post(&self, payload: &[Value]) -> Result<(), StreamError> {
        let response = self
            .http
            .post(&self.events_endpoint)
            .header("Api-Key", &self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StreamError::Timeout
                } else {
                    StreamError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(StreamError::RateLimit);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(StreamError::Auth(status.to_string()));
        }
        if status.is_client_error() {
            return Err(StreamError::Validation(status.to_string()));
        }
        if status.is_server_error() {
            return Err(StreamError::Network(status.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl IngestClient for HttpIngestClient {
    async fn post_events(&self, batch: &[Value]) -> Result<(), StreamError> {
        self.post(batch).await
    }

    async fn post_relationships(&self, batch: &[Value]) -> Result<(), StreamError> {
        self.post(batch).await
    }
}

/// In-memory [`IngestClient`] test double recording every batch it receives.
#[derive(Default)]
pub struct RecordingIngestClient {
    pub events: std::sync::Mutex<Vec<Value>>,
    pub relationships: std::sync::Mutex<Vec<Value>>,
}

impl RecordingIngestClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IngestClient for RecordingIngestClient {
    async fn post_events(&self, batch: &[Value]) -> Result<(), StreamError> {
        self.events.lock().unwrap().extend_from_slice(batch);
        Ok(())
    }

    async fn post_relationships(&self, batch: &[Value]) -> Result<(), StreamError> {
        self.relationships.lock().unwrap().extend_from_slice(batch);
        Ok(())
    }
}

/// Batching knobs.
#[derive(Debug, Clone, Copy)]
pub struct StreamerConfig {
    pub batch_size: usize,
    /// Soft byte budget per batch; a batch closes early if the next event
    /// would push it over this, even if `batch_size` isn't reached.
    pub max_batch_bytes: usize,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self { batch_size: 500, max_batch_bytes: 1_000_000 }
    }
}

/// Outcome of one `stream` call: counters for events sent, batches sent, and
/// duplicates dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamOutcome {
    pub events_sent: usize,
    pub relationships_sent: usize,
    pub batches_sent: usize,
    pub duplicates_dropped: usize,
}

/// Streams a cycle's entities and relationships to the ingest backend.
pub struct Streamer<C: IngestClient> {
    client: C,
    config: StreamerConfig,
}

impl<C: IngestClient> Streamer<C> {
    pub fn new(client: C, config: StreamerConfig) -> Self {
        Self { client, config }
    }

    /// Build wire events for `entities`, dedup within this call by
    /// `(guid, timestamp)` so repeated delivery of the same cycle's output is
    /// idempotent at the batch-construction boundary, batch them, and post.
    /// Relationships are sent as a second event stream.
    pub async fn stream(
        &self,
        entities: &[Entity],
        relationships: &[Relationship],
    ) -> Result<StreamOutcome, StreamError> {
        let mut outcome = StreamOutcome::default();
        let mut seen = HashSet::new();

        let mut events = Vec::with_capacity(entities.len());
        for entity in entities {
            if !seen.insert((entity.guid.clone(), entity.timestamp_millis)) {
                outcome.duplicates_dropped += 1;
                continue;
            }
            events.push(entity_to_event(entity));
        }

        for batch in self.batches(&events) {
            self.client.post_events(batch).await?;
            outcome.events_sent += batch.len();
            outcome.batches_sent += 1;
        }

        let relationship_events: Vec<Value> =
            relationships.iter().map(relationship_to_event).collect();
        for batch in self.batches(&relationship_events) {
            self.client.post_relationships(batch).await?;
            outcome.relationships_sent += batch.len();
            outcome.batches_sent += 1;
        }

        Ok(outcome)
    }

    fn batches<'a>(&self, events: &'a [Value]) -> Vec<&'a [Value]> {
        let mut batches = Vec::new();
        let mut start = 0;
        let mut bytes = 0usize;
        for (i, event) in events.iter().enumerate() {
            let size = serialized_size(event);
            let would_overflow_bytes = bytes > 0 && bytes + size > self.config.max_batch_bytes;
            let would_overflow_count = i - start >= self.config.batch_size;
            if would_overflow_bytes || would_overflow_count {
                batches.push(&events[start..i]);
                start = i;
                bytes = 0;
            }
            bytes += size;
        }
        if start < events.len() {
            batches.push(&events[start..]);
        }
        batches
    }
}

fn serialized_size(value: &Value) -> usize {
    serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0)
}

/// Flatten one entity into a wire event: one top-level key per canonical
/// metric, `tag.{k}` per tag, and the identity/context fields every event
/// carries.
fn entity_to_event(entity: &Entity) -> Value {
    let mut event = json!({
        "eventType": "MessageQueue",
        "timestamp": entity.timestamp_millis,
        "entity.guid": entity.guid,
        "entity.name": entity.name,
        "entity.type": entity.entity_type.as_str(),
        "provider": entity.provider,
        "accountId": entity.account_id,
        "clusterName": entity.cluster_name,
        "status": format!("{:?}", entity.status),
        "alertLevel": format!("{:?}", entity.alert_level),
    });

    let object = event.as_object_mut().expect("object literal");
    if let Some(environment) = &entity.environment {
        object.insert("environment".to_string(), Value::from(environment.clone()));
    }
    if let Some(region) = &entity.region {
        object.insert("region".to_string(), Value::from(region.clone()));
    }
    for (name, value) in entity.metrics.iter() {
        object.insert(name.clone(), Value::from(*value));
    }
    for (key, value) in &entity.tags {
        object.insert(format!("tag.{key}"), Value::from(value.clone()));
    }
    event
}

fn relationship_to_event(relationship: &Relationship) -> Value {
    json!({
        "eventType": "MessageQueueRelationship",
        "source": relationship.source_guid,
        "type": relationship.label.as_str(),
        "target": relationship.target_guid,
    })
}
