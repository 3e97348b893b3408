use std::collections::BTreeMap;

/// A raw telemetry sample produced by the collector, opaque to every later stage
/// except the transformer.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RawSample {
    pub event_type: EventType,
    pub timestamp_millis: i64,
    pub cluster_name: String,
    /// Free-form vendor field name -> value. Values are either numeric or string;
    /// we store both as strings and let the transformer coerce, since the upstream
    /// query API returns JSON scalars of mixed type for the same field across rows.
    pub fields: BTreeMap<String, RawValue>,
    /// Identity fields the transformer uses to derive `TransformedMetrics::identifiers`
    /// (e.g. `brokerId`, `topicName`, `consumerGroupId`).
    pub identity: BTreeMap<String, String>,
}

impl RawSample {
    pub fn new(event_type: EventType, cluster_name: impl Into<String>, timestamp_millis: i64) -> Self {
        Self {
            event_type,
            timestamp_millis,
            cluster_name: cluster_name.into(),
            fields: BTreeMap::new(),
            identity: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: RawValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn with_identity(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.identity.insert(key.into(), value.into());
        self
    }

    pub fn field_f64(&self, name: &str) -> Option<f64> {
        match self.fields.get(name)? {
            RawValue::Number(n) => Some(*n),
            RawValue::Text(s) => s.parse::<f64>().ok(),
        }
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        match self.fields.get(name)? {
            RawValue::Text(s) => Some(s.as_str()),
            RawValue::Number(_) => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.cluster_name.is_empty()
    }
}

/// A scalar value as returned by the upstream query API: either numeric or string.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Number(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::Text(v.to_string())
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        RawValue::Text(v)
    }
}

/// The kind of record a `RawSample` carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Broker,
    Topic,
    ConsumerGroup,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Broker => "BROKER",
            EventType::Topic => "TOPIC",
            EventType::ConsumerGroup => "CONSUMER_GROUP",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_cluster_name() {
        let sample = RawSample::new(EventType::Broker, "", 0);
        assert!(!sample.is_valid());
    }

    #[test]
    fn field_f64_parses_text_numbers() {
        let sample = RawSample::new(EventType::Broker, "clusterA", 0)
            .with_field("BytesInPerSec", RawValue::from("123.5"));
        assert_eq!(sample.field_f64("BytesInPerSec"), Some(123.5));
    }
}
