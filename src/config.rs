//! Validated, immutable pipeline configuration, loaded once at startup from
//! environment variables. Unlike the resilience primitives' hand-rolled error
//! enums (which predate `thiserror` in this crate's history and stay consistent
//! with themselves), `ConfigError` is new leaf surface with no such precedent, so
//! it uses the `thiserror` derive already in this crate's dependency table.

use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("{0} must be numeric, got {1:?}")]
    NotNumeric(String, String),
    #[error("API_KEY must start with `NRAK-`")]
    BadApiKeyPrefix,
    #[error("REGION must be `US` or `EU`, got {0:?}")]
    BadRegion(String),
    #[error("{0} must be non-negative, got {1}")]
    Negative(String, i64),
}

/// Tenant credential used for both upstream query auth and downstream ingest auth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        if raw.is_empty() {
            return Err(ConfigError::Missing("API_KEY"));
        }
        if !raw.starts_with("NRAK-") {
            return Err(ConfigError::BadApiKeyPrefix);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Us,
    Eu,
}

impl Region {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "US" => Ok(Region::Us),
            "EU" => Ok(Region::Eu),
            other => Err(ConfigError::BadRegion(other.to_string())),
        }
    }

    pub fn query_endpoint(&self) -> &'static str {
        match self {
            Region::Us => "https://api.newrelic.com/graphql",
            Region::Eu => "https://api.eu.newrelic.com/graphql",
        }
    }

    pub fn ingest_endpoint(&self, account_id: &str) -> String {
        match self {
            Region::Us => format!(
                "https://insights-collector.newrelic.com/v1/accounts/{account_id}/events"
            ),
            Region::Eu => format!(
                "https://insights-collector.eu01.nr-data.net/v1/accounts/{account_id}/events"
            ),
        }
    }
}

/// Threshold overrides for a single named circuit breaker (`CIRCUIT_BREAKER_*`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitBreakerOverrides {
    pub failure_threshold: usize,
    pub success_threshold: usize,
    pub operation_timeout: Duration,
    pub retry_delay: Duration,
    pub volume_threshold: usize,
}

impl Default for CircuitBreakerOverrides {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            operation_timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(30),
            volume_threshold: 10,
        }
    }
}

/// SLO threshold overrides (`ALERT_*_THRESHOLD`), defaulting to the standard warning/critical table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    pub cluster_health_warning: f64,
    pub cluster_health_critical: f64,
    pub broker_cpu_warning: f64,
    pub broker_cpu_critical: f64,
    pub topic_lag_warning: f64,
    pub topic_lag_critical: f64,
    pub consumer_group_lag_warning: f64,
    pub consumer_group_lag_critical: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            cluster_health_warning: 80.0,
            cluster_health_critical: 60.0,
            broker_cpu_warning: 80.0,
            broker_cpu_critical: 90.0,
            topic_lag_warning: 10_000.0,
            topic_lag_critical: 100_000.0,
            consumer_group_lag_warning: 50_000.0,
            consumer_group_lag_critical: 500_000.0,
        }
    }
}

/// Validated settings for one pipeline run, loaded once and treated as immutable
/// for the lifetime of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub account_id: String,
    pub api_key: ApiKey,
    pub region: Region,
    pub provider: String,
    pub monitoring_interval: Duration,
    pub lookback: Duration,
    pub operation_timeout: Duration,
    pub max_concurrent_operations: usize,
    pub health_check_interval: Duration,
    pub collector_breaker: CircuitBreakerOverrides,
    pub streamer_breaker: CircuitBreakerOverrides,
    pub alert_thresholds: AlertThresholds,
}

impl PipelineConfig {
    /// Load from `std::env`, applying defaults for any unset variable and
    /// returning a specific [`ConfigError`] on the first invalid value found.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Testable indirection over `std::env::var` so config-loading logic can run
    /// without mutating real process environment variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let account_id = lookup("ACCOUNT_ID").ok_or(ConfigError::Missing("ACCOUNT_ID"))?;
        if !account_id.bytes().all(|b| b.is_ascii_digit()) || account_id.is_empty() {
            return Err(ConfigError::NotNumeric("ACCOUNT_ID".to_string(), account_id));
        }

        let api_key = ApiKey::parse(&lookup("API_KEY").unwrap_or_default())?;

        let region = match lookup("REGION") {
            Some(r) => Region::parse(&r)?,
            None => Region::Us,
        };

        let provider = lookup("PROVIDER").unwrap_or_else(|| "kafka".to_string());

        let monitoring_interval =
            parse_millis(&lookup, "MONITORING_INTERVAL_MS", 60_000)?;
        let lookback = parse_minutes(&lookup, "LOOKBACK_MINUTES", 5)?;
        let operation_timeout = parse_millis(&lookup, "OPERATION_TIMEOUT_MS", 30_000)?;
        let max_concurrent_operations =
            parse_usize(&lookup, "MAX_CONCURRENT_OPERATIONS", 10)?.clamp(1, 100);
        let health_check_interval =
            parse_millis(&lookup, "HEALTH_CHECK_INTERVAL_MS", 30_000)?;

        let collector_breaker =
            parse_circuit_breaker_overrides(&lookup, "CIRCUIT_BREAKER_COLLECTOR", operation_timeout)?;
        let streamer_breaker =
            parse_circuit_breaker_overrides(&lookup, "CIRCUIT_BREAKER_STREAMER", operation_timeout)?;
        let alert_thresholds = parse_alert_thresholds(&lookup)?;

        Ok(Self {
            account_id,
            api_key,
            region,
            provider,
            monitoring_interval,
            lookback,
            operation_timeout,
            max_concurrent_operations,
            health_check_interval,
            collector_breaker,
            streamer_breaker,
            alert_thresholds,
        })
    }
}

/// Parses `{prefix}_FAILURE_THRESHOLD`, `{prefix}_SUCCESS_THRESHOLD`,
/// `{prefix}_OPERATION_TIMEOUT_MS`, `{prefix}_RETRY_DELAY_MS`, and
/// `{prefix}_VOLUME_THRESHOLD`, defaulting any unset one to
/// [`CircuitBreakerOverrides::default`] — except `operation_timeout`, whose
/// default is the top-level `OPERATION_TIMEOUT_MS` (§6), so a breaker without
/// its own override still follows the process-wide per-call timeout.
fn parse_circuit_breaker_overrides(
    lookup: &impl Fn(&str) -> Option<String>,
    prefix: &str,
    default_operation_timeout: Duration,
) -> Result<CircuitBreakerOverrides, ConfigError> {
    let defaults = CircuitBreakerOverrides::default();
    let failure_threshold = parse_usize_suffixed(
        lookup,
        prefix,
        "_FAILURE_THRESHOLD",
        defaults.failure_threshold,
    )?;
    let success_threshold = parse_usize_suffixed(
        lookup,
        prefix,
        "_SUCCESS_THRESHOLD",
        defaults.success_threshold,
    )?;
    let operation_timeout = parse_millis_suffixed(
        lookup,
        prefix,
        "_OPERATION_TIMEOUT_MS",
        default_operation_timeout.as_millis() as u64,
    )?;
    let retry_delay = parse_millis_suffixed(
        lookup,
        prefix,
        "_RETRY_DELAY_MS",
        defaults.retry_delay.as_millis() as u64,
    )?;
    let volume_threshold = parse_usize_suffixed(
        lookup,
        prefix,
        "_VOLUME_THRESHOLD",
        defaults.volume_threshold,
    )?;
    Ok(CircuitBreakerOverrides {
        failure_threshold,
        success_threshold,
        operation_timeout,
        retry_delay,
        volume_threshold,
    })
}

/// Parses the eight `ALERT_*_THRESHOLD` overrides from §6, defaulting any
/// unset one to the §4.6 SLO table ([`AlertThresholds::default`]).
fn parse_alert_thresholds(
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<AlertThresholds, ConfigError> {
    let defaults = AlertThresholds::default();
    Ok(AlertThresholds {
        cluster_health_warning: parse_f64(
            lookup,
            "ALERT_CLUSTER_HEALTH_WARNING_THRESHOLD",
            defaults.cluster_health_warning,
        )?,
        cluster_health_critical: parse_f64(
            lookup,
            "ALERT_CLUSTER_HEALTH_CRITICAL_THRESHOLD",
            defaults.cluster_health_critical,
        )?,
        broker_cpu_warning: parse_f64(
            lookup,
            "ALERT_BROKER_CPU_WARNING_THRESHOLD",
            defaults.broker_cpu_warning,
        )?,
        broker_cpu_critical: parse_f64(
            lookup,
            "ALERT_BROKER_CPU_CRITICAL_THRESHOLD",
            defaults.broker_cpu_critical,
        )?,
        topic_lag_warning: parse_f64(
            lookup,
            "ALERT_TOPIC_LAG_WARNING_THRESHOLD",
            defaults.topic_lag_warning,
        )?,
        topic_lag_critical: parse_f64(
            lookup,
            "ALERT_TOPIC_LAG_CRITICAL_THRESHOLD",
            defaults.topic_lag_critical,
        )?,
        consumer_group_lag_warning: parse_f64(
            lookup,
            "ALERT_CONSUMER_GROUP_LAG_WARNING_THRESHOLD",
            defaults.consumer_group_lag_warning,
        )?,
        consumer_group_lag_critical: parse_f64(
            lookup,
            "ALERT_CONSUMER_GROUP_LAG_CRITICAL_THRESHOLD",
            defaults.consumer_group_lag_critical,
        )?,
    })
}

fn parse_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default_ms: u64,
) -> Result<Duration, ConfigError> {
    Ok(Duration::from_millis(parse_u64(lookup, key, default_ms)?))
}

fn parse_minutes(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default_minutes: u64,
) -> Result<Duration, ConfigError> {
    Ok(Duration::from_secs(parse_u64(lookup, key, default_minutes)? * 60))
}

fn parse_usize(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    Ok(parse_u64(lookup, key, default as u64)? as usize)
}

fn parse_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => {
            let value: i64 = raw
                .parse()
                .map_err(|_| ConfigError::NotNumeric(key.to_string(), raw.clone()))?;
            if value < 0 {
                return Err(ConfigError::Negative(key.to_string(), value));
            }
            Ok(value as u64)
        }
    }
}

/// Parses `{prefix}{suffix}` as a `usize`, defaulting to `default` when unset.
fn parse_usize_suffixed(
    lookup: &impl Fn(&str) -> Option<String>,
    prefix: &str,
    suffix: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    parse_usize(lookup, &format!("{prefix}{suffix}"), default)
}

/// Parses `{prefix}{suffix}` as a millisecond count, defaulting to
/// `default_ms` when unset.
fn parse_millis_suffixed(
    lookup: &impl Fn(&str) -> Option<String>,
    prefix: &str,
    suffix: &str,
    default_ms: u64,
) -> Result<Duration, ConfigError> {
    parse_millis(lookup, &format!("{prefix}{suffix}"), default_ms)
}

/// Parses `key` as a non-negative `f64`, defaulting to `default` when unset.
fn parse_f64(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: f64,
) -> Result<f64, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => {
            let value: f64 = raw
                .parse()
                .map_err(|_| ConfigError::NotNumeric(key.to_string(), raw.clone()))?;
            if value < 0.0 {
                return Err(ConfigError::Negative(key.to_string(), value as i64));
            }
            Ok(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(map: HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> {
        move |key| map.get(key).map(|s| s.to_string())
    }

    #[test]
    fn missing_account_id_fails() {
        let lookup = lookup_from(HashMap::new());
        assert_eq!(PipelineConfig::from_lookup(lookup), Err(ConfigError::Missing("ACCOUNT_ID")));
    }

    #[test]
    fn bad_api_key_prefix_rejected() {
        let mut map = HashMap::new();
        map.insert("ACCOUNT_ID", "12345");
        map.insert("API_KEY", "wrong-prefix");
        let lookup = lookup_from(map);
        assert_eq!(PipelineConfig::from_lookup(lookup), Err(ConfigError::BadApiKeyPrefix));
    }

    #[test]
    fn defaults_applied_when_absent() {
        let mut map = HashMap::new();
        map.insert("ACCOUNT_ID", "12345");
        map.insert("API_KEY", "NRAK-abc123");
        let lookup = lookup_from(map);
        let config = PipelineConfig::from_lookup(lookup).unwrap();
        assert_eq!(config.region, Region::Us);
        assert_eq!(config.monitoring_interval, Duration::from_secs(60));
        assert_eq!(config.lookback, Duration::from_secs(300));
        assert_eq!(config.max_concurrent_operations, 10);
    }

    #[test]
    fn eu_region_selects_eu_endpoints() {
        let mut map = HashMap::new();
        map.insert("ACCOUNT_ID", "999");
        map.insert("API_KEY", "NRAK-xyz");
        map.insert("REGION", "EU");
        let lookup = lookup_from(map);
        let config = PipelineConfig::from_lookup(lookup).unwrap();
        assert_eq!(config.region, Region::Eu);
        assert!(config.region.query_endpoint().contains("eu.newrelic.com"));
        assert!(config.region.ingest_endpoint("999").contains("eu01.nr-data.net"));
    }

    #[test]
    fn invalid_region_rejected() {
        let mut map = HashMap::new();
        map.insert("ACCOUNT_ID", "1");
        map.insert("API_KEY", "NRAK-x");
        map.insert("REGION", "APAC");
        let lookup = lookup_from(map);
        assert!(matches!(PipelineConfig::from_lookup(lookup), Err(ConfigError::BadRegion(_))));
    }

    #[test]
    fn max_concurrent_operations_clamped_to_100() {
        let mut map = HashMap::new();
        map.insert("ACCOUNT_ID", "1");
        map.insert("API_KEY", "NRAK-x");
        map.insert("MAX_CONCURRENT_OPERATIONS", "500");
        let lookup = lookup_from(map);
        let config = PipelineConfig::from_lookup(lookup).unwrap();
        assert_eq!(config.max_concurrent_operations, 100);
    }

    #[test]
    fn circuit_breaker_overrides_default_when_unset() {
        let mut map = HashMap::new();
        map.insert("ACCOUNT_ID", "1");
        map.insert("API_KEY", "NRAK-x");
        let lookup = lookup_from(map);
        let config = PipelineConfig::from_lookup(lookup).unwrap();
        assert_eq!(config.collector_breaker, CircuitBreakerOverrides::default());
        assert_eq!(config.streamer_breaker, CircuitBreakerOverrides::default());
        assert_eq!(config.alert_thresholds, AlertThresholds::default());
    }

    #[test]
    fn collector_breaker_overrides_are_honored_independently_of_streamer() {
        let mut map = HashMap::new();
        map.insert("ACCOUNT_ID", "1");
        map.insert("API_KEY", "NRAK-x");
        map.insert("CIRCUIT_BREAKER_COLLECTOR_FAILURE_THRESHOLD", "9");
        map.insert("CIRCUIT_BREAKER_COLLECTOR_OPERATION_TIMEOUT_MS", "15000");
        let lookup = lookup_from(map);
        let config = PipelineConfig::from_lookup(lookup).unwrap();
        assert_eq!(config.collector_breaker.failure_threshold, 9);
        assert_eq!(config.collector_breaker.operation_timeout, Duration::from_secs(15));
        assert_eq!(
            config.collector_breaker.success_threshold,
            CircuitBreakerOverrides::default().success_threshold
        );
        assert_eq!(config.streamer_breaker, CircuitBreakerOverrides::default());
    }

    #[test]
    fn streamer_breaker_retry_delay_override_is_honored() {
        let mut map = HashMap::new();
        map.insert("ACCOUNT_ID", "1");
        map.insert("API_KEY", "NRAK-x");
        map.insert("CIRCUIT_BREAKER_STREAMER_RETRY_DELAY_MS", "60000");
        map.insert("CIRCUIT_BREAKER_STREAMER_VOLUME_THRESHOLD", "20");
        let lookup = lookup_from(map);
        let config = PipelineConfig::from_lookup(lookup).unwrap();
        assert_eq!(config.streamer_breaker.retry_delay, Duration::from_secs(60));
        assert_eq!(config.streamer_breaker.volume_threshold, 20);
    }

    #[test]
    fn alert_threshold_override_is_honored() {
        let mut map = HashMap::new();
        map.insert("ACCOUNT_ID", "1");
        map.insert("API_KEY", "NRAK-x");
        map.insert("ALERT_BROKER_CPU_WARNING_THRESHOLD", "75.5");
        map.insert("ALERT_TOPIC_LAG_CRITICAL_THRESHOLD", "250000");
        let lookup = lookup_from(map);
        let config = PipelineConfig::from_lookup(lookup).unwrap();
        assert_eq!(config.alert_thresholds.broker_cpu_warning, 75.5);
        assert_eq!(config.alert_thresholds.topic_lag_critical, 250_000.0);
        assert_eq!(
            config.alert_thresholds.cluster_health_warning,
            AlertThresholds::default().cluster_health_warning
        );
    }

    #[test]
    fn negative_alert_threshold_is_rejected() {
        let mut map = HashMap::new();
        map.insert("ACCOUNT_ID", "1");
        map.insert("API_KEY", "NRAK-x");
        map.insert("ALERT_BROKER_CPU_WARNING_THRESHOLD", "-1");
        let lookup = lookup_from(map);
        assert!(matches!(
            PipelineConfig::from_lookup(lookup),
            Err(ConfigError::Negative(_, _))
        ));
    }
}
