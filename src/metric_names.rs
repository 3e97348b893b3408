//! Canonical metric-name constants shared by the transformer, aggregator, and
//! synthesizer. Keeping them here instead of re-typing string literals in three
//! places is the one place a typo would otherwise cause a silent metric drop.

pub const BYTES_IN_PER_SECOND: &str = "bytesInPerSecond";
pub const BYTES_OUT_PER_SECOND: &str = "bytesOutPerSecond";
pub const MESSAGES_IN_PER_SECOND: &str = "messagesInPerSecond";
pub const PARTITION_COUNT: &str = "partitionCount";
pub const LEADER_PARTITIONS: &str = "leaderPartitions";
pub const UNDER_REPLICATED_PARTITIONS: &str = "underReplicatedPartitions";
pub const OFFLINE_PARTITIONS: &str = "offlinePartitions";
pub const REQUEST_RATE: &str = "requestRate";
pub const CPU_PERCENT: &str = "cpuPercent";
pub const MEMORY_PERCENT: &str = "memoryPercent";
pub const REQUEST_HANDLER_IDLE_PERCENT: &str = "requestHandlerIdlePercent";
pub const NETWORK_PROCESSOR_IDLE_PERCENT: &str = "networkProcessorIdlePercent";
pub const DISK_USAGE_PERCENT: &str = "diskUsagePercent";
pub const BROKER_ERROR_RATE: &str = "brokerErrorRate";

pub const TOPIC_COUNT: &str = "topicCount";
pub const CONSUMER_GROUP_COUNT: &str = "consumerGroupCount";
pub const AVAILABILITY_PERCENTAGE: &str = "availabilityPercentage";
pub const ERROR_RATE: &str = "errorRate";
pub const HEALTH_SCORE: &str = "healthScore";

pub const LAG: &str = "lag";
pub const CONSUMER_LAG: &str = "consumerLag";
