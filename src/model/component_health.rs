/// Liveness record for one registered component.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub component_type: String,
    pub status: HealthStatus,
    pub critical: bool,
    pub last_check_millis: i64,
    pub last_error: Option<String>,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, component_type: impl Into<String>, critical: bool) -> Self {
        Self {
            name: name.into(),
            component_type: component_type.into(),
            status: HealthStatus::Unknown,
            critical,
            last_check_millis: 0,
            last_error: None,
        }
    }
}

/// Liveness of a single component, or of the system as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    CircuitOpen,
    Unknown,
}
