/// A directed, labeled edge between two entity GUIDs.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Relationship {
    pub source_guid: String,
    pub label: RelationshipLabel,
    pub target_guid: String,
}

impl Relationship {
    pub fn new(
        source_guid: impl Into<String>,
        label: RelationshipLabel,
        target_guid: impl Into<String>,
    ) -> Self {
        Self { source_guid: source_guid.into(), label, target_guid: target_guid.into() }
    }

    /// The inverse of `CONTAINS`/`CONTAINED_IN`, `MANAGES`/`MANAGED_BY`; other labels
    /// have no symmetric counterpart and return `None`.
    pub fn inverse(&self) -> Option<Relationship> {
        self.label.inverse().map(|inv| {
            Relationship::new(self.target_guid.clone(), inv, self.source_guid.clone())
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum RelationshipLabel {
    Contains,
    ContainedIn,
    Manages,
    ManagedBy,
    ConsumesFrom,
    ProducesTo,
    BelongsTo,
    CoordinatedBy,
}

impl RelationshipLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipLabel::Contains => "CONTAINS",
            RelationshipLabel::ContainedIn => "CONTAINED_IN",
            RelationshipLabel::Manages => "MANAGES",
            RelationshipLabel::ManagedBy => "MANAGED_BY",
            RelationshipLabel::ConsumesFrom => "CONSUMES_FROM",
            RelationshipLabel::ProducesTo => "PRODUCES_TO",
            RelationshipLabel::BelongsTo => "BELONGS_TO",
            RelationshipLabel::CoordinatedBy => "COORDINATED_BY",
        }
    }

    pub fn inverse(&self) -> Option<RelationshipLabel> {
        match self {
            RelationshipLabel::Contains => Some(RelationshipLabel::ContainedIn),
            RelationshipLabel::ContainedIn => Some(RelationshipLabel::Contains),
            RelationshipLabel::Manages => Some(RelationshipLabel::ManagedBy),
            RelationshipLabel::ManagedBy => Some(RelationshipLabel::Manages),
            _ => None,
        }
    }
}

impl std::fmt::Display for RelationshipLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
