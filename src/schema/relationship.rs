use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::entity::EntityId;

/// Disposition of one faction toward another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Allied,
    Friendly,
    Neutral,
    Rival,
    Hostile,
    War,
}

impl RelationKind {
    /// Stock justification used when a relationship is rebuilt from the
    /// canonical table.
    pub fn default_reason(&self) -> &'static str {
        match self {
            Self::Hostile | Self::War => "Ancient enmity",
            Self::Rival => "Competing interests",
            _ => "Shared goals",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Allied => "allied",
            Self::Friendly => "friendly",
            Self::Neutral => "neutral",
            Self::Rival => "rival",
            Self::Hostile => "hostile",
            Self::War => "war",
        };
        f.write_str(s)
    }
}

/// A typed, directional edge from the owning faction to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactionRelationship {
    pub faction_id: EntityId,
    #[serde(rename = "type")]
    pub kind: RelationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FactionRelationship {
    pub fn new(faction_id: EntityId, kind: RelationKind) -> Self {
        Self {
            faction_id,
            kind,
            reason: Some(kind.default_reason().to_string()),
            extra: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationship_creation() {
        let rel = FactionRelationship::new(EntityId::from("faction-b"), RelationKind::Hostile);
        assert_eq!(rel.reason.as_deref(), Some("Ancient enmity"));
        let json = serde_json::to_value(&rel).unwrap();
        assert_eq!(json["type"], "hostile");
        assert_eq!(json["factionId"], "faction-b");
    }

    #[test]
    fn unknown_kind_fails_to_decode() {
        let raw = serde_json::json!({"factionId": "f", "type": "frenemy"});
        assert!(serde_json::from_value::<FactionRelationship>(raw).is_err());
    }
}
