use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity::EntityId;

/// Closed set of NPC archetypes.
pub const NPC_ARCHETYPES: &[&str] = &[
    "commoner", "bandit", "guard", "knight", "assassin", "witch", "priest", "noble", "merchant",
    "scholar", "thief", "cultist",
];

/// A non-player character. Only the reference-bearing fields are typed;
/// stats, personality and the rest pass through in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Npc {
    pub id: EntityId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faction_id: Option<EntityId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_faction_reads_as_none() {
        let npc: Npc = serde_json::from_value(json!({
            "id": "npc-1",
            "name": "Mira",
            "archetype": "healer",
            "factionId": null
        }))
        .unwrap();
        assert!(npc.faction_id.is_none());
        assert_eq!(npc.archetype.as_deref(), Some("healer"));
    }
}
