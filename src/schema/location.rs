use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity::EntityId;

/// Closed set of location types.
pub const LOCATION_TYPES: &[&str] = &["settlement", "dungeon", "landmark", "wilderness"];

/// A place on the map. Settlements carry npc rosters, sites, notices,
/// rumors and lore; other location types usually omit those keys, and
/// their absence survives a round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: EntityId,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npc_ids: Option<Vec<EntityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mayor_npc_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sites: Option<Vec<Site>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notices: Option<Vec<Notice>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rumors: Option<Vec<Rumor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lore: Option<Lore>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Location {
    pub fn is_settlement(&self) -> bool {
        self.kind == "settlement"
    }

    pub fn is_dungeon(&self) -> bool {
        self.kind == "dungeon"
    }

    pub fn npc_ids(&self) -> &[EntityId] {
        self.npc_ids.as_deref().unwrap_or(&[])
    }

    pub fn sites(&self) -> &[Site] {
        self.sites.as_deref().unwrap_or(&[])
    }

    pub fn rumors(&self) -> &[Rumor] {
        self.rumors.as_deref().unwrap_or(&[])
    }

    pub fn notices(&self) -> &[Notice] {
        self.notices.as_deref().unwrap_or(&[])
    }

    pub fn secrets(&self) -> &[Secret] {
        self.lore.as_ref().map(|l| l.secrets.as_slice()).unwrap_or(&[])
    }

    /// Ids of every generated sub-record (notices, rumors, secrets).
    pub fn content_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.notices()
            .iter()
            .map(|n| &n.id)
            .chain(self.rumors().iter().map(|r| &r.id))
            .chain(self.secrets().iter().map(|s| &s.id))
    }
}

/// A named business or landmark inside a settlement, owned by an NPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: EntityId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<EntityId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rumor {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_true: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_hook_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_location_id: Option<EntityId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Settlement lore. Only the secrets list is interpreted; history and any
/// other keys ride along untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lore {
    #[serde(default)]
    pub secrets: Vec<Secret>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered: Option<bool>,
    #[serde(default)]
    pub involved_site_ids: Vec<EntityId>,
    #[serde(default)]
    pub involved_npc_ids: Vec<EntityId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dungeon_without_settlement_keys_round_trips() {
        let raw = json!({"id": "loc-d", "name": "Deep Hole", "type": "dungeon", "depth": 3});
        let loc: Location = serde_json::from_value(raw.clone()).unwrap();
        assert!(loc.is_dungeon());
        assert!(loc.npc_ids().is_empty());
        assert_eq!(serde_json::to_value(&loc).unwrap(), raw);
    }

    #[test]
    fn lore_keeps_history() {
        let raw = json!({
            "id": "loc-s",
            "name": "Town",
            "type": "settlement",
            "npcIds": ["npc-a"],
            "lore": {"history": {"age": "old"}, "secrets": []}
        });
        let loc: Location = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(loc.npc_ids(), &[EntityId::from("npc-a")]);
        assert_eq!(serde_json::to_value(&loc).unwrap(), raw);
    }
}
