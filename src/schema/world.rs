use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity::EntityId;
use super::event::WorldState;
use super::faction::{Clock, Faction};
use super::hook::Hook;
use super::location::Location;
use super::npc::Npc;

/// A named artifact that may sit somewhere, be held by someone and be
/// coveted by factions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignificantItem {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder_id: Option<EntityId>,
    #[serde(default)]
    pub desired_by_faction_ids: Vec<EntityId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A road, river or border between hexes. Faction control is the only
/// reference it carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faction_id: Option<EntityId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Edge {
    pub fn label(&self, index: usize) -> EntityId {
        self.id
            .clone()
            .unwrap_or_else(|| EntityId(format!("edges[{index}]")))
    }
}

/// The whole dataset. Top-level keys the engine does not model (hexes,
/// dungeons, map metadata) pass through in `extra`. Optional collections
/// are only written when they hold something.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldDocument {
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub npcs: Vec<Npc>,
    #[serde(default)]
    pub factions: Vec<Faction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clocks: Vec<Clock>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<Hook>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub significant_items: Vec<SignificantItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<WorldState>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
