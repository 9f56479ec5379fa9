use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity::EntityId;

pub const HOOK_STATUSES: &[&str] = &["available", "active", "completed", "failed", "expired"];

/// An adventure hook: a rumor players hear, the truth behind it, and the
/// people and places it touches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hook {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rumor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_npc_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_location_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_npc_id: Option<EntityId>,
    #[serde(default)]
    pub involved_npc_ids: Vec<EntityId>,
    #[serde(default)]
    pub involved_location_ids: Vec<EntityId>,
    #[serde(default)]
    pub involved_faction_ids: Vec<EntityId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Hook {
    pub fn involves_location(&self, id: &EntityId) -> bool {
        self.involved_location_ids.contains(id)
    }
}
