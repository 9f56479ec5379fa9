use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity::EntityId;
use super::relationship::FactionRelationship;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactionArchetype {
    Criminal,
    Religious,
    Political,
    Mercantile,
    Military,
    Arcane,
    Tribal,
    Monstrous,
    Secret,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactionType {
    Cult,
    Militia,
    Syndicate,
    Guild,
    Tribe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactionStatus {
    Active,
    Destroyed,
    Disbanded,
    Underground,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// One step of a faction's progressive agenda.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgendaGoal {
    pub id: String,
    pub order: u32,
    pub description: String,
    pub status: GoalStatus,
    #[serde(default)]
    pub addresses_obstacle: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactionLair {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dungeon_id: Option<EntityId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An organization with an agenda. Records whose categorical fields fail
/// to decode are non-conforming and get replaced wholesale during repair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Faction {
    pub id: EntityId,
    pub name: String,
    pub archetype: FactionArchetype,
    pub faction_type: FactionType,
    pub agenda: Vec<AgendaGoal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FactionStatus>,
    #[serde(default)]
    pub relationships: Vec<FactionRelationship>,
    #[serde(default)]
    pub territory_ids: Vec<EntityId>,
    #[serde(default)]
    pub influence_ids: Vec<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headquarters_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lair: Option<FactionLair>,
    #[serde(default)]
    pub npc_ids: Vec<EntityId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Faction {
    /// The goal the faction is currently pursuing: lowest-order agenda
    /// entry that is not finished.
    pub fn current_goal(&self) -> Option<&AgendaGoal> {
        self.agenda
            .iter()
            .filter(|g| matches!(g.status, GoalStatus::Pending | GoalStatus::InProgress))
            .min_by_key(|g| g.order)
            .or_else(|| self.agenda.iter().min_by_key(|g| g.order))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerType {
    Faction,
    World,
}

/// What advances a clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClockTrigger {
    Time {
        #[serde(rename = "daysPerTick")]
        days_per_tick: u32,
    },
    Event {
        events: Vec<String>,
    },
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsequenceKind {
    Event,
    StateChange,
    Spawn,
    Destroy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockConsequence {
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ConsequenceKind,
}

/// A progress clock. Every canonical field except the id is optional at
/// decode time so that partially migrated records still load; the
/// validator reports each missing field and normalization fills them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clock {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_type: Option<OwnerType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<ClockTrigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consequences: Option<Vec<ClockConsequence>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Clock {
    pub fn is_owned_by(&self, faction: &EntityId) -> bool {
        self.owner_type != Some(OwnerType::World) && self.owner_id.as_ref() == Some(faction)
    }

    /// The offending field and why, when segments or filled are out of
    /// range.
    pub fn counter_fault(&self) -> Option<(&'static str, String)> {
        match (self.segments, self.filled) {
            (Some(0), _) => Some(("segments", "clock has zero segments".to_string())),
            (Some(segments), Some(filled)) if filled > segments => {
                Some(("filled", format!("filled {filled} exceeds {segments} segments")))
            }
            _ => None,
        }
    }

    /// The offending field and why, when ownerType and ownerId disagree.
    pub fn ownership_fault(&self) -> Option<(&'static str, String)> {
        match (self.owner_type, &self.owner_id) {
            (Some(OwnerType::Faction), None) => Some(("ownerId", "faction clock has no owner".to_string())),
            (Some(OwnerType::World), Some(owner)) => Some(("ownerId", format!("world clock names owner `{owner}`"))),
            _ => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        self.counter_fault().is_some() || self.ownership_fault().is_some()
    }
}
