/// Canon: authored substitutes for non-conforming factions and clocks, the
/// name-keyed faction relationship table, and optional content pools.

use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use thiserror::Error;

use crate::core::content::ContentPools;
use crate::core::normalize::{fill_clock_defaults, Normalizer};
use crate::schema::entity::{EntityId, EntityKind};
use crate::schema::faction::{
    AgendaGoal, Clock, ClockConsequence, ClockTrigger, ConsequenceKind, Faction, FactionArchetype,
    FactionLair, FactionStatus, FactionType, GoalStatus, OwnerType,
};
use crate::schema::relationship::RelationKind;

#[derive(Debug, Error)]
pub enum CanonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("duplicate canon {kind} id `{id}`")]
    DuplicateId { kind: &'static str, id: String },
    #[error("canon {kind} `{id}` does not fit the schema: {reason}")]
    Invalid {
        kind: &'static str,
        id: String,
        reason: String,
    },
}

/// Declared relationships of one faction, keyed by the other faction's
/// name.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CanonRelations {
    #[serde(default)]
    pub hostile: Vec<String>,
    #[serde(default)]
    pub rival: Vec<String>,
    #[serde(default)]
    pub allied: Vec<String>,
}

impl CanonRelations {
    /// Every declared pair in emission order: hostile, rival, allied.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, RelationKind)> {
        self.hostile
            .iter()
            .map(|n| (n.as_str(), RelationKind::Hostile))
            .chain(self.rival.iter().map(|n| (n.as_str(), RelationKind::Rival)))
            .chain(self.allied.iter().map(|n| (n.as_str(), RelationKind::Allied)))
    }
}

/// Authoring shape of a canonical faction. The canon file uses a flatter
/// shape than the world schema: agenda entries are plain descriptions and
/// the lair is a bare dungeon id.
#[derive(Debug, Clone, Deserialize)]
struct CanonFaction {
    id: String,
    name: String,
    #[serde(default)]
    replaces: Vec<String>,
    #[serde(default)]
    description: Option<String>,
    archetype: FactionArchetype,
    faction_type: FactionType,
    #[serde(default)]
    purpose: Option<String>,
    #[serde(default)]
    scale: Option<String>,
    agenda: Vec<String>,
    #[serde(default)]
    territory_ids: Vec<String>,
    #[serde(default)]
    influence_ids: Vec<String>,
    #[serde(default)]
    headquarters_id: Option<String>,
    #[serde(default)]
    lair_dungeon_id: Option<String>,
    #[serde(default)]
    npc_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
enum CanonTrigger {
    Time(u32),
    Event(Vec<String>),
    Manual,
}

#[derive(Debug, Clone, Deserialize)]
struct CanonClock {
    id: String,
    name: String,
    #[serde(default)]
    replaces: Vec<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "default_segments")]
    segments: u32,
    #[serde(default)]
    filled: u32,
    #[serde(default)]
    owner_id: Option<String>,
    #[serde(default)]
    trigger: Option<CanonTrigger>,
    #[serde(default)]
    consequences: Vec<String>,
}

fn default_segments() -> u32 {
    6
}

#[derive(Debug, Clone, Deserialize)]
struct CanonFile {
    #[serde(default)]
    fallback_npc_id: Option<String>,
    #[serde(default)]
    factions: Vec<CanonFaction>,
    #[serde(default)]
    clocks: Vec<CanonClock>,
    #[serde(default)]
    relationships: FxHashMap<String, CanonRelations>,
    #[serde(default)]
    pools: Option<ContentPools>,
}

/// A substitute plus the ids and names of the records it stands in for.
#[derive(Debug, Clone, PartialEq)]
pub struct Substitute<T> {
    pub record: T,
    pub replaces: Vec<String>,
}

impl<T> Substitute<T> {
    fn matches(&self, own_id: &EntityId, own_name: Option<&str>, id: Option<&EntityId>, name: Option<&str>) -> bool {
        let by_id = id.is_some_and(|id| id == own_id || self.replaces.iter().any(|r| r == id.as_str()));
        let by_name = name.is_some_and(|name| own_name == Some(name) || self.replaces.iter().any(|r| r == name));
        by_id || by_name
    }
}

/// Loaded canon. Empty by default: no substitutes, no relationship table,
/// no fallback NPC.
#[derive(Debug, Clone, Default)]
pub struct Canon {
    pub fallback_npc_id: Option<EntityId>,
    factions: Vec<Substitute<Faction>>,
    clocks: Vec<Substitute<Clock>>,
    relationships: FxHashMap<String, CanonRelations>,
    pools: Option<ContentPools>,
}

impl Canon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_ron(path: &Path) -> Result<Self, CanonError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<Self, CanonError> {
        let file: CanonFile = ron::from_str(input)?;
        let mut canon = Canon {
            fallback_npc_id: file.fallback_npc_id.map(EntityId),
            relationships: file.relationships,
            pools: file.pools,
            ..Canon::default()
        };
        for faction in file.factions {
            canon.add_faction(faction.replaces.clone(), convert_faction(faction))?;
        }
        for clock in file.clocks {
            let replaces = clock.replaces.clone();
            let mut record = convert_clock(clock);
            let owner = record
                .owner_id
                .as_ref()
                .and_then(|id| canon.faction_by_id(id));
            fill_clock_defaults(&mut record, owner);
            canon.add_clock(replaces, record)?;
        }
        Ok(canon)
    }

    /// Register a substitute faction. It goes through the faction
    /// migrations so it matches what normalization makes of a document
    /// faction.
    pub fn add_faction(&mut self, replaces: Vec<String>, faction: Faction) -> Result<(), CanonError> {
        if self.factions.iter().any(|s| s.record.id == faction.id) {
            return Err(CanonError::DuplicateId {
                kind: "faction",
                id: faction.id.0,
            });
        }
        let faction = Normalizer::migrate(EntityKind::Faction, faction).map_err(|q| CanonError::Invalid {
            kind: "faction",
            id: q.label().0,
            reason: q.reason,
        })?;
        self.factions.push(Substitute {
            record: faction,
            replaces,
        });
        Ok(())
    }

    pub fn add_clock(&mut self, replaces: Vec<String>, clock: Clock) -> Result<(), CanonError> {
        if self.clocks.iter().any(|s| s.record.id == clock.id) {
            return Err(CanonError::DuplicateId {
                kind: "clock",
                id: clock.id.0,
            });
        }
        self.clocks.push(Substitute { record: clock, replaces });
        Ok(())
    }

    pub fn set_relations(&mut self, faction_name: impl Into<String>, relations: CanonRelations) {
        self.relationships.insert(faction_name.into(), relations);
    }

    fn faction_by_id(&self, id: &EntityId) -> Option<&Faction> {
        self.factions
            .iter()
            .map(|s| &s.record)
            .find(|f| &f.id == id)
    }

    /// The canonical faction standing in for a record with this id or name.
    pub fn faction_substitute(&self, id: Option<&EntityId>, name: Option<&str>) -> Option<&Faction> {
        self.factions
            .iter()
            .find(|s| s.matches(&s.record.id, Some(s.record.name.as_str()), id, name))
            .map(|s| &s.record)
    }

    pub fn clock_substitute(&self, id: Option<&EntityId>, name: Option<&str>) -> Option<&Clock> {
        self.clocks
            .iter()
            .find(|s| s.matches(&s.record.id, s.record.name.as_deref(), id, name))
            .map(|s| &s.record)
    }

    pub fn relations_for(&self, faction_name: &str) -> Option<&CanonRelations> {
        self.relationships.get(faction_name)
    }

    pub fn has_relationship_table(&self) -> bool {
        !self.relationships.is_empty()
    }

    pub fn pools(&self) -> Option<&ContentPools> {
        self.pools.as_ref()
    }

    pub fn faction_count(&self) -> usize {
        self.factions.len()
    }
}

fn convert_faction(raw: CanonFaction) -> Faction {
    let ids = |v: Vec<String>| v.into_iter().map(EntityId).collect::<Vec<_>>();
    let agenda = raw
        .agenda
        .into_iter()
        .enumerate()
        .map(|(i, description)| AgendaGoal {
            id: format!("{}-goal-{}", raw.id, i + 1),
            order: i as u32 + 1,
            description,
            status: if i == 0 {
                GoalStatus::InProgress
            } else {
                GoalStatus::Pending
            },
            addresses_obstacle: false,
            extra: Map::new(),
        })
        .collect();
    let mut extra = Map::new();
    for (key, value) in [
        ("description", raw.description),
        ("purpose", raw.purpose),
        ("scale", raw.scale),
    ] {
        if let Some(value) = value {
            extra.insert(key.to_string(), Value::String(value));
        }
    }
    Faction {
        id: EntityId(raw.id),
        name: raw.name,
        archetype: raw.archetype,
        faction_type: raw.faction_type,
        agenda,
        status: Some(FactionStatus::Active),
        relationships: Vec::new(),
        territory_ids: ids(raw.territory_ids),
        influence_ids: ids(raw.influence_ids),
        headquarters_id: raw.headquarters_id.map(EntityId),
        lair: raw.lair_dungeon_id.map(|d| FactionLair {
            dungeon_id: Some(EntityId(d)),
            extra: Map::new(),
        }),
        npc_ids: ids(raw.npc_ids),
        extra,
    }
}

fn convert_clock(raw: CanonClock) -> Clock {
    let trigger = raw.trigger.map(|t| match t {
        CanonTrigger::Time(days_per_tick) => ClockTrigger::Time { days_per_tick },
        CanonTrigger::Event(events) => ClockTrigger::Event { events },
        CanonTrigger::Manual => ClockTrigger::Manual,
    });
    let consequences = (!raw.consequences.is_empty()).then(|| {
        raw.consequences
            .into_iter()
            .map(|description| ClockConsequence {
                description,
                kind: ConsequenceKind::Event,
            })
            .collect()
    });
    let owner_type = Some(if raw.owner_id.is_some() {
        OwnerType::Faction
    } else {
        OwnerType::World
    });
    Clock {
        id: EntityId(raw.id),
        name: Some(raw.name),
        description: raw.description,
        segments: Some(raw.segments),
        filled: Some(raw.filled),
        owner_id: raw.owner_id.map(EntityId),
        owner_type,
        trigger,
        consequences,
        visible: None,
        paused: None,
        extra: Map::new(),
    }
}
