use serde::{Deserialize, Serialize};
use std::fmt;

/// Newtype wrapper for entity IDs. Opaque strings such as `npc-x8Kd2_aQ`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Every record type that carries an id and can be the source or target
/// of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Location,
    Npc,
    Faction,
    Clock,
    Hook,
    Item,
    CalendarEvent,
    Edge,
    Site,
}

impl EntityKind {
    /// Top-level collection key in the world document.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Location => "locations",
            Self::Npc => "npcs",
            Self::Faction => "factions",
            Self::Clock => "clocks",
            Self::Hook => "hooks",
            Self::Item => "significantItems",
            Self::CalendarEvent => "state.calendar",
            Self::Edge => "edges",
            Self::Site => "sites",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Location => "location",
            Self::Npc => "npc",
            Self::Faction => "faction",
            Self::Clock => "clock",
            Self::Hook => "hook",
            Self::Item => "item",
            Self::CalendarEvent => "event",
            Self::Edge => "edge",
            Self::Site => "site",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_is_transparent_on_the_wire() {
        let id = EntityId::new("npc-abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"npc-abc\"");
        let back: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn collection_keys() {
        assert_eq!(EntityKind::Item.collection(), "significantItems");
        assert_eq!(EntityKind::CalendarEvent.collection(), "state.calendar");
    }
}
