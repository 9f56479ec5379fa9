/// Schema normalizer: brings legacy and partially migrated records to the
/// canonical shape.
///
/// Field migrations are declared per entity kind as data and applied on the
/// JSON form of each record. Defaults that depend on other entities (a
/// clock's name comes from its owning faction) run afterwards on the typed
/// records, once the store can resolve owners.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::store::{EntityStore, Quarantined};
use crate::schema::entity::{EntityId, EntityKind};
use crate::schema::faction::{
    Clock, ClockConsequence, ClockTrigger, ConsequenceKind, Faction, OwnerType,
};
use crate::schema::npc::NPC_ARCHETYPES;

/// One declarative field migration.
#[derive(Debug, Clone, Copy)]
pub enum Migration {
    /// Move `from` to `to`. When `to` is already set the legacy key is
    /// simply dropped.
    Rename {
        from: &'static str,
        to: &'static str,
    },
    Drop(&'static str),
    /// Insert a computed value when the field is absent or null. The
    /// function sees the record's other fields.
    Default {
        field: &'static str,
        value: fn(&Map<String, Value>) -> Value,
    },
}

fn six(_: &Map<String, Value>) -> Value {
    Value::from(6)
}

fn zero(_: &Map<String, Value>) -> Value {
    Value::from(0)
}

fn yes(_: &Map<String, Value>) -> Value {
    Value::Bool(true)
}

fn no(_: &Map<String, Value>) -> Value {
    Value::Bool(false)
}

fn active(_: &Map<String, Value>) -> Value {
    Value::from("active")
}

fn available(_: &Map<String, Value>) -> Value {
    Value::from("available")
}

fn commoner(_: &Map<String, Value>) -> Value {
    Value::from("commoner")
}

/// Legacy `goals` list derived from the first agenda entry.
fn goals_from_agenda(record: &Map<String, Value>) -> Value {
    let first = record
        .get("agenda")
        .and_then(Value::as_array)
        .and_then(|a| a.first())
        .and_then(|g| g.get("description"))
        .cloned();
    match first {
        Some(description) => serde_json::json!([{ "description": description, "progress": 0 }]),
        None => Value::Array(Vec::new()),
    }
}

const CLOCK_MIGRATIONS: &[Migration] = &[
    Migration::Rename {
        from: "factionId",
        to: "ownerId",
    },
    Migration::Drop("type"),
    Migration::Drop("active"),
    Migration::Default {
        field: "segments",
        value: six,
    },
    Migration::Default {
        field: "filled",
        value: zero,
    },
    Migration::Default {
        field: "visible",
        value: yes,
    },
    Migration::Default {
        field: "paused",
        value: no,
    },
];

const EVENT_MIGRATIONS: &[Migration] = &[
    Migration::Rename {
        from: "factionId",
        to: "linkedFactionId",
    },
    Migration::Rename {
        from: "locationId",
        to: "linkedLocationId",
    },
];

const ITEM_MIGRATIONS: &[Migration] = &[Migration::Rename {
    from: "currentHolderId",
    to: "holderId",
}];

const FACTION_MIGRATIONS: &[Migration] = &[
    Migration::Default {
        field: "status",
        value: active,
    },
    Migration::Default {
        field: "goals",
        value: goals_from_agenda,
    },
];

const HOOK_MIGRATIONS: &[Migration] = &[Migration::Default {
    field: "status",
    value: available,
}];

const NPC_MIGRATIONS: &[Migration] = &[Migration::Default {
    field: "archetype",
    value: commoner,
}];

/// Out-of-set NPC archetypes and their canonical replacement.
const ARCHETYPE_REMAP: &[(&str, &str)] = &[
    ("artisan", "commoner"),
    ("sage", "scholar"),
    ("guardian", "guard"),
    ("scout", "thief"),
    ("trickster", "thief"),
    ("healer", "priest"),
    ("villain", "assassin"),
    ("warrior", "knight"),
];

const ARCHETYPE_FALLBACK: &str = "commoner";

pub const FACTION_FALLBACK_NAME: &str = "The faction";
pub const GOAL_FALLBACK: &str = "advance their agenda";

/// Counts of what a normalization run changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub migrated: usize,
    pub defaults: usize,
    pub remapped: usize,
    pub quarantined: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn migrations(kind: EntityKind) -> &'static [Migration] {
        match kind {
            EntityKind::Clock => CLOCK_MIGRATIONS,
            EntityKind::CalendarEvent => EVENT_MIGRATIONS,
            EntityKind::Item => ITEM_MIGRATIONS,
            EntityKind::Faction => FACTION_MIGRATIONS,
            EntityKind::Hook => HOOK_MIGRATIONS,
            EntityKind::Npc => NPC_MIGRATIONS,
            _ => &[],
        }
    }

    /// Field names that must not survive normalization.
    pub fn legacy_keys(kind: EntityKind) -> impl Iterator<Item = &'static str> {
        Self::migrations(kind).iter().filter_map(|m| match m {
            Migration::Rename { from, .. } => Some(*from),
            Migration::Drop(field) => Some(*field),
            Migration::Default { .. } => None,
        })
    }

    /// Map an NPC archetype onto the closed set. Total: unknown values
    /// fall back to `commoner`.
    pub fn remap_archetype(archetype: &str) -> &'static str {
        if let Some(valid) = NPC_ARCHETYPES.iter().find(|a| **a == archetype) {
            return valid;
        }
        ARCHETYPE_REMAP
            .iter()
            .find(|(from, _)| *from == archetype)
            .map(|(_, to)| *to)
            .unwrap_or(ARCHETYPE_FALLBACK)
    }

    /// Migrate one record built outside the document, so it carries the
    /// same derived fields as records that went through `run`.
    pub fn migrate<T: Serialize + DeserializeOwned>(kind: EntityKind, record: T) -> Result<T, Quarantined> {
        let migrated = migrate_record(kind, Self::migrations(kind), &record)?;
        Ok(migrated.unwrap_or(record))
    }

    /// Run every migration, then context defaults, then enum remaps.
    pub fn run(&self, store: &mut EntityStore) -> NormalizeStats {
        let mut stats = NormalizeStats::default();
        let mut quarantined = Vec::new();

        store.edit(|doc| {
            migrate_all(EntityKind::Clock, &mut doc.clocks, &mut quarantined, &mut stats);
            migrate_all(EntityKind::Item, &mut doc.significant_items, &mut quarantined, &mut stats);
            migrate_all(EntityKind::Faction, &mut doc.factions, &mut quarantined, &mut stats);
            migrate_all(EntityKind::Hook, &mut doc.hooks, &mut quarantined, &mut stats);
            migrate_all(EntityKind::Npc, &mut doc.npcs, &mut quarantined, &mut stats);
            for day in doc.state.iter_mut().flat_map(|s| s.calendar.iter_mut()) {
                migrate_all(EntityKind::CalendarEvent, &mut day.events, &mut quarantined, &mut stats);
            }
        });
        stats.quarantined = quarantined.len();
        for record in quarantined {
            tracing::warn!(kind = %record.kind, id = %record.label(), reason = %record.reason, "record no longer decodes after migration");
            store.push_quarantine(record);
        }

        let clock_defaults: Vec<(usize, Clock)> = store
            .document()
            .clocks
            .iter()
            .enumerate()
            .filter_map(|(i, clock)| {
                let mut filled = clock.clone();
                let owner = clock.owner_id.as_ref().and_then(|id| store.faction(id));
                (fill_clock_defaults(&mut filled, owner) > 0).then_some((i, filled))
            })
            .collect();
        stats.defaults += clock_defaults.len();

        store.edit(|doc| {
            for (i, clock) in clock_defaults {
                tracing::debug!(clock = %clock.id, "injected clock defaults");
                doc.clocks[i] = clock;
            }
            for npc in &mut doc.npcs {
                let Some(archetype) = npc.archetype.as_deref() else {
                    continue;
                };
                let canonical = Self::remap_archetype(archetype);
                if canonical != archetype {
                    tracing::debug!(npc = %npc.id, from = archetype, to = canonical, "remapped archetype");
                    npc.archetype = Some(canonical.to_string());
                    stats.remapped += 1;
                }
            }
        });

        stats
    }
}

/// Apply a migration table to one JSON record. Returns how many fields
/// changed.
pub fn apply_migrations(table: &[Migration], record: &mut Map<String, Value>) -> usize {
    let mut changed = 0;
    for migration in table {
        match *migration {
            Migration::Rename { from, to } => {
                if let Some(value) = record.remove(from) {
                    if record.get(to).map_or(true, Value::is_null) {
                        record.insert(to.to_string(), value);
                    }
                    changed += 1;
                }
            }
            Migration::Drop(field) => {
                if record.remove(field).is_some() {
                    changed += 1;
                }
            }
            Migration::Default { field, value } => {
                if record.get(field).map_or(true, Value::is_null) {
                    let v = value(record);
                    record.insert(field.to_string(), v);
                    changed += 1;
                }
            }
        }
    }
    changed
}

fn migrate_all<T: Serialize + DeserializeOwned>(
    kind: EntityKind,
    records: &mut Vec<T>,
    quarantined: &mut Vec<Quarantined>,
    stats: &mut NormalizeStats,
) {
    let table = Normalizer::migrations(kind);
    if table.is_empty() {
        return;
    }
    let mut kept = Vec::with_capacity(records.len());
    for record in records.drain(..) {
        match migrate_record(kind, table, &record) {
            Ok(None) => kept.push(record),
            Ok(Some(migrated)) => {
                stats.migrated += 1;
                kept.push(migrated);
            }
            Err(q) => quarantined.push(q),
        }
    }
    *records = kept;
}

fn migrate_record<T: Serialize + DeserializeOwned>(
    kind: EntityKind,
    table: &[Migration],
    record: &T,
) -> Result<Option<T>, Quarantined> {
    let value = serde_json::to_value(record).map_err(|e| Quarantined::new(kind, Value::Null, e.to_string()))?;
    let Value::Object(mut map) = value else {
        return Ok(None);
    };
    if apply_migrations(table, &mut map) == 0 {
        return Ok(None);
    }
    let raw = Value::Object(map);
    serde_json::from_value(raw.clone())
        .map(Some)
        .map_err(|e| Quarantined::new(kind, raw, e.to_string()))
}

fn owner_text(owner: Option<&Faction>) -> (String, String) {
    let name = owner
        .map(|f| f.name.clone())
        .unwrap_or_else(|| FACTION_FALLBACK_NAME.to_string());
    let goal = owner
        .and_then(Faction::current_goal)
        .map(|g| g.description.to_lowercase())
        .unwrap_or_else(|| GOAL_FALLBACK.to_string());
    (name, goal)
}

/// Fill every absent clock field. `owner` is the resolved owning faction,
/// if any. Returns how many fields were filled.
pub fn fill_clock_defaults(clock: &mut Clock, owner: Option<&Faction>) -> usize {
    let mut filled = 0;
    let owner_type = *clock.owner_type.get_or_insert_with(|| {
        filled += 1;
        if clock.owner_id.is_some() {
            OwnerType::Faction
        } else {
            OwnerType::World
        }
    });
    let (name, goal) = owner_text(owner);
    let world = owner_type == OwnerType::World;

    let mut fill = |slot_empty: bool| {
        if slot_empty {
            filled += 1;
        }
        slot_empty
    };
    if fill(clock.name.is_none()) {
        clock.name = Some(if world {
            "World Events".to_string()
        } else {
            format!("{name}'s Ambition")
        });
    }
    if fill(clock.description.is_none()) {
        clock.description = Some(if world {
            "Events unfold across the world".to_string()
        } else {
            format!("{name} is working to {goal}")
        });
    }
    if fill(clock.segments.is_none()) {
        clock.segments = Some(6);
    }
    if fill(clock.filled.is_none()) {
        clock.filled = Some(0);
    }
    if fill(clock.trigger.is_none()) {
        clock.trigger = Some(if world {
            ClockTrigger::Manual
        } else {
            ClockTrigger::Event {
                events: vec!["faction_action".to_string()],
            }
        });
    }
    if fill(clock.consequences.is_none()) {
        clock.consequences = Some(if world {
            Vec::new()
        } else {
            vec![ClockConsequence {
                description: format!("{name} advances its agenda significantly"),
                kind: ConsequenceKind::Event,
            }]
        });
    }
    if fill(clock.visible.is_none()) {
        clock.visible = Some(true);
    }
    if fill(clock.paused.is_none()) {
        clock.paused = Some(false);
    }
    filled
}

/// A fresh clock for a faction that owns none.
pub fn faction_clock(id: EntityId, faction: &Faction) -> Clock {
    let mut clock = Clock {
        id,
        name: None,
        description: None,
        segments: None,
        filled: None,
        owner_id: Some(faction.id.clone()),
        owner_type: Some(OwnerType::Faction),
        trigger: None,
        consequences: None,
        visible: None,
        paused: None,
        extra: Map::new(),
    };
    fill_clock_defaults(&mut clock, Some(faction));
    clock
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rules::{Rule, ShapeRule};
    use crate::core::validate::Validator;
    use serde_json::json;

    fn make_store() -> EntityStore {
        EntityStore::ingest(json!({
            "factions": [{
                "id": "faction-X", "name": "Tide Callers", "archetype": "religious", "factionType": "cult",
                "agenda": [{"id": "g1", "order": 1, "description": "Wake the Sleeping Tide", "status": "pending"}]
            }],
            "clocks": [
                {"id": "clock-1", "factionId": "faction-X", "type": "t", "active": true},
                {"id": "clock-w", "name": "Storm Season", "segments": 8, "filled": 2}
            ],
            "npcs": [
                {"id": "npc-1", "name": "Oro", "archetype": "healer"},
                {"id": "npc-2", "name": "Pim", "archetype": "dragon-tamer"},
                {"id": "npc-3", "name": "Sel"}
            ],
            "significantItems": [{"id": "item-1", "currentHolderId": "npc-1"}],
            "state": {"calendar": [{"day": 1, "events": [{"id": "ev-1", "factionId": "faction-X"}]}]}
        }))
        .unwrap()
    }

    #[test]
    fn remap_is_total() {
        assert_eq!(Normalizer::remap_archetype("guard"), "guard");
        assert_eq!(Normalizer::remap_archetype("sage"), "scholar");
        assert_eq!(Normalizer::remap_archetype("warrior"), "knight");
        assert_eq!(Normalizer::remap_archetype("anything else"), "commoner");
    }

    #[test]
    fn rename_prefers_existing_target() {
        let mut record = json!({"factionId": "a", "ownerId": "b"}).as_object().cloned().unwrap();
        assert_eq!(apply_migrations(CLOCK_MIGRATIONS, &mut record), 5);
        assert_eq!(record["ownerId"], "b");
        assert!(!record.contains_key("factionId"));
    }

    #[test]
    fn legacy_clock_becomes_canonical() {
        let mut store = make_store();
        Normalizer.run(&mut store);
        let clock = store.clock(&"clock-1".into()).unwrap();
        assert_eq!(clock.owner_id, Some(EntityId::from("faction-X")));
        assert_eq!(clock.owner_type, Some(OwnerType::Faction));
        assert_eq!(clock.name.as_deref(), Some("Tide Callers's Ambition"));
        assert_eq!(
            clock.description.as_deref(),
            Some("Tide Callers is working to wake the sleeping tide")
        );
        assert!(matches!(clock.trigger, Some(ClockTrigger::Event { ref events }) if !events.is_empty()));
        assert!(!clock.consequences.as_ref().unwrap().is_empty());
        assert!(!clock.extra.contains_key("factionId"));
        assert!(!clock.extra.contains_key("type"));
        assert!(!clock.extra.contains_key("active"));
    }

    #[test]
    fn ownerless_clock_becomes_world_clock() {
        let mut store = make_store();
        Normalizer.run(&mut store);
        let clock = store.clock(&"clock-w".into()).unwrap();
        assert_eq!(clock.owner_type, Some(OwnerType::World));
        assert_eq!(clock.trigger, Some(ClockTrigger::Manual));
        assert_eq!(clock.consequences, Some(Vec::new()));
        assert_eq!(clock.name.as_deref(), Some("Storm Season"));
        assert_eq!(clock.filled, Some(2));
    }

    #[test]
    fn npc_archetypes_are_remapped_and_defaulted() {
        let mut store = make_store();
        let stats = Normalizer.run(&mut store);
        let archetype = |id: &str| store.npc(&id.into()).unwrap().archetype.clone();
        assert_eq!(archetype("npc-1").as_deref(), Some("priest"));
        assert_eq!(archetype("npc-2").as_deref(), Some("commoner"));
        assert_eq!(archetype("npc-3").as_deref(), Some("commoner"));
        assert_eq!(stats.remapped, 2);
    }

    #[test]
    fn renames_items_and_events() {
        let mut store = make_store();
        Normalizer.run(&mut store);
        let doc = store.document();
        assert_eq!(doc.significant_items[0].holder_id, Some(EntityId::from("npc-1")));
        let ev = &doc.state.as_ref().unwrap().calendar[0].events[0];
        assert_eq!(ev.linked_faction_id, Some(EntityId::from("faction-X")));
    }

    #[test]
    fn normalization_is_idempotent_and_clears_legacy_issues() {
        let mut store = make_store();
        Normalizer.run(&mut store);
        let once = serde_json::to_value(store.document()).unwrap();
        let stats = Normalizer.run(&mut store);
        assert_eq!(stats, NormalizeStats::default());
        assert_eq!(serde_json::to_value(store.document()).unwrap(), once);
        assert!(Validator::check(&store, Rule::Shape(ShapeRule::LegacyFields)).is_empty());
    }

    #[test]
    fn undecodable_after_migration_is_quarantined() {
        let mut store = EntityStore::ingest(json!({"clocks": [{"id": "clock-1", "factionId": 7}]})).unwrap();
        let stats = Normalizer.run(&mut store);
        assert_eq!(stats.quarantined, 1);
        assert!(store.document().clocks.is_empty());
        assert_eq!(store.quarantine()[0].kind, EntityKind::Clock);
    }
}
