/// Entity store: owns the world document and one id index per entity type.
///
/// All mutation goes through `edit`, which rebuilds every index when the
/// closure returns, so a repair phase can never observe a stale index left
/// behind by the previous one.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::schema::entity::{EntityId, EntityKind};
use crate::schema::event::{DayRecord, WorldState};
use crate::schema::faction::{Clock, Faction};
use crate::schema::hook::Hook;
use crate::schema::location::{Location, Site};
use crate::schema::npc::Npc;
use crate::schema::world::{SignificantItem, WorldDocument};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("world document root must be a JSON object")]
    NotAnObject,
    #[error("`{0}` must be an array")]
    NotAnArray(String),
    #[error("`state` must be a JSON object")]
    StateNotAnObject,
}

/// A record that could not be decoded into its typed form. Kept verbatim
/// so the validator can report it and repair can substitute it.
#[derive(Debug, Clone, PartialEq)]
pub struct Quarantined {
    pub kind: EntityKind,
    pub id: Option<EntityId>,
    pub name: Option<String>,
    pub raw: Value,
    pub reason: String,
}

impl Quarantined {
    pub fn new(kind: EntityKind, raw: Value, reason: impl Into<String>) -> Self {
        let id = raw
            .get("id")
            .and_then(Value::as_str)
            .map(EntityId::from);
        let name = raw
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string);
        Self {
            kind,
            id,
            name,
            raw,
            reason: reason.into(),
        }
    }

    /// Identifier used in reports when the record had no readable id.
    pub fn label(&self) -> EntityId {
        self.id
            .clone()
            .unwrap_or_else(|| EntityId(format!("<unnamed {}>", self.kind)))
    }
}

/// A resolved reference target.
#[derive(Debug, Clone, Copy)]
pub enum EntityRef<'a> {
    Location(&'a Location),
    Npc(&'a Npc),
    Faction(&'a Faction),
    Clock(&'a Clock),
    Hook(&'a Hook),
    Item(&'a SignificantItem),
    Site {
        location: &'a Location,
        site: &'a Site,
    },
}

#[derive(Debug, Default)]
struct Indices {
    locations: FxHashMap<EntityId, usize>,
    npcs: FxHashMap<EntityId, usize>,
    factions: FxHashMap<EntityId, usize>,
    clocks: FxHashMap<EntityId, usize>,
    hooks: FxHashMap<EntityId, usize>,
    items: FxHashMap<EntityId, usize>,
    /// site id -> (location position, site position)
    sites: FxHashMap<EntityId, (usize, usize)>,
    duplicates: Vec<(EntityKind, EntityId)>,
}

fn index_ids<'a>(
    kind: EntityKind,
    ids: impl Iterator<Item = &'a EntityId>,
    duplicates: &mut Vec<(EntityKind, EntityId)>,
) -> FxHashMap<EntityId, usize> {
    let mut map = FxHashMap::default();
    for (pos, id) in ids.enumerate() {
        // first occurrence wins
        if map.contains_key(id) {
            duplicates.push((kind, id.clone()));
        } else {
            map.insert(id.clone(), pos);
        }
    }
    map
}

impl Indices {
    fn build(doc: &WorldDocument) -> Self {
        let mut duplicates = Vec::new();
        let locations = index_ids(
            EntityKind::Location,
            doc.locations.iter().map(|l| &l.id),
            &mut duplicates,
        );
        let npcs = index_ids(EntityKind::Npc, doc.npcs.iter().map(|n| &n.id), &mut duplicates);
        let factions = index_ids(
            EntityKind::Faction,
            doc.factions.iter().map(|f| &f.id),
            &mut duplicates,
        );
        let clocks = index_ids(EntityKind::Clock, doc.clocks.iter().map(|c| &c.id), &mut duplicates);
        let hooks = index_ids(EntityKind::Hook, doc.hooks.iter().map(|h| &h.id), &mut duplicates);
        let items = index_ids(
            EntityKind::Item,
            doc.significant_items.iter().map(|i| &i.id),
            &mut duplicates,
        );

        let mut sites = FxHashMap::default();
        for (loc_pos, location) in doc.locations.iter().enumerate() {
            for (site_pos, site) in location.sites().iter().enumerate() {
                if sites.contains_key(&site.id) {
                    duplicates.push((EntityKind::Site, site.id.clone()));
                } else {
                    sites.insert(site.id.clone(), (loc_pos, site_pos));
                }
            }
        }

        Self {
            locations,
            npcs,
            factions,
            clocks,
            hooks,
            items,
            sites,
            duplicates,
        }
    }
}

/// Owns the world document, the ingest quarantine and the lookup indices.
#[derive(Debug)]
pub struct EntityStore {
    document: WorldDocument,
    quarantine: Vec<Quarantined>,
    index: Indices,
}

impl EntityStore {
    pub fn new(document: WorldDocument, quarantine: Vec<Quarantined>) -> Self {
        let index = Indices::build(&document);
        Self {
            document,
            quarantine,
            index,
        }
    }

    /// Decode a raw JSON world record by record. A record that does not
    /// decode is quarantined instead of failing the whole document.
    pub fn ingest(raw: Value) -> Result<Self, IngestError> {
        let Value::Object(mut root) = raw else {
            return Err(IngestError::NotAnObject);
        };
        let mut quarantine = Vec::new();

        let locations = decode_collection(&mut root, EntityKind::Location, &mut quarantine)?;
        let npcs = decode_collection(&mut root, EntityKind::Npc, &mut quarantine)?;
        let factions = decode_collection(&mut root, EntityKind::Faction, &mut quarantine)?;
        let clocks = decode_collection(&mut root, EntityKind::Clock, &mut quarantine)?;
        let hooks = decode_collection(&mut root, EntityKind::Hook, &mut quarantine)?;
        let significant_items = decode_collection(&mut root, EntityKind::Item, &mut quarantine)?;
        let edges = decode_collection(&mut root, EntityKind::Edge, &mut quarantine)?;
        let state = match root.remove("state") {
            None | Some(Value::Null) => None,
            Some(Value::Object(state)) => Some(decode_state(state, &mut quarantine)?),
            Some(_) => return Err(IngestError::StateNotAnObject),
        };

        let document = WorldDocument {
            locations,
            npcs,
            factions,
            clocks,
            hooks,
            significant_items,
            edges,
            state,
            extra: root,
        };
        tracing::debug!(
            locations = document.locations.len(),
            npcs = document.npcs.len(),
            factions = document.factions.len(),
            clocks = document.clocks.len(),
            quarantined = quarantine.len(),
            "ingested world document"
        );
        Ok(Self::new(document, quarantine))
    }

    pub fn document(&self) -> &WorldDocument {
        &self.document
    }

    pub fn into_document(self) -> WorldDocument {
        self.document
    }

    /// Apply a batch of mutations, then rebuild every index.
    pub fn edit<R>(&mut self, f: impl FnOnce(&mut WorldDocument) -> R) -> R {
        let result = f(&mut self.document);
        self.index = Indices::build(&self.document);
        result
    }

    pub fn quarantine(&self) -> &[Quarantined] {
        &self.quarantine
    }

    /// Remove and return the quarantined records of one kind.
    pub fn take_quarantine(&mut self, kind: EntityKind) -> Vec<Quarantined> {
        let (taken, kept) = std::mem::take(&mut self.quarantine)
            .into_iter()
            .partition(|q| q.kind == kind);
        self.quarantine = kept;
        taken
    }

    pub fn push_quarantine(&mut self, record: Quarantined) {
        self.quarantine.push(record);
    }

    /// Ids that occurred more than once within their type. The first
    /// occurrence is the one the index resolves to.
    pub fn duplicates(&self) -> &[(EntityKind, EntityId)] {
        &self.index.duplicates
    }

    pub fn resolve(&self, kind: EntityKind, id: &EntityId) -> Option<EntityRef<'_>> {
        let doc = &self.document;
        match kind {
            EntityKind::Location => self.location(id).map(EntityRef::Location),
            EntityKind::Npc => self.npc(id).map(EntityRef::Npc),
            EntityKind::Faction => self.faction(id).map(EntityRef::Faction),
            EntityKind::Clock => self.clock(id).map(EntityRef::Clock),
            EntityKind::Hook => self.hook(id).map(EntityRef::Hook),
            EntityKind::Item => self
                .index
                .items
                .get(id)
                .map(|&i| EntityRef::Item(&doc.significant_items[i])),
            EntityKind::Site => self.index.sites.get(id).map(|&(l, s)| {
                let location = &doc.locations[l];
                EntityRef::Site {
                    location,
                    site: &location.sites()[s],
                }
            }),
            EntityKind::CalendarEvent | EntityKind::Edge => None,
        }
    }

    pub fn contains(&self, kind: EntityKind, id: &EntityId) -> bool {
        self.resolve(kind, id).is_some()
    }

    pub fn location(&self, id: &EntityId) -> Option<&Location> {
        self.index.locations.get(id).map(|&i| &self.document.locations[i])
    }

    pub fn npc(&self, id: &EntityId) -> Option<&Npc> {
        self.index.npcs.get(id).map(|&i| &self.document.npcs[i])
    }

    pub fn faction(&self, id: &EntityId) -> Option<&Faction> {
        self.index.factions.get(id).map(|&i| &self.document.factions[i])
    }

    pub fn clock(&self, id: &EntityId) -> Option<&Clock> {
        self.index.clocks.get(id).map(|&i| &self.document.clocks[i])
    }

    pub fn hook(&self, id: &EntityId) -> Option<&Hook> {
        self.index.hooks.get(id).map(|&i| &self.document.hooks[i])
    }

    pub fn is_dungeon(&self, id: &EntityId) -> bool {
        self.location(id).is_some_and(Location::is_dungeon)
    }

    /// The location that owns a site.
    pub fn site_location(&self, site: &EntityId) -> Option<&EntityId> {
        self.index
            .sites
            .get(site)
            .map(|&(l, _)| &self.document.locations[l].id)
    }

    /// Every id of a kind, in document order. Used as the sampling pool so
    /// that seeded repairs are reproducible.
    pub fn all_ids(&self, kind: EntityKind) -> Vec<EntityId> {
        let doc = &self.document;
        match kind {
            EntityKind::Location => doc.locations.iter().map(|l| l.id.clone()).collect(),
            EntityKind::Npc => doc.npcs.iter().map(|n| n.id.clone()).collect(),
            EntityKind::Faction => doc.factions.iter().map(|f| f.id.clone()).collect(),
            EntityKind::Clock => doc.clocks.iter().map(|c| c.id.clone()).collect(),
            EntityKind::Hook => doc.hooks.iter().map(|h| h.id.clone()).collect(),
            EntityKind::Item => doc.significant_items.iter().map(|i| i.id.clone()).collect(),
            EntityKind::Site => doc
                .locations
                .iter()
                .flat_map(|l| l.sites().iter().map(|s| s.id.clone()))
                .collect(),
            EntityKind::CalendarEvent => doc
                .state
                .iter()
                .flat_map(|s| s.calendar.iter())
                .flat_map(|d| d.events.iter().filter_map(|e| e.id.clone()))
                .collect(),
            EntityKind::Edge => doc.edges.iter().filter_map(|e| e.id.clone()).collect(),
        }
    }

    /// Ids of dungeon locations, in document order.
    pub fn dungeon_ids(&self) -> Vec<EntityId> {
        self.document
            .locations
            .iter()
            .filter(|l| l.is_dungeon())
            .map(|l| l.id.clone())
            .collect()
    }

    /// Every id present anywhere in the document, sub-records included.
    /// Freshly minted ids must avoid all of them.
    pub fn used_ids(&self) -> FxHashSet<EntityId> {
        let doc = &self.document;
        let mut used: FxHashSet<EntityId> = FxHashSet::default();
        for kind in [
            EntityKind::Location,
            EntityKind::Npc,
            EntityKind::Faction,
            EntityKind::Clock,
            EntityKind::Hook,
            EntityKind::Item,
            EntityKind::Site,
            EntityKind::CalendarEvent,
            EntityKind::Edge,
        ] {
            used.extend(self.all_ids(kind));
        }
        for location in &doc.locations {
            used.extend(location.content_ids().cloned());
        }
        used.extend(self.quarantine.iter().filter_map(|q| q.id.clone()));
        used
    }
}

fn decode_collection<T: DeserializeOwned>(
    root: &mut Map<String, Value>,
    kind: EntityKind,
    quarantine: &mut Vec<Quarantined>,
) -> Result<Vec<T>, IngestError> {
    let key = kind.collection();
    match root.remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(decode_records(items, kind, quarantine)),
        Some(_) => Err(IngestError::NotAnArray(key.to_string())),
    }
}

fn decode_records<T: DeserializeOwned>(
    items: Vec<Value>,
    kind: EntityKind,
    quarantine: &mut Vec<Quarantined>,
) -> Vec<T> {
    let mut records = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<T>(item.clone()) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::debug!(%kind, error = %e, "quarantined undecodable record");
                quarantine.push(Quarantined::new(kind, item, e.to_string()));
            }
        }
    }
    records
}

/// Legacy documents store the calendar as `{ "days": [...] }`; the
/// canonical form is the bare list.
fn decode_state(
    mut state: Map<String, Value>,
    quarantine: &mut Vec<Quarantined>,
) -> Result<WorldState, IngestError> {
    let days = match state.remove("calendar") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(days)) => days,
        Some(Value::Object(mut legacy)) => match legacy.remove("days") {
            Some(Value::Array(days)) => days,
            _ => return Err(IngestError::NotAnArray(EntityKind::CalendarEvent.collection().to_string())),
        },
        Some(_) => return Err(IngestError::NotAnArray(EntityKind::CalendarEvent.collection().to_string())),
    };
    let calendar: Vec<DayRecord> = decode_records(days, EntityKind::CalendarEvent, quarantine);
    Ok(WorldState {
        calendar,
        extra: state,
    })
}
