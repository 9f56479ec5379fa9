/// Rule catalog: every reference field, required field, enum field and
/// shape check the validator knows about, declared as data.
///
/// Each reference field knows how to list its values (`slots`) and how to
/// rewrite them (`rewrite`), so validation and repair walk the same table
/// instead of each carrying its own hard-coded traversal.

use std::fmt;

use crate::schema::entity::{EntityId, EntityKind};
use crate::schema::faction::Clock;
use crate::schema::hook::HOOK_STATUSES;
use crate::schema::location::LOCATION_TYPES;
use crate::schema::npc::NPC_ARCHETYPES;
use crate::schema::world::WorldDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    One,
    OptionalOne,
    Many,
}

/// How a broken reference of this field gets repaired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Flavor link: resample a valid id of the target type.
    Cosmetic,
    /// Link derived from other data: drop it.
    Derived,
    /// Load-bearing link: filled from context or the run fails.
    Structural,
}

/// What a reference must resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Location,
    /// A location whose type is `dungeon`.
    Dungeon,
    Npc,
    Faction,
    Hook,
    Clock,
    /// A site of the same location the reference lives on.
    LocalSite,
}

impl Target {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Location | Self::Dungeon => EntityKind::Location,
            Self::Npc => EntityKind::Npc,
            Self::Faction => EntityKind::Faction,
            Self::Hook => EntityKind::Hook,
            Self::Clock => EntityKind::Clock,
            Self::LocalSite => EntityKind::Site,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dungeon => f.write_str("dungeon"),
            Self::LocalSite => f.write_str("site (same location)"),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// Static description of one reference field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefSpec {
    pub source: EntityKind,
    pub path: &'static str,
    pub target: Target,
    pub cardinality: Cardinality,
    pub severity: Severity,
}

/// Every declared reference field in the world schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefField {
    LocationNpcs,
    LocationMayor,
    SiteOwner,
    RumorHook,
    RumorTarget,
    SecretSites,
    SecretNpcs,
    NpcLocation,
    NpcFaction,
    FactionTerritory,
    FactionInfluence,
    FactionHeadquarters,
    FactionLair,
    FactionRelationship,
    FactionNpcs,
    ClockOwner,
    HookSource,
    HookTarget,
    HookMissingNpc,
    HookNpcs,
    HookLocations,
    HookFactions,
    ItemLocation,
    ItemHolder,
    ItemDesiredBy,
    EventFaction,
    EventLocation,
    EventClock,
    EdgeFaction,
}

/// One reference value found in the document.
#[derive(Debug, Clone)]
pub struct RefSlot<'a> {
    pub source_id: EntityId,
    /// Field path relative to the source record, e.g. `sites[2].ownerId`.
    pub path: String,
    /// Owning location, for fields that must resolve within it.
    pub scope: Option<&'a EntityId>,
    /// Position of the sub-record (site, rumor, secret) inside its owner.
    pub slot: Option<usize>,
    pub value: Option<&'a EntityId>,
}

impl<'a> RefSlot<'a> {
    fn new(source_id: &EntityId, path: String, value: Option<&'a EntityId>) -> Self {
        Self {
            source_id: source_id.clone(),
            path,
            scope: None,
            slot: None,
            value,
        }
    }

    fn within(mut self, scope: &'a EntityId, slot: usize) -> Self {
        self.scope = Some(scope);
        self.slot = Some(slot);
        self
    }
}

/// Outcome of a rewrite callback for one reference value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    Keep,
    Replace(EntityId),
    Drop,
}

/// One reference value handed to a rewrite callback.
#[derive(Debug, Clone, Copy)]
pub struct RefSite<'a> {
    /// The record holding the reference, labelled the way issues label it.
    pub source: &'a EntityId,
    pub value: &'a EntityId,
    kept: &'a [EntityId],
    pending: &'a [EntityId],
}

impl<'a> RefSite<'a> {
    fn single(source: &'a EntityId, value: &'a EntityId) -> Self {
        Self {
            source,
            value,
            kept: &[],
            pending: &[],
        }
    }

    /// Whether the list this value sits in already holds `id` elsewhere.
    /// Always false for single-valued fields.
    pub fn holds(&self, id: &EntityId) -> bool {
        self.kept.contains(id) || self.pending.contains(id)
    }
}

use Cardinality::*;
use Severity::*;

impl RefField {
    pub const ALL: [RefField; 29] = [
        Self::LocationNpcs,
        Self::LocationMayor,
        Self::SiteOwner,
        Self::RumorHook,
        Self::RumorTarget,
        Self::SecretSites,
        Self::SecretNpcs,
        Self::NpcLocation,
        Self::NpcFaction,
        Self::FactionTerritory,
        Self::FactionInfluence,
        Self::FactionHeadquarters,
        Self::FactionLair,
        Self::FactionRelationship,
        Self::FactionNpcs,
        Self::ClockOwner,
        Self::HookSource,
        Self::HookTarget,
        Self::HookMissingNpc,
        Self::HookNpcs,
        Self::HookLocations,
        Self::HookFactions,
        Self::ItemLocation,
        Self::ItemHolder,
        Self::ItemDesiredBy,
        Self::EventFaction,
        Self::EventLocation,
        Self::EventClock,
        Self::EdgeFaction,
    ];

    pub fn spec(self) -> RefSpec {
        let (source, path, target, cardinality, severity) = match self {
            Self::LocationNpcs => (EntityKind::Location, "npcIds", Target::Npc, Many, Structural),
            Self::LocationMayor => (EntityKind::Location, "mayorNpcId", Target::Npc, OptionalOne, Cosmetic),
            Self::SiteOwner => (EntityKind::Location, "sites[].ownerId", Target::Npc, One, Structural),
            Self::RumorHook => (EntityKind::Location, "rumors[].linkedHookId", Target::Hook, OptionalOne, Derived),
            Self::RumorTarget => (
                EntityKind::Location,
                "rumors[].targetLocationId",
                Target::Location,
                OptionalOne,
                Cosmetic,
            ),
            Self::SecretSites => (
                EntityKind::Location,
                "lore.secrets[].involvedSiteIds",
                Target::LocalSite,
                Many,
                Structural,
            ),
            Self::SecretNpcs => (
                EntityKind::Location,
                "lore.secrets[].involvedNpcIds",
                Target::Npc,
                Many,
                Structural,
            ),
            Self::NpcLocation => (EntityKind::Npc, "locationId", Target::Location, OptionalOne, Structural),
            Self::NpcFaction => (EntityKind::Npc, "factionId", Target::Faction, OptionalOne, Derived),
            Self::FactionTerritory => (EntityKind::Faction, "territoryIds", Target::Location, Many, Cosmetic),
            Self::FactionInfluence => (EntityKind::Faction, "influenceIds", Target::Location, Many, Cosmetic),
            Self::FactionHeadquarters => (
                EntityKind::Faction,
                "headquartersId",
                Target::Location,
                OptionalOne,
                Cosmetic,
            ),
            Self::FactionLair => (EntityKind::Faction, "lair.dungeonId", Target::Dungeon, OptionalOne, Cosmetic),
            Self::FactionRelationship => (
                EntityKind::Faction,
                "relationships[].factionId",
                Target::Faction,
                One,
                Derived,
            ),
            Self::FactionNpcs => (EntityKind::Faction, "npcIds", Target::Npc, Many, Derived),
            Self::ClockOwner => (EntityKind::Clock, "ownerId", Target::Faction, OptionalOne, Structural),
            Self::HookSource => (EntityKind::Hook, "sourceNpcId", Target::Npc, One, Structural),
            Self::HookTarget => (EntityKind::Hook, "targetLocationId", Target::Location, One, Structural),
            Self::HookMissingNpc => (EntityKind::Hook, "missingNpcId", Target::Npc, OptionalOne, Structural),
            Self::HookNpcs => (EntityKind::Hook, "involvedNpcIds", Target::Npc, Many, Structural),
            Self::HookLocations => (EntityKind::Hook, "involvedLocationIds", Target::Location, Many, Structural),
            Self::HookFactions => (EntityKind::Hook, "involvedFactionIds", Target::Faction, Many, Derived),
            Self::ItemLocation => (EntityKind::Item, "locationId", Target::Location, OptionalOne, Cosmetic),
            Self::ItemHolder => (EntityKind::Item, "holderId", Target::Npc, OptionalOne, Cosmetic),
            Self::ItemDesiredBy => (EntityKind::Item, "desiredByFactionIds", Target::Faction, Many, Cosmetic),
            Self::EventFaction => (
                EntityKind::CalendarEvent,
                "linkedFactionId",
                Target::Faction,
                OptionalOne,
                Cosmetic,
            ),
            Self::EventLocation => (
                EntityKind::CalendarEvent,
                "linkedLocationId",
                Target::Location,
                OptionalOne,
                Cosmetic,
            ),
            Self::EventClock => (EntityKind::CalendarEvent, "linkedClockId", Target::Clock, OptionalOne, Derived),
            Self::EdgeFaction => (EntityKind::Edge, "factionId", Target::Faction, OptionalOne, Cosmetic),
        };
        RefSpec {
            source,
            path,
            target,
            cardinality,
            severity,
        }
    }

    /// Fields whose values point at the given target kind.
    pub fn targeting(kind: EntityKind) -> impl Iterator<Item = RefField> {
        Self::ALL
            .into_iter()
            .filter(move |f| f.spec().target.kind() == kind)
    }

    /// List every value of this field across the document. Single-valued
    /// fields yield one slot per source record even when empty, list
    /// fields yield one slot per element.
    pub fn slots(self, doc: &WorldDocument) -> Vec<RefSlot<'_>> {
        let mut out = Vec::new();
        match self {
            Self::LocationNpcs => {
                for loc in &doc.locations {
                    push_many(&mut out, &loc.id, "npcIds", loc.npc_ids());
                }
            }
            Self::LocationMayor => {
                for loc in &doc.locations {
                    out.push(RefSlot::new(&loc.id, "mayorNpcId".into(), loc.mayor_npc_id.as_ref()));
                }
            }
            Self::SiteOwner => {
                for loc in &doc.locations {
                    for (i, site) in loc.sites().iter().enumerate() {
                        out.push(
                            RefSlot::new(&loc.id, format!("sites[{i}].ownerId"), site.owner_id.as_ref())
                                .within(&loc.id, i),
                        );
                    }
                }
            }
            Self::RumorHook | Self::RumorTarget => {
                for loc in &doc.locations {
                    for (i, rumor) in loc.rumors().iter().enumerate() {
                        let (name, value) = if self == Self::RumorHook {
                            ("linkedHookId", rumor.linked_hook_id.as_ref())
                        } else {
                            ("targetLocationId", rumor.target_location_id.as_ref())
                        };
                        out.push(
                            RefSlot::new(&loc.id, format!("rumors[{i}].{name}"), value).within(&loc.id, i),
                        );
                    }
                }
            }
            Self::SecretSites | Self::SecretNpcs => {
                for loc in &doc.locations {
                    for (i, secret) in loc.secrets().iter().enumerate() {
                        let (name, values) = if self == Self::SecretSites {
                            ("involvedSiteIds", &secret.involved_site_ids)
                        } else {
                            ("involvedNpcIds", &secret.involved_npc_ids)
                        };
                        for (j, id) in values.iter().enumerate() {
                            out.push(
                                RefSlot::new(&loc.id, format!("lore.secrets[{i}].{name}[{j}]"), Some(id))
                                    .within(&loc.id, i),
                            );
                        }
                    }
                }
            }
            Self::NpcLocation => {
                for npc in &doc.npcs {
                    out.push(RefSlot::new(&npc.id, "locationId".into(), npc.location_id.as_ref()));
                }
            }
            Self::NpcFaction => {
                for npc in &doc.npcs {
                    out.push(RefSlot::new(&npc.id, "factionId".into(), npc.faction_id.as_ref()));
                }
            }
            Self::FactionTerritory => {
                for f in &doc.factions {
                    push_many(&mut out, &f.id, "territoryIds", &f.territory_ids);
                }
            }
            Self::FactionInfluence => {
                for f in &doc.factions {
                    push_many(&mut out, &f.id, "influenceIds", &f.influence_ids);
                }
            }
            Self::FactionHeadquarters => {
                for f in &doc.factions {
                    out.push(RefSlot::new(&f.id, "headquartersId".into(), f.headquarters_id.as_ref()));
                }
            }
            Self::FactionLair => {
                for f in &doc.factions {
                    let value = f.lair.as_ref().and_then(|l| l.dungeon_id.as_ref());
                    out.push(RefSlot::new(&f.id, "lair.dungeonId".into(), value));
                }
            }
            Self::FactionRelationship => {
                for f in &doc.factions {
                    for (i, rel) in f.relationships.iter().enumerate() {
                        out.push(RefSlot::new(
                            &f.id,
                            format!("relationships[{i}].factionId"),
                            Some(&rel.faction_id),
                        ));
                    }
                }
            }
            Self::FactionNpcs => {
                for f in &doc.factions {
                    push_many(&mut out, &f.id, "npcIds", &f.npc_ids);
                }
            }
            Self::ClockOwner => {
                for c in &doc.clocks {
                    out.push(RefSlot::new(&c.id, "ownerId".into(), c.owner_id.as_ref()));
                }
            }
            Self::HookSource => {
                for h in &doc.hooks {
                    out.push(RefSlot::new(&h.id, "sourceNpcId".into(), h.source_npc_id.as_ref()));
                }
            }
            Self::HookTarget => {
                for h in &doc.hooks {
                    out.push(RefSlot::new(&h.id, "targetLocationId".into(), h.target_location_id.as_ref()));
                }
            }
            Self::HookMissingNpc => {
                for h in &doc.hooks {
                    out.push(RefSlot::new(&h.id, "missingNpcId".into(), h.missing_npc_id.as_ref()));
                }
            }
            Self::HookNpcs => {
                for h in &doc.hooks {
                    push_many(&mut out, &h.id, "involvedNpcIds", &h.involved_npc_ids);
                }
            }
            Self::HookLocations => {
                for h in &doc.hooks {
                    push_many(&mut out, &h.id, "involvedLocationIds", &h.involved_location_ids);
                }
            }
            Self::HookFactions => {
                for h in &doc.hooks {
                    push_many(&mut out, &h.id, "involvedFactionIds", &h.involved_faction_ids);
                }
            }
            Self::ItemLocation => {
                for item in &doc.significant_items {
                    out.push(RefSlot::new(&item.id, "locationId".into(), item.location_id.as_ref()));
                }
            }
            Self::ItemHolder => {
                for item in &doc.significant_items {
                    out.push(RefSlot::new(&item.id, "holderId".into(), item.holder_id.as_ref()));
                }
            }
            Self::ItemDesiredBy => {
                for item in &doc.significant_items {
                    push_many(&mut out, &item.id, "desiredByFactionIds", &item.desired_by_faction_ids);
                }
            }
            Self::EventFaction | Self::EventLocation | Self::EventClock => {
                let days = doc.state.iter().flat_map(|s| s.calendar.iter());
                for (d, day) in days.enumerate() {
                    for (i, ev) in day.events.iter().enumerate() {
                        let (name, value) = match self {
                            Self::EventFaction => ("linkedFactionId", ev.linked_faction_id.as_ref()),
                            Self::EventLocation => ("linkedLocationId", ev.linked_location_id.as_ref()),
                            _ => ("linkedClockId", ev.linked_clock_id.as_ref()),
                        };
                        out.push(RefSlot::new(&ev.label(d, i), name.into(), value));
                    }
                }
            }
            Self::EdgeFaction => {
                for (i, edge) in doc.edges.iter().enumerate() {
                    out.push(RefSlot::new(&edge.label(i), "factionId".into(), edge.faction_id.as_ref()));
                }
            }
        }
        out
    }

    /// Apply `f` to every value of this field. Returns how many values
    /// changed. A list element replaced by an id the list already holds is
    /// dropped instead; dropping a relationship's target removes the whole
    /// relationship record.
    pub fn rewrite(self, doc: &mut WorldDocument, f: &mut dyn FnMut(&RefSite<'_>) -> Rewrite) -> usize {
        let mut changed = 0;
        match self {
            Self::LocationNpcs => {
                for loc in &mut doc.locations {
                    if let Some(ids) = loc.npc_ids.as_mut() {
                        changed += rewrite_list(&loc.id, ids, f);
                    }
                }
            }
            Self::LocationMayor => {
                for loc in &mut doc.locations {
                    changed += rewrite_opt(&loc.id, &mut loc.mayor_npc_id, f);
                }
            }
            Self::SiteOwner => {
                for loc in &mut doc.locations {
                    for site in loc.sites.iter_mut().flatten() {
                        changed += rewrite_opt(&loc.id, &mut site.owner_id, f);
                    }
                }
            }
            Self::RumorHook | Self::RumorTarget => {
                for loc in &mut doc.locations {
                    for rumor in loc.rumors.iter_mut().flatten() {
                        let value = if self == Self::RumorHook {
                            &mut rumor.linked_hook_id
                        } else {
                            &mut rumor.target_location_id
                        };
                        changed += rewrite_opt(&loc.id, value, f);
                    }
                }
            }
            Self::SecretSites | Self::SecretNpcs => {
                for loc in &mut doc.locations {
                    for secret in loc.lore.iter_mut().flat_map(|l| l.secrets.iter_mut()) {
                        let values = if self == Self::SecretSites {
                            &mut secret.involved_site_ids
                        } else {
                            &mut secret.involved_npc_ids
                        };
                        changed += rewrite_list(&loc.id, values, f);
                    }
                }
            }
            Self::NpcLocation => {
                for npc in &mut doc.npcs {
                    changed += rewrite_opt(&npc.id, &mut npc.location_id, f);
                }
            }
            Self::NpcFaction => {
                for npc in &mut doc.npcs {
                    changed += rewrite_opt(&npc.id, &mut npc.faction_id, f);
                }
            }
            Self::FactionTerritory => {
                for fac in &mut doc.factions {
                    changed += rewrite_list(&fac.id, &mut fac.territory_ids, f);
                }
            }
            Self::FactionInfluence => {
                for fac in &mut doc.factions {
                    changed += rewrite_list(&fac.id, &mut fac.influence_ids, f);
                }
            }
            Self::FactionHeadquarters => {
                for fac in &mut doc.factions {
                    changed += rewrite_opt(&fac.id, &mut fac.headquarters_id, f);
                }
            }
            Self::FactionLair => {
                for fac in &mut doc.factions {
                    if let Some(lair) = fac.lair.as_mut() {
                        changed += rewrite_opt(&fac.id, &mut lair.dungeon_id, f);
                    }
                }
            }
            Self::FactionRelationship => {
                for fac in &mut doc.factions {
                    let before = fac.relationships.len();
                    let mut kept = Vec::with_capacity(before);
                    for mut rel in fac.relationships.drain(..) {
                        match f(&RefSite::single(&fac.id, &rel.faction_id)) {
                            Rewrite::Keep => kept.push(rel),
                            Rewrite::Replace(id) => {
                                rel.faction_id = id;
                                kept.push(rel);
                                changed += 1;
                            }
                            Rewrite::Drop => changed += 1,
                        }
                    }
                    fac.relationships = kept;
                }
            }
            Self::FactionNpcs => {
                for fac in &mut doc.factions {
                    changed += rewrite_list(&fac.id, &mut fac.npc_ids, f);
                }
            }
            Self::ClockOwner => {
                for clock in &mut doc.clocks {
                    changed += rewrite_opt(&clock.id, &mut clock.owner_id, f);
                }
            }
            Self::HookSource => {
                for h in &mut doc.hooks {
                    changed += rewrite_opt(&h.id, &mut h.source_npc_id, f);
                }
            }
            Self::HookTarget => {
                for h in &mut doc.hooks {
                    changed += rewrite_opt(&h.id, &mut h.target_location_id, f);
                }
            }
            Self::HookMissingNpc => {
                for h in &mut doc.hooks {
                    changed += rewrite_opt(&h.id, &mut h.missing_npc_id, f);
                }
            }
            Self::HookNpcs => {
                for h in &mut doc.hooks {
                    changed += rewrite_list(&h.id, &mut h.involved_npc_ids, f);
                }
            }
            Self::HookLocations => {
                for h in &mut doc.hooks {
                    changed += rewrite_list(&h.id, &mut h.involved_location_ids, f);
                }
            }
            Self::HookFactions => {
                for h in &mut doc.hooks {
                    changed += rewrite_list(&h.id, &mut h.involved_faction_ids, f);
                }
            }
            Self::ItemLocation => {
                for item in &mut doc.significant_items {
                    changed += rewrite_opt(&item.id, &mut item.location_id, f);
                }
            }
            Self::ItemHolder => {
                for item in &mut doc.significant_items {
                    changed += rewrite_opt(&item.id, &mut item.holder_id, f);
                }
            }
            Self::ItemDesiredBy => {
                for item in &mut doc.significant_items {
                    changed += rewrite_list(&item.id, &mut item.desired_by_faction_ids, f);
                }
            }
            Self::EventFaction | Self::EventLocation | Self::EventClock => {
                let days = doc.state.iter_mut().flat_map(|s| s.calendar.iter_mut());
                for (d, day) in days.enumerate() {
                    for (i, ev) in day.events.iter_mut().enumerate() {
                        let label = ev.label(d, i);
                        let value = match self {
                            Self::EventFaction => &mut ev.linked_faction_id,
                            Self::EventLocation => &mut ev.linked_location_id,
                            _ => &mut ev.linked_clock_id,
                        };
                        changed += rewrite_opt(&label, value, f);
                    }
                }
            }
            Self::EdgeFaction => {
                for (i, edge) in doc.edges.iter_mut().enumerate() {
                    let label = edge.label(i);
                    changed += rewrite_opt(&label, &mut edge.faction_id, f);
                }
            }
        }
        changed
    }
}

impl fmt::Display for RefField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let spec = self.spec();
        write!(f, "{}.{} -> {}", spec.source, spec.path, spec.target)
    }
}

fn push_many<'a>(out: &mut Vec<RefSlot<'a>>, source_id: &EntityId, name: &str, values: &'a [EntityId]) {
    for (i, id) in values.iter().enumerate() {
        out.push(RefSlot::new(source_id, format!("{name}[{i}]"), Some(id)));
    }
}

fn rewrite_opt(source: &EntityId, value: &mut Option<EntityId>, f: &mut dyn FnMut(&RefSite<'_>) -> Rewrite) -> usize {
    let Some(current) = value.as_ref() else {
        return 0;
    };
    match f(&RefSite::single(source, current)) {
        Rewrite::Keep => 0,
        Rewrite::Replace(id) => {
            *value = Some(id);
            1
        }
        Rewrite::Drop => {
            *value = None;
            1
        }
    }
}

fn rewrite_list(source: &EntityId, values: &mut Vec<EntityId>, f: &mut dyn FnMut(&RefSite<'_>) -> Rewrite) -> usize {
    let original = std::mem::take(values);
    let mut changed = 0;
    for (i, id) in original.iter().enumerate() {
        let site = RefSite {
            source,
            value: id,
            kept: values.as_slice(),
            pending: &original[i + 1..],
        };
        match f(&site) {
            Rewrite::Keep => values.push(id.clone()),
            Rewrite::Replace(new_id) => {
                changed += 1;
                let taken = values.contains(&new_id) || original[i + 1..].contains(&new_id);
                if !taken {
                    values.push(new_id);
                }
            }
            Rewrite::Drop => changed += 1,
        }
    }
    changed
}

/// Fields every record of a kind must carry. All of them can be filled by
/// normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequiredField {
    ClockName,
    ClockDescription,
    ClockSegments,
    ClockFilled,
    ClockOwnerType,
    ClockTrigger,
    ClockConsequences,
    ClockVisible,
    ClockPaused,
    FactionStatus,
    HookStatus,
    NpcArchetype,
}

impl RequiredField {
    pub const ALL: [RequiredField; 12] = [
        Self::ClockName,
        Self::ClockDescription,
        Self::ClockSegments,
        Self::ClockFilled,
        Self::ClockOwnerType,
        Self::ClockTrigger,
        Self::ClockConsequences,
        Self::ClockVisible,
        Self::ClockPaused,
        Self::FactionStatus,
        Self::HookStatus,
        Self::NpcArchetype,
    ];

    pub fn source(self) -> EntityKind {
        match self {
            Self::FactionStatus => EntityKind::Faction,
            Self::HookStatus => EntityKind::Hook,
            Self::NpcArchetype => EntityKind::Npc,
            _ => EntityKind::Clock,
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Self::ClockName => "name",
            Self::ClockDescription => "description",
            Self::ClockSegments => "segments",
            Self::ClockFilled => "filled",
            Self::ClockOwnerType => "ownerType",
            Self::ClockTrigger => "trigger",
            Self::ClockConsequences => "consequences",
            Self::ClockVisible => "visible",
            Self::ClockPaused => "paused",
            Self::FactionStatus | Self::HookStatus => "status",
            Self::NpcArchetype => "archetype",
        }
    }

    /// Ids of the records missing this field.
    pub fn missing(self, doc: &WorldDocument) -> Vec<EntityId> {
        let clocks = |absent: fn(&Clock) -> bool| {
            doc.clocks
                .iter()
                .filter(|&c| absent(c))
                .map(|c| c.id.clone())
                .collect::<Vec<_>>()
        };
        match self {
            Self::ClockName => clocks(|c| c.name.is_none()),
            Self::ClockDescription => clocks(|c| c.description.is_none()),
            Self::ClockSegments => clocks(|c| c.segments.is_none()),
            Self::ClockFilled => clocks(|c| c.filled.is_none()),
            Self::ClockOwnerType => clocks(|c| c.owner_type.is_none()),
            Self::ClockTrigger => clocks(|c| c.trigger.is_none()),
            Self::ClockConsequences => clocks(|c| c.consequences.is_none()),
            Self::ClockVisible => clocks(|c| c.visible.is_none()),
            Self::ClockPaused => clocks(|c| c.paused.is_none()),
            Self::FactionStatus => doc
                .factions
                .iter()
                .filter(|f| f.status.is_none())
                .map(|f| f.id.clone())
                .collect(),
            Self::HookStatus => doc
                .hooks
                .iter()
                .filter(|h| h.status.is_none())
                .map(|h| h.id.clone())
                .collect(),
            Self::NpcArchetype => doc
                .npcs
                .iter()
                .filter(|n| n.archetype.is_none())
                .map(|n| n.id.clone())
                .collect(),
        }
    }
}

/// Fields restricted to a closed set of string values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumField {
    NpcArchetype,
    LocationType,
    HookStatus,
}

impl EnumField {
    pub const ALL: [EnumField; 3] = [Self::NpcArchetype, Self::LocationType, Self::HookStatus];

    pub fn source(self) -> EntityKind {
        match self {
            Self::NpcArchetype => EntityKind::Npc,
            Self::LocationType => EntityKind::Location,
            Self::HookStatus => EntityKind::Hook,
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Self::NpcArchetype => "archetype",
            Self::LocationType => "type",
            Self::HookStatus => "status",
        }
    }

    pub fn allowed(self) -> &'static [&'static str] {
        match self {
            Self::NpcArchetype => NPC_ARCHETYPES,
            Self::LocationType => LOCATION_TYPES,
            Self::HookStatus => HOOK_STATUSES,
        }
    }

    /// `(record id, offending value)` for every out-of-set value. Absent
    /// values are the required-field rules' concern.
    pub fn violations(self, doc: &WorldDocument) -> Vec<(EntityId, String)> {
        let allowed = self.allowed();
        match self {
            Self::NpcArchetype => doc
                .npcs
                .iter()
                .filter_map(|n| {
                    let value = n.archetype.as_deref()?;
                    (!allowed.contains(&value)).then(|| (n.id.clone(), value.to_string()))
                })
                .collect(),
            Self::LocationType => doc
                .locations
                .iter()
                .filter(|l| !allowed.contains(&l.kind.as_str()))
                .map(|l| (l.id.clone(), l.kind.clone()))
                .collect(),
            Self::HookStatus => doc
                .hooks
                .iter()
                .filter_map(|h| {
                    let value = h.status.as_deref()?;
                    (!allowed.contains(&value)).then(|| (h.id.clone(), value.to_string()))
                })
                .collect(),
        }
    }
}

/// Whole-record structure checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeRule {
    /// Every record decodes into its typed form.
    Decodes,
    UniqueIds,
    /// No legacy field names remain after migration.
    LegacyFields,
    /// `segments > 0` and `filled <= segments`.
    ClockCounters,
    /// `ownerType` agrees with the presence of `ownerId`.
    ClockOwnership,
}

impl ShapeRule {
    pub const ALL: [ShapeRule; 5] = [
        Self::Decodes,
        Self::UniqueIds,
        Self::LegacyFields,
        Self::ClockCounters,
        Self::ClockOwnership,
    ];
}

impl fmt::Display for ShapeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Decodes => "records match their schema",
            Self::UniqueIds => "ids unique within type",
            Self::LegacyFields => "no legacy field names",
            Self::ClockCounters => "clock segments/filled consistent",
            Self::ClockOwnership => "clock ownerType matches ownerId",
        };
        f.write_str(s)
    }
}

/// One check in the catalog. Each rule is one category in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    Reference(RefField),
    Required(RequiredField),
    Enum(EnumField),
    Shape(ShapeRule),
    /// An NPC placed at a location appears in that location's roster.
    Roster,
}

impl Rule {
    /// The full catalog in report order.
    pub fn catalog() -> Vec<Rule> {
        let mut rules: Vec<Rule> = ShapeRule::ALL.into_iter().map(Rule::Shape).collect();
        rules.extend(RequiredField::ALL.into_iter().map(Rule::Required));
        rules.extend(EnumField::ALL.into_iter().map(Rule::Enum));
        rules.extend(RefField::ALL.into_iter().map(Rule::Reference));
        rules.push(Rule::Roster);
        rules
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference(field) => write!(f, "{field}"),
            Self::Required(field) => write!(f, "{}.{} present", field.source(), field.path()),
            Self::Enum(field) => write!(f, "{}.{} in allowed set", field.source(), field.path()),
            Self::Shape(shape) => write!(f, "{shape}"),
            Self::Roster => f.write_str("npc.locationId listed in location.npcIds"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_doc() -> WorldDocument {
        serde_json::from_value(json!({
            "locations": [{
                "id": "loc-a", "name": "A", "type": "settlement",
                "npcIds": ["npc-1", "npc-2"],
                "sites": [{"id": "site-1", "name": "Mill"}, {"id": "site-2", "name": "Inn", "ownerId": "npc-2"}]
            }],
            "npcs": [{"id": "npc-1", "name": "One", "archetype": "sage"}],
            "factions": [{
                "id": "faction-a", "name": "A", "archetype": "military", "factionType": "militia",
                "agenda": [],
                "relationships": [
                    {"factionId": "faction-gone", "type": "rival"},
                    {"factionId": "faction-a", "type": "allied"}
                ],
                "territoryIds": ["loc-a", "loc-x", "loc-y"]
            }],
            "edges": [{"factionId": "faction-gone"}]
        }))
        .unwrap()
    }

    #[test]
    fn every_field_has_a_distinct_label() {
        let labels: std::collections::HashSet<String> =
            RefField::ALL.iter().map(|f| f.to_string()).collect();
        assert_eq!(labels.len(), RefField::ALL.len());
    }

    #[test]
    fn catalog_covers_everything_once() {
        let catalog = Rule::catalog();
        assert_eq!(
            catalog.len(),
            ShapeRule::ALL.len() + RequiredField::ALL.len() + EnumField::ALL.len() + RefField::ALL.len() + 1
        );
    }

    #[test]
    fn site_owner_slots_carry_position() {
        let doc = make_doc();
        let slots = RefField::SiteOwner.slots(&doc);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].value, None);
        assert_eq!(slots[0].slot, Some(0));
        assert_eq!(slots[1].path, "sites[1].ownerId");
        assert_eq!(slots[1].scope, Some(&EntityId::from("loc-a")));
    }

    #[test]
    fn edges_without_id_use_position() {
        let doc = make_doc();
        let slots = RefField::EdgeFaction.slots(&doc);
        assert_eq!(slots[0].source_id.as_str(), "edges[0]");
    }

    #[test]
    fn rewrite_drops_relationship_records() {
        let mut doc = make_doc();
        let changed = RefField::FactionRelationship.rewrite(&mut doc, &mut |site: &RefSite<'_>| {
            if site.value.as_str() == "faction-gone" {
                Rewrite::Drop
            } else {
                Rewrite::Keep
            }
        });
        assert_eq!(changed, 1);
        assert_eq!(doc.factions[0].relationships.len(), 1);
        assert_eq!(doc.factions[0].relationships[0].faction_id.as_str(), "faction-a");
    }

    #[test]
    fn rewrite_list_never_duplicates() {
        let mut doc = make_doc();
        RefField::FactionTerritory.rewrite(&mut doc, &mut |site: &RefSite<'_>| {
            if site.value.as_str() == "loc-a" {
                Rewrite::Keep
            } else {
                Rewrite::Replace("loc-a".into())
            }
        });
        assert_eq!(doc.factions[0].territory_ids, vec![EntityId::from("loc-a")]);
    }

    #[test]
    fn rewrite_sites_know_source_and_list() {
        let mut doc = make_doc();
        let mut seen = Vec::new();
        RefField::FactionTerritory.rewrite(&mut doc, &mut |site: &RefSite<'_>| {
            seen.push((
                site.source.as_str().to_string(),
                site.value.as_str().to_string(),
                site.holds(&"loc-a".into()),
            ));
            Rewrite::Keep
        });
        assert_eq!(
            seen,
            vec![
                ("faction-a".to_string(), "loc-a".to_string(), false),
                ("faction-a".to_string(), "loc-x".to_string(), true),
                ("faction-a".to_string(), "loc-y".to_string(), true),
            ]
        );

        let mut sources = Vec::new();
        RefField::EdgeFaction.rewrite(&mut doc, &mut |site: &RefSite<'_>| {
            sources.push(site.source.as_str().to_string());
            assert!(!site.holds(site.value));
            Rewrite::Keep
        });
        assert_eq!(sources, vec!["edges[0]"]);
    }

    #[test]
    fn enum_violations_report_value() {
        let doc = make_doc();
        let bad = EnumField::NpcArchetype.violations(&doc);
        assert_eq!(bad, vec![(EntityId::from("npc-1"), "sage".to_string())]);
        assert!(EnumField::LocationType.violations(&doc).is_empty());
    }

    #[test]
    fn required_field_missing() {
        let doc = make_doc();
        assert_eq!(RequiredField::FactionStatus.missing(&doc), vec![EntityId::from("faction-a")]);
        assert!(RequiredField::ClockName.missing(&doc).is_empty());
    }
}
