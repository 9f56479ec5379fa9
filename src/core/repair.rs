/// Repair engine: six strictly ordered phases that take a store full of
/// issues to one that validates clean.
///
/// 1. normalize shapes, 2. fill required gaps from local context,
/// 3. rebuild non-conforming faction and clock collections,
/// 4. regenerate settlement content, 5. resample or drop dangling
/// non-structural links, 6. re-validate.
///
/// Every phase asks the validator for the issues it handles against the
/// current store, so later phases see the effects of earlier ones.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::core::canon::Canon;
use crate::core::content::{CompiledPools, ContentGenerator, ContentRefresh, IdMinter};
use crate::core::normalize::{faction_clock, NormalizeStats, Normalizer};
use crate::core::rules::{RefField, RefSite, Rewrite, Rule, Severity, Target};
use crate::core::store::{EntityStore, Quarantined};
use crate::core::validate::{resolves, Issue, IssueKind, Validator};
use crate::schema::entity::{EntityId, EntityKind};
use crate::schema::faction::{Clock, Faction};
use crate::schema::location::Lore;
use crate::schema::relationship::FactionRelationship;
use crate::schema::world::WorldDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Normalize,
    Fill,
    Rebuild,
    Regenerate,
    Resample,
    Accept,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Normalize => "normalize",
            Self::Fill => "fill",
            Self::Rebuild => "rebuild",
            Self::Regenerate => "regenerate",
            Self::Resample => "resample",
            Self::Accept => "accept",
        };
        f.write_str(s)
    }
}

/// One change made by the repair engine.
#[derive(Debug, Clone, PartialEq)]
pub enum RepairAction {
    Normalized(NormalizeStats),
    SiteOwnerFilled {
        location: EntityId,
        site: usize,
        owner: EntityId,
    },
    HookFieldFilled {
        hook: EntityId,
        field: &'static str,
        value: EntityId,
    },
    RosterJoined {
        location: EntityId,
        npc: EntityId,
    },
    DuplicateDropped {
        kind: EntityKind,
        id: EntityId,
    },
    Substituted {
        kind: EntityKind,
        old: EntityId,
        new: EntityId,
    },
    ReferencesRenamed {
        kind: EntityKind,
        count: usize,
    },
    ClockDiscarded {
        clock: EntityId,
        reason: String,
    },
    ClockMinted {
        faction: EntityId,
        clock: EntityId,
    },
    RelationshipsRebuilt {
        faction: EntityId,
        count: usize,
    },
    ContentRegenerated {
        location: EntityId,
        notices: usize,
        rumors: usize,
        secrets: usize,
    },
    ReferenceResampled {
        field: RefField,
        source: EntityId,
        from: EntityId,
        to: EntityId,
    },
    ReferenceDropped {
        field: RefField,
        source: EntityId,
        value: EntityId,
    },
}

impl fmt::Display for RepairAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normalized(s) => write!(
                f,
                "normalized {} records, filled defaults on {} clocks, remapped {} archetypes, quarantined {}",
                s.migrated, s.defaults, s.remapped, s.quarantined
            ),
            Self::SiteOwnerFilled { location, site, owner } => {
                write!(f, "location {location} sites[{site}].ownerId = {owner}")
            }
            Self::HookFieldFilled { hook, field, value } => write!(f, "hook {hook} {field} = {value}"),
            Self::RosterJoined { location, npc } => write!(f, "location {location} npcIds += {npc}"),
            Self::DuplicateDropped { kind, id } => write!(f, "dropped duplicate {kind} {id}"),
            Self::Substituted { kind, old, new } => write!(f, "{kind} {old} replaced by canonical {new}"),
            Self::ReferencesRenamed { kind, count } => write!(f, "renamed {count} {kind} references"),
            Self::ClockDiscarded { clock, reason } => write!(f, "discarded clock {clock}: {reason}"),
            Self::ClockMinted { faction, clock } => write!(f, "minted clock {clock} for faction {faction}"),
            Self::RelationshipsRebuilt { faction, count } => {
                write!(f, "faction {faction} relationships rebuilt ({count})")
            }
            Self::ContentRegenerated {
                location,
                notices,
                rumors,
                secrets,
            } => write!(
                f,
                "location {location} regenerated {notices} notices, {rumors} rumors, {secrets} secrets"
            ),
            Self::ReferenceResampled { field, source, from, to } => {
                write!(f, "{field}: {source} {from} -> {to}")
            }
            Self::ReferenceDropped { field, source, value } => write!(f, "{field}: {source} dropped {value}"),
        }
    }
}

/// Every action taken, tagged with its phase, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairLog {
    pub entries: Vec<(Phase, RepairAction)>,
}

impl RepairLog {
    fn push(&mut self, phase: Phase, action: RepairAction) {
        tracing::debug!(%phase, %action, "repair");
        self.entries.push((phase, action));
    }

    pub fn in_phase(&self, phase: Phase) -> impl Iterator<Item = &RepairAction> {
        self.entries
            .iter()
            .filter(move |(p, _)| *p == phase)
            .map(|(_, a)| a)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for RepairLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (phase, action) in &self.entries {
            writeln!(f, "[{phase}] {action}")?;
        }
        Ok(())
    }
}

/// Issues no phase could resolve. The store is left in whatever state the
/// phases reached; callers must not publish it.
#[derive(Debug, Error)]
#[error("{} issues remain after repair", .issues.len())]
pub struct Unresolved {
    pub issues: Vec<Issue>,
    pub log: RepairLog,
}

#[derive(Debug, Clone, Default)]
pub struct RepairConfig {
    pub seed: u64,
    /// Owner for sites in settlements with no roster at all.
    pub fallback_npc: Option<EntityId>,
    pub refresh: ContentRefresh,
}

pub struct RepairEngine<'a> {
    canon: &'a Canon,
    pools: &'a CompiledPools,
    config: &'a RepairConfig,
}

impl<'a> RepairEngine<'a> {
    pub fn new(canon: &'a Canon, pools: &'a CompiledPools, config: &'a RepairConfig) -> Self {
        Self { canon, pools, config }
    }

    pub fn run(&self, store: &mut EntityStore) -> Result<RepairLog, Unresolved> {
        let mut log = RepairLog::default();
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let stats = Normalizer.run(store);
        if stats != NormalizeStats::default() {
            log.push(Phase::Normalize, RepairAction::Normalized(stats));
        }
        phase_done(Phase::Normalize, &log);

        self.fill(store, &mut log);
        phase_done(Phase::Fill, &log);

        let mut minter = IdMinter::from_store(store);
        self.rebuild_factions(store, &mut log);
        self.rebuild_clocks(store, &mut minter, &mut rng, &mut log);
        self.rebuild_relationships(store, &mut log);
        phase_done(Phase::Rebuild, &log);

        self.regenerate(store, &mut minter, &mut log);
        phase_done(Phase::Regenerate, &log);

        self.resample(store, &mut rng, &mut log);
        phase_done(Phase::Resample, &log);

        let issues = Validator::validate(store);
        if issues.is_empty() {
            tracing::info!(repairs = log.len(), "repair accepted");
            Ok(log)
        } else {
            for issue in &issues {
                tracing::warn!(%issue, "unresolved");
            }
            Err(Unresolved { issues, log })
        }
    }

    /// Phase 2: site owners, hook anchors and roster membership.
    fn fill(&self, store: &mut EntityStore, log: &mut RepairLog) {
        let broken = |rule| {
            Validator::check(store, rule)
                .into_iter()
                .filter(|i| matches!(i.kind, IssueKind::MissingRequiredField | IssueKind::DanglingReference))
                .collect::<Vec<_>>()
        };
        let site_issues = broken(Rule::Reference(RefField::SiteOwner));
        let source_issues = broken(Rule::Reference(RefField::HookSource));
        let target_issues = broken(Rule::Reference(RefField::HookTarget));
        let roster_issues = broken(Rule::Roster);

        let mut site_fills = Vec::new();
        for issue in &site_issues {
            let (Some(location), Some(site)) = (store.location(&issue.source_id), issue.slot) else {
                continue;
            };
            let roster = location.npc_ids();
            let owner = if roster.is_empty() {
                self.config.fallback_npc.clone()
            } else {
                Some(roster[site % roster.len()].clone())
            };
            match owner {
                Some(owner) => site_fills.push((location.id.clone(), site, owner)),
                None => tracing::warn!(location = %location.id, site, "no roster and no fallback npc for site owner"),
            }
        }

        let first_resolving = |ids: &[EntityId], target: Target| {
            ids.iter().find(|id| resolves(store, target, id, None)).cloned()
        };
        let mut hook_fills = Vec::new();
        for (issues, field, target) in [
            (&source_issues, "sourceNpcId", Target::Npc),
            (&target_issues, "targetLocationId", Target::Location),
        ] {
            for issue in issues {
                let Some(hook) = store.hook(&issue.source_id) else {
                    continue;
                };
                let candidates: &[EntityId] = if target == Target::Npc {
                    &hook.involved_npc_ids
                } else {
                    &hook.involved_location_ids
                };
                if let Some(value) = first_resolving(candidates, target) {
                    hook_fills.push((hook.id.clone(), field, value));
                }
            }
        }

        let roster_fills: Vec<(EntityId, EntityId)> = roster_issues
            .iter()
            .filter_map(|i| Some((i.source_id.clone(), i.value.clone()?)))
            .collect();

        store.edit(|doc| {
            let locations: FxHashMap<EntityId, usize> = doc
                .locations
                .iter()
                .enumerate()
                .map(|(i, l)| (l.id.clone(), i))
                .collect();
            for (location, site, owner) in site_fills {
                let Some(&pos) = locations.get(&location) else {
                    continue;
                };
                if let Some(s) = doc.locations[pos].sites.as_mut().and_then(|s| s.get_mut(site)) {
                    s.owner_id = Some(owner.clone());
                    log.push(Phase::Fill, RepairAction::SiteOwnerFilled { location, site, owner });
                }
            }
            for (hook_id, field, value) in hook_fills {
                let Some(hook) = doc.hooks.iter_mut().find(|h| h.id == hook_id) else {
                    continue;
                };
                if field == "sourceNpcId" {
                    hook.source_npc_id = Some(value.clone());
                } else {
                    hook.target_location_id = Some(value.clone());
                }
                log.push(
                    Phase::Fill,
                    RepairAction::HookFieldFilled {
                        hook: hook_id,
                        field,
                        value,
                    },
                );
            }
            for (location, npc) in roster_fills {
                let Some(&pos) = locations.get(&location) else {
                    continue;
                };
                let roster = doc.locations[pos].npc_ids.get_or_insert_with(Vec::new);
                if !roster.contains(&npc) {
                    roster.push(npc.clone());
                    log.push(Phase::Fill, RepairAction::RosterJoined { location, npc });
                }
            }
        });
    }

    /// Phase 3a: keep conforming factions, substitute the rest from canon
    /// and point every faction reference at the substitute.
    fn rebuild_factions(&self, store: &mut EntityStore, log: &mut RepairLog) {
        let duplicates: FxHashSet<EntityId> = store
            .duplicates()
            .iter()
            .filter(|(kind, _)| *kind == EntityKind::Faction)
            .map(|(_, id)| id.clone())
            .collect();
        let broken = store.take_quarantine(EntityKind::Faction);

        let mut renames: FxHashMap<EntityId, EntityId> = FxHashMap::default();
        let mut additions: Vec<Faction> = Vec::new();
        for record in broken {
            let Some(substitute) = self.canon.faction_substitute(record.id.as_ref(), record.name.as_deref()) else {
                tracing::warn!(faction = %record.label(), reason = %record.reason, "non-conforming faction has no canonical substitute");
                store.push_quarantine(record);
                continue;
            };
            let present = store.faction(&substitute.id).is_some() || additions.iter().any(|f| f.id == substitute.id);
            if !present {
                additions.push(substitute.clone());
            }
            let old = record.label();
            if old != substitute.id {
                renames.insert(old.clone(), substitute.id.clone());
            }
            log.push(
                Phase::Rebuild,
                RepairAction::Substituted {
                    kind: EntityKind::Faction,
                    old,
                    new: substitute.id.clone(),
                },
            );
        }

        store.edit(|doc| {
            if !duplicates.is_empty() {
                let mut seen = FxHashSet::default();
                doc.factions.retain(|f| {
                    let first = seen.insert(f.id.clone());
                    if !first {
                        log.push(
                            Phase::Rebuild,
                            RepairAction::DuplicateDropped {
                                kind: EntityKind::Faction,
                                id: f.id.clone(),
                            },
                        );
                    }
                    first
                });
            }
            doc.factions.extend(additions);
            if !renames.is_empty() {
                let count = rename_references(doc, EntityKind::Faction, &renames);
                log.push(
                    Phase::Rebuild,
                    RepairAction::ReferencesRenamed {
                        kind: EntityKind::Faction,
                        count,
                    },
                );
            }
        });
    }

    /// Phase 3b: substitute or discard malformed and orphaned clocks, then
    /// give every faction without one a fresh clock.
    fn rebuild_clocks(&self, store: &mut EntityStore, minter: &mut IdMinter, rng: &mut StdRng, log: &mut RepairLog) {
        let mut broken: Vec<Quarantined> = store.take_quarantine(EntityKind::Clock);
        for clock in store.document().clocks.iter().filter(|c| c.is_malformed()) {
            let raw = match serde_json::to_value(clock) {
                Ok(raw) => raw,
                Err(err) => {
                    tracing::warn!(clock = %clock.id, error = %err, "could not serialize inconsistent clock");
                    Value::Null
                }
            };
            broken.push(Quarantined {
                kind: EntityKind::Clock,
                id: Some(clock.id.clone()),
                name: clock.name.clone(),
                raw,
                reason: "inconsistent clock".to_string(),
            });
        }

        let mut renames: FxHashMap<EntityId, EntityId> = FxHashMap::default();
        let mut additions: Vec<Clock> = Vec::new();
        for record in broken {
            let substitute = self.canon.clock_substitute(record.id.as_ref(), record.name.as_deref());
            let old = record.label();
            match substitute {
                Some(sub) => {
                    let present = additions.iter().any(|c| c.id == sub.id)
                        || store.document().clocks.iter().any(|c| c.id == sub.id && !c.is_malformed());
                    if !present {
                        additions.push(sub.clone());
                    }
                    if old != sub.id {
                        renames.insert(old.clone(), sub.id.clone());
                    }
                    log.push(
                        Phase::Rebuild,
                        RepairAction::Substituted {
                            kind: EntityKind::Clock,
                            old,
                            new: sub.id.clone(),
                        },
                    );
                }
                None => {
                    tracing::warn!(clock = %old, reason = %record.reason, "discarding clock with no canonical substitute");
                    log.push(
                        Phase::Rebuild,
                        RepairAction::ClockDiscarded {
                            clock: old,
                            reason: record.reason,
                        },
                    );
                }
            }
        }

        let factions: FxHashSet<EntityId> = store.document().factions.iter().map(|f| f.id.clone()).collect();
        store.edit(|doc| {
            let mut seen = FxHashSet::default();
            doc.clocks.retain(|c| {
                if c.is_malformed() {
                    return false;
                }
                if !seen.insert(c.id.clone()) {
                    log.push(
                        Phase::Rebuild,
                        RepairAction::DuplicateDropped {
                            kind: EntityKind::Clock,
                            id: c.id.clone(),
                        },
                    );
                    return false;
                }
                true
            });
            for clock in additions {
                if seen.insert(clock.id.clone()) {
                    doc.clocks.push(clock);
                }
            }
            doc.clocks.retain(|c| match &c.owner_id {
                Some(owner) if !factions.contains(owner) => {
                    tracing::warn!(clock = %c.id, owner = %owner, "discarding clock whose faction is gone");
                    log.push(
                        Phase::Rebuild,
                        RepairAction::ClockDiscarded {
                            clock: c.id.clone(),
                            reason: format!("owner `{owner}` does not exist"),
                        },
                    );
                    false
                }
                _ => true,
            });
            if !renames.is_empty() {
                let count = rename_references(doc, EntityKind::Clock, &renames);
                log.push(
                    Phase::Rebuild,
                    RepairAction::ReferencesRenamed {
                        kind: EntityKind::Clock,
                        count,
                    },
                );
            }

            let mut minted = Vec::new();
            for faction in &doc.factions {
                if doc.clocks.iter().any(|c| c.is_owned_by(&faction.id)) {
                    continue;
                }
                let clock = faction_clock(minter.mint("clock", rng), faction);
                log.push(
                    Phase::Rebuild,
                    RepairAction::ClockMinted {
                        faction: faction.id.clone(),
                        clock: clock.id.clone(),
                    },
                );
                minted.push(clock);
            }
            doc.clocks.extend(minted);
        });
    }

    /// Phase 3c: the whole relationship graph from the canonical table.
    /// Factions the table does not name end up with no relationships.
    /// Without a table the authored graph stands.
    fn rebuild_relationships(&self, store: &mut EntityStore, log: &mut RepairLog) {
        if !self.canon.has_relationship_table() {
            return;
        }
        let by_name: FxHashMap<&str, &EntityId> = store
            .document()
            .factions
            .iter()
            .rev()
            .map(|f| (f.name.as_str(), &f.id))
            .collect();
        let mut rebuilt: Vec<(usize, Vec<FactionRelationship>)> = Vec::new();
        for (pos, faction) in store.document().factions.iter().enumerate() {
            let mut records = Vec::new();
            let pairs = self.canon.relations_for(&faction.name).into_iter().flat_map(|r| r.pairs());
            for (name, kind) in pairs {
                match by_name.get(name) {
                    Some(&id) if *id != faction.id => records.push(FactionRelationship::new(id.clone(), kind)),
                    Some(_) => {}
                    None => tracing::debug!(faction = %faction.id, other = name, "relationship names an absent faction"),
                }
            }
            if records != faction.relationships {
                rebuilt.push((pos, records));
            }
        }
        store.edit(|doc| {
            for (pos, records) in rebuilt {
                let faction = &mut doc.factions[pos];
                log.push(
                    Phase::Rebuild,
                    RepairAction::RelationshipsRebuilt {
                        faction: faction.id.clone(),
                        count: records.len(),
                    },
                );
                faction.relationships = records;
            }
        });
    }

    /// Phase 4: regenerate settlement notices, rumors and secrets.
    fn regenerate(&self, store: &mut EntityStore, minter: &mut IdMinter, log: &mut RepairLog) {
        let generator = ContentGenerator::new(self.pools, self.config.seed);
        let targets: Vec<usize> = store
            .document()
            .locations
            .iter()
            .enumerate()
            .filter(|(_, l)| l.is_settlement())
            .filter(|(_, l)| self.config.refresh == ContentRefresh::Always || generator.is_stale(store, l))
            .map(|(i, _)| i)
            .collect();
        for &i in &targets {
            minter.release(store.document().locations[i].content_ids());
        }
        let generated: Vec<_> = targets
            .into_iter()
            .map(|i| {
                let location = &store.document().locations[i];
                (i, generator.generate(store, location, minter))
            })
            .collect();
        store.edit(|doc| {
            for (i, content) in generated {
                let location = &mut doc.locations[i];
                log.push(
                    Phase::Regenerate,
                    RepairAction::ContentRegenerated {
                        location: location.id.clone(),
                        notices: content.notices.len(),
                        rumors: content.rumors.len(),
                        secrets: content.secrets.len(),
                    },
                );
                location.notices = Some(content.notices);
                location.rumors = Some(content.rumors);
                location.lore.get_or_insert_with(Lore::default).secrets = content.secrets;
            }
        });
    }

    /// Phase 5: cosmetic links get a random valid id, derived links are
    /// dropped. Structural links are never touched here.
    fn resample(&self, store: &mut EntityStore, rng: &mut StdRng, log: &mut RepairLog) {
        for field in RefField::ALL {
            let spec = field.spec();
            if spec.severity == Severity::Structural {
                continue;
            }
            let dangling: Vec<Issue> = Validator::check(store, Rule::Reference(field))
                .into_iter()
                .filter(|i| i.kind == IssueKind::DanglingReference)
                .collect();
            if dangling.is_empty() {
                continue;
            }
            let bad: FxHashSet<EntityId> = dangling.iter().filter_map(|i| i.value.clone()).collect();
            let pool = match spec.target {
                Target::Dungeon => store.dungeon_ids(),
                target => store.all_ids(target.kind()),
            };
            let mut changes = Vec::new();
            store.edit(|doc| {
                field.rewrite(doc, &mut |site: &RefSite<'_>| {
                    if !bad.contains(site.value) {
                        return Rewrite::Keep;
                    }
                    let replacement = match spec.severity {
                        Severity::Cosmetic => {
                            let open: Vec<&EntityId> = pool.iter().filter(|id| !site.holds(id)).collect();
                            open.choose(rng).map(|id| (*id).clone())
                        }
                        _ => None,
                    };
                    changes.push((site.source.clone(), site.value.clone(), replacement.clone()));
                    match replacement {
                        Some(id) => Rewrite::Replace(id),
                        None => Rewrite::Drop,
                    }
                });
            });
            for (source, from, to) in changes {
                let action = match to {
                    Some(to) => RepairAction::ReferenceResampled { field, source, from, to },
                    None => RepairAction::ReferenceDropped {
                        field,
                        source,
                        value: from,
                    },
                };
                log.push(Phase::Resample, action);
            }
        }
    }
}

fn phase_done(phase: Phase, log: &RepairLog) {
    tracing::info!(%phase, repairs = log.in_phase(phase).count(), "phase complete");
}

/// Point every reference to a renamed id at its replacement.
fn rename_references(
    doc: &mut WorldDocument,
    kind: EntityKind,
    renames: &FxHashMap<EntityId, EntityId>,
) -> usize {
    RefField::targeting(kind)
        .map(|field| {
            field.rewrite(doc, &mut |site: &RefSite<'_>| match renames.get(site.value) {
                Some(new) => Rewrite::Replace(new.clone()),
                None => Rewrite::Keep,
            })
        })
        .sum()
}
