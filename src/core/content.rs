/// Content generator: rebuilds the notices, rumors and secrets attached to
/// a settlement from slot templates.
///
/// Each settlement draws from its own random stream, derived from the
/// engine seed and the settlement id, so regenerating one settlement never
/// shifts what another gets and a second run reproduces the first.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::hash::{Hash, Hasher};
use thiserror::Error;

use crate::core::store::EntityStore;
use crate::core::template::{Slot, Template, TemplateError};
use crate::schema::entity::EntityId;
use crate::schema::hook::Hook;
use crate::schema::location::{Location, Notice, Rumor, Secret};

#[derive(Debug, Error)]
pub enum ContentError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("content pool `{0}` is empty")]
    EmptyPool(&'static str),
}

pub const ANCHORED_RUMOR_CAP: usize = 5;
pub const RUMOR_TARGET: usize = 8;
pub const MIN_FILLER_RUMORS: usize = 3;
pub const SECRETS_PER_SETTLEMENT: usize = 3;
const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";
const ID_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretSeverity {
    Minor,
    Major,
}

impl SecretSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minor => "minor",
            Self::Major => "major",
        }
    }
}

/// Whether phase 4 regenerates every settlement or only non-conforming
/// ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContentRefresh {
    #[default]
    Always,
    Stale,
}

/// Authored flavor pools. Loaded from the canon file or taken from
/// `ContentPools::default()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPools {
    pub regions: Vec<String>,
    pub places: Vec<String>,
    /// Explicit destinations; when empty the other settlements' names are
    /// used.
    #[serde(default)]
    pub destinations: Vec<String>,
    pub hook_rumor_sources: Vec<String>,
    pub rumor_sources: Vec<String>,
    pub rumor_templates: Vec<String>,
    pub request_templates: Vec<String>,
    pub job_templates: Vec<String>,
    pub secret_templates: Vec<(String, SecretSeverity)>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ContentPools {
    fn default() -> Self {
        Self {
            regions: strings(&[
                "the Saltmarsh",
                "the High Pasture",
                "the Ashen Ridge",
                "the Sunken Fen",
                "the Windward Coast",
                "the Old Forest",
                "the Shallows",
            ]),
            places: strings(&[
                "rice paddies",
                "mushroom grove",
                "hot springs",
                "fishing grounds",
                "herb garden",
                "orchard",
                "mountain trail",
                "bamboo forest",
                "old quarry",
                "tide pools",
            ]),
            destinations: Vec::new(),
            hook_rumor_sources: strings(&[
                "tavern talk",
                "market gossip",
                "traveler's tale",
                "overheard conversation",
            ]),
            rumor_sources: strings(&[
                "tavern talk",
                "market gossip",
                "traveler's tale",
                "overheard conversation",
                "drunken rambling",
            ]),
            rumor_templates: strings(&[
                "They say {npc} has been acting strangely lately",
                "Word around {settlement} is that {npc} knows more than they let on",
                "{npc} was seen heading toward {region} late at night",
                "Some folk say {faction} are planning something big",
                "I heard {faction} members whispering about {region}",
                "Strange lights were seen over {region} last night",
                "A merchant from {destination} says things are getting worse out there",
                "{faction} offered {npc} a deal, but nobody knows the details",
                "{npc} claims to have found something valuable near {region}",
                "Travelers report unusual creatures in {region}",
                "The wells near {settlement} have been tasting of salt",
                "Fishing boats have been coming back empty from {region}",
            ]),
            request_templates: strings(&[
                "INFORMATION WANTED: Reports needed regarding strange activity in {region}. Rewards for credible leads. Contact {faction}.",
                "SKILLED HELP NEEDED: {faction} seeks specialists for work in {region}. Generous compensation guaranteed.",
                "ADVENTURERS WANTED: {faction} seeks capable individuals for an important task. Inquire at {site}.",
                "BOUNTY POSTED: {faction} offers {reward} for information about threats in {region}.",
                "NOTICE: {faction} requests volunteers for community protection efforts. See representatives at {site}.",
            ]),
            job_templates: strings(&[
                "{npc} needs help clearing creatures from their {place}",
                "{npc} seeks a guide through {region}",
                "{npc} requires an escort to {destination}",
                "{npc} is looking for someone to deliver a package to {destination}",
                "{npc} has lost something valuable in {region} and needs help finding it",
                "{npc} suspects someone of theft and needs a discreet investigation",
                "{npc} needs safe passage through dangerous territory",
                "{npc} is offering work at {site}, inquire within",
                "{npc} seeks adventurers for a salvage expedition",
                "{npc} has a pest problem and needs capable exterminators",
            ]),
            secret_templates: vec![
                ("The owner of {site} secretly communes with spirits during the new moon".into(), SecretSeverity::Major),
                ("Ancient artifacts are hidden beneath {site}".into(), SecretSeverity::Major),
                ("The settlement's water source is slowly being poisoned".into(), SecretSeverity::Major),
                ("A member of {faction} is secretly working against the group from within".into(), SecretSeverity::Major),
                ("{npc} discovered a map to a forgotten ruin but hasn't told anyone".into(), SecretSeverity::Minor),
                ("The local shrine keeper has been receiving visions of a great storm".into(), SecretSeverity::Minor),
                ("Smugglers use the back room of {site} to move goods after dark".into(), SecretSeverity::Minor),
                ("A hermit living nearby has been observing the settlement for months".into(), SecretSeverity::Minor),
                ("The fish supply is dwindling because something is claiming the reef".into(), SecretSeverity::Minor),
                ("An old spirit trapped in a local shrine grants wishes, for a price".into(), SecretSeverity::Major),
                ("{npc} is actually a former member of {faction} in hiding".into(), SecretSeverity::Major),
                ("The settlement was built on top of an ancient spirit's resting place".into(), SecretSeverity::Major),
            ],
        }
    }
}

impl ContentPools {
    /// Parse every template once. Fails on the first malformed template or
    /// empty pool.
    pub fn compile(&self) -> Result<CompiledPools, ContentError> {
        let non_empty = |name: &'static str, len: usize| {
            if len == 0 {
                Err(ContentError::EmptyPool(name))
            } else {
                Ok(())
            }
        };
        non_empty("regions", self.regions.len())?;
        non_empty("places", self.places.len())?;
        non_empty("hook_rumor_sources", self.hook_rumor_sources.len())?;
        non_empty("rumor_sources", self.rumor_sources.len())?;
        non_empty("rumor_templates", self.rumor_templates.len())?;
        non_empty("request_templates", self.request_templates.len())?;
        non_empty("job_templates", self.job_templates.len())?;

        let mut secrets = Vec::with_capacity(self.secret_templates.len());
        for (text, severity) in &self.secret_templates {
            secrets.push((Template::parse(text)?, *severity));
        }
        Ok(CompiledPools {
            regions: self.regions.clone(),
            places: self.places.clone(),
            destinations: self.destinations.clone(),
            hook_rumor_sources: self.hook_rumor_sources.clone(),
            rumor_sources: self.rumor_sources.clone(),
            rumors: Template::parse_all(&self.rumor_templates)?,
            requests: Template::parse_all(&self.request_templates)?,
            jobs: Template::parse_all(&self.job_templates)?,
            secrets,
        })
    }
}

/// Pools with every template parsed.
#[derive(Debug, Clone)]
pub struct CompiledPools {
    regions: Vec<String>,
    places: Vec<String>,
    destinations: Vec<String>,
    hook_rumor_sources: Vec<String>,
    rumor_sources: Vec<String>,
    rumors: Vec<Template>,
    requests: Vec<Template>,
    jobs: Vec<Template>,
    secrets: Vec<(Template, SecretSeverity)>,
}

impl CompiledPools {
    pub fn secret_count(&self) -> usize {
        SECRETS_PER_SETTLEMENT.min(self.secrets.len())
    }
}

/// Mints `prefix-XXXXXXXX` ids that collide with nothing in the document.
#[derive(Debug, Clone, Default)]
pub struct IdMinter {
    used: FxHashSet<EntityId>,
}

impl IdMinter {
    pub fn new(used: FxHashSet<EntityId>) -> Self {
        Self { used }
    }

    pub fn from_store(store: &EntityStore) -> Self {
        Self::new(store.used_ids())
    }

    pub fn mint(&mut self, prefix: &str, rng: &mut impl Rng) -> EntityId {
        loop {
            let suffix: String = (0..ID_LEN)
                .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
                .collect();
            let id = EntityId(format!("{prefix}-{suffix}"));
            if self.used.insert(id.clone()) {
                return id;
            }
        }
    }

    /// Make ids available again; used for content about to be replaced.
    pub fn release<'a>(&mut self, ids: impl IntoIterator<Item = &'a EntityId>) {
        for id in ids {
            self.used.remove(id);
        }
    }
}

/// Freshly generated content for one settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementContent {
    pub notices: Vec<Notice>,
    pub rumors: Vec<Rumor>,
    pub secrets: Vec<Secret>,
}

/// Named things a settlement's templates can mention.
struct SettlementContext<'a> {
    name: &'a str,
    npcs: Vec<(&'a EntityId, &'a str)>,
    sites: Vec<(&'a EntityId, &'a str)>,
    factions: Vec<&'a str>,
    destinations: Vec<&'a str>,
}

pub struct ContentGenerator<'p> {
    pools: &'p CompiledPools,
    seed: u64,
}

impl<'p> ContentGenerator<'p> {
    pub fn new(pools: &'p CompiledPools, seed: u64) -> Self {
        Self { pools, seed }
    }

    fn rng_for(&self, location: &EntityId) -> StdRng {
        let mut hasher = FxHasher::default();
        location.hash(&mut hasher);
        StdRng::seed_from_u64(self.seed ^ hasher.finish())
    }

    fn context<'a>(&'a self, store: &'a EntityStore, location: &'a Location) -> SettlementContext<'a> {
        let doc = store.document();
        let npcs = location
            .npc_ids()
            .iter()
            .filter_map(|id| store.npc(id).map(|n| (id, n.name.as_str())))
            .collect();
        let sites = location
            .sites()
            .iter()
            .map(|s| (&s.id, s.name.as_str()))
            .collect();
        let factions = doc.factions.iter().map(|f| f.name.as_str()).collect();
        let destinations = if self.pools.destinations.is_empty() {
            doc.locations
                .iter()
                .filter(|l| l.is_settlement() && l.id != location.id)
                .map(|l| l.name.as_str())
                .collect()
        } else {
            self.pools
                .destinations
                .iter()
                .map(String::as_str)
                .filter(|d| *d != location.name)
                .collect()
        };
        SettlementContext {
            name: &location.name,
            npcs,
            sites,
            factions,
            destinations,
        }
    }

    /// Generate the full content set for one settlement.
    pub fn generate(&self, store: &EntityStore, location: &Location, minter: &mut IdMinter) -> SettlementContent {
        let mut rng = self.rng_for(&location.id);
        let ctx = self.context(store, location);
        let notices = self.notices(&ctx, minter, &mut rng);
        let rumors = self.rumors(store, location, &ctx, minter, &mut rng);
        let secrets = self.secrets(&ctx, minter, &mut rng);
        SettlementContent {
            notices,
            rumors,
            secrets,
        }
    }

    /// Whether a settlement's current content breaks any generation rule:
    /// counts, anchored hook coverage or resolvable references.
    pub fn is_stale(&self, store: &EntityStore, location: &Location) -> bool {
        let anchored: Vec<&EntityId> = anchored_hooks(store, location).map(|h| &h.id).collect();
        let rumors = location.rumors();
        if rumors.len() < RUMOR_TARGET {
            return true;
        }
        if anchored
            .iter()
            .any(|h| !rumors.iter().any(|r| r.linked_hook_id.as_ref() == Some(*h)))
        {
            return true;
        }
        let dangling_rumor = rumors.iter().any(|r| {
            r.linked_hook_id.as_ref().is_some_and(|h| store.hook(h).is_none())
                || r.target_location_id.as_ref().is_some_and(|l| store.location(l).is_none())
        });
        if dangling_rumor {
            return true;
        }

        let notices = location.notices();
        let requests = notices.iter().filter(|n| n.notice_type.as_deref() == Some("request")).count();
        let jobs = notices.iter().filter(|n| n.notice_type.as_deref() == Some("job")).count();
        if !(3..=5).contains(&requests) || !(5..=8).contains(&jobs) {
            return true;
        }

        let secrets = location.secrets();
        if secrets.len() != self.pools.secret_count() {
            return true;
        }
        secrets.iter().any(|s| {
            s.involved_site_ids
                .iter()
                .any(|site| store.site_location(site) != Some(&location.id))
                || s.involved_npc_ids.iter().any(|n| store.npc(n).is_none())
        })
    }

    fn pick<'a>(pool: &'a [String], rng: &mut StdRng) -> &'a str {
        pool.choose(rng).map(String::as_str).unwrap_or_default()
    }

    fn fill(
        &self,
        template: &Template,
        ctx: &SettlementContext<'_>,
        rng: &mut StdRng,
        mut fixed: impl FnMut(Slot, &mut StdRng) -> Option<String>,
    ) -> String {
        let mut values = FxHashMap::default();
        for slot in template.slots() {
            let value = match fixed(slot, rng) {
                Some(v) => v,
                None => match slot {
                    Slot::Npc => ctx
                        .npcs
                        .choose(rng)
                        .map(|(_, name)| name.to_string())
                        .unwrap_or_else(|| "someone".to_string()),
                    Slot::Faction => ctx
                        .factions
                        .choose(rng)
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "the town council".to_string()),
                    Slot::Region => Self::pick(&self.pools.regions, rng).to_string(),
                    Slot::Settlement => ctx.name.to_string(),
                    Slot::Destination => ctx
                        .destinations
                        .choose(rng)
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "the next town".to_string()),
                    Slot::Site => ctx
                        .sites
                        .first()
                        .map(|(_, name)| name.to_string())
                        .unwrap_or_else(|| ctx.name.to_string()),
                    Slot::Place => Self::pick(&self.pools.places, rng).to_string(),
                    Slot::Reward => format!("{} gp", rng.gen_range(20..=150)),
                },
            };
            values.insert(slot, value);
        }
        template.render(&values)
    }

    fn notices(&self, ctx: &SettlementContext<'_>, minter: &mut IdMinter, rng: &mut StdRng) -> Vec<Notice> {
        let mut notices = Vec::new();

        for _ in 0..rng.gen_range(3..=5) {
            let Some(template) = self.pools.requests.choose(rng) else {
                break;
            };
            let reward = format!("{} gp", rng.gen_range(20..=150));
            let text = self.fill(template, ctx, rng, |slot, _| {
                (slot == Slot::Reward).then(|| reward.clone())
            });
            let title = match text.split_once(':') {
                Some((head, _)) => head.to_string(),
                None => "NOTICE".to_string(),
            };
            notices.push(Notice {
                id: minter.mint("notice", rng),
                title: Some(title),
                description: Some(text),
                notice_type: Some("request".to_string()),
                reward: Some(reward),
                extra: Map::new(),
            });
        }

        for _ in 0..rng.gen_range(5..=8) {
            let Some(template) = self.pools.jobs.choose(rng) else {
                break;
            };
            let text = self.fill(template, ctx, rng, |slot, _| {
                (slot == Slot::Npc && ctx.npcs.is_empty()).then(|| "A local resident".to_string())
            });
            let title = if text.chars().count() > 50 {
                format!("{}...", text.chars().take(50).collect::<String>())
            } else {
                text.clone()
            };
            notices.push(Notice {
                id: minter.mint("notice", rng),
                title: Some(title),
                description: Some(text),
                notice_type: Some("job".to_string()),
                reward: Some(format!("{} gp", rng.gen_range(10..=80))),
                extra: Map::new(),
            });
        }
        notices
    }

    fn rumors(
        &self,
        store: &EntityStore,
        location: &Location,
        ctx: &SettlementContext<'_>,
        minter: &mut IdMinter,
        rng: &mut StdRng,
    ) -> Vec<Rumor> {
        let mut rumors = Vec::new();

        for hook in anchored_hooks(store, location) {
            rumors.push(Rumor {
                id: minter.mint("rumor", rng),
                text: Some(
                    hook.rumor
                        .clone()
                        .unwrap_or_else(|| "Something strange is happening".to_string()),
                ),
                is_true: Some(true),
                source: Some(Self::pick(&self.pools.hook_rumor_sources, rng).to_string()),
                linked_hook_id: Some(hook.id.clone()),
                target_location_id: hook.target_location_id.clone(),
                extra: Map::new(),
            });
        }

        let filler = MIN_FILLER_RUMORS.max(RUMOR_TARGET.saturating_sub(rumors.len()));
        for _ in 0..filler {
            let Some(template) = self.pools.rumors.choose(rng) else {
                break;
            };
            let text = self.fill(template, ctx, rng, |_, _| None);
            let is_true = [true, true, false].choose(rng).copied().unwrap_or(true);
            rumors.push(Rumor {
                id: minter.mint("rumor", rng),
                text: Some(text),
                is_true: Some(is_true),
                source: Some(Self::pick(&self.pools.rumor_sources, rng).to_string()),
                linked_hook_id: None,
                target_location_id: None,
                extra: Map::new(),
            });
        }
        rumors
    }

    fn secrets(&self, ctx: &SettlementContext<'_>, minter: &mut IdMinter, rng: &mut StdRng) -> Vec<Secret> {
        let chosen: Vec<&(Template, SecretSeverity)> = self
            .pools
            .secrets
            .choose_multiple(rng, SECRETS_PER_SETTLEMENT)
            .collect();
        let mut secrets = Vec::with_capacity(chosen.len());
        for (template, severity) in chosen {
            let mut involved_site_ids = Vec::new();
            let mut involved_npc_ids = Vec::new();
            let text = self.fill(template, ctx, rng, |slot, rng| match slot {
                Slot::Site => Some(match ctx.sites.choose(rng) {
                    Some((id, name)) => {
                        involved_site_ids.push((*id).clone());
                        name.to_string()
                    }
                    None => "the local establishment".to_string(),
                }),
                Slot::Npc => Some(match ctx.npcs.choose(rng) {
                    Some((id, name)) => {
                        involved_npc_ids.push((*id).clone());
                        name.to_string()
                    }
                    None => "a local resident".to_string(),
                }),
                _ => None,
            });
            secrets.push(Secret {
                id: minter.mint("secret", rng),
                text: Some(text),
                severity: Some(severity.as_str().to_string()),
                discovered: Some(false),
                involved_site_ids,
                involved_npc_ids,
                extra: Map::new(),
            });
        }
        secrets
    }
}

/// Hooks anchored at a location, in document order, capped.
fn anchored_hooks<'a>(
    store: &'a EntityStore,
    location: &'a Location,
) -> impl Iterator<Item = &'a Hook> + 'a {
    store
        .document()
        .hooks
        .iter()
        .filter(move |h| h.involves_location(&location.id))
        .take(ANCHORED_RUMOR_CAP)
}
