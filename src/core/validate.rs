/// Reference validator: walks the store against the rule catalog and emits
/// typed issues. Never mutates; safe to re-run at any point.

use serde_json::{Map, Value};
use std::fmt;

use crate::core::normalize::Normalizer;
use crate::core::rules::{Cardinality, EnumField, RefField, RequiredField, Rule, ShapeRule, Target};
use crate::core::store::EntityStore;
use crate::schema::entity::{EntityId, EntityKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    MissingRequiredField,
    DanglingReference,
    InvalidEnumValue,
    StructuralMismatch,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MissingRequiredField => "missing field",
            Self::DanglingReference => "dangling reference",
            Self::InvalidEnumValue => "invalid value",
            Self::StructuralMismatch => "structural mismatch",
        };
        f.write_str(s)
    }
}

/// One violation found by the validator.
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub kind: IssueKind,
    pub rule: Rule,
    pub source: EntityKind,
    pub source_id: EntityId,
    /// Field path relative to the source record.
    pub field: String,
    /// Position of the offending sub-record within its owner, if any.
    pub slot: Option<usize>,
    /// The offending id for reference issues.
    pub value: Option<EntityId>,
    pub detail: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}: {} ({})",
            self.source, self.source_id, self.field, self.detail, self.kind
        )
    }
}

/// Stateless validator over an `EntityStore`.
pub struct Validator;

impl Validator {
    /// Run every rule in the catalog.
    pub fn validate(store: &EntityStore) -> Vec<Issue> {
        let issues: Vec<Issue> = Rule::catalog()
            .into_iter()
            .flat_map(|rule| Self::check(store, rule))
            .collect();
        tracing::debug!(issues = issues.len(), "validation pass complete");
        issues
    }

    /// Run a single rule.
    pub fn check(store: &EntityStore, rule: Rule) -> Vec<Issue> {
        match rule {
            Rule::Reference(field) => check_reference(store, field),
            Rule::Required(field) => check_required(store, field),
            Rule::Enum(field) => check_enum(store, field),
            Rule::Shape(shape) => check_shape(store, shape),
            Rule::Roster => check_roster(store),
        }
    }
}

/// Whether `value` resolves to the declared target. `scope` is the owning
/// location for same-location site references.
pub fn resolves(store: &EntityStore, target: Target, value: &EntityId, scope: Option<&EntityId>) -> bool {
    match target {
        Target::Dungeon => store.is_dungeon(value),
        Target::LocalSite => scope.is_some() && store.site_location(value) == scope,
        other => store.contains(other.kind(), value),
    }
}

fn check_reference(store: &EntityStore, field: RefField) -> Vec<Issue> {
    let spec = field.spec();
    let mut issues = Vec::new();
    for slot in field.slots(store.document()) {
        let issue = |kind, value: Option<&EntityId>, detail: String| Issue {
            kind,
            rule: Rule::Reference(field),
            source: spec.source,
            source_id: slot.source_id.clone(),
            field: slot.path.clone(),
            slot: slot.slot,
            value: value.cloned(),
            detail,
        };
        match slot.value {
            None if spec.cardinality == Cardinality::One => {
                issues.push(issue(
                    IssueKind::MissingRequiredField,
                    None,
                    format!("required {} reference is empty", spec.target),
                ));
            }
            None => {}
            Some(value) if !resolves(store, spec.target, value, slot.scope) => {
                let detail = match spec.target {
                    Target::Dungeon if store.location(value).is_some() => {
                        format!("`{value}` is a location but not a dungeon")
                    }
                    Target::LocalSite => format!("`{value}` is not a site of this location"),
                    target => format!("`{value}` does not resolve to a {target}"),
                };
                issues.push(issue(IssueKind::DanglingReference, Some(value), detail));
            }
            Some(_) => {}
        }
    }
    issues
}

fn check_required(store: &EntityStore, field: RequiredField) -> Vec<Issue> {
    field
        .missing(store.document())
        .into_iter()
        .map(|id| Issue {
            kind: IssueKind::MissingRequiredField,
            rule: Rule::Required(field),
            source: field.source(),
            source_id: id,
            field: field.path().to_string(),
            slot: None,
            value: None,
            detail: "required field is absent".to_string(),
        })
        .collect()
}

fn check_enum(store: &EntityStore, field: EnumField) -> Vec<Issue> {
    field
        .violations(store.document())
        .into_iter()
        .map(|(id, value)| Issue {
            kind: IssueKind::InvalidEnumValue,
            rule: Rule::Enum(field),
            source: field.source(),
            source_id: id,
            field: field.path().to_string(),
            slot: None,
            value: None,
            detail: format!("`{value}` is not one of {}", field.allowed().join(", ")),
        })
        .collect()
}

fn shape_issue(shape: ShapeRule, source: EntityKind, source_id: EntityId, field: &str, detail: String) -> Issue {
    Issue {
        kind: IssueKind::StructuralMismatch,
        rule: Rule::Shape(shape),
        source,
        source_id,
        field: field.to_string(),
        slot: None,
        value: None,
        detail,
    }
}

fn check_shape(store: &EntityStore, shape: ShapeRule) -> Vec<Issue> {
    let doc = store.document();
    match shape {
        ShapeRule::Decodes => store
            .quarantine()
            .iter()
            .map(|q| shape_issue(shape, q.kind, q.label(), "", q.reason.clone()))
            .collect(),
        ShapeRule::UniqueIds => store
            .duplicates()
            .iter()
            .map(|(kind, id)| shape_issue(shape, *kind, id.clone(), "id", "duplicate id".to_string()))
            .collect(),
        ShapeRule::LegacyFields => {
            let mut issues = Vec::new();
            let mut check = |kind: EntityKind, id: EntityId, extra: &Map<String, Value>| {
                for key in Normalizer::legacy_keys(kind) {
                    if extra.contains_key(key) {
                        issues.push(shape_issue(
                            shape,
                            kind,
                            id.clone(),
                            key,
                            format!("legacy field `{key}` still present"),
                        ));
                    }
                }
            };
            for clock in &doc.clocks {
                check(EntityKind::Clock, clock.id.clone(), &clock.extra);
            }
            for item in &doc.significant_items {
                check(EntityKind::Item, item.id.clone(), &item.extra);
            }
            let days = doc.state.iter().flat_map(|s| s.calendar.iter());
            for (d, day) in days.enumerate() {
                for (i, ev) in day.events.iter().enumerate() {
                    check(EntityKind::CalendarEvent, ev.label(d, i), &ev.extra);
                }
            }
            issues
        }
        ShapeRule::ClockCounters => doc
            .clocks
            .iter()
            .filter_map(|c| {
                let (field, detail) = c.counter_fault()?;
                Some(shape_issue(shape, EntityKind::Clock, c.id.clone(), field, detail))
            })
            .collect(),
        ShapeRule::ClockOwnership => doc
            .clocks
            .iter()
            .filter_map(|c| {
                let (field, detail) = c.ownership_fault()?;
                Some(shape_issue(shape, EntityKind::Clock, c.id.clone(), field, detail))
            })
            .collect(),
    }
}

fn check_roster(store: &EntityStore) -> Vec<Issue> {
    let mut issues = Vec::new();
    for npc in &store.document().npcs {
        let Some(location_id) = &npc.location_id else {
            continue;
        };
        // dangling locations are reported by the reference rule
        let Some(location) = store.location(location_id) else {
            continue;
        };
        if !location.npc_ids().contains(&npc.id) {
            issues.push(Issue {
                kind: IssueKind::MissingRequiredField,
                rule: Rule::Roster,
                source: EntityKind::Location,
                source_id: location.id.clone(),
                field: "npcIds".to_string(),
                slot: None,
                value: Some(npc.id.clone()),
                detail: format!("npc `{}` lives here but is not on the roster", npc.id),
            });
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_store(raw: serde_json::Value) -> EntityStore {
        EntityStore::ingest(raw).unwrap()
    }

    fn kinds(issues: &[Issue]) -> Vec<IssueKind> {
        issues.iter().map(|i| i.kind).collect()
    }

    #[test]
    fn empty_document_is_clean() {
        let store = make_store(json!({}));
        assert!(Validator::validate(&store).is_empty());
    }

    #[test]
    fn dangling_edge_faction() {
        let store = make_store(json!({"edges": [{"id": "edge-1", "factionId": "faction-deleted"}]}));
        let issues = Validator::check(&store, Rule::Reference(RefField::EdgeFaction));
        assert_eq!(kinds(&issues), vec![IssueKind::DanglingReference]);
        assert_eq!(issues[0].source_id.as_str(), "edge-1");
        assert_eq!(issues[0].value, Some(EntityId::from("faction-deleted")));
    }

    #[test]
    fn missing_site_owner_reports_slot() {
        let store = make_store(json!({
            "locations": [{"id": "loc-a", "name": "A", "type": "settlement", "npcIds": [],
                           "sites": [{"id": "site-1", "name": "Mill"}]}]
        }));
        let issues = Validator::check(&store, Rule::Reference(RefField::SiteOwner));
        assert_eq!(kinds(&issues), vec![IssueKind::MissingRequiredField]);
        assert_eq!(issues[0].slot, Some(0));
        assert_eq!(issues[0].field, "sites[0].ownerId");
    }

    #[test]
    fn lair_must_be_a_dungeon() {
        let store = make_store(json!({
            "locations": [{"id": "loc-town", "name": "Town", "type": "settlement"}],
            "factions": [{"id": "faction-a", "name": "A", "archetype": "criminal", "factionType": "syndicate",
                          "agenda": [], "status": "active", "lair": {"dungeonId": "loc-town"}}]
        }));
        let issues = Validator::check(&store, Rule::Reference(RefField::FactionLair));
        assert_eq!(issues.len(), 1);
        assert!(issues[0].detail.contains("not a dungeon"));
    }

    #[test]
    fn secret_site_must_belong_to_same_location() {
        let store = make_store(json!({
            "locations": [
                {"id": "loc-a", "name": "A", "type": "settlement", "sites": [{"id": "site-a", "name": "Mill", "ownerId": "npc-1"}],
                 "lore": {"secrets": [{"id": "secret-1", "text": "x", "severity": "minor",
                                       "involvedSiteIds": ["site-b"], "involvedNpcIds": []}]}},
                {"id": "loc-b", "name": "B", "type": "settlement", "sites": [{"id": "site-b", "name": "Inn", "ownerId": "npc-1"}]}
            ]
        }));
        let issues = Validator::check(&store, Rule::Reference(RefField::SecretSites));
        assert_eq!(issues.len(), 1);
        assert!(issues[0].detail.contains("not a site of this location"));
    }

    #[test]
    fn legacy_clock_shape() {
        let store = make_store(json!({
            "clocks": [{"id": "clock-1", "factionId": "faction-x", "type": "t", "segments": 4, "filled": 5}]
        }));
        let issues = Validator::validate(&store);
        let legacy: Vec<_> = issues
            .iter()
            .filter(|i| i.rule == Rule::Shape(ShapeRule::LegacyFields))
            .map(|i| i.field.as_str())
            .collect();
        assert!(legacy.contains(&"factionId"));
        assert!(legacy.contains(&"type"));
        assert!(issues.iter().any(|i| i.rule == Rule::Shape(ShapeRule::ClockCounters)));
        assert!(issues.iter().any(|i| i.rule == Rule::Required(RequiredField::ClockTrigger)));
    }

    #[test]
    fn roster_gap_is_reported_against_location() {
        let store = make_store(json!({
            "locations": [{"id": "loc-a", "name": "A", "type": "settlement", "npcIds": []}],
            "npcs": [{"id": "npc-1", "name": "One", "archetype": "guard", "locationId": "loc-a"}]
        }));
        let issues = Validator::check(&store, Rule::Roster);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].source_id.as_str(), "loc-a");
        assert_eq!(issues[0].value, Some(EntityId::from("npc-1")));
    }

    #[test]
    fn quarantined_records_are_structural() {
        let store = make_store(json!({"factions": [{"id": "faction-old", "name": "Old"}]}));
        let issues = Validator::check(&store, Rule::Shape(ShapeRule::Decodes));
        assert_eq!(kinds(&issues), vec![IssueKind::StructuralMismatch]);
        assert_eq!(issues[0].source, EntityKind::Faction);
    }
}
