/// Validator integration tests: issue detection on unrepaired fixtures.

use serde_json::{json, Value};
use std::path::Path;
use world_integrity::core::rules::{EnumField, RefField, RequiredField, Rule, ShapeRule};
use world_integrity::core::store::EntityStore;
use world_integrity::core::validate::{Issue, IssueKind, Validator};
use world_integrity::{IntegrityEngine, ValidationReport};

fn load(name: &str) -> Value {
    let path = Path::new("tests/fixtures").join(name);
    let contents = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&contents).unwrap()
}

fn legacy_issues() -> Vec<Issue> {
    let store = EntityStore::ingest(load("legacy_world.json")).unwrap();
    Validator::validate(&store)
}

fn in_rule(issues: &[Issue], rule: Rule) -> Vec<&Issue> {
    issues.iter().filter(|i| i.rule == rule).collect()
}

#[test]
fn valid_world_has_no_issues() {
    let store = EntityStore::ingest(load("valid_world.json")).unwrap();
    let issues = Validator::validate(&store);
    assert!(issues.is_empty(), "unexpected issues: {issues:#?}");
}

#[test]
fn missing_site_owners_reported_per_site() {
    let issues = legacy_issues();
    let owners = in_rule(&issues, Rule::Reference(RefField::SiteOwner));
    assert_eq!(owners.len(), 5);
    assert!(owners.iter().all(|i| i.kind == IssueKind::MissingRequiredField));
    let hollowmere_slots: Vec<usize> = owners
        .iter()
        .filter(|i| i.source_id.as_str() == "loc-hollowmere")
        .filter_map(|i| i.slot)
        .collect();
    assert_eq!(hollowmere_slots, vec![0, 1, 2, 3]);
}

#[test]
fn dangling_references_carry_the_bad_value() {
    let issues = legacy_issues();
    let edges = in_rule(&issues, Rule::Reference(RefField::EdgeFaction));
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].kind, IssueKind::DanglingReference);
    assert_eq!(edges[0].value.as_ref().unwrap().as_str(), "faction-deleted");

    let lair = in_rule(&issues, Rule::Reference(RefField::FactionLair));
    assert_eq!(lair.len(), 1);
    assert!(lair[0].detail.contains("dungeon"));

    let clock_owner = in_rule(&issues, Rule::Reference(RefField::ClockOwner));
    let owners: Vec<&str> = clock_owner
        .iter()
        .filter_map(|i| i.value.as_ref().map(|v| v.as_str()))
        .collect();
    assert!(owners.contains(&"faction-drowned"));
}

#[test]
fn quarantined_faction_is_a_structural_mismatch() {
    let issues = legacy_issues();
    let shape = in_rule(&issues, Rule::Shape(ShapeRule::Decodes));
    assert_eq!(shape.len(), 1);
    assert_eq!(shape[0].kind, IssueKind::StructuralMismatch);
    assert_eq!(shape[0].source_id.as_str(), "faction-lantern-old");
}

#[test]
fn legacy_and_inconsistent_clocks_reported() {
    let issues = legacy_issues();
    let legacy = in_rule(&issues, Rule::Shape(ShapeRule::LegacyFields));
    let sources: Vec<&str> = legacy.iter().map(|i| i.source_id.as_str()).collect();
    assert!(sources.contains(&"clock-ashen"));
    assert!(sources.contains(&"item-tide-lamp"));

    let counters = in_rule(&issues, Rule::Shape(ShapeRule::ClockCounters));
    assert_eq!(counters.len(), 1);
    assert_eq!(counters[0].source_id.as_str(), "clock-lanterns-old");

    let missing_trigger = in_rule(&issues, Rule::Required(RequiredField::ClockTrigger));
    assert_eq!(missing_trigger.len(), 3);
}

#[test]
fn out_of_set_archetypes_and_missing_status() {
    let issues = legacy_issues();
    let archetypes: Vec<&str> = in_rule(&issues, Rule::Enum(EnumField::NpcArchetype))
        .iter()
        .map(|i| i.source_id.as_str())
        .collect();
    assert_eq!(archetypes, vec!["npc-ysolde", "npc-odra"]);
    assert_eq!(in_rule(&issues, Rule::Required(RequiredField::NpcArchetype)).len(), 1);
    assert_eq!(in_rule(&issues, Rule::Required(RequiredField::HookStatus)).len(), 1);
}

#[test]
fn roster_gaps_reported_against_location() {
    let issues = legacy_issues();
    let roster = in_rule(&issues, Rule::Roster);
    let pairs: Vec<(&str, &str)> = roster
        .iter()
        .map(|i| (i.source_id.as_str(), i.value.as_ref().unwrap().as_str()))
        .collect();
    assert_eq!(
        pairs,
        vec![("loc-hollowmere", "npc-odra"), ("loc-grimbarrow", "npc-gallow")]
    );
}

#[test]
fn duplicate_ids_reported() {
    let raw = json!({
        "npcs": [
            {"id": "npc-a", "name": "First", "archetype": "guard"},
            {"id": "npc-a", "name": "Second", "archetype": "guard"}
        ]
    });
    let store = EntityStore::ingest(raw).unwrap();
    let issues = Validator::check(&store, Rule::Shape(ShapeRule::UniqueIds));
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].source_id.as_str(), "npc-a");
}

#[test]
fn report_lists_every_category() {
    let engine = IntegrityEngine::builder().build().unwrap();
    let report: ValidationReport = engine
        .validate_file(Path::new("tests/fixtures/legacy_world.json"))
        .unwrap();
    assert_eq!(report.categories.len(), Rule::catalog().len());
    assert!(!report.is_clean());
    let rendered = report.to_string();
    assert!(rendered.contains("[PASS]"));
    assert!(rendered.contains("[FAIL]"));
    assert!(rendered.contains("faction-deleted"));
}

#[test]
fn validation_does_not_mutate() {
    let raw = load("legacy_world.json");
    let store = EntityStore::ingest(raw).unwrap();
    let before = serde_json::to_value(store.document()).unwrap();
    let _ = Validator::validate(&store);
    let after = serde_json::to_value(store.document()).unwrap();
    assert_eq!(before, after);
}
