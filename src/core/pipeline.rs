/// The integrity pipeline: ingest → validate → repair → validate.
///
/// Wires together the entity store, the validator, the repair engine and
/// the report. Built via `IntegrityEngine::builder()`.

use serde_json::Value;
use std::path::Path;
use thiserror::Error;

use crate::core::canon::{Canon, CanonError};
use crate::core::content::{CompiledPools, ContentError, ContentPools, ContentRefresh};
use crate::core::repair::{RepairConfig, RepairEngine, RepairLog};
use crate::core::report::ValidationReport;
use crate::core::store::{EntityStore, IngestError};
use crate::core::validate::Validator;
use crate::schema::entity::EntityId;
use crate::schema::world::WorldDocument;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("canon error: {0}")]
    Canon(#[from] CanonError),
    #[error("content pool error: {0}")]
    Content(#[from] ContentError),
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),
    #[error("repair left {} unresolved issues", .report.issue_count())]
    Unresolved {
        report: ValidationReport,
        log: RepairLog,
    },
}

/// Everything a successful repair run produced.
#[derive(Debug)]
pub struct RepairOutcome {
    pub document: WorldDocument,
    /// Issues found before any repair.
    pub initial: ValidationReport,
    pub log: RepairLog,
    /// Always clean; kept so callers can print it.
    pub final_report: ValidationReport,
}

impl RepairOutcome {
    pub fn to_json_pretty(&self) -> Result<String, PipelineError> {
        Ok(serde_json::to_string_pretty(&self.document)?)
    }
}

/// The top-level integrity engine.
pub struct IntegrityEngine {
    canon: Canon,
    pools: CompiledPools,
    config: RepairConfig,
}

/// Builder for constructing an `IntegrityEngine`.
pub struct IntegrityEngineBuilder {
    seed: u64,
    canon_path: Option<String>,
    /// Directly provided canon (for testing without files).
    canon: Option<Canon>,
    pools: Option<ContentPools>,
    fallback_npc: Option<EntityId>,
    refresh: ContentRefresh,
}

impl IntegrityEngine {
    pub fn builder() -> IntegrityEngineBuilder {
        IntegrityEngineBuilder {
            seed: 0,
            canon_path: None,
            canon: None,
            pools: None,
            fallback_npc: None,
            refresh: ContentRefresh::default(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.config.seed
    }

    pub fn fallback_npc(&self) -> Option<&EntityId> {
        self.config.fallback_npc.as_ref()
    }

    /// Validate without mutating anything.
    pub fn validate(&self, raw: Value) -> Result<ValidationReport, PipelineError> {
        let store = EntityStore::ingest(raw)?;
        Ok(ValidationReport::from_issues(Validator::validate(&store)))
    }

    /// Repair a raw document. Either every issue is resolved and the
    /// repaired document is returned, or nothing is.
    pub fn repair(&self, raw: Value) -> Result<RepairOutcome, PipelineError> {
        let mut store = EntityStore::ingest(raw)?;
        let initial = ValidationReport::from_issues(Validator::validate(&store));
        tracing::info!(
            issues = initial.issue_count(),
            failed = initial.failed_categories().count(),
            "initial validation"
        );

        let engine = RepairEngine::new(&self.canon, &self.pools, &self.config);
        let log = engine.run(&mut store).map_err(|e| PipelineError::Unresolved {
            report: ValidationReport::from_issues(e.issues),
            log: e.log,
        })?;

        let final_report = ValidationReport::from_issues(Validator::validate(&store));
        Ok(RepairOutcome {
            document: store.into_document(),
            initial,
            log,
            final_report,
        })
    }

    pub fn validate_file(&self, path: &Path) -> Result<ValidationReport, PipelineError> {
        self.validate(read_json(path)?)
    }

    pub fn repair_file(&self, path: &Path) -> Result<RepairOutcome, PipelineError> {
        self.repair(read_json(path)?)
    }
}

impl IntegrityEngineBuilder {
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn canon_path(mut self, path: &str) -> Self {
        self.canon_path = Some(path.to_string());
        self
    }

    /// Provide canon directly (for testing without files).
    pub fn with_canon(mut self, canon: Canon) -> Self {
        self.canon = Some(canon);
        self
    }

    /// Override the content pools. Takes precedence over pools in canon.
    pub fn with_pools(mut self, pools: ContentPools) -> Self {
        self.pools = Some(pools);
        self
    }

    /// Site owner for settlements without a roster. Takes precedence over
    /// the canon's fallback.
    pub fn fallback_npc(mut self, id: &str) -> Self {
        self.fallback_npc = Some(EntityId::from(id));
        self
    }

    pub fn content_refresh(mut self, refresh: ContentRefresh) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn build(self) -> Result<IntegrityEngine, PipelineError> {
        let canon = match (self.canon, &self.canon_path) {
            (Some(canon), _) => canon,
            (None, Some(path)) => Canon::load_from_ron(Path::new(path))?,
            (None, None) => Canon::default(),
        };
        let pools = match (&self.pools, canon.pools()) {
            (Some(pools), _) | (None, Some(pools)) => pools.compile()?,
            (None, None) => ContentPools::default().compile()?,
        };
        let fallback_npc = self.fallback_npc.or_else(|| canon.fallback_npc_id.clone());
        tracing::debug!(
            seed = self.seed,
            canon_factions = canon.faction_count(),
            fallback = ?fallback_npc,
            "integrity engine built"
        );

        Ok(IntegrityEngine {
            canon,
            pools,
            config: RepairConfig {
                seed: self.seed,
                fallback_npc,
                refresh: self.refresh,
            },
        })
    }
}

fn read_json(path: &Path) -> Result<Value, PipelineError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_world() -> Value {
        json!({
            "locations": [
                {"id": "loc-mill", "name": "Millbrook", "type": "settlement", "npcIds": ["npc-ada"],
                 "sites": [{"id": "site-mill", "name": "The Mill"}]},
                {"id": "loc-barrow", "name": "Old Barrow", "type": "dungeon"}
            ],
            "npcs": [{"id": "npc-ada", "name": "Ada", "archetype": "miller", "locationId": "loc-mill"}],
            "factions": [{
                "id": "faction-wardens", "name": "Wardens", "archetype": "military", "factionType": "militia",
                "agenda": [{"id": "g1", "order": 1, "description": "Seal the barrow", "status": "pending"}]
            }],
            "clocks": [{"id": "clock-1", "factionId": "faction-wardens", "type": "faction"}],
            "edges": [{"id": "edge-1", "factionId": "faction-deleted"}]
        })
    }

    #[test]
    fn repair_produces_clean_document() {
        let engine = IntegrityEngine::builder().seed(42).build().unwrap();
        let outcome = engine.repair(make_world()).unwrap();
        assert!(!outcome.initial.is_clean());
        assert!(outcome.final_report.is_clean());
        assert!(!outcome.log.is_empty());
        assert!(engine.validate(serde_json::to_value(&outcome.document).unwrap()).unwrap().is_clean());
    }

    #[test]
    fn validate_does_not_repair() {
        let engine = IntegrityEngine::builder().build().unwrap();
        let report = engine.validate(make_world()).unwrap();
        assert!(!report.is_clean());
        assert!(report.issue_count() >= 3);
    }

    #[test]
    fn unresolved_issues_fail_the_run() {
        let engine = IntegrityEngine::builder().build().unwrap();
        let raw = json!({"npcs": [{"id": "npc-1", "name": "N", "archetype": "thief", "locationId": "loc-gone"}]});
        match engine.repair(raw) {
            Err(PipelineError::Unresolved { report, .. }) => assert_eq!(report.issue_count(), 1),
            other => panic!("expected unresolved error, got {other:?}"),
        }
    }

    #[test]
    fn builder_fallback_overrides_canon() {
        let canon = Canon::parse_ron(r#"(fallback_npc_id: Some("npc-canon"))"#).unwrap();
        let engine = IntegrityEngine::builder()
            .with_canon(canon.clone())
            .build()
            .unwrap();
        assert_eq!(engine.fallback_npc(), Some(&EntityId::from("npc-canon")));

        let engine = IntegrityEngine::builder()
            .with_canon(canon)
            .fallback_npc("npc-cli")
            .build()
            .unwrap();
        assert_eq!(engine.fallback_npc(), Some(&EntityId::from("npc-cli")));
    }

    #[test]
    fn builder_with_seed() {
        let engine = IntegrityEngine::builder().seed(12345).build().unwrap();
        assert_eq!(engine.seed(), 12345);
    }

    #[test]
    fn missing_canon_file_is_an_error() {
        let result = IntegrityEngine::builder().canon_path("no/such/canon.ron").build();
        assert!(matches!(result, Err(PipelineError::Canon(CanonError::Io(_)))));
    }

    #[test]
    fn bad_root_is_an_ingest_error() {
        let engine = IntegrityEngine::builder().build().unwrap();
        assert!(matches!(engine.repair(json!([])), Err(PipelineError::Ingest(_))));
    }
}
