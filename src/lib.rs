//! World Integrity: referential-integrity validation and repair for
//! tabletop world documents.
//!
//! Loads a JSON world of locations, NPCs, factions, clocks and hooks,
//! reports every broken cross-reference, and repairs the document through
//! a fixed sequence of phases: schema migration, gap filling from local
//! context, canonical faction and clock rebuilds, settlement content
//! generation, and pruning or resampling of dangling links.

pub mod core;
pub mod schema;

pub use crate::core::pipeline::{IntegrityEngine, PipelineError, RepairOutcome};
pub use crate::core::report::ValidationReport;
