// Substage Module - per-stage step tables and the substage state machine
//
// `machine` answers pure queries over the published catalog; `tracker`
// drives one stage through its substeps from discrete events.

pub mod catalog;
pub mod machine;
pub mod tracker;
pub mod types;

pub use catalog::{catalog, publish_catalog, CatalogError, StageDefinition, SubstageCatalog};
pub use machine::{
    can_skip, is_valid_transition, log_event, next_substage, stage_progress, substage,
    substages_of,
};
pub use tracker::{SubstageEvent, SubstageTracker, TrackerPhase, TrackerRejection};
pub use types::{Substage, SubstageLogEntry, SubstageStatus, Transition};
