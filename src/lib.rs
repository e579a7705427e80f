// adw-progress Library - workflow stage decoding and substage progress
// Exposes the core components for the dashboard and the CLI

pub mod config;
pub mod substages;
pub mod telemetry;
pub mod workflows;

// Re-export key types for easy access
pub use self::config::{config, init_config, AdwProgressConfig, CatalogConfig, LoggingConfig};
pub use substages::{
    catalog, publish_catalog, CatalogError, StageDefinition, Substage, SubstageCatalog,
    SubstageEvent, SubstageLogEntry, SubstageStatus, SubstageTracker, TrackerPhase,
    TrackerRejection, Transition,
};
pub use telemetry::{create_progress_span, generate_correlation_id, init_telemetry};
pub use workflows::{
    decode, decode_optional, format_workflow_name, is_valid_identifier, ProgressSnapshot, Stage,
    StageKey, StageSequence, WorkflowIdentifier,
};
