// Workflow identifier decoding and stage-level progress

pub mod identifier;
pub mod progress;
pub mod stage;

pub use identifier::{
    decode, decode_optional, format_workflow_name, is_valid_identifier, StageSequence,
    WorkflowIdentifier,
};
pub use progress::{
    completion_percentage, index_of, is_complete, is_member, next_stage, previous_stage,
    ProgressSnapshot,
};
pub use stage::{Stage, StageKey};
