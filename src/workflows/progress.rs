//! Stage-level progress queries over a decoded workflow.
//!
//! Nothing here fails: an unknown or empty current stage degrades to
//! `None`, `false`, or `0` so a malformed task record never takes the
//! dashboard down with it.

use serde::Serialize;

use super::identifier::StageSequence;
use super::stage::StageKey;

/// `round((position + 1) / count * 100)`, half rounded up.
///
/// Being in step `i` of `n` credits `(i + 1) / n`: a stage counts as soon
/// as it is entered.
pub(crate) fn entered_percentage(position: usize, count: usize) -> u32 {
    if count == 0 || position >= count {
        return 0;
    }
    let numerator = (position as u64 + 1) * 100;
    let count = count as u64;
    ((numerator * 2 + count) / (count * 2)) as u32
}

impl StageSequence {
    /// Case-insensitive position of `stage`. Every other query builds on this.
    pub fn index_of(&self, stage: &str) -> Option<usize> {
        let key = StageKey::new(stage);
        if key.is_empty() {
            return None;
        }
        self.stages().iter().position(|candidate| *candidate == key)
    }

    pub fn contains_stage(&self, stage: &str) -> bool {
        self.index_of(stage).is_some()
    }

    /// Stage after `stage`; `None` past the end (no wrap-around) or when absent
    pub fn next_stage(&self, stage: &str) -> Option<&StageKey> {
        self.index_of(stage).and_then(|index| self.get(index + 1))
    }

    pub fn previous_stage(&self, stage: &str) -> Option<&StageKey> {
        self.index_of(stage)
            .and_then(|index| index.checked_sub(1))
            .and_then(|index| self.get(index))
    }

    /// Requires membership: an absent stage is never complete
    pub fn is_complete(&self, stage: &str) -> bool {
        matches!(self.index_of(stage), Some(index) if index + 1 == self.len())
    }

    pub fn first_stage(&self) -> Option<&StageKey> {
        self.stages().first()
    }

    pub fn last_stage(&self) -> Option<&StageKey> {
        self.stages().last()
    }

    pub fn completion_percentage(&self, stage: &str) -> u32 {
        match self.index_of(stage) {
            Some(index) => entered_percentage(index, self.len()),
            None => 0,
        }
    }
}

/// Signed lookup for callers that expect the `-1` sentinel
pub fn index_of(sequence: &StageSequence, stage: &str) -> i64 {
    sequence
        .index_of(stage)
        .map(|index| index as i64)
        .unwrap_or(-1)
}

pub fn is_member(sequence: &StageSequence, stage: &str) -> bool {
    sequence.contains_stage(stage)
}

pub fn next_stage<'a>(sequence: &'a StageSequence, stage: &str) -> Option<&'a StageKey> {
    sequence.next_stage(stage)
}

pub fn previous_stage<'a>(sequence: &'a StageSequence, stage: &str) -> Option<&'a StageKey> {
    sequence.previous_stage(stage)
}

pub fn is_complete(sequence: &StageSequence, stage: &str) -> bool {
    sequence.is_complete(stage)
}

pub fn completion_percentage(sequence: &StageSequence, stage: &str) -> u32 {
    sequence.completion_percentage(stage)
}

/// Every stage-level answer for one status update, ready to serialize
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub current_stage: StageKey,
    pub stage_count: usize,
    pub index: i64,
    pub is_member: bool,
    pub next_stage: Option<StageKey>,
    pub previous_stage: Option<StageKey>,
    pub is_complete: bool,
    pub completion_percentage: u32,
}

impl ProgressSnapshot {
    pub fn evaluate(sequence: &StageSequence, current_stage: &str) -> Self {
        let snapshot = Self {
            current_stage: StageKey::new(current_stage),
            stage_count: sequence.len(),
            index: index_of(sequence, current_stage),
            is_member: sequence.contains_stage(current_stage),
            next_stage: sequence.next_stage(current_stage).cloned(),
            previous_stage: sequence.previous_stage(current_stage).cloned(),
            is_complete: sequence.is_complete(current_stage),
            completion_percentage: sequence.completion_percentage(current_stage),
        };

        if !snapshot.is_member {
            tracing::debug!(
                current_stage = %snapshot.current_stage,
                stage_count = snapshot.stage_count,
                "Current stage is not part of the workflow"
            );
        }

        snapshot
    }
}
