// Event-driven substage tracker for a single stage
//
// Wraps the static substage tables in a statig state machine. Accepted
// events append log entries; refused events are recorded, never raised.

use serde::{Deserialize, Serialize};
use statig::prelude::*;
use std::sync::Arc;
use thiserror::Error;

use super::catalog::{catalog, SubstageCatalog};
use super::types::{SubstageLogEntry, SubstageStatus};
use crate::workflows::progress::entered_percentage;
use crate::workflows::StageKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SubstageEvent {
    Start { substage_id: String },
    Complete { substage_id: String },
    Skip { substage_id: String },
    Fail {
        substage_id: String,
        reason: Option<String>,
    },
    Reset,
}

impl SubstageEvent {
    pub fn start(substage_id: &str) -> Self {
        SubstageEvent::Start {
            substage_id: substage_id.to_string(),
        }
    }

    pub fn complete(substage_id: &str) -> Self {
        SubstageEvent::Complete {
            substage_id: substage_id.to_string(),
        }
    }

    pub fn skip(substage_id: &str) -> Self {
        SubstageEvent::Skip {
            substage_id: substage_id.to_string(),
        }
    }

    pub fn fail(substage_id: &str, reason: Option<&str>) -> Self {
        SubstageEvent::Fail {
            substage_id: substage_id.to_string(),
            reason: reason.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackerPhase {
    /// Between substeps
    Idle,
    /// A substep is in progress
    Active,
    /// Last substep done; the caller advances to the next stage
    StageComplete,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerRejection {
    #[error("Stage {stage} has no substage '{substage_id}'")]
    UnknownSubstage { stage: String, substage_id: String },
    #[error("Cannot move from '{from}' back to '{to}'")]
    Regression { from: String, to: String },
    #[error("Substage '{substage_id}' cannot be skipped")]
    NotSkippable { substage_id: String },
    #[error("Expected to skip '{expected}', got '{actual}'")]
    OutOfOrder { expected: String, actual: String },
    #[error("Substage '{substage_id}' is not the active substage")]
    NotActive { substage_id: String },
    #[error("Substage '{active}' is still in progress")]
    AlreadyActive { active: String },
    #[error("Tracker is {phase:?}; reset before sending more events")]
    Closed { phase: TrackerPhase },
}

pub struct SubstageTracker {
    stage: StageKey,
    catalog: Arc<SubstageCatalog>,
    /// Furthest completed or skipped substage
    cursor: Option<usize>,
    active: Option<usize>,
    phase: TrackerPhase,
    log: Vec<SubstageLogEntry>,
    last_rejection: Option<TrackerRejection>,
}

impl SubstageTracker {
    /// Track `stage` against the catalog snapshot current at creation
    pub fn new(stage: &str) -> Self {
        Self::with_catalog(stage, catalog())
    }

    pub fn with_catalog(stage: &str, catalog: Arc<SubstageCatalog>) -> Self {
        Self {
            stage: StageKey::new(stage),
            catalog,
            cursor: None,
            active: None,
            phase: TrackerPhase::Idle,
            log: Vec::new(),
            last_rejection: None,
        }
    }
}

#[state_machine(initial = "State::idle()")]
impl SubstageTracker {
    #[state]
    fn idle(&mut self, event: &SubstageEvent) -> Outcome<State> {
        match event {
            SubstageEvent::Start { substage_id } => match self.begin(substage_id) {
                Ok(()) => self.enter(TrackerPhase::Active, State::active()),
                Err(rejection) => self.reject(rejection),
            },
            SubstageEvent::Skip { substage_id } => match self.skip_next(substage_id) {
                Ok(true) => self.enter(TrackerPhase::StageComplete, State::stage_complete()),
                Ok(false) => self.accept(),
                Err(rejection) => self.reject(rejection),
            },
            SubstageEvent::Complete { substage_id } | SubstageEvent::Fail { substage_id, .. } => {
                self.reject(TrackerRejection::NotActive {
                    substage_id: substage_id.clone(),
                })
            }
            SubstageEvent::Reset => self.restart(),
        }
    }

    #[state]
    fn active(&mut self, event: &SubstageEvent) -> Outcome<State> {
        match event {
            SubstageEvent::Complete { substage_id } => match self.finish_active(substage_id) {
                Ok(true) => self.enter(TrackerPhase::StageComplete, State::stage_complete()),
                Ok(false) => self.enter(TrackerPhase::Idle, State::idle()),
                Err(rejection) => self.reject(rejection),
            },
            SubstageEvent::Fail {
                substage_id,
                reason,
            } => match self.fail_active(substage_id, reason.as_deref()) {
                Ok(()) => self.enter(TrackerPhase::Failed, State::failed()),
                Err(rejection) => self.reject(rejection),
            },
            SubstageEvent::Start { .. } | SubstageEvent::Skip { .. } => {
                let active = self.active_id().unwrap_or_default();
                self.reject(TrackerRejection::AlreadyActive { active })
            }
            SubstageEvent::Reset => self.restart(),
        }
    }

    #[state]
    fn stage_complete(&mut self, event: &SubstageEvent) -> Outcome<State> {
        match event {
            SubstageEvent::Reset => self.restart(),
            _ => self.reject(TrackerRejection::Closed {
                phase: TrackerPhase::StageComplete,
            }),
        }
    }

    #[state]
    fn failed(&mut self, event: &SubstageEvent) -> Outcome<State> {
        match event {
            SubstageEvent::Reset => self.restart(),
            _ => self.reject(TrackerRejection::Closed {
                phase: TrackerPhase::Failed,
            }),
        }
    }
}

impl SubstageTracker {
    pub fn stage(&self) -> &StageKey {
        &self.stage
    }

    pub fn phase(&self) -> TrackerPhase {
        self.phase
    }

    pub fn log(&self) -> &[SubstageLogEntry] {
        &self.log
    }

    /// Drain log entries, e.g. to hand them to a persistence layer
    pub fn take_log(&mut self) -> Vec<SubstageLogEntry> {
        std::mem::take(&mut self.log)
    }

    pub fn last_rejection(&self) -> Option<&TrackerRejection> {
        self.last_rejection.as_ref()
    }

    pub fn active_id(&self) -> Option<String> {
        self.active.and_then(|position| self.id_at(position))
    }

    pub fn is_stage_complete(&self) -> bool {
        self.phase == TrackerPhase::StageComplete
    }

    /// Percentage through the stage, crediting the furthest substep reached
    pub fn progress(&self) -> u32 {
        if self.is_stage_complete() {
            return 100;
        }
        let count = self.catalog.substages_of(self.stage.as_str()).len();
        self.active
            .or(self.cursor)
            .map(|position| entered_percentage(position, count))
            .unwrap_or(0)
    }

    fn id_at(&self, position: usize) -> Option<String> {
        self.catalog
            .substages_of(self.stage.as_str())
            .get(position)
            .map(|substage| substage.id.clone())
    }

    fn position(&self, substage_id: &str) -> Result<usize, TrackerRejection> {
        self.catalog
            .substage_position(self.stage.as_str(), substage_id)
            .ok_or_else(|| TrackerRejection::UnknownSubstage {
                stage: self.stage.to_string(),
                substage_id: substage_id.to_string(),
            })
    }

    fn next_position(&self) -> usize {
        self.cursor.map(|cursor| cursor + 1).unwrap_or(0)
    }

    fn ends_stage(&self, position: usize, substage_id: &str) -> bool {
        let count = self.catalog.substages_of(self.stage.as_str()).len();
        match self.catalog.transition(self.stage.as_str(), substage_id) {
            Some(transition) => transition.is_terminal() || position + 1 == count,
            None => position + 1 == count,
        }
    }

    fn record(&mut self, substage_id: &str, status: SubstageStatus, message: Option<&str>) {
        let entry = self
            .catalog
            .log_event(self.stage.as_str(), substage_id, status, message);
        tracing::info!(
            stage = %self.stage,
            substage = %substage_id,
            status = %status,
            "Substage event accepted"
        );
        self.log.push(entry);
    }

    /// Start a substep, skipping over any skippable substeps in between
    fn begin(&mut self, substage_id: &str) -> Result<(), TrackerRejection> {
        let target = self.position(substage_id)?;
        if let Some(cursor) = self.cursor {
            let from = self.id_at(cursor).unwrap_or_default();
            if !self
                .catalog
                .is_valid_transition(self.stage.as_str(), &from, substage_id)
            {
                return Err(TrackerRejection::Regression {
                    from,
                    to: substage_id.to_string(),
                });
            }
        }

        let bypassed: Vec<String> = (self.next_position()..target)
            .filter_map(|position| self.id_at(position))
            .collect();
        if let Some(blocking) = bypassed
            .iter()
            .find(|id| !self.catalog.can_skip(self.stage.as_str(), id))
        {
            return Err(TrackerRejection::NotSkippable {
                substage_id: blocking.clone(),
            });
        }

        for id in &bypassed {
            self.record(id, SubstageStatus::Skipped, None);
        }
        self.record(substage_id, SubstageStatus::Started, None);
        self.active = Some(target);
        Ok(())
    }

    /// Returns whether the stage is now finished
    fn skip_next(&mut self, substage_id: &str) -> Result<bool, TrackerRejection> {
        let target = self.position(substage_id)?;
        let expected = self.next_position();
        if target != expected {
            return Err(TrackerRejection::OutOfOrder {
                expected: self.id_at(expected).unwrap_or_default(),
                actual: substage_id.to_string(),
            });
        }
        if !self.catalog.can_skip(self.stage.as_str(), substage_id) {
            return Err(TrackerRejection::NotSkippable {
                substage_id: substage_id.to_string(),
            });
        }

        self.record(substage_id, SubstageStatus::Skipped, None);
        self.cursor = Some(target);
        Ok(self.ends_stage(target, substage_id))
    }

    fn ensure_active(&self, substage_id: &str) -> Result<usize, TrackerRejection> {
        let position = self.position(substage_id)?;
        match self.active {
            Some(active) if active == position => Ok(active),
            _ => Err(TrackerRejection::NotActive {
                substage_id: substage_id.to_string(),
            }),
        }
    }

    /// Returns whether the stage is now finished
    fn finish_active(&mut self, substage_id: &str) -> Result<bool, TrackerRejection> {
        let active = self.ensure_active(substage_id)?;
        self.record(substage_id, SubstageStatus::Completed, None);
        self.active = None;
        self.cursor = Some(active);
        Ok(self.ends_stage(active, substage_id))
    }

    fn fail_active(&mut self, substage_id: &str, reason: Option<&str>) -> Result<(), TrackerRejection> {
        self.ensure_active(substage_id)?;
        self.record(substage_id, SubstageStatus::Failed, reason);
        Ok(())
    }

    fn enter(&mut self, phase: TrackerPhase, next: State) -> Outcome<State> {
        self.phase = phase;
        self.last_rejection = None;
        Transition(next)
    }

    fn accept(&mut self) -> Outcome<State> {
        self.last_rejection = None;
        Handled
    }

    fn reject(&mut self, rejection: TrackerRejection) -> Outcome<State> {
        tracing::warn!(
            stage = %self.stage,
            phase = ?self.phase,
            reason = %rejection,
            "Substage event rejected"
        );
        self.last_rejection = Some(rejection);
        Handled
    }

    fn restart(&mut self) -> Outcome<State> {
        self.cursor = None;
        self.active = None;
        tracing::info!(stage = %self.stage, "Substage tracker reset");
        self.enter(TrackerPhase::Idle, State::idle())
    }
}
