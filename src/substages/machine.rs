//! Substage queries: lookup, default path, skip rules, progress, and the
//! forward-only transition check.
//!
//! Every query takes the stage as raw caller input and canonicalizes it
//! once. An unknown stage or substage id yields an empty list, `None`,
//! `false`, or `0`.

use chrono::Utc;

use super::catalog::{catalog, StageDefinition, SubstageCatalog};
use super::types::{Substage, SubstageLogEntry, SubstageStatus, Transition};
use crate::workflows::progress::entered_percentage;
use crate::workflows::{Stage, StageKey};

impl SubstageCatalog {
    fn lookup(&self, stage: &str) -> Option<&StageDefinition> {
        let definition = Stage::parse(stage).and_then(|stage| self.definition(stage));
        if definition.is_none() {
            tracing::debug!(stage = %stage, "No substage table for stage");
        }
        definition
    }

    pub fn substages_of(&self, stage: &str) -> &[Substage] {
        self.lookup(stage)
            .map(|definition| definition.substages.as_slice())
            .unwrap_or(&[])
    }

    pub fn substage(&self, stage: &str, substage_id: &str) -> Option<&Substage> {
        self.lookup(stage)?.substage(substage_id)
    }

    pub fn transition(&self, stage: &str, substage_id: &str) -> Option<&Transition> {
        self.lookup(stage)?.transition(substage_id)
    }

    /// Default next substep. `None` either means the stage is finished and
    /// the caller should advance to the next stage, or there is no entry.
    pub fn next_substage(&self, stage: &str, substage_id: &str) -> Option<&Substage> {
        let next = self.transition(stage, substage_id)?.next.as_deref()?;
        self.substage(stage, next)
    }

    /// Unknown transitions are never skippable
    pub fn can_skip(&self, stage: &str, substage_id: &str) -> bool {
        self.transition(stage, substage_id)
            .map(|transition| transition.can_skip)
            .unwrap_or(false)
    }

    pub fn substage_position(&self, stage: &str, substage_id: &str) -> Option<usize> {
        self.lookup(stage)?.position(substage_id)
    }

    /// Same entered-counts convention as stage-level completion
    pub fn stage_progress(&self, stage: &str, substage_id: &str) -> u32 {
        let count = self.substages_of(stage).len();
        match self.substage_position(stage, substage_id) {
            Some(position) => entered_percentage(position, count),
            None => 0,
        }
    }

    /// Substeps only ever move forward. This ignores the default path in
    /// the transition table: any strictly later substage is allowed.
    pub fn is_valid_transition(&self, stage: &str, from_id: &str, to_id: &str) -> bool {
        match (
            self.substage_position(stage, from_id),
            self.substage_position(stage, to_id),
        ) {
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }

    pub fn log_event(
        &self,
        stage: &str,
        substage_id: &str,
        status: SubstageStatus,
        message: Option<&str>,
    ) -> SubstageLogEntry {
        let substage_name = self
            .substage(stage, substage_id)
            .map(|substage| substage.name.clone())
            .unwrap_or_else(|| substage_id.to_string());

        let message = match message {
            Some(message) => message.to_string(),
            None => format!("{} {}", status.label(), substage_name),
        };

        SubstageLogEntry {
            stage: StageKey::new(stage),
            substage_id: substage_id.to_string(),
            substage_name,
            status,
            message,
            timestamp: Utc::now(),
            progress: status.progress(),
        }
    }
}

pub fn substages_of(stage: &str) -> Vec<Substage> {
    catalog().substages_of(stage).to_vec()
}

pub fn substage(stage: &str, substage_id: &str) -> Option<Substage> {
    catalog().substage(stage, substage_id).cloned()
}

pub fn next_substage(stage: &str, substage_id: &str) -> Option<Substage> {
    catalog().next_substage(stage, substage_id).cloned()
}

pub fn can_skip(stage: &str, substage_id: &str) -> bool {
    catalog().can_skip(stage, substage_id)
}

pub fn stage_progress(stage: &str, substage_id: &str) -> u32 {
    catalog().stage_progress(stage, substage_id)
}

pub fn is_valid_transition(stage: &str, from_id: &str, to_id: &str) -> bool {
    catalog().is_valid_transition(stage, from_id, to_id)
}

pub fn log_event(
    stage: &str,
    substage_id: &str,
    status: SubstageStatus,
    message: Option<&str>,
) -> SubstageLogEntry {
    catalog().log_event(stage, substage_id, status, message)
}
