// Core types for substage tables and substage events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::workflows::StageKey;

/// A fine-grained step inside one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Substage {
    /// Unique within its stage
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Advisory only
    #[serde(default)]
    pub estimated_duration: String,
    /// Artifact names, advisory only
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl Substage {
    pub fn new(
        id: &str,
        name: &str,
        description: &str,
        estimated_duration: &str,
        outputs: &[&str],
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            estimated_duration: estimated_duration.to_string(),
            outputs: outputs.iter().map(|output| output.to_string()).collect(),
        }
    }
}

/// Default path out of a substage. `next: None` marks the last step of
/// the stage: execution moves on to the next stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub from: String,
    pub next: Option<String>,
    #[serde(default)]
    pub can_skip: bool,
}

impl Transition {
    pub fn new(from: &str, next: Option<&str>, can_skip: bool) -> Self {
        Self {
            from: from.to_string(),
            next: next.map(str::to_string),
            can_skip,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubstageStatus {
    Pending,
    Started,
    Completed,
    Failed,
    Skipped,
}

impl SubstageStatus {
    /// Progress reported alongside a log entry of this status
    pub fn progress(self) -> u32 {
        match self {
            SubstageStatus::Completed => 100,
            SubstageStatus::Started => 10,
            _ => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubstageStatus::Pending => "pending",
            SubstageStatus::Started => "started",
            SubstageStatus::Completed => "completed",
            SubstageStatus::Failed => "failed",
            SubstageStatus::Skipped => "skipped",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SubstageStatus::Pending => "Pending",
            SubstageStatus::Started => "Started",
            SubstageStatus::Completed => "Completed",
            SubstageStatus::Failed => "Failed",
            SubstageStatus::Skipped => "Skipped",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "pending" => Some(SubstageStatus::Pending),
            "started" => Some(SubstageStatus::Started),
            "completed" => Some(SubstageStatus::Completed),
            "failed" => Some(SubstageStatus::Failed),
            "skipped" => Some(SubstageStatus::Skipped),
            _ => None,
        }
    }
}

impl fmt::Display for SubstageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ephemeral record of one substage event. Persisting it is the caller's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstageLogEntry {
    pub stage: StageKey,
    pub substage_id: String,
    pub substage_name: String,
    pub status: SubstageStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub progress: u32,
}
