//! Workflow name decoding
//!
//! A workflow is named by concatenating its stage tokens inside an
//! `adw_..._iso` envelope, e.g. `adw_plan_build_test_iso`. Decoding is a
//! pure function: the same identifier always yields the same sequence.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::stage::StageKey;

const PREFIX: &str = "adw_";
const SUFFIX: &str = "_iso";
const SDLC_TOKEN: &str = "sdlc";
const SDLC_STAGES: [&str; 5] = ["plan", "build", "test", "review", "document"];
const DISPLAY_SEPARATOR: &str = " → ";

/// Ordered stages of one workflow. Order defines execution order and
/// equal `1/len` progress weighting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<StageKey>", into = "Vec<StageKey>")]
pub struct StageSequence(Vec<StageKey>);

impl From<Vec<StageKey>> for StageSequence {
    fn from(stages: Vec<StageKey>) -> Self {
        Self::new(stages)
    }
}

impl From<StageSequence> for Vec<StageKey> {
    fn from(sequence: StageSequence) -> Self {
        sequence.0
    }
}

impl StageSequence {
    pub fn new<I, S>(stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StageKey>,
    {
        Self(
            stages
                .into_iter()
                .map(Into::into)
                .filter(|key: &StageKey| !key.is_empty())
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn stages(&self) -> &[StageKey] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<&StageKey> {
        self.0.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StageKey> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a StageSequence {
    type Item = &'a StageKey;
    type IntoIter = std::slice::Iter<'a, StageKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Decode a workflow identifier into its ordered stage list.
///
/// Prefix and suffix are stripped independently. Empty segments from
/// repeated, leading, or trailing underscores are dropped. Empty input
/// yields an empty sequence, which callers treat as an unknown workflow.
pub fn decode(identifier: &str) -> StageSequence {
    let body = identifier.strip_prefix(PREFIX).unwrap_or(identifier);
    let body = body.strip_suffix(SUFFIX).unwrap_or(body);

    if body == SDLC_TOKEN {
        return StageSequence::new(SDLC_STAGES);
    }

    StageSequence::new(body.split('_').filter(|segment| !segment.is_empty()))
}

/// `None` stands in for a missing identifier in task metadata
pub fn decode_optional(identifier: Option<&str>) -> StageSequence {
    identifier.map(decode).unwrap_or_default()
}

/// True iff the identifier has the full `adw_..._iso` envelope and
/// decodes to at least one stage
pub fn is_valid_identifier(identifier: &str) -> bool {
    let has_envelope = identifier.starts_with(PREFIX) && identifier.ends_with(SUFFIX);
    has_envelope && !decode(identifier).is_empty()
}

/// Human-readable stage chain, e.g. `Plan → Build → Test`. Display only.
pub fn format_workflow_name(identifier: &str) -> String {
    decode(identifier)
        .iter()
        .map(StageKey::capitalized)
        .collect::<Vec<_>>()
        .join(DISPLAY_SEPARATOR)
}

/// An opaque workflow identifier as read from task metadata
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowIdentifier(String);

impl WorkflowIdentifier {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn stages(&self) -> StageSequence {
        decode(&self.0)
    }

    pub fn is_valid(&self) -> bool {
        is_valid_identifier(&self.0)
    }

    pub fn display_name(&self) -> String {
        format_workflow_name(&self.0)
    }
}

impl From<&str> for WorkflowIdentifier {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl fmt::Display for WorkflowIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(sequence: &StageSequence) -> Vec<&str> {
        sequence.iter().map(StageKey::as_str).collect()
    }

    #[test]
    fn test_decode_standard_identifier() {
        let sequence = decode("adw_plan_build_test_iso");
        assert_eq!(names(&sequence), vec!["plan", "build", "test"]);
    }

    #[test]
    fn test_decode_sdlc_shorthand() {
        let sequence = decode("adw_sdlc_iso");
        assert_eq!(
            names(&sequence),
            vec!["plan", "build", "test", "review", "document"]
        );
        // Only the whole body triggers the shorthand
        assert_eq!(names(&decode("adw_sdlc_pr_iso")), vec!["sdlc", "pr"]);
    }

    #[test]
    fn test_decode_is_forgiving_about_envelope() {
        assert_eq!(names(&decode("plan_build_iso")), vec!["plan", "build"]);
        assert_eq!(names(&decode("adw_plan_build")), vec!["plan", "build"]);
        assert_eq!(names(&decode("plan_build")), vec!["plan", "build"]);
        assert_eq!(names(&decode("sdlc")).len(), 5);
    }

    #[test]
    fn test_decode_drops_empty_segments() {
        assert_eq!(names(&decode("adw_plan__build_iso")), vec!["plan", "build"]);
        assert_eq!(names(&decode("adw__plan_build___iso")), vec!["plan", "build"]);
    }

    #[test]
    fn test_decode_lowercases_tokens() {
        assert_eq!(names(&decode("adw_Plan_BUILD_iso")), vec!["plan", "build"]);
    }

    #[test]
    fn test_decode_empty_and_missing() {
        assert!(decode("").is_empty());
        assert!(decode("adw__iso").is_empty());
        assert!(decode_optional(None).is_empty());
        assert_eq!(names(&decode_optional(Some("adw_pr_iso"))), vec!["pr"]);
    }

    #[test]
    fn test_decode_keeps_whitespace_segments() {
        assert_eq!(names(&decode("adw_plan_ _iso")), vec!["plan", " "]);
    }

    #[test]
    fn test_deserialized_sequence_is_canonical() {
        let sequence: StageSequence = serde_json::from_str(r#"["Plan","BUILD",""]"#).unwrap();
        assert_eq!(names(&sequence), vec!["plan", "build"]);
        assert_eq!(sequence.len(), 2);
        assert_eq!(sequence.index_of("build"), Some(1));
        assert_eq!(sequence.completion_percentage("build"), 100);

        let json = serde_json::to_string(&sequence).unwrap();
        assert_eq!(json, r#"["plan","build"]"#);
        assert_eq!(serde_json::from_str::<StageSequence>(&json).unwrap(), sequence);
    }

    #[test]
    fn test_decode_is_deterministic() {
        let id = "adw_plan_build_review_iso";
        assert_eq!(decode(id), decode(id));
    }

    #[test]
    fn test_is_valid_identifier() {
        assert!(is_valid_identifier("adw_plan_build_iso"));
        assert!(is_valid_identifier("adw_sdlc_iso"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("plan_build_iso"));
        assert!(!is_valid_identifier("adw_plan_build"));
        assert!(!is_valid_identifier("adw__iso"));
        // Literal envelope holds and the body decodes to one stage
        assert!(is_valid_identifier("adw_iso"));
        assert_eq!(names(&decode("adw_iso")), vec!["iso"]);
    }

    #[test]
    fn test_format_workflow_name() {
        assert_eq!(
            format_workflow_name("adw_plan_build_test_iso"),
            "Plan → Build → Test"
        );
        assert_eq!(format_workflow_name(""), "");
    }

    #[test]
    fn test_workflow_identifier_wrapper() {
        let id = WorkflowIdentifier::from("adw_plan_pr_iso");
        assert!(id.is_valid());
        assert_eq!(id.stages().len(), 2);
        assert_eq!(id.display_name(), "Plan → Pr");
        assert_eq!(id.to_string(), "adw_plan_pr_iso");
    }
}
