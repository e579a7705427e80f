//! Per-stage substage tables
//!
//! The default tables are built once per process. Reconfiguration never
//! mutates a table in place: `publish_catalog` swaps in a new immutable
//! snapshot, and readers holding the previous `Arc` keep seeing it whole.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, LazyLock, RwLock};
use thiserror::Error;

use super::types::{Substage, Transition};
use crate::workflows::Stage;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Unknown stage '{0}' in catalog")]
    UnknownStage(String),
    #[error("Stage {stage} defines no substages")]
    EmptyStage { stage: Stage },
    #[error("Duplicate substage id '{id}' in stage {stage}")]
    DuplicateSubstage { stage: Stage, id: String },
    #[error("Transition in stage {stage} references unknown substage '{id}'")]
    UnknownTransitionTarget { stage: Stage, id: String },
    #[error("Substage '{id}' in stage {stage} has more than one transition")]
    DuplicateTransition { stage: Stage, id: String },
    #[error("Transition in stage {stage} moves back from '{from}' to '{next}'")]
    BackwardTransition {
        stage: Stage,
        from: String,
        next: String,
    },
    #[error("Stage {stage} is defined more than once (as '{name}')")]
    DuplicateStage { stage: Stage, name: String },
}

/// Substages of one stage, in execution order, plus their default transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub substages: Vec<Substage>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

impl StageDefinition {
    pub fn position(&self, substage_id: &str) -> Option<usize> {
        self.substages
            .iter()
            .position(|substage| substage.id == substage_id)
    }

    pub fn substage(&self, substage_id: &str) -> Option<&Substage> {
        self.substages
            .iter()
            .find(|substage| substage.id == substage_id)
    }

    pub fn transition(&self, from: &str) -> Option<&Transition> {
        self.transitions
            .iter()
            .find(|transition| transition.from == from)
    }

    fn validate(&self, stage: Stage) -> Result<(), CatalogError> {
        if self.substages.is_empty() {
            return Err(CatalogError::EmptyStage { stage });
        }

        let mut ids = HashSet::new();
        for substage in &self.substages {
            if !ids.insert(substage.id.as_str()) {
                return Err(CatalogError::DuplicateSubstage {
                    stage,
                    id: substage.id.clone(),
                });
            }
        }

        let mut sources = HashSet::new();
        for transition in &self.transitions {
            let referenced = std::iter::once(transition.from.as_str()).chain(transition.next.as_deref());
            for id in referenced {
                if !ids.contains(id) {
                    return Err(CatalogError::UnknownTransitionTarget {
                        stage,
                        id: id.to_string(),
                    });
                }
            }
            if !sources.insert(transition.from.as_str()) {
                return Err(CatalogError::DuplicateTransition {
                    stage,
                    id: transition.from.clone(),
                });
            }
            if let Some(next) = &transition.next {
                if self.position(next) <= self.position(&transition.from) {
                    return Err(CatalogError::BackwardTransition {
                        stage,
                        from: transition.from.clone(),
                        next: next.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Process-wide substage configuration for every known stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstageCatalog {
    stages: BTreeMap<Stage, StageDefinition>,
}

impl Default for SubstageCatalog {
    fn default() -> Self {
        Self::default_tables()
    }
}

impl SubstageCatalog {
    /// Built-in tables for all seven stages
    pub fn default_tables() -> Self {
        let stages = Stage::all()
            .into_iter()
            .map(|stage| (stage, default_definition(stage)))
            .collect();
        Self { stages }
    }

    pub fn definition(&self, stage: Stage) -> Option<&StageDefinition> {
        self.stages.get(&stage)
    }

    pub fn stages(&self) -> impl Iterator<Item = (Stage, &StageDefinition)> {
        self.stages.iter().map(|(stage, definition)| (*stage, definition))
    }

    /// Replace whole stage definitions, keeping the rest. Every replacement
    /// is validated before anything is applied.
    pub fn with_overrides(
        mut self,
        overrides: BTreeMap<Stage, StageDefinition>,
    ) -> Result<Self, CatalogError> {
        for (stage, definition) in &overrides {
            definition.validate(*stage)?;
        }
        self.stages.extend(overrides);
        Ok(self)
    }

    /// Default tables overridden by the stages named in a TOML document:
    ///
    /// ```toml
    /// [[build.substages]]
    /// id = "setup"
    /// name = "Environment Setup"
    ///
    /// [[build.transitions]]
    /// from = "setup"
    /// canSkip = false
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let raw: BTreeMap<String, StageDefinition> = toml::from_str(content)?;

        let mut overrides = BTreeMap::new();
        for (name, definition) in raw {
            let stage = Stage::parse(&name).ok_or_else(|| CatalogError::UnknownStage(name.clone()))?;
            if overrides.insert(stage, definition).is_some() {
                return Err(CatalogError::DuplicateStage { stage, name });
            }
        }

        Self::default_tables().with_overrides(overrides)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

static CATALOG: LazyLock<RwLock<Arc<SubstageCatalog>>> =
    LazyLock::new(|| RwLock::new(Arc::new(SubstageCatalog::default_tables())));

/// Current catalog snapshot
pub fn catalog() -> Arc<SubstageCatalog> {
    let guard = CATALOG.read().unwrap_or_else(|poisoned| poisoned.into_inner());
    Arc::clone(&guard)
}

/// Publish a new catalog snapshot. Returns the snapshot now in effect.
pub fn publish_catalog(next: SubstageCatalog) -> Arc<SubstageCatalog> {
    let next = Arc::new(next);
    let mut guard = CATALOG.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = Arc::clone(&next);
    tracing::info!(
        stages = next.stages.len(),
        "Published substage catalog"
    );
    next
}

fn definition(substages: Vec<Substage>, transitions: Vec<Transition>) -> StageDefinition {
    StageDefinition {
        substages,
        transitions,
    }
}

fn default_definition(stage: Stage) -> StageDefinition {
    match stage {
        Stage::Plan => definition(
            vec![
                Substage::new(
                    "analyze",
                    "Analyze Requirements",
                    "Read the issue and extract the requirements to satisfy",
                    "1-2 min",
                    &["requirements summary"],
                ),
                Substage::new(
                    "research",
                    "Research Codebase",
                    "Locate the files and patterns the change will touch",
                    "2-3 min",
                    &["relevant files"],
                ),
                Substage::new(
                    "design",
                    "Design Solution",
                    "Choose an approach and outline the implementation",
                    "2-4 min",
                    &["design notes"],
                ),
                Substage::new(
                    "breakdown",
                    "Break Down Tasks",
                    "Split the design into ordered implementation steps",
                    "1-2 min",
                    &["plan.md"],
                ),
            ],
            vec![
                Transition::new("analyze", Some("research"), false),
                Transition::new("research", Some("design"), true),
                Transition::new("design", Some("breakdown"), true),
                Transition::new("breakdown", None, false),
            ],
        ),
        Stage::Build => definition(
            vec![
                Substage::new(
                    "setup",
                    "Environment Setup",
                    "Prepare the isolated worktree and install dependencies",
                    "1-2 min",
                    &["worktree"],
                ),
                Substage::new(
                    "implement",
                    "Implement Changes",
                    "Apply the planned code changes",
                    "5-15 min",
                    &["source changes"],
                ),
                Substage::new(
                    "verify",
                    "Verify Build",
                    "Compile and lint the changed code",
                    "1-3 min",
                    &["build log"],
                ),
            ],
            vec![
                Transition::new("setup", Some("implement"), true),
                Transition::new("implement", Some("verify"), false),
                Transition::new("verify", None, false),
            ],
        ),
        Stage::Test => definition(
            vec![
                Substage::new(
                    "setup",
                    "Test Setup",
                    "Prepare fixtures and the test environment",
                    "1 min",
                    &[],
                ),
                Substage::new(
                    "unit",
                    "Unit Tests",
                    "Run the unit test suite",
                    "2-5 min",
                    &["unit test report"],
                ),
                Substage::new(
                    "integration",
                    "Integration Tests",
                    "Run tests that exercise components together",
                    "3-8 min",
                    &["integration test report"],
                ),
                Substage::new(
                    "e2e",
                    "End-to-End Tests",
                    "Drive the application through its public surface",
                    "5-10 min",
                    &["e2e report", "screenshots"],
                ),
            ],
            vec![
                Transition::new("setup", Some("unit"), true),
                Transition::new("unit", Some("integration"), false),
                Transition::new("integration", Some("e2e"), true),
                Transition::new("e2e", None, true),
            ],
        ),
        Stage::Review => definition(
            vec![
                Substage::new(
                    "analyze",
                    "Analyze Changes",
                    "Compare the implementation against the plan",
                    "1-2 min",
                    &[],
                ),
                Substage::new(
                    "quality",
                    "Code Quality",
                    "Check style, complexity, and maintainability",
                    "2-4 min",
                    &["quality findings"],
                ),
                Substage::new(
                    "security",
                    "Security Review",
                    "Look for unsafe input handling and leaked secrets",
                    "2-4 min",
                    &["security findings"],
                ),
                Substage::new(
                    "feedback",
                    "Compile Feedback",
                    "Summarize findings and blockers",
                    "1 min",
                    &["review.md"],
                ),
            ],
            vec![
                Transition::new("analyze", Some("quality"), false),
                Transition::new("quality", Some("security"), true),
                Transition::new("security", Some("feedback"), true),
                Transition::new("feedback", None, false),
            ],
        ),
        Stage::Document => definition(
            vec![
                Substage::new(
                    "analyze",
                    "Analyze Changes",
                    "Identify what changed and who needs to know",
                    "1 min",
                    &[],
                ),
                Substage::new(
                    "generate",
                    "Generate Documentation",
                    "Write or update the affected documentation",
                    "2-5 min",
                    &["docs"],
                ),
                Substage::new(
                    "review",
                    "Review Documentation",
                    "Proofread the generated documentation",
                    "1-2 min",
                    &[],
                ),
            ],
            vec![
                Transition::new("analyze", Some("generate"), false),
                Transition::new("generate", Some("review"), false),
                Transition::new("review", None, true),
            ],
        ),
        Stage::Pr => definition(
            vec![
                Substage::new(
                    "prepare",
                    "Prepare Branch",
                    "Commit outstanding work and push the branch",
                    "1 min",
                    &["pushed branch"],
                ),
                Substage::new(
                    "create",
                    "Create Pull Request",
                    "Open the pull request with a generated description",
                    "1 min",
                    &["pull request"],
                ),
                Substage::new(
                    "link",
                    "Link Issue",
                    "Cross-reference the pull request and its issue",
                    "< 1 min",
                    &[],
                ),
            ],
            vec![
                Transition::new("prepare", Some("create"), false),
                Transition::new("create", Some("link"), false),
                Transition::new("link", None, true),
            ],
        ),
        Stage::Errored => definition(
            vec![
                Substage::new(
                    "detect",
                    "Detect Failure",
                    "Capture the failing step and its output",
                    "< 1 min",
                    &["error log"],
                ),
                Substage::new(
                    "diagnose",
                    "Diagnose Cause",
                    "Classify the failure and find its likely cause",
                    "1-3 min",
                    &["diagnosis"],
                ),
                Substage::new(
                    "report",
                    "Report Failure",
                    "Post the failure summary back to the task",
                    "< 1 min",
                    &["error report"],
                ),
            ],
            vec![
                Transition::new("detect", Some("diagnose"), false),
                Transition::new("diagnose", Some("report"), true),
                Transition::new("report", None, false),
            ],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tables_cover_every_stage() {
        let catalog = SubstageCatalog::default_tables();
        for stage in Stage::all() {
            let definition = catalog.definition(stage).unwrap();
            assert!(definition.validate(stage).is_ok(), "{stage} table is invalid");
        }
    }

    #[test]
    fn test_every_default_stage_ends_in_terminal_transition() {
        let catalog = SubstageCatalog::default_tables();
        for (stage, definition) in catalog.stages() {
            let last = definition.substages.last().unwrap();
            let transition = definition.transition(&last.id).unwrap();
            assert!(transition.is_terminal(), "{stage} does not end its stage");
        }
    }

    #[test]
    fn test_build_has_three_substages() {
        let catalog = SubstageCatalog::default_tables();
        let build = catalog.definition(Stage::Build).unwrap();
        let ids: Vec<_> = build.substages.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["setup", "implement", "verify"]);
    }

    #[test]
    fn test_override_replaces_only_named_stage() {
        let content = r#"
            [[build.substages]]
            id = "compile"
            name = "Compile"

            [[build.substages]]
            id = "package"
            name = "Package"

            [[build.transitions]]
            from = "compile"
            next = "package"
            canSkip = true

            [[build.transitions]]
            from = "package"
        "#;

        let catalog = SubstageCatalog::from_toml_str(content).unwrap();
        let build = catalog.definition(Stage::Build).unwrap();
        assert_eq!(build.substages.len(), 2);
        assert!(build.transition("compile").unwrap().can_skip);
        assert!(build.transition("package").unwrap().is_terminal());

        let plan = catalog.definition(Stage::Plan).unwrap();
        assert_eq!(plan, SubstageCatalog::default_tables().definition(Stage::Plan).unwrap());
    }

    #[test]
    fn test_override_rejects_unknown_stage() {
        let content = r#"
            [[deploy.substages]]
            id = "ship"
            name = "Ship"
        "#;
        let err = SubstageCatalog::from_toml_str(content).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownStage(name) if name == "deploy"));
    }

    #[test]
    fn test_override_rejects_duplicate_ids() {
        let content = r#"
            [[pr.substages]]
            id = "create"
            name = "Create"

            [[pr.substages]]
            id = "create"
            name = "Create again"
        "#;
        let err = SubstageCatalog::from_toml_str(content).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateSubstage { stage: Stage::Pr, .. }));
    }

    #[test]
    fn test_override_rejects_dangling_transition() {
        let content = r#"
            [[pr.substages]]
            id = "create"
            name = "Create"

            [[pr.transitions]]
            from = "create"
            next = "merge"
        "#;
        let err = SubstageCatalog::from_toml_str(content).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::UnknownTransitionTarget { stage: Stage::Pr, id } if id == "merge"
        ));
    }

    #[test]
    fn test_override_rejects_backward_default_path() {
        let content = r#"
            [[pr.substages]]
            id = "a"
            name = "A"

            [[pr.substages]]
            id = "b"
            name = "B"

            [[pr.transitions]]
            from = "a"
            next = "b"

            [[pr.transitions]]
            from = "b"
            next = "a"
        "#;
        let err = SubstageCatalog::from_toml_str(content).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::BackwardTransition { stage: Stage::Pr, from, next }
                if from == "b" && next == "a"
        ));
    }

    #[test]
    fn test_override_rejects_self_loop() {
        let content = r#"
            [[pr.substages]]
            id = "a"
            name = "A"

            [[pr.transitions]]
            from = "a"
            next = "a"
        "#;
        let err = SubstageCatalog::from_toml_str(content).unwrap_err();
        assert!(matches!(err, CatalogError::BackwardTransition { .. }));
    }

    #[test]
    fn test_override_rejects_stage_named_twice() {
        let content = r#"
            [[build.substages]]
            id = "compile"
            name = "Compile"

            [[Build.substages]]
            id = "package"
            name = "Package"
        "#;
        let err = SubstageCatalog::from_toml_str(content).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateStage { stage: Stage::Build, .. }));
    }

    #[test]
    fn test_override_rejects_empty_stage() {
        let err = SubstageCatalog::from_toml_str("[review]\nsubstages = []\n").unwrap_err();
        assert!(matches!(err, CatalogError::EmptyStage { stage: Stage::Review }));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let err = SubstageCatalog::from_toml_str("[[plan.substages]\n").unwrap_err();
        assert!(matches!(err, CatalogError::Parse(_)));
    }
}
