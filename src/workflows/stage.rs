use serde::{Deserialize, Serialize};
use std::fmt;

/// One element of a stage sequence, always stored lowercase.
///
/// This is the only place stage names are canonicalized; everything
/// downstream compares `StageKey`s directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct StageKey(String);

impl StageKey {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First letter uppercased, used by the display formatter
    pub fn capitalized(&self) -> String {
        capitalize(&self.0)
    }
}

impl From<&str> for StageKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for StageKey {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<StageKey> for String {
    fn from(key: StageKey) -> Self {
        key.0
    }
}

impl AsRef<str> for StageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The closed set of stages that carry substage tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Plan,
    Build,
    Test,
    Review,
    Document,
    Pr,
    Errored,
}

impl Stage {
    pub fn all() -> [Stage; 7] {
        [
            Stage::Plan,
            Stage::Build,
            Stage::Test,
            Stage::Review,
            Stage::Document,
            Stage::Pr,
            Stage::Errored,
        ]
    }

    pub fn from_key(key: &StageKey) -> Option<Self> {
        match key.as_str() {
            "plan" => Some(Stage::Plan),
            "build" => Some(Stage::Build),
            "test" => Some(Stage::Test),
            "review" => Some(Stage::Review),
            "document" => Some(Stage::Document),
            "pr" => Some(Stage::Pr),
            "errored" => Some(Stage::Errored),
            _ => None,
        }
    }

    /// Lenient lookup from raw caller input
    pub fn parse(name: &str) -> Option<Self> {
        Self::from_key(&StageKey::new(name))
    }

    pub fn key(self) -> StageKey {
        StageKey(self.as_str().to_string())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Plan => "plan",
            Stage::Build => "build",
            Stage::Test => "test",
            Stage::Review => "review",
            Stage::Document => "document",
            Stage::Pr => "pr",
            Stage::Errored => "errored",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Stage::Plan => "Planning",
            Stage::Build => "Building",
            Stage::Test => "Testing",
            Stage::Review => "Review",
            Stage::Document => "Documentation",
            Stage::Pr => "Pull Request",
            Stage::Errored => "Error Recovery",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
