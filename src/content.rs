//! Content Model
//!
//! Typed records exchanged between the stages of a run: the caller's request
//! (`UserConfig`), the produced document (`GeneratedDocument`), and evaluator
//! output (`EvaluationResult`). Validation here is parse-time only; routing
//! decisions live in [`crate::routing`].

use crate::error::{ContentError, ValidationError};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// One section the caller asks for. Both fields are optional; order is meaningful.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpec {
    #[serde(default)]
    pub section_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl SectionSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            section_name: Some(name.into()),
            description: Some(description.into()),
        }
    }
}

/// Immutable input for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    pub main_topic: String,

    #[serde(default)]
    pub sections: Vec<SectionSpec>,

    #[serde(default, alias = "expected_sections_count", deserialize_with = "de_optional_count")]
    pub expected_section_count: Option<u32>,

    #[serde(default)]
    pub constraints: String,

    #[serde(default)]
    pub context: String,

    /// Flexible mode when true: the evaluator may propose structural changes.
    #[serde(default, alias = "dynamic_generation", deserialize_with = "de_flag")]
    pub dynamic_structure_allowed: bool,
}

impl UserConfig {
    pub fn new(main_topic: impl Into<String>) -> Self {
        Self {
            main_topic: main_topic.into(),
            ..Self::default()
        }
    }

    /// Reject requests that must never reach the orchestrator.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.main_topic.trim().is_empty() {
            return Err(ValidationError::EmptyTopic);
        }
        Ok(())
    }
}

/// One unit of produced content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSection {
    pub section_name: String,
    #[serde(default)]
    pub content: String,
}

impl GeneratedSection {
    pub fn new(section_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            section_name: section_name.into(),
            content: content.into(),
        }
    }
}

/// Ordered sections with unique names. Wire form: `{"generated_content": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedDocument {
    #[serde(rename = "generated_content")]
    pub sections: Vec<GeneratedSection>,
}

impl GeneratedDocument {
    pub fn new(sections: Vec<GeneratedSection>) -> Self {
        Self { sections }
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeneratedSection> {
        self.sections.iter()
    }

    /// Section names in document order.
    pub fn names(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.section_name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&GeneratedSection> {
        self.sections.iter().find(|s| s.section_name == name)
    }

    /// At least one section; names must be non-blank and unique.
    pub fn validate(&self) -> Result<(), ContentError> {
        if self.sections.is_empty() {
            return Err(ContentError::EmptyDocument);
        }
        let mut seen = HashSet::new();
        for (index, section) in self.sections.iter().enumerate() {
            if section.section_name.trim().is_empty() {
                return Err(ContentError::BlankSectionName(index));
            }
            if !seen.insert(section.section_name.as_str()) {
                return Err(ContentError::DuplicateSectionName(
                    section.section_name.clone(),
                ));
            }
        }
        Ok(())
    }

    /// Validation applied to documents supplied by a caller for evaluation.
    pub fn validate_input(&self) -> Result<(), ValidationError> {
        if self.sections.is_empty() {
            return Err(ValidationError::EmptyDocument);
        }
        let mut seen = HashSet::new();
        for (index, section) in self.sections.iter().enumerate() {
            if section.section_name.trim().is_empty() {
                return Err(ValidationError::BlankSectionName { index });
            }
            if !seen.insert(section.section_name.as_str()) {
                return Err(ValidationError::DuplicateSectionName(
                    section.section_name.clone(),
                ));
            }
        }
        Ok(())
    }
}

/// A wording or coherence defect local to one existing section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticIssue {
    pub section_name: String,
    pub issue: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructuralAction {
    Add,
    Remove,
    Rename,
    Reorder,
}

impl StructuralAction {
    pub fn as_str(self) -> &'static str {
        match self {
            StructuralAction::Add => "add",
            StructuralAction::Remove => "remove",
            StructuralAction::Rename => "rename",
            StructuralAction::Reorder => "reorder",
        }
    }
}

impl fmt::Display for StructuralAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change to the section set or order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralChange {
    pub action: StructuralAction,
    pub section_name: String,
    #[serde(default)]
    pub context: String,
}

/// Evaluator findings: the `"None"` sentinel or a list.
///
/// Kept distinct from an empty list; validation rejects `[]` so that a
/// present list always carries at least one finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Findings<T> {
    None,
    List(Vec<T>),
}

impl<T> Default for Findings<T> {
    fn default() -> Self {
        Findings::None
    }
}

impl<T> Findings<T> {
    pub fn is_none(&self) -> bool {
        matches!(self, Findings::None)
    }

    pub fn is_present(&self) -> bool {
        !self.is_none()
    }

    pub fn items(&self) -> &[T] {
        match self {
            Findings::None => &[],
            Findings::List(items) => items,
        }
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }
}

impl<T> From<Vec<T>> for Findings<T> {
    fn from(items: Vec<T>) -> Self {
        Findings::List(items)
    }
}

impl<T: Serialize> Serialize for Findings<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Findings::None => serializer.serialize_str("None"),
            Findings::List(items) => items.serialize(serializer),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FindingsRepr<T> {
    Sentinel(String),
    List(Vec<T>),
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Findings<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<FindingsRepr<T>>::deserialize(deserializer)? {
            None => Ok(Findings::None),
            Some(FindingsRepr::List(items)) => Ok(Findings::List(items)),
            Some(FindingsRepr::Sentinel(s)) if s.trim().eq_ignore_ascii_case("none") => {
                Ok(Findings::None)
            }
            Some(FindingsRepr::Sentinel(s)) => Err(de::Error::custom(format!(
                "expected \"None\" or a list, got string {:?}",
                s
            ))),
        }
    }
}

/// Routing decision stated by (or derived from) an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    SemanticRefine,
    StructuralRefine,
    NoAction,
}

impl NextAction {
    pub fn as_str(self) -> &'static str {
        match self {
            NextAction::SemanticRefine => "semantic_refine",
            NextAction::StructuralRefine => "structural_refine",
            NextAction::NoAction => "no_action",
        }
    }
}

impl fmt::Display for NextAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluator output for one evaluation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub coherency_score: f64,
    pub semantic_issues: Findings<SemanticIssue>,
    pub structural_changes: Findings<StructuralChange>,
    pub next_action: NextAction,
    /// Human-facing only; never read by routing.
    #[serde(default, alias = "diagnostic_summary")]
    pub evaluator_diagnostic_summary: String,
}

impl EvaluationResult {
    pub fn validate(&self) -> Result<(), ContentError> {
        if !self.coherency_score.is_finite() || !(0.0..=1.0).contains(&self.coherency_score) {
            return Err(ContentError::ScoreOutOfRange(self.coherency_score));
        }
        if matches!(&self.semantic_issues, Findings::List(items) if items.is_empty()) {
            return Err(ContentError::EmptyFindings {
                field: "semantic_issues",
            });
        }
        if matches!(&self.structural_changes, Findings::List(items) if items.is_empty()) {
            return Err(ContentError::EmptyFindings {
                field: "structural_changes",
            });
        }
        Ok(())
    }
}

/// Producer output that breaks an invariant the loop depends on without being a call failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContractViolation {
    /// Stated `next_action` disagrees with the issue lists.
    DeclaredActionMismatch {
        declared: NextAction,
        derived: NextAction,
    },
    /// Structural changes returned while structure is fixed by the caller.
    RigidModeStructuralChanges { count: usize },
    /// A semantic refinement added or dropped section names.
    SectionNamesChanged {
        added: Vec<String>,
        removed: Vec<String>,
    },
    /// A structural refinement rewrote a section no change targeted.
    UntouchedSectionModified { section_name: String },
    /// A structural refinement dropped a section no change targeted.
    UntouchedSectionDropped { section_name: String },
    /// Structural refinement was entered without any structural changes.
    EmptyStructuralRefine,
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractViolation::DeclaredActionMismatch { declared, derived } => write!(
                f,
                "evaluator declared {} but its findings imply {}",
                declared, derived
            ),
            ContractViolation::RigidModeStructuralChanges { count } => write!(
                f,
                "evaluator proposed {} structural change(s) in rigid mode",
                count
            ),
            ContractViolation::SectionNamesChanged { added, removed } => write!(
                f,
                "semantic refinement changed section names (added: {:?}, removed: {:?})",
                added, removed
            ),
            ContractViolation::UntouchedSectionModified { section_name } => write!(
                f,
                "structural refinement modified untouched section {:?}",
                section_name
            ),
            ContractViolation::UntouchedSectionDropped { section_name } => write!(
                f,
                "structural refinement dropped untouched section {:?}",
                section_name
            ),
            ContractViolation::EmptyStructuralRefine => {
                f.write_str("structural refinement requested without structural changes")
            }
        }
    }
}

fn de_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => Ok(value),
        Flag::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" | "" => Ok(false),
            other => Err(de::Error::custom(format!(
                "expected true or false, got {:?}",
                other
            ))),
        },
    }
}

fn de_optional_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Number(u32),
        Text(String),
    }

    match Option::<Count>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Count::Number(n)) => Ok(Some(n)),
        Some(Count::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Count::Text(text)) => text
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid section count {:?}", text))),
    }
}
