//! Routing Policy
//!
//! Pure decision functions over evaluator output. Structural changes always
//! win over semantic issues: a structural pass may delete or rename the
//! sections that semantic suggestions point at.

use crate::content::{ContractViolation, EvaluationResult, Findings, NextAction};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One node of the control loop, or the decision to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    GenerateDraft,
    Evaluate,
    SemanticRefine,
    StructuralRefine,
    Terminate,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::GenerateDraft => "generate_draft",
            Stage::Evaluate => "evaluate",
            Stage::SemanticRefine => "semantic_refine",
            Stage::StructuralRefine => "structural_refine",
            Stage::Terminate => "terminate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a run begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryTrigger {
    /// Fresh generation from the user configuration.
    Generate,
    /// Evaluate (and refine) a document the caller already holds.
    Evaluate,
}

impl EntryTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryTrigger::Generate => "generate",
            EntryTrigger::Evaluate => "evaluate",
        }
    }
}

impl fmt::Display for EntryTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "generate" => Ok(EntryTrigger::Generate),
            "evaluate" => Ok(EntryTrigger::Evaluate),
            other => Err(format!(
                "Unknown trigger action: {} (expected 'generate' or 'evaluate')",
                other
            )),
        }
    }
}

/// First stage of a run for the given trigger.
pub fn entry_stage(trigger: EntryTrigger) -> Stage {
    match trigger {
        EntryTrigger::Generate => Stage::GenerateDraft,
        EntryTrigger::Evaluate => Stage::Evaluate,
    }
}

/// Next action implied by the issue lists alone; the stated field is ignored.
pub fn derive_next_action(result: &EvaluationResult) -> NextAction {
    if result.structural_changes.is_present() {
        NextAction::StructuralRefine
    } else if result.semantic_issues.is_present() {
        NextAction::SemanticRefine
    } else {
        NextAction::NoAction
    }
}

/// Stage to run after an evaluation.
pub fn next_stage(result: &EvaluationResult) -> Stage {
    match derive_next_action(result) {
        NextAction::StructuralRefine => Stage::StructuralRefine,
        NextAction::SemanticRefine => Stage::SemanticRefine,
        NextAction::NoAction => Stage::Terminate,
    }
}

/// Flags an evaluation whose stated `next_action` contradicts its findings.
pub fn check_declared_action(result: &EvaluationResult) -> Option<ContractViolation> {
    let derived = derive_next_action(result);
    if derived == result.next_action {
        None
    } else {
        Some(ContractViolation::DeclaredActionMismatch {
            declared: result.next_action,
            derived,
        })
    }
}

/// Applies the rigid/flexible structure policy to an evaluation.
///
/// In rigid mode structural changes are never acted on: they are stripped
/// from the returned result and reported as a violation instead.
pub fn apply_structure_policy(
    result: &EvaluationResult,
    dynamic_structure_allowed: bool,
) -> (EvaluationResult, Option<ContractViolation>) {
    let mut effective = result.clone();
    let mut violation = None;
    if !dynamic_structure_allowed && result.structural_changes.is_present() {
        violation = Some(ContractViolation::RigidModeStructuralChanges {
            count: result.structural_changes.len(),
        });
        effective.structural_changes = Findings::None;
    }
    effective.next_action = derive_next_action(&effective);
    (effective, violation)
}
