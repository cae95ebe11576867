//! Orchestrator
//!
//! Runs the draft → evaluate → refine → evaluate loop for one request. A run
//! owns its `RunState` exclusively and executes stages strictly in sequence;
//! separate runs share nothing mutable and may execute concurrently on the
//! same `Orchestrator`.
//!
//! Every refinement is followed by an evaluation, and the only successful
//! exit is an evaluation whose findings derive `no_action`. The number of
//! refinement passes is capped by `workflow.max_refinements`.

use crate::config::{MinidocsConfig, DEFAULT_MAX_REFINEMENTS};
use crate::content::{
    ContractViolation, EvaluationResult, Findings, GeneratedDocument, NextAction, SemanticIssue,
    StructuralChange, UserConfig,
};
use crate::error::{ConfigError, GenerationFailure, ValidationError, WorkflowError};
use crate::generation::GenerationService;
use crate::prompt::PromptTemplates;
use crate::routing::{
    apply_structure_policy, check_declared_action, entry_stage, next_stage, EntryTrigger, Stage,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// States of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Start,
    GenerateDraft,
    Evaluate,
    SemanticRefine,
    StructuralRefine,
    Terminated,
}

impl WorkflowState {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowState::Start => "start",
            WorkflowState::GenerateDraft => "generate_draft",
            WorkflowState::Evaluate => "evaluate",
            WorkflowState::SemanticRefine => "semantic_refine",
            WorkflowState::StructuralRefine => "structural_refine",
            WorkflowState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Stage> for WorkflowState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::GenerateDraft => WorkflowState::GenerateDraft,
            Stage::Evaluate => WorkflowState::Evaluate,
            Stage::SemanticRefine => WorkflowState::SemanticRefine,
            Stage::StructuralRefine => WorkflowState::StructuralRefine,
            Stage::Terminate => WorkflowState::Terminated,
        }
    }
}

/// Snapshot taken after one evaluation stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    /// 1-based position in the run.
    pub iteration: usize,
    pub coherency_score: f64,
    /// Route derived from the findings, after the structure policy.
    pub next_action: NextAction,
    /// Route the evaluator stated.
    pub declared_action: NextAction,
    pub diagnostic_summary: String,
    pub semantic_issues: Findings<SemanticIssue>,
    /// As returned, including changes discarded in rigid mode.
    pub structural_changes: Findings<StructuralChange>,
}

/// Append-only record of every evaluation in a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationHistory {
    entries: Vec<HistoryEntry>,
}

impl EvaluationHistory {
    fn record(&mut self, raw: &EvaluationResult, derived: NextAction) -> &HistoryEntry {
        let iteration = self.entries.len() + 1;
        self.entries.push(HistoryEntry {
            iteration,
            coherency_score: raw.coherency_score,
            next_action: derived,
            declared_action: raw.next_action,
            diagnostic_summary: raw.evaluator_diagnostic_summary.clone(),
            semantic_issues: raw.semantic_issues.clone(),
            structural_changes: raw.structural_changes.clone(),
        });
        &self.entries[iteration - 1]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// Score and summary per evaluation, in execution order.
    pub fn payload(&self) -> Vec<EvaluationSnapshot> {
        self.entries
            .iter()
            .map(|entry| EvaluationSnapshot {
                coherency_score: entry.coherency_score,
                evaluator_diagnostic_summary: entry.diagnostic_summary.clone(),
            })
            .collect()
    }
}

/// Mutable state of one run.
#[derive(Debug)]
pub struct RunState<'a> {
    pub user: &'a UserConfig,
    pub document: GeneratedDocument,
    /// Absent until the first evaluation completes.
    pub evaluation: Option<EvaluationResult>,
    pub history: EvaluationHistory,
}

impl<'a> RunState<'a> {
    pub fn new(user: &'a UserConfig, document: GeneratedDocument) -> Self {
        Self {
            user,
            document,
            evaluation: None,
            history: EvaluationHistory::default(),
        }
    }
}

/// A section tagged with a fresh identifier for client-side referencing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaggedSection {
    pub id: Uuid,
    pub section_name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationSnapshot {
    pub coherency_score: f64,
    pub evaluator_diagnostic_summary: String,
}

/// Result payload for a run entered through generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateResponse {
    pub generated_content: Vec<TaggedSection>,
    pub coherency_score: f64,
    pub evaluator_diagnostic_summary: String,
}

/// Result payload for a run entered through evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluateResponse {
    pub generated_content: Vec<TaggedSection>,
    pub eval_hist_payload: Vec<EvaluationSnapshot>,
}

/// A completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub trigger: EntryTrigger,
    pub document: GeneratedDocument,
    /// The accepting evaluation, with its derived `next_action`.
    pub evaluation: EvaluationResult,
    pub history: EvaluationHistory,
    pub trace: Vec<WorkflowState>,
    pub violations: Vec<ContractViolation>,
    pub refinements: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn tagged_sections(&self) -> Vec<TaggedSection> {
        self.document
            .iter()
            .map(|section| TaggedSection {
                id: Uuid::new_v4(),
                section_name: section.section_name.clone(),
                content: section.content.clone(),
            })
            .collect()
    }

    pub fn generate_response(&self) -> GenerateResponse {
        GenerateResponse {
            generated_content: self.tagged_sections(),
            coherency_score: self.evaluation.coherency_score,
            evaluator_diagnostic_summary: self.evaluation.evaluator_diagnostic_summary.clone(),
        }
    }

    pub fn evaluate_response(&self) -> EvaluateResponse {
        EvaluateResponse {
            generated_content: self.tagged_sections(),
            eval_hist_payload: self.history.payload(),
        }
    }

    /// Payload matching the entry point the run started from.
    pub fn response_json(&self) -> serde_json::Result<serde_json::Value> {
        match self.trigger {
            EntryTrigger::Generate => serde_json::to_value(self.generate_response()),
            EntryTrigger::Evaluate => serde_json::to_value(self.evaluate_response()),
        }
    }
}

/// Drives runs against a generation service.
#[derive(Clone)]
pub struct Orchestrator {
    service: GenerationService,
    templates: PromptTemplates,
    max_refinements: u32,
}

struct RunContext {
    run_id: Uuid,
    trace: Vec<WorkflowState>,
    violations: Vec<ContractViolation>,
}

impl RunContext {
    fn enter(&mut self, state: WorkflowState) {
        debug!(run_id = %self.run_id, state = %state, "Entering state");
        self.trace.push(state);
    }

    fn flag(&mut self, stage: Stage, violation: ContractViolation) {
        warn!(
            run_id = %self.run_id,
            stage = %stage,
            violation = %violation,
            "Contract violation"
        );
        self.violations.push(violation);
    }
}

impl Orchestrator {
    pub fn new(service: GenerationService, templates: PromptTemplates) -> Self {
        Self {
            service,
            templates,
            max_refinements: DEFAULT_MAX_REFINEMENTS,
        }
    }

    pub fn with_max_refinements(mut self, max_refinements: u32) -> Self {
        self.max_refinements = max_refinements;
        self
    }

    pub fn from_config(config: &MinidocsConfig) -> Result<Self, ConfigError> {
        let service = GenerationService::from_config(config)?;
        Ok(Self::new(service, PromptTemplates::from_config(&config.prompts))
            .with_max_refinements(config.workflow.max_refinements))
    }

    pub fn max_refinements(&self) -> u32 {
        self.max_refinements
    }

    /// Fresh generation from the user configuration.
    pub async fn run_generate(&self, user: &UserConfig) -> Result<RunOutcome, WorkflowError> {
        self.run(EntryTrigger::Generate, user, None).await
    }

    /// Evaluation, and refinement as needed, of a caller-supplied document.
    pub async fn run_evaluate(
        &self,
        user: &UserConfig,
        document: GeneratedDocument,
    ) -> Result<RunOutcome, WorkflowError> {
        self.run(EntryTrigger::Evaluate, user, Some(document)).await
    }

    pub async fn run(
        &self,
        trigger: EntryTrigger,
        user: &UserConfig,
        document: Option<GeneratedDocument>,
    ) -> Result<RunOutcome, WorkflowError> {
        user.validate()?;
        let initial = match trigger {
            EntryTrigger::Evaluate => {
                let document = document.ok_or(ValidationError::EmptyDocument)?;
                document.validate_input()?;
                document
            }
            EntryTrigger::Generate => {
                if document.is_some() {
                    debug!("Ignoring supplied document for a generate run");
                }
                GeneratedDocument::default()
            }
        };

        let mut ctx = RunContext {
            run_id: Uuid::new_v4(),
            trace: vec![WorkflowState::Start],
            violations: Vec::new(),
        };
        let mut state = RunState::new(user, initial);
        let started = Instant::now();
        let started_at = Utc::now();

        info!(
            run_id = %ctx.run_id,
            trigger = %trigger,
            topic = %user.main_topic,
            dynamic_structure_allowed = user.dynamic_structure_allowed,
            max_refinements = self.max_refinements,
            "Run started"
        );

        let result = self.drive(trigger, &mut state, &mut ctx).await;
        let (refinements, evaluation) = match result {
            Ok(accepted) => accepted,
            Err(err) => {
                error!(
                    run_id = %ctx.run_id,
                    stage = ?err.stage(),
                    evaluations = state.history.len(),
                    error = %err,
                    "Run failed"
                );
                return Err(err);
            }
        };

        let RunState {
            document, history, ..
        } = state;

        info!(
            run_id = %ctx.run_id,
            coherency_score = evaluation.coherency_score,
            evaluations = history.len(),
            refinements,
            sections = document.len(),
            violations = ctx.violations.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Run terminated"
        );

        Ok(RunOutcome {
            run_id: ctx.run_id,
            trigger,
            document,
            evaluation,
            history,
            trace: ctx.trace,
            violations: ctx.violations,
            refinements,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Executes stages until an evaluation accepts the document. Returns the
    /// refinement count and the accepting evaluation.
    async fn drive(
        &self,
        trigger: EntryTrigger,
        state: &mut RunState<'_>,
        ctx: &mut RunContext,
    ) -> Result<(u32, EvaluationResult), WorkflowError> {
        let user = state.user;
        let mut refinements = 0u32;

        if entry_stage(trigger) == Stage::GenerateDraft {
            ctx.enter(WorkflowState::GenerateDraft);
            let prompt = self.templates.draft_prompt(user);
            state.document = self
                .run_stage(ctx, Stage::GenerateDraft, self.service.generate_draft(&prompt))
                .await?;
        }

        loop {
            ctx.enter(WorkflowState::Evaluate);
            let prompt = self.templates.evaluation_prompt(user, &state.document);
            let raw = self
                .run_stage(ctx, Stage::Evaluate, self.service.evaluate(&prompt))
                .await?;

            if let Some(violation) = check_declared_action(&raw) {
                ctx.flag(Stage::Evaluate, violation);
            }
            let (effective, policy_violation) =
                apply_structure_policy(&raw, user.dynamic_structure_allowed);
            if let Some(violation) = policy_violation {
                ctx.flag(Stage::Evaluate, violation);
            }

            let entry = state.history.record(&raw, effective.next_action);
            let route = next_stage(&effective);
            info!(
                run_id = %ctx.run_id,
                iteration = entry.iteration,
                coherency_score = entry.coherency_score,
                route = %route,
                "Evaluation routed"
            );

            if route == Stage::Terminate {
                state.evaluation = Some(effective.clone());
                ctx.enter(WorkflowState::Terminated);
                return Ok((refinements, effective));
            }

            if refinements >= self.max_refinements {
                state.evaluation = Some(effective);
                return Err(WorkflowError::IterationLimit {
                    limit: self.max_refinements,
                });
            }
            refinements += 1;

            ctx.enter(route.into());
            let refined = match route {
                Stage::StructuralRefine => {
                    self.structural_refine(ctx, user, &state.document, &effective)
                        .await?
                }
                _ => {
                    self.semantic_refine(ctx, user, &state.document, &effective)
                        .await?
                }
            };
            state.document = refined;
            state.evaluation = Some(effective);
        }
    }

    async fn semantic_refine(
        &self,
        ctx: &mut RunContext,
        user: &UserConfig,
        document: &GeneratedDocument,
        evaluation: &EvaluationResult,
    ) -> Result<GeneratedDocument, WorkflowError> {
        let prompt = self
            .templates
            .semantic_refine_prompt(user, document, evaluation);
        let refined = self
            .run_stage(ctx, Stage::SemanticRefine, self.service.refine(&prompt))
            .await?;

        if let Some(violation) = name_changes(document, &refined) {
            ctx.flag(Stage::SemanticRefine, violation);
        }
        Ok(refined)
    }

    async fn structural_refine(
        &self,
        ctx: &mut RunContext,
        user: &UserConfig,
        document: &GeneratedDocument,
        evaluation: &EvaluationResult,
    ) -> Result<GeneratedDocument, WorkflowError> {
        if evaluation.structural_changes.is_empty() {
            ctx.flag(
                Stage::StructuralRefine,
                ContractViolation::EmptyStructuralRefine,
            );
            return Ok(document.clone());
        }

        let prompt = self
            .templates
            .structural_refine_prompt(user, document, evaluation);
        let refined = self
            .run_stage(ctx, Stage::StructuralRefine, self.service.refine(&prompt))
            .await?;

        for violation in untouched_changes(document, &refined, evaluation.structural_changes.items())
        {
            ctx.flag(Stage::StructuralRefine, violation);
        }
        Ok(refined)
    }

    async fn run_stage<T, F>(
        &self,
        ctx: &RunContext,
        stage: Stage,
        call: F,
    ) -> Result<T, WorkflowError>
    where
        F: Future<Output = Result<T, GenerationFailure>>,
    {
        info!(run_id = %ctx.run_id, stage = %stage, "Stage started");
        let started = Instant::now();
        match call.await {
            Ok(value) => {
                info!(
                    run_id = %ctx.run_id,
                    stage = %stage,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Stage completed"
                );
                Ok(value)
            }
            Err(source) => Err(WorkflowError::Stage { stage, source }),
        }
    }
}

/// Section names added or removed by a refinement that must keep them.
fn name_changes(
    before: &GeneratedDocument,
    after: &GeneratedDocument,
) -> Option<ContractViolation> {
    let old: HashSet<&str> = before.names().into_iter().collect();
    let new: HashSet<&str> = after.names().into_iter().collect();
    let added: Vec<String> = after
        .names()
        .into_iter()
        .filter(|name| !old.contains(name))
        .map(str::to_string)
        .collect();
    let removed: Vec<String> = before
        .names()
        .into_iter()
        .filter(|name| !new.contains(name))
        .map(str::to_string)
        .collect();
    if added.is_empty() && removed.is_empty() {
        None
    } else {
        Some(ContractViolation::SectionNamesChanged { added, removed })
    }
}

/// Sections no structural change names that were rewritten or dropped.
fn untouched_changes(
    before: &GeneratedDocument,
    after: &GeneratedDocument,
    changes: &[StructuralChange],
) -> Vec<ContractViolation> {
    let targeted: HashSet<&str> = changes.iter().map(|c| c.section_name.as_str()).collect();
    before
        .iter()
        .filter(|section| !targeted.contains(section.section_name.as_str()))
        .filter_map(|section| match after.get(&section.section_name) {
            None => Some(ContractViolation::UntouchedSectionDropped {
                section_name: section.section_name.clone(),
            }),
            Some(updated) if updated.content != section.content => {
                Some(ContractViolation::UntouchedSectionModified {
                    section_name: section.section_name.clone(),
                })
            }
            Some(_) => None,
        })
        .collect()
}
