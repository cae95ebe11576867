//! End-to-end runs through the orchestrator against a scripted provider

use super::support::{
    accept, document, fast_config, scripted_orchestrator, semantic, structural,
};
use async_trait::async_trait;
use minidocs::content::{
    ContractViolation, GeneratedDocument, GeneratedSection, NextAction, SectionSpec, UserConfig,
};
use minidocs::error::{ProviderError, WorkflowError};
use minidocs::generation::GenerationService;
use minidocs::prompt::PromptTemplates;
use minidocs::provider::{
    ChatMessage, CompletionOptions, CompletionResponse, ModelProviderClient, ScriptedProvider,
    TokenUsage,
};
use minidocs::routing::{EntryTrigger, Stage};
use minidocs::workflow::{Orchestrator, WorkflowState};
use std::sync::Arc;
use std::time::Duration;

fn soils(dynamic: bool) -> UserConfig {
    UserConfig {
        main_topic: "Intro to Soils".to_string(),
        sections: vec![
            SectionSpec::new("Intro", "What soil is"),
            SectionSpec::new("Layers", "Soil horizons"),
        ],
        expected_section_count: Some(2),
        constraints: "Plain language".to_string(),
        context: "High school audience".to_string(),
        dynamic_structure_allowed: dynamic,
    }
}

fn supplied_document() -> GeneratedDocument {
    GeneratedDocument::new(vec![
        GeneratedSection::new("Intro", "Soil is a living layer."),
        GeneratedSection::new("Layers", "Soils have horizons."),
    ])
}

#[tokio::test]
async fn generate_run_refines_semantically_until_accepted() {
    let provider = ScriptedProvider::new([
        document(&[("Intro", "Soil."), ("Layers", "Horizons.")]),
        semantic("Intro", "too short"),
        document(&[("Intro", "Soil is a living mix of minerals."), ("Layers", "Horizons.")]),
        accept(0.88, "Good."),
    ]);
    let outcome = scripted_orchestrator(&provider)
        .run_generate(&soils(false))
        .await
        .unwrap();

    assert_eq!(
        outcome.trace,
        vec![
            WorkflowState::Start,
            WorkflowState::GenerateDraft,
            WorkflowState::Evaluate,
            WorkflowState::SemanticRefine,
            WorkflowState::Evaluate,
            WorkflowState::Terminated,
        ]
    );
    assert_eq!(outcome.refinements, 1);
    assert_eq!(outcome.history.len(), 2);
    assert_eq!(
        outcome.document.get("Intro").map(|s| s.content.as_str()),
        Some("Soil is a living mix of minerals.")
    );

    let calls = provider.calls();
    assert_eq!(calls.len(), 4);
    assert!(calls[0].prompt().contains("Intro to Soils"));
    assert!(calls[1].prompt().contains("ALLOW_DYNAMIC_CONTENT_GENERATION = false"));
    assert!(calls[2].prompt().contains("too short"));
}

#[tokio::test]
async fn evaluate_run_in_flexible_mode_adds_a_section() {
    let provider = ScriptedProvider::new([
        structural("add", "Summary"),
        document(&[
            ("Intro", "Soil is a living layer."),
            ("Layers", "Soils have horizons."),
            ("Summary", "Soil matters."),
        ]),
        accept(0.9, "Complete."),
    ]);
    let outcome = scripted_orchestrator(&provider)
        .run(EntryTrigger::Evaluate, &soils(true), Some(supplied_document()))
        .await
        .unwrap();

    assert_eq!(outcome.document.names(), vec!["Intro", "Layers", "Summary"]);
    assert!(outcome.violations.is_empty());
    assert_eq!(
        outcome.trace,
        vec![
            WorkflowState::Start,
            WorkflowState::Evaluate,
            WorkflowState::StructuralRefine,
            WorkflowState::Evaluate,
            WorkflowState::Terminated,
        ]
    );

    let payload = outcome.evaluate_response().eval_hist_payload;
    assert_eq!(payload.len(), 2);
    assert_eq!(payload[1].evaluator_diagnostic_summary, "Complete.");
    let routes: Vec<NextAction> = outcome.history.iter().map(|e| e.next_action).collect();
    assert_eq!(routes, vec![NextAction::StructuralRefine, NextAction::NoAction]);
}

#[tokio::test]
async fn rigid_mode_discards_structural_proposals() {
    let provider = ScriptedProvider::new([structural("add", "Summary")]);
    let outcome = scripted_orchestrator(&provider)
        .run_evaluate(&soils(false), supplied_document())
        .await
        .unwrap();

    assert_eq!(outcome.document, supplied_document());
    assert_eq!(outcome.evaluation.next_action, NextAction::NoAction);
    assert_eq!(outcome.refinements, 0);
    assert!(outcome
        .violations
        .iter()
        .any(|v| matches!(v, ContractViolation::RigidModeStructuralChanges { count: 1 })));
    // The raw proposal stays in the history.
    assert_eq!(outcome.history.entries()[0].structural_changes.len(), 1);
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn persistent_malformed_evaluation_fails_the_evaluate_stage() {
    let provider = ScriptedProvider::new([
        document(&[("Intro", "Soil.")]),
        "The document looks fine to me.".to_string(),
        "{\"coherency_score\": \"high\"}".to_string(),
    ]);
    let err = scripted_orchestrator(&provider)
        .run_generate(&soils(false))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Evaluate));
    match err {
        WorkflowError::Stage { source, .. } => {
            assert_eq!(source.attempts, 2);
            assert_eq!(
                source.raw_response.as_deref(),
                Some("{\"coherency_score\": \"high\"}")
            );
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn generate_response_tags_each_section_with_a_unique_id() {
    let provider = ScriptedProvider::new([
        document(&[("Intro", "a"), ("Layers", "b")]),
        accept(0.95, "Ready."),
    ]);
    let outcome = scripted_orchestrator(&provider)
        .run_generate(&soils(false))
        .await
        .unwrap();

    let value = outcome.response_json().unwrap();
    let sections = value["generated_content"].as_array().unwrap();
    assert_eq!(sections.len(), 2);
    assert_ne!(sections[0]["id"], sections[1]["id"]);
    assert_eq!(sections[1]["section_name"], "Layers");
    assert_eq!(value["coherency_score"], 0.95);
    assert_eq!(value["evaluator_diagnostic_summary"], "Ready.");
}

/// Answers by topic so concurrent runs on one client stay independent.
/// "Basalt" is accepted on its first evaluation; "Estuaries" needs one
/// semantic pass first.
struct TopicRouter;

#[async_trait]
impl ModelProviderClient for TopicRouter {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        _options: CompletionOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        let prompt: String = messages.iter().map(|m| m.content.as_str()).collect();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let basalt = prompt.contains("Basalt");
        let content = if prompt.contains("high-signal evaluator") {
            if basalt || prompt.contains("ESTUARY_REVISED") {
                accept(0.9, "Ready.")
            } else {
                semantic("Estuaries", "too thin")
            }
        } else if prompt.contains("expert rewriting model") {
            document(&[("Estuaries", "ESTUARY_REVISED")])
        } else if basalt {
            document(&[("Basalt", "BASALT_DRAFT"), ("Formation", "Cooling lava.")])
        } else {
            document(&[("Estuaries", "ESTUARY_DRAFT")])
        };

        Ok(CompletionResponse {
            content,
            model: "router".to_string(),
            usage: TokenUsage::default(),
            finish_reason: Some("stop".to_string()),
        })
    }

    fn provider_name(&self) -> &str {
        "router"
    }

    fn model_name(&self) -> &str {
        "router"
    }
}

#[tokio::test]
async fn concurrent_runs_on_one_orchestrator_stay_independent() {
    let client: Arc<dyn ModelProviderClient> = Arc::new(TopicRouter);
    let orchestrator = Orchestrator::new(
        GenerationService::with_client(client, &fast_config()),
        PromptTemplates::builtin(),
    );

    let basalt = UserConfig::new("Basalt");
    let estuaries = UserConfig::new("Estuaries");
    let (basalt_run, estuary_run) = tokio::join!(
        orchestrator.run_generate(&basalt),
        orchestrator.run_generate(&estuaries)
    );
    let basalt_run = basalt_run.unwrap();
    let estuary_run = estuary_run.unwrap();

    assert_ne!(basalt_run.run_id, estuary_run.run_id);

    assert_eq!(basalt_run.history.len(), 1);
    assert_eq!(basalt_run.refinements, 0);
    assert_eq!(basalt_run.document.names(), vec!["Basalt", "Formation"]);
    assert_eq!(
        basalt_run.trace,
        vec![
            WorkflowState::Start,
            WorkflowState::GenerateDraft,
            WorkflowState::Evaluate,
            WorkflowState::Terminated,
        ]
    );

    assert_eq!(estuary_run.history.len(), 2);
    assert_eq!(estuary_run.refinements, 1);
    assert_eq!(estuary_run.document.names(), vec!["Estuaries"]);
    assert_eq!(
        estuary_run.document.get("Estuaries").map(|s| s.content.as_str()),
        Some("ESTUARY_REVISED")
    );
    assert_eq!(
        estuary_run.trace,
        vec![
            WorkflowState::Start,
            WorkflowState::GenerateDraft,
            WorkflowState::Evaluate,
            WorkflowState::SemanticRefine,
            WorkflowState::Evaluate,
            WorkflowState::Terminated,
        ]
    );
}
