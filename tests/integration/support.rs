//! Shared fixtures: scripted orchestrators and canned model responses.

use minidocs::config::MinidocsConfig;
use minidocs::generation::GenerationService;
use minidocs::prompt::PromptTemplates;
use minidocs::provider::{ModelProviderClient, ScriptedProvider};
use minidocs::workflow::Orchestrator;
use serde_json::json;
use std::sync::Arc;

pub fn fast_config() -> MinidocsConfig {
    let mut config = MinidocsConfig::default();
    config.stages.draft.retry_delay_ms = 0;
    config.stages.evaluate.retry_delay_ms = 0;
    config.stages.refine.retry_delay_ms = 0;
    config
}

pub fn scripted_orchestrator(provider: &ScriptedProvider) -> Orchestrator {
    let config = fast_config();
    let client: Arc<dyn ModelProviderClient> = Arc::new(provider.clone());
    Orchestrator::new(
        GenerationService::with_client(client, &config),
        PromptTemplates::builtin(),
    )
    .with_max_refinements(config.workflow.max_refinements)
}

pub fn document(sections: &[(&str, &str)]) -> String {
    json!({
        "generated_content": sections
            .iter()
            .map(|(name, content)| json!({"section_name": name, "content": content}))
            .collect::<Vec<_>>()
    })
    .to_string()
}

pub fn accept(score: f64, summary: &str) -> String {
    json!({
        "coherency_score": score,
        "semantic_issues": "None",
        "structural_changes": "None",
        "next_action": "no_action",
        "evaluator_diagnostic_summary": summary
    })
    .to_string()
}

pub fn semantic(section: &str, issue: &str) -> String {
    json!({
        "coherency_score": 0.6,
        "semantic_issues": [{"section_name": section, "issue": issue, "suggestion": "expand it"}],
        "structural_changes": "None",
        "next_action": "semantic_refine",
        "evaluator_diagnostic_summary": "Needs detail."
    })
    .to_string()
}

pub fn structural(action: &str, section: &str) -> String {
    json!({
        "coherency_score": 0.55,
        "semantic_issues": "None",
        "structural_changes": [{"action": action, "section_name": section, "context": "outline gap"}],
        "next_action": "structural_refine",
        "evaluator_diagnostic_summary": "Structure is incomplete."
    })
    .to_string()
}
