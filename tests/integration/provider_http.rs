//! Full runs against an OpenAI-compatible HTTP server

use minidocs::config::ConfigLoader;
use minidocs::content::UserConfig;
use minidocs::error::{GenerationCause, ProviderError, WorkflowError};
use minidocs::routing::Stage;
use minidocs::workflow::Orchestrator;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn completion(content: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "cmpl-1",
        "model": "test-model",
        "choices": [{
            "message": {"role": "assistant", "content": content.to_string()},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 10, "total_tokens": 20}
    }))
}

fn orchestrator_for(server: &MockServer, temp_dir: &TempDir) -> Orchestrator {
    let config_file = temp_dir.path().join("config.toml");
    std::fs::write(
        &config_file,
        format!(
            r#"
[providers.local]
provider_type = "local"
model = "test-model"
endpoint = "{}/v1"

[stages.draft]
retry_delay_ms = 0

[stages.evaluate]
retry_delay_ms = 0

[stages.refine]
retry_delay_ms = 0
"#,
            server.uri()
        ),
    )
    .unwrap();
    let config = ConfigLoader::load_from_file(&config_file)
        .unwrap()
        .validated()
        .unwrap();
    Orchestrator::from_config(&config).unwrap()
}

#[tokio::test]
async fn generate_run_over_http() {
    let server = MockServer::start().await;
    // Evaluation prompts are matched first; everything else is a draft.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("high-signal evaluator"))
        .respond_with(completion(json!({
            "coherency_score": 0.91,
            "semantic_issues": "None",
            "structural_changes": "None",
            "next_action": "no_action",
            "evaluator_diagnostic_summary": "Clear and complete."
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "response_format": {"type": "json_object"}
        })))
        .respond_with(completion(json!({
            "generated_content": [
                {"section_name": "Intro", "content": "Soil is alive."},
                {"section_name": "Layers", "content": "Soils form horizons."}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let orchestrator = orchestrator_for(&server, &temp_dir);
    let outcome = orchestrator
        .run_generate(&UserConfig::new("Intro to Soils"))
        .await
        .unwrap();

    assert_eq!(outcome.document.names(), vec!["Intro", "Layers"]);
    assert_eq!(outcome.evaluation.coherency_score, 0.91);
    assert_eq!(outcome.history.len(), 1);
}

#[tokio::test]
async fn auth_failure_stops_the_draft_stage_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let orchestrator = orchestrator_for(&server, &temp_dir);
    let err = orchestrator
        .run_generate(&UserConfig::new("Intro to Soils"))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::GenerateDraft));
    match err {
        WorkflowError::Stage { source, .. } => {
            assert_eq!(source.attempts, 1);
            assert!(matches!(
                source.cause,
                GenerationCause::Provider(ProviderError::AuthFailed(_))
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .expect(2)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let orchestrator = orchestrator_for(&server, &temp_dir);
    let err = orchestrator
        .run_generate(&UserConfig::new("Intro to Soils"))
        .await
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::GenerateDraft));
}
