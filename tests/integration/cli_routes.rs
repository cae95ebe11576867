//! CLI route tests: parsed commands executed against a scripted orchestrator

use super::support::{accept, document, fast_config, scripted_orchestrator, semantic};
use clap::Parser;
use minidocs::cli::{map_error, Cli, RunContext};
use minidocs::config::{ProviderConfig, ProviderType};
use minidocs::provider::ScriptedProvider;
use serde_json::Value;
use tempfile::TempDir;

fn parse(args: &[&str]) -> Cli {
    let mut argv = vec!["minidocs"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap()
}

#[tokio::test]
async fn generate_json_output_matches_response_shape() {
    let temp_dir = TempDir::new().unwrap();
    let provider = ScriptedProvider::new([
        document(&[("Intro", "Soil is alive."), ("Layers", "Horizons.")]),
        accept(0.9, "Ready."),
    ]);
    let context = RunContext::from_config(temp_dir.path().to_path_buf(), fast_config())
        .with_orchestrator(scripted_orchestrator(&provider));

    let cli = parse(&[
        "generate",
        "--topic",
        "Intro to Soils",
        "--section",
        "Intro:What soil is",
        "--section",
        "Layers:Soil horizons",
        "--format",
        "json",
    ]);
    let output = context.execute(&cli.command).await.unwrap();
    let value: Value = serde_json::from_str(&output).unwrap();

    assert_eq!(value["generated_content"].as_array().unwrap().len(), 2);
    assert_eq!(value["coherency_score"], 0.9);
    assert!(provider.calls()[0].prompt().contains("Soil horizons"));
}

#[tokio::test]
async fn evaluate_text_output_shows_document_and_history() {
    let temp_dir = TempDir::new().unwrap();
    let doc_path = temp_dir.path().join("doc.json");
    std::fs::write(
        &doc_path,
        r#"[{"section_name": "Intro", "content": "Soil."}]"#,
    )
    .unwrap();

    let provider = ScriptedProvider::new([
        semantic("Intro", "too thin"),
        document(&[("Intro", "Soil is a living mix of minerals and organisms.")]),
        accept(0.87, "Good now."),
    ]);
    let context = RunContext::from_config(temp_dir.path().to_path_buf(), fast_config())
        .with_orchestrator(scripted_orchestrator(&provider));

    let doc_arg = doc_path.to_string_lossy().to_string();
    let cli = parse(&["evaluate", "--document", &doc_arg, "--topic", "Intro to Soils"]);
    let output = context.execute(&cli.command).await.unwrap();

    assert!(output.contains("## Intro"));
    assert!(output.contains("living mix of minerals"));
    assert!(output.contains("Coherency score: 0.87"));
    assert!(output.contains("semantic_refine"));
    assert!(output.contains("Refinements: 1"));
}

#[tokio::test]
async fn evaluate_rejects_an_empty_document() {
    let temp_dir = TempDir::new().unwrap();
    let doc_path = temp_dir.path().join("doc.json");
    std::fs::write(&doc_path, r#"{"generated_content": []}"#).unwrap();

    let provider = ScriptedProvider::empty();
    let context = RunContext::from_config(temp_dir.path().to_path_buf(), fast_config())
        .with_orchestrator(scripted_orchestrator(&provider));

    let doc_arg = doc_path.to_string_lossy().to_string();
    let cli = parse(&["evaluate", "--document", &doc_arg, "--topic", "Soils"]);
    let err = context.execute(&cli.command).await.unwrap_err();
    assert!(map_error(&err).contains("no sections"));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn config_show_redacts_keys_and_validate_reports_problems() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = fast_config();
    let mut openai = ProviderConfig::new(ProviderType::OpenAI, "gpt-4o-mini");
    openai.api_key = Some("sk-very-secret".to_string());
    config.providers.insert("openai".to_string(), openai);
    config.stages.evaluate.provider = Some("nowhere".to_string());
    let context = RunContext::from_config(temp_dir.path().to_path_buf(), config);

    let shown = context
        .execute(&parse(&["config", "show", "--format", "json"]).command)
        .await
        .unwrap();
    assert!(!shown.contains("sk-very-secret"));
    assert!(shown.contains("gpt-4o-mini"));

    let err = context
        .execute(&parse(&["config", "validate"]).command)
        .await
        .unwrap_err();
    let report = map_error(&err);
    assert!(report.contains("Errors (1)"));
    assert!(report.contains("nowhere"));
}

#[tokio::test]
async fn generate_without_providers_fails_before_any_call() {
    let temp_dir = TempDir::new().unwrap();
    let context = RunContext::from_config(temp_dir.path().to_path_buf(), fast_config());
    let err = context
        .execute(&parse(&["generate", "--topic", "Soils"]).command)
        .await
        .unwrap_err();
    assert!(map_error(&err).contains("No provider configured"));
}
