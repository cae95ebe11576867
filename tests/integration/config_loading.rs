//! Integration tests for layered configuration loading

use minidocs::config::{ConfigLoader, ProviderType, ValidationIssue};
use minidocs::generation::StagePurpose;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tempfile::TempDir;

/// Loaders read process environment; tests in this module hold this lock.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

/// Sets variables for the guard's lifetime.
struct EnvGuard {
    keys: Vec<&'static str>,
}

impl EnvGuard {
    fn set(vars: &[(&'static str, &str)]) -> Self {
        for (key, value) in vars {
            std::env::set_var(key, value);
        }
        Self {
            keys: vars.iter().map(|(key, _)| *key).collect(),
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for key in &self.keys {
            std::env::remove_var(key);
        }
    }
}

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

#[test]
fn workspace_file_overrides_global_file() {
    let _env = env_lock();
    let temp_dir = TempDir::new().unwrap();
    let global = temp_dir.path().join("global.toml");
    std::fs::write(
        &global,
        r#"
[providers.openai]
provider_type = "openai"
model = "gpt-4o-mini"

[workflow]
max_refinements = 3

[stages.evaluate]
temperature = 0.5
"#,
    )
    .unwrap();

    let workspace = temp_dir.path().join("ws");
    std::fs::create_dir_all(workspace.join("config")).unwrap();
    std::fs::write(
        workspace.join("config").join("config.toml"),
        r#"
[workflow]
max_refinements = 7
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_layers(&workspace, Some(&global)).unwrap();
    assert_eq!(config.workflow.max_refinements, 7);
    assert_eq!(config.stages.evaluate.temperature, Some(0.5));
    // Untouched stages keep their defaults.
    assert_eq!(config.stages.draft.temperature, Some(0.0));
    assert_eq!(config.stages.refine.max_attempts, 2);
    assert_eq!(
        config.providers["openai"].provider_type,
        ProviderType::OpenAI
    );
}

#[test]
fn single_provider_serves_every_stage() {
    let _env = env_lock();
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("config.toml");
    std::fs::write(
        &config_file,
        r#"
[providers.local]
provider_type = "local"
model = "qwen2.5"
endpoint = "http://localhost:8080/v1"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    assert!(config.validate().is_ok());
    for purpose in [StagePurpose::Draft, StagePurpose::Evaluate, StagePurpose::Refine] {
        let (name, provider) = config.stage_provider(purpose).unwrap();
        assert_eq!(name, "local");
        assert_eq!(provider.model, "qwen2.5");
    }
}

#[test]
fn validation_reports_every_problem() {
    let _env = env_lock();
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("config.toml");
    std::fs::write(
        &config_file,
        r#"
[providers.openai]
provider_type = "openai"
model = "gpt-4o-mini"

[providers.claude]
provider_type = "anthropic"
model = "claude-3-5-haiku-latest"

[stages.draft]
provider = "openai"
temperature = 3.5

[stages.evaluate]
provider = "missing"

[logging]
format = "xml"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    let issues = config.validate().unwrap_err();
    assert!(issues
        .iter()
        .any(|i| matches!(i, ValidationIssue::Stage(stage, _) if stage == "draft")));
    assert!(issues
        .iter()
        .any(|i| matches!(i, ValidationIssue::Stage(stage, msg) if stage == "evaluate" && msg.contains("missing"))));
    // Two profiles and no refine provider: ambiguous.
    assert!(issues
        .iter()
        .any(|i| matches!(i, ValidationIssue::Stage(stage, _) if stage == "refine")));
    assert!(issues
        .iter()
        .any(|i| matches!(i, ValidationIssue::Logging(_))));
}

#[test]
fn missing_config_file_is_an_error() {
    let _env = env_lock();
    let temp_dir = TempDir::new().unwrap();
    assert!(ConfigLoader::load_from_file(&temp_dir.path().join("absent.toml")).is_err());
}

#[test]
fn environment_variables_override_files() {
    let _env = env_lock();
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path();
    write(
        &workspace.join("config").join("config.toml"),
        r#"
[workflow]
max_refinements = 7

[stages.draft]
timeout_secs = 30
"#,
    );

    let _vars = EnvGuard::set(&[
        ("MINIDOCS__WORKFLOW__MAX_REFINEMENTS", "3"),
        ("MINIDOCS__STAGES__DRAFT__TIMEOUT_SECS", "45"),
    ]);
    let config = ConfigLoader::load_layers(workspace, None).unwrap();
    assert_eq!(config.workflow.max_refinements, 3);
    assert_eq!(config.stages.draft.timeout_secs, 45);
    assert_eq!(config.stages.evaluate.timeout_secs, 120);
}

#[test]
fn environment_overlay_file_follows_minidocs_env() {
    let _env = env_lock();
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path();
    let config_dir = workspace.join("config");
    write(
        &config_dir.join("config.toml"),
        r#"
[workflow]
max_refinements = 7

[stages.refine]
retry_delay_ms = 50
"#,
    );
    write(&config_dir.join("development.toml"), "[workflow]\nmax_refinements = 9\n");
    write(&config_dir.join("staging.toml"), "[workflow]\nmax_refinements = 2\n");

    {
        let _vars = EnvGuard::set(&[("MINIDOCS_ENV", "staging")]);
        let config = ConfigLoader::load_layers(workspace, None).unwrap();
        assert_eq!(config.workflow.max_refinements, 2);
        // Base file values survive the overlay.
        assert_eq!(config.stages.refine.retry_delay_ms, 50);
    }

    std::env::remove_var("MINIDOCS_ENV");
    let config = ConfigLoader::load_layers(workspace, None).unwrap();
    assert_eq!(config.workflow.max_refinements, 9);
}

#[test]
fn mixed_case_profile_names_resolve() {
    let _env = env_lock();
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("config.toml");
    write(
        &config_file,
        r#"
[providers.MyGemini]
provider_type = "gemini"
model = "gemini-2.5-flash"

[providers.Local]
provider_type = "local"
model = "qwen2.5"
endpoint = "http://localhost:8080/v1"

[stages.draft]
provider = "MyGemini"

[stages.evaluate]
provider = "MyGemini"

[stages.refine]
provider = "Local"
"#,
    );

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    assert!(config.validate().is_ok());
    let (_, draft) = config.stage_provider(StagePurpose::Draft).unwrap();
    assert_eq!(draft.model, "gemini-2.5-flash");
    let (_, refine) = config.stage_provider(StagePurpose::Refine).unwrap();
    assert_eq!(refine.model, "qwen2.5");
}
