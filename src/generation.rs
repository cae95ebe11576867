//! Generation Service Adapter
//!
//! Typed boundary around an unreliable text-completion service. Each stage
//! purpose (draft, evaluate, refine) gets its own client and settings. A call
//! renders nothing and decides nothing: it sends the prompt, parses the reply
//! into the requested shape, and retries within a fixed attempt budget.

use crate::config::{MinidocsConfig, StageConfig};
use crate::content::{EvaluationResult, GeneratedDocument};
use crate::error::{ConfigError, ContentError, GenerationCause, GenerationFailure, ProviderError};
use crate::provider::{ChatMessage, CompletionOptions, ModelProviderClient, ProviderFactory};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Shape a model response must parse into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputShape {
    Document,
    Evaluation,
}

impl OutputShape {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputShape::Document => "document",
            OutputShape::Evaluation => "evaluation",
        }
    }
}

impl fmt::Display for OutputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which configured model a call goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StagePurpose {
    Draft,
    Evaluate,
    Refine,
}

impl StagePurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            StagePurpose::Draft => "draft",
            StagePurpose::Evaluate => "evaluate",
            StagePurpose::Refine => "refine",
        }
    }
}

impl fmt::Display for StagePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value the adapter can produce from model text.
pub trait StructuredOutput: DeserializeOwned {
    const SHAPE: OutputShape;

    /// Checks that serde cannot express.
    fn check(&self) -> Result<(), ContentError>;
}

impl StructuredOutput for GeneratedDocument {
    const SHAPE: OutputShape = OutputShape::Document;

    fn check(&self) -> Result<(), ContentError> {
        self.validate()
    }
}

impl StructuredOutput for EvaluationResult {
    const SHAPE: OutputShape = OutputShape::Evaluation;

    fn check(&self) -> Result<(), ContentError> {
        self.validate()
    }
}

/// Drops a surrounding markdown code fence, if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string (e.g. "json") on the opening line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Parses model text into `T` and runs its content checks.
pub fn parse_structured<T: StructuredOutput>(raw: &str) -> Result<T, ContentError> {
    let value: T = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| ContentError::Malformed(e.to_string()))?;
    value.check()?;
    Ok(value)
}

/// Per-stage call settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSettings {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
    /// Total calls per request, including the first.
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self::from_config(&StageConfig::default())
    }
}

impl StageSettings {
    pub fn from_config(config: &StageConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: None,
            stop: None,
            json_output: true,
        }
    }
}

/// One model client plus the settings it is called with.
#[derive(Clone)]
pub struct StageModel {
    client: Arc<dyn ModelProviderClient>,
    settings: StageSettings,
}

impl StageModel {
    pub fn new(client: Arc<dyn ModelProviderClient>, settings: StageSettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &StageSettings {
        &self.settings
    }

    pub fn provider_name(&self) -> &str {
        self.client.provider_name()
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    async fn call(&self, prompt: &str) -> Result<String, ProviderError> {
        let messages = vec![ChatMessage::user(prompt)];
        let request = self
            .client
            .complete(messages, self.settings.completion_options());
        match tokio::time::timeout(self.settings.timeout, request).await {
            Ok(result) => result.map(|response| response.content),
            Err(_) => Err(ProviderError::Timeout(self.settings.timeout.as_secs())),
        }
    }

    /// Sends `prompt` until a reply parses as `T` or the attempt budget runs out.
    pub async fn invoke<T: StructuredOutput>(&self, prompt: &str) -> Result<T, GenerationFailure> {
        let shape = T::SHAPE;
        let max_attempts = self.settings.max_attempts.max(1);
        let mut last_raw: Option<String> = None;
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(
                shape = %shape,
                provider = self.client.provider_name(),
                model = self.client.model_name(),
                attempt,
                max_attempts,
                "Invoking generation service"
            );

            let cause: GenerationCause = match self.call(prompt).await {
                Ok(raw) => match parse_structured::<T>(&raw) {
                    Ok(value) => return Ok(value),
                    Err(err) => {
                        last_raw = Some(raw);
                        err.into()
                    }
                },
                Err(err) => err.into(),
            };

            let retryable = match &cause {
                GenerationCause::Provider(err) => err.is_retryable(),
                GenerationCause::Content(_) => true,
            };

            if !retryable || attempt >= max_attempts {
                error!(
                    shape = %shape,
                    provider = self.client.provider_name(),
                    attempts = attempt,
                    error = %cause,
                    "Generation failed permanently"
                );
                return Err(GenerationFailure {
                    shape,
                    attempts: attempt,
                    raw_response: last_raw,
                    cause,
                });
            }

            warn!(
                shape = %shape,
                provider = self.client.provider_name(),
                attempt,
                error = %cause,
                retry_delay_ms = self.settings.retry_delay.as_millis() as u64,
                "Generation attempt failed, retrying"
            );
            sleep(self.settings.retry_delay).await;
        }
    }
}

/// The three stage-purpose models used by a run.
#[derive(Clone)]
pub struct GenerationService {
    draft: StageModel,
    evaluate: StageModel,
    refine: StageModel,
}

impl GenerationService {
    pub fn new(draft: StageModel, evaluate: StageModel, refine: StageModel) -> Self {
        Self {
            draft,
            evaluate,
            refine,
        }
    }

    /// Same client for every stage, per-stage settings from `config`.
    pub fn with_client(client: Arc<dyn ModelProviderClient>, config: &MinidocsConfig) -> Self {
        Self {
            draft: StageModel::new(client.clone(), StageSettings::from_config(&config.stages.draft)),
            evaluate: StageModel::new(
                client.clone(),
                StageSettings::from_config(&config.stages.evaluate),
            ),
            refine: StageModel::new(client, StageSettings::from_config(&config.stages.refine)),
        }
    }

    /// Builds one provider client per stage from configured profiles.
    pub fn from_config(config: &MinidocsConfig) -> Result<Self, ConfigError> {
        let build = |purpose: StagePurpose| -> Result<StageModel, ConfigError> {
            let (name, profile) = config.stage_provider(purpose)?;
            let mut profile = profile.clone();
            if profile.provider_name.is_none() {
                profile.provider_name = Some(name.to_string());
            }
            let model_provider = profile
                .to_model_provider()
                .map_err(|e| ConfigError::Invalid(format!("Stage '{}': {}", purpose, e)))?;
            let client = ProviderFactory::create_client(&model_provider)
                .map_err(|e| ConfigError::Invalid(format!("Stage '{}': {}", purpose, e)))?;
            debug!(
                stage = %purpose,
                provider = name,
                model = client.model_name(),
                "Configured stage model"
            );
            Ok(StageModel::new(
                Arc::from(client),
                StageSettings::from_config(config.stages.get(purpose)),
            ))
        };

        Ok(Self {
            draft: build(StagePurpose::Draft)?,
            evaluate: build(StagePurpose::Evaluate)?,
            refine: build(StagePurpose::Refine)?,
        })
    }

    pub fn stage(&self, purpose: StagePurpose) -> &StageModel {
        match purpose {
            StagePurpose::Draft => &self.draft,
            StagePurpose::Evaluate => &self.evaluate,
            StagePurpose::Refine => &self.refine,
        }
    }

    pub async fn generate_draft(&self, prompt: &str) -> Result<GeneratedDocument, GenerationFailure> {
        self.draft.invoke(prompt).await
    }

    pub async fn evaluate(&self, prompt: &str) -> Result<EvaluationResult, GenerationFailure> {
        self.evaluate.invoke(prompt).await
    }

    pub async fn refine(&self, prompt: &str) -> Result<GeneratedDocument, GenerationFailure> {
        self.refine.invoke(prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::NextAction;
    use crate::provider::ScriptedProvider;

    const DOC: &str = r#"{"generated_content": [{"section_name": "Intro", "content": "Soil."}]}"#;

    fn settings(max_attempts: u32) -> StageSettings {
        StageSettings {
            temperature: Some(0.0),
            max_tokens: None,
            timeout: Duration::from_secs(5),
            max_attempts,
            retry_delay: Duration::from_millis(0),
        }
    }

    fn model(provider: &ScriptedProvider, max_attempts: u32) -> StageModel {
        StageModel::new(Arc::new(provider.clone()), settings(max_attempts))
    }

    #[tokio::test]
    async fn unparseable_twice_exhausts_default_budget() {
        let provider = ScriptedProvider::new(["not json", "still {not json"]);
        let result = model(&provider, 2).invoke::<GeneratedDocument>("draft").await;

        let failure = result.unwrap_err();
        assert_eq!(failure.shape, OutputShape::Document);
        assert_eq!(failure.attempts, 2);
        assert_eq!(failure.raw_response.as_deref(), Some("still {not json"));
        assert!(matches!(
            failure.cause,
            GenerationCause::Content(ContentError::Malformed(_))
        ));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn retry_recovers_after_bad_response() {
        let provider = ScriptedProvider::new(["oops", DOC]);
        let doc = model(&provider, 2)
            .invoke::<GeneratedDocument>("draft")
            .await
            .unwrap();
        assert_eq!(doc.names(), vec!["Intro"]);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn non_retryable_provider_error_stops_immediately() {
        let provider = ScriptedProvider::empty();
        provider.push_error(ProviderError::AuthFailed("bad key".to_string()));
        provider.push(DOC);

        let failure = model(&provider, 3)
            .invoke::<GeneratedDocument>("draft")
            .await
            .unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert!(failure.raw_response.is_none());
        assert!(matches!(
            failure.cause,
            GenerationCause::Provider(ProviderError::AuthFailed(_))
        ));
        assert_eq!(provider.remaining(), 1);
    }

    #[tokio::test]
    async fn out_of_range_score_is_a_content_failure() {
        let bad = r#"{"coherency_score": 7, "semantic_issues": "None", "structural_changes": "None", "next_action": "no_action"}"#;
        let provider = ScriptedProvider::new([bad]);
        let failure = model(&provider, 1)
            .invoke::<EvaluationResult>("evaluate")
            .await
            .unwrap_err();
        assert_eq!(failure.shape, OutputShape::Evaluation);
        assert!(matches!(
            failure.cause,
            GenerationCause::Content(ContentError::ScoreOutOfRange(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let provider = ScriptedProvider::new([DOC]).with_delay(Duration::from_secs(30));
        let mut stage_settings = settings(1);
        stage_settings.timeout = Duration::from_secs(2);
        let stage = StageModel::new(Arc::new(provider.clone()), stage_settings);

        let failure = stage.invoke::<GeneratedDocument>("draft").await.unwrap_err();
        assert!(matches!(
            failure.cause,
            GenerationCause::Provider(ProviderError::Timeout(2))
        ));
    }

    #[tokio::test]
    async fn requests_json_output_with_stage_temperature() {
        let provider = ScriptedProvider::new([DOC]);
        let mut stage_settings = settings(1);
        stage_settings.temperature = Some(0.3);
        StageModel::new(Arc::new(provider.clone()), stage_settings)
            .invoke::<GeneratedDocument>("prompt text")
            .await
            .unwrap();

        let call = &provider.calls()[0];
        assert!(call.options.json_output);
        assert_eq!(call.options.temperature, Some(0.3));
        assert_eq!(call.prompt(), "prompt text");
    }

    #[test]
    fn code_fences_are_tolerated() {
        let fenced = format!("```json\n{}\n```", DOC);
        let doc: GeneratedDocument = parse_structured(&fenced).unwrap();
        assert_eq!(doc.len(), 1);

        let bare_fence = format!("```\n{}```", DOC);
        assert!(parse_structured::<GeneratedDocument>(&bare_fence).is_ok());

        let one_line = format!("```json{}```", DOC);
        assert_eq!(parse_structured::<GeneratedDocument>(&one_line).unwrap().len(), 1);
        let one_line_upper = format!("```JSON {} ```", DOC);
        assert!(parse_structured::<GeneratedDocument>(&one_line_upper).is_ok());

        let eval: EvaluationResult = parse_structured(
            r#"{"coherency_score": 0.95, "semantic_issues": "None", "structural_changes": "None", "next_action": "no_action", "evaluator_diagnostic_summary": "Good."}"#,
        )
        .unwrap();
        assert_eq!(eval.next_action, NextAction::NoAction);
    }

    #[test]
    fn shared_client_keeps_per_stage_settings() {
        let mut config = MinidocsConfig::default();
        config.stages.evaluate.max_attempts = 4;
        config.stages.refine.timeout_secs = 30;
        let client: Arc<dyn ModelProviderClient> = Arc::new(ScriptedProvider::empty());
        let service = GenerationService::with_client(client, &config);

        let draft = service.stage(StagePurpose::Draft).settings();
        assert_eq!(draft.temperature, Some(0.0));
        assert_eq!(draft.max_attempts, 2);
        let evaluate = service.stage(StagePurpose::Evaluate).settings();
        assert_eq!(evaluate.temperature, Some(0.3));
        assert_eq!(evaluate.max_attempts, 4);
        assert_eq!(
            service.stage(StagePurpose::Refine).settings().timeout,
            Duration::from_secs(30)
        );
    }

    #[test]
    fn produced_documents_must_have_unique_names() {
        let dup = r#"{"generated_content": [{"section_name": "A", "content": ""}, {"section_name": "A", "content": ""}]}"#;
        assert_eq!(
            parse_structured::<GeneratedDocument>(dup),
            Err(ContentError::DuplicateSectionName("A".to_string()))
        );
    }
}
