//! Configuration System
//!
//! Layered configuration: built-in defaults, the global user file, workspace
//! files, then `MINIDOCS__` environment variables. One `StageConfig` per stage
//! purpose selects the provider profile and call settings for that stage.

use crate::error::ConfigError;
use crate::generation::StagePurpose;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use crate::prompt::PromptConfig;
pub use crate::provider::{ProviderConfig, ProviderType};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MinidocsConfig {
    /// Named model provider profiles
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Per-purpose model settings
    #[serde(default)]
    pub stages: StagesConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Stage instruction overrides
    #[serde(default)]
    pub prompts: PromptConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for the three stage purposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagesConfig {
    #[serde(default = "StageConfig::draft")]
    pub draft: StageConfig,
    #[serde(default = "StageConfig::evaluate")]
    pub evaluate: StageConfig,
    #[serde(default = "StageConfig::refine")]
    pub refine: StageConfig,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            draft: StageConfig::draft(),
            evaluate: StageConfig::evaluate(),
            refine: StageConfig::refine(),
        }
    }
}

impl StagesConfig {
    pub fn get(&self, purpose: StagePurpose) -> &StageConfig {
        match purpose {
            StagePurpose::Draft => &self.draft,
            StagePurpose::Evaluate => &self.evaluate,
            StagePurpose::Refine => &self.refine,
        }
    }
}

pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub(crate) const DEFAULT_MAX_ATTEMPTS: u32 = 2;
pub(crate) const DEFAULT_RETRY_DELAY_MS: u64 = 500;
pub(crate) const DEFAULT_MAX_REFINEMENTS: u32 = 5;
pub(crate) const DRAFT_TEMPERATURE: f32 = 0.0;
pub(crate) const EVALUATE_TEMPERATURE: f32 = 0.3;
pub(crate) const REFINE_TEMPERATURE: f32 = 0.0;

/// Model call settings for one stage purpose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Key into `providers`; may be omitted when exactly one profile exists.
    #[serde(default)]
    pub provider: Option<String>,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Total calls per request, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

impl Default for StageConfig {
    fn default() -> Self {
        Self::with_temperature(DRAFT_TEMPERATURE)
    }
}

impl StageConfig {
    fn with_temperature(temperature: f32) -> Self {
        Self {
            provider: None,
            temperature: Some(temperature),
            max_tokens: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }

    pub fn draft() -> Self {
        Self::with_temperature(DRAFT_TEMPERATURE)
    }

    pub fn evaluate() -> Self {
        Self::with_temperature(EVALUATE_TEMPERATURE)
    }

    pub fn refine() -> Self {
        Self::with_temperature(REFINE_TEMPERATURE)
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(format!(
                    "temperature {} is outside [0.0, 2.0]",
                    temperature
                ));
            }
        }
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be greater than zero".to_string());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.max_tokens == Some(0) {
            return Err("max_tokens must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Control loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Refinement passes allowed before a run fails with an iteration limit.
    #[serde(default = "default_max_refinements")]
    pub max_refinements: u32,
}

fn default_max_refinements() -> u32 {
    DEFAULT_MAX_REFINEMENTS
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_refinements: DEFAULT_MAX_REFINEMENTS,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    Provider(String, String),
    Stage(String, String),
    Logging(String),
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationIssue::Provider(name, msg) => write!(f, "Provider '{}': {}", name, msg),
            ValidationIssue::Stage(name, msg) => write!(f, "Stage '{}': {}", name, msg),
            ValidationIssue::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationIssue {}

const STAGE_PURPOSES: [StagePurpose; 3] = [
    StagePurpose::Draft,
    StagePurpose::Evaluate,
    StagePurpose::Refine,
];

impl MinidocsConfig {
    /// Validate the entire configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), Vec<ValidationIssue>> {
        let mut errors = Vec::new();

        for (name, provider) in &self.providers {
            if let Err(e) = provider.validate() {
                errors.push(ValidationIssue::Provider(name.clone(), e));
            }
        }

        for purpose in STAGE_PURPOSES {
            let stage = self.stages.get(purpose);
            if let Err(e) = stage.validate() {
                errors.push(ValidationIssue::Stage(purpose.to_string(), e));
            }
            match &stage.provider {
                Some(name) if self.find_provider(name).is_none() => {
                    errors.push(ValidationIssue::Stage(
                        purpose.to_string(),
                        format!("references unknown provider '{}'", name),
                    ));
                }
                None if self.providers.len() > 1 => {
                    errors.push(ValidationIssue::Stage(
                        purpose.to_string(),
                        "no provider selected and more than one is configured".to_string(),
                    ));
                }
                _ => {}
            }
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            errors.push(ValidationIssue::Logging(format!(
                "invalid format '{}'",
                self.logging.format
            )));
        }
        if self.logging.output.parse::<crate::logging::LogOutput>().is_err() {
            errors.push(ValidationIssue::Logging(format!(
                "invalid output '{}'",
                self.logging.output
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Provider profile a stage purpose runs against.
    pub fn stage_provider(
        &self,
        purpose: StagePurpose,
    ) -> Result<(&str, &ProviderConfig), ConfigError> {
        match &self.stages.get(purpose).provider {
            Some(name) => self
                .find_provider(name)
                .ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "Stage '{}' references unknown provider '{}'",
                        purpose, name
                    ))
                }),
            None => {
                let mut iter = self.providers.iter();
                match (iter.next(), iter.next()) {
                    (Some((name, provider)), None) => Ok((name.as_str(), provider)),
                    (None, _) => Err(ConfigError::Invalid(format!(
                        "No provider configured for stage '{}'; add a [providers.<name>] table",
                        purpose
                    ))),
                    _ => Err(ConfigError::Invalid(format!(
                        "Stage '{}' must name a provider when several are configured",
                        purpose
                    ))),
                }
            }
        }
    }

    /// Profile by name, exact match first. The loader may lowercase table
    /// keys but never string values, so the fallback ignores ASCII case.
    fn find_provider(&self, name: &str) -> Option<(&str, &ProviderConfig)> {
        self.providers
            .get_key_value(name)
            .or_else(|| {
                self.providers
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
            })
            .map(|(key, provider)| (key.as_str(), provider))
    }

    /// Joins validation issues into a single error.
    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ConfigError::Invalid(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;
        Ok(self)
    }
}
