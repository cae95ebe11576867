//! Error types for the minidocs generation pipeline.

use crate::generation::OutputShape;
use crate::routing::Stage;
use thiserror::Error;

/// Failures talking to an external model provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Provider error: {0}")]
    Other(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Provider request failed: {0}")]
    RequestFailed(String),

    #[error("Provider request timed out after {0}s")]
    Timeout(u64),

    #[error("Provider authentication failed: {0}")]
    AuthFailed(String),

    #[error("Provider rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Provider model not found: {0}")]
    ModelNotFound(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Whether another attempt at the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::NotConfigured(_) => false,
            ProviderError::AuthFailed(_) => false,
            ProviderError::ModelNotFound(_) => false,
            ProviderError::RateLimit(_) => true,
            ProviderError::RequestFailed(_) => true,
            ProviderError::Timeout(_) => true,
            ProviderError::MalformedResponse(_) => true,
            ProviderError::Other(_) => true,
        }
    }
}

/// Caller input rejected before a run starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required field: main_topic")]
    EmptyTopic,

    #[error("Document to evaluate has no sections")]
    EmptyDocument,

    #[error("Section {index} has an empty name")]
    BlankSectionName { index: usize },

    #[error("Duplicate section name: {0}")]
    DuplicateSectionName(String),
}

/// Structured output that does not satisfy the content model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContentError {
    #[error("Response is not valid JSON for the expected shape: {0}")]
    Malformed(String),

    #[error("Coherency score {0} is outside [0, 1]")]
    ScoreOutOfRange(f64),

    #[error("{field} must be \"None\" or a non-empty list")]
    EmptyFindings { field: &'static str },

    #[error("Section name must not be empty (position {0})")]
    BlankSectionName(usize),

    #[error("Duplicate section name in generated content: {0}")]
    DuplicateSectionName(String),

    #[error("Generated content has no sections")]
    EmptyDocument,
}

/// The generation adapter could not produce a value of the expected shape.
#[derive(Debug, Clone, Error)]
#[error("Generation of {shape} failed after {attempts} attempt(s): {cause}")]
pub struct GenerationFailure {
    pub shape: OutputShape,
    pub attempts: u32,
    /// Last raw text returned by the model, if any response arrived at all.
    pub raw_response: Option<String>,
    pub cause: GenerationCause,
}

/// Final cause recorded on a [`GenerationFailure`].
#[derive(Debug, Clone, Error)]
pub enum GenerationCause {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Content(#[from] ContentError),
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Invalid(String),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Configuration I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run-level failure returned to the caller of the workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Stage {stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: GenerationFailure,
    },

    #[error("Refinement limit of {limit} reached without an accepting evaluation")]
    IterationLimit { limit: u32 },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl WorkflowError {
    /// Stage that failed, when the failure came from a model call.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            WorkflowError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Failures surfaced by the command-line front end.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ValidationError> for CliError {
    fn from(err: ValidationError) -> Self {
        CliError::Workflow(WorkflowError::Validation(err))
    }
}
