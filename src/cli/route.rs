//! CLI route: single route table and run context. Dispatches to the
//! orchestrator and presentation.

use crate::cli::parse::{Commands, ConfigCommands, ConfigFormat, OutputFormat, RequestArgs};
use crate::cli::presentation::{
    format_config_json, format_config_toml, format_config_validation, format_run_json,
    format_run_text,
};
use crate::config::{ConfigLoader, MinidocsConfig};
use crate::content::{GeneratedDocument, GeneratedSection, SectionSpec, UserConfig};
use crate::error::CliError;
use crate::workflow::{Orchestrator, RunOutcome};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Runtime context for CLI execution: workspace, merged configuration, and
/// an optional pre-built orchestrator.
pub struct RunContext {
    workspace_root: PathBuf,
    config_path: Option<PathBuf>,
    config: MinidocsConfig,
    orchestrator: Option<Orchestrator>,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, CliError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        Ok(Self {
            workspace_root,
            config_path,
            config,
            orchestrator: None,
        })
    }

    pub fn from_config(workspace_root: PathBuf, config: MinidocsConfig) -> Self {
        Self {
            workspace_root,
            config_path: None,
            config,
            orchestrator: None,
        }
    }

    /// Use this orchestrator instead of building one from configuration.
    pub fn with_orchestrator(mut self, orchestrator: Orchestrator) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    pub fn config(&self) -> &MinidocsConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub async fn execute(&self, command: &Commands) -> Result<String, CliError> {
        let started = Instant::now();
        let name = command_name(command);
        debug!(command = name, workspace = %self.workspace_root.display(), "Executing command");
        let result = self.execute_inner(command).await;
        info!(
            command = name,
            ok = result.is_ok(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    async fn execute_inner(&self, command: &Commands) -> Result<String, CliError> {
        match command {
            Commands::Generate { request, format } => {
                let user = load_user_config(request)?;
                let orchestrator = self.orchestrator()?;
                let outcome = orchestrator.run_generate(&user).await?;
                render_run(&outcome, *format)
            }
            Commands::Evaluate {
                document,
                request,
                format,
            } => {
                let user = load_user_config(request)?;
                let document = load_document(document)?;
                let orchestrator = self.orchestrator()?;
                let outcome = orchestrator.run_evaluate(&user, document).await?;
                render_run(&outcome, *format)
            }
            Commands::Config { command } => self.handle_config_command(command),
        }
    }

    fn orchestrator(&self) -> Result<Orchestrator, CliError> {
        if let Some(orchestrator) = &self.orchestrator {
            return Ok(orchestrator.clone());
        }
        let config = self.config.clone().validated()?;
        Ok(Orchestrator::from_config(&config)?)
    }

    fn handle_config_command(&self, command: &ConfigCommands) -> Result<String, CliError> {
        match command {
            ConfigCommands::Validate => {
                let source = self
                    .config_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| format!("workspace {}", self.workspace_root.display()));
                let result = self.config.validate();
                let report = format_config_validation(&source, &self.config, &result);
                match result {
                    Ok(()) => Ok(report),
                    Err(_) => Err(CliError::Input(report)),
                }
            }
            ConfigCommands::Show { format } => match format {
                ConfigFormat::Toml => format_config_toml(&self.config),
                ConfigFormat::Json => format_config_json(&self.config),
            },
        }
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Generate { .. } => "generate",
        Commands::Evaluate { .. } => "evaluate",
        Commands::Config {
            command: ConfigCommands::Validate,
        } => "config validate",
        Commands::Config {
            command: ConfigCommands::Show { .. },
        } => "config show",
    }
}

fn render_run(outcome: &RunOutcome, format: OutputFormat) -> Result<String, CliError> {
    match format {
        OutputFormat::Text => Ok(format_run_text(outcome)),
        OutputFormat::Json => format_run_json(outcome),
    }
}

/// Parses `"Name:Description"`; text without a colon is a bare name.
pub fn parse_section_arg(raw: &str) -> Result<SectionSpec, CliError> {
    let (name, description) = match raw.split_once(':') {
        Some((name, description)) => (name.trim(), Some(description.trim())),
        None => (raw.trim(), None),
    };
    if name.is_empty() {
        return Err(CliError::Input(format!(
            "Section '{}' has an empty name (expected \"Name:Description\")",
            raw
        )));
    }
    Ok(SectionSpec {
        section_name: Some(name.to_string()),
        description: description.filter(|d| !d.is_empty()).map(str::to_string),
    })
}

/// Builds the run's user configuration: request file first, flags on top.
pub fn load_user_config(args: &RequestArgs) -> Result<UserConfig, CliError> {
    let mut user = match &args.request {
        Some(path) => {
            let text = read_file(path)?;
            serde_json::from_str::<UserConfig>(&text).map_err(|e| {
                CliError::Input(format!("Invalid request file {}: {}", path.display(), e))
            })?
        }
        None => UserConfig::default(),
    };

    if let Some(topic) = &args.topic {
        user.main_topic = topic.clone();
    }
    if !args.sections.is_empty() {
        user.sections = args
            .sections
            .iter()
            .map(|raw| parse_section_arg(raw))
            .collect::<Result<_, _>>()?;
    }
    if let Some(constraints) = &args.constraints {
        user.constraints = constraints.clone();
    }
    if let Some(context) = &args.context {
        user.context = context.clone();
    }
    if args.dynamic {
        user.dynamic_structure_allowed = true;
    }
    if args.expected_sections.is_some() {
        user.expected_section_count = args.expected_sections;
    }

    user.validate()?;
    Ok(user)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DocumentFile {
    Wrapped(GeneratedDocument),
    Sections(Vec<GeneratedSection>),
}

/// Reads a caller-supplied document in either accepted JSON layout.
pub fn load_document(path: &Path) -> Result<GeneratedDocument, CliError> {
    let text = read_file(path)?;
    let document = match serde_json::from_str::<DocumentFile>(&text) {
        Ok(DocumentFile::Wrapped(document)) => document,
        Ok(DocumentFile::Sections(sections)) => GeneratedDocument::new(sections),
        Err(e) => {
            return Err(CliError::Input(format!(
                "Invalid document file {}: {}",
                path.display(),
                e
            )))
        }
    };
    document.validate_input()?;
    Ok(document)
}

fn read_file(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path)
        .map_err(|e| CliError::Input(format!("Failed to read {}: {}", path.display(), e)))
}
