//! CLI parse: clap types for minidocs. No behavior; definitions only.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// minidocs - generate and refine structured documents with an LLM evaluate/refine loop
#[derive(Parser, Debug)]
#[command(name = "minidocs")]
#[command(about = "Generate and refine structured documents with an LLM evaluate/refine loop")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, global = true, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long, global = true)]
    pub log_output: Option<String>,

    /// Log file path (when output is "file")
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a document from scratch, then evaluate and refine it
    Generate {
        #[command(flatten)]
        request: RequestArgs,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Evaluate an existing document, refining it until accepted
    Evaluate {
        /// Document file: a JSON array of {section_name, content} or {"generated_content": [...]}
        #[arg(long)]
        document: PathBuf,

        #[command(flatten)]
        request: RequestArgs,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate the merged configuration
    Validate,
    /// Print the merged configuration (API keys redacted)
    Show {
        /// Output format
        #[arg(long, value_enum, default_value_t = ConfigFormat::Toml)]
        format: ConfigFormat,
    },
}

/// User configuration for a run, from flags and/or a request file.
#[derive(Args, Debug, Clone, Default)]
pub struct RequestArgs {
    /// Main topic of the document
    #[arg(long)]
    pub topic: Option<String>,

    /// Requested section as "Name:Description" (repeatable, order kept)
    #[arg(long = "section")]
    pub sections: Vec<String>,

    /// Constraints the document must respect
    #[arg(long)]
    pub constraints: Option<String>,

    /// Background context for the document
    #[arg(long)]
    pub context: Option<String>,

    /// Allow the evaluator to add, remove, rename, or reorder sections
    #[arg(long)]
    pub dynamic: bool,

    /// Number of sections expected
    #[arg(long)]
    pub expected_sections: Option<u32>,

    /// JSON request file with user configuration fields; flags override it
    #[arg(long)]
    pub request: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}
