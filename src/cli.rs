//! CLI domain: parse, route, output, and presentation only.
//! No domain orchestration; single route table dispatches to the orchestrator.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands, ConfigCommands, ConfigFormat, OutputFormat, RequestArgs};
pub use presentation::{
    format_config_json, format_config_toml, format_config_validation, format_run_json,
    format_run_text,
};
pub use route::{load_document, load_user_config, parse_section_arg, RunContext};
