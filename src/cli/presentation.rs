//! CLI presentation: text and json formatters per command family.

mod config;
mod run;

pub use config::{format_config_json, format_config_toml, format_config_validation};
pub use run::{format_run_json, format_run_text};
