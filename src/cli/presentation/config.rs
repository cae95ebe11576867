//! Config command presentation: validation report and redacted dumps.

use crate::config::{MinidocsConfig, ValidationIssue};
use crate::error::{CliError, ConfigError};

const REDACTED: &str = "********";

pub fn format_config_validation(
    source: &str,
    config: &MinidocsConfig,
    result: &Result<(), Vec<ValidationIssue>>,
) -> String {
    let mut output = format!("Configuration: {}\n", source);
    let mut names: Vec<&String> = config.providers.keys().collect();
    names.sort();
    if names.is_empty() {
        output.push_str("Providers: (none)\n");
    } else {
        output.push_str("Providers:\n");
        for name in names {
            let provider = &config.providers[name];
            output.push_str(&format!(
                "  {:<16} {:<10} {}\n",
                name,
                provider.provider_type.as_str(),
                provider.model
            ));
        }
    }

    match result {
        Ok(()) => output.push_str("\nValidation passed"),
        Err(issues) => {
            output.push_str(&format!("\nErrors ({}):", issues.len()));
            for issue in issues {
                output.push_str(&format!("\n  - {}", issue));
            }
        }
    }
    output
}

/// Copy of the configuration with inline API keys masked.
fn redacted(config: &MinidocsConfig) -> MinidocsConfig {
    let mut config = config.clone();
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some(REDACTED.to_string());
        }
    }
    config
}

pub fn format_config_toml(config: &MinidocsConfig) -> Result<String, CliError> {
    toml::to_string_pretty(&redacted(config))
        .map_err(|e| ConfigError::Invalid(format!("Failed to render configuration: {}", e)).into())
}

pub fn format_config_json(config: &MinidocsConfig) -> Result<String, CliError> {
    serde_json::to_string_pretty(&redacted(config))
        .map_err(|e| ConfigError::Invalid(format!("Failed to render configuration: {}", e)).into())
}
