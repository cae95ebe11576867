//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::{CliError, WorkflowError};

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &CliError) -> String {
    match e {
        CliError::Workflow(WorkflowError::Stage { stage, source }) => {
            let mut message = format!("{} stage failed: {}", stage, source);
            if let Some(raw) = &source.raw_response {
                message.push_str(&format!("\nLast response:\n{}", raw));
            }
            message
        }
        CliError::Input(report) => report.clone(),
        other => other.to_string(),
    }
}
