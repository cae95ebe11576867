//! Run presentation: the final document, evaluation history, and flagged violations.

use crate::error::CliError;
use crate::workflow::RunOutcome;
use comfy_table::Table;

/// Markdown-style rendering of the final document followed by a run summary.
pub fn format_run_text(outcome: &RunOutcome) -> String {
    let mut output = String::new();
    for section in outcome.document.iter() {
        output.push_str(&format!("## {}\n\n{}\n\n", section.section_name, section.content.trim_end()));
    }

    output.push_str(&format!(
        "Coherency score: {:.2}\nRefinements: {}\nRun: {} ({}, {} ms)\n",
        outcome.evaluation.coherency_score,
        outcome.refinements,
        outcome.run_id,
        outcome.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        (outcome.finished_at - outcome.started_at).num_milliseconds()
    ));
    if !outcome.evaluation.evaluator_diagnostic_summary.is_empty() {
        output.push_str(&format!(
            "Summary: {}\n",
            outcome.evaluation.evaluator_diagnostic_summary
        ));
    }

    if !outcome.history.is_empty() {
        let mut table = Table::new();
        table.load_preset(comfy_table::presets::UTF8_BORDERS_ONLY);
        table.set_header(vec!["#", "Score", "Route", "Semantic", "Structural", "Summary"]);
        for entry in outcome.history.iter() {
            let route = if entry.declared_action == entry.next_action {
                entry.next_action.to_string()
            } else {
                format!("{} (declared {})", entry.next_action, entry.declared_action)
            };
            table.add_row(vec![
                entry.iteration.to_string(),
                format!("{:.2}", entry.coherency_score),
                route,
                entry.semantic_issues.len().to_string(),
                entry.structural_changes.len().to_string(),
                entry.diagnostic_summary.clone(),
            ]);
        }
        output.push_str(&format!("\nEvaluation history:\n{}\n", table));
    }

    if !outcome.violations.is_empty() {
        output.push_str(&format!("\nWarnings ({}):", outcome.violations.len()));
        for violation in &outcome.violations {
            output.push_str(&format!("\n  - {}", violation));
        }
        output.push('\n');
    }

    output
}

pub fn format_run_json(outcome: &RunOutcome) -> Result<String, CliError> {
    let value = outcome
        .response_json()
        .map_err(|e| CliError::Input(format!("Failed to serialize run result: {}", e)))?;
    serde_json::to_string_pretty(&value)
        .map_err(|e| CliError::Input(format!("Failed to serialize run result: {}", e)))
}
