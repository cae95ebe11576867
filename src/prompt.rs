//! Prompt Formatter
//!
//! Deterministic rendering of content-model values into the text payloads the
//! generation service receives. No I/O, no clocks, no hashing with random
//! state: the same input always renders to the same bytes.

use crate::content::{EvaluationResult, GeneratedDocument, UserConfig};
use serde::{Deserialize, Serialize};

pub const PLACEHOLDER_USER_CONFIG: &str = "USER_CONFIG";
pub const PLACEHOLDER_GENERATED_CONTENT: &str = "GENERATED_CONTENT";
pub const PLACEHOLDER_DYNAMIC: &str = "ALLOW_DYNAMIC_CONTENT_GENERATION";
pub const PLACEHOLDER_SEMANTIC_FEEDBACK: &str = "SEMANTIC_FEEDBACK";
pub const PLACEHOLDER_STRUCTURAL_FEEDBACK: &str = "STRUCTURAL_FEEDBACK";

const NONE_LITERAL: &str = "None";

fn or_none(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => NONE_LITERAL,
    }
}

/// Labeled blocks for topic, requested sections, expected count, constraints and context.
pub fn render_user_config(config: &UserConfig) -> String {
    let mut blocks = Vec::new();
    blocks.push(format!("\n## Main Topic: {}.", config.main_topic));

    if !config.sections.is_empty() {
        blocks.push("## User Defined Sample Sections: ".to_string());
        for (i, section) in config.sections.iter().enumerate() {
            blocks.push(format!(
                "{}. {} : \n - {}",
                i + 1,
                or_none(section.section_name.as_deref()),
                or_none(section.description.as_deref())
            ));
        }
    }

    if let Some(count) = config.expected_section_count {
        blocks.push(format!("## Number of Sections User Expects: {}", count));
    }

    blocks.push(format!(
        "## User defined CONSTRAINTS: {}",
        or_none(Some(config.constraints.as_str()))
    ));
    blocks.push(format!(
        "## Additional User Context: {}",
        or_none(Some(config.context.as_str()))
    ));

    blocks.join("\n\n")
}

/// Numbered `name : content` blocks in document order.
pub fn render_document(document: &GeneratedDocument) -> String {
    document
        .iter()
        .enumerate()
        .map(|(i, section)| format!("{}. {} : \n - {}", i + 1, section.section_name, section.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Evaluator feedback for a refinement stage.
///
/// Structural changes take precedence: when any are present only they are
/// rendered, since semantic detail is moot once the outline changes.
pub fn render_evaluation(evaluation: &EvaluationResult) -> String {
    let mut lines = Vec::new();
    lines.push("### Evaluation Result ###".to_string());
    lines.push(format!(
        "- Overall Coherency Score: {}",
        evaluation.coherency_score
    ));

    let structural = evaluation.structural_changes.items();
    if !structural.is_empty() {
        lines.push("\n## Structural Changes Required ##\n".to_string());
        for (i, change) in structural.iter().enumerate() {
            lines.push(format!(
                "{}. Action: **{}**\n   - Section: {}\n   - Context: {}",
                i + 1,
                change.action,
                change.section_name,
                change.context
            ));
        }
        return lines.join("\n");
    }
    lines.push("\n- No structural issues.".to_string());

    let semantic = evaluation.semantic_issues.items();
    if semantic.is_empty() {
        lines.push("\n- No semantic issues.".to_string());
    } else {
        lines.push("\n## Semantic Refinements Required ##\n".to_string());
        for (i, issue) in semantic.iter().enumerate() {
            lines.push(format!(
                "{}. Section: **{}**\n   - Issue: {}\n   - Suggestion: {}",
                i + 1,
                issue.section_name,
                issue.issue,
                issue.suggestion
            ));
        }
    }

    lines.join("\n")
}

/// Single-pass `{NAME}` substitution. Substituted text is never re-scanned,
/// so user content containing a placeholder name stays literal.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let key = &after[..close];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value, close))
        });
        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Optional overrides for the stage instructions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default)]
    pub draft: Option<String>,
    #[serde(default)]
    pub evaluate: Option<String>,
    #[serde(default)]
    pub semantic_refine: Option<String>,
    #[serde(default)]
    pub structural_refine: Option<String>,
}

/// The four stage instructions, filled from run state.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplates {
    pub draft: String,
    pub evaluate: String,
    pub semantic_refine: String,
    pub structural_refine: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptTemplates {
    /// Built-in templates, with the document JSON contract appended to the
    /// three document-producing stages.
    pub fn builtin() -> Self {
        Self {
            draft: format!("{}{}", DRAFT_TEMPLATE, DOCUMENT_OUTPUT_CONTRACT),
            evaluate: EVALUATE_TEMPLATE.to_string(),
            semantic_refine: format!("{}{}", SEMANTIC_REFINE_TEMPLATE, DOCUMENT_OUTPUT_CONTRACT),
            structural_refine: format!(
                "{}{}",
                STRUCTURAL_REFINE_TEMPLATE, DOCUMENT_OUTPUT_CONTRACT
            ),
        }
    }

    pub fn from_config(config: &PromptConfig) -> Self {
        let defaults = Self::builtin();
        Self {
            draft: config.draft.clone().unwrap_or(defaults.draft),
            evaluate: config.evaluate.clone().unwrap_or(defaults.evaluate),
            semantic_refine: config
                .semantic_refine
                .clone()
                .unwrap_or(defaults.semantic_refine),
            structural_refine: config
                .structural_refine
                .clone()
                .unwrap_or(defaults.structural_refine),
        }
    }

    pub fn draft_prompt(&self, user: &UserConfig) -> String {
        fill_template(
            &self.draft,
            &[(PLACEHOLDER_USER_CONFIG, render_user_config(user).as_str())],
        )
    }

    pub fn evaluation_prompt(&self, user: &UserConfig, document: &GeneratedDocument) -> String {
        let dynamic = if user.dynamic_structure_allowed {
            "true"
        } else {
            "false"
        };
        fill_template(
            &self.evaluate,
            &[
                (PLACEHOLDER_USER_CONFIG, render_user_config(user).as_str()),
                (PLACEHOLDER_DYNAMIC, dynamic),
                (PLACEHOLDER_GENERATED_CONTENT, render_document(document).as_str()),
            ],
        )
    }

    pub fn semantic_refine_prompt(
        &self,
        user: &UserConfig,
        document: &GeneratedDocument,
        evaluation: &EvaluationResult,
    ) -> String {
        fill_template(
            &self.semantic_refine,
            &[
                (PLACEHOLDER_USER_CONFIG, render_user_config(user).as_str()),
                (PLACEHOLDER_GENERATED_CONTENT, render_document(document).as_str()),
                (PLACEHOLDER_SEMANTIC_FEEDBACK, render_evaluation(evaluation).as_str()),
            ],
        )
    }

    pub fn structural_refine_prompt(
        &self,
        user: &UserConfig,
        document: &GeneratedDocument,
        evaluation: &EvaluationResult,
    ) -> String {
        fill_template(
            &self.structural_refine,
            &[
                (PLACEHOLDER_USER_CONFIG, render_user_config(user).as_str()),
                (PLACEHOLDER_GENERATED_CONTENT, render_document(document).as_str()),
                (PLACEHOLDER_STRUCTURAL_FEEDBACK, render_evaluation(evaluation).as_str()),
            ],
        )
    }
}

const DOCUMENT_OUTPUT_CONTRACT: &str = r#"Return valid JSON only, with no commentary, in exactly this shape:

{
  "generated_content": [
    { "section_name": "...", "content": "..." }
  ]
}"#;

const DRAFT_TEMPLATE: &str = r#"You are an expert content generation model. Write clear, well-structured and coherent text for every section of a document described by the user configuration below.

==================== USER CONFIG ====================
{USER_CONFIG}

==================== INSTRUCTIONS ====================
1. Produce one entry per section, in a sensible reading order.
2. Respect every constraint (tone, style, length, transformation rules).
3. Do not invent topics outside the configuration.
4. Keep the sections continuous and consistent with one another.
5. Markdown is allowed inside section content.

"#;

const EVALUATE_TEMPLATE: &str = r#"You are a strict, high-signal evaluator of a generated document. Decide whether it is acceptable as-is or needs semantic refinement or structural modification. Only report issues that meaningfully affect understanding, correctness, coherence, structure, or alignment with the user's constraints.

==================== USER OBJECTIVES ====================
{USER_CONFIG}

ALLOW_DYNAMIC_CONTENT_GENERATION = {ALLOW_DYNAMIC_CONTENT_GENERATION}

==================== CONTENT TO EVALUATE ====================
{GENERATED_CONTENT}

==================== SEMANTIC QUALITY ====================
Report a semantic issue (section_name, issue, suggestion) only when clarity, logical flow, correctness, topic alignment or constraint adherence is meaningfully harmed. If there are none, return "None".

==================== STRUCTURAL QUALITY ====================
If ALLOW_DYNAMIC_CONTENT_GENERATION is false (rigid mode): never propose add, remove, rename or reorder actions; structural_changes MUST be "None". Structural observations may only appear in the diagnostic summary.
If ALLOW_DYNAMIC_CONTENT_GENERATION is true (flexible mode): you may propose purposeful structural changes (add, remove, rename, reorder) that improve clarity or alignment without contradicting the user's constraints or intended meaning. If none are needed, return "None".

==================== NEXT ACTION ====================
- "structural_refine" if structural_changes is not "None"
- "semantic_refine" if structural_changes is "None" and semantic_issues is not "None"
- "no_action" if both are "None"

==================== DIAGNOSTIC SUMMARY ====================
Two to four sentences for the user on overall quality and high-level opportunities. It does not drive any decision.

==================== COHERENCY SCORE ====================
A number between 0 and 1 reflecting logical clarity, organization and cohesion.

Return valid JSON only, with no commentary, in exactly this shape:

{
  "coherency_score": 0.0,
  "semantic_issues": "None" or [ { "section_name": "...", "issue": "...", "suggestion": "..." } ],
  "structural_changes": "None" or [ { "action": "add" | "remove" | "rename" | "reorder", "section_name": "...", "context": "..." } ],
  "next_action": "semantic_refine" | "structural_refine" | "no_action",
  "evaluator_diagnostic_summary": "..."
}
"#;

const SEMANTIC_REFINE_TEMPLATE: &str = r#"You are an expert rewriting model. Improve the generated document only where the evaluator found problems.

==================== USER CONFIG ====================
{USER_CONFIG}

==================== CURRENT CONTENT ====================
{GENERATED_CONTENT}

==================== SEMANTIC FEEDBACK ====================
{SEMANTIC_FEEDBACK}

==================== INSTRUCTIONS ====================
1. Rewrite only the sections the feedback names, following its suggestions.
2. Keep every original constraint (tone, style, length).
3. Keep every section name exactly as it is and keep the section order.
4. Return sections without issues unchanged.
5. Markdown is allowed inside section content.

"#;

const STRUCTURAL_REFINE_TEMPLATE: &str = r#"You are a structural refinement model. Update the document's section outline and content according to the evaluator's structural changes, applying them exactly and in order.

==================== USER CONFIG ====================
{USER_CONFIG}

==================== CURRENT CONTENT ====================
{GENERATED_CONTENT}

==================== STRUCTURAL FEEDBACK ====================
{STRUCTURAL_FEEDBACK}

==================== INSTRUCTIONS ====================
1. Apply each change: add new sections (writing content that follows the constraints), remove, rename or reorder sections.
2. Regenerate only what changed. Sections no change touches must keep exactly the same content.
3. Keep every original constraint (tone, style, length).
4. Markdown is allowed inside section content.

"#;
