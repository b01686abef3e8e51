use log::debug;
use serde_json::Value;

use crate::formatter::{colorize, Tone};
use crate::llm::{remove_think_block, LlmError, UnifiedLlm};
use crate::prompts::{
    fill_template, DESCRIPTION_PROMPT, GENERIC_CONTENT_PROMPT, JIRA_DESCRIPTION_COMPARE_PROMPT,
    LOCAL_MARKUP_RENDER_PROMPT, MARKUP_RENDER_PROMPT, SUMMARY_PROMPT,
};

/// Returned in place of a description when generation fails for a reason
/// other than the service being unavailable.
pub const FAILED_STANDARDIZATION: &str =
    "Failed to generate standardized description. Please check your LLM connection and try again.";

/// Issue-specific LLM tasks.
pub struct JiraIssueAi {
    llm: UnifiedLlm,
}

impl JiraIssueAi {
    pub fn new(llm: UnifiedLlm) -> Self {
        Self { llm }
    }

    pub fn llm(&self) -> &UnifiedLlm {
        &self.llm
    }

    /// Rewrite a description into the standard sections.
    ///
    /// `template` replaces the built-in prompt and must contain `{title}`
    /// and `{description}`. Only [`LlmError::ServiceUnavailable`] is returned
    /// as an error.
    pub async fn standardize_description(
        &self,
        description: &str,
        title: &str,
        template: Option<&str>,
    ) -> Result<String, LlmError> {
        let prompt = fill_template(
            template.unwrap_or(DESCRIPTION_PROMPT),
            &[("title", title), ("description", description)],
        );

        println!("{}", colorize("🤖 Generating standardized description...", Tone::Info));
        match self.llm.query(&prompt).await {
            Ok(text) => Ok(remove_think_block(&text).trim().to_string()),
            Err(e) if e.is_unavailable() => Err(e),
            Err(e) => {
                println!(
                    "{}",
                    colorize(
                        &format!("❌ Failed to generate standardized description: {}", e),
                        Tone::Negative
                    )
                );
                Ok(FAILED_STANDARDIZATION.to_string())
            }
        }
    }

    /// Ask the model to turn Jira markup into terminal text.
    pub async fn render_markup(&self, standardized: &str) -> Result<String, LlmError> {
        let template = if self.llm.is_remote() {
            MARKUP_RENDER_PROMPT
        } else {
            LOCAL_MARKUP_RENDER_PROMPT
        };
        let prompt = fill_template(template, &[("standarised_description", standardized)]);
        let rendered = self.llm.query(&prompt).await?;
        Ok(rendered.trim().to_string())
    }

    /// Generic "true"/"false" judgement; `prompt_template` overrides the built-in prompt.
    pub async fn compare_content(
        &self,
        content1: &str,
        content2: &str,
        comparison_context: &str,
        prompt_template: Option<String>,
    ) -> Result<bool, LlmError> {
        let prompt = prompt_template.unwrap_or_else(|| {
            fill_template(
                GENERIC_CONTENT_PROMPT,
                &[
                    ("content1", content1),
                    ("content2", content2),
                    ("comparison_context", comparison_context),
                ],
            )
        });

        let answer = self.llm.query(&prompt).await?;
        let answer = answer.trim().to_lowercase();
        match answer.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => {
                println!(
                    "{}",
                    colorize(
                        &format!("⚠️  Unexpected comparison result: '{}', defaulting to similar", other),
                        Tone::Neutral
                    )
                );
                Ok(true)
            }
        }
    }

    /// Whether the rendered preview kept the content of the standardized text.
    pub async fn compare_descriptions(
        &self,
        standardized: &str,
        terminal_output: &str,
    ) -> Result<bool, LlmError> {
        let prompt = fill_template(
            JIRA_DESCRIPTION_COMPARE_PROMPT,
            &[
                ("standardized_description", standardized),
                ("terminal_friendly_output", terminal_output),
            ],
        );
        self.compare_content(
            standardized,
            terminal_output,
            "JIRA description similarity",
            Some(prompt),
        )
        .await
    }

    /// Progress summary for the `--rundown` view.
    pub async fn summarize_issue(&self, issue_data: &Value) -> Result<String, LlmError> {
        let data = serde_json::to_string_pretty(issue_data).unwrap_or_else(|_| issue_data.to_string());
        debug!("Summarizing {} bytes of issue data", data.len());
        let prompt = fill_template(SUMMARY_PROMPT, &[("issue_data", &data)]);
        let summary = self.llm.query(&prompt).await?;
        Ok(summary.trim().to_string())
    }
}
