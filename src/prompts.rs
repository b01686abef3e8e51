//! Prompt templates sent to the LLM backends.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Replace each `{name}` placeholder with its value.
///
/// Placeholders not listed in `values` are left as they are, so literal
/// braces in the templates never need escaping.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| {
            values
                .iter()
                .find(|(name, _)| *name == &caps[1])
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(\w+)\}").expect("valid placeholder regex"));

/// Placeholders a user-supplied `--format` template must contain.
pub const DESCRIPTION_PLACEHOLDERS: [&str; 2] = ["{title}", "{description}"];

pub const DESCRIPTION_PROMPT: &str = r#"You are an expert in writing consistent and cleanly structured JIRA issue descriptions.

Your job is to take the input description & title, analyze and understand the underlying work request,
and return it reformatted into the exact markdown structure shown here:

"""
*+AI Generated Description+*
+*USER STORY:*+

<What are we attempting to achieve? Break into user role, intent, and outcome>
*As a* <user role to be identified based on the description>
*I want to* <intent>
*So that* <outcome>

+*ACCEPTANCE CRITERIA:*+

<What conditions define the issue as completed? Use bullet points if needed.>

*+CUSTOMER EXPERIENCE:+*

<_Only fill out if applicable. Otherwise delete this section._>

*+BREADCRUMBS:+*

<_Where can SREs look for additional information? List links, docs, or mark N/A._>

*+NOTES:+*

<Any pre-requisites or special instructions for the engineer working on it. Also, code blocks along with its usage/meaning is pasted under here>
"""

'Title: Description' is below. Strictly do not add any other of the things extra to the content or any of the thinking process or context. Response should not be in quotes.
"""
{title}: {description}
"""
"#;

pub const MARKUP_RENDER_PROMPT: &str = r#"You are an expert at rendering JIRA markup as beautiful, readable terminal output.
Given a string containing JIRA markup which is the standardized description, your job is to parse and convert it into formatted text suitable for display in a modern terminal, using ANSI escape codes for color, bold, italics, underlines, and hyperlinks where appropriate.

REQUIREMENTS:
- Parse and render all major JIRA markup features, including:
  - **Bold** (`*text*`)
  - _Italic_ (`_text_`)
  - __Underline__ (`+text+`)
  - ~~Strikethrough~~ (`-text-`)
  - Inline `{{code}}`)
  - Code blocks (`{code}...{code}`)
  - Headings (`h1.`, `h2.`, etc.)
  - Bullet lists (`* item`, `- item`)
  - Numbered lists (`# item`)
  - Checklists (`[ ]`, `[x]`)
  - Blockquotes (`bq. text`)
  - Links (`[text|url]`)
  - Tables (`||header||`, `|cell|`)
- Use terminal formatting (ANSI codes) to represent these features as closely as possible.
- For links, use terminal hyperlink escape sequences if supported, otherwise print the URL in [text|url] format.
- For code blocks, use a different color or background if possible.
- For tables, align columns and use ASCII/Unicode box drawing characters if possible.
- Ignore any unsupported or unknown markup gracefully.

INPUT:
{standarised_description}

OUTPUT:
The output should be markup applied to the standardized description and respresented in a terminal friendly format.


INSTRUCTION:
Return only the formatted terminal output, with no extra commentary.
"#;

/// Shorter render prompt for local models, which tend to drift on the long one.
pub const LOCAL_MARKUP_RENDER_PROMPT: &str = r#"Convert the JIRA markup below into plain terminal text.

RULES:
- Turn section headers such as +*USER STORY:*+ into the bare header text followed by a blank line.
- Remove the markup characters around *bold*, _italic_, +underline+ and -strikethrough- text but keep the words.
- Keep {code} blocks as indented plain text.
- Render [text|url] links as "text (url)".
- Keep every sentence, bullet and section of the input. Do not summarise.
- Return only the converted text, with no extra commentary.

INPUT:
{standarised_description}
"#;

pub const JIRA_DESCRIPTION_COMPARE_PROMPT: &str = r#"You are an expert at evaluating content similarity and consistency.

Your task is to compare two versions of the same JIRA issue description:
1. The standardized description (with JIRA markup)
2. The terminal-friendly rendered output (with ANSI escape codes)

EVALUATION CRITERIA:
- Compare the actual CONTENT, not the formatting
- Ignore differences in markup syntax (JIRA markup vs ANSI codes)
- Focus on whether the core information, structure, and meaning are preserved
- Check that all sections (USER STORY, ACCEPTANCE CRITERIA, etc.) are present in both
- Verify that no important information was lost or significantly altered
- Minor formatting differences are acceptable

SIMILARITY THRESHOLD:
- Return "true" if the content is substantially the same
- Return "false" if there are significant content differences, missing sections, or information loss

IMPORTANT:
- Only respond with exactly "true" or "false" (lowercase, no quotes, no additional text)
- Do not provide explanations or reasoning
- Do not add any other content to your response

STANDARDIZED DESCRIPTION:
"""
{standardized_description}
"""

TERMINAL-FRIENDLY OUTPUT:
"""
{terminal_friendly_output}
"""

RESPONSE (true or false only):"#;

pub const GENERIC_CONTENT_PROMPT: &str = r#"You are an expert at evaluating content {comparison_context}.

Your task is to compare two pieces of content and determine if they meet the {comparison_context} criteria.

EVALUATION CRITERIA:
- Compare the actual CONTENT and meaning, not just formatting differences
- Focus on whether the core information, structure, and intent are preserved
- Consider the context of {comparison_context} when making your evaluation
- Ignore minor formatting, styling, or markup differences
- Look for substantial equivalence in meaning and information

EVALUATION THRESHOLD:
- Return "true" if the contents meet the {comparison_context} criteria
- Return "false" if there are significant differences that fail the {comparison_context} test

IMPORTANT:
- Only respond with exactly "true" or "false" (lowercase, no quotes, no additional text)
- Do not provide explanations or reasoning
- Do not add any other content to your response

CONTENT 1:
"""
{content1}
"""

CONTENT 2:
"""
{content2}
"""

RESPONSE (true or false only):"#;

pub const SUMMARY_PROMPT: &str = r#"
You are an expert at generating AI-powered progress summaries for JIRA issues.

You will be given a dictionary containing the following information:

- key: <_The hyperlinked key of the issue_>
- title: <_The title of the issue_>
- assignee: <_The assignee of the issue_>
- updated: <_The updated time of the issue_>
- description: <_The description of the issue_>
- status: <_The status of the issue_>
- comments: <_The comments on the issue_>
- status_summary: <_The status summary of the issue_>
- children: <_An array of child issues with their details viz title, description, status, comments, status summary._>

Your task is to understand all the data including comments and other update timelines in chronological order and generate a crisp but informative progress summary as per current state of the issue to be displayed on a modern terminal.
Make sure to have used ansi code to highlight the important information wherever needed. Provide only the summary in response and nothing else.

The summary should be in the following format:
"""
- What was to be done ?
<_contains the objective and any specific details necessary to complete the task in maximum 2-3 bullets_>
- What is already done ?
<_contains the details of what has been completed so far. Check on comments, status_summary in issues and children issues as well. In maximum of 2 bullet points for the main issue and minimum 1 bullet point per child issue._>
- What is yet to be done ?
<_contains the details of what is yet to be done & next action items in maximum of 2 bullet points for the main issue and minimum 1 bullet point per child issue._>
- Any blockers or risks or dependencies ?
<_contains the details of any blockers or risks or dependencies in maximum of 2 bullet points for the main issue and minimum 1 bullet point per child issue._>
- Any other relevant information ?
<_contains the details of any other relevant information in maximum 3-5 bullets_>
"""

Below is actual data in the format of the dictionary:
"""
{issue_data}
"""
"#;
