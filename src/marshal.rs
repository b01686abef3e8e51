use anyhow::{Context, Result};
use log::{debug, info};
use serde_json::{json, Value};

use crate::fields::{issue_key, FieldEngine};
use crate::formatter::{colorize, convert_jira_markup_for_display, Tone};
use crate::issue_ai::{JiraIssueAi, FAILED_STANDARDIZATION};
use crate::jira_client::Tracker;
use crate::llm::LlmError;
use crate::prompt::Prompter;

/// Text identifying the pinned comment that holds the pre-AI description.
pub const BACKUP_MARKER: &str = "Original description (backup before AI standardization)";

pub const MAX_GENERATION_ATTEMPTS: usize = 3;
pub const MAX_RENDER_ATTEMPTS: usize = 2;

const MAIN_MENU: [&str; 4] = [
    "Display on terminal",
    "Copy to clipboard",
    "Update issue description",
    "Exit",
];
const DEGRADED_MENU: [&str; 3] = ["Copy to clipboard", "Update issue description", "Exit"];
const RETRY_MENU: [&str; 2] = ["Retry", "Exit"];

/// System clipboard access.
pub trait Clipboard {
    fn copy(&self, text: &str) -> Result<()>;
}

pub struct ArboardClipboard;

impl Clipboard for ArboardClipboard {
    fn copy(&self, text: &str) -> Result<()> {
        let mut clipboard = arboard::Clipboard::new().context("Clipboard is not available")?;
        clipboard
            .set_text(text.to_string())
            .context("Failed to copy to clipboard")?;
        Ok(())
    }
}

/// How a marshaling session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarshalOutcome {
    NoDescription,
    GenerationFailed,
    Exited,
    Copied,
    Updated,
}

#[derive(Debug)]
enum Step {
    Generate { attempt: usize },
    Menu,
    Render { attempt: usize },
    Degraded,
    Update,
    Done(MarshalOutcome),
}

enum MenuChoice {
    Display,
    Copy,
    Update,
    Exit,
}

/// Interactive rewrite of one issue description.
pub struct Marshaller<'a> {
    engine: &'a FieldEngine<'a>,
    tracker: &'a dyn Tracker,
    ai: &'a JiraIssueAi,
    prompter: &'a dyn Prompter,
    clipboard: &'a dyn Clipboard,
}

impl<'a> Marshaller<'a> {
    pub fn new(
        engine: &'a FieldEngine<'a>,
        tracker: &'a dyn Tracker,
        ai: &'a JiraIssueAi,
        prompter: &'a dyn Prompter,
        clipboard: &'a dyn Clipboard,
    ) -> Self {
        Self {
            engine,
            tracker,
            ai,
            prompter,
            clipboard,
        }
    }

    /// Fetch, generate, then loop on the menu until a terminal outcome.
    ///
    /// `template` replaces the built-in standardization prompt.
    pub async fn run(&self, issue: &Value, template: Option<&str>) -> Result<MarshalOutcome> {
        let key = issue_key(issue);
        let fields = self
            .engine
            .get_issue_fields(issue, &["description", "title"])
            .await;
        let original = fields[0].1.to_string();
        let title = fields[1].1.plain();

        if original.trim().is_empty() {
            println!(
                "{}",
                colorize(
                    &format!("⚠️  Issue {} has no description to standardize.", key),
                    Tone::Neutral
                )
            );
            return Ok(MarshalOutcome::NoDescription);
        }

        let mut standardized = String::new();
        let mut step = Step::Generate { attempt: 1 };
        loop {
            debug!("Marshal step {:?}", step);
            step = match step {
                Step::Generate { attempt } => {
                    match self.generate(&original, &title, template, attempt).await? {
                        Ok(text) => {
                            standardized = text;
                            Step::Menu
                        }
                        Err(next) => next,
                    }
                }
                Step::Menu => match self.main_menu()? {
                    MenuChoice::Display => Step::Render { attempt: 1 },
                    MenuChoice::Copy => self.copy(&standardized, Step::Menu),
                    MenuChoice::Update => Step::Update,
                    MenuChoice::Exit => Step::Done(MarshalOutcome::Exited),
                },
                Step::Render { attempt } => self.render(&standardized, attempt).await?,
                Step::Degraded => {
                    println!(
                        "{}",
                        colorize("⚠️  Showing a locally formatted preview instead.", Tone::Neutral)
                    );
                    println!("{}", convert_jira_markup_for_display(&standardized));
                    match self.degraded_menu()? {
                        MenuChoice::Copy => self.copy(&standardized, Step::Degraded),
                        MenuChoice::Update => Step::Update,
                        _ => Step::Done(MarshalOutcome::Exited),
                    }
                }
                Step::Update => {
                    self.update(&key, &original, &standardized).await?;
                    Step::Done(MarshalOutcome::Updated)
                }
                Step::Done(outcome) => return Ok(outcome),
            };
        }
    }

    /// `Ok(Ok(text))` on success, `Ok(Err(step))` with the next step otherwise.
    async fn generate(
        &self,
        original: &str,
        title: &str,
        template: Option<&str>,
        attempt: usize,
    ) -> Result<std::result::Result<String, Step>> {
        match self
            .ai
            .standardize_description(original, title, template)
            .await
        {
            Ok(text) if text.trim().is_empty() || text == FAILED_STANDARDIZATION => {
                Ok(Err(Step::Done(MarshalOutcome::GenerationFailed)))
            }
            Ok(text) => Ok(Ok(text)),
            Err(e) => {
                println!("{}", colorize(&format!("❌ {}", e), Tone::Negative));
                if attempt >= MAX_GENERATION_ATTEMPTS {
                    println!(
                        "{}",
                        colorize("❌ Maximum retry attempts reached. Exiting.", Tone::Negative)
                    );
                    return Ok(Err(Step::Done(MarshalOutcome::GenerationFailed)));
                }
                if self.retry_or_exit(&e)? {
                    Ok(Err(Step::Generate {
                        attempt: attempt + 1,
                    }))
                } else {
                    Ok(Err(Step::Done(MarshalOutcome::Exited)))
                }
            }
        }
    }

    fn retry_or_exit(&self, error: &LlmError) -> Result<bool> {
        let choice = self.prompter.select(
            &format!("{} What would you like to do?", error),
            &RETRY_MENU,
        )?;
        Ok(choice == 0)
    }

    async fn render(&self, standardized: &str, attempt: usize) -> Result<Step> {
        println!("{}", colorize("🎨 Rendering description for the terminal...", Tone::Info));
        let rendered = match self.ai.render_markup(standardized).await {
            Ok(rendered) => rendered,
            Err(e) => {
                println!("{}", colorize(&format!("❌ {}", e), Tone::Negative));
                return Ok(Step::Degraded);
            }
        };

        match self.ai.compare_descriptions(standardized, &rendered).await {
            Ok(true) => {
                println!("\n{}\n", rendered);
                Ok(Step::Menu)
            }
            Ok(false) => {
                println!(
                    "{}",
                    colorize(
                        "⚠️  The rendered output does not match the standardized description.",
                        Tone::Neutral
                    )
                );
                if attempt < MAX_RENDER_ATTEMPTS
                    && self.prompter.confirm("Retry rendering?", true)?
                {
                    Ok(Step::Render {
                        attempt: attempt + 1,
                    })
                } else {
                    Ok(Step::Degraded)
                }
            }
            Err(e) => {
                println!("{}", colorize(&format!("❌ {}", e), Tone::Negative));
                Ok(Step::Degraded)
            }
        }
    }

    fn main_menu(&self) -> Result<MenuChoice> {
        let choice = self.prompter.select(
            "What would you like to do with the standardized description?",
            &MAIN_MENU,
        )?;
        Ok(match choice {
            0 => MenuChoice::Display,
            1 => MenuChoice::Copy,
            2 => MenuChoice::Update,
            _ => MenuChoice::Exit,
        })
    }

    fn degraded_menu(&self) -> Result<MenuChoice> {
        let choice = self
            .prompter
            .select("What would you like to do next?", &DEGRADED_MENU)?;
        Ok(match choice {
            0 => MenuChoice::Copy,
            1 => MenuChoice::Update,
            _ => MenuChoice::Exit,
        })
    }

    /// A failed copy prints the text and returns to `back`.
    fn copy(&self, standardized: &str, back: Step) -> Step {
        match self.clipboard.copy(standardized) {
            Ok(()) => {
                println!(
                    "{}",
                    colorize("📋 Standardized description copied to clipboard.", Tone::Positive)
                );
                Step::Done(MarshalOutcome::Copied)
            }
            Err(e) => {
                println!("{}", colorize(&format!("❌ {:#}", e), Tone::Negative));
                println!("\n{}\n", standardized);
                back
            }
        }
    }

    async fn update(&self, key: &str, original: &str, standardized: &str) -> Result<()> {
        let pinned = self.tracker.pinned_comments(key).await?;
        let has_backup = pinned.iter().any(|comment| {
            comment
                .get("body")
                .and_then(Value::as_str)
                .map(|body| body.contains(BACKUP_MARKER))
                .unwrap_or(false)
        });

        if has_backup {
            info!("Backup comment already present on {}", key);
            println!(
                "{}",
                colorize("ℹ️  Original description backup already exists.", Tone::Info)
            );
        } else {
            let comment = self.tracker.add_comment(key, &backup_comment(original)).await?;
            let comment_id = match comment.get("id") {
                Some(Value::String(id)) => id.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };

            match self.tracker.pin_comment(key, &comment_id).await {
                Ok(()) => println!(
                    "{}",
                    colorize(
                        "📌 Original description backed up and pinned as a comment.",
                        Tone::Positive
                    )
                ),
                Err(e) => {
                    debug!("Pinning comment {} on {} failed: {:#}", comment_id, key, e);
                    println!(
                        "{}",
                        colorize(
                            "⚠️  Could not pin the backup. Original description backed up as a comment.",
                            Tone::Neutral
                        )
                    );
                }
            }
        }

        self.tracker
            .update_fields(key, json!({ "description": standardized }))
            .await?;
        println!(
            "{}",
            colorize(&format!("✅ Description of {} updated.", key), Tone::Positive)
        );
        Ok(())
    }
}

pub fn backup_comment(original: &str) -> String {
    format!("{}:\n{{noformat}}\n{}\n{{noformat}}", BACKUP_MARKER, original)
}
