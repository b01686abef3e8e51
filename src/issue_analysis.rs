use anyhow::Context;
use log::{info, warn};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use crate::cli::IssueArgs;
use crate::config::ConfigStore;
use crate::display::{render_issue, render_issue_summary};
use crate::error::{CommandResult, JiazError, Outcome};
use crate::fields::{children_jql, issue_key, resolve_fields, FieldEngine, MAX_CHILDREN};
use crate::formatter::{colorize, parse_selection, Cell, OutputFormat, Tone};
use crate::issue_ai::JiraIssueAi;
use crate::jira_client::{JiraClient, Tracker};
use crate::llm::UnifiedLlm;
use crate::marshal::{ArboardClipboard, Marshaller};
use crate::prompt::DialoguerPrompter;
use crate::prompts::DESCRIPTION_PLACEHOLDERS;

const RUNDOWN_FIELDS: [&str; 8] = [
    "key",
    "title",
    "assignee",
    "updated",
    "description",
    "status",
    "comments",
    "status_summary",
];

const RUNDOWN_CHILD_FIELDS: [&str; 6] = [
    "key",
    "title",
    "description",
    "status",
    "comments",
    "status_summary",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueMode {
    Display,
    Rundown,
    Marshal,
}

/// Validated `analyze issue` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRequest {
    pub id: String,
    pub format: OutputFormat,
    pub show: Option<Vec<String>>,
    pub mode: IssueMode,
}

impl IssueRequest {
    /// Checks that need no configuration or network.
    pub fn from_args(args: &IssueArgs) -> Result<Self, JiazError> {
        if args.marshal_description && args.rundown {
            return Err(JiazError::validation(
                "❌ Cannot use --marshal-description and --rundown together. Please choose one.",
            ));
        }

        let format = match OutputFormat::parse(&args.output) {
            Some(format @ (OutputFormat::Json | OutputFormat::Table)) => format,
            _ => {
                return Err(JiazError::validation(
                    "Invalid output format specified. Use 'json' or 'table'.",
                ))
            }
        };

        if args.format.is_some() && !args.marshal_description {
            return Err(JiazError::validation(
                "--format can only be used together with --marshal-description.",
            ));
        }

        let mode = if args.rundown {
            IssueMode::Rundown
        } else if args.marshal_description {
            IssueMode::Marshal
        } else {
            IssueMode::Display
        };

        Ok(Self {
            id: args.id.trim().to_string(),
            format,
            show: parse_selection(args.show.as_deref()),
            mode,
        })
    }
}

/// Read a standardization template; it must keep both placeholders.
pub fn load_template(path: &Path) -> Result<String, JiazError> {
    let template = fs::read_to_string(path)
        .with_context(|| format!("Failed to read template file {}", path.display()))?;

    let missing: Vec<&str> = DESCRIPTION_PLACEHOLDERS
        .into_iter()
        .filter(|placeholder| !template.contains(placeholder))
        .collect();
    if !missing.is_empty() {
        return Err(JiazError::validation(format!(
            "❌ Template file {} must contain the placeholders: {}",
            path.display(),
            missing.join(", ")
        )));
    }
    Ok(template)
}

pub async fn handle_issue_command(args: IssueArgs) -> CommandResult {
    let request = IssueRequest::from_args(&args)?;
    let template = args.format.as_deref().map(load_template).transpose()?;

    let store = ConfigStore::load()?;
    let config_name = store.resolve_config_name(args.config_name.as_deref());
    let section = store.section(&config_name)?.clone();
    info!("Analyzing {} with config '{}'", request.id, config_name);

    let client = JiraClient::connect(&section).await?;
    let issue = fetch_issue(&client, &request.id).await?;
    let engine = FieldEngine::new(&client);

    match request.mode {
        IssueMode::Display => {
            println!("{}", display_issue(&engine, &issue, &request).await?);
        }
        IssueMode::Rundown => {
            let ai = JiraIssueAi::new(UnifiedLlm::from_config(&store, &config_name)?);
            println!("{}", rundown(&engine, &client, &ai, &issue).await?);
        }
        IssueMode::Marshal => {
            let ai = JiraIssueAi::new(UnifiedLlm::from_config(&store, &config_name)?);
            let prompter = DialoguerPrompter::new();
            let marshaller = Marshaller::new(&engine, &client, &ai, &prompter, &ArboardClipboard);
            let outcome = marshaller.run(&issue, template.as_deref()).await?;
            info!("Marshaling of {} ended with {:?}", request.id, outcome);
        }
    }

    Ok(Outcome::Completed)
}

pub async fn fetch_issue(tracker: &dyn Tracker, id: &str) -> Result<Value, JiazError> {
    tracker
        .get_issue(id)
        .await?
        .ok_or_else(|| JiazError::validation("Please Enter Valid Issue ID"))
}

/// The default or `--show` projection of one issue.
pub async fn display_issue(
    engine: &FieldEngine<'_>,
    issue: &Value,
    request: &IssueRequest,
) -> Result<String, JiazError> {
    let fields = request.show.as_deref().map(|names| {
        let (fields, unknown) = resolve_fields(names);
        if !unknown.is_empty() {
            warn!("Ignoring unknown fields: {}", unknown.join(", "));
            eprintln!(
                "{}",
                colorize(&format!("Unknown field: {}", unknown.join(", ")), Tone::Negative)
            );
            if fields.is_empty() {
                eprintln!("No known field selected. Showing the default fields.");
            }
        }
        fields
    });
    let row = engine.get_all_available_data(issue, fields.as_deref()).await;
    Ok(render_issue(&row, request.format, None)?)
}

fn cell_value(cell: &Cell) -> Value {
    match cell {
        Cell::Number(number) => Value::from(*number),
        Cell::Text(_) => Value::String(cell.plain()),
    }
}

async fn field_map(engine: &FieldEngine<'_>, issue: &Value, names: &[&str]) -> Map<String, Value> {
    engine
        .get_issue_fields(issue, names)
        .await
        .into_iter()
        .map(|(name, cell)| (name, cell_value(&cell)))
        .collect()
}

/// Issue and children details fed to the summary prompt.
pub async fn rundown_data(
    engine: &FieldEngine<'_>,
    tracker: &dyn Tracker,
    issue: &Value,
) -> anyhow::Result<Value> {
    let mut data = field_map(engine, issue, &RUNDOWN_FIELDS).await;

    let children = tracker
        .search_issues(&children_jql(&issue_key(issue)), MAX_CHILDREN)
        .await
        .context("Failed to fetch child issues")?;
    let mut child_data = Vec::with_capacity(children.len());
    for child in &children {
        child_data.push(Value::Object(
            field_map(engine, child, &RUNDOWN_CHILD_FIELDS).await,
        ));
    }
    data.insert("children".to_string(), Value::Array(child_data));

    Ok(Value::Object(data))
}

pub async fn rundown(
    engine: &FieldEngine<'_>,
    tracker: &dyn Tracker,
    ai: &JiraIssueAi,
    issue: &Value,
) -> Result<String, JiazError> {
    let data = rundown_data(engine, tracker, issue).await?;
    println!("🤖 Generating issue summary with {}...", ai.llm().name());
    let summary = ai
        .summarize_issue(&data)
        .await
        .map_err(|e| JiazError::fatal(format!("❌ Failed to generate issue summary: {}", e)))?;
    Ok(render_issue_summary(&issue_key(issue), &summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::strip_ansi;
    use crate::testing::{sample_issue, FakeTracker, ScriptedLlm};
    use chrono::{TimeZone, Utc};
    use std::io::Write;

    fn args(id: &str) -> IssueArgs {
        IssueArgs {
            id: id.to_string(),
            show: None,
            output: "json".to_string(),
            config_name: None,
            rundown: false,
            marshal_description: false,
            format: None,
        }
    }

    fn engine(tracker: &FakeTracker) -> FieldEngine<'_> {
        FieldEngine::with_clock(tracker, Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_rundown_and_marshal_are_exclusive() {
        let mut args = args("PROJ-1");
        args.rundown = true;
        args.marshal_description = true;
        let err = IssueRequest::from_args(&args).unwrap_err();
        assert_eq!(
            err.to_string(),
            "❌ Cannot use --marshal-description and --rundown together. Please choose one."
        );
    }

    #[test]
    fn test_output_must_be_json_or_table() {
        let mut args = args("PROJ-1");
        args.output = "csv".to_string();
        let err = IssueRequest::from_args(&args).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid output format specified. Use 'json' or 'table'."
        );
    }

    #[test]
    fn test_request_trims_id_and_splits_show() {
        let mut args = args("  PROJ-1 ");
        args.show = Some("key, title ,status".to_string());
        args.marshal_description = true;
        let request = IssueRequest::from_args(&args).unwrap();
        assert_eq!(request.id, "PROJ-1");
        assert_eq!(request.mode, IssueMode::Marshal);
        assert_eq!(
            request.show,
            Some(vec!["key".to_string(), "title".to_string(), "status".to_string()])
        );

        let mut predefined = self::args("PROJ-1");
        predefined.show = Some("<pre-defined>".to_string());
        assert_eq!(IssueRequest::from_args(&predefined).unwrap().show, None);
    }

    #[test]
    fn test_template_needs_both_placeholders() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Rewrite {{title}} please").unwrap();
        let err = load_template(file.path()).unwrap_err();
        assert!(err.to_string().contains("{description}"));
        assert!(!err.to_string().contains("{title}"));

        let mut good = tempfile::NamedTempFile::new().unwrap();
        write!(good, "{{title}}\n{{description}}").unwrap();
        assert_eq!(load_template(good.path()).unwrap(), "{title}\n{description}");
    }

    #[tokio::test]
    async fn test_missing_issue_is_a_validation_error() {
        let tracker = FakeTracker::default();
        let err = fetch_issue(&tracker, "PROJ-404").await.unwrap_err();
        assert!(matches!(err, JiazError::Validation(_)));
        assert_eq!(err.to_string(), "Please Enter Valid Issue ID");
    }

    #[tokio::test]
    async fn test_display_with_show_projects_requested_fields() {
        let issue = sample_issue("PROJ-1", "In Progress", "Jane Doe", Some(3.0));
        let tracker = FakeTracker::default().with_issue(issue.clone());
        let mut args = args("PROJ-1");
        args.show = Some("key,status,story_points".to_string());
        let request = IssueRequest::from_args(&args).unwrap();

        let json = display_issue(&engine(&tracker), &issue, &request).await.unwrap();
        let parsed: Value = serde_json::from_str(&json).unwrap();
        let record = parsed[0].as_object().unwrap();
        assert_eq!(
            record.keys().collect::<Vec<_>>(),
            vec!["Issue Key", "Status", "Actual Story Points"]
        );
        assert_eq!(record["Issue Key"], "PROJ-1");
        assert_eq!(record["Actual Story Points"], 3.0);
    }

    #[tokio::test]
    async fn test_rundown_data_includes_children() {
        let issue = sample_issue("PROJ-1", "In Progress", "Jane Doe", None);
        let child = sample_issue("PROJ-2", "Closed", "Sam Smith", Some(1.0));
        let tracker = FakeTracker::default().with_search_results(vec![child]);

        let data = rundown_data(&engine(&tracker), &tracker, &issue).await.unwrap();
        assert_eq!(data["key"], "PROJ-1");
        assert_eq!(data["assignee"], "Jane Doe");
        assert_eq!(data["children"][0]["key"], "PROJ-2");
        assert_eq!(data["children"][0]["status"], "Closed");
        assert!(data["children"][0].get("assignee").is_none());
        assert!(!data.to_string().contains('\u{1b}'));
    }

    #[tokio::test]
    async fn test_rundown_renders_summary_banner() {
        let issue = sample_issue("PROJ-1", "In Progress", "Jane Doe", None);
        let tracker = FakeTracker::default();
        let ai = JiraIssueAi::new(UnifiedLlm::with_backend(Box::new(ScriptedLlm::new(vec![
            Ok("- What is already done ?\n- most of it".to_string()),
        ]))));

        let text = rundown(&engine(&tracker), &tracker, &ai, &issue).await.unwrap();
        let text = strip_ansi(&text);
        assert!(text.contains("AI-Powered Issue Summary for PROJ-1"));
        assert!(text.contains("- most of it"));
    }

    #[tokio::test]
    async fn test_rundown_with_unavailable_llm_fails() {
        let issue = sample_issue("PROJ-1", "In Progress", "Jane Doe", None);
        let tracker = FakeTracker::default();
        let ai = JiraIssueAi::new(UnifiedLlm::with_backend(Box::new(ScriptedLlm::unavailable())));

        let err = rundown(&engine(&tracker), &tracker, &ai, &issue).await.unwrap_err();
        assert!(matches!(err, JiazError::Fatal(_)));
    }
}
