use anyhow::Context;
use log::{debug, info};

use crate::cli::SprintArgs;
use crate::config::ConfigStore;
use crate::display::{
    render_sprint_epic, render_sprint_issue, render_sprint_owner, render_sprint_status,
};
use crate::error::{CommandResult, JiazError, Outcome};
use crate::fields::FieldEngine;
use crate::formatter::{parse_selection, OutputFormat};
use crate::jira_client::{JiraClient, Tracker};
use crate::sprint::{
    build_sprint_rows, find_active_sprint, sprint_headers, sprint_jql, SprintSettings,
    MAX_SPRINT_RESULTS,
};

/// Point of view of the sprint report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perspective {
    Issue,
    Owner,
    Status,
    Epic,
}

impl Perspective {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "issue" => Some(Perspective::Issue),
            "owner" => Some(Perspective::Owner),
            "status" => Some(Perspective::Status),
            "epic" => Some(Perspective::Epic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SprintRequest {
    pub perspective: Perspective,
    pub format: OutputFormat,
    pub show: Option<Vec<String>>,
    pub mine: bool,
}

impl SprintRequest {
    pub fn from_args(args: &SprintArgs) -> Result<Self, JiazError> {
        let perspective = Perspective::parse(&args.wrt).ok_or_else(|| {
            JiazError::validation(
                "Invalid perspective specified. Use 'issue', 'owner', 'status', or 'epic'.",
            )
        })?;
        let format = OutputFormat::parse(&args.output).ok_or_else(|| {
            JiazError::validation("Invalid output format specified. Use 'json', 'table', or 'csv'.")
        })?;

        Ok(Self {
            perspective,
            format,
            show: parse_selection(args.show.as_deref()),
            mine: args.mine,
        })
    }
}

pub async fn handle_sprint_command(args: SprintArgs) -> CommandResult {
    let request = SprintRequest::from_args(&args)?;

    let store = ConfigStore::load()?;
    let config_name = store.resolve_config_name(args.config_name.as_deref());
    let section = store.section(&config_name)?.clone();
    println!("Using configuration: {}", config_name);

    let settings = SprintSettings::from_section(&section)?;
    let client = JiraClient::connect(&section).await?;
    analyze_sprint(&client, &settings, &request).await
}

/// Find the active sprint, build its rows and print the requested view.
pub async fn analyze_sprint(
    tracker: &dyn Tracker,
    settings: &SprintSettings,
    request: &SprintRequest,
) -> CommandResult {
    let engine = FieldEngine::new(tracker);
    match sprint_report(&engine, tracker, settings, request).await? {
        SprintReport::Rendered(report) => {
            println!("{}", report);
            Ok(Outcome::Completed)
        }
        SprintReport::Skipped(reason) => Ok(Outcome::Aborted(reason)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SprintReport {
    Rendered(String),
    /// Nothing to show; the reason is printed instead.
    Skipped(String),
}

async fn sprint_report(
    engine: &FieldEngine<'_>,
    tracker: &dyn Tracker,
    settings: &SprintSettings,
    request: &SprintRequest,
) -> Result<SprintReport, JiazError> {
    let Some(sprint) = find_active_sprint(tracker, settings).await? else {
        return Ok(SprintReport::Skipped(format!(
            "No active sprint found on board {} matching '{}'.",
            settings.board_id, settings.board_name
        )));
    };
    info!("Analyzing sprint {}", sprint.name);

    let jql = sprint_jql(settings, &sprint, request.mine);
    debug!("Sprint query: {}", jql);
    let issues = tracker
        .search_issues(&jql, MAX_SPRINT_RESULTS)
        .await
        .context("Failed to fetch sprint issues")?;
    if issues.is_empty() {
        return Ok(SprintReport::Skipped(
            "No matching issues found in the sprint.".to_string(),
        ));
    }

    let rows = build_sprint_rows(engine, tracker, &issues).await?;
    let headers = sprint_headers();
    let show = request.show.as_deref();
    let report = match request.perspective {
        Perspective::Issue => render_sprint_issue(&rows, &headers, request.format, show)?,
        Perspective::Owner => render_sprint_owner(&rows, &headers, request.format, show)?,
        Perspective::Status => render_sprint_status(&rows, &headers, request.format, show)?,
        Perspective::Epic => render_sprint_epic(&rows, &headers, request.format, show)?,
    };
    Ok(SprintReport::Rendered(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_issue, FakeTracker};
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    fn args(wrt: &str, output: &str) -> SprintArgs {
        SprintArgs {
            wrt: wrt.to_string(),
            show: None,
            output: output.to_string(),
            config_name: None,
            mine: false,
        }
    }

    fn settings() -> SprintSettings {
        SprintSettings {
            project: "PROJ".into(),
            backlog: None,
            board_id: "42".into(),
            board_name: "Team A".into(),
        }
    }

    async fn report(tracker: &FakeTracker, request: &SprintRequest) -> SprintReport {
        let engine =
            FieldEngine::with_clock(tracker, Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap());
        sprint_report(&engine, tracker, &settings(), request)
            .await
            .unwrap()
    }

    #[test]
    fn test_invalid_perspective() {
        let err = SprintRequest::from_args(&args("team", "json")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid perspective specified. Use 'issue', 'owner', 'status', or 'epic'."
        );
    }

    #[test]
    fn test_invalid_output() {
        let err = SprintRequest::from_args(&args("owner", "xml")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid output format specified. Use 'json', 'table', or 'csv'."
        );
        assert_eq!(
            SprintRequest::from_args(&args("Epic", "CSV")).unwrap().perspective,
            Perspective::Epic
        );
    }

    #[tokio::test]
    async fn test_no_active_sprint_aborts() {
        let tracker = FakeTracker::default()
            .with_sprints(vec![json!({ "id": 1, "name": "Other board sprint" })]);
        let request = SprintRequest::from_args(&args("status", "json")).unwrap();

        let outcome = report(&tracker, &request).await;
        assert!(matches!(outcome, SprintReport::Skipped(reason) if reason.starts_with("No active sprint found")));
        assert!(tracker.searches().is_empty());
    }

    #[tokio::test]
    async fn test_empty_sprint_aborts() {
        let tracker =
            FakeTracker::default().with_sprints(vec![json!({ "id": 9, "name": "Team A Sprint 1" })]);
        let request = SprintRequest::from_args(&args("status", "json")).unwrap();

        assert_eq!(
            report(&tracker, &request).await,
            SprintReport::Skipped("No matching issues found in the sprint.".to_string())
        );
    }

    #[tokio::test]
    async fn test_mine_restricts_query_to_current_user() {
        let tracker =
            FakeTracker::default().with_sprints(vec![json!({ "id": 9, "name": "Team A Sprint 1" })]);
        let mut args = args("issue", "json");
        args.mine = true;
        let request = SprintRequest::from_args(&args).unwrap();

        let _ = report(&tracker, &request).await;
        assert!(tracker.searches()[0].contains("assignee = currentUser()"));
    }

    #[tokio::test]
    async fn test_owner_csv_report() {
        let tracker = FakeTracker::default()
            .with_sprints(vec![json!({ "id": 9, "name": "Team A Sprint 1" })])
            .with_search_results(vec![
                sample_issue("PROJ-1", "New", "Jane Doe", Some(0.0)),
                sample_issue("PROJ-2", "Closed", "Jane Doe", Some(3.0)),
            ]);
        let request = SprintRequest::from_args(&args("owner", "csv")).unwrap();

        let SprintReport::Rendered(csv) = report(&tracker, &request).await else {
            panic!("expected a rendered report");
        };
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Assignee,Completed,Review,In Progress,New,Total");
        assert_eq!(
            lines[1],
            "Jane,\"1 Stories, 3 Points\",-,-,\"1 Stories, 0 Points\",\"2 Stories, 3 Points\""
        );
    }

    #[tokio::test]
    async fn test_issue_json_report_lists_assigned_issues() {
        let tracker = FakeTracker::default()
            .with_sprints(vec![json!({ "id": 9, "name": "Team A Sprint 1" })])
            .with_search_results(vec![
                sample_issue("PROJ-1", "In Progress", "Jane Doe", Some(2.0)),
                sample_issue("PROJ-2", "New", "", Some(1.0)),
            ]);
        let mut args = args("issue", "json");
        args.show = Some("Issue Key, Assignee".to_string());
        let request = SprintRequest::from_args(&args).unwrap();

        let SprintReport::Rendered(json) = report(&tracker, &request).await else {
            panic!("expected a rendered report");
        };
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, json!([{ "Issue Key": "PROJ-1", "Assignee": "Jane" }]));
    }
}
