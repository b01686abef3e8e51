use anyhow::{Context, Result};
use log::{debug, info};
use serde_json::{json, Value};

use crate::config::Section;
use crate::error::JiazError;
use crate::fields::{first_name, issue_key, issue_type, numeric_field, FieldEngine, FieldId};
use crate::formatter::{colorize, Cell, Row, Tone};
use crate::jira_client::Tracker;

pub const PROJECT_KEY: &str = "jira_project";
pub const BACKLOG_KEY: &str = "jira_backlog_name";
pub const BOARD_NAME_KEY: &str = "jira_sprintboard_name";
pub const BOARD_ID_KEY: &str = "jira_sprintboard_id";

/// Column order of the sprint issue table.
pub const SPRINT_HEADERS: [&str; 10] = [
    "Issue Key",
    "Assignee",
    "Title",
    "Priority",
    "Work Type",
    "Initial Story Points",
    "Actual Story Points",
    "Status",
    "Comment",
    "Epic Link",
];

pub const SPRINT_ISSUE_TYPES: [&str; 3] = ["Bug", "Story", "Task"];

pub const MAX_SPRINT_RESULTS: u32 = 1000;

/// Board and project settings of a config block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SprintSettings {
    pub project: String,
    pub backlog: Option<String>,
    pub board_id: String,
    pub board_name: String,
}

impl SprintSettings {
    pub fn from_section(section: &Section) -> Result<Self, JiazError> {
        let required = |key: &str| -> Result<String, JiazError> {
            section
                .get(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| {
                    JiazError::validation(format!(
                        "'{}' is not set. Use 'jiaz config set {} <value>' to add it.",
                        key, key
                    ))
                })
        };

        Ok(Self {
            project: required(PROJECT_KEY)?,
            backlog: section
                .get(BACKLOG_KEY)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            board_id: required(BOARD_ID_KEY)?,
            board_name: required(BOARD_NAME_KEY)?,
        })
    }
}

/// An active sprint on the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSprint {
    pub id: String,
    pub name: String,
}

/// First active sprint whose name contains the configured board name.
pub async fn find_active_sprint(
    tracker: &dyn Tracker,
    settings: &SprintSettings,
) -> Result<Option<ActiveSprint>> {
    let sprints = tracker
        .active_sprints(&settings.board_id)
        .await
        .context("Failed to fetch active sprints")?;

    let found = sprints.iter().find_map(|sprint| {
        let name = sprint.get("name").and_then(Value::as_str)?;
        if !name.contains(&settings.board_name) {
            return None;
        }
        let id = match sprint.get("id")? {
            Value::String(id) => id.clone(),
            other => other.to_string(),
        };
        Some(ActiveSprint {
            id,
            name: name.to_string(),
        })
    });

    if let Some(sprint) = &found {
        info!("Active sprint {} ({})", sprint.name, sprint.id);
    }
    Ok(found)
}

pub fn sprint_jql(settings: &SprintSettings, sprint: &ActiveSprint, mine: bool) -> String {
    let mut jql = format!("project = '{}' and type != Epic", settings.project);
    if let Some(backlog) = &settings.backlog {
        jql.push_str(&format!(" and labels = '{}'", backlog));
    }
    jql.push_str(&format!(" and Sprint = {}", sprint.id));
    if mine {
        jql.push_str(" and assignee = currentUser()");
    }
    jql.push_str(" ORDER BY Rank ASC");
    jql
}

/// Fill in whichever story-point field is missing from the other one.
///
/// Both missing stays unassigned; one missing writes the other value back
/// to the tracker so both show it.
pub async fn reconcile_story_points(tracker: &dyn Tracker, issue: &Value) -> Result<(Cell, Cell)> {
    let ids = tracker.custom_fields();
    let key = issue_key(issue);
    let original = numeric_field(issue, &ids.original_story_points);
    let actual = numeric_field(issue, &ids.story_points);

    match (original, actual) {
        (None, None) => {
            let missing = Cell::Text(colorize("Not Assigned", Tone::Negative));
            Ok((missing.clone(), missing))
        }
        (None, Some(points)) => {
            debug!("Copying story points of {} into the initial estimate", key);
            tracker
                .update_fields(&key, json!({ ids.original_story_points.as_str(): points }))
                .await?;
            Ok((Cell::Number(points), Cell::Number(points)))
        }
        (Some(points), None) => {
            debug!("Copying the initial estimate of {} into story points", key);
            tracker
                .update_fields(&key, json!({ ids.story_points.as_str(): points }))
                .await?;
            Ok((Cell::Number(points), Cell::Number(points)))
        }
        (Some(original), Some(actual)) => Ok((Cell::Number(original), Cell::Number(actual))),
    }
}

/// One row per assigned Bug, Story or Task, in [`SPRINT_HEADERS`] order.
pub async fn build_sprint_rows(
    engine: &FieldEngine<'_>,
    tracker: &dyn Tracker,
    issues: &[Value],
) -> Result<Vec<Row>> {
    let mut rows = Vec::with_capacity(issues.len());

    for issue in issues {
        let kind = issue_type(issue).unwrap_or_default();
        if !SPRINT_ISSUE_TYPES.contains(&kind.as_str()) {
            debug!("Ignoring {} of type '{}'", issue_key(issue), kind);
            continue;
        }

        let assignee = issue
            .get("fields")
            .and_then(|fields| fields.get("assignee"))
            .and_then(|assignee| assignee.get("displayName"))
            .and_then(Value::as_str);
        let Some(assignee) = assignee else {
            println!("\nSkipping {} as there's no assignee yet\n", issue_key(issue));
            continue;
        };

        let (original_points, story_points) = reconcile_story_points(tracker, issue).await?;
        rows.push(vec![
            engine.render_field(issue, FieldId::Key).await,
            Cell::text(first_name(assignee)),
            engine.render_field(issue, FieldId::Title).await,
            engine.render_field(issue, FieldId::Priority).await,
            engine.render_field(issue, FieldId::WorkType).await,
            original_points,
            story_points,
            engine.render_field(issue, FieldId::Status).await,
            engine.render_field(issue, FieldId::LatestComment).await,
            engine.render_field(issue, FieldId::EpicLink).await,
        ]);
    }

    Ok(rows)
}

pub fn sprint_headers() -> Vec<String> {
    SPRINT_HEADERS.iter().map(|h| h.to_string()).collect()
}
