use anyhow::Result;
use chrono::{DateTime, Utc};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::formatter::{
    color_map, colorize, comment_age, days_left, link_text, parse_date, parse_timestamp,
    relative_time, Cell, Tone,
};
use crate::jira_client::{CustomFieldIds, Tracker};

/// Field groups controlling the default projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Always shown, with a placeholder when absent.
    Required,
    Optional,
    /// Verbose or costly; only when asked for by name.
    OnDemand,
    /// Backed by a tracker custom field.
    Custom,
}

/// Every field the engine knows how to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldId {
    Key,
    Title,
    Type,
    Assignee,
    Reporter,
    Status,
    Priority,
    Labels,
    Components,
    Created,
    Updated,
    Resolution,
    LatestComment,
    Children,
    Description,
    Comments,
    StatusSummary,
    WorkType,
    OriginalStoryPoints,
    StoryPoints,
    Sprints,
    EpicLink,
    ParentLink,
    EpicProgress,
    EpicStartDate,
    EpicEndDate,
}

impl FieldId {
    /// Registry order, which is also the default column order.
    pub const ALL: [FieldId; 26] = [
        FieldId::Key,
        FieldId::Title,
        FieldId::Type,
        FieldId::Assignee,
        FieldId::Reporter,
        FieldId::Status,
        FieldId::Priority,
        FieldId::Labels,
        FieldId::Components,
        FieldId::Created,
        FieldId::Updated,
        FieldId::Resolution,
        FieldId::LatestComment,
        FieldId::Children,
        FieldId::Description,
        FieldId::Comments,
        FieldId::StatusSummary,
        FieldId::WorkType,
        FieldId::OriginalStoryPoints,
        FieldId::StoryPoints,
        FieldId::Sprints,
        FieldId::EpicLink,
        FieldId::ParentLink,
        FieldId::EpicProgress,
        FieldId::EpicStartDate,
        FieldId::EpicEndDate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FieldId::Key => "key",
            FieldId::Title => "title",
            FieldId::Type => "type",
            FieldId::Assignee => "assignee",
            FieldId::Reporter => "reporter",
            FieldId::Status => "status",
            FieldId::Priority => "priority",
            FieldId::Labels => "labels",
            FieldId::Components => "components",
            FieldId::Created => "created",
            FieldId::Updated => "updated",
            FieldId::Resolution => "resolution",
            FieldId::LatestComment => "latest_comment",
            FieldId::Children => "children",
            FieldId::Description => "description",
            FieldId::Comments => "comments",
            FieldId::StatusSummary => "status_summary",
            FieldId::WorkType => "work_type",
            FieldId::OriginalStoryPoints => "original_story_points",
            FieldId::StoryPoints => "story_points",
            FieldId::Sprints => "sprints",
            FieldId::EpicLink => "epic_link",
            FieldId::ParentLink => "parent_link",
            FieldId::EpicProgress => "epic_progress",
            FieldId::EpicStartDate => "epic_start_date",
            FieldId::EpicEndDate => "epic_end_date",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            FieldId::Key => "Issue Key",
            FieldId::Title => "Title",
            FieldId::Type => "Type",
            FieldId::Assignee => "Assignee",
            FieldId::Reporter => "Reporter",
            FieldId::Status => "Status",
            FieldId::Priority => "Priority",
            FieldId::Labels => "Labels",
            FieldId::Components => "Components",
            FieldId::Created => "Created",
            FieldId::Updated => "Updated",
            FieldId::Resolution => "Resolution",
            FieldId::LatestComment => "Comment",
            FieldId::Children => "Children",
            FieldId::Description => "Description",
            FieldId::Comments => "Comments",
            FieldId::StatusSummary => "Status Summary",
            FieldId::WorkType => "Work Type",
            FieldId::OriginalStoryPoints => "Initial Story Points",
            FieldId::StoryPoints => "Actual Story Points",
            FieldId::Sprints => "Sprints",
            FieldId::EpicLink => "Epic Link",
            FieldId::ParentLink => "Parent Link",
            FieldId::EpicProgress => "Epic Progress",
            FieldId::EpicStartDate => "Start Date",
            FieldId::EpicEndDate => "End Date",
        }
    }

    pub fn category(self) -> Category {
        match self {
            FieldId::Key
            | FieldId::Title
            | FieldId::Type
            | FieldId::Assignee
            | FieldId::Reporter
            | FieldId::Status => Category::Required,
            FieldId::Priority
            | FieldId::Labels
            | FieldId::Components
            | FieldId::Created
            | FieldId::Updated
            | FieldId::Resolution
            | FieldId::LatestComment
            | FieldId::Children => Category::Optional,
            FieldId::Description | FieldId::Comments | FieldId::StatusSummary => {
                Category::OnDemand
            }
            FieldId::WorkType
            | FieldId::OriginalStoryPoints
            | FieldId::StoryPoints
            | FieldId::Sprints
            | FieldId::EpicLink
            | FieldId::ParentLink
            | FieldId::EpicProgress
            | FieldId::EpicStartDate
            | FieldId::EpicEndDate => Category::Custom,
        }
    }

    /// Payload key under `fields` this field reads.
    pub fn source_key(self, ids: &CustomFieldIds) -> Option<String> {
        let key = match self {
            FieldId::Key | FieldId::Children | FieldId::LatestComment | FieldId::Comments => {
                return None
            }
            FieldId::Title => "summary",
            FieldId::Type => "issuetype",
            FieldId::Assignee => "assignee",
            FieldId::Reporter => "reporter",
            FieldId::Status => "status",
            FieldId::Priority => "priority",
            FieldId::Labels => "labels",
            FieldId::Components => "components",
            FieldId::Created => "created",
            FieldId::Updated => "updated",
            FieldId::Resolution => "resolution",
            FieldId::Description => "description",
            FieldId::StatusSummary => ids.status_summary.as_str(),
            FieldId::WorkType => ids.work_type.as_str(),
            FieldId::OriginalStoryPoints => ids.original_story_points.as_str(),
            FieldId::StoryPoints => ids.story_points.as_str(),
            FieldId::Sprints => ids.sprints.as_str(),
            FieldId::EpicLink => ids.epic_link.as_str(),
            FieldId::ParentLink => ids.parent_link.as_str(),
            FieldId::EpicProgress => ids.epic_progress.as_str(),
            FieldId::EpicStartDate => ids.epic_start_date.as_str(),
            FieldId::EpicEndDate => ids.epic_end_date.as_str(),
        };
        Some(key.to_string())
    }

    /// Look up by field name or display header, case-insensitively.
    pub fn from_name(name: &str) -> Option<FieldId> {
        let wanted = name.trim();
        Self::ALL.into_iter().find(|field| {
            field.name().eq_ignore_ascii_case(wanted) || field.header().eq_ignore_ascii_case(wanted)
        })
    }

    /// Required, optional and custom fields in registry order.
    pub fn default_selection() -> Vec<FieldId> {
        Self::ALL
            .into_iter()
            .filter(|field| field.category() != Category::OnDemand)
            .collect()
    }
}

/// One issue projected into parallel headers and values.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueRow {
    pub headers: Vec<String>,
    pub values: Vec<Cell>,
}

impl IssueRow {
    pub fn get(&self, header: &str) -> Option<&Cell> {
        self.headers
            .iter()
            .position(|h| h == header)
            .and_then(|i| self.values.get(i))
    }
}

static SPRINT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"name=([^,\]]*)").expect("valid sprint name regex"));
static EPIC_PROGRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<span id="value">\s*(.*?)\s*</span>"#).expect("valid progress regex")
});

fn issue_field<'a>(issue: &'a Value, key: &str) -> Option<&'a Value> {
    issue
        .get("fields")
        .and_then(|fields| fields.get(key))
        .filter(|value| !value.is_null())
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(text) => !text.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

/// Display text of a scalar or object value (`name`, `value`, `displayName`).
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Object(map) => ["displayName", "name", "value", "key"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

fn joined_names(value: &Value) -> Option<String> {
    let items = value.as_array()?;
    let names: Vec<String> = items.iter().filter_map(value_text).collect();
    Some(names.join(", "))
}

pub fn issue_key(issue: &Value) -> String {
    issue
        .get("key")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub fn issue_status(issue: &Value) -> Option<String> {
    issue_field(issue, "status").and_then(value_text)
}

pub fn issue_type(issue: &Value) -> Option<String> {
    issue_field(issue, "issuetype").and_then(value_text)
}

pub fn issue_title(issue: &Value) -> Option<String> {
    issue_field(issue, "summary").and_then(value_text)
}

pub fn issue_description(issue: &Value) -> String {
    issue_field(issue, "description")
        .map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default()
}

/// Raw numeric value of a story-point style custom field.
pub fn numeric_field(issue: &Value, key: &str) -> Option<f64> {
    match issue_field(issue, key)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn comment_list(issue: &Value) -> Option<&Vec<Value>> {
    issue_field(issue, "comment")
        .and_then(|comment| comment.get("comments"))
        .and_then(Value::as_array)
}

/// Sprint names from the tracker's `...[id=1,name=Sprint 1,...]` strings or sprint objects.
pub fn extract_sprints(value: &Value) -> String {
    let Some(items) = value.as_array() else {
        return String::new();
    };
    let names: Vec<String> = items
        .iter()
        .filter_map(|item| match item {
            Value::String(text) => SPRINT_NAME_RE
                .captures(text)
                .map(|caps| caps[1].trim().to_string()),
            Value::Object(map) => map.get("name").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .filter(|name| !name.is_empty())
        .collect();
    names.join(", ")
}

pub fn extract_epic_progress(html: &str) -> String {
    EPIC_PROGRESS_RE
        .captures(html)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| "Progress not found".to_string())
}

pub fn first_name(display_name: &str) -> String {
    display_name
        .split_whitespace()
        .next()
        .unwrap_or(display_name)
        .to_string()
}

/// Projects issue payloads through the field registry.
///
/// The clock is fixed per engine so bulk and single-field projections of
/// the same issue render identically.
pub struct FieldEngine<'a> {
    tracker: &'a dyn Tracker,
    now: DateTime<Utc>,
}

impl<'a> FieldEngine<'a> {
    pub fn new(tracker: &'a dyn Tracker) -> Self {
        Self::with_clock(tracker, Utc::now())
    }

    pub fn with_clock(tracker: &'a dyn Tracker, now: DateTime<Utc>) -> Self {
        Self { tracker, now }
    }

    /// Whether the issue carries data for `field`. Required fields always exist.
    pub fn exists(&self, issue: &Value, field: FieldId) -> bool {
        match field.category() {
            Category::Required => return true,
            _ if field == FieldId::Children => {
                return !issue_field(issue, "issuetype")
                    .and_then(|t| t.get("subtask"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false)
            }
            _ if field == FieldId::LatestComment || field == FieldId::Comments => {
                return comment_list(issue).is_some()
            }
            _ => {}
        }

        field
            .source_key(self.tracker.custom_fields())
            .and_then(|key| issue_field(issue, &key))
            .map(is_present)
            .unwrap_or(false)
    }

    /// Extract and post-process one field. Both projections go through here.
    pub async fn render_field(&self, issue: &Value, field: FieldId) -> Cell {
        match self.extract(issue, field).await {
            Ok(cell) => cell,
            Err(e) => {
                debug!("Failed to extract {}: {:#}", field.name(), e);
                Cell::Text(colorize(&format!("Error: {}", e), Tone::Negative))
            }
        }
    }

    async fn extract(&self, issue: &Value, field: FieldId) -> Result<Cell> {
        let ids = self.tracker.custom_fields();
        let raw = field
            .source_key(ids)
            .and_then(|key| issue_field(issue, &key).cloned());

        let cell = match field {
            FieldId::Key => {
                let key = issue_key(issue);
                Cell::Text(link_text(&key, &self.tracker.browse_url(&key)))
            }
            FieldId::Title => Cell::Text(
                issue_title(issue).unwrap_or_else(|| colorize("No Title", Tone::Negative)),
            ),
            FieldId::Type => Cell::Text(
                issue_type(issue).unwrap_or_else(|| colorize("Unknown", Tone::Negative)),
            ),
            FieldId::Assignee => Cell::Text(
                raw.as_ref()
                    .and_then(value_text)
                    .unwrap_or_else(|| colorize("Unassigned", Tone::Negative)),
            ),
            FieldId::Reporter | FieldId::Status => Cell::Text(
                raw.as_ref()
                    .and_then(value_text)
                    .unwrap_or_else(|| colorize("Unknown", Tone::Negative)),
            ),
            FieldId::Labels | FieldId::Components => {
                Cell::Text(raw.as_ref().and_then(joined_names).unwrap_or_default())
            }
            FieldId::Created => Cell::Text(
                raw.as_ref()
                    .and_then(Value::as_str)
                    .and_then(parse_timestamp)
                    .map(|dt| dt.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
            ),
            FieldId::Updated => Cell::Text(
                raw.as_ref()
                    .and_then(Value::as_str)
                    .and_then(parse_timestamp)
                    .map(|dt| relative_time(dt, self.now))
                    .unwrap_or_default(),
            ),
            FieldId::LatestComment => Cell::Text(self.latest_comment(issue)),
            FieldId::Children => Cell::Text(self.children(issue).await?),
            FieldId::Description => Cell::Text(issue_description(issue)),
            FieldId::Comments => Cell::Text(all_comments(issue)),
            FieldId::WorkType => Cell::Text(
                raw.as_ref()
                    .and_then(value_text)
                    .unwrap_or_else(|| colorize("Undefined", Tone::Negative)),
            ),
            FieldId::OriginalStoryPoints | FieldId::StoryPoints => {
                match field.source_key(ids).and_then(|key| numeric_field(issue, &key)) {
                    Some(points) => Cell::Number(points),
                    None => Cell::Text(colorize("Not Assigned", Tone::Negative)),
                }
            }
            FieldId::Sprints => Cell::Text(raw.as_ref().map(extract_sprints).unwrap_or_default()),
            FieldId::EpicLink | FieldId::ParentLink => Cell::Text(
                raw.as_ref()
                    .and_then(value_text)
                    .map(|key| link_text(&key, &self.tracker.browse_url(&key)))
                    .unwrap_or_default(),
            ),
            FieldId::EpicProgress => Cell::Text(extract_epic_progress(
                raw.as_ref().and_then(Value::as_str).unwrap_or_default(),
            )),
            FieldId::EpicEndDate => Cell::Text(
                raw.as_ref()
                    .and_then(Value::as_str)
                    .and_then(parse_date)
                    .map(|date| days_left(date, self.now.date_naive()))
                    .unwrap_or_default(),
            ),
            FieldId::Priority
            | FieldId::Resolution
            | FieldId::StatusSummary
            | FieldId::EpicStartDate => {
                Cell::Text(raw.as_ref().and_then(value_text).unwrap_or_default())
            }
        };
        Ok(cell)
    }

    fn latest_comment(&self, issue: &Value) -> String {
        let status = issue_status(issue).unwrap_or_default();
        let latest = comment_list(issue).and_then(|comments| {
            comments
                .iter()
                .filter_map(|comment| {
                    let created = comment
                        .get("created")
                        .and_then(Value::as_str)
                        .and_then(parse_timestamp)?;
                    Some((created, comment))
                })
                .max_by_key(|(created, _)| *created)
        });

        match latest {
            Some((created, comment)) => {
                let author = comment
                    .get("author")
                    .and_then(value_text)
                    .map(|name| first_name(&name))
                    .unwrap_or_else(|| "Someone".to_string());
                format!("{} commented {}", author, comment_age(created, self.now, &status))
            }
            None => colorize("No Comments", Tone::Negative),
        }
    }

    async fn children(&self, issue: &Value) -> Result<String> {
        let children = self
            .tracker
            .search_issues(&children_jql(&issue_key(issue)), MAX_CHILDREN)
            .await?;
        if children.is_empty() {
            return Ok(colorize("No Children", Tone::Negative));
        }

        let rendered: Vec<String> = children
            .iter()
            .map(|child| {
                let child_key = issue_key(child);
                let status = issue_status(child).unwrap_or_else(|| "Unknown".to_string());
                color_map(
                    &link_text(&child_key, &self.tracker.browse_url(&child_key)),
                    &status,
                )
            })
            .collect();
        Ok(rendered.join(", "))
    }

    /// Bulk projection. `None` selects the default fields.
    ///
    /// Absent non-required fields are left out entirely.
    pub async fn get_all_available_data(
        &self,
        issue: &Value,
        fields: Option<&[FieldId]>,
    ) -> IssueRow {
        let selection = match fields {
            Some(fields) if !fields.is_empty() => fields.to_vec(),
            _ => FieldId::default_selection(),
        };

        let mut row = IssueRow {
            headers: Vec::with_capacity(selection.len()),
            values: Vec::with_capacity(selection.len()),
        };
        for field in selection {
            if !self.exists(issue, field) {
                continue;
            }
            row.headers.push(field.header().to_string());
            row.values.push(self.render_field(issue, field).await);
        }
        row
    }

    /// Single-field lookups by name, in the order asked for.
    pub async fn get_issue_fields(&self, issue: &Value, names: &[&str]) -> Vec<(String, Cell)> {
        let mut values = Vec::with_capacity(names.len());
        for name in names {
            let cell = match FieldId::from_name(name) {
                Some(field) => self.render_field(issue, field).await,
                None => Cell::Text(colorize(&format!("Unknown field: {}", name), Tone::Negative)),
            };
            values.push((name.to_string(), cell));
        }
        values
    }
}

fn all_comments(issue: &Value) -> String {
    comment_list(issue)
        .map(|comments| {
            comments
                .iter()
                .map(|comment| {
                    let author = comment
                        .get("author")
                        .and_then(value_text)
                        .unwrap_or_else(|| "Unknown".to_string());
                    let created = comment
                        .get("created")
                        .and_then(Value::as_str)
                        .and_then(parse_timestamp)
                        .map(|dt| dt.format("%Y-%m-%d").to_string())
                        .unwrap_or_default();
                    let body = comment.get("body").and_then(Value::as_str).unwrap_or_default();
                    format!("{} ({}): {}", author, created, body.trim())
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

pub const MAX_CHILDREN: u32 = 1000;

/// Issues whose epic link, parent link or parent is `key`.
pub fn children_jql(key: &str) -> String {
    format!(
        "\"Epic Link\" = \"{0}\" OR \"Parent Link\" = \"{0}\" OR parent = \"{0}\"",
        key
    )
}

/// Resolve `--show` names to fields. Names the registry does not know are
/// returned separately, in the order given.
pub fn resolve_fields(names: &[String]) -> (Vec<FieldId>, Vec<String>) {
    let mut fields = Vec::with_capacity(names.len());
    let mut unknown = Vec::new();
    for name in names {
        match FieldId::from_name(name) {
            Some(field) => fields.push(field),
            None => unknown.push(name.clone()),
        }
    }
    (fields, unknown)
}
