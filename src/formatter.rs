use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use console::Style;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use tabled::builder::Builder;
use tabled::settings::object::Columns;
use tabled::settings::{Modify, Style as TableStyle, Width};

pub const STATUS_HEADER: &str = "Status";
pub const ASSIGNEE_HEADER: &str = "Assignee";
pub const INITIAL_POINTS_HEADER: &str = "Initial Story Points";
pub const ACTUAL_POINTS_HEADER: &str = "Actual Story Points";
pub const EPIC_LINK_HEADER: &str = "Epic Link";

/// `--show` value meaning "no column filter".
pub const PREDEFINED_SELECTION: &str = "<pre-defined>";

static ANSI_ESCAPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("valid ansi escape regex")
});
static ANSI_HYPERLINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1B\]8;;.*?\x1B\\(.*?)\x1B\]8;;\x1B\\").expect("valid hyperlink regex")
});

/// Semantic color of a piece of terminal text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Positive,
    Negative,
    Neutral,
    Header,
    Code,
    Info,
}

impl Tone {
    fn style(self) -> Style {
        let style = Style::new().force_styling(true);
        match self {
            Tone::Positive => style.green(),
            Tone::Negative => style.red(),
            Tone::Neutral => style.yellow(),
            Tone::Header => style.magenta(),
            Tone::Code => style.cyan(),
            Tone::Info => style.blue(),
        }
    }
}

pub fn colorize(text: &str, tone: Tone) -> String {
    tone.style().apply_to(text).to_string()
}

/// Color `text` by the workflow status `status`.
pub fn color_map(text: &str, status: &str) -> String {
    match status {
        "Undefined" | "New" | "Not Started" => colorize(text, Tone::Negative),
        "Closed" => colorize(text, Tone::Positive),
        "In Progress" => colorize(text, Tone::Neutral),
        "Review" => colorize(text, Tone::Info),
        _ => text.to_string(),
    }
}

/// OSC-8 terminal hyperlink around yellow text.
pub fn link_text(text: &str, url: &str) -> String {
    format!(
        "\x1b]8;;{}\x1b\\{}\x1b]8;;\x1b\\",
        url,
        colorize(text, Tone::Neutral)
    )
}

/// Remove color codes and unwrap hyperlinks to their visible text.
pub fn strip_ansi(text: &str) -> String {
    let unlinked = ANSI_HYPERLINK_RE.replace_all(text, "$1");
    ANSI_ESCAPE_RE.replace_all(&unlinked, "").into_owned()
}

/// One value of a rendered row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(value) => Some(*value),
            Cell::Text(_) => None,
        }
    }

    /// Plain text with escape sequences removed.
    pub fn plain(&self) -> String {
        match self {
            Cell::Text(text) => strip_ansi(text),
            Cell::Number(_) => self.to_string(),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(text) => f.write_str(text),
            Cell::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                write!(f, "{}", *value as i64)
            }
            Cell::Number(value) => write!(f, "{}", value),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Cell::Text(text) => serializer.serialize_str(text),
            Cell::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                serializer.serialize_i64(*value as i64)
            }
            Cell::Number(value) => serializer.serialize_f64(*value),
        }
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

pub type Row = Vec<Cell>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "csv" => Some(OutputFormat::Csv),
            _ => None,
        }
    }
}

/// Split a `--show` value into trimmed column names.
pub fn parse_selection(show: Option<&str>) -> Option<Vec<String>> {
    let show = show?.trim();
    if show.is_empty() || show == PREDEFINED_SELECTION {
        return None;
    }
    let names: Vec<String> = show
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    if names.is_empty() {
        None
    } else {
        Some(names)
    }
}

/// Keep only the selected headers, in header order, with every row projected alike.
pub fn filter_columns(
    rows: &[Row],
    headers: &[String],
    selection: Option<&[String]>,
) -> (Vec<Row>, Vec<String>) {
    let selection = match selection {
        Some(names)
            if !names.is_empty()
                && !names.iter().any(|name| name.as_str() == PREDEFINED_SELECTION) =>
        {
            names
        }
        _ => return (rows.to_vec(), headers.to_vec()),
    };

    let indices: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, header)| selection.iter().any(|name| name == *header))
        .map(|(index, _)| index)
        .collect();

    let filtered_headers = indices.iter().map(|&i| headers[i].clone()).collect();
    let filtered_rows = rows
        .iter()
        .map(|row| {
            indices
                .iter()
                .filter_map(|&i| row.get(i).cloned())
                .collect()
        })
        .collect();

    (filtered_rows, filtered_headers)
}

fn header_index(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|header| header == name)
}

/// Flag rows whose actual story points drifted from the initial estimate.
pub fn mark_story_point_changes(rows: &mut [Row], headers: &[String]) {
    let (Some(initial), Some(actual)) = (
        header_index(headers, INITIAL_POINTS_HEADER),
        header_index(headers, ACTUAL_POINTS_HEADER),
    ) else {
        return;
    };

    for row in rows.iter_mut() {
        let (Some(before), Some(after)) = (row.get(initial), row.get(actual)) else {
            continue;
        };
        if before.plain() != after.plain() {
            let marked = colorize(&format!("{} (Change TBD)", after.plain()), Tone::Negative);
            row[actual] = Cell::Text(marked);
        }
    }
}

/// JSON array of objects keyed by header, with escape sequences removed.
pub fn format_to_json(rows: &[Row], headers: &[String]) -> Result<String> {
    let objects: Vec<serde_json::Map<String, serde_json::Value>> = rows
        .iter()
        .map(|row| {
            headers
                .iter()
                .zip(row.iter())
                .map(|(header, cell)| {
                    let value = match cell {
                        Cell::Text(text) => serde_json::Value::String(strip_ansi(text)),
                        Cell::Number(_) => serde_json::to_value(cell).unwrap_or_default(),
                    };
                    (header.clone(), value)
                })
                .collect()
        })
        .collect();

    to_json_string(&objects)
}

/// Pretty JSON with four-space indentation.
pub fn to_json_string<T: Serialize>(value: &T) -> Result<String> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value
        .serialize(&mut serializer)
        .context("Failed to serialize JSON output")?;
    String::from_utf8(buffer).context("JSON output is not valid UTF-8")
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// CSV with a header row. Escape sequences are removed like in JSON output.
pub fn format_to_csv(rows: &[Row], headers: &[String]) -> String {
    let mut output = String::new();
    let header_line: Vec<String> = headers.iter().map(|h| csv_field(&strip_ansi(h))).collect();
    output.push_str(&header_line.join(","));
    output.push_str("\r\n");

    for row in rows {
        let line: Vec<String> = row.iter().map(|cell| csv_field(&cell.plain())).collect();
        output.push_str(&line.join(","));
        output.push_str("\r\n");
    }
    output
}

#[derive(Debug, Default, Clone, Copy)]
struct StatusTally {
    with_points: usize,
    without_points: usize,
    point_sum: f64,
}

const SUMMARY_STATUSES: [&str; 4] = ["Closed", "In Progress", "Review", "Not Started"];

/// Issue counts and point totals per status.
///
/// Unknown statuses count as "Not Started". Issues without numeric points are
/// counted separately and shown as `N(M)`.
pub fn status_summary(rows: &[Row], headers: &[String]) -> (Vec<Row>, Vec<String>) {
    let summary_headers = vec![
        STATUS_HEADER.to_string(),
        "Issue Count".to_string(),
        "Sprint Point Total".to_string(),
    ];

    let mut tallies = [StatusTally::default(); 4];
    let status_at = header_index(headers, STATUS_HEADER);
    let points_at = header_index(headers, ACTUAL_POINTS_HEADER);

    for row in rows {
        let status = status_at
            .and_then(|i| row.get(i))
            .map(Cell::plain)
            .unwrap_or_default();
        let slot = SUMMARY_STATUSES
            .iter()
            .position(|known| *known == status)
            .unwrap_or(SUMMARY_STATUSES.len() - 1);

        match points_at.and_then(|i| row.get(i)).and_then(Cell::as_number) {
            Some(points) => {
                tallies[slot].with_points += 1;
                tallies[slot].point_sum += points;
            }
            None => tallies[slot].without_points += 1,
        }
    }

    let summary_rows = SUMMARY_STATUSES
        .iter()
        .zip(tallies.iter())
        .map(|(status, tally)| {
            let count = if tally.without_points > 0 {
                Cell::Text(format!("{}({})", tally.with_points, tally.without_points))
            } else {
                Cell::Number(tally.with_points as f64)
            };
            vec![Cell::text(*status), count, Cell::Number(tally.point_sum)]
        })
        .collect();

    (summary_rows, summary_headers)
}

const OWNER_STATUSES: [&str; 4] = ["Closed", "Review", "In Progress", "New"];

#[derive(Debug, Default, Clone, Copy)]
struct OwnerTally {
    count: usize,
    points: f64,
}

/// Per-assignee story counts and points by status, plus a total.
pub fn owner_summary(rows: &[Row], headers: &[String]) -> (Vec<Row>, Vec<String>) {
    let summary_headers = [ASSIGNEE_HEADER, "Completed", "Review", "In Progress", "New", "Total"]
        .iter()
        .map(|h| h.to_string())
        .collect();

    let assignee_at = header_index(headers, ASSIGNEE_HEADER);
    let status_at = header_index(headers, STATUS_HEADER);
    let points_at = header_index(headers, ACTUAL_POINTS_HEADER);

    let mut owners: Vec<(String, [OwnerTally; 4], OwnerTally)> = Vec::new();
    for row in rows {
        let assignee = assignee_at
            .and_then(|i| row.get(i))
            .map(Cell::plain)
            .unwrap_or_default();
        let status = status_at
            .and_then(|i| row.get(i))
            .map(Cell::plain)
            .unwrap_or_default();
        let points = points_at
            .and_then(|i| row.get(i))
            .and_then(Cell::as_number)
            .unwrap_or(0.0);

        let position = match owners.iter().position(|(name, _, _)| *name == assignee) {
            Some(position) => position,
            None => {
                owners.push((assignee, [OwnerTally::default(); 4], OwnerTally::default()));
                owners.len() - 1
            }
        };
        let (_, by_status, total) = &mut owners[position];
        if let Some(slot) = OWNER_STATUSES.iter().position(|known| *known == status) {
            by_status[slot].count += 1;
            by_status[slot].points += points;
        }
        total.count += 1;
        total.points += points;
    }

    let summary_rows = owners
        .into_iter()
        .map(|(assignee, by_status, total)| {
            let mut row = vec![Cell::Text(colorize(&assignee, Tone::Header))];
            for (status, tally) in OWNER_STATUSES.iter().zip(by_status.iter()) {
                let tone = match *status {
                    "Closed" => Tone::Positive,
                    "In Progress" => Tone::Neutral,
                    "Review" => Tone::Info,
                    _ => Tone::Negative,
                };
                let cell = if tally.count > 0 {
                    colorize(
                        &format!("{} Stories, {} Points", tally.count, tally.points as i64),
                        tone,
                    )
                } else {
                    colorize("-", Tone::Negative)
                };
                row.push(Cell::Text(cell));
            }
            row.push(Cell::Text(colorize(
                &format!("{} Stories, {} Points", total.count, total.points as i64),
                Tone::Header,
            )));
            row
        })
        .collect();

    (summary_rows, summary_headers)
}

/// Issue and point rollup per epic; issues without an epic are grouped as "No Epic".
pub fn epic_summary(rows: &[Row], headers: &[String]) -> (Vec<Row>, Vec<String>) {
    let summary_headers = ["Epic", "Issues", "Closed", "Story Points", "Completed Points"]
        .iter()
        .map(|h| h.to_string())
        .collect();

    let epic_at = header_index(headers, EPIC_LINK_HEADER);
    let status_at = header_index(headers, STATUS_HEADER);
    let points_at = header_index(headers, ACTUAL_POINTS_HEADER);

    // (grouping key, display cell, issues, closed, points, completed points)
    let mut epics: Vec<(String, Cell, usize, usize, f64, f64)> = Vec::new();
    for row in rows {
        let epic_cell = epic_at
            .and_then(|i| row.get(i))
            .filter(|cell| !cell.plain().trim().is_empty())
            .cloned()
            .unwrap_or_else(|| Cell::Text(colorize("No Epic", Tone::Negative)));
        let key = epic_cell.plain();
        let closed = status_at
            .and_then(|i| row.get(i))
            .map(|cell| cell.plain() == "Closed")
            .unwrap_or(false);
        let points = points_at
            .and_then(|i| row.get(i))
            .and_then(Cell::as_number)
            .unwrap_or(0.0);

        let position = match epics.iter().position(|entry| entry.0 == key) {
            Some(position) => position,
            None => {
                epics.push((key, epic_cell, 0, 0, 0.0, 0.0));
                epics.len() - 1
            }
        };
        let entry = &mut epics[position];
        entry.2 += 1;
        entry.4 += points;
        if closed {
            entry.3 += 1;
            entry.5 += points;
        }
    }

    let summary_rows = epics
        .into_iter()
        .map(|(_, cell, issues, closed, points, completed)| {
            vec![
                cell,
                Cell::Number(issues as f64),
                Cell::Number(closed as f64),
                Cell::Number(points),
                Cell::Number(completed),
            ]
        })
        .collect();

    (summary_rows, summary_headers)
}

/// Table borders for the different views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableLook {
    Grid,
    Fancy,
}

fn colored_headers(headers: &[String]) -> Vec<String> {
    headers.iter().map(|h| colorize(h, Tone::Header)).collect()
}

/// Status-colored cell text, the way every table cell is shown.
pub fn colored_cell(cell: &Cell) -> String {
    let text = cell.to_string();
    color_map(&text, &cell.plain())
}

/// Horizontal table with a colored header row.
pub fn render_table(rows: &[Row], headers: &[String], look: TableLook) -> String {
    let mut builder = Builder::default();
    builder.push_record(colored_headers(headers));
    for row in rows {
        builder.push_record(row.iter().map(colored_cell));
    }
    finish_table(builder, look)
}

/// Two-column (header, value) table for a single record.
pub fn render_vertical_table(row: &[Cell], headers: &[String]) -> String {
    let mut builder = Builder::default();
    for (header, cell) in colored_headers(headers).into_iter().zip(row.iter()) {
        builder.push_record([header, colored_cell(cell)]);
    }
    finish_table(builder, TableLook::Grid)
}

fn finish_table(builder: Builder, look: TableLook) -> String {
    let mut table = builder.build();
    match look {
        TableLook::Grid => table.with(TableStyle::ascii()),
        TableLook::Fancy => table.with(TableStyle::modern()),
    };
    table.to_string()
}

/// Prefix rows with a running index column.
pub fn with_index(rows: Vec<Row>, headers: Vec<String>) -> (Vec<Row>, Vec<String>) {
    let mut indexed_headers = Vec::with_capacity(headers.len() + 1);
    indexed_headers.push(String::new());
    indexed_headers.extend(headers);

    let indexed_rows = rows
        .into_iter()
        .enumerate()
        .map(|(index, row)| {
            let mut indexed = Vec::with_capacity(row.len() + 1);
            indexed.push(Cell::Number(index as f64));
            indexed.extend(row);
            indexed
        })
        .collect();

    (indexed_rows, indexed_headers)
}

const RECENT_DAYS: i64 = 7;
const STALE_DAYS: i64 = 10;

/// Parse the tracker's timestamp formats.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(value).map(|dt| dt.date_naive()))
}

/// "Today" / "N days ago", green up to a week, yellow up to ten days, red after.
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let days = (now - then).num_days().max(0);
    let text = if days == 0 {
        "Today".to_string()
    } else if days == 1 {
        "1 day ago".to_string()
    } else {
        format!("{} days ago", days)
    };

    let tone = if days <= RECENT_DAYS {
        Tone::Positive
    } else if days <= STALE_DAYS {
        Tone::Neutral
    } else {
        Tone::Negative
    };
    colorize(&text, tone)
}

/// Remaining days until a target date.
pub fn days_left(target: NaiveDate, today: NaiveDate) -> String {
    let days = (target - today).num_days();
    if days < 0 {
        colorize("Target Date Passed", Tone::Negative)
    } else if days <= RECENT_DAYS {
        colorize(&format!("{} days left", days), Tone::Neutral)
    } else {
        colorize(&format!("{} days left", days), Tone::Positive)
    }
}

/// How long ago a comment was made, red when it is stale on an open issue.
pub fn comment_age(then: DateTime<Utc>, now: DateTime<Utc>, status: &str) -> String {
    let delta = now - then;
    let days = delta.num_days();
    if days > 0 {
        let text = format!("{} days ago", days);
        if days < STALE_DAYS || status == "Closed" {
            text
        } else {
            colorize(&text, Tone::Negative)
        }
    } else {
        match delta.num_hours() {
            hours if hours > 0 => format!("{} hours ago", hours),
            _ => "Just now".to_string(),
        }
    }
}

static SECTION_HEADER_RES: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(r"\+\*([^*]+):\*\+").expect("valid header regex"),
        Regex::new(r"\*\+([^+]+):\+\*").expect("valid header regex"),
    ]
});
static CODE_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{code(?::[^}]*)?\}(.*?)\{code\}").expect("valid code regex"));
static BOLD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*([^*\n+][^*\n]*)\*").expect("valid bold regex"));
static ITALIC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b_([^_\n]+)_\b").expect("valid italic regex"));
static INLINE_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([^}]+)\}\}").expect("valid inline code regex"));
static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^|\]]+)\|([^\]]+)\]").expect("valid link regex"));
static LIST_ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[•*#-]|\d+\.)\s+").expect("valid list regex"));
static STRIKE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)(^|\s)-(\w+)-").expect("valid strikethrough regex"));
static EXTRA_NEWLINES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{4,}").expect("valid newline regex"));
static STASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x01(\d+)\x01").expect("valid stash regex"));

/// Rendered fragments kept out of the text while the inline passes run.
#[derive(Default)]
struct Stash(Vec<String>);

impl Stash {
    fn hold(&mut self, rendered: String) -> String {
        self.0.push(rendered);
        format!("\x01{}\x01", self.0.len() - 1)
    }

    fn restore(&self, text: &str) -> String {
        STASH_RE
            .replace_all(text, |caps: &regex::Captures| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| self.0.get(index))
                    .cloned()
                    .unwrap_or_default()
            })
            .into_owned()
    }
}

/// Render Jira wiki markup with terminal colors, without an LLM.
pub fn convert_jira_markup_for_display(text: &str) -> String {
    let mut text = text.trim().to_string();
    if text.is_empty() {
        return text;
    }

    // Code and links are rendered first; their escapes would confuse the inline patterns.
    let mut stash = Stash::default();
    text = CODE_BLOCK_RE
        .replace_all(&text, |caps: &regex::Captures| {
            stash.hold(format!(
                "\n{}\n{}\n{}\n",
                colorize("┌─ CODE BLOCK", Tone::Header),
                colorize(caps[1].trim(), Tone::Code),
                colorize("└─", Tone::Header)
            ))
        })
        .into_owned();
    text = INLINE_CODE_RE
        .replace_all(&text, |caps: &regex::Captures| {
            stash.hold(colorize(&format!("`{}`", &caps[1]), Tone::Code))
        })
        .into_owned();
    text = LINK_RE
        .replace_all(&text, |caps: &regex::Captures| {
            stash.hold(link_text(&caps[1], &caps[2]))
        })
        .into_owned();

    for re in SECTION_HEADER_RES.iter() {
        text = re
            .replace_all(&text, |caps: &regex::Captures| {
                format!(
                    "\n\n{}\n",
                    colorize(&format!("{}:", caps[1].to_uppercase()), Tone::Header)
                )
            })
            .into_owned();
    }

    text = BOLD_RE
        .replace_all(&text, |caps: &regex::Captures| colorize(&caps[1], Tone::Neutral))
        .into_owned();
    text = ITALIC_RE
        .replace_all(&text, |caps: &regex::Captures| colorize(&caps[1], Tone::Neutral))
        .into_owned();

    text = STRIKE_RE
        .replace_all(&text, |caps: &regex::Captures| {
            format!("{}{}", &caps[1], colorize(&caps[2], Tone::Negative))
        })
        .into_owned();

    text = text
        .split('\n')
        .map(|line| {
            if LIST_ITEM_RE.is_match(line) {
                format!("  {}", line.trim())
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    text = stash.restore(&text);

    text = EXTRA_NEWLINES_RE.replace_all(&text, "\n\n\n").into_owned();

    text.split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn terminal_width() -> usize {
    let (_, columns) = console::Term::stdout().size();
    if columns == 0 {
        120
    } else {
        columns as usize
    }
}

/// Original and standardized descriptions side by side.
pub fn format_description_comparison(
    original: &str,
    standardized: &str,
    format: OutputFormat,
) -> Result<String> {
    let original = match original.trim() {
        "" => "No description provided".to_string(),
        text => text.replace("\r\n", "\n").replace('\r', "\n"),
    };
    let standardized = match standardized.trim() {
        "" => "No standardized description generated".to_string(),
        text => text.to_string(),
    };
    let preview = convert_jira_markup_for_display(&standardized);

    match format {
        OutputFormat::Json => {
            let payload = serde_json::json!({
                "original_description": original,
                "standardized_description_raw": standardized,
                "standardized_description_preview": strip_ansi(&preview),
            });
            to_json_string(&payload)
        }
        OutputFormat::Table => {
            let available = terminal_width().saturating_sub(20).max(80);
            let column_width = (available / 2).max(35);

            let mut builder = Builder::default();
            builder.push_record([
                colorize("ORIGINAL DESCRIPTION", Tone::Negative),
                colorize("STANDARDIZED DESCRIPTION (JIRA PREVIEW)", Tone::Positive),
            ]);
            builder.push_record([original, preview]);

            let mut table = builder.build();
            table
                .with(TableStyle::modern())
                .with(Modify::new(Columns::new(..)).with(Width::wrap(column_width)));
            Ok(table.to_string())
        }
        OutputFormat::Csv => Ok(format!(
            "\n{}\n{}\n\n{}\n{}\n",
            colorize("ORIGINAL DESCRIPTION:", Tone::Negative),
            original,
            colorize("STANDARDIZED DESCRIPTION (JIRA PREVIEW):", Tone::Positive),
            preview
        )),
    }
}
