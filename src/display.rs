use anyhow::Result;

use crate::fields::IssueRow;
use crate::formatter::{
    colorize, epic_summary, filter_columns, format_to_csv, format_to_json,
    mark_story_point_changes, owner_summary, render_table, render_vertical_table, status_summary,
    with_index, OutputFormat, Row, TableLook, Tone,
};

fn render_rows(
    rows: &[Row],
    headers: &[String],
    format: OutputFormat,
    look: TableLook,
) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(render_table(rows, headers, look)),
        OutputFormat::Json => format_to_json(rows, headers),
        OutputFormat::Csv => Ok(format_to_csv(rows, headers)),
    }
}

/// One issue as a two-column table, or a one-element JSON/CSV record.
pub fn render_issue(
    row: &IssueRow,
    format: OutputFormat,
    show: Option<&[String]>,
) -> Result<String> {
    let (rows, headers) = filter_columns(&[row.values.clone()], &row.headers, show);
    match format {
        OutputFormat::Table => Ok(rows
            .first()
            .map(|values| render_vertical_table(values, &headers))
            .unwrap_or_default()),
        _ => render_rows(&rows, &headers, format, TableLook::Grid),
    }
}

/// Every sprint issue, sorted by key.
///
/// Tables get an index column and flag story points that changed during the sprint.
pub fn render_sprint_issue(
    rows: &[Row],
    headers: &[String],
    format: OutputFormat,
    show: Option<&[String]>,
) -> Result<String> {
    let (mut rows, headers) = filter_columns(rows, headers, show);

    if format != OutputFormat::Table {
        return render_rows(&rows, &headers, format, TableLook::Fancy);
    }

    mark_story_point_changes(&mut rows, &headers);
    rows.sort_by_key(|row| row.first().map(|cell| cell.plain()).unwrap_or_default());
    let (rows, headers) = with_index(rows, headers);
    Ok(render_table(&rows, &headers, TableLook::Fancy))
}

pub fn render_sprint_status(
    rows: &[Row],
    headers: &[String],
    format: OutputFormat,
    show: Option<&[String]>,
) -> Result<String> {
    let (summary, summary_headers) = status_summary(rows, headers);
    let (summary, summary_headers) = filter_columns(&summary, &summary_headers, show);
    render_rows(&summary, &summary_headers, format, TableLook::Grid)
}

pub fn render_sprint_owner(
    rows: &[Row],
    headers: &[String],
    format: OutputFormat,
    show: Option<&[String]>,
) -> Result<String> {
    let (summary, summary_headers) = owner_summary(rows, headers);
    let (summary, summary_headers) = filter_columns(&summary, &summary_headers, show);
    render_rows(&summary, &summary_headers, format, TableLook::Grid)
}

pub fn render_sprint_epic(
    rows: &[Row],
    headers: &[String],
    format: OutputFormat,
    show: Option<&[String]>,
) -> Result<String> {
    let (summary, summary_headers) = epic_summary(rows, headers);
    let (summary, summary_headers) = filter_columns(&summary, &summary_headers, show);
    render_rows(&summary, &summary_headers, format, TableLook::Grid)
}

pub fn render_issue_summary(issue_key: &str, summary: &str) -> String {
    let rule = "=".repeat(80);
    format!(
        "{}\n{}\n{}\n{}",
        colorize(
            &format!("\n📊 AI-Powered Issue Summary for {}", issue_key),
            Tone::Header
        ),
        rule,
        summary,
        rule
    )
}
