use std::fmt::Write;
use std::io;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::{CheckInRequest, CheckInResponse, SafetyStatus, Timestamp, WireTimestamp};
use crate::status::{self, Classification, InvalidTimestamp, RowError, StatusRow, UserStatusView};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatusSummary {
    pub invalid_count: usize,
    pub unsafe_count: usize,
    pub overdue_count: usize,
    pub awaiting_count: usize,
    pub no_data_count: usize,
    pub safe_count: usize,
}

pub fn summarize(rows: &[StatusRow]) -> StatusSummary {
    let mut summary = StatusSummary::default();
    for row in rows {
        let counter = match row.classification() {
            None => &mut summary.invalid_count,
            Some(Classification::Unsafe) => &mut summary.unsafe_count,
            Some(Classification::Overdue) => &mut summary.overdue_count,
            Some(Classification::AwaitingResponse) => &mut summary.awaiting_count,
            Some(Classification::NoData) => &mut summary.no_data_count,
            Some(Classification::Safe) => &mut summary.safe_count,
        };
        *counter += 1;
    }
    summary
}

fn describe_row(row: &StatusRow, now: Timestamp) -> String {
    match &row.outcome {
        Ok(view) => view.describe(now),
        Err(err) => err.to_string(),
    }
}

/// One line per user, in the order given.
pub fn render_table(rows: &[StatusRow], now: Timestamp) -> String {
    let mut output = String::new();
    if rows.is_empty() {
        let _ = writeln!(output, "No users to show.");
        return output;
    }
    for row in rows {
        let _ = writeln!(
            output,
            "{:<28} {:<20} {}",
            row.full_name,
            row.uid,
            describe_row(row, now)
        );
    }
    output
}

pub fn build_report(
    scope: &str,
    now: Timestamp,
    overdue_window: Duration,
    rows: &[StatusRow],
) -> String {
    let summary = summarize(rows);
    let mut output = String::new();

    let _ = writeln!(output, "# Safety Check-in Status Report");
    let _ = writeln!(
        output,
        "Generated for {} at {} (overdue after {})",
        scope,
        now.format("%Y-%m-%d %H:%M UTC"),
        status::format_elapsed(overdue_window)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- unsafe: {}", summary.unsafe_count);
    let _ = writeln!(output, "- overdue: {}", summary.overdue_count);
    let _ = writeln!(output, "- awaiting response: {}", summary.awaiting_count);
    let _ = writeln!(output, "- safe: {}", summary.safe_count);
    let _ = writeln!(output, "- no data: {}", summary.no_data_count);
    if summary.invalid_count > 0 {
        let _ = writeln!(output, "- unreadable: {}", summary.invalid_count);
    }

    let sections: [(&str, fn(Option<Classification>) -> bool, &str); 4] = [
        (
            "Needs Attention",
            |class| class.map_or(true, Classification::needs_attention),
            "Nobody needs attention.",
        ),
        (
            "Awaiting Response",
            |class| class == Some(Classification::AwaitingResponse),
            "No open requests.",
        ),
        (
            "Safe",
            |class| class == Some(Classification::Safe),
            "Nobody has answered safe yet.",
        ),
        (
            "No Data",
            |class| class == Some(Classification::NoData),
            "Everyone has been asked at least once.",
        ),
    ];

    for (title, belongs, empty) in sections {
        let _ = writeln!(output);
        let _ = writeln!(output, "## {title}");
        let mut section = rows.iter().filter(|row| belongs(row.classification())).peekable();
        if section.peek().is_none() {
            let _ = writeln!(output, "{empty}");
        }
        for row in section {
            let _ = writeln!(
                output,
                "- {} ({}): {}",
                row.full_name,
                row.uid,
                describe_row(row, now)
            );
        }
    }

    output
}

#[derive(Serialize)]
struct ExportRow<'a> {
    uid: &'a str,
    full_name: &'a str,
    classification: &'a str,
    last_request_at: Option<String>,
    last_response_at: Option<String>,
    comment: Option<&'a str>,
    error: Option<String>,
}

pub fn write_csv<W: io::Write>(rows: &[StatusRow], writer: W) -> AppResult<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for row in rows {
        let record = match &row.outcome {
            Ok(view) => ExportRow {
                uid: &row.uid,
                full_name: &row.full_name,
                classification: view.classification.label(),
                last_request_at: view.last_request_at.map(|at| at.to_rfc3339()),
                last_response_at: view.last_response_at.map(|at| at.to_rfc3339()),
                comment: view.comment.as_deref(),
                error: None,
            },
            Err(err) => ExportRow {
                uid: &row.uid,
                full_name: &row.full_name,
                classification: "invalid",
                last_request_at: None,
                last_response_at: None,
                comment: None,
                error: Some(err.to_string()),
            },
        };
        writer.serialize(record).map_err(csv_error)?;
    }
    writer.flush()?;
    Ok(())
}

/// Row of an offline status sheet. Empty timestamps mean "never".
#[derive(Debug, Deserialize)]
struct SheetRow {
    uid: String,
    full_name: String,
    #[serde(default)]
    request_at: String,
    #[serde(default)]
    response_at: String,
    #[serde(default)]
    safety_status: String,
    #[serde(default)]
    comment: String,
}

impl SheetRow {
    fn evaluate(
        &self,
        line: usize,
        now: Timestamp,
        overdue_window: Duration,
    ) -> Result<UserStatusView, RowError> {
        let request = match sheet_timestamp(&self.request_at) {
            None => None,
            Some(Ok(created_at)) => Some(CheckInRequest {
                id: format!("line-{line}"),
                user_id: self.uid.clone(),
                created_at,
            }),
            Some(Err(err)) => return Err(err.into()),
        };

        let response = match sheet_timestamp(&self.response_at) {
            None => None,
            Some(Err(err)) => return Err(err.into()),
            Some(Ok(responded_at)) => {
                let status: SafetyStatus = self
                    .safety_status
                    .parse()
                    .map_err(|err| RowError::Unreadable(format!("line {line}: {err}")))?;
                Some(CheckInResponse::new(
                    format!("line-{line}"),
                    self.uid.clone(),
                    status,
                    Some(self.comment.clone()),
                    responded_at,
                ))
            }
        };

        Ok(status::evaluate(
            request.as_ref(),
            response.as_ref(),
            now,
            overdue_window,
        ))
    }
}

fn sheet_timestamp(value: &str) -> Option<Result<Timestamp, InvalidTimestamp>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let raw = match value.parse::<i64>() {
        Ok(ms) => WireTimestamp::Millis(ms),
        Err(_) => WireTimestamp::Text(value.to_string()),
    };
    Some(status::parse_timestamp(Some(&raw)))
}

/// Evaluate a sheet with columns `uid,full_name,request_at,response_at,safety_status,comment`.
/// A bad timestamp or an unknown safety status marks only its own row.
pub fn read_csv<R: io::Read>(
    reader: R,
    now: Timestamp,
    overdue_window: Duration,
) -> AppResult<Vec<StatusRow>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut rows = Vec::new();

    for (index, result) in reader.deserialize::<SheetRow>().enumerate() {
        let line = index + 2;
        let sheet = result.map_err(csv_error)?;
        let outcome = sheet.evaluate(line, now, overdue_window);
        rows.push(StatusRow {
            uid: sheet.uid,
            full_name: sheet.full_name,
            outcome,
        });
    }

    status::sort_by_attention(&mut rows);
    Ok(rows)
}

fn csv_error(err: csv::Error) -> AppError {
    if err.is_io_error() {
        match err.into_kind() {
            csv::ErrorKind::Io(io) => AppError::Io(io),
            other => AppError::Malformed(format!("csv: {other:?}")),
        }
    } else {
        AppError::Malformed(format!("csv: {err}"))
    }
}
