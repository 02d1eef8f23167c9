use std::fmt;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;

use crate::error::AppError;
use crate::models::{
    CheckInRequest, CheckInResponse, RawCheckInRequest, RawCheckInResponse, SafetyStatus,
    StatusEntry, StatusSnapshot, Timestamp, UnreadableEntry, WireTimestamp,
};

/// Unanswered requests older than this are overdue unless configured otherwise.
pub const DEFAULT_OVERDUE_WINDOW_MINUTES: i64 = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Classification {
    NoData,
    AwaitingResponse,
    Safe,
    Unsafe,
    Overdue,
}

impl Classification {
    pub fn label(self) -> &'static str {
        match self {
            Classification::NoData => "no data",
            Classification::AwaitingResponse => "awaiting response",
            Classification::Safe => "safe",
            Classification::Unsafe => "unsafe",
            Classification::Overdue => "overdue",
        }
    }

    pub fn needs_attention(self) -> bool {
        matches!(self, Classification::Unsafe | Classification::Overdue)
    }

    fn attention_rank(self) -> u8 {
        match self {
            Classification::Unsafe => 1,
            Classification::Overdue => 2,
            Classification::AwaitingResponse => 3,
            Classification::NoData => 4,
            Classification::Safe => 5,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Derived status of one user at one instant. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserStatusView {
    pub classification: Classification,
    pub last_request_at: Option<Timestamp>,
    pub last_response_at: Option<Timestamp>,
    pub comment: Option<String>,
}

impl UserStatusView {
    pub fn describe(&self, now: Timestamp) -> String {
        let asked = self
            .last_request_at
            .map(|at| format_elapsed(now - at))
            .unwrap_or_default();
        let answered = self
            .last_response_at
            .map(|at| format_elapsed(now - at))
            .unwrap_or_default();

        match self.classification {
            Classification::NoData => "no data".to_string(),
            Classification::AwaitingResponse => format!("awaiting response (asked {asked} ago)"),
            Classification::Overdue => format!("overdue (asked {asked} ago, no answer)"),
            Classification::Safe => format!("safe (answered {answered} ago)"),
            Classification::Unsafe => match &self.comment {
                Some(comment) => format!("unsafe (answered {answered} ago): {comment}"),
                None => format!("unsafe (answered {answered} ago)"),
            },
        }
    }
}

/// Classify a user from their latest request and latest response.
///
/// A response answers the request only when it is strictly newer; an equal
/// timestamp counts as stale so that ambiguity lands on awaiting/overdue
/// rather than on safe.
pub fn evaluate(
    last_request: Option<&CheckInRequest>,
    last_response: Option<&CheckInResponse>,
    now: Timestamp,
    overdue_window: Duration,
) -> UserStatusView {
    let current = last_response.filter(|response| {
        last_request.map_or(true, |request| response.responded_at > request.created_at)
    });

    let classification = match (current, last_request) {
        (Some(response), _) => match response.safety_status {
            SafetyStatus::Safe => Classification::Safe,
            SafetyStatus::Unsafe => Classification::Unsafe,
        },
        (None, Some(request)) => {
            if now.signed_duration_since(request.created_at) < overdue_window {
                Classification::AwaitingResponse
            } else {
                Classification::Overdue
            }
        }
        (None, None) => Classification::NoData,
    };

    let comment = match classification {
        Classification::Unsafe => current.and_then(|response| response.comment().map(str::to_string)),
        _ => None,
    };

    UserStatusView {
        classification,
        last_request_at: last_request.map(|request| request.created_at),
        last_response_at: last_response.map(|response| response.responded_at),
        comment,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid timestamp `{value}`")]
pub struct InvalidTimestamp {
    pub value: String,
}

impl From<InvalidTimestamp> for AppError {
    fn from(err: InvalidTimestamp) -> Self {
        AppError::InvalidTimestamp { value: err.value }
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]` as UTC, or epoch milliseconds.
pub fn parse_timestamp(raw: Option<&WireTimestamp>) -> Result<Timestamp, InvalidTimestamp> {
    let invalid = |value: String| InvalidTimestamp { value };

    match raw {
        None => Err(invalid("<missing>".to_string())),
        Some(WireTimestamp::Millis(ms)) => Utc
            .timestamp_millis_opt(*ms)
            .single()
            .ok_or_else(|| invalid(ms.to_string())),
        Some(WireTimestamp::Text(text)) => {
            let text = text.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Ok(parsed.with_timezone(&Utc));
            }
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .map(|naive| naive.and_utc())
                .ok_or_else(|| invalid(text.to_string()))
        }
        Some(other) => Err(invalid(other.to_string())),
    }
}

impl TryFrom<&RawCheckInRequest> for CheckInRequest {
    type Error = InvalidTimestamp;

    fn try_from(raw: &RawCheckInRequest) -> Result<Self, Self::Error> {
        Ok(CheckInRequest {
            id: raw.id.clone(),
            user_id: raw.user_id.clone(),
            created_at: parse_timestamp(raw.created_at.as_ref())?,
        })
    }
}

impl TryFrom<&RawCheckInResponse> for CheckInResponse {
    type Error = InvalidTimestamp;

    fn try_from(raw: &RawCheckInResponse) -> Result<Self, Self::Error> {
        Ok(CheckInResponse::new(
            raw.id.clone(),
            raw.user_id.clone(),
            raw.safety_status,
            raw.comment.clone(),
            parse_timestamp(raw.responded_at.as_ref())?,
        ))
    }
}

/// Parse a backend snapshot and classify it. Malformed timestamps are reported,
/// never coerced.
pub fn evaluate_snapshot(
    snapshot: &StatusSnapshot,
    now: Timestamp,
    overdue_window: Duration,
) -> Result<UserStatusView, InvalidTimestamp> {
    let request = snapshot
        .last_request
        .as_ref()
        .map(CheckInRequest::try_from)
        .transpose()?;
    let response = snapshot
        .last_response
        .as_ref()
        .map(CheckInResponse::try_from)
        .transpose()?;

    Ok(evaluate(request.as_ref(), response.as_ref(), now, overdue_window))
}

/// Why one row of a bulk view could not be classified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    #[error(transparent)]
    InvalidTimestamp(#[from] InvalidTimestamp),
    #[error("unreadable status record: {0}")]
    Unreadable(String),
}

/// One line of a bulk status view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    pub uid: String,
    pub full_name: String,
    pub outcome: Result<UserStatusView, RowError>,
}

impl StatusRow {
    pub fn classification(&self) -> Option<Classification> {
        self.outcome.as_ref().ok().map(|view| view.classification)
    }

    // Rows that could not be classified go first: they need a human look.
    fn attention_rank(&self) -> u8 {
        self.classification()
            .map_or(0, Classification::attention_rank)
    }
}

/// Evaluate every entry independently; one bad row does not affect the others.
pub fn evaluate_entries(
    entries: &[Result<StatusEntry, UnreadableEntry>],
    now: Timestamp,
    overdue_window: Duration,
) -> Vec<StatusRow> {
    let mut rows: Vec<StatusRow> = entries
        .iter()
        .map(|entry| match entry {
            Ok(entry) => StatusRow {
                uid: entry.uid.clone(),
                full_name: entry.full_name(),
                outcome: evaluate_snapshot(&entry.snapshot, now, overdue_window)
                    .map_err(RowError::from),
            },
            Err(unreadable) => StatusRow {
                uid: unreadable.uid.clone(),
                full_name: unreadable.full_name.clone(),
                outcome: Err(RowError::Unreadable(unreadable.reason.clone())),
            },
        })
        .collect();
    sort_by_attention(&mut rows);
    rows
}

pub fn sort_by_attention(rows: &mut [StatusRow]) {
    rows.sort_by(|a, b| {
        a.attention_rank()
            .cmp(&b.attention_rank())
            .then_with(|| a.full_name.to_lowercase().cmp(&b.full_name.to_lowercase()))
    });
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let minutes = elapsed.num_minutes();
    if minutes < 1 {
        return "just now".to_string();
    }
    let hours = elapsed.num_hours();
    let days = elapsed.num_days();

    if hours < 1 {
        format!("{minutes}m")
    } else if days < 1 {
        format!("{hours}h {}m", minutes % 60)
    } else {
        format!("{days}d {}h", hours % 24)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn window() -> Duration {
        Duration::hours(3)
    }

    fn request(secs: i64) -> CheckInRequest {
        CheckInRequest {
            id: "q1".to_string(),
            user_id: "u1".to_string(),
            created_at: at(secs),
        }
    }

    fn response(secs: i64, status: SafetyStatus, comment: Option<&str>) -> CheckInResponse {
        CheckInResponse::new("r1", "u1", status, comment.map(str::to_string), at(secs))
    }

    #[test]
    fn no_inputs_means_no_data() {
        let view = evaluate(None, None, at(5_000), window());
        assert_eq!(view.classification, Classification::NoData);
        assert_eq!(view.last_request_at, None);
        assert_eq!(view.last_response_at, None);
    }

    #[test]
    fn equal_timestamps_do_not_count_as_answered() {
        let req = request(1_000);
        let resp = response(1_000, SafetyStatus::Safe, None);

        let fresh = evaluate(Some(&req), Some(&resp), at(1_060), window());
        assert_eq!(fresh.classification, Classification::AwaitingResponse);

        let late = evaluate(Some(&req), Some(&resp), at(1_000 + 4 * 3_600), window());
        assert_eq!(late.classification, Classification::Overdue);
    }

    #[test]
    fn newer_safe_response_is_safe() {
        let view = evaluate(
            Some(&request(0)),
            Some(&response(10, SafetyStatus::Safe, None)),
            at(20),
            window(),
        );
        assert_eq!(view.classification, Classification::Safe);
        assert_eq!(view.comment, None);
        assert_eq!(view.last_response_at, Some(at(10)));
    }

    #[test]
    fn newer_unsafe_response_keeps_comment_verbatim() {
        let view = evaluate(
            Some(&request(0)),
            Some(&response(10, SafetyStatus::Unsafe, Some("stuck in traffic"))),
            at(20),
            window(),
        );
        assert_eq!(view.classification, Classification::Unsafe);
        assert_eq!(view.comment.as_deref(), Some("stuck in traffic"));
    }

    #[test]
    fn awaiting_turns_overdue_at_window_edge() {
        let req = request(0);
        let before = evaluate(Some(&req), None, at(2 * 3_600 + 59 * 60), window());
        assert_eq!(before.classification, Classification::AwaitingResponse);

        let exactly = evaluate(Some(&req), None, at(3 * 3_600), window());
        assert_eq!(exactly.classification, Classification::Overdue);

        let after = evaluate(Some(&req), None, at(3 * 3_600 + 60), window());
        assert_eq!(after.classification, Classification::Overdue);
    }

    #[test]
    fn stale_response_does_not_mask_overdue() {
        let view = evaluate(
            Some(&request(10)),
            Some(&response(0, SafetyStatus::Safe, None)),
            at(10 + 4 * 3_600),
            window(),
        );
        assert_eq!(view.classification, Classification::Overdue);
        assert_eq!(view.comment, None);
    }

    #[test]
    fn stale_unsafe_comment_is_not_carried() {
        let view = evaluate(
            Some(&request(10)),
            Some(&response(0, SafetyStatus::Unsafe, Some("old news"))),
            at(20),
            window(),
        );
        assert_eq!(view.classification, Classification::AwaitingResponse);
        assert_eq!(view.comment, None);
    }

    #[test]
    fn spontaneous_report_without_request_is_current() {
        let view = evaluate(
            None,
            Some(&response(10, SafetyStatus::Unsafe, Some("injured"))),
            at(20),
            window(),
        );
        assert_eq!(view.classification, Classification::Unsafe);
    }

    #[test]
    fn window_is_configurable() {
        let req = request(0);
        let view = evaluate(Some(&req), None, at(30 * 60), Duration::minutes(15));
        assert_eq!(view.classification, Classification::Overdue);
    }

    #[test]
    fn recomputation_is_stable() {
        let req = request(0);
        let resp = response(10, SafetyStatus::Unsafe, Some("flat tyre"));
        let first = evaluate(Some(&req), Some(&resp), at(100), window());
        let second = evaluate(Some(&req), Some(&resp), at(100), window());
        assert_eq!(first, second);
    }

    #[test]
    fn unparseable_timestamps_are_reported() {
        let snapshot: StatusSnapshot = serde_json::from_value(serde_json::json!({
            "lastRequest": {"createdAt": "not-a-date"},
        }))
        .unwrap();
        let err = evaluate_snapshot(&snapshot, at(0), window()).unwrap_err();
        assert_eq!(err.value, "not-a-date");

        let snapshot: StatusSnapshot = serde_json::from_value(serde_json::json!({
            "lastRequest": {"createdAt": "2026-03-01T08:00:00Z"},
            "lastResponse": {"safetyStatus": "Yes", "respondedAt": "yesterday"}
        }))
        .unwrap();
        let err: AppError = evaluate_snapshot(&snapshot, at(0), window()).unwrap_err().into();
        assert!(matches!(err, AppError::InvalidTimestamp { value } if value == "yesterday"));
    }

    #[test]
    fn missing_timestamp_is_invalid() {
        assert_eq!(
            parse_timestamp(None).unwrap_err().value,
            "<missing>".to_string()
        );
    }

    #[test]
    fn parses_supported_formats() {
        let expected = at(1_772_352_000);
        let rfc = WireTimestamp::Text("2026-03-01T08:00:00Z".to_string());
        let offset = WireTimestamp::Text("2026-03-01T10:00:00+02:00".to_string());
        let sql = WireTimestamp::Text("2026-03-01 08:00:00".to_string());
        let millis = WireTimestamp::Millis(1_772_352_000_000);
        for raw in [rfc, offset, sql, millis] {
            assert_eq!(parse_timestamp(Some(&raw)).unwrap(), expected, "{raw}");
        }
    }

    #[test]
    fn snapshot_round_through_wire_types() {
        let snapshot: StatusSnapshot = serde_json::from_value(serde_json::json!({
            "lastRequest": {"createdAt": "2026-03-01T08:00:00Z"},
            "lastResponse": {"safetyStatus": "No", "comment": "road closed", "respondedAt": "2026-03-01T08:30:00Z"}
        }))
        .unwrap();
        let now = at(1_772_352_000 + 3_600);
        let view = evaluate_snapshot(&snapshot, now, window()).unwrap();
        assert_eq!(view.classification, Classification::Unsafe);
        assert_eq!(view.describe(now), "unsafe (answered 30m ago): road closed");
    }

    fn decode_all(rows: serde_json::Value) -> Vec<Result<StatusEntry, UnreadableEntry>> {
        let rows: Vec<serde_json::Value> = serde_json::from_value(rows).unwrap();
        rows.iter().map(StatusEntry::decode).collect()
    }

    #[test]
    fn bulk_rows_sort_by_attention_and_isolate_errors() {
        let entries = decode_all(serde_json::json!([
            {"uid": "a", "name": "Anna", "surname": "Safe",
             "lastRequest": {"createdAt": "2026-03-01T08:00:00Z"},
             "lastResponse": {"safetyStatus": "Yes", "respondedAt": "2026-03-01T08:05:00Z"}},
            {"uid": "b", "name": "Bohdan", "surname": "Late",
             "lastRequest": {"createdAt": "2026-03-01T02:00:00Z"}},
            {"uid": "c", "name": "Cyril", "surname": "Broken",
             "lastRequest": {"createdAt": "03/01/2026"}},
            {"uid": "d", "name": "Daria", "surname": "New"}
        ]));
        let now = at(1_772_352_000 + 3_600);
        let rows = evaluate_entries(&entries, now, window());

        let order: Vec<&str> = rows.iter().map(|row| row.uid.as_str()).collect();
        assert_eq!(order, vec!["c", "b", "d", "a"]);
        assert!(rows[0].outcome.is_err());
        assert_eq!(rows[1].classification(), Some(Classification::Overdue));
        assert_eq!(rows[2].classification(), Some(Classification::NoData));
    }

    #[test]
    fn undecodable_row_does_not_hide_overdue_neighbour() {
        let entries = decode_all(serde_json::json!([
            {"uid": "late", "name": "Halyna", "surname": "Late",
             "lastRequest": {"createdAt": "2026-03-01T02:00:00Z"}},
            {"uid": "odd", "name": "Oleh", "surname": "Odd",
             "lastRequest": {"createdAt": "2026-03-01T07:00:00Z"},
             "lastResponse": {"safetyStatus": "Maybe", "respondedAt": "2026-03-01T07:30:00Z"}}
        ]));
        let rows = evaluate_entries(&entries, at(1_772_352_000 + 3_600), window());

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].uid, "odd");
        assert_eq!(rows[0].full_name, "Oleh Odd");
        assert!(matches!(&rows[0].outcome, Err(RowError::Unreadable(_))));
        assert_eq!(rows[1].uid, "late");
        assert_eq!(rows[1].classification(), Some(Classification::Overdue));
    }

    #[test]
    fn elapsed_formatting_tiers() {
        assert_eq!(format_elapsed(Duration::seconds(20)), "just now");
        assert_eq!(format_elapsed(Duration::seconds(-20)), "just now");
        assert_eq!(format_elapsed(Duration::minutes(42)), "42m");
        assert_eq!(format_elapsed(Duration::minutes(179)), "2h 59m");
        assert_eq!(format_elapsed(Duration::hours(76)), "3d 4h");
    }

    #[test]
    fn attention_flags() {
        assert!(Classification::Overdue.needs_attention());
        assert!(Classification::Unsafe.needs_attention());
        assert!(!Classification::AwaitingResponse.needs_attention());
    }
}
