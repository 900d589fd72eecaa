//! Row <-> Task conversion.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC text with microseconds,
//! so text comparison in SQL orders them correctly.

use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Row, Rows, Value};
use serde::Serialize;
use tasklease_core::{StoreError, Task, TaskStatus};

/// Column list shared by every `SELECT` and `RETURNING` clause.
pub(crate) const TASK_COLUMNS: &str =
    "seq, id, queue, spec, priority, status, progress, owner, deadline, created, updated, errors, history";

pub(crate) fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("bad timestamp {raw:?}: {e}")))
}

pub(crate) fn text(value: impl Into<String>) -> Value {
    Value::Text(value.into())
}

pub(crate) fn time_value(time: DateTime<Utc>) -> Value {
    Value::Text(format_time(time))
}

pub(crate) fn json_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, StoreError> {
    serde_json::to_string(value)
        .map(Value::Text)
        .map_err(|e| StoreError::Decode(format!("json encode: {e}")))
}

fn column(row: &Row, idx: i32, name: &str) -> Result<Value, StoreError> {
    row.get_value(idx)
        .map_err(|e| StoreError::Decode(format!("column {name}: {e}")))
}

fn unexpected(name: &str, expected: &str, got: &Value) -> StoreError {
    StoreError::Decode(format!("column {name}: expected {expected}, got {got:?}"))
}

fn text_column(row: &Row, idx: i32, name: &str) -> Result<String, StoreError> {
    match column(row, idx, name)? {
        Value::Text(text) => Ok(text),
        other => Err(unexpected(name, "text", &other)),
    }
}

fn optional_text_column(row: &Row, idx: i32, name: &str) -> Result<Option<String>, StoreError> {
    match column(row, idx, name)? {
        Value::Null => Ok(None),
        Value::Text(text) => Ok(Some(text)),
        other => Err(unexpected(name, "text or null", &other)),
    }
}

fn integer_column(row: &Row, idx: i32, name: &str) -> Result<i64, StoreError> {
    match column(row, idx, name)? {
        Value::Integer(n) => Ok(n),
        other => Err(unexpected(name, "integer", &other)),
    }
}

fn real_column(row: &Row, idx: i32, name: &str) -> Result<f64, StoreError> {
    match column(row, idx, name)? {
        Value::Real(x) => Ok(x),
        Value::Integer(n) => Ok(n as f64),
        other => Err(unexpected(name, "real", &other)),
    }
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row, idx: i32, name: &str) -> Result<T, StoreError> {
    let raw = text_column(row, idx, name)?;
    serde_json::from_str(&raw).map_err(|e| StoreError::Decode(format!("column {name}: {e}")))
}

/// Decode one row selected with [`TASK_COLUMNS`] into its sequence and task.
pub(crate) fn task_from_row(row: &Row) -> Result<(i64, Task), StoreError> {
    let seq = integer_column(row, 0, "seq")?;
    let priority = integer_column(row, 4, "priority")?;
    let status = text_column(row, 5, "status")?;
    let deadline = optional_text_column(row, 8, "deadline")?
        .map(|raw| parse_time(&raw))
        .transpose()?;

    let task = Task {
        id: text_column(row, 1, "id")?,
        queue: text_column(row, 2, "queue")?,
        spec: json_column(row, 3, "spec")?,
        priority: i32::try_from(priority)
            .map_err(|e| StoreError::Decode(format!("column priority: {e}")))?,
        status: status.parse::<TaskStatus>().map_err(StoreError::Decode)?,
        progress: real_column(row, 6, "progress")? as f32,
        owner: optional_text_column(row, 7, "owner")?,
        deadline,
        created: parse_time(&text_column(row, 9, "created")?)?,
        updated: parse_time(&text_column(row, 10, "updated")?)?,
        errors: json_column(row, 11, "errors")?,
        history: json_column(row, 12, "history")?,
    };
    Ok((seq, task))
}

/// Drain a result set into tasks.
pub(crate) async fn collect_tasks(
    rows: Result<Rows, libsql::Error>,
    op: &str,
) -> Result<Vec<(i64, Task)>, StoreError> {
    let mut rows = rows.map_err(|e| StoreError::Query(format!("{op}: {e}")))?;
    let mut tasks = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| StoreError::Query(format!("{op}: {e}")))?
    {
        tasks.push(task_from_row(&row)?);
    }
    Ok(tasks)
}

/// Claim order: priority descending, created ascending, insertion order.
pub(crate) fn in_claim_order(mut tasks: Vec<(i64, Task)>) -> Vec<Task> {
    tasks.sort_by(|(a_seq, a), (b_seq, b)| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created.cmp(&b.created))
            .then_with(|| a_seq.cmp(b_seq))
    });
    tasks.into_iter().map(|(_, task)| task).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn formatted_times_sort_as_text() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let earlier = format_time(base + Duration::milliseconds(999));
        let later = format_time(base + Duration::seconds(10));
        assert_eq!(earlier.len(), later.len());
        assert!(earlier < later);
        assert_eq!(parse_time(&later).unwrap(), base + Duration::seconds(10));
    }

    #[test]
    fn bad_timestamp_is_decode_error() {
        assert!(matches!(parse_time("yesterday"), Err(StoreError::Decode(_))));
    }
}
