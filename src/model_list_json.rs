//! Purpose: JSON serializers for model listings and pull receipts.
//! Exports: `model_row_json`, `pull_report_json`, `format_system_time`.
//! Role: Keep the `--json` envelope shape identical across `list`, `pull` and `rm`.
//! Invariants: Absent artifacts serialize `size` and `modified_at` as null, never 0.
//! Invariants: Timestamps are RFC 3339 in UTC.
use std::time::{SystemTime, UNIX_EPOCH};

use pointseg::api::{ModelRow, PullOutcome, PullReport};
use serde_json::{Map, Value, json};

pub(crate) fn format_system_time(time: SystemTime) -> Option<String> {
    use time::format_description::well_known::Rfc3339;
    let duration = time.duration_since(UNIX_EPOCH).ok()?;
    let ts = time::OffsetDateTime::from_unix_timestamp_nanos(duration.as_nanos() as i128).ok()?;
    ts.format(&Rfc3339).ok()
}

pub(crate) fn model_row_json(row: &ModelRow) -> Value {
    let mut map = Map::new();
    map.insert("name".to_string(), json!(row.name));
    map.insert("id".to_string(), json!(row.id));
    map.insert("pulled".to_string(), json!(row.is_pulled()));
    map.insert("size".to_string(), json!(row.size));
    map.insert(
        "modified_at".to_string(),
        json!(row.modified_at.and_then(format_system_time)),
    );
    Value::Object(map)
}

pub(crate) fn pull_report_json(report: &PullReport) -> Value {
    let outcome = match report.outcome {
        PullOutcome::Fetched => "fetched",
        PullOutcome::AlreadyPresent => "already_present",
        PullOutcome::Replaced => "replaced",
    };
    json!({
        "name": report.name,
        "id": report.id,
        "size": report.info.size,
        "modified_at": format_system_time(report.info.modified_at),
        "path": report.path.display().to_string(),
        "outcome": outcome,
    })
}
