//! Purpose: Define a stable, structured schema for non-fatal stderr notices.
//! Exports: `Notice`, `notice_json`.
//! Role: CLI diagnostics for events worth surfacing that are not errors
//!       (model already present, implicit pull during `run`).
//! Invariants: Notices are non-fatal and never alter stdout payloads.
//! Invariants: JSON schema is additive-only: `{"notice": {kind, time, cmd, model, message, details}}`.
use std::time::SystemTime;

use serde_json::{Map, Value, json};

use crate::model_list_json::format_system_time;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: String,
    pub time: String,
    pub cmd: String,
    pub model: String,
    pub message: String,
    pub details: Map<String, Value>,
}

impl Notice {
    pub fn new(kind: &str, cmd: &str, model: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            time: format_system_time(SystemTime::now()).unwrap_or_default(),
            cmd: cmd.to_string(),
            model: model.to_string(),
            message: message.into(),
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

pub fn notice_json(notice: &Notice) -> Value {
    json!({
        "notice": {
            "kind": notice.kind,
            "time": notice.time,
            "cmd": notice.cmd,
            "model": notice.model,
            "message": notice.message,
            "details": Value::Object(notice.details.clone()),
        }
    })
}
