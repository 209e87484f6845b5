//! Session lifecycle metadata published to the external sink.

use serde::Serialize;

/// Milliseconds since the unix epoch, the timestamp unit of the sink layout.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Error,
    Interrupted,
}

/// Lifecycle metadata for one supervised session.
///
/// Owned exclusively by the supervisor (via the status reporter); published
/// on start, restart, heartbeat and terminal transitions.
#[derive(Debug, Clone, Serialize)]
pub struct SessionMeta {
    pub command: String,
    pub started_at: i64,
    pub updated_at: i64,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionMeta {
    /// Fresh metadata for a newly started (or restarted) session.
    pub fn running(command: &str, plan_mode: Option<bool>) -> Self {
        let now = now_ms();
        Self {
            command: command.to_string(),
            started_at: now,
            updated_at: now,
            status: SessionStatus::Running,
            exit_code: None,
            plan_mode,
            line_count: None,
            error: None,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = now_ms();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_snake_case_and_skips_empty_fields() {
        let meta = SessionMeta::running("cat", None);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["command"], "cat");
        assert!(json.get("exit_code").is_none());
        assert!(json.get("plan_mode").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn terminal_fields_serialize_when_set() {
        let mut meta = SessionMeta::running("cat", Some(true));
        meta.status = SessionStatus::Error;
        meta.exit_code = Some(2);
        meta.line_count = Some(7);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["exit_code"], 2);
        assert_eq!(json["plan_mode"], true);
        assert_eq!(json["line_count"], 7);
    }
}
