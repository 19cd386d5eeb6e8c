//! Pipeline → Client messages

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire event names emitted by the pipeline
pub mod event_type {
    pub const FETCH_STARTED: &str = "fetch_started";
    pub const FETCH_COMPLETED: &str = "fetch_completed";
    pub const ANALYSIS_STARTED: &str = "analysis_started";
    pub const AGENT_STARTED: &str = "agent_started";
    pub const AGENT_COMPLETED: &str = "agent_completed";
    pub const ANALYSIS_COMPLETED: &str = "analysis_completed";
    pub const ERROR: &str = "error";
    /// Synthetic kind recorded locally for frames that failed to decode
    pub const MALFORMED: &str = "malformed";
}

/// One inbound progress frame, exactly as sent over the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub event_type: String,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub timestamp: String,
}

/// Typed view of `fetch_completed.data`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSummary {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub files_changed: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_agent_completed_frame() {
        let json = r#"{
          "event_type":"agent_completed",
          "agent":"security",
          "message":"Security agent found 2 issues",
          "data":{"findings_count":2,"execution_time":3.5,"status":"completed"},
          "timestamp":"2025-01-01T10:00:00.123456"
        }"#;

        let frame: EventFrame = serde_json::from_str(json).expect("parse frame");
        assert_eq!(frame.event_type, event_type::AGENT_COMPLETED);
        assert_eq!(frame.agent.as_deref(), Some("security"));
        assert_eq!(frame.data.as_ref().unwrap()["findings_count"], 2);
    }

    #[test]
    fn optional_fields_default_when_absent_or_null() {
        let frame: EventFrame =
            serde_json::from_str(r#"{"event_type":"analysis_started","agent":null,"data":null}"#)
                .expect("parse frame");
        assert_eq!(frame.agent, None);
        assert_eq!(frame.data, None);
        assert!(frame.message.is_empty());
        assert!(frame.timestamp.is_empty());
    }

    #[test]
    fn event_type_is_required() {
        assert!(serde_json::from_str::<EventFrame>(r#"{"message":"hi"}"#).is_err());
    }
}
