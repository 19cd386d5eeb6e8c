//! Event decoder
//!
//! Turns one raw transport frame into a typed [`Event`]. The pipeline is
//! untrusted input: anything that does not match the frame schema, or
//! lacks the fields its kind requires, comes back as a [`DecodeError`]
//! and is recorded by the engine as a synthetic `malformed` event.

use reviewdock_protocol::server::event_type;
use reviewdock_protocol::{AgentName, AnalysisStatus, EventFrame};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};
use thiserror::Error;

/// Raw text kept in a malformed event's payload
const MALFORMED_RAW_LIMIT: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid frame: {0}")]
    Json(String),

    #[error("{event_type} event has no agent")]
    MissingAgent { event_type: String },

    #[error("{event_type} event names unknown agent '{agent}'")]
    UnknownAgent { event_type: String, agent: String },

    #[error("{event_type} event is missing '{field}'")]
    MissingField {
        event_type: String,
        field: &'static str,
    },

    #[error("{event_type} event has invalid '{field}'")]
    InvalidField {
        event_type: String,
        field: &'static str,
    },

    #[error("analysis_completed event carries no result payload")]
    MissingResult,
}

/// Closed set of event kinds. Anything unrecognized lands in `Other`.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    FetchStarted,
    FetchCompleted,
    AnalysisStarted,
    AgentStarted {
        agent: AgentName,
    },
    AgentCompleted {
        agent: AgentName,
        findings_count: u32,
        execution_time: f64,
    },
    AnalysisCompleted,
    /// `agent: None` means the error is session-wide
    Error {
        agent: Option<AgentName>,
    },
    /// Recorded locally for a frame that failed to decode
    Malformed {
        reason: String,
    },
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::FetchStarted => event_type::FETCH_STARTED,
            EventKind::FetchCompleted => event_type::FETCH_COMPLETED,
            EventKind::AnalysisStarted => event_type::ANALYSIS_STARTED,
            EventKind::AgentStarted { .. } => event_type::AGENT_STARTED,
            EventKind::AgentCompleted { .. } => event_type::AGENT_COMPLETED,
            EventKind::AnalysisCompleted => event_type::ANALYSIS_COMPLETED,
            EventKind::Error { .. } => event_type::ERROR,
            EventKind::Malformed { .. } => event_type::MALFORMED,
            EventKind::Other(name) => name,
        }
    }
}

/// One decoded progress event
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub agent: Option<AgentName>,
    pub message: String,
    pub payload: Option<Value>,
    pub timestamp: String,
}

impl Event {
    /// Synthetic transcript entry for a frame that could not be applied.
    pub fn malformed(raw: &str, error: &DecodeError, now: &str) -> Self {
        let raw: String = raw.chars().take(MALFORMED_RAW_LIMIT).collect();
        Event {
            kind: EventKind::Malformed {
                reason: error.to_string(),
            },
            agent: None,
            message: format!("Dropped malformed frame: {error}"),
            payload: Some(json!({ "raw": raw })),
            timestamp: now.to_string(),
        }
    }

    /// Status the pipeline attached to an `agent_completed` frame.
    ///
    /// The pipeline reports an agent that crashed internally as a completion
    /// with `status: "failed"`. This is display-only; the projector still
    /// treats the agent as `Completed`.
    pub fn reported_status(&self) -> Option<AnalysisStatus> {
        match self.kind {
            EventKind::AgentCompleted { .. } => self
                .payload
                .as_ref()
                .and_then(|data| data.get("status"))
                .and_then(|status| AnalysisStatus::deserialize(status).ok()),
            _ => None,
        }
    }

    /// Wire-shaped view, used when the transcript is serialized.
    pub fn to_frame(&self) -> EventFrame {
        EventFrame {
            event_type: self.kind.as_str().to_string(),
            agent: self.agent.map(|a| a.as_str().to_string()),
            message: self.message.clone(),
            data: self.payload.clone(),
            timestamp: self.timestamp.clone(),
        }
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_frame().serialize(serializer)
    }
}

/// Decode one raw frame.
pub fn decode(raw: &str) -> Result<Event, DecodeError> {
    let frame: EventFrame =
        serde_json::from_str(raw).map_err(|e| DecodeError::Json(e.to_string()))?;

    let agent_field = frame
        .agent
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty());
    let parsed_agent = agent_field.and_then(|a| a.parse::<AgentName>().ok());

    let required_agent = || -> Result<AgentName, DecodeError> {
        match agent_field {
            None => Err(DecodeError::MissingAgent {
                event_type: frame.event_type.clone(),
            }),
            Some(name) => parsed_agent.ok_or_else(|| DecodeError::UnknownAgent {
                event_type: frame.event_type.clone(),
                agent: name.to_string(),
            }),
        }
    };

    let kind = match frame.event_type.as_str() {
        event_type::FETCH_STARTED => EventKind::FetchStarted,
        event_type::FETCH_COMPLETED => EventKind::FetchCompleted,
        event_type::ANALYSIS_STARTED => EventKind::AnalysisStarted,
        event_type::AGENT_STARTED => EventKind::AgentStarted {
            agent: required_agent()?,
        },
        event_type::AGENT_COMPLETED => {
            let agent = required_agent()?;
            let data = frame.data.as_ref();
            EventKind::AgentCompleted {
                agent,
                findings_count: count_field(&frame.event_type, data, "findings_count")?,
                execution_time: seconds_field(&frame.event_type, data, "execution_time")?,
            }
        }
        event_type::ANALYSIS_COMPLETED => match frame.data {
            Some(Value::Object(_)) => EventKind::AnalysisCompleted,
            _ => return Err(DecodeError::MissingResult),
        },
        // No agent means session-wide. A named agent we don't track is
        // malformed rather than silently promoted to session-wide.
        event_type::ERROR => EventKind::Error {
            agent: match agent_field {
                None => None,
                Some(_) => Some(required_agent()?),
            },
        },
        // Locally reserved; a remote frame may not claim it.
        event_type::MALFORMED => {
            return Err(DecodeError::InvalidField {
                event_type: frame.event_type.clone(),
                field: "event_type",
            })
        }
        other => EventKind::Other(other.to_string()),
    };

    Ok(Event {
        kind,
        agent: parsed_agent,
        message: frame.message,
        payload: frame.data,
        timestamp: frame.timestamp,
    })
}

fn field<'a>(
    event_type: &str,
    data: Option<&'a Value>,
    name: &'static str,
) -> Result<&'a Value, DecodeError> {
    data.and_then(|d| d.get(name))
        .filter(|v| !v.is_null())
        .ok_or_else(|| DecodeError::MissingField {
            event_type: event_type.to_string(),
            field: name,
        })
}

fn count_field(
    event_type: &str,
    data: Option<&Value>,
    name: &'static str,
) -> Result<u32, DecodeError> {
    let invalid = || DecodeError::InvalidField {
        event_type: event_type.to_string(),
        field: name,
    };
    let value = field(event_type, data, name)?;

    if let Some(n) = value.as_u64() {
        return u32::try_from(n).map_err(|_| invalid());
    }
    // Integral floats (e.g. `2.0`) are accepted.
    match value.as_f64() {
        Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= f64::from(u32::MAX) => Ok(f as u32),
        _ => Err(invalid()),
    }
}

fn seconds_field(
    event_type: &str,
    data: Option<&Value>,
    name: &'static str,
) -> Result<f64, DecodeError> {
    match field(event_type, data, name)?.as_f64() {
        Some(f) if f.is_finite() && f >= 0.0 => Ok(f),
        _ => Err(DecodeError::InvalidField {
            event_type: event_type.to_string(),
            field: name,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event_type: &str, agent: Option<&str>, data: Value) -> String {
        json!({
            "event_type": event_type,
            "agent": agent,
            "message": "msg",
            "data": data,
            "timestamp": "2025-01-01T10:00:00"
        })
        .to_string()
    }

    #[test]
    fn decodes_agent_completed() {
        let raw = frame(
            "agent_completed",
            Some("security"),
            json!({ "findings_count": 2, "execution_time": 3.5, "status": "completed" }),
        );
        let event = decode(&raw).unwrap();
        assert_eq!(
            event.kind,
            EventKind::AgentCompleted {
                agent: AgentName::Security,
                findings_count: 2,
                execution_time: 3.5,
            }
        );
        assert_eq!(event.agent, Some(AgentName::Security));
        assert_eq!(event.timestamp, "2025-01-01T10:00:00");
    }

    #[test]
    fn agent_completed_requires_numeric_payload_fields() {
        let missing = frame("agent_completed", Some("testing"), json!({ "execution_time": 1.0 }));
        assert_eq!(
            decode(&missing),
            Err(DecodeError::MissingField {
                event_type: "agent_completed".into(),
                field: "findings_count",
            })
        );

        let textual = frame(
            "agent_completed",
            Some("testing"),
            json!({ "findings_count": "3", "execution_time": 1.0 }),
        );
        assert!(matches!(
            decode(&textual),
            Err(DecodeError::InvalidField { field: "findings_count", .. })
        ));

        let negative = frame(
            "agent_completed",
            Some("testing"),
            json!({ "findings_count": 1, "execution_time": -2.0 }),
        );
        assert!(matches!(
            decode(&negative),
            Err(DecodeError::InvalidField { field: "execution_time", .. })
        ));

        let no_data = frame("agent_completed", Some("testing"), Value::Null);
        assert!(matches!(decode(&no_data), Err(DecodeError::MissingField { .. })));
    }

    #[test]
    fn reported_status_reads_completion_payload() {
        let failed = frame(
            "agent_completed",
            Some("testing"),
            json!({ "findings_count": 0, "execution_time": 0.2, "status": "failed" }),
        );
        assert_eq!(
            decode(&failed).unwrap().reported_status(),
            Some(AnalysisStatus::Failed)
        );

        let bare = frame(
            "agent_completed",
            Some("testing"),
            json!({ "findings_count": 0, "execution_time": 0.2 }),
        );
        assert_eq!(decode(&bare).unwrap().reported_status(), None);

        let started = frame("agent_started", Some("testing"), json!({ "status": "failed" }));
        assert_eq!(decode(&started).unwrap().reported_status(), None);
    }

    #[test]
    fn integral_float_counts_are_accepted() {
        let raw = frame(
            "agent_completed",
            Some("standards"),
            json!({ "findings_count": 4.0, "execution_time": 0 }),
        );
        assert!(matches!(
            decode(&raw).unwrap().kind,
            EventKind::AgentCompleted { findings_count: 4, .. }
        ));
    }

    #[test]
    fn agent_events_require_a_known_agent() {
        assert_eq!(
            decode(&frame("agent_started", None, Value::Null)),
            Err(DecodeError::MissingAgent {
                event_type: "agent_started".into()
            })
        );
        assert_eq!(
            decode(&frame("agent_started", Some("linting"), Value::Null)),
            Err(DecodeError::UnknownAgent {
                event_type: "agent_started".into(),
                agent: "linting".into(),
            })
        );
        assert_eq!(
            decode(&frame("agent_started", Some("  "), Value::Null)),
            Err(DecodeError::MissingAgent {
                event_type: "agent_started".into()
            })
        );
    }

    #[test]
    fn error_scope_follows_agent_field() {
        let scoped = decode(&frame("error", Some("performance"), Value::Null)).unwrap();
        assert_eq!(
            scoped.kind,
            EventKind::Error {
                agent: Some(AgentName::Performance)
            }
        );

        let session_wide = decode(&frame("error", None, Value::Null)).unwrap();
        assert_eq!(session_wide.kind, EventKind::Error { agent: None });

        let blank = decode(&frame("error", Some(" "), Value::Null)).unwrap();
        assert_eq!(blank.kind, EventKind::Error { agent: None });

        assert_eq!(
            decode(&frame("error", Some("linting"), Value::Null)),
            Err(DecodeError::UnknownAgent {
                event_type: "error".into(),
                agent: "linting".into(),
            })
        );
    }

    #[test]
    fn analysis_completed_requires_object_payload() {
        assert_eq!(
            decode(&frame("analysis_completed", None, Value::Null)),
            Err(DecodeError::MissingResult)
        );
        assert_eq!(
            decode(&frame("analysis_completed", None, json!([1, 2]))),
            Err(DecodeError::MissingResult)
        );
        let event = decode(&frame("analysis_completed", None, json!({ "id": "r1" }))).unwrap();
        assert_eq!(event.kind, EventKind::AnalysisCompleted);
        assert_eq!(event.payload.unwrap()["id"], "r1");
    }

    #[test]
    fn unknown_kinds_are_kept_as_other() {
        let event = decode(&frame("agent_thinking", Some("security"), Value::Null)).unwrap();
        assert_eq!(event.kind, EventKind::Other("agent_thinking".into()));
        assert_eq!(event.kind.as_str(), "agent_thinking");
    }

    #[test]
    fn remote_frames_cannot_claim_malformed_kind() {
        assert!(decode(&frame("malformed", None, Value::Null)).is_err());
    }

    #[test]
    fn invalid_json_is_a_decode_error() {
        assert!(matches!(decode("{not json"), Err(DecodeError::Json(_))));
        assert!(matches!(decode(r#"{"message":"x"}"#), Err(DecodeError::Json(_))));
    }

    #[test]
    fn malformed_event_truncates_raw_text() {
        let raw = "x".repeat(2000);
        let err = DecodeError::Json("eof".into());
        let event = Event::malformed(&raw, &err, "now");

        assert_eq!(event.kind.as_str(), "malformed");
        assert_eq!(
            event.payload.as_ref().unwrap()["raw"].as_str().unwrap().len(),
            MALFORMED_RAW_LIMIT
        );
        assert_eq!(event.timestamp, "now");
    }

    #[test]
    fn events_serialize_in_wire_shape() {
        let event = decode(&frame("agent_started", Some("documentation"), Value::Null)).unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "agent_started");
        assert_eq!(json["agent"], "documentation");
        assert_eq!(json["message"], "msg");
    }
}
