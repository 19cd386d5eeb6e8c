//! Session data model and snapshot publishing

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use reviewdock_protocol::{AgentName, FetchSummary};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::decoder::Event;

/// Coarse session-wide status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    Connecting,
    Open,
    Analyzing,
    Completed,
    Failed,
}

impl SessionPhase {
    /// `Completed` and `Failed` end the session; only a reset leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Connecting => "connecting",
            SessionPhase::Open => "open",
            SessionPhase::Analyzing => "analyzing",
            SessionPhase::Completed => "completed",
            SessionPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Per-agent status
// ---------------------------------------------------------------------------

/// Execution state of one agent. Completion metadata only exists on
/// `Completed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AgentState {
    Waiting,
    Running,
    Completed {
        findings_count: u32,
        execution_time_seconds: f64,
    },
    Errored,
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Completed { .. } | AgentState::Errored)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStatus {
    pub name: AgentName,
    #[serde(flatten)]
    pub state: AgentState,
}

impl AgentStatus {
    pub fn findings_count(&self) -> Option<u32> {
        match self.state {
            AgentState::Completed { findings_count, .. } => Some(findings_count),
            _ => None,
        }
    }

    pub fn execution_time_seconds(&self) -> Option<f64> {
        match self.state {
            AgentState::Completed {
                execution_time_seconds,
                ..
            } => Some(execution_time_seconds),
            _ => None,
        }
    }
}

/// Exactly one status per agent, indexed by `AgentName`.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentTable {
    entries: [AgentStatus; AgentName::COUNT],
}

impl Default for AgentTable {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentTable {
    /// Every agent `Waiting`
    pub fn new() -> Self {
        Self {
            entries: AgentName::ALL.map(|name| AgentStatus {
                name,
                state: AgentState::Waiting,
            }),
        }
    }

    pub fn get(&self, name: AgentName) -> &AgentStatus {
        &self.entries[name.index()]
    }

    pub fn state(&self, name: AgentName) -> &AgentState {
        &self.get(name).state
    }

    pub fn set(&mut self, name: AgentName, state: AgentState) {
        self.entries[name.index()].state = state;
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentStatus> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<AgentStatus> {
        self.entries.to_vec()
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Read-only projection of the current session, published after every
/// applied frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Option<String>,
    pub generation: u64,
    pub revision: u64,
    pub phase: SessionPhase,
    pub agents: Vec<AgentStatus>,
    pub transcript: Vec<Event>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_summary: Option<FetchSummary>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            session_id: None,
            generation: 0,
            revision: 0,
            phase: SessionPhase::Idle,
            agents: AgentTable::new().to_vec(),
            transcript: Vec::new(),
            final_result: None,
            last_error: None,
            fetch_summary: None,
        }
    }
}

impl SessionSnapshot {
    pub fn agent(&self, name: AgentName) -> Option<&AgentStatus> {
        self.agents.iter().find(|a| a.name == name)
    }
}

/// Fans snapshots out to observers.
///
/// The latest snapshot is readable lock-free; every published revision is
/// also delivered in order over a broadcast channel. Observers that fall
/// more than `capacity` revisions behind see `RecvError::Lagged` and should
/// fall back to `latest()`.
#[derive(Clone)]
pub struct SnapshotPublisher {
    current: Arc<ArcSwap<SessionSnapshot>>,
    tx: broadcast::Sender<Arc<SessionSnapshot>>,
}

impl SnapshotPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            current: Arc::new(ArcSwap::from_pointee(SessionSnapshot::default())),
            tx,
        }
    }

    pub fn publish(&self, snapshot: SessionSnapshot) {
        let snapshot = Arc::new(snapshot);
        self.current.store(snapshot.clone());
        // No subscribers is fine; the latest value is still stored.
        let _ = self.tx.send(snapshot);
    }

    pub fn latest(&self) -> Arc<SessionSnapshot> {
        self.current.load_full()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<SessionSnapshot>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_holds_one_waiting_entry_per_agent() {
        let table = AgentTable::new();
        let names: Vec<AgentName> = table.iter().map(|s| s.name).collect();
        assert_eq!(names, AgentName::ALL.to_vec());
        assert!(table.iter().all(|s| s.state == AgentState::Waiting));
    }

    #[test]
    fn completion_metadata_only_on_completed() {
        let mut table = AgentTable::new();
        assert_eq!(table.get(AgentName::Testing).findings_count(), None);

        table.set(
            AgentName::Testing,
            AgentState::Completed {
                findings_count: 4,
                execution_time_seconds: 2.25,
            },
        );
        let status = table.get(AgentName::Testing);
        assert_eq!(status.findings_count(), Some(4));
        assert_eq!(status.execution_time_seconds(), Some(2.25));

        table.set(AgentName::Testing, AgentState::Errored);
        assert_eq!(table.get(AgentName::Testing).findings_count(), None);
    }

    #[test]
    fn agent_status_serializes_flat() {
        let status = AgentStatus {
            name: AgentName::Security,
            state: AgentState::Completed {
                findings_count: 2,
                execution_time_seconds: 3.5,
            },
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "security",
                "state": "completed",
                "findings_count": 2,
                "execution_time_seconds": 3.5
            })
        );

        let waiting = AgentStatus {
            name: AgentName::Standards,
            state: AgentState::Waiting,
        };
        assert_eq!(
            serde_json::to_value(&waiting).unwrap(),
            serde_json::json!({ "name": "standards", "state": "waiting" })
        );
    }

    #[tokio::test]
    async fn publisher_delivers_every_revision_in_order() {
        let publisher = SnapshotPublisher::new(8);
        let mut rx = publisher.subscribe();

        for revision in 1..=3 {
            publisher.publish(SessionSnapshot {
                revision,
                ..SessionSnapshot::default()
            });
        }

        for expected in 1..=3 {
            assert_eq!(rx.recv().await.unwrap().revision, expected);
        }
        assert_eq!(publisher.latest().revision, 3);
    }
}
