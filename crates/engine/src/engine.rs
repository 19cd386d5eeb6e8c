//! Session engine
//!
//! Owns the single live session. Every transport notification and caller
//! command is applied here, one at a time, in arrival order:
//!
//! 1. stale notifications (generation mismatch) are dropped
//! 2. frames are decoded; undecodable ones become `malformed` transcript entries
//! 3. the projector and the phase transition run on the decoded event
//! 4. a fresh snapshot is published
//!
//! The engine is synchronous. `SessionActorHandle` drives it from one task.

use std::sync::Arc;

use reviewdock_protocol::{new_id, AnalysisRequest, FetchSummary, RequestError};
use reviewdock_transport::{
    EventSender, Generation, Transport, TransportEvent, TransportEventKind, TransportHandle,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, ConfigError};
use crate::decoder::{decode, Event, EventKind};
use crate::projector::project;
use crate::session::{AgentTable, SessionPhase, SessionSnapshot, SnapshotPublisher};
use crate::transition::{accepts_agent_update, transition, PhaseInput};

const CONNECT_FAILED: &str = "Could not connect to the analysis server";
const CONNECTION_LOST: &str = "Connection to the analysis server was lost";
const SEND_FAILED: &str = "Failed to send analysis request";
const ANALYSIS_FAILED: &str = "Analysis failed";

/// Caller contract violations. Protocol-shaped input never produces one.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    InvalidRequest(#[from] RequestError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("session actor is not running")]
    ActorUnavailable,
}

/// Mutable state of the current session
#[derive(Debug, Default)]
struct SessionState {
    session_id: Option<String>,
    phase: SessionPhase,
    agents: AgentTable,
    transcript: Vec<Event>,
    final_result: Option<Value>,
    last_error: Option<String>,
    fetch_summary: Option<FetchSummary>,
}

pub struct SessionEngine {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    events_tx: EventSender,
    generation: Generation,
    handle: Option<Box<dyn TransportHandle>>,
    pending_request: Option<AnalysisRequest>,
    state: SessionState,
    revision: u64,
    publisher: SnapshotPublisher,
}

impl SessionEngine {
    /// `events_tx` is handed to every opened handle; the owner of the
    /// matching receiver feeds notifications back through
    /// [`SessionEngine::handle_transport_event`].
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig, events_tx: EventSender) -> Self {
        let publisher = SnapshotPublisher::new(config.snapshot_capacity);
        Self {
            transport,
            config,
            events_tx,
            generation: Generation::default(),
            handle: None,
            pending_request: None,
            state: SessionState::default(),
            revision: 0,
            publisher,
        }
    }

    pub fn publisher(&self) -> &SnapshotPublisher {
        &self.publisher
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Current state as a fresh snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.state.session_id.clone(),
            generation: self.generation.0,
            revision: self.revision,
            phase: self.state.phase,
            agents: self.state.agents.to_vec(),
            transcript: self.state.transcript.clone(),
            final_result: self.state.final_result.clone(),
            last_error: self.state.last_error.clone(),
            fetch_summary: self.state.fetch_summary.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Start a new session, replacing whatever was running.
    ///
    /// The request is sent once the new connection reports `Opened`.
    pub fn start_session(&mut self, request: AnalysisRequest) -> Result<String, EngineError> {
        request.validate()?;
        let url = self.config.endpoint_url()?;

        self.close_handle();
        self.generation = self.generation.next();

        let session_id = new_id();
        self.state = SessionState {
            session_id: Some(session_id.clone()),
            phase: transition(self.state.phase, PhaseInput::SessionStarted),
            ..SessionState::default()
        };
        self.pending_request = Some(request);

        info!(
            component = "session_engine",
            event = "session.started",
            session_id = %session_id,
            generation = %self.generation,
            url = %url,
            "Starting analysis session"
        );

        self.handle = Some(
            self.transport
                .open(&url, self.generation, self.events_tx.clone()),
        );
        self.publish();
        Ok(session_id)
    }

    /// Close the connection and discard the session. Safe from any phase.
    pub fn reset(&mut self) {
        self.close_handle();
        self.generation = self.generation.next();
        self.pending_request = None;

        info!(
            component = "session_engine",
            event = "session.reset",
            session_id = self.state.session_id.as_deref().unwrap_or(""),
            phase = %self.state.phase,
            generation = %self.generation,
            "Session reset"
        );

        self.state = SessionState {
            phase: transition(self.state.phase, PhaseInput::Reset),
            ..SessionState::default()
        };
        self.publish();
    }

    // -----------------------------------------------------------------------
    // Transport notifications
    // -----------------------------------------------------------------------

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        let live = self
            .handle
            .as_ref()
            .is_some_and(|h| h.generation() == event.generation);
        if !live || event.generation != self.generation {
            debug!(
                component = "session_engine",
                event = "frame.stale_ignored",
                generation = %event.generation,
                current_generation = %self.generation,
                "Ignoring notification from stale transport handle"
            );
            return;
        }

        match event.kind {
            TransportEventKind::Opened => self.on_opened(),
            TransportEventKind::Frame(raw) => self.handle_inbound_frame(&raw),
            TransportEventKind::Error(message) => {
                warn!(
                    component = "session_engine",
                    event = "transport.failed",
                    generation = %event.generation,
                    phase = %self.state.phase,
                    error = %message,
                    "Transport error"
                );
                self.handle = None;
                self.fail_transport(PhaseInput::TransportFailed);
            }
            TransportEventKind::Closed { reason } => {
                self.handle = None;
                if self.state.phase.is_terminal() {
                    debug!(
                        component = "session_engine",
                        event = "transport.closed",
                        generation = %event.generation,
                        phase = %self.state.phase,
                        "Connection closed after session ended"
                    );
                    return;
                }
                warn!(
                    component = "session_engine",
                    event = "transport.closed_unexpectedly",
                    generation = %event.generation,
                    phase = %self.state.phase,
                    reason = reason.as_deref().unwrap_or(""),
                    "Connection closed before the analysis finished"
                );
                self.fail_transport(PhaseInput::TransportClosed);
            }
        }
    }

    fn on_opened(&mut self) {
        let next = transition(self.state.phase, PhaseInput::TransportOpened);
        if next == self.state.phase {
            return;
        }
        self.state.phase = next;

        info!(
            component = "session_engine",
            event = "transport.opened",
            generation = %self.generation,
            "Connection open, sending analysis request"
        );

        if let Some(request) = self.pending_request.take() {
            if let Err(err) = self.send_request(&request) {
                warn!(
                    component = "session_engine",
                    event = "request.send_failed",
                    generation = %self.generation,
                    error = %err,
                    "Failed to send analysis request"
                );
                self.state.phase = transition(self.state.phase, PhaseInput::TransportFailed);
                self.state.last_error = Some(SEND_FAILED.to_string());
            }
        }
        self.publish();
    }

    fn send_request(&self, request: &AnalysisRequest) -> Result<(), String> {
        let text = serde_json::to_string(request).map_err(|e| e.to_string())?;
        let handle = self.handle.as_ref().ok_or("no open connection")?;
        handle.send(text).map_err(|e| e.to_string())
    }

    fn fail_transport(&mut self, input: PhaseInput<'_>) {
        let before = self.state.phase;
        let next = transition(before, input);
        if next == SessionPhase::Failed && before != SessionPhase::Failed {
            let message = if before == SessionPhase::Connecting {
                CONNECT_FAILED
            } else {
                CONNECTION_LOST
            };
            self.state.last_error = Some(message.to_string());
        }
        self.state.phase = next;
        self.publish();
    }

    // -----------------------------------------------------------------------
    // Inbound frames
    // -----------------------------------------------------------------------

    /// Apply one raw frame from the live connection.
    pub fn handle_inbound_frame(&mut self, raw: &str) {
        if self.state.phase == SessionPhase::Idle {
            debug!(
                component = "session_engine",
                event = "frame.ignored_idle",
                "Ignoring frame while idle"
            );
            return;
        }

        let event = match decode(raw) {
            Ok(event) => event,
            Err(err) => {
                warn!(
                    component = "session_engine",
                    event = "frame.malformed",
                    session_id = self.state.session_id.as_deref().unwrap_or(""),
                    error = %err,
                    "Dropping malformed frame"
                );
                let now = chrono::Utc::now().to_rfc3339();
                self.state.transcript.push(Event::malformed(raw, &err, &now));
                self.publish();
                return;
            }
        };

        self.apply(event);
        self.publish();
    }

    fn apply(&mut self, event: Event) {
        let before = self.state.phase;

        if accepts_agent_update(before, &self.state.agents, &event) {
            self.state.agents = project(&self.state.agents, &event);
        }
        let after = transition(before, PhaseInput::Event(&event.kind));

        if after != before {
            debug!(
                component = "session_engine",
                event = "session.phase_changed",
                from = %before,
                to = %after,
                trigger = event.kind.as_str(),
                "Phase changed"
            );
        }

        match &event.kind {
            EventKind::AnalysisCompleted if after == SessionPhase::Completed && before != after => {
                self.state.final_result = event.payload.clone();
                info!(
                    component = "session_engine",
                    event = "session.completed",
                    session_id = self.state.session_id.as_deref().unwrap_or(""),
                    "Analysis completed"
                );
            }
            EventKind::Error { agent: None } if after == SessionPhase::Failed && before != after => {
                let message = event.message.trim();
                let message = if message.is_empty() {
                    ANALYSIS_FAILED
                } else {
                    message
                };
                warn!(
                    component = "session_engine",
                    event = "session.failed",
                    session_id = self.state.session_id.as_deref().unwrap_or(""),
                    error = %message,
                    "Pipeline reported a session-wide error"
                );
                self.state.last_error = Some(message.to_string());
            }
            EventKind::FetchCompleted if !before.is_terminal() => {
                self.state.fetch_summary = event
                    .payload
                    .as_ref()
                    .and_then(|data| serde_json::from_value(data.clone()).ok());
            }
            _ => {}
        }

        self.state.phase = after;
        self.state.transcript.push(event);
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn close_handle(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!(
                component = "session_engine",
                event = "transport.closing",
                generation = %handle.generation(),
                "Closing transport handle"
            );
            handle.close();
        }
    }

    fn publish(&mut self) {
        self.revision += 1;
        self.publisher.publish(self.snapshot());
    }
}

impl Drop for SessionEngine {
    fn drop(&mut self) {
        self.close_handle();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
