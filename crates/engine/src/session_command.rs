//! Commands sent to the session actor.

use std::sync::Arc;

use reviewdock_protocol::AnalysisRequest;
use tokio::sync::oneshot;

use crate::engine::EngineError;
use crate::session::SessionSnapshot;

pub enum SessionCommand {
    // -- Lifecycle --
    /// Start a new session, replacing the current one. Replies with the
    /// new session id, or the reason the request was rejected.
    StartSession {
        request: AnalysisRequest,
        reply: oneshot::Sender<Result<String, EngineError>>,
    },

    /// Close the connection and return to `Idle`
    Reset,

    // -- Queries --
    /// Latest published snapshot, read from inside the actor
    GetSnapshot {
        reply: oneshot::Sender<Arc<SessionSnapshot>>,
    },

    /// Reset and stop the actor loop
    Shutdown,
}

impl SessionCommand {
    pub fn name(&self) -> &'static str {
        match self {
            SessionCommand::StartSession { .. } => "start_session",
            SessionCommand::Reset => "reset",
            SessionCommand::GetSnapshot { .. } => "get_snapshot",
            SessionCommand::Shutdown => "shutdown",
        }
    }
}
