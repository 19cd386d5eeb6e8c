//! Session actor: owns the `SessionEngine` and processes work sequentially.
//!
//! Callers talk to it through `SessionActorHandle`, which sends
//! `SessionCommand` messages over an mpsc channel. Transport notifications
//! arrive on a second channel; both are drained by the same task, so the
//! engine never sees two inputs at once. Snapshot reads are lock-free.

use std::sync::Arc;

use reviewdock_protocol::AnalysisRequest;
use reviewdock_transport::{Transport, TransportEvent};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::engine::{EngineError, SessionEngine};
use crate::session::{SessionSnapshot, SnapshotPublisher};
use crate::session_command::SessionCommand;

const COMMAND_CAPACITY: usize = 64;

/// Handle to the running session actor (cheap to Clone).
#[derive(Clone)]
pub struct SessionActorHandle {
    command_tx: mpsc::Sender<SessionCommand>,
    publisher: SnapshotPublisher,
}

impl SessionActorHandle {
    /// Spawn the actor on the current tokio runtime.
    pub fn spawn(transport: Arc<dyn Transport>, config: ClientConfig) -> SessionActorHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let engine = SessionEngine::new(transport, config, events_tx);
        let publisher = engine.publisher().clone();

        tokio::spawn(actor_loop(engine, command_rx, events_rx));

        SessionActorHandle {
            command_tx,
            publisher,
        }
    }

    /// Send a command to the actor (fire-and-forget).
    pub async fn send(&self, cmd: SessionCommand) {
        let name = cmd.name();
        if self.command_tx.send(cmd).await.is_err() {
            warn!(
                component = "session_actor",
                command = name,
                "Actor channel closed, command dropped"
            );
        }
    }

    /// Start a new analysis session and return its id.
    pub async fn start_session(&self, request: AnalysisRequest) -> Result<String, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(SessionCommand::StartSession { request, reply })
            .await
            .map_err(|_| EngineError::ActorUnavailable)?;
        rx.await.map_err(|_| EngineError::ActorUnavailable)?
    }

    pub async fn reset(&self) {
        self.send(SessionCommand::Reset).await;
    }

    /// Snapshot as seen by the actor after all previously sent commands.
    pub async fn current_snapshot(&self) -> Result<Arc<SessionSnapshot>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(SessionCommand::GetSnapshot { reply })
            .await
            .map_err(|_| EngineError::ActorUnavailable)?;
        rx.await.map_err(|_| EngineError::ActorUnavailable)
    }

    /// Lock-free snapshot read.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.publisher.latest()
    }

    /// Every published snapshot from now on, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<SessionSnapshot>> {
        self.publisher.subscribe()
    }

    pub async fn shutdown(&self) {
        self.send(SessionCommand::Shutdown).await;
    }
}

async fn actor_loop(
    mut engine: SessionEngine,
    mut command_rx: mpsc::Receiver<SessionCommand>,
    mut events_rx: mpsc::UnboundedReceiver<TransportEvent>,
) {
    loop {
        tokio::select! {
            cmd = command_rx.recv() => {
                let Some(cmd) = cmd else {
                    engine.reset();
                    break;
                };
                if !handle_command(&mut engine, cmd) {
                    break;
                }
            }
            // The engine holds a sender, so this never yields None while it lives.
            Some(event) = events_rx.recv() => {
                engine.handle_transport_event(event);
            }
        }
    }

    debug!(
        component = "session_actor",
        event = "actor.stopped",
        "Session actor stopped"
    );
}

/// Returns false when the loop should stop.
fn handle_command(engine: &mut SessionEngine, cmd: SessionCommand) -> bool {
    match cmd {
        SessionCommand::StartSession { request, reply } => {
            let _ = reply.send(engine.start_session(request));
        }
        SessionCommand::Reset => engine.reset(),
        SessionCommand::GetSnapshot { reply } => {
            let _ = reply.send(engine.publisher().latest());
        }
        SessionCommand::Shutdown => {
            engine.reset();
            return false;
        }
    }
    true
}
