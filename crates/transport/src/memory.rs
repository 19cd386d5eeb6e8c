//! In-process transport.
//!
//! `MemoryTransport` is handed to the engine like any other transport;
//! the paired `MemoryServer` plays the pipeline's side: it accepts opens,
//! pushes frames, injects failures and records what the client sent.
//! Notifications can be pushed on any generation, including ones the
//! client already closed, which is how stale-handle handling is exercised.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::{
    EventSender, Generation, Transport, TransportError, TransportEvent, TransportEventKind,
    TransportHandle,
};

struct MemoryConnection {
    generation: Generation,
    url: String,
    events: EventSender,
    sent: Vec<String>,
    closed_by_client: bool,
    severed: bool,
}

#[derive(Default)]
struct Shared {
    connections: Vec<MemoryConnection>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Client side of an in-memory connection pair
#[derive(Clone, Default)]
pub struct MemoryTransport {
    shared: Arc<Mutex<Shared>>,
}

/// Pipeline side of an in-memory connection pair
#[derive(Clone)]
pub struct MemoryServer {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryTransport {
    pub fn pair() -> (MemoryTransport, MemoryServer) {
        let transport = MemoryTransport::default();
        let server = MemoryServer {
            shared: transport.shared.clone(),
        };
        (transport, server)
    }
}

impl Transport for MemoryTransport {
    fn open(
        &self,
        url: &str,
        generation: Generation,
        events: EventSender,
    ) -> Box<dyn TransportHandle> {
        debug!(
            component = "transport",
            event = "transport.memory.open",
            generation = %generation,
            url = %url,
            "Opening in-memory connection"
        );
        lock(&self.shared).connections.push(MemoryConnection {
            generation,
            url: url.to_string(),
            events,
            sent: Vec::new(),
            closed_by_client: false,
            severed: false,
        });
        Box::new(MemoryHandle {
            generation,
            shared: self.shared.clone(),
        })
    }
}

struct MemoryHandle {
    generation: Generation,
    shared: Arc<Mutex<Shared>>,
}

impl TransportHandle for MemoryHandle {
    fn generation(&self) -> Generation {
        self.generation
    }

    fn send(&self, text: String) -> Result<(), TransportError> {
        let mut shared = lock(&self.shared);
        let conn = shared
            .connections
            .iter_mut()
            .find(|c| c.generation == self.generation)
            .ok_or(TransportError::Closed)?;
        if conn.closed_by_client || conn.severed {
            return Err(TransportError::Closed);
        }
        conn.sent.push(text);
        Ok(())
    }

    fn close(&self) {
        let mut shared = lock(&self.shared);
        if let Some(conn) = shared
            .connections
            .iter_mut()
            .find(|c| c.generation == self.generation)
        {
            conn.closed_by_client = true;
        }
    }
}

impl MemoryServer {
    /// Generation of the most recently opened connection
    pub fn latest_generation(&self) -> Option<Generation> {
        lock(&self.shared).connections.last().map(|c| c.generation)
    }

    /// Number of connections opened so far
    pub fn open_count(&self) -> usize {
        lock(&self.shared).connections.len()
    }

    pub fn url(&self, generation: Generation) -> Option<String> {
        self.with_connection(generation, |c| c.url.clone())
    }

    /// Messages the client sent on a connection
    pub fn sent(&self, generation: Generation) -> Vec<String> {
        self.with_connection(generation, |c| c.sent.clone())
            .unwrap_or_default()
    }

    pub fn closed_by_client(&self, generation: Generation) -> bool {
        self.with_connection(generation, |c| c.closed_by_client)
            .unwrap_or(false)
    }

    /// Acknowledge the open. Returns false if the client is gone.
    pub fn accept(&self, generation: Generation) -> bool {
        self.emit(generation, TransportEventKind::Opened)
    }

    pub fn push_frame(&self, generation: Generation, raw: impl Into<String>) -> bool {
        self.emit(generation, TransportEventKind::Frame(raw.into()))
    }

    pub fn fail(&self, generation: Generation, message: impl Into<String>) -> bool {
        self.emit(generation, TransportEventKind::Error(message.into()))
    }

    pub fn close(&self, generation: Generation, reason: Option<String>) -> bool {
        self.emit(generation, TransportEventKind::Closed { reason })
    }

    /// Drop the link without notifying the client. Later sends on the
    /// handle fail with `Closed`; pushed notifications are still delivered.
    pub fn sever(&self, generation: Generation) -> bool {
        let mut shared = lock(&self.shared);
        match shared
            .connections
            .iter_mut()
            .find(|c| c.generation == generation)
        {
            Some(conn) => {
                conn.severed = true;
                true
            }
            None => false,
        }
    }

    fn emit(&self, generation: Generation, kind: TransportEventKind) -> bool {
        self.with_connection(generation, |c| {
            c.events.send(TransportEvent::new(generation, kind)).is_ok()
        })
        .unwrap_or(false)
    }

    fn with_connection<T>(
        &self,
        generation: Generation,
        f: impl FnOnce(&MemoryConnection) -> T,
    ) -> Option<T> {
        let shared = lock(&self.shared);
        shared
            .connections
            .iter()
            .find(|c| c.generation == generation)
            .map(f)
    }
}
