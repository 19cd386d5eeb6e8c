//! WebSocket transport backed by tokio-tungstenite.
//!
//! Each opened handle runs as an independent tokio task that owns the
//! socket. The handle talks to the task over an unbounded channel for
//! outbound text and a watch flag for close requests.

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::{
    EventSender, Generation, Transport, TransportError, TransportEvent, TransportEventKind,
    TransportHandle,
};

/// Opens real WebSocket connections. `wss://` needs the `tls` feature,
/// which the `reviewdock` binary enables by default.
#[derive(Debug, Clone, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WsTransport {
    fn open(
        &self,
        url: &str,
        generation: Generation,
        events: EventSender,
    ) -> Box<dyn TransportHandle> {
        #[cfg(feature = "tls")]
        install_crypto_provider();

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let (close_tx, close_rx) = watch::channel(false);

        tokio::spawn(run_connection(
            url.to_string(),
            generation,
            events,
            outbound_rx,
            close_rx,
        ));

        Box::new(WsHandle {
            generation,
            outbound_tx,
            close_tx,
        })
    }
}

/// `wss://` handshakes need a process-wide rustls provider.
#[cfg(feature = "tls")]
fn install_crypto_provider() {
    static INSTALL: std::sync::Once = std::sync::Once::new();
    INSTALL.call_once(|| {
        // Err means another provider is already installed, which is fine.
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Handle to one WebSocket connection task
pub struct WsHandle {
    generation: Generation,
    outbound_tx: mpsc::UnboundedSender<String>,
    close_tx: watch::Sender<bool>,
}

impl TransportHandle for WsHandle {
    fn generation(&self) -> Generation {
        self.generation
    }

    fn send(&self, text: String) -> Result<(), TransportError> {
        self.outbound_tx
            .send(text)
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        self.close_tx.send_replace(true);
    }
}

async fn run_connection(
    url: String,
    generation: Generation,
    events: EventSender,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    mut close_rx: watch::Receiver<bool>,
) {
    let notify = |kind: TransportEventKind| {
        // Receiver gone means the consumer shut down; nothing left to tell.
        let _ = events.send(TransportEvent::new(generation, kind));
    };

    debug!(
        component = "transport",
        event = "transport.connecting",
        generation = %generation,
        url = %url,
        "Connecting"
    );

    let connect = tokio::select! {
        biased;
        _ = close_rx.changed() => {
            debug!(
                component = "transport",
                event = "transport.cancelled",
                generation = %generation,
                "Closed before connection was established"
            );
            return;
        }
        result = connect_async(url.as_str()) => result,
    };

    let mut ws = match connect {
        Ok((ws, _response)) => ws,
        Err(err) => {
            warn!(
                component = "transport",
                event = "transport.connect_failed",
                generation = %generation,
                url = %url,
                error = %err,
                "WebSocket connect failed"
            );
            notify(TransportEventKind::Error(err.to_string()));
            return;
        }
    };

    info!(
        component = "transport",
        event = "transport.opened",
        generation = %generation,
        url = %url,
        "WebSocket connection opened"
    );
    notify(TransportEventKind::Opened);

    loop {
        tokio::select! {
            inbound = ws.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    notify(TransportEventKind::Frame(text.as_str().to_string()));
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => notify(TransportEventKind::Frame(text)),
                    Err(_) => warn!(
                        component = "transport",
                        event = "transport.binary_dropped",
                        generation = %generation,
                        len = bytes.len(),
                        "Dropped non-UTF-8 binary frame"
                    ),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_string())
                        .filter(|r| !r.is_empty());
                    info!(
                        component = "transport",
                        event = "transport.peer_closed",
                        generation = %generation,
                        reason = ?reason,
                        "Peer closed the connection"
                    );
                    notify(TransportEventKind::Closed { reason });
                    break;
                }
                // Ping/pong are answered by tungstenite itself
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(
                        component = "transport",
                        event = "transport.read_failed",
                        generation = %generation,
                        error = %err,
                        "WebSocket read failed"
                    );
                    notify(TransportEventKind::Error(err.to_string()));
                    break;
                }
                None => {
                    notify(TransportEventKind::Closed { reason: None });
                    break;
                }
            },

            outbound = outbound_rx.recv() => match outbound {
                Some(text) => {
                    if let Err(err) = ws.send(Message::text(text)).await {
                        warn!(
                            component = "transport",
                            event = "transport.send_failed",
                            generation = %generation,
                            error = %err,
                            "WebSocket send failed"
                        );
                        notify(TransportEventKind::Error(err.to_string()));
                        break;
                    }
                }
                // Handle dropped
                None => {
                    let _ = ws.close(None).await;
                    break;
                }
            },

            _ = close_rx.changed() => {
                debug!(
                    component = "transport",
                    event = "transport.closed_locally",
                    generation = %generation,
                    "Closing WebSocket"
                );
                let _ = ws.close(None).await;
                break;
            }
        }
    }
}
