//! `reviewdock replay`: run recorded frames through the engine offline.
//!
//! The file holds one raw frame per line, as the pipeline sent them. Blank
//! lines and lines starting with `#` are skipped.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use reviewdock_engine::config::{DEFAULT_ENDPOINT_PATH, DEFAULT_SERVER_URL};
use reviewdock_engine::{ClientConfig, SessionEngine, SessionSnapshot};
use reviewdock_protocol::AnalysisRequest;
use reviewdock_transport::{MemoryTransport, TransportEvent};
use tokio::sync::{broadcast, mpsc};
use tracing::info;

use crate::cmd_analyze::exit_status;
use crate::render::Renderer;

pub fn run(path: &Path, json: bool, config: ClientConfig) -> anyhow::Result<ExitCode> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let frames = recorded_frames(&text);

    let mut renderer = Renderer::new(json);
    let last = replay(path, &frames, config, |snap| renderer.render(snap))?;

    info!(
        component = "cli",
        event = "cli.replay.finished",
        frames = frames.len(),
        phase = %last.phase,
        "Replay finished"
    );

    renderer.finish(&last);
    Ok(ExitCode::from(exit_status(&last)))
}

pub fn recorded_frames(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

/// Feed `frames` through a fresh engine, calling `observe` for every
/// published snapshot. Returns the final snapshot.
pub fn replay(
    source: &Path,
    frames: &[&str],
    config: ClientConfig,
    mut observe: impl FnMut(&SessionSnapshot),
) -> anyhow::Result<SessionSnapshot> {
    // Nothing is dialed during replay; only the snapshot settings matter.
    let config = ClientConfig {
        server_url: DEFAULT_SERVER_URL.to_string(),
        endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
        ..config
    };
    let (transport, server) = MemoryTransport::pair();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<TransportEvent>();
    let mut engine = SessionEngine::new(Arc::new(transport), config, events_tx);
    let mut snapshots = engine.publisher().subscribe();

    let request = AnalysisRequest::DiffText(format!("replay of {}", source.display()));
    engine.start_session(request)?;
    let generation = engine.generation();

    let mut step = |engine: &mut SessionEngine| {
        while let Ok(event) = events_rx.try_recv() {
            engine.handle_transport_event(event);
        }
        drain(&mut snapshots, &mut observe);
    };

    server.accept(generation);
    step(&mut engine);
    for frame in frames {
        server.push_frame(generation, *frame);
        step(&mut engine);
    }

    Ok(engine.snapshot())
}

fn drain(
    snapshots: &mut broadcast::Receiver<Arc<SessionSnapshot>>,
    observe: &mut impl FnMut(&SessionSnapshot),
) {
    while let Ok(snap) = snapshots.try_recv() {
        observe(&snap);
    }
}
