//! `reviewdock analyze`: submit a diff or pull request and watch the agents.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgGroup, Args};
use console::style;
use reviewdock_engine::{ClientConfig, SessionActorHandle, SessionPhase, SessionSnapshot};
use reviewdock_protocol::AnalysisRequest;
use reviewdock_transport::{Transport, WsTransport};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::render::Renderer;

/// Exit code after a Ctrl-C cancel
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Debug, Args)]
#[command(group(
    ArgGroup::new("input")
        .required(true)
        .args(["diff_file", "diff_stdin", "pr_url"]),
))]
pub struct AnalyzeArgs {
    /// Read the diff to analyze from a file
    #[arg(long, value_name = "PATH")]
    pub diff_file: Option<PathBuf>,

    /// Read the diff to analyze from stdin
    #[arg(long)]
    pub diff_stdin: bool,

    /// GitHub pull request URL (https://github.com/owner/repo/pull/123)
    #[arg(long, value_name = "URL")]
    pub pr_url: Option<String>,

    /// Analysis server origin, overriding config and environment
    #[arg(long, value_name = "URL")]
    pub server_url: Option<String>,

    /// Print every snapshot as one JSON line
    #[arg(long)]
    pub json: bool,
}

impl AnalyzeArgs {
    fn request(&self) -> anyhow::Result<AnalysisRequest> {
        let diff = if let Some(path) = &self.diff_file {
            Some(
                std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
            )
        } else if self.diff_stdin {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read diff from stdin")?;
            Some(buf)
        } else {
            None
        };
        Ok(AnalysisRequest::from_parts(diff, self.pr_url.clone())?)
    }
}

pub async fn run(args: AnalyzeArgs, mut config: ClientConfig) -> anyhow::Result<ExitCode> {
    if let Some(url) = &args.server_url {
        config.server_url = url.clone();
    }
    let request = args.request()?;
    let endpoint = config.endpoint_url()?;

    let transport: Arc<dyn Transport> = Arc::new(WsTransport::new());
    let actor = SessionActorHandle::spawn(transport, config);
    let mut snapshots = actor.subscribe();
    let mut renderer = Renderer::new(args.json);

    if !args.json {
        println!();
        println!("  {} {}", style("Analyzing").bold(), request.describe());
        println!("  {} {}", style("Server:").dim(), endpoint);
        println!();
    }

    let session_id = actor.start_session(request).await?;
    info!(
        component = "cli",
        event = "cli.analyze.started",
        session_id = %session_id,
        "Analysis session started"
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let last = loop {
        let snap = tokio::select! {
            _ = &mut ctrl_c => {
                actor.reset().await;
                actor.shutdown().await;
                if !args.json {
                    println!();
                    println!("  {}", style("Cancelled.").yellow());
                }
                return Ok(ExitCode::from(EXIT_INTERRUPTED));
            }
            received = snapshots.recv() => match received {
                Ok(snap) => snap,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        component = "cli",
                        event = "cli.snapshots_lagged",
                        skipped,
                        "Renderer fell behind, catching up from latest snapshot"
                    );
                    actor.snapshot()
                }
                Err(RecvError::Closed) => anyhow::bail!("session actor stopped unexpectedly"),
            },
        };

        if snap.session_id.as_deref() != Some(session_id.as_str()) {
            continue;
        }
        renderer.render(&snap);
        if snap.phase.is_terminal() {
            break snap;
        }
    };

    actor.shutdown().await;
    renderer.finish(&last);
    Ok(ExitCode::from(exit_status(&last)))
}

/// 0 only for a completed analysis
pub fn exit_status(snap: &SessionSnapshot) -> u8 {
    match snap.phase {
        SessionPhase::Completed => 0,
        _ => 1,
    }
}
