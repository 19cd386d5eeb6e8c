//! ReviewDock CLI
//!
//! Submits a diff or pull request to the analysis pipeline and renders the
//! agents' progress as it streams in.

mod cmd_analyze;
mod cmd_config;
mod cmd_replay;
mod logging;
mod paths;
mod render;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use reviewdock_engine::ClientConfig;

use crate::paths::DataDir;

#[derive(Parser)]
#[command(name = "reviewdock")]
#[command(about = "Run and watch multi-agent pull request analyses", long_about = None)]
#[command(version)]
struct Cli {
    /// Data directory for config and logs
    #[arg(long, global = true, env = "REVIEWDOCK_DATA_DIR", value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a diff or GitHub pull request and stream progress
    Analyze(cmd_analyze::AnalyzeArgs),

    /// Replay recorded pipeline frames (one per line) through the engine
    Replay {
        file: PathBuf,

        /// Print every snapshot as one JSON line
        #[arg(long)]
        json: bool,
    },

    /// Show the resolved configuration
    Config,

    /// Generate shell completions
    Completions { shell: Shell },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", style("error:").red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    if let Command::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "reviewdock", &mut std::io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    data_dir.ensure_dirs()?;
    let _logging = logging::init_logging(&data_dir.log_dir())?;

    let config = ClientConfig::load(&data_dir.config_path())?.with_env();

    match cli.command {
        Command::Analyze(args) => cmd_analyze::run(args, config).await,
        Command::Replay { file, json } => cmd_replay::run(&file, json, config),
        Command::Config => {
            cmd_config::run(&data_dir, &config)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Completions { .. } => Ok(ExitCode::SUCCESS),
    }
}
