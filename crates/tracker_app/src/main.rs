mod platform;

use std::path::PathBuf;

use clap::Parser;

/// Follow a background task's progress from the terminal.
#[derive(Debug, Parser)]
#[command(name = "progress-tracker", version)]
pub struct Args {
    /// RON settings file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// WebSocket origin of the progress backend, e.g. ws://127.0.0.1:8000.
    #[arg(long, value_name = "WS_URL")]
    pub url: Option<String>,

    /// Play a local simulation instead of connecting to a backend.
    #[arg(long)]
    pub simulate: bool,

    /// Also write logs to ./tracker.log.
    #[arg(long)]
    pub log_file: bool,

    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    pub task_id: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    platform::run(args).await
}
