use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "skylark", about = "Flight narration companion tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze narration duration predictions from the server log
    LatencyReport {
        /// Log file to analyze
        #[arg(long, default_value = "logs/server.log")]
        log_file: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::LatencyReport { log_file } => {
            let report = skylark::latency_report::run(&log_file)?;
            print!("{report}");
        }
    }
    Ok(())
}
