mod commands;
mod config;
mod session;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use config::AppConfig;
use session::AppSession;

#[derive(Parser, Debug)]
#[command(about = "Live state and history for boat telemetry")]
struct Cli {
    /// Use in-memory stores instead of the data directory
    #[arg(long, global = true)]
    ephemeral: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Replay recorded samples (one JSON object per line)
    Ingest { file: PathBuf },
    /// Print the live state
    State,
    Anchor {
        #[command(subcommand)]
        action: AnchorAction,
    },
    Distance {
        #[command(subcommand)]
        action: DistanceAction,
    },
    /// Write durable history as CSV
    Export {
        out: PathBuf,
        /// RFC 3339 lower bound
        #[arg(long)]
        since: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum AnchorAction {
    Set,
    Clear,
    Remove,
}

#[derive(Subcommand, Debug)]
enum DistanceAction {
    Reset,
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let session = AppSession::open(AppConfig::from_env(), cli.ephemeral).await?;

    match cli.cmd {
        Cmd::Ingest { file } => commands::ingest_file(&session, &file).await,
        Cmd::State => commands::show_state(&session).await,
        Cmd::Anchor { action: AnchorAction::Set } => commands::set_anchor(&session).await,
        Cmd::Anchor { action: AnchorAction::Clear } => commands::clear_anchor(&session).await,
        Cmd::Anchor { action: AnchorAction::Remove } => commands::remove_anchor(&session).await,
        Cmd::Distance { action: DistanceAction::Reset } => {
            commands::reset_distance(&session).await
        }
        Cmd::Distance { action: DistanceAction::Clear } => {
            commands::clear_distance(&session).await
        }
        Cmd::Export { out, since } => commands::export(&session, &out, since.as_deref()).await,
    }
}
