use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::Context;

#[derive(Parser)]
#[command(name = "replay-cli", version, about = "Replay weekly progress CLI")]
struct Cli {
    /// User the command acts on
    #[arg(long, global = true, env = "REPLAY_USER")]
    user: Option<String>,
    /// Database file (defaults to the data directory)
    #[arg(long, global = true, env = "REPLAY_DB")]
    db: Option<PathBuf>,
    /// Config file (defaults to the data directory)
    #[arg(long, global = true, env = "REPLAY_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Journal entry lifecycle events
    Journal {
        #[command(subcommand)]
        action: commands::journal::JournalAction,
    },
    /// Meditation lifecycle events
    Meditation {
        #[command(subcommand)]
        action: commands::meditation::MeditationAction,
    },
    /// Weekly progress reads and recompute
    Progress {
        #[command(subcommand)]
        action: commands::progress::ProgressAction,
    },
    /// Weekly report dispatch
    Report {
        #[command(subcommand)]
        action: commands::report::ReportAction,
    },
    /// User profile settings
    Profile {
        #[command(subcommand)]
        action: commands::profile::ProfileAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    // stderr keeps stdout clean for JSON output.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "replay_core=info,replay_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let ctx = Context {
        user: cli.user,
        db: cli.db,
        config: cli.config,
    };
    let result = match cli.command {
        Commands::Journal { action } => commands::journal::run(&ctx, action),
        Commands::Meditation { action } => commands::meditation::run(&ctx, action),
        Commands::Progress { action } => commands::progress::run(&ctx, action),
        Commands::Report { action } => commands::report::run(&ctx, action),
        Commands::Profile { action } => commands::profile::run(&ctx, action),
        Commands::Config { action } => commands::config::run(&ctx, action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
