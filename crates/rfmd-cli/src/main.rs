use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rfmd_core::AppConfig;

mod commands;

#[derive(Parser)]
#[command(name = "rfmd")]
#[command(author, version, about = "A jailed remote file-management daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.config/rfmd/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the listen port
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Override the listen address
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Override the jail root directory
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in the foreground
    Serve,
    /// Send request lines to a running daemon over one session
    Send {
        /// Request lines, e.g. "cd /" "ls"
        #[arg(required = true)]
        lines: Vec<String>,
        /// Print frames as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check daemon status
    Status,
    /// Stop the running daemon
    Stop,
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::config_path);
    let mut config = AppConfig::load_from(&config_path)?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(root) = cli.root {
        config.jail.root = root;
    }

    // Initialize logging; RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = Arc::new(config);

    match cli.command {
        Commands::Serve => commands::daemon::serve(config).await,
        Commands::Send { lines, json } => commands::send::run(&config, &lines, json).await,
        Commands::Status => commands::daemon::status(&config).await,
        Commands::Stop => commands::daemon::stop(&config).await,
        Commands::Config { action } => match action {
            ConfigAction::Init { force } => commands::config::init(&config_path, force),
            ConfigAction::Show => commands::config::show(&config),
        },
    }
}
