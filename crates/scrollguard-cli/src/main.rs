mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{
    config::show_config,
    daemon::{
        force_warn, restart_daemon, run_daemon_process, show_status, start_daemon, stop_daemon,
    },
};
use scrollguard_core::config::get_data_dir;

#[derive(Parser)]
#[command(name = "scrollguard")]
#[command(
    about = "Escalating warnings while you stay in attention-draining apps",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the monitoring daemon
    Start,
    /// (Internal) Run the daemon process
    #[command(hide = true)]
    DaemonInternalStart,
    /// Stop the monitoring daemon
    Stop,
    /// Show the current session and daemon counters
    Status {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget the current session without stopping the daemon
    Restart,
    /// Send an immediate warning for an app, to check notifications work
    ForceWarn {
        /// Application ID, e.g. com.instagram.android
        app_id: String,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if !matches!(cli.command, Commands::DaemonInternalStart) {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_secs()
            .init();
    }

    let data_dir = get_data_dir()?;

    match cli.command {
        Commands::Start => start_daemon(&data_dir),
        Commands::DaemonInternalStart => run_daemon_process(&data_dir).await,
        Commands::Stop => stop_daemon(&data_dir).await,
        Commands::Status { json } => show_status(&data_dir, json).await,
        Commands::Restart => restart_daemon(&data_dir).await,
        Commands::ForceWarn { app_id } => force_warn(&data_dir, app_id).await,
        Commands::Config => show_config(),
    }
}
