use anyhow::Result;
use clap::{Parser, Subcommand};
use kiosk_watch::commands::{check, run, send, status};
use kiosk_watch::config::DEFAULT_CONFIG_FILE;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kiosk-watch")]
#[command(about = "Process supervisor for terminal kiosk modules", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start and watch the configured modules
    Run {
        /// One-shot arguments for a module's first start (NAME=ARGS, repeatable)
        #[arg(long = "module-options", value_name = "NAME=ARGS")]
        module_options: Vec<String>,
    },

    /// Send a command to the running watch service
    Send {
        /// Message type (start_module, close_module, restart, close_logs, close, exit,
        /// reboot, shutdown, show_splash_screen, hide_splash_screen, set_state, reset_state)
        kind: String,

        /// Target module for start_module / close_module
        #[arg(short, long)]
        module: Option<String>,

        /// Parameters passed along with the command
        #[arg(short, long)]
        params: Option<String>,

        /// Sender name put into the message
        #[arg(short, long, default_value = send::DEFAULT_SENDER)]
        sender: String,
    },

    /// Show whether the watch service is running
    Status,

    /// Validate the configuration and print the module table
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { module_options } => run::execute(&cli.config, &module_options),
        Commands::Send {
            kind,
            module,
            params,
            sender,
        } => send::execute(
            &cli.config,
            &kind,
            module.as_deref(),
            params.as_deref(),
            &sender,
        ),
        Commands::Status => status::execute(&cli.config),
        Commands::Check => check::execute(&cli.config),
    }
}
