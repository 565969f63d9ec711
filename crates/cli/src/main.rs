//! Taskwright CLI, the main entry point.
//!
//! Commands:
//! - `serve`: Long-lived line-protocol process on stdin/stdout
//! - `run`: Execute a single task and print the answer
//! - `chat`: Interactive mode with lesson suggestions
//! - `lessons`: List, add and search stored lessons
//!
//! Logs always go to stderr; stdout carries answers and protocol lines.

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "taskwright",
    about = "Taskwright: an autonomous task agent that learns lessons",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Override the agent role used for ROLE lessons
    #[arg(long, global = true, env = "TASKWRIGHT_ROLE")]
    role: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve line-delimited JSON requests on stdin/stdout
    Serve,

    /// Run a single task
    Run {
        /// The task to execute
        #[arg(short, long)]
        prompt: String,
    },

    /// Interactive chat
    Chat,

    /// Manage stored lessons
    Lessons {
        #[command(subcommand)]
        action: commands::lessons::LessonsCommand,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let mut config = commands::load_config()?;
    if cli.role.is_some() {
        config.agent.role = cli.role;
    }

    match cli.command {
        Commands::Serve => commands::serve::run(&config).await?,
        Commands::Run { prompt } => commands::run::run(&config, &prompt).await?,
        Commands::Chat => commands::chat::run(&config).await?,
        Commands::Lessons { action } => commands::lessons::run(&config, action).await?,
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
