use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "pomoledger", version, about = "Pomodoro work tracker")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive pomodoro shell (the default)
    Shell,
    /// Open the shell with a focus interval already running
    Start {
        /// Project to work on
        project: String,
    },
    /// Project management
    Project {
        #[command(subcommand)]
        action: commands::project::ProjectAction,
    },
    /// Recently recorded sessions
    History {
        /// Number of sessions to show
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("POMOLEDGER_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command.unwrap_or(Commands::Shell) {
        Commands::Shell => commands::shell::run(None),
        Commands::Start { project } => commands::shell::run(Some(project)),
        Commands::Project { action } => commands::project::run(action),
        Commands::History { limit, json } => commands::history::run(limit, json),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
