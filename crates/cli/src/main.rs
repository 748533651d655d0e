//! mathtutor CLI: the main entry point.
//!
//! Commands:
//! - `serve`   — Start the HTTP gateway
//! - `ask`     — Ask one question and stream the reply
//! - `topics`  — List the topic table
//! - `init`    — Write a default config file
//! - `config`  — Show the effective configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "mathtutor",
    about = "mathtutor — a retrieval-augmented math tutor",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ask the tutor a single question
    Ask {
        /// Topic to study
        #[arg(short, long, default_value = "linear equations")]
        topic: String,

        /// Session id (history is kept per session)
        #[arg(short, long, default_value = "cli")]
        session: String,

        /// The question
        message: String,
    },

    /// List available topics
    Topics,

    /// Write a default config file if none exists
    Init,

    /// Show the effective configuration (secrets redacted)
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Ask {
            topic,
            session,
            message,
        } => commands::ask::run(topic, session, message).await?,
        Commands::Topics => commands::topics::run()?,
        Commands::Init => commands::init::run()?,
        Commands::Config => commands::config_cmd::run()?,
    }

    Ok(())
}
