//! Luminous CLI, the main entry point.
//!
//! Commands:
//! - `onboard`  Write a default config file
//! - `chat`     Interactive or single-message chat against the stored session
//! - `serve`    Start the HTTP relay and the reflection scheduler
//! - `reflect`  Run one autonomous reflection now
//! - `status`   Show config and stored session summary
//! - `reset`    Replace the stored session with the persona seed

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "luminous",
    about = "Luminous: a tool-calling LLM relay with a persistent self-model",
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
    /// Write a default configuration file
    Onboard,

    /// Chat with Luminous
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Start the HTTP relay
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run one autonomous reflection against the stored session
    Reflect,

    /// Show configuration and stored session summary
    Status,

    /// Discard the stored session and start over from the persona seed
    Reset,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat { message } => commands::chat::run(message, cli.verbose).await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Reflect => commands::reflect::run().await?,
        Commands::Status => commands::status::run().await?,
        Commands::Reset => commands::reset::run().await?,
    }

    Ok(())
}
