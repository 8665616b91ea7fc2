//! ragachat CLI: the main entry point.
//!
//! Commands:
//! - `init`: Write a default config
//! - `serve`: Start the HTTP API server
//! - `ingest`: Load documents into the knowledge base
//! - `ask`: Ask a question in a session
//! - `sessions`: Create or list sessions

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "ragachat",
    about = "ragachat: retrieval-augmented chat",
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
    Init,

    /// Start the HTTP API server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ingest .txt and .md files into the knowledge base
    Ingest {
        /// Directory to read (defaults to knowledge.source_dir)
        dir: Option<PathBuf>,
    },

    /// Ask a question in a session and stream the answer
    Ask {
        /// Session id
        #[arg(short, long)]
        session: i64,

        /// Sender label stored with the question
        #[arg(long, default_value = "user", env = "RAGACHAT_SENDER")]
        sender: String,

        /// The question
        question: String,
    },

    /// Manage chat sessions
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Create a new session
    Create {
        #[arg(short, long)]
        user: String,

        #[arg(short, long, default_value = "New chat")]
        title: String,
    },

    /// List a user's sessions, most recent first
    List {
        #[arg(short, long)]
        user: String,
    },
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
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Ingest { dir } => commands::ingest::run(dir).await?,
        Commands::Ask {
            session,
            sender,
            question,
        } => commands::ask::run(session, sender, question).await?,
        Commands::Sessions { action } => match action {
            SessionAction::Create { user, title } => {
                commands::sessions::create(&user, &title).await?
            }
            SessionAction::List { user } => commands::sessions::list(&user).await?,
        },
    }

    Ok(())
}
