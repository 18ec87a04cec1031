use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use escalateai_lib::commands;

#[derive(Parser)]
#[command(name = "escalateai", version)]
#[command(about = "Log customer escalations from a mailbox, score urgency, notify chat and ticketing")]
struct Cli {
    /// Config file (default: ~/.escalateai/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the mailbox and log new escalations
    Poll {
        /// Run a single fetch cycle and exit once its re-checks have fired
        #[arg(long)]
        once: bool,
    },
    /// Log an escalation by hand (body from --body or stdin)
    Ingest {
        /// Message body; read from stdin when omitted
        #[arg(long)]
        body: Option<String>,
        /// Stay running until the High-urgency re-check fires
        #[arg(long)]
        wait: bool,
    },
    /// List logged escalations
    List {
        /// CSV instead of a table
        #[arg(long)]
        csv: bool,
    },
    /// Mark an escalation Resolved
    Resolve {
        /// Escalation id
        id: i64,
    },
    /// Predict the resolution status for an urgency (Normal or High)
    Predict {
        urgency: String,
    },
    /// Validate configuration and show what is enabled
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Poll { once } => commands::poll(config, once).await,
        Commands::Ingest { body, wait } => commands::ingest(config, body, wait).await,
        Commands::List { csv } => commands::list(config, csv),
        Commands::Resolve { id } => commands::resolve(config, id).await,
        Commands::Predict { urgency } => commands::predict(config, &urgency).await,
        Commands::CheckConfig => commands::check_config(config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.failure() {
                Some(failure) => {
                    log::error!("{} stage failed: {}", failure.stage, failure.message);
                    eprintln!("error: {}\nhint: {}", failure.message, failure.recovery_suggestion);
                }
                None => eprintln!("error: {e}"),
            }
            ExitCode::FAILURE
        }
    }
}
