mod cmd;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

use lexsum::client::DatasetId;
use lexsum::config::Config;

#[derive(Parser)]
#[command(name = "lexsum")]
#[command(version, about = "Client for a remote legal-document summarization pipeline")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Base URL of the pipeline service (overrides LEXSUM_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit a document or dataset slice and watch it to completion
    Run {
        /// Path to a document to upload (upload mode)
        #[arg(long, conflicts_with = "dataset")]
        file: Option<PathBuf>,

        /// Dataset to summarize from (dataset mode)
        #[arg(long, value_enum)]
        dataset: Option<DatasetId>,

        /// Number of dataset entries to process
        #[arg(short = 'n', long = "entries", default_value = "1")]
        entries: u32,

        /// Specific entry id; a positive id overrides the entry count
        #[arg(long)]
        entry_id: Option<i64>,
    },
    /// Query the status of an existing session once and exit
    Status {
        /// Session id returned when the job was submitted
        session_id: String,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::new(cli.api_url, cli.verbose);

    match cli.command {
        Commands::Run {
            file,
            dataset,
            entries,
            entry_id,
        } => cmd::run::run(&config, file, dataset, entries, entry_id).await,
        Commands::Status { session_id } => cmd::status::run(&config, &session_id).await,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
