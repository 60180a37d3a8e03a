//! examdesk CLI: take timed exams from the terminal.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use examdesk_core::model::{AttemptId, ExamId};

mod commands;

#[derive(Parser)]
#[command(name = "examdesk", version, about = "Take timed exams against a grading backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start or resume an exam attempt
    Take {
        /// Exam identifier
        #[arg(long)]
        exam: ExamId,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the graded result of a submitted attempt
    Result {
        /// Attempt identifier
        #[arg(long)]
        attempt: AttemptId,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create a starter config
    Init,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("examdesk=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Take { exam, config } => commands::take::execute(exam, config).await,
        Commands::Result {
            attempt,
            format,
            config,
        } => commands::result::execute(attempt, format, config).await,
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
