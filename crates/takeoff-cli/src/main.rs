mod commands;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "takeoff",
    version,
    about = "Lighting-fixture takeoff from electrical construction drawings"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full takeoff pipeline: classify pages, parse the schedule,
    /// count fixtures and keynotes, and report confidence
    Analyze {
        /// Path to a multi-page PDF or a folder of single-page PDFs
        input: PathBuf,

        /// Output format: table (default) or json
        #[arg(short, long, default_value = "table")]
        output: String,

        /// Confidence threshold for the pass/fail verdict
        #[arg(short, long)]
        threshold: Option<f32>,

        /// Force vision-based counting (requires a vision provider)
        #[arg(long)]
        vision_count: bool,

        /// Parameter overrides as key=value (e.g. keynotes.max_number=30)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },
    /// Load a drawing set and print how each page classifies
    Sheets {
        /// Path to a multi-page PDF or a folder of single-page PDFs
        input: PathBuf,

        /// Output format: table (default) or json
        #[arg(short, long, default_value = "table")]
        output: String,
    },
    /// Extract the luminaire schedule only (no counting)
    Schedule {
        /// Path to a multi-page PDF or a folder of single-page PDFs
        input: PathBuf,

        /// Output format: table (default) or json
        #[arg(short, long, default_value = "table")]
        output: String,
    },
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Analyze {
            input,
            output,
            threshold,
            vision_count,
            set,
        } => commands::analyze::run(input, &output, threshold, vision_count, set),
        Commands::Sheets { input, output } => commands::sheets::run(input, &output),
        Commands::Schedule { input, output } => commands::schedule::run(input, &output),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
