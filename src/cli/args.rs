use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "wx-pipeline")]
#[command(about = "Hourly weather forecast ingestion, aggregation and enrichment")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Settings file (TOML)")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Root directory for stored datasets")]
    pub base_path: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download the current forecast and ingest it
    Fetch,

    /// Ingest a local payload file (gzip or plain JSON)
    Ingest {
        #[arg(short, long, help = "Payload file")]
        input: PathBuf,
    },

    /// Recompute per-municipality averages over the trailing window
    Aggregate {
        #[arg(short, long, help = "Window length in minutes [default: 120]")]
        window_minutes: Option<u64>,
    },

    /// Join the current snapshot with the municipality reference table
    Merge {
        #[arg(short, long, help = "Reference CSV [default: {base_path}/current/raw_data_merge.csv]")]
        aux: Option<PathBuf>,
    },

    /// Fetch, aggregate and merge with retries
    Run,

    /// Display information about a stored dataset
    Info {
        #[arg(short, long, help = "Dataset name, e.g. raw/historical")]
        dataset: String,

        #[arg(short, long, default_value = "0")]
        sample: usize,
    },
}

impl Cli {
    /// Settings keys set from the command line
    pub fn overrides(&self) -> Vec<(&'static str, String)> {
        let mut overrides = Vec::new();
        if let Some(base_path) = &self.base_path {
            overrides.push(("base_path", base_path.display().to_string()));
        }
        match &self.command {
            Commands::Aggregate {
                window_minutes: Some(minutes),
            } => overrides.push(("window_minutes", minutes.to_string())),
            Commands::Merge { aux: Some(aux) } => {
                overrides.push(("aux_path", aux.display().to_string()))
            }
            _ => {}
        }
        overrides
    }
}
