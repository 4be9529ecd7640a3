//! allfiles CLI - filter an ALL_FILES listing and mirror it over HTTP
//!
//! `ls` prints what a filter keeps, `dl` downloads it into a local tree.

mod commands;
mod config;
mod output;
mod progress;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::FileConfig;

/// allfiles - work with recursive `ls -lR` style listings
#[derive(Parser)]
#[command(name = "allfiles")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Listing to read [default: ALL_FILES]
    #[arg(short, long, env = "ALLFILES_FILE")]
    file: Option<PathBuf>,

    /// JSON file with option defaults, read when present
    #[arg(long, default_value = "allfiles.json", env = "ALLFILES_CONFIG")]
    config: PathBuf,

    /// Debug logging
    #[arg(long)]
    debug: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "human")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List the files a filter keeps
    Ls {
        #[command(flatten)]
        filter: FilterArgs,

        /// Print the total size at the end
        #[arg(short, long)]
        totals: bool,

        /// Print the size of every file
        #[arg(short, long)]
        size: bool,
    },

    /// Download the files a filter keeps
    Dl {
        #[command(flatten)]
        filter: FilterArgs,

        #[command(flatten)]
        download: DownloadArgs,
    },

    /// Show the known file types, or the type of each given extension
    Types {
        /// Extensions to look up
        exts: Vec<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

/// Entry filters shared by `ls` and `dl`
#[derive(Args, Debug, Default, Clone)]
pub struct FilterArgs {
    /// Minimum file size, 0 keeps empty files [default: 1]
    #[arg(long)]
    pub min_size: Option<String>,

    /// Maximum file size, 0 is unlimited
    #[arg(long)]
    pub max_size: Option<String>,

    /// Only these extensions
    #[arg(short = 'e', long = "exts", value_delimiter = ',')]
    pub exts: Vec<String>,

    /// Never these extensions
    #[arg(short = 'x', long = "exclude-exts", value_delimiter = ',')]
    pub exclude_exts: Vec<String>,

    /// Only directories starting with these prefixes
    #[arg(short = 'p', long = "paths", value_delimiter = ',')]
    pub paths: Vec<String>,

    /// Never directories starting with these prefixes
    #[arg(short = 'q', long = "exclude-paths", value_delimiter = ',')]
    pub exclude_paths: Vec<String>,

    /// Only these file types (see `allfiles types`)
    #[arg(long, value_delimiter = ',')]
    pub types: Vec<String>,

    /// Never these file types
    #[arg(long, value_delimiter = ',')]
    pub exclude_types: Vec<String>,
}

/// Download options for `dl`
#[derive(Args, Debug, Default, Clone)]
pub struct DownloadArgs {
    /// Base URL the listing was taken from
    #[arg(short, long)]
    pub url: Option<String>,

    /// Directory to mirror into [default: ./data]
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Proxy for every request
    #[arg(long)]
    pub proxy: Option<String>,

    /// Request timeout in seconds, 0 waits forever
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Parallel downloads [default: 1]
    #[arg(long)]
    pub threads: Option<usize>,

    /// Consecutive failures after which a worker gives up, 0 never [default: 1]
    #[arg(short = 'w', long)]
    pub warn_as_error_limit: Option<u32>,

    /// Attempts per file [default: 3]
    #[arg(long)]
    pub retries: Option<u32>,

    /// Base delay between attempts in seconds [default: 5]
    #[arg(long)]
    pub retry_delay: Option<u64>,

    /// Treat non-2xx responses as failures
    #[arg(long)]
    pub strict_status: bool,
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let file_config = FileConfig::load(&cli.config)?;
    let debug = cli.debug || file_config.debug.unwrap_or(false);
    init_tracing(debug);

    let manifest = config::manifest_path(cli.file.as_ref(), &file_config);

    match cli.command {
        Commands::Ls { filter, totals, size } => {
            let settings = config::filter_settings(&filter, &file_config);
            commands::list_files(&manifest, &settings, totals, size, cli.output).await?;
        }

        Commands::Dl { filter, download } => {
            let settings = config::filter_settings(&filter, &file_config);
            let run = config::download_settings(&download, &file_config)?;
            commands::download_files(&manifest, &settings, run, !debug, cli.output).await?;
        }

        Commands::Types { exts } => {
            commands::list_types(&exts, cli.output)?;
        }

        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "allfiles", &mut std::io::stdout());
        }
    }

    Ok(())
}
