pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use crate::crawler::TaskPriority;
use crate::utils::default_log_file;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to a file (`--log-file=PATH`); without a path the per-user data dir is used
    #[arg(long, global = true, num_args = 0..=1, require_equals = true)]
    pub log_file: Option<Option<PathBuf>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the given URLs until the queue drains, then print the status
    Crawl {
        /// Target URLs
        #[arg(required = true)]
        urls: Vec<String>,

        /// Priority for every submitted URL
        #[arg(short, long, value_enum, default_value_t = TaskPriority::Normal)]
        priority: TaskPriority,

        /// Override the concurrency ceiling
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Configuration file to use instead of the default one
        #[arg(long)]
        config: Option<PathBuf>,

        /// Redis URL for persisted last-crawl times; enables incremental crawling
        #[arg(long)]
        redis: Option<String>,

        /// Fetch through the remote browser service
        #[arg(long)]
        remote: bool,
    },

    /// Show the active configuration
    Config {
        /// Write the default configuration file
        #[arg(long)]
        init: bool,
    },
}

impl Cli {
    /// Log file to write, if any
    pub fn log_destination(&self) -> Option<PathBuf> {
        self.log_file
            .clone()
            .map(|path| path.unwrap_or_else(default_log_file))
    }
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Crawl { urls, priority, concurrency, config, redis, remote } => {
            info!("Starting crawl of {} URLs with priority {}", urls.len(), priority);
            let options = commands::CrawlOptions { priority, concurrency, config, redis, remote };
            commands::crawl(urls, options).await
        },
        Commands::Config { init } => {
            if init {
                info!("Writing default configuration");
                commands::init_config().await
            } else {
                info!("Showing current configuration");
                commands::show_config().await
            }
        },
    }
}
