//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod init;
mod scrape;
mod tenders;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};
use crate::scrapers::FetchEngine;

use scrape::ScrapeArgs;
use tenders::OutputFormat;

#[derive(Parser)]
#[command(name = "tenderscout")]
#[command(about = "Public procurement tender ingestion pipeline")]
#[command(version)]
pub struct Cli {
    /// Target directory or database file (overrides config file).
    /// Can be a directory containing tenderscout.db or a .db file directly.
    #[arg(long, short = 't', global = true)]
    target: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve relative paths from current working directory instead of config file location
    #[arg(long, global = true)]
    cwd: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Fetch recently published tenders and store them
    Scrape {
        /// Look back this many days from today
        #[arg(long)]
        days_back: Option<u32>,
        /// Stop after this many pages
        #[arg(long)]
        max_pages: Option<u32>,
        /// Records requested per page
        #[arg(long)]
        page_size: Option<u32>,
        /// Only tenders with this CPV code
        #[arg(long = "cpv")]
        cpv_code: Option<String>,
        /// Fetch engine: http or browser
        #[arg(long)]
        engine: Option<FetchEngine>,
        /// Run continuously on a schedule
        #[arg(long)]
        daemon: bool,
        /// Seconds between runs in daemon mode (default: 7200)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// List stored tenders
    Ls {
        /// Case-insensitive match on id, name, description or authority
        #[arg(short, long)]
        search: Option<String>,
        /// Sort field, prefix with - for descending
        #[arg(short, long, default_value = "-publication_date", allow_hyphen_values = true)]
        order: String,
        /// Maximum rows
        #[arg(short, long, default_value = "50")]
        limit: i64,
        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Show one stored tender as JSON
    Show {
        /// Upstream tender identifier
        tender_id: String,
    },

    /// Show system status
    Status,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        use_cwd: cli.cwd,
        data: cli.target,
    };
    let (settings, _config) = load_settings_with_options(options).await;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Scrape {
            days_back,
            max_pages,
            page_size,
            cpv_code,
            engine,
            daemon,
            interval,
        } => {
            scrape::cmd_scrape(
                &settings,
                ScrapeArgs {
                    days_back,
                    max_pages,
                    page_size,
                    cpv_code,
                    engine,
                    daemon,
                    interval,
                },
            )
            .await
        }
        Commands::Ls {
            search,
            order,
            limit,
            format,
        } => tenders::cmd_ls(&settings, search, &order, limit, format).await,
        Commands::Show { tender_id } => tenders::cmd_show(&settings, &tender_id).await,
        Commands::Status => tenders::cmd_status(&settings).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_scrape_flags() {
        let cli = Cli::try_parse_from([
            "tenderscout",
            "-v",
            "scrape",
            "--days-back",
            "3",
            "--engine",
            "browser",
            "--cpv",
            "45000000-7",
            "--daemon",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Scrape {
                days_back,
                engine,
                cpv_code,
                daemon,
                interval,
                ..
            } => {
                assert_eq!(days_back, Some(3));
                assert_eq!(engine, Some(FetchEngine::Browser));
                assert_eq!(cpv_code.as_deref(), Some("45000000-7"));
                assert!(daemon);
                assert_eq!(interval, None);
            }
            _ => panic!("expected scrape"),
        }
    }

    #[test]
    fn test_parse_ls_descending_order() {
        let cli = Cli::try_parse_from(["tenderscout", "ls", "--order", "-created_at"]).unwrap();
        match cli.command {
            Commands::Ls { order, limit, .. } => {
                assert_eq!(order, "-created_at");
                assert_eq!(limit, 50);
            }
            _ => panic!("expected ls"),
        }
    }
}
