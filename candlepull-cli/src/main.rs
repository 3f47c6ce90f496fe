//! candlepull CLI: download, plan, and instrument listing commands.
//!
//! Commands:
//! - `download`: fetch candles for every configured instrument into flat files
//! - `plan`: print the periods each instrument would request, without network access
//! - `instruments`: list the configured universe

use anyhow::{Context, Result};
use candlepull_core::data::{
    download_instruments, periods_for, IssClient, OutputSink, ReqwestTransport, TracingProgress,
};
use candlepull_core::DownloadConfig;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "candlepull",
    about = "Historical MOEX candle downloader"
)]
struct Cli {
    /// Path to a TOML config file. Defaults to the built-in MOEX universe.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download candles for the configured instruments.
    Download {
        /// Only download these tickers (futures by root, e.g. Si).
        #[arg(long, num_args = 1..)]
        only: Vec<String>,

        /// Output directory. Overrides the config file.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Stop remaining instruments after the first failure.
        #[arg(long, default_value_t = false)]
        cancel_on_failure: bool,
    },
    /// Print the periods each instrument would request.
    Plan {
        /// Only plan these tickers.
        #[arg(long, num_args = 1..)]
        only: Vec<String>,

        /// Treat this date (YYYY-MM-DD) as today. Defaults to the local date.
        #[arg(long)]
        today: Option<String>,
    },
    /// List the configured instruments.
    Instruments,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => DownloadConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DownloadConfig::default_moex(),
    };

    match cli.command {
        Commands::Download {
            only,
            output_dir,
            cancel_on_failure,
        } => {
            config.retain_tickers(&only)?;
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            config.cancel_on_failure |= cancel_on_failure;
            run_download(&config)
        }
        Commands::Plan { only, today } => {
            config.retain_tickers(&only)?;
            let today = match today {
                Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                    .with_context(|| format!("invalid --today '{s}'"))?,
                None => chrono::Local::now().date_naive(),
            };
            print_plan(&config, today);
            Ok(())
        }
        Commands::Instruments => {
            print_instruments(&config);
            Ok(())
        }
    }
}

fn run_download(config: &DownloadConfig) -> Result<()> {
    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "creating output directory {}",
            config.output_dir.display()
        )
    })?;

    let transport = ReqwestTransport::new(config.request_timeout())?;
    let client = IssClient::new(transport)
        .with_base_url(&config.base_url)
        .with_page_size(config.page_size);
    let sink = OutputSink::new(&config.output_dir);
    let today = chrono::Local::now().date_naive();

    let summary = download_instruments(
        &client,
        &sink,
        &config.instruments,
        today,
        &config.download_options(),
        &TracingProgress,
    )?;

    tracing::info!(
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        cancelled = summary.cancelled(),
        total = summary.total(),
        records = summary.records_written(),
        "download complete"
    );

    summary.into_result()?;
    Ok(())
}

fn print_plan(config: &DownloadConfig, today: NaiveDate) {
    for instrument in &config.instruments {
        let periods = periods_for(instrument, today);
        println!(
            "{} ({}, {}): {} period(s)",
            instrument.ticker,
            instrument.class,
            instrument.venue,
            periods.len()
        );
        for period in &periods {
            println!("  {:<8} {} {}", period.ticker, period.start, period.end);
        }
    }
}

fn print_instruments(config: &DownloadConfig) {
    println!(
        "{:<8} {:<11} {:<20} {:>5} {:>5}",
        "Ticker", "Class", "Venue", "From", "To"
    );
    println!("{}", "-".repeat(53));
    for inst in &config.instruments {
        println!(
            "{:<8} {:<11} {:<20} {:>5} {:>5}",
            inst.ticker,
            inst.class.to_string(),
            inst.venue.to_string(),
            inst.year_start,
            inst.year_end
        );
    }
    println!();
    println!("Output directory: {}", config.output_dir.display());
}
