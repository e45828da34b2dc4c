//! EPG Merge - combine XMLTV guides from many sources into one document

// Use mimalloc for faster memory allocation (Linux, macOS)
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod epg;
mod error;
mod fetch;

use cli::Cli;
use config::MergeConfig;
use epg::AssembleOptions;
use error::Result;
use fetch::{DownloadConfig, HttpFetcher};

fn init_logging(verbose: bool) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(
            match verbose {
                true => LevelFilter::DEBUG,
                _ => LevelFilter::INFO,
            }
            .into(),
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_writer(std::io::stdout)
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let config = MergeConfig::load(&cli.config)?;
    info!(
        channels = config.channels.len(),
        extra = config.extra_epg.len(),
        "Loaded {}",
        cli.config.display()
    );

    let mut download = DownloadConfig { timeout_secs: cli.timeout, ..DownloadConfig::default() };
    if let Some(user_agent) = &cli.user_agent {
        download.user_agent = user_agent.clone();
    }
    let fetcher = HttpFetcher::new(download);

    let options = AssembleOptions { provenance: !cli.no_provenance };
    let stats = epg::merge_to_file(&config, &fetcher, cli.jobs, options, &cli.output)?;

    info!(
        sources = config.source_count(),
        failed = stats.sources_failed,
        programmes = stats.programmes,
        duplicates = stats.duplicates,
        "Merged EPG written to {}",
        cli.output.display()
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
