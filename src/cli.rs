use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "epg-merge")]
#[command(about = "Merge XMLTV guides from many sources into one document")]
#[command(version)]
pub struct Cli {
    /// Channel registry (JSON list, or {"channels": [...], "extra_epg": [...]})
    #[arg(default_value = "channels.json")]
    pub config: PathBuf,

    /// Where to write the merged guide
    #[arg(short, long, default_value = "epg.xml")]
    pub output: PathBuf,

    /// Per-source download timeout in seconds
    #[arg(long, default_value_t = 15)]
    pub timeout: u64,

    /// Number of concurrent downloads
    #[arg(short, long, default_value_t = 1)]
    pub jobs: usize,

    /// User-Agent header sent to upstream servers
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Do not tag programmes with the name of the source they came from
    #[arg(long)]
    pub no_provenance: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}
