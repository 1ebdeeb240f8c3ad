use clap::Parser;
use std::path::PathBuf;

use crate::client::DEFAULT_API_URL;

#[derive(Parser, Debug)]
#[command(
    name = "hotsearch",
    about = "Fetch today's hot search list, save it as JSON/CSV and render an HTML digest",
    version,
    long_about = None
)]
pub struct Args {
    /// API key for the hot search data API
    #[arg(long, env = "XIAOHONGSHU_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Hot search API endpoint
    #[arg(long, default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Page to scrape when the API keeps failing
    #[arg(long, env = "HOTSEARCH_FALLBACK_URL")]
    pub fallback_url: Option<String>,

    /// Root directory for crawl data and reports
    #[arg(short, long, default_value = "output")]
    pub output_dir: PathBuf,

    /// Number of entries to request
    #[arg(short, long, default_value_t = 50)]
    pub limit: usize,

    /// Number of entries to list in the report
    #[arg(short, long, default_value_t = 20)]
    pub top: usize,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Attempts against the API before giving up or falling back
    #[arg(long, default_value_t = 3)]
    pub max_attempts: u32,

    /// Seconds to wait between failed attempts
    #[arg(long, default_value_t = 3)]
    pub backoff: u64,

    /// Leave the analysis section out of the report
    #[arg(long)]
    pub no_deep_analysis: bool,

    /// Skip comparing against the previous snapshot
    #[arg(long)]
    pub no_trend: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
