pub mod analysis;
pub mod args;
pub mod client;
pub mod config;
pub mod error;
pub mod fallback;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod saver;
pub mod utils;

pub use analysis::{analyze, AnalysisSummary};
pub use args::Args;
pub use client::{ApiClient, HotSearchSource};
pub use config::RunConfig;
pub use error::{CrawlError, Stage, StageError};
pub use models::{HotSearchEntry, Snapshot};
pub use pipeline::{print_run_summary, run, run_with_sources, RunOutcome};
pub use report::{render, ReportOptions};
pub use retry::{fetch_with_retry, RetryPolicy};
pub use saver::{save, SavedPaths};
