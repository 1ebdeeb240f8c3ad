use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::analysis::{self, AnalysisSummary};
use crate::client::{ApiClient, HotSearchSource};
use crate::config::RunConfig;
use crate::error::{Stage, StageError};
use crate::fallback::PageScraper;
use crate::models::Snapshot;
use crate::report;
use crate::retry::fetch_with_retry;
use crate::saver::{self, SavedPaths};
use crate::utils::format_number;

const CONSOLE_TOP: usize = 10;

#[derive(Debug)]
pub struct RunOutcome {
    pub snapshot: Snapshot,
    pub summary: AnalysisSummary,
    pub paths: SavedPaths,
    pub report_path: PathBuf,
}

/// Runs one collection against the configured API and optional page fallback.
pub fn run(config: &RunConfig) -> Result<RunOutcome, StageError> {
    let client = ApiClient::new(&config.api_url, &config.api_key, config.limit, config.timeout)
        .map_err(|e| StageError::new(Stage::Config, e))?;

    let scraper = match &config.fallback_url {
        Some(url) => Some(
            PageScraper::new(url, config.limit, config.timeout)
                .map_err(|e| StageError::new(Stage::Config, e))?,
        ),
        None => None,
    };

    run_with_sources(
        config,
        &client,
        scraper.as_ref().map(|s| s as &dyn HotSearchSource),
        thread::sleep,
    )
}

/// Fetch, save, analyze and report with the given sources.
pub fn run_with_sources<S, F>(
    config: &RunConfig,
    primary: &S,
    fallback: Option<&dyn HotSearchSource>,
    sleep: F,
) -> Result<RunOutcome, StageError>
where
    S: HotSearchSource + ?Sized,
    F: FnMut(Duration),
{
    let total_start_time = Instant::now();
    info!(action = "start", component = "pipeline", source = primary.name(), fallback = fallback.is_some(), "Starting hot search collection");

    let snapshot = fetch_with_retry(primary, fallback, &config.retry, sleep)
        .map_err(|e| StageError::new(Stage::Fetch, e))?;
    if snapshot.is_empty() {
        warn!(action = "fetch", component = "pipeline", source = snapshot.source(), "Snapshot has no entries");
    }

    let paths = saver::save(&snapshot, &config.output_dir).map_err(|e| StageError::new(Stage::Save, e))?;

    let mut summary = analysis::analyze(&snapshot);
    if config.compare_previous {
        if let Some(trend) = previous_trend(config, &snapshot, &paths) {
            summary = summary.with_trend(trend);
        }
    }

    let html = report::render(&snapshot, &summary, &config.report)
        .map_err(|e| StageError::new(Stage::Report, e))?;
    let report_path = report::write_report(&paths.session_dir, &html)
        .map_err(|e| StageError::new(Stage::Report, e))?;

    info!(
        action = "complete",
        component = "pipeline",
        entry_count = snapshot.len(),
        report_path = ?report_path,
        duration_ms = total_start_time.elapsed().as_millis(),
        "Collection completed successfully"
    );

    Ok(RunOutcome {
        snapshot,
        summary,
        paths,
        report_path,
    })
}

/// The trend is optional: an unreadable earlier snapshot only costs the comparison.
fn previous_trend(
    config: &RunConfig,
    snapshot: &Snapshot,
    paths: &SavedPaths,
) -> Option<analysis::TrendSummary> {
    let previous_path = saver::find_previous(&config.output_dir, &paths.json_path)?;
    match saver::load_json(&previous_path, snapshot.source()) {
        Ok(previous) => {
            info!(action = "compare", component = "pipeline", previous = ?previous_path, "Comparing with previous snapshot");
            Some(analysis::compare(snapshot, &previous))
        }
        Err(e) => {
            warn!(action = "compare", component = "pipeline", previous = ?previous_path, error = %e, "Cannot load previous snapshot");
            None
        }
    }
}

pub fn print_run_summary(outcome: &RunOutcome) {
    let snapshot = &outcome.snapshot;
    let summary = &outcome.summary;

    println!("\n--- Hot Search Digest ({}) ---", snapshot.fetched_at().format("%Y-%m-%d %H:%M"));
    println!("Source: {}", snapshot.source());
    println!("Entries: {}", summary.total_entries);
    println!("JSON: {}", outcome.paths.json_path.display());
    println!("CSV: {}", outcome.paths.csv_path.display());
    println!("Report: {}", outcome.report_path.display());

    if snapshot.is_empty() {
        println!("\nNo hot search entries were returned.");
        return;
    }

    println!(
        "Heat: max {}, average {}, min {}",
        format_number(summary.heat.max),
        format_number(summary.heat.mean.round() as u64),
        format_number(summary.heat.min)
    );
    println!("Categories: {}", summary.categories.len());

    println!("\nTop {} hot searches:", snapshot.top(CONSOLE_TOP).len());
    for entry in snapshot.top(CONSOLE_TOP) {
        let mut line = format!("{:>2}. {}", entry.rank(), entry.term());
        if entry.heat() > 0 {
            line.push_str(&format!(" (heat {})", format_number(entry.heat())));
        }
        if let Some(category) = entry.category() {
            line.push_str(&format!(" [{}]", category));
        }
        println!("{}", line);
    }
}
