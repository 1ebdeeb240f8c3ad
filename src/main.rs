use clap::Parser;
use tracing::error;

use hotsearch_digest::error::{Stage, StageError};
use hotsearch_digest::{print_run_summary, run, utils, Args, RunConfig};

fn main() {
    // A missing .env file is fine; the key may come from the real environment.
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    utils::setup_logging(args.verbose);

    let result = RunConfig::from_args(&args)
        .map_err(|e| StageError::new(Stage::Config, e))
        .and_then(|config| run(&config));

    match result {
        Ok(outcome) => print_run_summary(&outcome),
        Err(e) => {
            error!(action = "failed", component = "main", kind = e.kind(), stage = %e.stage, "Run failed");
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
