use std::path::PathBuf;
use std::time::Duration;

use crate::args::Args;
use crate::error::CrawlError;
use crate::report::ReportOptions;
use crate::retry::RetryPolicy;

/// Everything one run needs, built once and passed down explicitly.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub api_url: String,
    pub api_key: String,
    pub fallback_url: Option<String>,
    pub limit: usize,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub output_dir: PathBuf,
    pub report: ReportOptions,
    pub compare_previous: bool,
}

impl RunConfig {
    pub fn from_args(args: &Args) -> Result<Self, CrawlError> {
        let api_key = args
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                CrawlError::Configuration(
                    "no API key: set XIAOHONGSHU_API_KEY or pass --api-key".to_string(),
                )
            })?
            .to_string();

        if args.limit == 0 {
            return Err(CrawlError::Configuration("--limit must be greater than 0".to_string()));
        }
        if args.top == 0 {
            return Err(CrawlError::Configuration("--top must be greater than 0".to_string()));
        }
        if args.timeout == 0 {
            return Err(CrawlError::Configuration("--timeout must be greater than 0".to_string()));
        }
        if args.max_attempts == 0 {
            return Err(CrawlError::Configuration(
                "--max-attempts must be greater than 0".to_string(),
            ));
        }

        let fallback_url = args
            .fallback_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string);

        Ok(Self {
            api_url: args.api_url.clone(),
            api_key,
            fallback_url,
            limit: args.limit,
            timeout: Duration::from_secs(args.timeout),
            retry: RetryPolicy {
                max_attempts: args.max_attempts,
                backoff: Duration::from_secs(args.backoff),
            },
            output_dir: args.output_dir.clone(),
            report: ReportOptions {
                top_n: args.top,
                include_deep_analysis: !args.no_deep_analysis,
            },
            compare_previous: !args.no_trend,
        })
    }
}
