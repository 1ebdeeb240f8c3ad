use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Every failure the collector can surface.
///
/// `Timeout` and `Upstream` are the only retryable kinds; everything else is
/// fatal for the run.
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("request timed out after {timeout_ms}ms: {detail}")]
    Timeout { timeout_ms: u64, detail: String },

    #[error("upstream failure{}: {detail}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Upstream { status: Option<u16>, detail: String },

    #[error("fetch gave up after {attempts} attempt(s), last error: {last}")]
    FetchExhausted {
        attempts: u32,
        #[source]
        last: Box<CrawlError>,
    },

    #[error("filesystem error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot render report: {0}")]
    Template(String),
}

impl CrawlError {
    pub fn upstream(status: Option<u16>, detail: impl Into<String>) -> Self {
        CrawlError::Upstream {
            status,
            detail: detail.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CrawlError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable kind name printed on the error stream.
    pub fn kind(&self) -> &'static str {
        match self {
            CrawlError::Configuration(_) => "ConfigurationError",
            CrawlError::Timeout { .. } => "TimeoutError",
            CrawlError::Upstream { .. } => "UpstreamError",
            CrawlError::FetchExhausted { .. } => "FetchExhaustedError",
            CrawlError::Io { .. } => "IOError",
            CrawlError::Template(_) => "TemplateError",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, CrawlError::Timeout { .. } | CrawlError::Upstream { .. })
    }

    /// Maps a transport error from `reqwest` onto the taxonomy.
    pub(crate) fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            CrawlError::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                detail: err.to_string(),
            }
        } else {
            CrawlError::Upstream {
                status: err.status().map(|s| s.as_u16()),
                detail: err.to_string(),
            }
        }
    }
}

/// Pipeline step at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Fetch,
    Save,
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Config => "config",
            Stage::Fetch => "fetch",
            Stage::Save => "save",
            Stage::Report => "report",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
#[error("{} during {stage} stage: {source}", .source.kind())]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: CrawlError,
}

impl StageError {
    pub fn new(stage: Stage, source: CrawlError) -> Self {
        Self { stage, source }
    }

    pub fn kind(&self) -> &'static str {
        self.source.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_timeout_and_upstream_are_retryable() {
        let timeout = CrawlError::Timeout {
            timeout_ms: 5_000,
            detail: "slow".into(),
        };
        assert!(timeout.is_retryable());
        assert!(CrawlError::upstream(Some(502), "bad gateway").is_retryable());
        assert!(!CrawlError::Configuration("missing key".into()).is_retryable());
        assert!(!CrawlError::Template("mismatch".into()).is_retryable());
    }

    #[test]
    fn test_stage_error_names_kind_and_stage() {
        let err = StageError::new(Stage::Fetch, CrawlError::upstream(Some(500), "boom"));
        let message = err.to_string();
        assert!(message.starts_with("UpstreamError during fetch stage"));
        assert!(message.contains("HTTP 500"));
        assert_eq!(err.kind(), "UpstreamError");
    }
}
